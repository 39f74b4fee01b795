//! Per-report context.
//!
//! Gives each submission an id and arrival time for logging and the
//! decision record.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::logging::structured::LogContext;

/// Context for one submitted report.
#[derive(Debug, Clone)]
pub struct ReportContext {
    pub report_id: String,
    pub received_at: DateTime<Utc>,
    pub image_path: PathBuf,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

impl ReportContext {
    pub fn new(image_path: &Path, latitude: Option<f64>, longitude: Option<f64>) -> Self {
        let report_id = format!("report-{}", &Uuid::new_v4().simple().to_string()[..8]);

        Self {
            report_id,
            received_at: Utc::now(),
            image_path: image_path.to_path_buf(),
            latitude,
            longitude,
        }
    }

    pub fn log_context(&self) -> LogContext {
        LogContext::new(&self.report_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_id_format() {
        let ctx = ReportContext::new(Path::new("/tmp/a.jpg"), Some(31.5), None);
        assert!(ctx.report_id.starts_with("report-"));
        assert_eq!(ctx.report_id.len(), "report-".len() + 8);
        assert!(ctx.report_id[7..].chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(
            ctx.log_context().to_string(),
            format!("[report={}]", ctx.report_id)
        );
    }

    #[test]
    fn test_ids_are_unique() {
        let a = ReportContext::new(Path::new("a.jpg"), None, None);
        let b = ReportContext::new(Path::new("a.jpg"), None, None);
        assert_ne!(a.report_id, b.report_id);
    }
}
