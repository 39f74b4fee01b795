//! Structured logging utilities.
//!
//! Provides context-aware logging with report_id and stage included
//! in every log message.

use std::fmt;

/// Logging context for one submitted report.
#[derive(Debug, Clone)]
pub struct LogContext {
    pub report_id: String,
    pub stage: Option<String>,
}

impl LogContext {
    pub fn new(report_id: &str) -> Self {
        Self {
            report_id: report_id.to_string(),
            stage: None,
        }
    }

    pub fn with_stage(&self, stage: &str) -> Self {
        Self {
            report_id: self.report_id.clone(),
            stage: Some(stage.to_string()),
        }
    }
}

impl fmt::Display for LogContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.stage {
            Some(stage) => write!(f, "[report={}] [stage={}]", self.report_id, stage),
            None => write!(f, "[report={}]", self.report_id),
        }
    }
}

/// Initialize the process-wide logger.
///
/// Safe to call more than once; later calls are no-ops.
pub fn init_logger() {
    let _ = env_logger::builder()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .format_timestamp_millis()
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_context_display() {
        let ctx = LogContext::new("report-123");
        assert_eq!(format!("{}", ctx), "[report=report-123]");

        let ctx_with_stage = ctx.with_stage("layer0");
        assert_eq!(
            format!("{}", ctx_with_stage),
            "[report=report-123] [stage=layer0]"
        );
    }

    #[test]
    fn test_init_logger_idempotent() {
        init_logger();
        init_logger();
    }
}
