//! AI columns persisted on a report row.
//!
//! The core does no I/O; this is the flat shape the storage layer writes
//! after a decision.

use serde::{Deserialize, Serialize};

use crate::pipeline::orchestrator::Decision;

pub const WARNING_SEPARATOR: &str = "; ";

/// Projection of a `Decision` onto the `reports` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportAiRecord {
    pub report_id: String,
    pub validation_score: f64,
    /// `passed` or `failed`.
    pub validation_status: String,
    pub validation_warnings: Option<String>,
    pub ai_confidence: Option<f64>,
    pub ai_predicted_class: Option<String>,
    pub ai_severity: Option<String>,
    pub final_score: f64,
    pub gps_verified: bool,
    pub gps_has_photo_location: bool,
    pub gps_distance_km: Option<f64>,
    pub gps_spoofing_detected: bool,
    pub image_hash: Option<String>,
    pub agent_decision: String,
}

impl ReportAiRecord {
    pub fn from_decision(decision: &Decision) -> Self {
        let validation = &decision.validation;
        let classification = decision.classification.as_ref();
        let location = classification.map(|c| &c.location);

        let warnings = (!decision.warnings.is_empty())
            .then(|| decision.warnings.join(WARNING_SEPARATOR));

        Self {
            report_id: decision.report_id.clone(),
            validation_score: validation.overall_quality,
            validation_status: if validation.is_valid { "passed" } else { "failed" }.to_string(),
            validation_warnings: warnings,
            ai_confidence: classification.map(|c| c.confidence),
            ai_predicted_class: classification.map(|c| c.predicted_class.clone()),
            ai_severity: classification
                .and_then(|c| c.severity)
                .map(|s| s.as_str().to_string()),
            final_score: decision.final_score,
            gps_verified: location.map_or(false, |l| l.verification_status.is_confirmed()),
            gps_has_photo_location: location.map_or(false, |l| l.has_photo_gps),
            gps_distance_km: location.and_then(|l| l.distance_km),
            gps_spoofing_detected: location.map_or(false, |l| l.is_spoofed),
            image_hash: classification.and_then(|c| c.image_hash.clone()),
            agent_decision: decision.agent_decision.as_str().to_string(),
        }
    }
}
