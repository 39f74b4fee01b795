//! Report orchestration.
//!
//! Runs one submission through:
//! 1. Stage 0, the quality gate (hard errors reject with score 0)
//! 2. Stage 1, classification with location verification
//! 3. Routing to ACCEPTED or REJECTED

use std::io;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{json, Value};

use crate::classification::{ClassificationResult, IssueClassifier, ModelInfo};
use crate::config::AgentConfig;
use crate::error::{CoreError, Result};
use crate::location::{
    SPOOFING_PENALTY, SPOOFING_THRESHOLD_KM, VERIFIED_BONUS, VERIFIED_THRESHOLD_KM,
};
use crate::routing::decision::{determine_route, AgentDecision, ReportRoute};
use crate::validation::{ImageProbe, QualityChecker, ValidationReport};

use super::context::ReportContext;

/// Outcome for one report.
#[derive(Debug, Clone, Serialize)]
pub struct Decision {
    pub report_id: String,
    pub received_at: DateTime<Utc>,
    /// True = accept.
    pub passed: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub validation: ValidationReport,
    /// Absent when the quality gate rejected the image.
    pub classification: Option<ClassificationResult>,
    pub final_score: f64,
    pub agent_decision: AgentDecision,
    pub agent_reason: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthStatus {
    pub status: String,
    pub layer0_status: String,
    pub layer1_status: String,
    pub model_info: ModelInfo,
    pub message: String,
}

pub struct LayerOrchestrator {
    config: AgentConfig,
    quality: QualityChecker,
    classifier: IssueClassifier,
}

impl LayerOrchestrator {
    /// Fails if the configuration is unusable.
    pub fn new(config: AgentConfig, classifier: IssueClassifier) -> Result<Self> {
        config.validate()?;
        let quality = QualityChecker::new(config.max_photo_age_days);

        log::info!(
            "AGENT_READY model={} threshold={} max_photo_age_days={}",
            classifier.model_info().model_name,
            classifier.confidence_threshold(),
            config.max_photo_age_days
        );

        Ok(Self {
            config,
            quality,
            classifier,
        })
    }

    /// Agent with the candle ResNet-18 backend. Missing or mismatched model
    /// artifacts are fatal here, never per request.
    #[cfg(feature = "candle")]
    pub fn from_config(config: AgentConfig) -> Result<Self> {
        config.validate()?;
        let classifier = IssueClassifier::from_config(&config)?;
        Self::new(config, classifier)
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    pub fn classifier(&self) -> &IssueClassifier {
        &self.classifier
    }

    /// Run both stages for one uploaded image.
    ///
    /// Errors only when Stage 1 cannot read the image or the model fails;
    /// every quality problem comes back as a rejected `Decision`.
    pub fn process_report(
        &self,
        image_path: &Path,
        latitude: Option<f64>,
        longitude: Option<f64>,
    ) -> Result<Decision> {
        let report_ctx = ReportContext::new(image_path, latitude, longitude);
        let ctx = report_ctx.log_context();

        log::info!(
            "{} REPORT_RECEIVED file={} lat={:?} lon={:?}",
            ctx,
            image_path.display(),
            latitude,
            longitude
        );

        // [0] QUALITY GATE
        let stage0 = ctx.with_stage("layer0");
        let probe = ImageProbe::load(image_path, &stage0);
        let validation = self
            .quality
            .validate_probe(&probe, latitude, longitude, &stage0);

        if !validation.is_valid {
            let route = determine_route(&validation, None, &ctx);
            return Ok(finish(report_ctx, validation, None, route));
        }

        // [1] CLASSIFICATION + LOCATION
        let stage1 = ctx.with_stage("layer1");
        let image = probe.image.as_ref().map_err(|e| {
            CoreError::Io(io::Error::new(io::ErrorKind::InvalidData, e.clone()))
        })?;
        let classification = self.classifier.classify_image(
            image,
            probe.metadata.as_ref(),
            probe.sha256.clone(),
            latitude,
            longitude,
            &stage1,
        )?;

        let route = determine_route(&validation, Some(&classification), &ctx);
        Ok(finish(report_ctx, validation, Some(classification), route))
    }

    pub fn health_status(&self) -> HealthStatus {
        HealthStatus {
            status: "healthy".to_string(),
            layer0_status: "operational".to_string(),
            layer1_status: "operational".to_string(),
            model_info: self.classifier.model_info(),
            message: "AI Agent fully operational".to_string(),
        }
    }

    /// Quality limits plus classification and location thresholds.
    pub fn thresholds(&self) -> Value {
        let mut summary = self.quality.thresholds();
        if let Value::Object(map) = &mut summary {
            map.insert(
                "classification".to_string(),
                json!({
                    "confidence_threshold": self.classifier.confidence_threshold(),
                    "classes": self.classifier.checkpoint().class_names,
                }),
            );
            map.insert(
                "location".to_string(),
                json!({
                    "spoofing_threshold_km": SPOOFING_THRESHOLD_KM,
                    "verified_threshold_km": VERIFIED_THRESHOLD_KM,
                    "spoofing_penalty": SPOOFING_PENALTY,
                    "verified_bonus": VERIFIED_BONUS,
                    "landmark_radius_m": self.config.landmark_radius_m,
                    "max_landmarks": self.config.max_landmarks,
                }),
            );
        }
        summary
    }
}

fn finish(
    report_ctx: ReportContext,
    validation: ValidationReport,
    classification: Option<ClassificationResult>,
    route: ReportRoute,
) -> Decision {
    let ctx = report_ctx.log_context();
    let agent_decision = route.agent_decision();
    let agent_reason = route.agent_reason().to_string();

    let (errors, final_score) = match (&route, &classification) {
        (ReportRoute::RejectQuality, _) => (validation.errors.clone(), 0.0),
        (ReportRoute::RejectNotAnIssue { detail }, c) => {
            (vec![detail.clone()], c.as_ref().map_or(0.0, |c| c.final_score))
        }
        (ReportRoute::Accept { .. }, c) => (Vec::new(), c.as_ref().map_or(0.0, |c| c.final_score)),
    };

    log::info!(
        "{} AGENT_DECISION decision={} route={} final_score={:.2} errors={} warnings={}",
        ctx,
        agent_decision.as_str(),
        route.as_str(),
        final_score,
        errors.len(),
        validation.warnings.len()
    );

    Decision {
        report_id: report_ctx.report_id,
        received_at: report_ctx.received_at,
        passed: agent_decision == AgentDecision::Accepted,
        errors,
        warnings: validation.warnings.clone(),
        validation,
        classification,
        final_score,
        agent_decision,
        agent_reason,
    }
}
