//! Issue classification with location-adjusted scoring.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use image::DynamicImage;
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::classification::model::{
    preprocess, softmax, InferenceBackend, ModelCheckpoint, NON_ISSUE_LABEL,
};
use crate::classification::severity::{estimate_severity, Severity};
use crate::config::AgentConfig;
use crate::error::{CoreError, Result};
use crate::extraction::{read_photo_metadata, PhotoMetadata};
use crate::geo::round_to;
use crate::location::{LocationVerification, LocationVerifier, VerificationStatus};
use crate::logging::structured::LogContext;

/// Raw model output for one image.
#[derive(Debug, Clone, PartialEq)]
pub struct Prediction {
    pub label: String,
    /// Softmax probability of `label`, 0..1.
    pub probability: f64,
    /// Percentage per class label.
    pub probabilities: BTreeMap<String, f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ClassificationResult {
    pub predicted_class: String,
    /// 0..100, two decimals.
    pub confidence: f64,
    pub all_probabilities: BTreeMap<String, f64>,
    /// Present iff `is_valid_issue`.
    pub severity: Option<Severity>,
    pub is_valid_issue: bool,
    #[serde(rename = "gps_verification")]
    pub location: LocationVerification,
    pub ai_score: f64,
    /// `ai_score + location.score_adjustment`, clamped to 0..100.
    pub final_score: f64,
    pub message: String,
    /// SHA-256 of the uploaded bytes, when they were available.
    pub image_hash: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ModelInfo {
    pub model_name: String,
    pub num_classes: usize,
    pub classes: Vec<String>,
    pub val_accuracy: f64,
    pub backend: String,
    pub confidence_threshold: f64,
}

pub struct IssueClassifier {
    checkpoint: ModelCheckpoint,
    backend: Box<dyn InferenceBackend>,
    confidence_threshold: f64,
    verifier: LocationVerifier,
}

impl IssueClassifier {
    pub fn new(
        checkpoint: ModelCheckpoint,
        backend: Box<dyn InferenceBackend>,
        confidence_threshold: f64,
        verifier: LocationVerifier,
    ) -> Result<Self> {
        if !(0.0..=1.0).contains(&confidence_threshold) {
            return Err(CoreError::Config(format!(
                "confidence_threshold {} outside [0, 1]",
                confidence_threshold
            )));
        }

        log::info!(
            "CLASSIFIER_READY model={} backend={} classes={} threshold={}",
            checkpoint.model_name,
            backend.name(),
            checkpoint.num_classes(),
            confidence_threshold
        );

        Ok(Self {
            checkpoint,
            backend,
            confidence_threshold,
            verifier,
        })
    }

    /// Checkpoint from `config.model_dir`, candle ResNet-18 weights and the
    /// configured lookup services.
    #[cfg(feature = "candle")]
    pub fn from_config(config: &AgentConfig) -> Result<Self> {
        use crate::classification::candle_backend::CandleResNet;

        let checkpoint = ModelCheckpoint::load(&config.model_dir)?;
        let backend = CandleResNet::load(&checkpoint)?;
        Self::new(
            checkpoint,
            Box::new(backend),
            config.confidence_threshold,
            LocationVerifier::from_config(config)?,
        )
    }

    /// Same as `from_config` but with a caller-supplied model backend.
    pub fn with_backend(config: &AgentConfig, backend: Box<dyn InferenceBackend>) -> Result<Self> {
        let checkpoint = ModelCheckpoint::load(&config.model_dir)?;
        Self::new(
            checkpoint,
            backend,
            config.confidence_threshold,
            LocationVerifier::from_config(config)?,
        )
    }

    pub fn checkpoint(&self) -> &ModelCheckpoint {
        &self.checkpoint
    }

    pub fn confidence_threshold(&self) -> f64 {
        self.confidence_threshold
    }

    pub fn model_info(&self) -> ModelInfo {
        ModelInfo {
            model_name: self.checkpoint.model_name.clone(),
            num_classes: self.checkpoint.num_classes(),
            classes: self.checkpoint.class_names.clone(),
            val_accuracy: self.checkpoint.val_accuracy,
            backend: self.backend.name().to_string(),
            confidence_threshold: self.confidence_threshold,
        }
    }

    /// Top class and the full distribution. Inference failures propagate.
    pub fn predict(&self, image: &DynamicImage, ctx: &LogContext) -> Result<Prediction> {
        let input = preprocess(image);
        let logits = self.backend.logits(&input).map_err(CoreError::Inference)?;

        if logits.len() != self.checkpoint.num_classes() {
            return Err(CoreError::Inference(anyhow::anyhow!(
                "backend returned {} logits for {} classes",
                logits.len(),
                self.checkpoint.num_classes()
            )));
        }
        if logits.iter().any(|l| !l.is_finite()) {
            return Err(CoreError::Inference(anyhow::anyhow!(
                "backend returned non-finite logits"
            )));
        }

        let probs = softmax(&logits);
        let (best, &p) = probs
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .ok_or_else(|| CoreError::Inference(anyhow::anyhow!("empty logits")))?;

        let probabilities = self
            .checkpoint
            .class_names
            .iter()
            .zip(&probs)
            .map(|(label, &q)| (label.clone(), round_to(q as f64 * 100.0, 2)))
            .collect();

        let prediction = Prediction {
            label: self.checkpoint.class_names[best].clone(),
            probability: p as f64,
            probabilities,
        };
        log::info!(
            "{} PREDICTION class={} probability={:.4}",
            ctx,
            prediction.label,
            prediction.probability
        );
        Ok(prediction)
    }

    /// Read, decode and classify an image file.
    pub fn classify_path(
        &self,
        path: &Path,
        latitude: Option<f64>,
        longitude: Option<f64>,
        ctx: &LogContext,
    ) -> Result<ClassificationResult> {
        let data = fs::read(path)?;
        let image = image::load_from_memory(&data)?;
        let metadata = read_photo_metadata(&data, ctx);
        let hash = hex::encode(Sha256::digest(&data));
        self.classify_image(&image, metadata.as_ref(), Some(hash), latitude, longitude, ctx)
    }

    /// Classify each file. One failure does not stop the rest.
    pub fn classify_batch(
        &self,
        paths: &[&Path],
        ctx: &LogContext,
    ) -> Vec<Result<ClassificationResult>> {
        paths
            .iter()
            .map(|path| {
                let result = self.classify_path(path, None, None, ctx);
                if let Err(e) = &result {
                    log::error!(
                        "{} BATCH_ITEM_FAILED path={} error=\"{}\"",
                        ctx,
                        path.display(),
                        e
                    );
                }
                result
            })
            .collect()
    }

    pub fn classify_image(
        &self,
        image: &DynamicImage,
        metadata: Option<&PhotoMetadata>,
        image_hash: Option<String>,
        latitude: Option<f64>,
        longitude: Option<f64>,
        ctx: &LogContext,
    ) -> Result<ClassificationResult> {
        let ctx = ctx.with_stage("classifier");
        let prediction = self.predict(image, &ctx)?;

        let is_valid_issue = prediction.label != NON_ISSUE_LABEL
            && prediction.probability >= self.confidence_threshold;
        let severity =
            is_valid_issue.then(|| estimate_severity(image, &prediction.label, &ctx));

        let location = self.verifier.verify(metadata, latitude, longitude, &ctx);

        let confidence = round_to(prediction.probability * 100.0, 2);
        let ai_score = confidence;
        let final_score = adjusted_score(ai_score, location.score_adjustment);
        let message = compose_message(&prediction.label, confidence, is_valid_issue, &location);

        log::info!(
            "{} CLASSIFICATION_COMPLETE class={} confidence={:.2} valid={} severity={} location={} final_score={:.2}",
            ctx,
            prediction.label,
            confidence,
            is_valid_issue,
            severity.map(|s| s.as_str()).unwrap_or("none"),
            location.verification_status.as_str(),
            final_score
        );

        Ok(ClassificationResult {
            predicted_class: prediction.label,
            confidence,
            all_probabilities: prediction.probabilities,
            severity,
            is_valid_issue,
            location,
            ai_score,
            final_score,
            message,
            image_hash,
        })
    }
}

/// Clamp to 0..100, two decimals.
pub fn adjusted_score(ai_score: f64, adjustment: i32) -> f64 {
    round_to((ai_score + adjustment as f64).clamp(0.0, 100.0), 2)
}

/// User-facing explanation. Spoofing outranks everything else.
pub fn compose_message(
    predicted_class: &str,
    confidence_pct: f64,
    is_valid_issue: bool,
    location: &LocationVerification,
) -> String {
    if location.is_spoofed {
        return format!(
            "GPS SPOOFING DETECTED: The photo's location differs from your submitted location by {:.2} km. \
             Please ensure you're submitting accurate coordinates. Penalty applied: {} points.",
            location.distance_km.unwrap_or(0.0),
            location.score_adjustment
        );
    }

    if !is_valid_issue {
        if predicted_class == NON_ISSUE_LABEL {
            return "This doesn't appear to be a civic issue (pothole or garbage). \
                    Please upload a clear photo of a pothole or garbage pile."
                .to_string();
        }
        return format!(
            "Low confidence detection ({:.1}%). The {} is not clearly visible. \
             Please try taking the photo again from a different angle with better lighting.",
            confidence_pct, predicted_class
        );
    }

    let quality = if confidence_pct >= 90.0 {
        "Clear"
    } else if confidence_pct >= 70.0 {
        "Good"
    } else {
        "Acceptable"
    };
    let mut message = format!(
        "{} {} detected with {:.1}% confidence.",
        quality, predicted_class, confidence_pct
    );

    match location.verification_status {
        VerificationStatus::Verified => {
            message.push_str(" Location verified with nearby landmarks.")
        }
        VerificationStatus::GoodMatch => {
            message.push_str(" Location matches submitted coordinates.")
        }
        VerificationStatus::MinorMismatch => message.push_str(&format!(
            " Minor location mismatch ({:.2} km).",
            location.distance_km.unwrap_or(0.0)
        )),
        _ => {}
    }
    message
}
