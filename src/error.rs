//! Error types for the report intake pipeline.
//!
//! Only faults that have no safe default surface here. Quality checks,
//! severity heuristics and external lookups absorb their own failures and
//! never produce a `CoreError`.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, CoreError>;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image decode error: {0}")]
    ImageDecode(#[from] image::ImageError),

    /// Startup-scope failure: the agent cannot be constructed.
    #[error("Model load error: {0}")]
    ModelLoad(String),

    #[error("Inference error: {0}")]
    Inference(#[source] anyhow::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl CoreError {
    /// True for errors that must stop the process from serving reports.
    pub fn is_startup_fatal(&self) -> bool {
        matches!(self, CoreError::ModelLoad(_) | CoreError::Config(_))
    }
}
