//! Civic issue classification and severity estimation.
//!
//! The network itself is a black box behind `InferenceBackend`; this module
//! owns the label mapping, thresholding, severity heuristics and scoring.

#[cfg(feature = "candle")]
pub mod candle_backend;
pub mod engine;
pub mod model;
pub mod severity;

#[cfg(feature = "candle")]
pub use candle_backend::CandleResNet;
pub use engine::*;
pub use model::*;
pub use severity::{estimate_severity, Severity};
