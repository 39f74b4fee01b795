//! Report processing pipeline.
//!
//! Coordinates one submission end to end:
//! - Image quality gate
//! - Classification and severity
//! - Location verification
//! - Accept/reject routing

pub mod context;
pub mod orchestrator;

pub use context::*;
pub use orchestrator::*;
