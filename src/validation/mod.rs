//! Image quality validation (Stage 0).
//!
//! A fixed battery of security and quality checks over one uploaded image:
//! - File size, validity, colour mode and decompression-bomb limits
//! - Aspect ratio, resolution, sharpness, brightness and content variance
//! - EXIF photo age and screenshot heuristics
//! - Submitted GPS inside the service area

pub mod checks;
pub mod probe;
pub mod quality;
pub mod report;
pub mod stats;

pub use checks::{CheckName, CheckResult};
pub use probe::ImageProbe;
pub use quality::QualityChecker;
pub use report::ValidationReport;
