//! Security module.
//!
//! Guards free-text EXIF values before they reach logs, the decision
//! payload or the storage layer.

pub mod sanitizer;

pub use sanitizer::*;
