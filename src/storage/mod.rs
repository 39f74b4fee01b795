//! Storage module.
//!
//! Row projection and SQL builders for the AI columns of a report.
//! Note: Actual database operations are handled by the web layer.

pub mod models;
pub mod queries;

pub use models::*;
pub use queries::*;
