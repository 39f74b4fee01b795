//! Structured logging with report context.
//!
//! Every log line emitted while processing one report carries the report id
//! (and the current stage) so the web layer's logs can be correlated.

pub mod structured;

pub use structured::*;
