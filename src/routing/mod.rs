//! Report routing.
//!
//! Maps the two stage results to a terminal state:
//! - Rejected at the quality gate
//! - Rejected as not a civic issue
//! - Accepted

pub mod decision;

pub use decision::*;
