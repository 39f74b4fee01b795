//! Geo-math primitives.
//!
//! Pure functions over decimal-degree coordinates:
//! - Great-circle (Haversine) distance
//! - Physical validity and Pakistan plausibility bounds
//! - Precision clamping for submitted coordinates

pub mod math;

pub use math::*;
