//! Photo metadata extraction.
//!
//! Reads the EXIF block embedded in an uploaded photo: GPS position,
//! capture timestamps and camera identity.

pub mod exif_reader;
pub mod metadata;

pub use exif_reader::*;
pub use metadata::*;
