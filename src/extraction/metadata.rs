//! Photo metadata model.
//!
//! Everything the pipeline reads from a photo's EXIF block, already
//! converted to plain Rust types and sanitized for display.

use serde::Serialize;

use crate::geo::GeoPoint;

/// Camera/location metadata embedded in one photo.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PhotoMetadata {
    /// Signed decimal degrees; absent when the GPS IFD is missing or unusable.
    pub gps: Option<GeoPoint>,
    /// Metres above sea level (negative below).
    pub altitude_m: Option<f64>,
    /// `GPSDateStamp GPSTimeStamp`, UTC.
    pub gps_timestamp: Option<String>,
    pub camera_make: Option<String>,
    pub camera_model: Option<String>,
    pub date_time: Option<String>,
    pub date_time_original: Option<String>,
    pub date_time_digitized: Option<String>,
    /// Number of EXIF fields in the container.
    pub field_count: usize,
    /// Vendor/user payload tags present in the file.
    pub risky_tags: Vec<String>,
}

impl PhotoMetadata {
    /// Capture time in EXIF `YYYY:MM:DD HH:MM:SS` form.
    ///
    /// Prefers the shutter time, then the last-modified time, then the
    /// digitization time.
    pub fn capture_timestamp(&self) -> Option<&str> {
        self.date_time_original
            .as_deref()
            .or(self.date_time.as_deref())
            .or(self.date_time_digitized.as_deref())
    }

    pub fn has_gps(&self) -> bool {
        self.gps.is_some()
    }

    /// Camera-originated photos carry a handful of fields at least;
    /// screenshots and re-encoded images usually carry almost none.
    pub fn is_minimal(&self) -> bool {
        self.field_count < MIN_CAMERA_EXIF_FIELDS
    }
}

/// Below this many EXIF fields a photo is treated as lacking camera metadata.
pub const MIN_CAMERA_EXIF_FIELDS: usize = 5;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capture_timestamp_preference() {
        let meta = PhotoMetadata {
            date_time: Some("2026:01:02 10:00:00".into()),
            date_time_digitized: Some("2026:01:03 10:00:00".into()),
            ..PhotoMetadata::default()
        };
        assert_eq!(meta.capture_timestamp(), Some("2026:01:02 10:00:00"));

        let meta = PhotoMetadata {
            date_time_original: Some("2026:01:01 09:00:00".into()),
            ..meta
        };
        assert_eq!(meta.capture_timestamp(), Some("2026:01:01 09:00:00"));
    }

    #[test]
    fn test_minimal_metadata() {
        let meta = PhotoMetadata {
            field_count: 2,
            ..PhotoMetadata::default()
        };
        assert!(meta.is_minimal());

        let meta = PhotoMetadata {
            field_count: 12,
            ..PhotoMetadata::default()
        };
        assert!(!meta.is_minimal());
    }
}
