//! Stage 0: the image quality gate.

use std::path::Path;

use chrono::{Local, NaiveDateTime};
use serde_json::{json, Value};

use crate::geo::{
    GPS_MAX_DECIMAL_PLACES, PAKISTAN_LAT_MAX, PAKISTAN_LAT_MIN, PAKISTAN_LON_MAX,
    PAKISTAN_LON_MIN,
};
use crate::logging::structured::LogContext;
use crate::security::RISKY_EXIF_TAGS;
use crate::validation::checks::*;
use crate::validation::probe::ImageProbe;
use crate::validation::report::ValidationReport;

/// Runs the fixed check battery over one image.
#[derive(Debug, Clone)]
pub struct QualityChecker {
    max_photo_age_days: i64,
}

impl Default for QualityChecker {
    fn default() -> Self {
        Self::new(30)
    }
}

impl QualityChecker {
    pub fn new(max_photo_age_days: i64) -> Self {
        Self { max_photo_age_days }
    }

    /// Load `path` and validate it against the submitted coordinates.
    pub fn validate(
        &self,
        path: &Path,
        latitude: Option<f64>,
        longitude: Option<f64>,
        ctx: &LogContext,
    ) -> ValidationReport {
        let probe = ImageProbe::load(path, ctx);
        self.validate_probe(&probe, latitude, longitude, ctx)
    }

    pub fn validate_probe(
        &self,
        probe: &ImageProbe,
        latitude: Option<f64>,
        longitude: Option<f64>,
        ctx: &LogContext,
    ) -> ValidationReport {
        self.validate_probe_at(probe, latitude, longitude, Local::now().naive_local(), ctx)
    }

    /// Same as `validate_probe` with an explicit clock for photo-age checks.
    pub fn validate_probe_at(
        &self,
        probe: &ImageProbe,
        latitude: Option<f64>,
        longitude: Option<f64>,
        now: NaiveDateTime,
        ctx: &LogContext,
    ) -> ValidationReport {
        log::info!(
            "{} VALIDATION_STARTED file={} lat={:?} lon={:?}",
            ctx,
            probe.file_name,
            latitude,
            longitude
        );

        let checks = vec![
            check_file_size(probe, ctx),
            check_file_validity(probe, ctx),
            check_color_mode(probe, ctx),
            check_dimension_limits(probe, ctx),
            check_aspect_ratio(probe, ctx),
            check_resolution(probe, ctx),
            check_blur(probe, ctx),
            check_brightness(probe, ctx),
            check_content(probe, ctx),
            check_timestamp(probe, now, self.max_photo_age_days, ctx),
            check_screenshot(probe, ctx),
            check_gps(latitude, longitude, ctx),
        ];

        let report = ValidationReport::from_checks(checks, probe.file_name.clone());

        log::info!(
            "{} VALIDATION_COMPLETE valid={} quality={:.2} errors={} warnings={}",
            ctx,
            report.is_valid,
            report.overall_quality,
            report.errors.len(),
            report.warnings.len()
        );
        report
    }

    /// Every limit the gate enforces, for clients that pre-validate uploads.
    pub fn thresholds(&self) -> Value {
        json!({
            "file_size": {
                "min_bytes": MIN_FILE_SIZE,
                "max_bytes": MAX_FILE_SIZE,
                "min_kb": MIN_FILE_SIZE as f64 / 1024.0,
                "max_mb": MAX_FILE_SIZE as f64 / (1024.0 * 1024.0),
            },
            "dimensions": {
                "max_width": MAX_IMAGE_WIDTH,
                "max_height": MAX_IMAGE_HEIGHT,
            },
            "color_mode": { "allowed_modes": ALLOWED_COLOR_MODES },
            "aspect_ratio": { "min": MIN_ASPECT_RATIO, "max": MAX_ASPECT_RATIO },
            "blur": { "min_score": MIN_BLUR_SCORE },
            "brightness": { "min": MIN_BRIGHTNESS, "max": MAX_BRIGHTNESS },
            "resolution": { "min_width": MIN_WIDTH, "min_height": MIN_HEIGHT },
            "timestamp": { "max_age_days": self.max_photo_age_days },
            "gps": {
                "pakistan_bounds": {
                    "latitude": [PAKISTAN_LAT_MIN, PAKISTAN_LAT_MAX],
                    "longitude": [PAKISTAN_LON_MIN, PAKISTAN_LON_MAX],
                },
                "max_decimal_places": GPS_MAX_DECIMAL_PLACES,
            },
            "file": { "allowed_extensions": ALLOWED_EXTENSIONS },
            "screenshot_detection": {
                "monitored_ratios": SCREENSHOT_RATIOS
                    .iter()
                    .map(|&(w, h)| [w, h])
                    .collect::<Vec<_>>(),
            },
            "security": { "risky_exif_tags": RISKY_EXIF_TAGS },
        })
    }
}
