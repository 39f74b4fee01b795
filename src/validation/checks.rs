//! The Stage-0 quality battery.
//!
//! Each check is a pure function of an `ImageProbe` (or the submitted
//! coordinates) and always yields a `CheckResult`; failures are data, never
//! errors.

use std::fmt;

use chrono::NaiveDateTime;
use serde::{Serialize, Serializer};

use crate::geo::{round_to, GeoPoint, GPS_MAX_DECIMAL_PLACES};
use crate::logging::structured::LogContext;
use crate::validation::probe::{color_mode_name, ImageProbe};
use crate::validation::stats::{laplacian_variance, mean_intensity, std_dev};

// Security limits
pub const MIN_FILE_SIZE: u64 = 10 * 1024;
pub const MAX_FILE_SIZE: u64 = 10 * 1024 * 1024;
pub const MAX_IMAGE_WIDTH: u32 = 10_000;
pub const MAX_IMAGE_HEIGHT: u32 = 10_000;
pub const ALLOWED_EXTENSIONS: &[&str] = &[".jpg", ".jpeg", ".png"];
pub const ALLOWED_COLOR_MODES: &[&str] = &["RGB", "RGBA", "L", "P"];

// Quality thresholds
pub const MIN_ASPECT_RATIO: f64 = 0.5;
pub const MAX_ASPECT_RATIO: f64 = 2.0;
/// 1:1, 4:3, 3:2, 3:4, 2:3
pub const IDEAL_ASPECT_RATIOS: &[f64] = &[1.0, 1.33, 1.5, 0.75, 0.67];
pub const MIN_WIDTH: u32 = 300;
pub const MIN_HEIGHT: u32 = 300;
pub const MIN_BLUR_SCORE: f64 = 100.0;
pub const MIN_BRIGHTNESS: f64 = 30.0;
pub const MAX_BRIGHTNESS: f64 = 230.0;
pub const MIN_CONTENT_STD_DEV: f64 = 5.0;
const CONTENT_STD_DEV_SATURATION: f64 = 50.0;

// Metadata heuristics
pub const SCREENSHOT_RATIOS: &[(u32, u32)] = &[(16, 9), (9, 16), (18, 9), (19, 9)];
const SCREENSHOT_RATIO_TOLERANCE: f64 = 0.05;
const UNKNOWN_TIMESTAMP_SCORE: f64 = 50.0;
const SCREENSHOT_SUSPECT_SCORE: f64 = 60.0;
const SCREENSHOT_UNDETERMINED_SCORE: f64 = 80.0;

/// Closed set of quality checks, in battery order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CheckName {
    FileSize,
    FileValidity,
    ColorMode,
    DimensionLimits,
    AspectRatio,
    Resolution,
    BlurDetection,
    Brightness,
    ContentValidation,
    Timestamp,
    ScreenshotDetection,
    GpsValidation,
}

impl CheckName {
    pub const ALL: [CheckName; 12] = [
        CheckName::FileSize,
        CheckName::FileValidity,
        CheckName::ColorMode,
        CheckName::DimensionLimits,
        CheckName::AspectRatio,
        CheckName::Resolution,
        CheckName::BlurDetection,
        CheckName::Brightness,
        CheckName::ContentValidation,
        CheckName::Timestamp,
        CheckName::ScreenshotDetection,
        CheckName::GpsValidation,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            CheckName::FileSize => "File Size",
            CheckName::FileValidity => "File Validity",
            CheckName::ColorMode => "Color Mode",
            CheckName::DimensionLimits => "Dimension Limits",
            CheckName::AspectRatio => "Aspect Ratio",
            CheckName::Resolution => "Resolution",
            CheckName::BlurDetection => "Blur Detection",
            CheckName::Brightness => "Brightness",
            CheckName::ContentValidation => "Content Validation",
            CheckName::Timestamp => "Timestamp",
            CheckName::ScreenshotDetection => "Screenshot Detection",
            CheckName::GpsValidation => "GPS Validation",
        }
    }

    /// Aggregation weight. Security checks outweigh informational ones.
    pub fn weight(&self) -> f64 {
        match self {
            CheckName::FileSize => 2.0,
            CheckName::FileValidity => 2.0,
            CheckName::ColorMode => 1.8,
            CheckName::DimensionLimits => 2.0,
            CheckName::AspectRatio => 1.5,
            CheckName::Resolution => 1.5,
            CheckName::BlurDetection => 1.8,
            CheckName::Brightness => 1.5,
            CheckName::ContentValidation => 1.7,
            CheckName::Timestamp => 0.8,
            CheckName::ScreenshotDetection => 0.5,
            CheckName::GpsValidation => 1.2,
        }
    }

    /// A failed hard check rejects the report on its own.
    pub fn is_hard(&self) -> bool {
        matches!(
            self,
            CheckName::FileValidity
                | CheckName::Resolution
                | CheckName::BlurDetection
                | CheckName::Brightness
                | CheckName::GpsValidation
        )
    }
}

impl fmt::Display for CheckName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl Serialize for CheckName {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.label())
    }
}

/// Outcome of one quality check.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CheckResult {
    pub name: CheckName,
    pub passed: bool,
    /// Always within [0, 100].
    pub score: f64,
    pub message: String,
    /// Passed, but the caller should still see the message.
    pub soft_warning: bool,
}

impl CheckResult {
    pub fn pass(name: CheckName, score: f64, message: impl Into<String>) -> Self {
        Self::build(name, true, score, message, false)
    }

    pub fn fail(name: CheckName, score: f64, message: impl Into<String>) -> Self {
        Self::build(name, false, score, message, false)
    }

    pub fn warn(name: CheckName, score: f64, message: impl Into<String>) -> Self {
        Self::build(name, true, score, message, true)
    }

    fn build(
        name: CheckName,
        passed: bool,
        score: f64,
        message: impl Into<String>,
        soft_warning: bool,
    ) -> Self {
        let score = if score.is_finite() {
            round_to(score.clamp(0.0, 100.0), 2)
        } else {
            0.0
        };
        Self {
            name,
            passed,
            score,
            message: message.into(),
            soft_warning,
        }
    }

    fn logged(self, ctx: &LogContext) -> Self {
        if self.passed {
            log::debug!(
                "{} CHECK_PASSED check=\"{}\" score={:.2}",
                ctx,
                self.name,
                self.score
            );
        } else {
            log::warn!(
                "{} CHECK_FAILED check=\"{}\" score={:.2} hard={} message=\"{}\"",
                ctx,
                self.name,
                self.score,
                self.name.is_hard(),
                self.message
            );
        }
        self
    }
}

fn header_dimensions(probe: &ImageProbe) -> Result<(u32, u32), &str> {
    probe
        .header
        .as_ref()
        .map(|h| (h.width, h.height))
        .map_err(|e| e.as_str())
}

fn kib(bytes: u64) -> f64 {
    bytes as f64 / 1024.0
}

fn mib(bytes: u64) -> f64 {
    bytes as f64 / (1024.0 * 1024.0)
}

pub fn check_file_size(probe: &ImageProbe, ctx: &LogContext) -> CheckResult {
    let name = CheckName::FileSize;
    let size = match &probe.file_size {
        Ok(size) => *size,
        Err(e) => {
            return CheckResult::fail(name, 0.0, format!("File size check failed: {}", e))
                .logged(ctx)
        }
    };

    if size < MIN_FILE_SIZE {
        return CheckResult::fail(
            name,
            0.0,
            format!(
                "File too small ({:.2} KB). Minimum {:.0} KB required. Possible corruption.",
                kib(size),
                kib(MIN_FILE_SIZE)
            ),
        )
        .logged(ctx);
    }
    if size > MAX_FILE_SIZE {
        return CheckResult::fail(
            name,
            0.0,
            format!(
                "File too large ({:.2} MB). Maximum {:.0} MB allowed.",
                mib(size),
                mib(MAX_FILE_SIZE)
            ),
        )
        .logged(ctx);
    }

    let mb = mib(size);
    let score = if mb <= 5.0 {
        100.0
    } else {
        (100.0 - (mb - 5.0) / 5.0 * 20.0).max(50.0)
    };
    CheckResult::pass(name, score, format!("Acceptable file size ({:.2} MB)", mb)).logged(ctx)
}

pub fn check_file_validity(probe: &ImageProbe, ctx: &LogContext) -> CheckResult {
    let name = CheckName::FileValidity;
    if !probe.exists {
        return CheckResult::fail(name, 0.0, "File does not exist").logged(ctx);
    }

    let allowed = probe
        .extension
        .as_deref()
        .map(|ext| ALLOWED_EXTENSIONS.contains(&ext))
        .unwrap_or(false);
    if !allowed {
        return CheckResult::fail(
            name,
            0.0,
            format!(
                "Invalid file extension. Allowed: {}",
                ALLOWED_EXTENSIONS.join(", ")
            ),
        )
        .logged(ctx);
    }

    match &probe.image {
        Ok(_) => CheckResult::pass(name, 100.0, "Valid image file").logged(ctx),
        Err(e) => CheckResult::fail(name, 0.0, format!("Invalid or corrupted image file: {}", e))
            .logged(ctx),
    }
}

pub fn check_color_mode(probe: &ImageProbe, ctx: &LogContext) -> CheckResult {
    let name = CheckName::ColorMode;
    let header = match &probe.header {
        Ok(h) => h,
        Err(e) => {
            return CheckResult::fail(name, 0.0, format!("Color mode check failed: {}", e))
                .logged(ctx)
        }
    };

    let mode = color_mode_name(header.color_type);
    if ALLOWED_COLOR_MODES.contains(&mode) {
        CheckResult::pass(name, 100.0, format!("Valid color mode ({})", mode)).logged(ctx)
    } else {
        CheckResult::fail(
            name,
            0.0,
            format!(
                "Unsupported color mode ({}). Allowed: {}. Please convert to RGB.",
                mode,
                ALLOWED_COLOR_MODES.join(", ")
            ),
        )
        .logged(ctx)
    }
}

pub fn check_dimension_limits(probe: &ImageProbe, ctx: &LogContext) -> CheckResult {
    let name = CheckName::DimensionLimits;
    let (width, height) = match header_dimensions(probe) {
        Ok(dims) => dims,
        Err(e) => {
            return CheckResult::fail(name, 0.0, format!("Dimension check failed: {}", e))
                .logged(ctx)
        }
    };

    if width > MAX_IMAGE_WIDTH || height > MAX_IMAGE_HEIGHT {
        return CheckResult::fail(
            name,
            0.0,
            format!(
                "Image dimensions ({}x{}) exceed maximum allowed ({}x{}). Potential decompression bomb.",
                width, height, MAX_IMAGE_WIDTH, MAX_IMAGE_HEIGHT
            ),
        )
        .logged(ctx);
    }
    CheckResult::pass(
        name,
        100.0,
        format!("Safe image dimensions ({}x{})", width, height),
    )
    .logged(ctx)
}

pub fn check_aspect_ratio(probe: &ImageProbe, ctx: &LogContext) -> CheckResult {
    let name = CheckName::AspectRatio;
    let ratio = match header_dimensions(probe) {
        Ok((w, h)) if h > 0 => w as f64 / h as f64,
        Ok(_) => 0.0,
        Err(e) => {
            return CheckResult::fail(name, 0.0, format!("Aspect ratio check failed: {}", e))
                .logged(ctx)
        }
    };

    if !(MIN_ASPECT_RATIO..=MAX_ASPECT_RATIO).contains(&ratio) {
        return CheckResult::fail(
            name,
            0.0,
            format!(
                "Aspect ratio ({:.2}) too distorted. Acceptable range: {} - {}.",
                ratio, MIN_ASPECT_RATIO, MAX_ASPECT_RATIO
            ),
        )
        .logged(ctx);
    }

    let min_diff = IDEAL_ASPECT_RATIOS
        .iter()
        .map(|ideal| (ratio - ideal).abs())
        .fold(f64::INFINITY, f64::min);
    let score = (100.0 - min_diff * 30.0).max(70.0);
    CheckResult::pass(name, score, format!("Acceptable aspect ratio ({:.2})", ratio)).logged(ctx)
}

pub fn check_resolution(probe: &ImageProbe, ctx: &LogContext) -> CheckResult {
    let name = CheckName::Resolution;
    let (width, height) = match header_dimensions(probe) {
        Ok(dims) => dims,
        Err(e) => {
            return CheckResult::fail(name, 0.0, format!("Resolution check failed: {}", e))
                .logged(ctx)
        }
    };

    let width_ratio = width as f64 / MIN_WIDTH as f64;
    let height_ratio = height as f64 / MIN_HEIGHT as f64;
    let score = width_ratio.min(height_ratio) * 100.0;

    if width >= MIN_WIDTH && height >= MIN_HEIGHT {
        CheckResult::pass(name, score, format!("Good resolution ({}x{})", width, height))
            .logged(ctx)
    } else {
        CheckResult::fail(
            name,
            score,
            format!(
                "Resolution too low ({}x{}). Minimum {}x{} required.",
                width, height, MIN_WIDTH, MIN_HEIGHT
            ),
        )
        .logged(ctx)
    }
}

pub fn check_blur(probe: &ImageProbe, ctx: &LogContext) -> CheckResult {
    let name = CheckName::BlurDetection;
    let Some(gray) = &probe.gray else {
        return CheckResult::fail(name, 0.0, "Could not read image for blur detection")
            .logged(ctx);
    };

    let variance = laplacian_variance(gray);
    let score = variance / MIN_BLUR_SCORE * 100.0;
    if variance >= MIN_BLUR_SCORE {
        CheckResult::pass(name, score, format!("Image is sharp (score: {:.2})", variance))
            .logged(ctx)
    } else {
        CheckResult::fail(
            name,
            score,
            format!(
                "Image too blurry (score: {:.2}). Please retake in better focus.",
                variance
            ),
        )
        .logged(ctx)
    }
}

pub fn check_brightness(probe: &ImageProbe, ctx: &LogContext) -> CheckResult {
    let name = CheckName::Brightness;
    let Some(gray) = &probe.gray else {
        return CheckResult::fail(name, 0.0, "Could not read image for brightness check")
            .logged(ctx);
    };

    let mean = mean_intensity(gray);
    let score = mean / 255.0 * 100.0;
    if mean < MIN_BRIGHTNESS {
        CheckResult::fail(
            name,
            score,
            format!("Image too dark (level: {:.2}). Please adjust lighting.", mean),
        )
        .logged(ctx)
    } else if mean > MAX_BRIGHTNESS {
        CheckResult::fail(
            name,
            score,
            format!("Image too bright (level: {:.2}). Please adjust lighting.", mean),
        )
        .logged(ctx)
    } else {
        CheckResult::pass(name, score, format!("Good brightness (level: {:.2})", mean)).logged(ctx)
    }
}

pub fn check_content(probe: &ImageProbe, ctx: &LogContext) -> CheckResult {
    let name = CheckName::ContentValidation;
    let Some(gray) = &probe.gray else {
        return CheckResult::fail(name, 0.0, "Could not read image content").logged(ctx);
    };

    let sd = std_dev(gray);
    if sd < MIN_CONTENT_STD_DEV {
        return CheckResult::fail(
            name,
            0.0,
            format!(
                "Image appears blank or has no content (variation: {:.2}). Please submit a photo with visible content.",
                sd
            ),
        )
        .logged(ctx);
    }
    let score = sd / CONTENT_STD_DEV_SATURATION * 100.0;
    CheckResult::pass(
        name,
        score,
        format!("Image has valid content (variation: {:.2})", sd),
    )
    .logged(ctx)
}

/// EXIF capture-time format.
pub const EXIF_DATETIME_FORMAT: &str = "%Y:%m:%d %H:%M:%S";

pub fn check_timestamp(
    probe: &ImageProbe,
    now: NaiveDateTime,
    max_age_days: i64,
    ctx: &LogContext,
) -> CheckResult {
    let name = CheckName::Timestamp;
    let Some(meta) = &probe.metadata else {
        return CheckResult::warn(
            name,
            UNKNOWN_TIMESTAMP_SCORE,
            "No EXIF timestamp found (accepted with warning)",
        )
        .logged(ctx);
    };
    let Some(raw) = meta.capture_timestamp() else {
        return CheckResult::warn(
            name,
            UNKNOWN_TIMESTAMP_SCORE,
            "No timestamp in EXIF data (accepted with warning)",
        )
        .logged(ctx);
    };
    let Ok(taken) = NaiveDateTime::parse_from_str(raw.trim(), EXIF_DATETIME_FORMAT) else {
        log::warn!("{} TIMESTAMP_UNPARSEABLE raw=\"{}\"", ctx, raw);
        return CheckResult::warn(
            name,
            UNKNOWN_TIMESTAMP_SCORE,
            "Could not parse timestamp (accepted with warning)",
        )
        .logged(ctx);
    };

    let age_days = (now - taken).num_days();
    let score = 100.0 - age_days as f64 / max_age_days.max(1) as f64 * 100.0;

    if age_days > max_age_days {
        CheckResult::fail(
            name,
            score,
            format!(
                "Photo is {} days old. Please take a fresh photo (max {} days).",
                age_days, max_age_days
            ),
        )
        .logged(ctx)
    } else {
        CheckResult::pass(
            name,
            score,
            format!("Photo is {} days old (within acceptable range)", age_days),
        )
        .logged(ctx)
    }
}

pub fn check_screenshot(probe: &ImageProbe, ctx: &LogContext) -> CheckResult {
    let name = CheckName::ScreenshotDetection;
    let Some(ratio) = probe.aspect_ratio() else {
        return CheckResult::pass(
            name,
            SCREENSHOT_UNDETERMINED_SCORE,
            "Could not determine if screenshot (check skipped)",
        )
        .logged(ctx);
    };

    let screen_ratio = SCREENSHOT_RATIOS
        .iter()
        .any(|&(w, h)| (ratio - w as f64 / h as f64).abs() < SCREENSHOT_RATIO_TOLERANCE);
    let minimal_exif = probe
        .metadata
        .as_ref()
        .map(|m| m.is_minimal())
        .unwrap_or(true);

    if screen_ratio && minimal_exif {
        log::warn!(
            "{} SCREENSHOT_SUSPECTED ratio={:.2} exif_fields={}",
            ctx,
            ratio,
            probe.metadata.as_ref().map(|m| m.field_count).unwrap_or(0)
        );
        return CheckResult::warn(
            name,
            SCREENSHOT_SUSPECT_SCORE,
            format!(
                "Warning: Image appears to be a screenshot (aspect ratio {:.2}, no camera EXIF). Please submit original photos.",
                ratio
            ),
        )
        .logged(ctx);
    }
    CheckResult::pass(name, 100.0, "Image appears to be an original photo").logged(ctx)
}

/// Submitted coordinates must be present and, after clamping to six
/// decimals, inside the Pakistan rectangle.
pub fn check_gps(
    latitude: Option<f64>,
    longitude: Option<f64>,
    ctx: &LogContext,
) -> CheckResult {
    let name = CheckName::GpsValidation;
    let Some(point) = GeoPoint::from_parts(latitude, longitude) else {
        return CheckResult::fail(name, 0.0, "GPS coordinates required for validation")
            .logged(ctx);
    };
    if !point.latitude.is_finite() || !point.longitude.is_finite() {
        return CheckResult::fail(name, 0.0, "Invalid GPS coordinates: not a finite number")
            .logged(ctx);
    }

    let p = point.rounded();
    let places = GPS_MAX_DECIMAL_PLACES as usize;
    if p.in_pakistan() {
        CheckResult::pass(
            name,
            100.0,
            format!(
                "Valid Pakistan location ({:.*}, {:.*})",
                places, p.latitude, places, p.longitude
            ),
        )
        .logged(ctx)
    } else {
        CheckResult::fail(
            name,
            0.0,
            format!(
                "GPS location ({:.*}, {:.*}) outside Pakistan bounds",
                places, p.latitude, places, p.longitude
            ),
        )
        .logged(ctx)
    }
}
