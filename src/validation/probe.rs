//! One-pass loading of an uploaded image.
//!
//! Reads the file once and records every fact the quality checks need:
//! size on disk, extension, header dimensions and colour mode, the decoded
//! pixels and the EXIF block. Failures are captured as messages so each
//! check can report them in its own terms.

use std::fs;
use std::io::Cursor;
use std::path::{Path, PathBuf};

use image::{ColorType, DynamicImage, GrayImage, ImageDecoder, ImageReader, Limits};
use sha2::{Digest, Sha256};

use crate::extraction::{read_photo_metadata, PhotoMetadata};
use crate::logging::structured::LogContext;
use crate::validation::stats::to_gray;

/// Largest pixel buffer a decode may allocate.
///
/// Size and dimension limits are judged by their own checks; this only
/// stops a decompression bomb from exhausting memory.
pub const MAX_DECODE_ALLOC: u64 = 512 * 1024 * 1024;

/// Header facts read without decoding pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ImageHeader {
    pub width: u32,
    pub height: u32,
    pub color_type: ColorType,
}

#[derive(Debug)]
pub struct ImageProbe {
    pub path: PathBuf,
    pub file_name: String,
    /// Lowercase extension including the dot (`.jpg`).
    pub extension: Option<String>,
    pub exists: bool,
    pub file_size: Result<u64, String>,
    pub header: Result<ImageHeader, String>,
    pub image: Result<DynamicImage, String>,
    pub gray: Option<GrayImage>,
    pub metadata: Option<PhotoMetadata>,
    /// SHA-256 of the file contents, when they were read.
    pub sha256: Option<String>,
}

impl ImageProbe {
    pub fn load(path: &Path, ctx: &LogContext) -> Self {
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let extension = path
            .extension()
            .map(|e| format!(".{}", e.to_string_lossy().to_lowercase()));

        let file_size = fs::metadata(path)
            .map(|m| m.len())
            .map_err(|e| e.to_string());

        let mut probe = Self {
            path: path.to_path_buf(),
            file_name,
            extension,
            exists: path.exists(),
            file_size,
            header: Err("file not read".to_string()),
            image: Err("file not read".to_string()),
            gray: None,
            metadata: None,
            sha256: None,
        };

        if let Err(ref e) = probe.file_size {
            log::warn!("{} PROBE_STAT_FAILED error={}", ctx, e);
            probe.header = Err(e.clone());
            probe.image = Err(e.clone());
            return probe;
        }

        let bytes = match fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) => {
                log::warn!("{} PROBE_READ_FAILED error={}", ctx, e);
                probe.header = Err(e.to_string());
                probe.image = Err(e.to_string());
                return probe;
            }
        };

        probe.apply_bytes(&bytes, ctx);
        probe
    }

    /// Fill header, pixels, EXIF and hash from in-memory file contents.
    fn apply_bytes(&mut self, bytes: &[u8], ctx: &LogContext) {
        self.sha256 = Some(hex::encode(Sha256::digest(bytes)));
        self.header = read_header(bytes);
        self.image = decode_limited(bytes);
        self.gray = self.image.as_ref().ok().map(to_gray);
        self.metadata = read_photo_metadata(bytes, ctx);

        match (&self.header, &self.image) {
            (Ok(h), Ok(_)) => log::debug!(
                "{} PROBE_LOADED width={} height={} color={:?} exif_fields={}",
                ctx,
                h.width,
                h.height,
                h.color_type,
                self.metadata.as_ref().map(|m| m.field_count).unwrap_or(0)
            ),
            (_, Err(e)) => log::warn!("{} PROBE_DECODE_FAILED error={}", ctx, e),
            (Err(e), Ok(_)) => log::warn!("{} PROBE_HEADER_FAILED error={}", ctx, e),
        }
    }

    pub fn dimensions(&self) -> Option<(u32, u32)> {
        self.header.as_ref().ok().map(|h| (h.width, h.height))
    }

    /// Width over height; 0 for a zero-height image.
    pub fn aspect_ratio(&self) -> Option<f64> {
        self.dimensions().map(|(w, h)| {
            if h > 0 {
                w as f64 / h as f64
            } else {
                0.0
            }
        })
    }
}

fn read_header(bytes: &[u8]) -> Result<ImageHeader, String> {
    let decoder = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|e| e.to_string())?
        .into_decoder()
        .map_err(|e| e.to_string())?;
    let (width, height) = decoder.dimensions();
    Ok(ImageHeader {
        width,
        height,
        color_type: decoder.color_type(),
    })
}

/// Full decode, bounded by allocation size only.
fn decode_limited(bytes: &[u8]) -> Result<DynamicImage, String> {
    let mut limits = Limits::no_limits();
    limits.max_alloc = Some(MAX_DECODE_ALLOC);

    let mut reader = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|e| e.to_string())?;
    reader.limits(limits);
    reader.decode().map_err(|e| e.to_string())
}

/// Image mode name in the vocabulary of the colour allow-list.
///
/// Palette PNGs are expanded to RGB/RGBA by the decoder and report as such.
pub fn color_mode_name(color: ColorType) -> &'static str {
    match color {
        ColorType::L8 => "L",
        ColorType::La8 => "LA",
        ColorType::Rgb8 => "RGB",
        ColorType::Rgba8 => "RGBA",
        ColorType::L16 => "I;16",
        ColorType::La16 => "LA;16",
        ColorType::Rgb16 => "RGB;16",
        ColorType::Rgba16 => "RGBA;16",
        ColorType::Rgb32F => "RGB;F",
        ColorType::Rgba32F => "RGBA;F",
        _ => "unknown",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageFormat, Rgb, RgbImage};

    fn write_png(dir: &Path, name: &str, w: u32, h: u32) -> PathBuf {
        let path = dir.join(name);
        let img = RgbImage::from_fn(w, h, |x, y| Rgb([(x % 256) as u8, (y % 256) as u8, 90]));
        img.save_with_format(&path, ImageFormat::Png).unwrap();
        path
    }

    #[test]
    fn test_probe_loads_png() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_png(dir.path(), "street.PNG", 320, 240);
        let probe = ImageProbe::load(&path, &LogContext::new("test-report"));

        assert!(probe.exists);
        assert_eq!(probe.extension.as_deref(), Some(".png"));
        assert_eq!(probe.file_name, "street.PNG");
        assert_eq!(probe.dimensions(), Some((320, 240)));
        assert!(probe.image.is_ok());
        assert!(probe.gray.is_some());
        assert!(probe.metadata.is_none());
        assert_eq!(probe.sha256.as_ref().map(|h| h.len()), Some(64));
        assert!((probe.aspect_ratio().unwrap() - 4.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_probe_missing_file() {
        let probe = ImageProbe::load(
            Path::new("/nonexistent/photo.jpg"),
            &LogContext::new("test-report"),
        );
        assert!(!probe.exists);
        assert!(probe.file_size.is_err());
        assert!(probe.image.is_err());
        assert_eq!(probe.dimensions(), None);
    }

    #[test]
    fn test_probe_garbage_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.jpg");
        fs::write(&path, vec![0xAB; 20_000]).unwrap();
        let probe = ImageProbe::load(&path, &LogContext::new("test-report"));
        assert!(probe.exists);
        assert_eq!(probe.file_size, Ok(20_000));
        assert!(probe.image.is_err());
        assert!(probe.sha256.is_some());
    }

    #[test]
    fn test_oversized_file_is_still_decoded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("large.png");
        let mut state: u32 = 0x9E37_79B9;
        let img = RgbImage::from_fn(2200, 2200, |_, _| {
            state ^= state << 13;
            state ^= state >> 17;
            state ^= state << 5;
            Rgb([state as u8, (state >> 8) as u8, (state >> 16) as u8])
        });
        img.save_with_format(&path, ImageFormat::Png).unwrap();

        let probe = ImageProbe::load(&path, &LogContext::new("test-report"));
        assert!(*probe.file_size.as_ref().unwrap() > crate::validation::checks::MAX_FILE_SIZE);
        assert_eq!(probe.dimensions(), Some((2200, 2200)));
        assert!(probe.image.is_ok());
        assert!(probe.gray.is_some());
    }

    #[test]
    fn test_color_mode_names() {
        assert_eq!(color_mode_name(ColorType::Rgb8), "RGB");
        assert_eq!(color_mode_name(ColorType::L8), "L");
        assert_eq!(color_mode_name(ColorType::Rgba16), "RGBA;16");
    }
}
