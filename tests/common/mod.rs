//! Fixtures shared by the integration tests: synthetic photos with EXIF,
//! and offline stand-ins for the model and the lookup services.

#![allow(dead_code)]

use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use exif::experimental::Writer;
use exif::{Field, In, Rational, Tag, Value};
use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, ExtendedColorType, Rgb, RgbImage};
use parking_lot::Mutex;

use streetlight_core::classification::{
    ImageTensor, InferenceBackend, IssueClassifier, ModelCheckpoint,
};
use streetlight_core::geo::GeoPoint;
use streetlight_core::location::{
    Address, LandmarkCategory, LandmarkHit, LandmarkSource, LocationVerifier, LookupFailure,
    LookupResult, ReverseGeocoder,
};
use streetlight_core::logging::LogContext;
use streetlight_core::{AgentConfig, LayerOrchestrator};

pub const LAHORE: (f64, f64) = (31.5204, 74.3587);

pub const MANIFEST: &str = r#"{
    "model_name": "ResNet18",
    "idx_to_class": {"0": "garbage", "1": "other", "2": "pothole"},
    "class_to_idx": {"garbage": 0, "other": 1, "pothole": 2},
    "val_accuracy": 94.1,
    "config": {"num_classes": 3}
}"#;

pub const GARBAGE: usize = 0;
pub const OTHER: usize = 1;
pub const POTHOLE: usize = 2;

/// Deterministic mid-grey noise: sharp, well lit, high variance.
pub fn noisy_photo(width: u32, height: u32) -> DynamicImage {
    let mut state: u32 = 0x2545_F491;
    let mut next = move || {
        state ^= state << 13;
        state ^= state >> 17;
        state ^= state << 5;
        (60 + state % 140) as u8
    };
    DynamicImage::ImageRgb8(RgbImage::from_fn(width, height, |_, _| {
        Rgb([next(), next(), next()])
    }))
}

pub fn encode_jpeg(image: &DynamicImage) -> Vec<u8> {
    let rgb = image.to_rgb8();
    let mut buf = Vec::new();
    JpegEncoder::new_with_quality(&mut buf, 90)
        .encode(rgb.as_raw(), rgb.width(), rgb.height(), ExtendedColorType::Rgb8)
        .unwrap();
    buf
}

fn to_dms(decimal: f64) -> Vec<Rational> {
    let decimal = decimal.abs();
    let degrees = decimal.trunc();
    let minutes_full = (decimal - degrees) * 60.0;
    let minutes = minutes_full.trunc();
    let seconds = (minutes_full - minutes) * 60.0;
    vec![
        Rational { num: degrees as u32, denom: 1 },
        Rational { num: minutes as u32, denom: 1 },
        Rational { num: (seconds * 10_000.0).round() as u32, denom: 10_000 },
    ]
}

fn ascii(tag: Tag, text: &str) -> Field {
    Field {
        tag,
        ifd_num: In::PRIMARY,
        value: Value::Ascii(vec![text.as_bytes().to_vec()]),
    }
}

/// TIFF-structured EXIF block with camera fields, capture time and GPS.
pub fn camera_exif(gps: Option<(f64, f64)>, captured: &str) -> Vec<u8> {
    let mut fields = vec![
        ascii(Tag::Make, "Google"),
        ascii(Tag::Model, "Pixel 7"),
        ascii(Tag::DateTime, captured),
        ascii(Tag::DateTimeOriginal, captured),
        ascii(Tag::DateTimeDigitized, captured),
    ];
    if let Some((lat, lon)) = gps {
        fields.push(Field {
            tag: Tag::GPSLatitude,
            ifd_num: In::PRIMARY,
            value: Value::Rational(to_dms(lat)),
        });
        fields.push(ascii(Tag::GPSLatitudeRef, if lat >= 0.0 { "N" } else { "S" }));
        fields.push(Field {
            tag: Tag::GPSLongitude,
            ifd_num: In::PRIMARY,
            value: Value::Rational(to_dms(lon)),
        });
        fields.push(ascii(Tag::GPSLongitudeRef, if lon >= 0.0 { "E" } else { "W" }));
    }

    let mut writer = Writer::new();
    for field in &fields {
        writer.push_field(field);
    }
    let mut buf = Cursor::new(Vec::new());
    writer.write(&mut buf, false).unwrap();
    buf.into_inner()
}

/// Insert an APP1 `Exif` segment right after the JPEG SOI marker.
pub fn with_exif(jpeg: &[u8], tiff: &[u8]) -> Vec<u8> {
    assert_eq!(&jpeg[..2], &[0xFF, 0xD8], "not a JPEG");
    let len = (2 + 6 + tiff.len()) as u16;

    let mut out = Vec::with_capacity(jpeg.len() + tiff.len() + 10);
    out.extend_from_slice(&jpeg[..2]);
    out.extend_from_slice(&[0xFF, 0xE1]);
    out.extend_from_slice(&len.to_be_bytes());
    out.extend_from_slice(b"Exif\0\0");
    out.extend_from_slice(tiff);
    out.extend_from_slice(&jpeg[2..]);
    out
}

pub fn now_exif_timestamp() -> String {
    chrono::Local::now().format("%Y:%m:%d %H:%M:%S").to_string()
}

/// 1000x1000 camera JPEG taken just now at `gps`.
pub fn camera_photo(dir: &Path, name: &str, gps: Option<(f64, f64)>) -> PathBuf {
    let jpeg = encode_jpeg(&noisy_photo(1000, 1000));
    let bytes = with_exif(&jpeg, &camera_exif(gps, &now_exif_timestamp()));
    let path = dir.join(name);
    std::fs::write(&path, bytes).unwrap();
    path
}

/// Returns logits whose softmax gives `p` to `winner`.
pub struct FixedModel {
    pub winner: usize,
    pub p: f32,
}

impl InferenceBackend for FixedModel {
    fn name(&self) -> &str {
        "fixed"
    }

    fn logits(&self, input: &ImageTensor) -> anyhow::Result<Vec<f32>> {
        assert_eq!(input.shape(), (1, 3, 224, 224));
        let rest = (1.0 - self.p) / 2.0;
        Ok((0..3)
            .map(|i| if i == self.winner { self.p.ln() } else { rest.ln() })
            .collect())
    }
}

pub struct FailingModel;

impl InferenceBackend for FailingModel {
    fn name(&self) -> &str {
        "failing"
    }

    fn logits(&self, _input: &ImageTensor) -> anyhow::Result<Vec<f32>> {
        anyhow::bail!("accelerator unavailable")
    }
}

/// Geocoder that records calls; optionally always times out.
#[derive(Default)]
pub struct StubGeocoder {
    pub calls: Mutex<Vec<GeoPoint>>,
    pub offline: bool,
}

impl ReverseGeocoder for StubGeocoder {
    fn reverse(&self, point: GeoPoint, _ctx: &LogContext) -> LookupResult<Address> {
        self.calls.lock().push(point);
        if self.offline {
            return Err(LookupFailure::Timeout);
        }
        Ok(Address {
            display_name: "Mall Road, Lahore, Punjab, Pakistan".into(),
            road: "Mall Road".into(),
            city: "Lahore".into(),
            state: "Punjab".into(),
            country: "Pakistan".into(),
            ..Address::default()
        })
    }
}

/// `count` landmarks around the centre, or a failure when offline.
pub struct StubLandmarks {
    pub count: usize,
    pub offline: bool,
}

impl LandmarkSource for StubLandmarks {
    fn nearby(
        &self,
        center: GeoPoint,
        _radius_m: u32,
        limit: usize,
        _ctx: &LogContext,
    ) -> LookupResult<Vec<LandmarkHit>> {
        if self.offline {
            return Err(LookupFailure::Status(504));
        }
        Ok((0..self.count.min(limit))
            .map(|i| LandmarkHit {
                name: format!("Landmark {}", i),
                kind: "school".into(),
                category: LandmarkCategory::Amenity,
                distance_m: 25.0 * (i + 1) as f64,
                latitude: center.latitude,
                longitude: center.longitude,
            })
            .collect())
    }
}

pub struct Harness {
    pub agent: LayerOrchestrator,
    pub geocoder: Arc<StubGeocoder>,
}

pub fn harness(
    backend: Box<dyn InferenceBackend>,
    landmarks: StubLandmarks,
    geocoder_offline: bool,
) -> Harness {
    let geocoder = Arc::new(StubGeocoder {
        offline: geocoder_offline,
        ..StubGeocoder::default()
    });
    let verifier = LocationVerifier::new(geocoder.clone(), Arc::new(landmarks), 500, 5);
    let checkpoint = ModelCheckpoint::from_manifest_json(MANIFEST, Path::new("models")).unwrap();
    let classifier = IssueClassifier::new(checkpoint, backend, 0.5, verifier).unwrap();
    let agent = LayerOrchestrator::new(AgentConfig::default(), classifier).unwrap();
    Harness { agent, geocoder }
}

pub fn online_agent(winner: usize, p: f32, landmarks: usize) -> Harness {
    harness(
        Box::new(FixedModel { winner, p }),
        StubLandmarks {
            count: landmarks,
            offline: false,
        },
        false,
    )
}
