//! Classifier checkpoint, input tensor and the inference seam.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use image::imageops::FilterType;
use image::DynamicImage;
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};

pub const MANIFEST_FILE: &str = "manifest.json";
pub const WEIGHTS_FILE: &str = "model.safetensors";

/// Square input side expected by the network.
pub const IMAGE_SIZE: u32 = 224;
pub const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
pub const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];

/// Label the model uses for "not a civic issue".
pub const NON_ISSUE_LABEL: &str = "other";

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TrainingConfig {
    pub num_classes: usize,
    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

/// `manifest.json` as written by the training job.
#[derive(Debug, Clone, Deserialize)]
struct Manifest {
    #[serde(default = "default_model_name")]
    model_name: String,
    idx_to_class: HashMap<String, String>,
    #[serde(default)]
    class_to_idx: HashMap<String, usize>,
    val_accuracy: f64,
    config: TrainingConfig,
}

fn default_model_name() -> String {
    "ResNet18".to_string()
}

/// Versioned classifier artifact: label mapping plus accuracy figure.
#[derive(Debug, Clone)]
pub struct ModelCheckpoint {
    pub dir: PathBuf,
    pub model_name: String,
    /// Label per output index.
    pub class_names: Vec<String>,
    pub val_accuracy: f64,
    pub config: TrainingConfig,
}

impl ModelCheckpoint {
    /// Load and check `manifest.json` from `dir`.
    pub fn load(dir: &Path) -> Result<Self> {
        let manifest_path = dir.join(MANIFEST_FILE);
        let raw = fs::read_to_string(&manifest_path).map_err(|e| {
            CoreError::ModelLoad(format!("{}: {}", manifest_path.display(), e))
        })?;
        let checkpoint = Self::from_manifest_json(&raw, dir)?;

        log::info!(
            "MODEL_CHECKPOINT_LOADED dir={} model={} classes={:?} val_accuracy={:.2}",
            dir.display(),
            checkpoint.model_name,
            checkpoint.class_names,
            checkpoint.val_accuracy
        );
        Ok(checkpoint)
    }

    pub fn from_manifest_json(raw: &str, dir: &Path) -> Result<Self> {
        let manifest: Manifest = serde_json::from_str(raw)
            .map_err(|e| CoreError::ModelLoad(format!("malformed manifest: {}", e)))?;

        let n = manifest.config.num_classes;
        if manifest.idx_to_class.len() != n {
            return Err(CoreError::ModelLoad(format!(
                "label map has {} entries but config.num_classes is {}",
                manifest.idx_to_class.len(),
                n
            )));
        }

        let mut class_names = vec![String::new(); n];
        for (idx, label) in &manifest.idx_to_class {
            let i: usize = idx
                .parse()
                .map_err(|_| CoreError::ModelLoad(format!("non-numeric class index '{}'", idx)))?;
            if i >= n {
                return Err(CoreError::ModelLoad(format!(
                    "class index {} out of range for {} classes",
                    i, n
                )));
            }
            class_names[i] = label.clone();
        }
        if class_names.iter().any(|c| c.is_empty()) {
            return Err(CoreError::ModelLoad("label map has gaps".to_string()));
        }

        for (label, &idx) in &manifest.class_to_idx {
            if class_names.get(idx) != Some(label) {
                return Err(CoreError::ModelLoad(format!(
                    "class_to_idx disagrees with idx_to_class for '{}'",
                    label
                )));
            }
        }

        Ok(Self {
            dir: dir.to_path_buf(),
            model_name: manifest.model_name,
            class_names,
            val_accuracy: manifest.val_accuracy,
            config: manifest.config,
        })
    }

    pub fn num_classes(&self) -> usize {
        self.class_names.len()
    }

    pub fn weights_path(&self) -> PathBuf {
        self.dir.join(WEIGHTS_FILE)
    }
}

/// Normalised NCHW input, batch of one.
#[derive(Debug, Clone)]
pub struct ImageTensor {
    /// `[3, IMAGE_SIZE, IMAGE_SIZE]` row-major, channel first.
    pub data: Vec<f32>,
    pub size: u32,
}

impl ImageTensor {
    pub fn shape(&self) -> (usize, usize, usize, usize) {
        (1, 3, self.size as usize, self.size as usize)
    }
}

/// RGB, bilinear resize to 224x224, ImageNet normalisation, CHW layout.
pub fn preprocess(image: &DynamicImage) -> ImageTensor {
    let rgb = image.to_rgb8();
    let resized = image::imageops::resize(&rgb, IMAGE_SIZE, IMAGE_SIZE, FilterType::Triangle);

    let plane = (IMAGE_SIZE * IMAGE_SIZE) as usize;
    let mut data = vec![0.0f32; 3 * plane];
    for (i, pixel) in resized.pixels().enumerate() {
        for c in 0..3 {
            let v = pixel.0[c] as f32 / 255.0;
            data[c * plane + i] = (v - IMAGENET_MEAN[c]) / IMAGENET_STD[c];
        }
    }

    ImageTensor {
        data,
        size: IMAGE_SIZE,
    }
}

/// Numerically stable softmax.
pub fn softmax(logits: &[f32]) -> Vec<f32> {
    let max = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = logits.iter().map(|&l| (l - max).exp()).collect();
    let sum: f32 = exps.iter().sum();
    exps.into_iter().map(|e| e / sum).collect()
}

/// Black-box image classifier.
///
/// Returns raw logits, one per class of the loaded checkpoint.
pub trait InferenceBackend: Send + Sync {
    fn name(&self) -> &str;
    fn logits(&self, input: &ImageTensor) -> anyhow::Result<Vec<f32>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    const MANIFEST: &str = r#"{
        "model_name": "ResNet18",
        "idx_to_class": {"0": "garbage", "1": "other", "2": "pothole"},
        "class_to_idx": {"garbage": 0, "other": 1, "pothole": 2},
        "val_accuracy": 93.75,
        "config": {"num_classes": 3, "epochs": 25, "lr": 0.001}
    }"#;

    #[test]
    fn test_manifest_parses() {
        let cp = ModelCheckpoint::from_manifest_json(MANIFEST, Path::new("models")).unwrap();
        assert_eq!(cp.class_names, vec!["garbage", "other", "pothole"]);
        assert_eq!(cp.num_classes(), 3);
        assert_eq!(cp.val_accuracy, 93.75);
        assert_eq!(cp.config.extra["epochs"], 25);
        assert_eq!(cp.weights_path(), Path::new("models/model.safetensors"));
    }

    #[test]
    fn test_manifest_class_count_mismatch() {
        let raw = MANIFEST.replace("\"num_classes\": 3", "\"num_classes\": 4");
        let err = ModelCheckpoint::from_manifest_json(&raw, Path::new("m")).unwrap_err();
        assert!(err.is_startup_fatal());
    }

    #[test]
    fn test_missing_manifest_is_model_load_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = ModelCheckpoint::load(dir.path()).unwrap_err();
        assert!(matches!(err, CoreError::ModelLoad(_)));
    }

    #[test]
    fn test_preprocess_shape_and_normalisation() {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(640, 480, Rgb([255, 0, 128])));
        let tensor = preprocess(&img);
        assert_eq!(tensor.shape(), (1, 3, 224, 224));
        assert_eq!(tensor.data.len(), 3 * 224 * 224);

        let plane = 224 * 224;
        let red = tensor.data[0];
        let green = tensor.data[plane];
        assert!((red - (1.0 - 0.485) / 0.229).abs() < 1e-4);
        assert!((green - (0.0 - 0.456) / 0.224).abs() < 1e-4);
    }

    #[test]
    fn test_softmax() {
        let p = softmax(&[2.0, 1.0, 0.1]);
        assert!((p.iter().sum::<f32>() - 1.0).abs() < 1e-6);
        assert!(p[0] > p[1] && p[1] > p[2]);

        let p = softmax(&[1000.0, 1000.0]);
        assert!((p[0] - 0.5).abs() < 1e-6);
    }
}
