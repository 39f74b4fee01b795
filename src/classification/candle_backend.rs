//! ResNet-18 inference on CPU via candle.
//!
//! Weights are a safetensors export of the torchvision state dict
//! (`conv1`, `bn1`, `layer1.0.conv1`, ..., `fc`).

use std::fs;

use candle_core::{DType, Device, Module, Tensor};
use candle_nn::{Func, VarBuilder};
use candle_transformers::models::resnet;

use crate::classification::model::{ImageTensor, InferenceBackend, ModelCheckpoint};
use crate::error::{CoreError, Result};

pub struct CandleResNet {
    model: Func<'static>,
    device: Device,
    name: String,
}

impl CandleResNet {
    pub fn load(checkpoint: &ModelCheckpoint) -> Result<Self> {
        let weights = checkpoint.weights_path();
        if !weights.exists() {
            return Err(CoreError::ModelLoad(format!(
                "weights not found: {}",
                weights.display()
            )));
        }

        let device = Device::Cpu;
        let buffer = fs::read(&weights)
            .map_err(|e| CoreError::ModelLoad(format!("{}: {}", weights.display(), e)))?;
        let vb = VarBuilder::from_buffered_safetensors(buffer, DType::F32, &device)
            .map_err(|e| CoreError::ModelLoad(format!("{}: {}", weights.display(), e)))?;
        let model = resnet::resnet18(checkpoint.num_classes(), vb)
            .map_err(|e| CoreError::ModelLoad(format!("resnet18: {}", e)))?;

        log::info!(
            "CANDLE_MODEL_LOADED weights={} classes={}",
            weights.display(),
            checkpoint.num_classes()
        );

        Ok(Self {
            model,
            device,
            name: format!("candle-cpu/{}", checkpoint.model_name),
        })
    }
}

impl InferenceBackend for CandleResNet {
    fn name(&self) -> &str {
        &self.name
    }

    fn logits(&self, input: &ImageTensor) -> anyhow::Result<Vec<f32>> {
        let x = Tensor::from_vec(input.data.clone(), input.shape(), &self.device)?;
        let out = self.model.forward(&x)?;
        Ok(out.squeeze(0)?.to_vec1::<f32>()?)
    }
}
