//! Frozen convolutional feature extractor.
//!
//! The model is a ResNet-18 exported to ONNX with its final fully-connected
//! layer replaced by identity, so the output is the 512-d pooled feature
//! vector rather than class scores.

use std::path::Path;
use std::sync::Mutex;

use ort::session::{builder::GraphOptimizationLevel, Session};

use super::preprocess::PixelTensor;
use super::{EmbedError, EMBEDDING_DIM};

/// Forward pass from a preprocessed tensor to raw (unnormalized) features.
pub trait Backbone: Send + Sync {
    fn forward(&self, input: &PixelTensor) -> Result<Vec<f32>, EmbedError>;

    /// Get the name of this backbone for logging
    fn name(&self) -> &str;
}

/// ONNX Runtime backed backbone.
/// Uses a Mutex because `Session::run` requires &mut self.
pub struct OnnxBackbone {
    session: Mutex<Session>,
    input_name: String,
    output_name: String,
    model_name: String,
}

impl OnnxBackbone {
    /// Load the model file and prepare an inference session.
    pub fn load(model_path: &Path, intra_threads: usize) -> Result<Self, EmbedError> {
        if !model_path.exists() {
            return Err(EmbedError::Backbone(format!(
                "model file not found: {}",
                model_path.display()
            )));
        }

        let session = Session::builder()
            .and_then(|b| b.with_optimization_level(GraphOptimizationLevel::Level3))
            .and_then(|b| b.with_intra_threads(intra_threads))
            .and_then(|b| b.commit_from_file(model_path))
            .map_err(|e| EmbedError::Backbone(format!("failed to load model: {e}")))?;

        let input_name = session
            .inputs
            .first()
            .map(|i| i.name.clone())
            .ok_or_else(|| EmbedError::Backbone("model has no inputs".to_string()))?;
        let output_name = session
            .outputs
            .first()
            .map(|o| o.name.clone())
            .ok_or_else(|| EmbedError::Backbone("model has no outputs".to_string()))?;

        let model_name = model_path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "onnx".to_string());

        log::info!("loaded backbone={model_name} input={input_name} output={output_name}");

        Ok(Self {
            session: Mutex::new(session),
            input_name,
            output_name,
            model_name,
        })
    }
}

impl Backbone for OnnxBackbone {
    fn forward(&self, input: &PixelTensor) -> Result<Vec<f32>, EmbedError> {
        let tensor = ort::value::Tensor::from_array((input.shape.to_vec(), input.data.clone()))
            .map_err(|e| EmbedError::Backbone(e.to_string()))?;

        let mut session = self
            .session
            .lock()
            .map_err(|e| EmbedError::Backbone(format!("Failed to acquire model lock: {}", e)))?;

        let outputs = session
            .run(ort::inputs![self.input_name.as_str() => tensor])
            .map_err(|e| EmbedError::Backbone(e.to_string()))?;

        let features = outputs
            .get(self.output_name.as_str())
            .ok_or_else(|| EmbedError::Backbone(format!("missing output {}", self.output_name)))?;

        let (_shape, data) = features
            .try_extract_tensor::<f32>()
            .map_err(|e| EmbedError::Backbone(e.to_string()))?;

        // [1, 512] and [1, 512, 1, 1] both flatten to the same vector
        if data.len() != EMBEDDING_DIM {
            return Err(EmbedError::Dimension {
                expected: EMBEDDING_DIM,
                got: data.len(),
            });
        }

        Ok(data.to_vec())
    }

    fn name(&self) -> &str {
        &self.model_name
    }
}
