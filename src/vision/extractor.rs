use std::sync::Arc;

use image::RgbImage;

use super::backbone::Backbone;
use super::preprocess::{decode_rgb, preprocess};
use super::{EmbedError, Embedding};

/// Maps an image to a unit-norm embedding.
///
/// Stateless apart from the backbone; safe to share across request threads.
#[derive(Clone)]
pub struct EmbeddingExtractor {
    backbone: Arc<dyn Backbone>,
}

impl EmbeddingExtractor {
    pub fn new(backbone: Arc<dyn Backbone>) -> Self {
        Self { backbone }
    }

    pub fn backbone_name(&self) -> &str {
        self.backbone.name()
    }

    /// Embed an already decoded RGB raster.
    pub fn embed(&self, img: &RgbImage) -> Result<Embedding, EmbedError> {
        let tensor = preprocess(img)?;
        let features = self.backbone.forward(&tensor)?;
        Embedding::from_features(features)
    }

    /// Decode and embed raw image bytes.
    pub fn embed_bytes(&self, bytes: &[u8]) -> Result<Embedding, EmbedError> {
        let img = decode_rgb(bytes)?;
        self.embed(&img)
    }
}
