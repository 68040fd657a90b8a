//! Image embedding pipeline for visual product search.
//!
//! Turns product photos into fixed-length unit vectors comparable by dot product.
//!
//! # Architecture
//!
//! - `preprocess`: decode, short-side resize, center crop, mean/std normalization
//! - `backbone`: frozen feature extractor (ONNX Runtime), head removed
//! - `embedding`: the normalized 512-d vector type
//! - `extractor`: the `embed(image)` entry point tying the stages together

pub mod backbone;
mod embedding;
mod extractor;
pub mod preprocess;

pub use backbone::{Backbone, OnnxBackbone};
pub use embedding::Embedding;
pub use extractor::EmbeddingExtractor;
pub use preprocess::PixelTensor;

/// Length of every embedding (penultimate pooled features of ResNet-18).
pub const EMBEDDING_DIM: usize = 512;

/// Errors produced while turning an image into an embedding.
#[derive(Debug, thiserror::Error)]
pub enum EmbedError {
    #[error("image could not be decoded: {0}")]
    Decode(String),

    #[error("image is too small: {width}x{height}, both sides must be at least {min}px")]
    TooSmall { width: u32, height: u32, min: u32 },

    #[error("feature extractor failed: {0}")]
    Backbone(String),

    #[error("feature extractor returned {got} values, expected {expected}")]
    Dimension { expected: usize, got: usize },
}
