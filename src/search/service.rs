use std::sync::Arc;

use image::RgbImage;

use super::index::CatalogIndex;
use crate::catalog::CatalogEntry;
use crate::vision::preprocess::decode_rgb;
use crate::vision::{EmbedError, EmbeddingExtractor};

/// A ranked catalog match with its similarity score.
#[derive(Debug, Clone)]
pub struct SearchHit<'a> {
    pub position: usize,
    pub score: f32,
    pub entry: &'a CatalogEntry,
}

/// Ranks catalog entries by visual similarity to a query image.
///
/// Decode and size errors from the extractor are returned to the caller as-is.
#[derive(Clone)]
pub struct SimilaritySearch {
    index: Arc<CatalogIndex>,
    extractor: EmbeddingExtractor,
}

impl SimilaritySearch {
    pub fn new(index: Arc<CatalogIndex>, extractor: EmbeddingExtractor) -> Self {
        Self { index, extractor }
    }

    pub fn index(&self) -> &CatalogIndex {
        &self.index
    }

    /// Top `top_k` catalog entries for raw image bytes, best first.
    pub fn search(&self, image: &[u8], top_k: usize) -> Result<Vec<&CatalogEntry>, EmbedError> {
        Ok(self
            .search_scored(image, top_k)?
            .into_iter()
            .map(|hit| hit.entry)
            .collect())
    }

    /// Same as `search()` but keeps positions and scores.
    pub fn search_scored(&self, image: &[u8], top_k: usize) -> Result<Vec<SearchHit<'_>>, EmbedError> {
        let img = decode_rgb(image)?;
        self.search_image(&img, top_k)
    }

    /// Search with an already decoded image.
    pub fn search_image(&self, img: &RgbImage, top_k: usize) -> Result<Vec<SearchHit<'_>>, EmbedError> {
        let query = self.extractor.embed(img)?;

        let hits = self
            .index
            .top_k(&query, top_k)
            .into_iter()
            .filter_map(|m| {
                self.index.entry(m.position).map(|entry| SearchHit {
                    position: m.position,
                    score: m.score,
                    entry,
                })
            })
            .collect::<Vec<_>>();

        log::debug!(
            "image search: top_k={top_k} returned={} best={:?}",
            hits.len(),
            hits.first().map(|h| (&h.entry.id, h.score))
        );

        Ok(hits)
    }
}
