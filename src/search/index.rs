//! Catalog embedding index.
//!
//! Holds exactly one embedding per catalog entry, positionally aligned with the
//! catalog. Built once at startup and read-only afterwards, so it can be shared
//! across request threads without locking.

use std::cmp::Ordering;
use std::time::{Duration, Instant};

use indicatif::ProgressBar;
use rayon::prelude::*;

use super::source::{FetchError, ImageSource};
use crate::catalog::{Catalog, CatalogEntry};
use crate::vision::{EmbedError, Embedding, EmbeddingExtractor};

/// Errors that can occur when assembling an index from explicit parts.
#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    #[error("index must contain at least one entry")]
    Empty,

    #[error("{entries} catalog entries but {embeddings} embeddings")]
    Misaligned { entries: usize, embeddings: usize },
}

/// Why a single row fell back to a random embedding.
#[derive(Debug, thiserror::Error)]
enum RowError {
    #[error("fetch: {0}")]
    Fetch(#[from] FetchError),

    #[error("embed: {0}")]
    Embed(#[from] EmbedError),
}

/// Position and score of one ranked catalog entry.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoredMatch {
    pub position: usize,
    pub score: f32,
}

/// Summary of an index build.
#[derive(Debug, Clone)]
pub struct BuildReport {
    pub total: usize,
    pub degraded: usize,
    pub elapsed: Duration,
}

pub struct CatalogIndex {
    entries: Vec<CatalogEntry>,
    embeddings: Vec<Embedding>,
    /// Rows whose embedding is the random fallback
    degraded: Vec<bool>,
}

impl CatalogIndex {
    /// Assemble an index from precomputed embeddings.
    pub fn from_parts(
        entries: Vec<CatalogEntry>,
        embeddings: Vec<Embedding>,
    ) -> Result<Self, IndexError> {
        if entries.is_empty() {
            return Err(IndexError::Empty);
        }

        if entries.len() != embeddings.len() {
            return Err(IndexError::Misaligned {
                entries: entries.len(),
                embeddings: embeddings.len(),
            });
        }

        let degraded = vec![false; entries.len()];
        Ok(Self {
            entries,
            embeddings,
            degraded,
        })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn entries(&self) -> &[CatalogEntry] {
        &self.entries
    }

    pub fn entry(&self, position: usize) -> Option<&CatalogEntry> {
        self.entries.get(position)
    }

    pub fn embedding(&self, position: usize) -> Option<&Embedding> {
        self.embeddings.get(position)
    }

    /// Whether the row at `position` uses the random fallback embedding.
    pub fn is_degraded(&self, position: usize) -> bool {
        self.degraded.get(position).copied().unwrap_or(false)
    }

    /// Dot product of every row against the query, in catalog order.
    pub fn scores(&self, query: &Embedding) -> Vec<f32> {
        self.embeddings.iter().map(|e| e.dot(query)).collect()
    }

    /// The `k` highest scoring rows, best first.
    ///
    /// Equal scores keep catalog order. `k` larger than the index returns every row.
    pub fn top_k(&self, query: &Embedding, k: usize) -> Vec<ScoredMatch> {
        let mut ranked: Vec<ScoredMatch> = self
            .scores(query)
            .into_iter()
            .enumerate()
            .map(|(position, score)| ScoredMatch { position, score })
            .collect();

        // sort_by is stable, so ties stay in catalog order
        ranked.sort_by(|a, b| by_score_desc(a.score, b.score));
        ranked.truncate(k);
        ranked
    }
}

/// Descending by score; NaN sorts after every number so the order stays total.
fn by_score_desc(a: f32, b: f32) -> Ordering {
    match (a.is_nan(), b.is_nan()) {
        (false, false) => b.partial_cmp(&a).unwrap_or(Ordering::Equal),
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (true, true) => Ordering::Equal,
    }
}

/// Builds a [`CatalogIndex`] by fetching and embedding every catalog image.
pub struct IndexBuilder<'a> {
    extractor: &'a EmbeddingExtractor,
    source: &'a dyn ImageSource,
    parallelism: Option<usize>,
    progress: Option<ProgressBar>,
}

impl<'a> IndexBuilder<'a> {
    pub fn new(extractor: &'a EmbeddingExtractor, source: &'a dyn ImageSource) -> Self {
        Self {
            extractor,
            source,
            parallelism: None,
            progress: None,
        }
    }

    /// Limit build threads. `None` uses the global rayon pool.
    pub fn with_parallelism(mut self, parallelism: Option<usize>) -> Self {
        self.parallelism = parallelism;
        self
    }

    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Embed every entry. A failing entry gets a random unit embedding instead of
    /// aborting, so the index always covers the whole catalog.
    pub fn build(&self, catalog: Catalog) -> (CatalogIndex, BuildReport) {
        let started = Instant::now();
        let entries = catalog.into_entries();

        if let Some(progress) = &self.progress {
            progress.set_length(entries.len() as u64);
        }

        let rows: Vec<(Embedding, bool)> = match self.parallelism {
            Some(threads) => match rayon::ThreadPoolBuilder::new().num_threads(threads).build() {
                Ok(pool) => pool.install(|| self.embed_all(&entries)),
                Err(e) => {
                    log::warn!("failed to create build pool ({e}), using global pool");
                    self.embed_all(&entries)
                }
            },
            None => self.embed_all(&entries),
        };

        if let Some(progress) = &self.progress {
            progress.finish_and_clear();
        }

        let (embeddings, degraded): (Vec<Embedding>, Vec<bool>) = rows.into_iter().unzip();
        let report = BuildReport {
            total: entries.len(),
            degraded: degraded.iter().filter(|d| **d).count(),
            elapsed: started.elapsed(),
        };

        log::info!(
            "catalog index built: rows={} degraded={} elapsed={:?}",
            report.total,
            report.degraded,
            report.elapsed
        );

        let index = CatalogIndex {
            entries,
            embeddings,
            degraded,
        };
        (index, report)
    }

    // par_iter + collect keeps the output in catalog order
    fn embed_all(&self, entries: &[CatalogEntry]) -> Vec<(Embedding, bool)> {
        entries
            .par_iter()
            .map(|entry| {
                let row = match self.embed_entry(entry) {
                    Ok(embedding) => (embedding, false),
                    Err(e) => {
                        log::warn!("entry={} outcome=fallback err={e}", entry.id);
                        (Embedding::random(&mut rand::rng()), true)
                    }
                };

                if let Some(progress) = &self.progress {
                    progress.inc(1);
                }

                row
            })
            .collect()
    }

    fn embed_entry(&self, entry: &CatalogEntry) -> Result<Embedding, RowError> {
        let bytes = self.source.fetch(&entry.image_url)?;
        Ok(self.extractor.embed_bytes(&bytes)?)
    }
}
