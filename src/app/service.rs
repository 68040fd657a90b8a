use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use indicatif::ProgressBar;
use serde::Serialize;

use super::errors::AppError;
use crate::catalog::Catalog;
use crate::config::Config;
use crate::history::{HistoryEntry, HistoryItem, HistoryLedger, QueryType};
use crate::offers::{enrich, enrich_all, EnrichedProduct, RawProduct};
use crate::scrape::{LinkOutcome, ScraperRegistry};
use crate::search::{BuildReport, CatalogIndex, HttpImageSource, IndexBuilder, SimilaritySearch};
use crate::vision::{EmbeddingExtractor, OnnxBackbone};

/// Session used when a request does not name one
pub const DEFAULT_SESSION: &str = "anonymous";

#[derive(Debug, Clone, Serialize)]
pub struct SearchResponse {
    pub query_type: QueryType,
    pub results: Vec<EnrichedProduct>,
}

#[derive(Debug, Clone)]
pub enum LinkResponse {
    Unsupported,
    Found(SearchResponse),
}

#[derive(Debug, Clone, Serialize)]
pub struct HistoryResponse {
    pub session_id: String,
    pub history: Vec<HistoryItem>,
}

/// Query entry points over the catalog index, scrapers and history.
///
/// Query methods block: image search is CPU bound and link lookups do network I/O.
/// They never touch history; callers record a query once its result is delivered.
pub struct App {
    search: SimilaritySearch,
    scrapers: ScraperRegistry,
    history: HistoryLedger,
    top_k: usize,
}

impl App {
    /// Load the catalog and model, then build the catalog index.
    ///
    /// Blocks on network I/O for every catalog image. Must run before any async
    /// runtime is started on this thread.
    pub fn build(config: &Config, progress: Option<ProgressBar>) -> anyhow::Result<(Self, BuildReport)> {
        let catalog_path = config.resolve(&config.catalog.path);
        let catalog = Catalog::load_or_init(&catalog_path)
            .with_context(|| format!("failed to load catalog {}", catalog_path.display()))?;

        let model_path = config.resolve(&config.embedding.model_path);
        let backbone = OnnxBackbone::load(&model_path, config.embedding.intra_threads)
            .context("failed to load image backbone")?;
        let extractor = EmbeddingExtractor::new(Arc::new(backbone));

        let source = HttpImageSource::new(Duration::from_secs(config.catalog.fetch_timeout_secs))
            .context("failed to create image client")?;

        log::info!(
            "building catalog index: entries={} backbone={}",
            catalog.len(),
            extractor.backbone_name()
        );

        let mut builder =
            IndexBuilder::new(&extractor, &source).with_parallelism(config.catalog.parallelism());
        if let Some(progress) = progress {
            builder = builder.with_progress(progress);
        }
        let (index, report) = builder.build(catalog);

        let app = Self::new_with(
            SimilaritySearch::new(Arc::new(index), extractor),
            ScraperRegistry::with_defaults(&config.scrape),
            HistoryLedger::new(config.history.capacity),
            config.search.top_k,
        );

        Ok((app, report))
    }

    pub fn new_with(
        search: SimilaritySearch,
        scrapers: ScraperRegistry,
        history: HistoryLedger,
        top_k: usize,
    ) -> Self {
        Self {
            search,
            scrapers,
            history,
            top_k,
        }
    }

    pub fn index(&self) -> &CatalogIndex {
        self.search.index()
    }

    /// Image query with the configured result count.
    pub fn search_image(&self, image: &[u8]) -> Result<SearchResponse, AppError> {
        self.search_image_top(image, self.top_k)
    }

    pub fn search_image_top(&self, image: &[u8], top_k: usize) -> Result<SearchResponse, AppError> {
        let products: Vec<RawProduct> = self
            .search
            .search(image, top_k)?
            .into_iter()
            .map(RawProduct::from)
            .collect();

        let results = enrich_all(&products)?;

        log::info!("query=image results={}", results.len());

        Ok(SearchResponse {
            query_type: QueryType::Image,
            results,
        })
    }

    /// Link query. Unrecognized marketplaces are a normal response, not an error.
    pub fn search_link(&self, url: &str) -> Result<LinkResponse, AppError> {
        lookup_link(&self.scrapers, url)
    }

    /// Append a delivered query result to the session's history.
    pub fn record(&self, session_id: &str, response: &SearchResponse, source_url: Option<String>) {
        let first_title = response.results.first().map(|p| p.title.clone());
        self.history.record(
            session_id,
            HistoryEntry::new(response.query_type, source_url, first_title),
        );
    }

    pub fn history(&self, session_id: &str) -> HistoryResponse {
        HistoryResponse {
            session_id: session_id.to_string(),
            history: self.history.list(session_id),
        }
    }
}

/// Scrape a product link into a single-offer result.
///
/// Pages missing a title, image or price still produce a result with
/// placeholder values.
pub fn lookup_link(scrapers: &ScraperRegistry, url: &str) -> Result<LinkResponse, AppError> {
    let raw = match scrapers.lookup(url)? {
        LinkOutcome::Unsupported => {
            log::info!("query=link outcome=unsupported url={url}");
            return Ok(LinkResponse::Unsupported);
        }
        LinkOutcome::Found(raw) => raw,
    };

    let product = enrich(&RawProduct::from_raw_offer(raw))?;

    log::info!("query=link outcome=found platform={}", product.best_platform);

    Ok(LinkResponse::Found(SearchResponse {
        query_type: QueryType::Link,
        results: vec![product],
    }))
}
