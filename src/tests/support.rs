//! Shared fixtures: synthetic images, in-memory image source, deterministic backbones.

use std::collections::HashMap;
use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use image::{DynamicImage, ImageFormat, Rgb, RgbImage};

use crate::app::App;
use crate::catalog::{Catalog, CatalogEntry};
use crate::history::HistoryLedger;
use crate::offers::{Offer, RawOffer};
use crate::scrape::{OfferScraper, Platform, ScrapeError, ScraperRegistry};
use crate::search::{FetchError, ImageSource, IndexBuilder, SimilaritySearch};
use crate::vision::{Backbone, EmbedError, Embedding, EmbeddingExtractor, PixelTensor, EMBEDDING_DIM};

fn encode_png(img: RgbImage) -> Vec<u8> {
    let mut buf = Vec::new();
    DynamicImage::ImageRgb8(img)
        .write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
        .expect("failed to encode png");
    buf
}

/// Gradient pattern; different seeds give visibly different images.
pub fn png_bytes(width: u32, height: u32, seed: u8) -> Vec<u8> {
    let seed = seed as u32;
    let img = RgbImage::from_fn(width, height, |x, y| {
        Rgb([
            ((x * 7 + seed * 31) % 256) as u8,
            ((y * 5 + seed * 17) % 256) as u8,
            (((x ^ y) + seed * 13) % 256) as u8,
        ])
    });
    encode_png(img)
}

pub fn solid_png(width: u32, height: u32, color: [u8; 3]) -> Vec<u8> {
    encode_png(RgbImage::from_pixel(width, height, Rgb(color)))
}

/// Averages the input tensor into 512 equal chunks.
pub struct PooledBackbone;

impl Backbone for PooledBackbone {
    fn forward(&self, input: &PixelTensor) -> Result<Vec<f32>, EmbedError> {
        let chunk = input.data.len() / EMBEDDING_DIM;
        Ok(input
            .data
            .chunks(chunk)
            .take(EMBEDDING_DIM)
            .map(|c| c.iter().sum::<f32>() / c.len() as f32)
            .collect())
    }

    fn name(&self) -> &str {
        "pooled"
    }
}

/// Returns the same value for every feature.
pub struct ConstantBackbone(pub f32);

impl Backbone for ConstantBackbone {
    fn forward(&self, _input: &PixelTensor) -> Result<Vec<f32>, EmbedError> {
        Ok(vec![self.0; EMBEDDING_DIM])
    }

    fn name(&self) -> &str {
        "constant"
    }
}

/// Unit vector along axis `i`.
pub fn axis_embedding(i: usize) -> Embedding {
    let mut features = vec![0.0; EMBEDDING_DIM];
    features[i] = 1.0;
    Embedding::from_features(features).expect("valid dimension")
}

pub fn catalog_entry(id: &str) -> CatalogEntry {
    CatalogEntry {
        id: id.to_string(),
        title: format!("Product {id}"),
        image_url: format!("https://img.example/{id}.jpg"),
        offers: vec![
            Offer {
                platform: "Amazon".to_string(),
                price: 1000.0,
                url: format!("https://www.amazon.in/dp/{id}"),
            },
            Offer {
                platform: "Flipkart".to_string(),
                price: 900.0,
                url: format!("https://www.flipkart.com/p/{id}"),
            },
        ],
    }
}

/// Serves images from memory; unknown URLs answer 404.
#[derive(Default)]
pub struct MapImageSource {
    images: HashMap<String, Vec<u8>>,
}

impl MapImageSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, url: &str, bytes: Vec<u8>) -> Self {
        self.images.insert(url.to_string(), bytes);
        self
    }
}

impl ImageSource for MapImageSource {
    fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let bytes = self.images.get(url).ok_or(FetchError::Status(404))?;
        if !crate::search::source::looks_like_image(bytes) {
            return Err(FetchError::NotAnImage);
        }
        Ok(bytes.clone())
    }
}

/// Index one catalog entry per image (ids `p0`, `p1`, ...) with [`PooledBackbone`].
pub fn search_over(images: &[Vec<u8>]) -> SimilaritySearch {
    let mut source = MapImageSource::new();
    let mut entries = Vec::with_capacity(images.len());

    for (i, bytes) in images.iter().enumerate() {
        let mut entry = catalog_entry(&format!("p{i}"));
        entry.image_url = format!("mem://{i}");
        source = source.with(&entry.image_url, bytes.clone());
        entries.push(entry);
    }

    let extractor = EmbeddingExtractor::new(Arc::new(PooledBackbone));
    let catalog = Catalog::new(entries).expect("valid catalog");
    let (index, report) = IndexBuilder::new(&extractor, &source).build(catalog);
    assert_eq!(report.degraded, 0, "test images must all embed");

    SimilaritySearch::new(Arc::new(index), extractor)
}

/// Scraper answering every link with a fixed page, or failing when `page` is `None`.
pub struct StubScraper {
    platform: Platform,
    page: Option<(Option<String>, Option<f64>)>,
    calls: Arc<AtomicUsize>,
}

impl StubScraper {
    pub fn found(platform: Platform, title: Option<&str>, price: Option<f64>) -> Self {
        Self {
            platform,
            page: Some((title.map(str::to_string), price)),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn failing(platform: Platform) -> Self {
        Self {
            platform,
            page: None,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn calls(&self) -> Arc<AtomicUsize> {
        self.calls.clone()
    }
}

impl OfferScraper for StubScraper {
    fn fetch_offer(&self, url: &str) -> Result<RawOffer, ScrapeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let (title, price) = self.page.clone().ok_or_else(|| ScrapeError::Fetch {
            url: url.to_string(),
            reason: "connection refused".to_string(),
        })?;

        Ok(RawOffer {
            platform: self.platform.display_name().to_string(),
            url: url.to_string(),
            title,
            price,
            image: None,
        })
    }

    fn platform(&self) -> Platform {
        self.platform
    }
}

pub fn registry_with(scrapers: Vec<StubScraper>) -> ScraperRegistry {
    let mut registry = ScraperRegistry::empty();
    for scraper in scrapers {
        registry.register(Box::new(scraper));
    }
    registry
}

/// App over [`search_over`] with default history and top-k 4.
pub fn test_app(images: &[Vec<u8>], scrapers: ScraperRegistry) -> App {
    App::new_with(search_over(images), scrapers, HistoryLedger::default(), 4)
}

/// Five distinct catalog images, `p0`..`p4`.
pub fn catalog_images() -> Vec<Vec<u8>> {
    (0..5).map(|i| png_bytes(120 + i * 8, 100, i as u8 * 5)).collect()
}
