//! Price offer aggregation.
//!
//! Normalizes one product's per-platform offers into a comparable result:
//! lowest and highest price plus the platform offering the lowest one.

use serde::{Deserialize, Serialize};

use crate::catalog::CatalogEntry;

/// Title used when a scraped page has none
pub const PLACEHOLDER_TITLE: &str = "Product";

/// A single platform's price quote for a product.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Offer {
    pub platform: String,
    pub price: f64,
    pub url: String,
}

/// What a platform scraper extracted from a product page.
/// Any field the page did not yield stays `None`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RawOffer {
    pub platform: String,
    pub url: String,
    pub title: Option<String>,
    pub price: Option<f64>,
    pub image: Option<String>,
}

/// One conceptual product with all of its offers, before aggregation.
#[derive(Debug, Clone, PartialEq)]
pub struct RawProduct {
    pub product_id: String,
    pub title: String,
    pub image_url: String,
    pub offers: Vec<Offer>,
}

/// Product with derived comparison fields. Recomputed per request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EnrichedProduct {
    pub product_id: String,
    pub title: String,
    pub image_url: String,
    pub offers: Vec<Offer>,
    pub lowest_price: f64,
    pub highest_price: f64,
    pub best_platform: String,
}

#[derive(Debug, thiserror::Error)]
pub enum OfferError {
    #[error("product {product_id} has no offers")]
    NoOffers { product_id: String },

    #[error("product {product_id} has an invalid price: {price}")]
    InvalidPrice { product_id: String, price: f64 },
}

impl From<&CatalogEntry> for RawProduct {
    fn from(entry: &CatalogEntry) -> Self {
        Self {
            product_id: entry.id.clone(),
            title: entry.title.clone(),
            image_url: entry.image_url.clone(),
            offers: entry.offers.clone(),
        }
    }
}

impl RawProduct {
    /// Wrap a scraped page as a single-offer product.
    ///
    /// Missing fields degrade instead of failing: title becomes
    /// [`PLACEHOLDER_TITLE`], image becomes empty and price becomes zero.
    pub fn from_raw_offer(raw: RawOffer) -> Self {
        let price = raw.price.unwrap_or(0.0);
        Self {
            product_id: raw.url.clone(),
            title: raw
                .title
                .filter(|t| !t.trim().is_empty())
                .unwrap_or_else(|| PLACEHOLDER_TITLE.to_string()),
            image_url: raw.image.unwrap_or_default(),
            offers: vec![Offer {
                platform: raw.platform,
                price,
                url: raw.url,
            }],
        }
    }
}

/// Derive lowest/highest price and best platform.
///
/// On equal minimum prices the earliest offer wins.
pub fn enrich(product: &RawProduct) -> Result<EnrichedProduct, OfferError> {
    let first = product.offers.first().ok_or_else(|| OfferError::NoOffers {
        product_id: product.product_id.clone(),
    })?;

    if let Some(bad) = product
        .offers
        .iter()
        .find(|o| !o.price.is_finite() || o.price < 0.0)
    {
        return Err(OfferError::InvalidPrice {
            product_id: product.product_id.clone(),
            price: bad.price,
        });
    }

    let mut best = first;
    let mut highest = first.price;
    for offer in &product.offers[1..] {
        // strict comparison keeps the first of equal prices
        if offer.price < best.price {
            best = offer;
        }
        if offer.price > highest {
            highest = offer.price;
        }
    }

    Ok(EnrichedProduct {
        product_id: product.product_id.clone(),
        title: product.title.clone(),
        image_url: product.image_url.clone(),
        offers: product.offers.clone(),
        lowest_price: best.price,
        highest_price: highest,
        best_platform: best.platform.clone(),
    })
}

/// Enrich every product, preserving input order. Fails on the first bad product.
pub fn enrich_all(products: &[RawProduct]) -> Result<Vec<EnrichedProduct>, OfferError> {
    products.iter().map(enrich).collect()
}
