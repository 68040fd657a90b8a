//! Visual similarity search over the product catalog.
//!
//! # Architecture
//!
//! - `source`: fetches catalog reference images
//! - `index`: one embedding per catalog entry, built once at startup
//! - `service`: embeds a query image and ranks catalog entries by dot product

mod index;
pub mod source;
mod service;

pub use index::{BuildReport, CatalogIndex, IndexBuilder, IndexError, ScoredMatch};
pub use service::{SearchHit, SimilaritySearch};
pub use source::{FetchError, HttpImageSource, ImageSource};

/// Default number of matches returned for an image query
pub const DEFAULT_TOP_K: usize = 4;
