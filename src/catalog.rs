use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::offers::Offer;

/// Shipped catalog, written out on first start when no catalog file exists
const DEFAULT_CATALOG: &str = include_str!("./catalog.yaml");

/// Immutable product record the image search matches against.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub id: String,
    pub title: String,
    pub image_url: String,
    #[serde(default)]
    pub offers: Vec<Offer>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CatalogFile {
    products: Vec<CatalogEntry>,
}

/// Fixed reference set of products. Never empty, ids unique.
#[derive(Debug, Clone)]
pub struct Catalog {
    entries: Vec<CatalogEntry>,
}

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("io error: {0:?}")]
    Io(#[from] std::io::Error),

    #[error("catalog is malformed: {0}")]
    Parse(#[from] serde_yml::Error),

    #[error("catalog has no products")]
    Empty,

    #[error("duplicate product id in catalog: {0}")]
    DuplicateId(String),
}

impl Catalog {
    pub fn new(entries: Vec<CatalogEntry>) -> Result<Self, CatalogError> {
        if entries.is_empty() {
            return Err(CatalogError::Empty);
        }

        let mut seen = HashSet::with_capacity(entries.len());
        for entry in &entries {
            if !seen.insert(entry.id.as_str()) {
                return Err(CatalogError::DuplicateId(entry.id.clone()));
            }
        }

        Ok(Self { entries })
    }

    pub fn from_yaml(yaml: &str) -> Result<Self, CatalogError> {
        let file: CatalogFile = serde_yml::from_str(yaml)?;
        Self::new(file.products)
    }

    /// The catalog bundled with the binary.
    pub fn bundled() -> Result<Self, CatalogError> {
        Self::from_yaml(DEFAULT_CATALOG)
    }

    /// Load from `path`, writing the bundled catalog there first if it is missing.
    pub fn load_or_init(path: &Path) -> Result<Self, CatalogError> {
        if !path.exists() {
            log::info!("no catalog at {}, writing bundled default", path.display());
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(path, DEFAULT_CATALOG)?;
        }

        let yaml = std::fs::read_to_string(path)?;
        Self::from_yaml(&yaml)
    }

    pub fn entries(&self) -> &[CatalogEntry] {
        &self.entries
    }

    pub fn into_entries(self) -> Vec<CatalogEntry> {
        self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}
