use anyhow::{bail, Context};
use homedir::my_home;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const CONFIG_FILE: &str = "config.yaml";

const DEFAULT_BIND: &str = "0.0.0.0:8080";
const DEFAULT_BODY_LIMIT_MB: usize = 20;

/// ResNet-18 with the classification head replaced by identity, exported to ONNX
const DEFAULT_MODEL_PATH: &str = "models/resnet18-features.onnx";
const DEFAULT_INTRA_THREADS: usize = 1;

const DEFAULT_CATALOG_PATH: &str = "catalog.yaml";
/// Per-image timeout for catalog reference images
const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 10;

const DEFAULT_TOP_K: usize = crate::search::DEFAULT_TOP_K;
const DEFAULT_HISTORY_CAPACITY: usize = crate::history::DEFAULT_CAPACITY;

const DEFAULT_SCRAPE_TIMEOUT_SECS: u64 = 20;
const DEFAULT_SCRAPE_MAX_ATTEMPTS: u32 = 3;
const DEFAULT_USER_AGENT: &str = "Mozilla/5.0";

/// Resolve the data directory: `DEALSCOUT_BASE_PATH` or `~/.local/share/dealscout`.
pub fn base_path() -> anyhow::Result<PathBuf> {
    if let Ok(path) = std::env::var("DEALSCOUT_BASE_PATH") {
        return Ok(PathBuf::from(path));
    }

    let home = my_home()
        .context("couldnt find home dir")?
        .context("couldnt find home dir")?;

    Ok(home.join(".local/share/dealscout"))
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,

    /// Upload limit for image queries, in megabytes
    #[serde(default = "default_body_limit_mb")]
    pub body_limit_mb: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            body_limit_mb: DEFAULT_BODY_LIMIT_MB,
        }
    }
}

/// Configuration for the image feature extractor
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// ONNX model file. Relative paths resolve against the base path.
    #[serde(default = "default_model_path")]
    pub model_path: PathBuf,

    /// Threads used by ONNX Runtime inside a single inference
    #[serde(default = "default_intra_threads")]
    pub intra_threads: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model_path: default_model_path(),
            intra_threads: DEFAULT_INTRA_THREADS,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CatalogConfig {
    /// Catalog YAML file. Relative paths resolve against the base path.
    #[serde(default = "default_catalog_path")]
    pub path: PathBuf,

    #[serde(default = "default_fetch_timeout_secs")]
    pub fetch_timeout_secs: u64,

    /// Parallelism for the index build: "auto" or a positive integer
    #[serde(default = "default_build_parallelism")]
    pub build_parallelism: String,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            path: default_catalog_path(),
            fetch_timeout_secs: DEFAULT_FETCH_TIMEOUT_SECS,
            build_parallelism: default_build_parallelism(),
        }
    }
}

impl CatalogConfig {
    /// Number of build threads; `None` lets rayon decide.
    pub fn parallelism(&self) -> Option<usize> {
        self.build_parallelism.parse::<usize>().ok()
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SearchConfig {
    #[serde(default = "default_top_k")]
    pub top_k: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            top_k: DEFAULT_TOP_K,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HistoryConfig {
    /// Entries kept per session, oldest evicted first
    #[serde(default = "default_history_capacity")]
    pub capacity: usize,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_HISTORY_CAPACITY,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ScrapeConfig {
    #[serde(default = "default_scrape_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default = "default_scrape_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for ScrapeConfig {
    fn default() -> Self {
        Self {
            timeout_secs: DEFAULT_SCRAPE_TIMEOUT_SECS,
            max_attempts: DEFAULT_SCRAPE_MAX_ATTEMPTS,
            user_agent: default_user_agent(),
        }
    }
}

fn default_bind() -> String {
    DEFAULT_BIND.to_string()
}

fn default_body_limit_mb() -> usize {
    DEFAULT_BODY_LIMIT_MB
}

fn default_model_path() -> PathBuf {
    PathBuf::from(DEFAULT_MODEL_PATH)
}

fn default_intra_threads() -> usize {
    DEFAULT_INTRA_THREADS
}

fn default_catalog_path() -> PathBuf {
    PathBuf::from(DEFAULT_CATALOG_PATH)
}

fn default_fetch_timeout_secs() -> u64 {
    DEFAULT_FETCH_TIMEOUT_SECS
}

fn default_build_parallelism() -> String {
    "auto".to_string()
}

fn default_top_k() -> usize {
    DEFAULT_TOP_K
}

fn default_history_capacity() -> usize {
    DEFAULT_HISTORY_CAPACITY
}

fn default_scrape_timeout_secs() -> u64 {
    DEFAULT_SCRAPE_TIMEOUT_SECS
}

fn default_scrape_max_attempts() -> u32 {
    DEFAULT_SCRAPE_MAX_ATTEMPTS
}

fn default_user_agent() -> String {
    DEFAULT_USER_AGENT.to_string()
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub catalog: CatalogConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub history: HistoryConfig,
    #[serde(default)]
    pub scrape: ScrapeConfig,

    #[serde(skip_serializing, skip_deserializing)]
    base_path: PathBuf,
}

impl Config {
    fn validate(&self) -> anyhow::Result<()> {
        if self.server.body_limit_mb == 0 {
            bail!("server.body_limit_mb must be greater than 0");
        }

        if self.embedding.intra_threads == 0 {
            bail!("embedding.intra_threads must be greater than 0");
        }

        let catalog = &self.catalog;
        if catalog.fetch_timeout_secs == 0 {
            bail!("catalog.fetch_timeout_secs must be greater than 0");
        }

        // "auto" or positive integer
        if catalog.build_parallelism != "auto" {
            match catalog.build_parallelism.parse::<usize>() {
                Ok(0) | Err(_) => bail!(
                    "catalog.build_parallelism must be 'auto' or a positive integer, got '{}'",
                    catalog.build_parallelism
                ),
                Ok(_) => {}
            }
        }

        if self.search.top_k == 0 {
            bail!("search.top_k must be greater than 0");
        }

        if self.history.capacity == 0 {
            bail!("history.capacity must be greater than 0");
        }

        if self.scrape.timeout_secs == 0 {
            bail!("scrape.timeout_secs must be greater than 0");
        }

        if self.scrape.max_attempts == 0 {
            bail!("scrape.max_attempts must be greater than 0");
        }

        Ok(())
    }

    /// Load `config.yaml` from `base_path`, creating it with defaults when absent.
    pub fn load_with(base_path: &Path) -> anyhow::Result<Self> {
        std::fs::create_dir_all(base_path)
            .with_context(|| format!("failed to create {}", base_path.display()))?;

        let config_path = base_path.join(CONFIG_FILE);

        // create new if does not exist
        if !config_path.exists() {
            write_atomic(&config_path, serde_yml::to_string(&Self::default())?.as_bytes())?;
        }

        let config_str = std::fs::read_to_string(&config_path)
            .with_context(|| format!("failed to read {}", config_path.display()))?;
        let mut config: Self = serde_yml::from_str(&config_str).context("config is malformed")?;

        config.base_path = base_path.to_path_buf();

        config.validate()?;

        // resave in case config version needs an upgrade
        if config_str != serde_yml::to_string(&config)? {
            config.save()?;
        }

        Ok(config)
    }

    pub fn save(&self) -> anyhow::Result<()> {
        let config_str = serde_yml::to_string(&self)?;
        write_atomic(&self.base_path.join(CONFIG_FILE), config_str.as_bytes())
    }

    /// Resolve a configured path against the base path.
    pub fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_path.join(path)
        }
    }
}

/// Write through a temp file and rename so readers never see a partial file.
pub fn write_atomic(path: &Path, data: &[u8]) -> anyhow::Result<()> {
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .context("path has no file name")?;
    let temp_path = path.with_file_name(format!("{}-{file_name}", rand::random::<u32>()));

    std::fs::write(&temp_path, data)
        .with_context(|| format!("failed to write {}", temp_path.display()))?;
    std::fs::rename(&temp_path, path)
        .with_context(|| format!("failed to move into {}", path.display()))
}
