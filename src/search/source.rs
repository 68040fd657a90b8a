//! Reference image retrieval for the catalog index build.
//!
//! Validates that fetched bytes look like an image before they reach the decoder:
//! - Non-empty
//! - Magic bytes match a known format
//! - Not an HTML error/login page served with 200

use std::time::Duration;

const USER_AGENT_DEFAULT: &str =
    "Mozilla/5.0 (X11; Linux x86_64; rv:124.0) Gecko/20100101 Firefox/124.0";

/// Failure to retrieve a catalog image. Recovered locally by the index build.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("request timed out")]
    Timeout,

    #[error("request failed: {0}")]
    Transport(String),

    #[error("unexpected status {0}")]
    Status(u16),

    #[error("response is not an image")]
    NotAnImage,
}

/// Capability to fetch the raw bytes behind an image URL.
pub trait ImageSource: Send + Sync {
    fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError>;
}

/// Blocking HTTP image source with a per-request timeout.
pub struct HttpImageSource {
    client: reqwest::blocking::Client,
}

impl HttpImageSource {
    pub fn new(timeout: Duration) -> Result<Self, FetchError> {
        let client = reqwest::blocking::Client::builder()
            .user_agent(USER_AGENT_DEFAULT)
            .timeout(timeout)
            .pool_idle_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| FetchError::Transport(e.to_string()))?;

        Ok(Self { client })
    }
}

impl ImageSource for HttpImageSource {
    fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        log::debug!("{url}: requesting");

        let resp = self.client.get(url).send().map_err(|err| {
            if err.is_timeout() {
                FetchError::Timeout
            } else {
                FetchError::Transport(err.to_string())
            }
        })?;

        let status = resp.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }

        let bytes = resp.bytes().map_err(|err| {
            if err.is_timeout() {
                FetchError::Timeout
            } else {
                FetchError::Transport(err.to_string())
            }
        })?;

        if !looks_like_image(&bytes) {
            return Err(FetchError::NotAnImage);
        }

        Ok(bytes.to_vec())
    }
}

/// Cheap pre-decode check: known magic bytes and not HTML.
pub fn looks_like_image(bytes: &[u8]) -> bool {
    !bytes.is_empty() && has_valid_magic_bytes(bytes) && !is_html_content(bytes)
}

/// Checks if bytes start with valid image format magic bytes.
fn has_valid_magic_bytes(bytes: &[u8]) -> bool {
    if bytes.len() < 4 {
        return false;
    }

    // PNG: \x89PNG
    if bytes[0..4] == [0x89, 0x50, 0x4E, 0x47] {
        return true;
    }

    // JPEG: \xFF\xD8\xFF
    if bytes[0..3] == [0xFF, 0xD8, 0xFF] {
        return true;
    }

    // GIF: GIF8
    if bytes[0..4] == *b"GIF8" {
        return true;
    }

    // WebP: RIFF at start and WEBP at bytes 8..12
    if bytes.len() >= 12 && bytes[0..4] == *b"RIFF" && bytes[8..12] == *b"WEBP" {
        return true;
    }

    // BMP: BM
    bytes[0..2] == *b"BM"
}

/// Checks if bytes look like HTML content (case-insensitive check of first 50 bytes).
fn is_html_content(bytes: &[u8]) -> bool {
    let check_len = bytes.len().min(50);
    let prefix_lower = bytes[0..check_len].to_ascii_lowercase();

    prefix_lower.starts_with(b"<!doctype") || prefix_lower.starts_with(b"<html")
}
