//! Marketplace link lookups.
//!
//! A link is routed to a platform by keyword matching on its host, then the
//! platform's scraper turns the product page into a [`RawOffer`]. Parsing is
//! best effort: any field the page does not yield is left empty.

pub mod amazon;
pub mod flipkart;
pub mod meesho;
pub mod myntra;

use std::collections::HashMap;
use std::fmt;
use std::thread::sleep;
use std::time::Duration;

use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::StatusCode;
use scraper::{Html, Selector};

use crate::config::ScrapeConfig;
use crate::offers::RawOffer;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Platform {
    Amazon,
    Flipkart,
    Meesho,
    Myntra,
}

impl Platform {
    pub const ALL: [Platform; 4] = [
        Platform::Amazon,
        Platform::Flipkart,
        Platform::Meesho,
        Platform::Myntra,
    ];

    /// Name reported in offers.
    pub fn display_name(&self) -> &'static str {
        match self {
            Platform::Amazon => "Amazon",
            Platform::Flipkart => "Flipkart",
            Platform::Meesho => "Meesho",
            Platform::Myntra => "Myntra",
        }
    }

    fn host_keywords(&self) -> &'static [&'static str] {
        match self {
            Platform::Amazon => &["amazon", "amzn"],
            Platform::Flipkart => &["flipkart"],
            Platform::Meesho => &["meesho"],
            Platform::Myntra => &["myntra"],
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

/// Pick the platform a product link belongs to.
///
/// Plain keyword matching on the lowercased host; links without a scheme are
/// read as https. Returns `None` for anything unrecognized.
pub fn detect_platform(link: &str) -> Option<Platform> {
    platform_of(&parse_link(link)?)
}

fn platform_of(link: &url::Url) -> Option<Platform> {
    let host = link.host_str()?.to_lowercase();

    Platform::ALL
        .into_iter()
        .find(|p| p.host_keywords().iter().any(|k| host.contains(k)))
}

fn parse_link(link: &str) -> Option<url::Url> {
    let link = link.trim();
    match url::Url::parse(link) {
        Ok(u) if u.has_host() => Some(u),
        _ => url::Url::parse(&format!("https://{link}"))
            .ok()
            .filter(|u| u.has_host()),
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ScrapeError {
    #[error("invalid url: {0}")]
    InvalidUrl(String),

    #[error("failed to fetch {url}: {reason}")]
    Fetch { url: String, reason: String },
}

/// Result of a link lookup. Unsupported links are a normal outcome, not an error.
#[derive(Debug, Clone, PartialEq)]
pub enum LinkOutcome {
    Unsupported,
    Found(RawOffer),
}

/// Platform-specific product page scraper.
pub trait OfferScraper: Send + Sync {
    fn fetch_offer(&self, url: &str) -> Result<RawOffer, ScrapeError>;

    fn platform(&self) -> Platform;
}

/// Fetches a page over HTTP and hands it to a platform parser.
pub struct PageScraper {
    platform: Platform,
    config: ScrapeConfig,
    parse: fn(&str, &str) -> RawOffer,
}

impl PageScraper {
    pub fn new(platform: Platform, config: ScrapeConfig, parse: fn(&str, &str) -> RawOffer) -> Self {
        Self {
            platform,
            config,
            parse,
        }
    }
}

impl OfferScraper for PageScraper {
    fn fetch_offer(&self, url: &str) -> Result<RawOffer, ScrapeError> {
        let html = fetch_page(url, &self.config)?;
        let offer = (self.parse)(&html, url);

        log::info!(
            "scraper={} outcome=success title={} price={} image={}",
            self.platform,
            offer.title.is_some(),
            offer.price.is_some(),
            offer.image.is_some()
        );

        Ok(offer)
    }

    fn platform(&self) -> Platform {
        self.platform
    }
}

/// One scraper per platform.
pub struct ScraperRegistry {
    scrapers: HashMap<Platform, Box<dyn OfferScraper>>,
}

impl ScraperRegistry {
    pub fn empty() -> Self {
        Self {
            scrapers: HashMap::new(),
        }
    }

    /// HTTP scrapers for every known platform.
    pub fn with_defaults(config: &ScrapeConfig) -> Self {
        let mut registry = Self::empty();

        registry.register(Box::new(PageScraper::new(
            Platform::Amazon,
            config.clone(),
            amazon::parse_page,
        )));
        registry.register(Box::new(PageScraper::new(
            Platform::Flipkart,
            config.clone(),
            flipkart::parse_page,
        )));
        registry.register(Box::new(PageScraper::new(
            Platform::Meesho,
            config.clone(),
            meesho::parse_page,
        )));
        registry.register(Box::new(PageScraper::new(
            Platform::Myntra,
            config.clone(),
            myntra::parse_page,
        )));

        registry
    }

    /// Replaces any scraper already registered for the same platform.
    pub fn register(&mut self, scraper: Box<dyn OfferScraper>) {
        self.scrapers.insert(scraper.platform(), scraper);
    }

    /// Resolve a product link. Unrecognized hosts never reach a scraper.
    ///
    /// Scrapers receive the parsed link, so a missing scheme becomes https.
    pub fn lookup(&self, url: &str) -> Result<LinkOutcome, ScrapeError> {
        let Some((link, platform)) = parse_link(url).and_then(|l| platform_of(&l).map(|p| (l, p)))
        else {
            log::debug!("{url}: platform not supported");
            return Ok(LinkOutcome::Unsupported);
        };

        let Some(scraper) = self.scrapers.get(&platform) else {
            log::debug!("{url}: no scraper registered for {platform}");
            return Ok(LinkOutcome::Unsupported);
        };

        scraper.fetch_offer(link.as_str()).map(LinkOutcome::Found)
    }
}

fn get_error(error: &reqwest::Error) -> String {
    use std::error::Error;

    match error.source() {
        Some(e) => match e.source() {
            Some(e) => e.to_string(),
            None => e.to_string(),
        },
        None => error.to_string(),
    }
}

/// GET a page body, retrying transport errors, 5xx and 429.
///
/// Client errors still return the body; the parser then falls back to defaults.
pub fn fetch_page(url: &str, config: &ScrapeConfig) -> Result<String, ScrapeError> {
    let url_parsed = reqwest::Url::parse(url).map_err(|e| ScrapeError::InvalidUrl(format!("{url}: {e}")))?;
    let host = url_parsed.host_str().unwrap_or_default();
    let path = url_parsed.path();
    let iden = format!("{host}{path}");

    let client = reqwest::blocking::Client::builder()
        .user_agent(config.user_agent.as_str())
        .timeout(Duration::from_secs(config.timeout_secs))
        .pool_idle_timeout(Duration::from_secs(10))
        .build()
        .map_err(|e| ScrapeError::Fetch {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    let mut last_error = String::from("no attempts made");

    for attempt in 1..=config.max_attempts {
        if attempt > 1 {
            log::debug!("{iden}: retrying");
        }

        log::debug!("{iden}: requesting");

        let resp = match client.get(url_parsed.clone()).send() {
            Ok(r) => r,
            Err(err) => {
                last_error = get_error(&err);
                log::warn!("{iden}: {err}: {last_error}");
                continue;
            }
        };

        let status = resp.status();

        if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
            last_error = format!("status {status}");
            log::debug!("{iden}: {status}");

            if status == StatusCode::TOO_MANY_REQUESTS {
                sleep(Duration::from_secs(attempt as u64 * 2));
            }
            continue;
        }

        if !status.is_success() {
            log::debug!("{iden}: {status}, parsing body anyway");
        }

        match resp.text() {
            Ok(body) => return Ok(body),
            Err(err) => {
                last_error = get_error(&err);
                log::debug!("{iden}: body read failed, timeout={}", err.is_timeout());
            }
        }
    }

    Err(ScrapeError::Fetch {
        url: url.to_string(),
        reason: last_error,
    })
}

static PRICE_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[0-9][0-9,]*(?:\.[0-9]+)?").expect("Failed to compile price regex"));

/// Read a displayed price such as "₹1,299" or "$12.50".
pub fn parse_price(text: &str) -> Option<f64> {
    let found = PRICE_REGEX.find(text)?;
    found.as_str().replace(',', "").parse::<f64>().ok()
}

/// Trimmed text of the first non-empty match among `selectors`.
pub(crate) fn select_text(document: &Html, selectors: &[&str]) -> Option<String> {
    selectors.iter().find_map(|sel| {
        let selector = Selector::parse(sel).ok()?;
        document
            .select(&selector)
            .map(|el| el.text().collect::<String>().trim().to_string())
            .find(|text| !text.is_empty())
    })
}

/// First non-empty attribute among `selectors`, tried in order.
pub(crate) fn select_attr(document: &Html, selectors: &[&str], attrs: &[&str]) -> Option<String> {
    selectors.iter().find_map(|sel| {
        let selector = Selector::parse(sel).ok()?;
        document.select(&selector).find_map(|el| {
            attrs
                .iter()
                .filter_map(|attr| el.value().attr(attr))
                .map(|v| v.trim())
                .find(|v| !v.is_empty())
                .map(|v| v.to_string())
        })
    })
}

/// `<meta property=.. content=..>` value, e.g. `og:image`.
pub(crate) fn meta_content(document: &Html, property: &str) -> Option<String> {
    let by_property = format!(r#"meta[property="{property}"]"#);
    let by_name = format!(r#"meta[name="{property}"]"#);

    select_attr(
        document,
        &[by_property.as_str(), by_name.as_str()],
        &["content"],
    )
}

/// Make an image reference absolute against the page URL.
pub(crate) fn absolute_url(page_url: &str, href: &str) -> Option<String> {
    if href.starts_with("data:") {
        return None;
    }

    if let Some(rest) = href.strip_prefix("//") {
        return Some(format!("https://{rest}"));
    }

    if href.starts_with("http://") || href.starts_with("https://") {
        return Some(href.to_string());
    }

    url::Url::parse(page_url)
        .and_then(|base| base.join(href))
        .map(|u| u.to_string())
        .ok()
}
