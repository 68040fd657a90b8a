use scraper::Html;

use super::{absolute_url, meta_content, parse_price, select_attr, select_text, Platform};
use crate::offers::RawOffer;

// Flipkart rotates its obfuscated class names; old and current layouts both seen in the wild.
const TITLE_SELECTORS: &[&str] = &["span.B_NuCI", "span.VU-ZEz", "h1 span"];
const PRICE_SELECTORS: &[&str] = &["div._30jeq3", "div.Nx9bqj"];
const IMAGE_SELECTORS: &[&str] = &["img._396cs4", "img.DByuf4"];

pub fn parse_page(html: &str, url: &str) -> RawOffer {
    let document = Html::parse_document(html);

    let image = select_attr(&document, IMAGE_SELECTORS, &["src"])
        .or_else(|| meta_content(&document, "og:image"))
        .and_then(|src| absolute_url(url, &src));

    RawOffer {
        platform: Platform::Flipkart.display_name().to_string(),
        url: url.to_string(),
        title: select_text(&document, TITLE_SELECTORS),
        price: select_text(&document, PRICE_SELECTORS).and_then(|p| parse_price(&p)),
        image,
    }
}
