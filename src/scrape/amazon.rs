use scraper::Html;

use super::{absolute_url, meta_content, parse_price, select_attr, select_text, Platform};
use crate::offers::RawOffer;

const TITLE_SELECTORS: &[&str] = &["#productTitle", "#title"];
const PRICE_SELECTORS: &[&str] = &[
    ".a-price .a-offscreen",
    "#priceblock_ourprice",
    "#priceblock_dealprice",
    "span.a-price-whole",
];
const IMAGE_SELECTORS: &[&str] = &["#landingImage", "#imgBlkFront"];

pub fn parse_page(html: &str, url: &str) -> RawOffer {
    let document = Html::parse_document(html);

    // data-old-hires holds the full size image, src is often a lazy placeholder
    let image = select_attr(&document, IMAGE_SELECTORS, &["data-old-hires", "src"])
        .filter(|src| !src.starts_with("data:"))
        .or_else(|| meta_content(&document, "og:image"))
        .and_then(|src| absolute_url(url, &src));

    RawOffer {
        platform: Platform::Amazon.display_name().to_string(),
        url: url.to_string(),
        title: select_text(&document, TITLE_SELECTORS),
        price: select_text(&document, PRICE_SELECTORS).and_then(|p| parse_price(&p)),
        image,
    }
}
