use scraper::Html;

use super::{absolute_url, parse_price, select_attr, select_text, Platform};
use crate::offers::RawOffer;

/// Meesho pages carry no stable class names: title is the first heading,
/// price the first `h4`, image the first `img` with a source.
pub fn parse_page(html: &str, url: &str) -> RawOffer {
    let document = Html::parse_document(html);

    RawOffer {
        platform: Platform::Meesho.display_name().to_string(),
        url: url.to_string(),
        title: select_text(&document, &["h1"]),
        price: select_text(&document, &["h4"]).and_then(|p| parse_price(&p)),
        image: select_attr(&document, &["img[src]"], &["src"]).and_then(|src| absolute_url(url, &src)),
    }
}
