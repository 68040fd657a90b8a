use scraper::Html;

use super::{absolute_url, meta_content, parse_price, select_text, Platform};
use crate::offers::RawOffer;

pub fn parse_page(html: &str, url: &str) -> RawOffer {
    let document = Html::parse_document(html);

    // brand and product name are separate headings
    let brand = select_text(&document, &["h1.pdp-title"]);
    let name = select_text(&document, &["h1.pdp-name"]);
    let title = match (brand, name) {
        (Some(brand), Some(name)) => Some(format!("{brand} {name}")),
        (brand, name) => brand.or(name).or_else(|| meta_content(&document, "og:title")),
    };

    RawOffer {
        platform: Platform::Myntra.display_name().to_string(),
        url: url.to_string(),
        title,
        price: select_text(&document, &["span.pdp-price strong", "span.pdp-price"])
            .and_then(|p| parse_price(&p)),
        image: meta_content(&document, "og:image").and_then(|src| absolute_url(url, &src)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const URL: &str = "https://www.myntra.com/sneakers/brand/12345/buy";

    #[test]
    fn test_parse_product_page() {
        let html = r#"
            <html><head>
              <meta property="og:image" content="https://assets.myntassets.com/sneaker.jpg">
            </head><body>
              <h1 class="pdp-title">Roadster</h1>
              <h1 class="pdp-name">Men White Sneakers</h1>
              <p><span class="pdp-price"><strong>₹1,319</strong></span></p>
            </body></html>
        "#;

        let offer = parse_page(html, URL);
        assert_eq!(offer.platform, "Myntra");
        assert_eq!(offer.title.as_deref(), Some("Roadster Men White Sneakers"));
        assert_eq!(offer.price, Some(1319.0));
        assert_eq!(
            offer.image.as_deref(),
            Some("https://assets.myntassets.com/sneaker.jpg")
        );
    }

    #[test]
    fn test_title_falls_back_to_og_title() {
        let html = r#"<head><meta property="og:title" content="Buy Sneakers Online"></head>"#;
        let offer = parse_page(html, URL);
        assert_eq!(offer.title.as_deref(), Some("Buy Sneakers Online"));
        assert_eq!(offer.price, None);
    }
}
