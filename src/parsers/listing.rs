use scraper::{Html, Selector};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::parsers::clean_text;

/// Structural queries used against a static listing page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ListingSelectors {
    pub title: String,
    pub price: String,
    /// Attribute on the price element holding the machine-readable price.
    pub price_attr: String,
    pub company: String,
}

impl Default for ListingSelectors {
    fn default() -> Self {
        Self {
            title: "h1[data-qaid='product_name']".to_string(),
            price: "div.tqUsL div[data-qaprice]".to_string(),
            price_attr: "data-qaprice".to_string(),
            company: "div.l-GwW.fvQVX > a[data-qaid='company_name']".to_string(),
        }
    }
}

/// Raw fields of a listing page; every field may be empty.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListingFields {
    pub title: String,
    pub price_raw: String,
    pub company: String,
}

/// Extracts each field independently; a missing or bad selector leaves that
/// field empty and the others untouched.
pub fn extract_listing(markup: &str, selectors: &ListingSelectors) -> ListingFields {
    let document = Html::parse_document(markup);

    ListingFields {
        title: select_text(&document, &selectors.title),
        price_raw: select_attr(&document, &selectors.price, &selectors.price_attr)
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| select_text(&document, &selectors.price)),
        company: select_text(&document, &selectors.company),
    }
}

fn parse_selector(query: &str) -> Option<Selector> {
    match Selector::parse(query) {
        Ok(selector) => Some(selector),
        Err(e) => {
            warn!("Invalid selector '{}': {:?}", query, e);
            None
        }
    }
}

fn select_text(document: &Html, query: &str) -> String {
    parse_selector(query)
        .and_then(|selector| {
            document
                .select(&selector)
                .next()
                .map(|element| clean_text(&element.text().collect::<String>()))
        })
        .unwrap_or_default()
}

fn select_attr(document: &Html, query: &str, attr: &str) -> Option<String> {
    let selector = parse_selector(query)?;
    document
        .select(&selector)
        .next()
        .and_then(|element| element.value().attr(attr))
        .map(|value| value.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"
        <html><body>
            <h1 data-qaid="product_name">  Перфоратор   Bosch GBH 2-26 </h1>
            <div class="tqUsL"><div data-qaprice="45990.00">45 990 ₸</div></div>
            <div class="l-GwW fvQVX"><a data-qaid="company_name" href="/c/1">ТОО &quot;Инструмент&quot;</a></div>
        </body></html>
    "#;

    #[test]
    fn pulls_all_three_fields() {
        let fields = extract_listing(PAGE, &ListingSelectors::default());
        assert_eq!(fields.title, "Перфоратор Bosch GBH 2-26");
        assert_eq!(fields.price_raw, "45990.00");
        assert_eq!(fields.company, "ТОО \"Инструмент\"");
    }

    #[test]
    fn missing_fields_stay_empty() {
        let page = r#"<html><body><h1 data-qaid="product_name">Only title</h1></body></html>"#;
        let fields = extract_listing(page, &ListingSelectors::default());
        assert_eq!(fields.title, "Only title");
        assert_eq!(fields.price_raw, "");
        assert_eq!(fields.company, "");
    }

    #[test]
    fn broken_selector_degrades_to_empty() {
        let selectors = ListingSelectors {
            title: "h1[[[".to_string(),
            ..ListingSelectors::default()
        };
        let fields = extract_listing(PAGE, &selectors);
        assert_eq!(fields.title, "");
        assert_eq!(fields.price_raw, "45990.00");
    }

    #[test]
    fn price_falls_back_to_element_text() {
        let selectors = ListingSelectors {
            price_attr: "data-missing".to_string(),
            ..ListingSelectors::default()
        };
        let fields = extract_listing(PAGE, &selectors);
        assert_eq!(fields.price_raw, "45 990 ₸");
    }
}
