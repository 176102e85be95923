use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use tracing::debug;

use crate::error::ExtractError;
use crate::extractors::ListingExtractor;
use crate::models::{Extraction, Reading};
use crate::parsers::{extract_listing, normalize_price, ListingSelectors};
use crate::utils::http::fetch_markup;
use crate::utils::retry::RetryPolicy;

/// Plain HTTP fetch followed by selector extraction.
pub struct StaticExtractor {
    client: Client,
    selectors: ListingSelectors,
    timeout: Duration,
    retry: RetryPolicy,
}

impl StaticExtractor {
    pub fn new(
        client: Client,
        selectors: ListingSelectors,
        timeout: Duration,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            client,
            selectors,
            timeout,
            retry,
        }
    }
}

#[async_trait]
impl ListingExtractor for StaticExtractor {
    async fn extract(&mut self, url: &str) -> Result<Extraction, ExtractError> {
        let markup = fetch_markup(&self.client, url, self.timeout, &self.retry).await?;
        let fields = extract_listing(&markup, &self.selectors);

        debug!(
            "Extracted from {}: title='{}' price='{}' company='{}'",
            url, fields.title, fields.price_raw, fields.company
        );

        Ok(Extraction {
            title: fields.title,
            company: fields.company,
            reading: Reading::Price(normalize_price(&fields.price_raw)),
        })
    }
}
