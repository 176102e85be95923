use async_trait::async_trait;
use reqwest::Client;
use std::sync::Arc;

use crate::config::Config;
use crate::error::ExtractError;
use crate::models::{Extraction, SiteStrategy};

mod browser;
mod static_html;

pub use browser::BrowserExtractor;
pub use static_html::StaticExtractor;

/// Turns one listing URL into a reading.
///
/// An extractor lives for exactly one group scan. Callers must call
/// [`ListingExtractor::shutdown`] once the scan ends, whatever the outcome.
#[async_trait]
pub trait ListingExtractor: Send {
    async fn extract(&mut self, url: &str) -> Result<Extraction, ExtractError>;

    /// Releases any session held by the extractor.
    async fn shutdown(&mut self) {}
}

/// Builds the extractor variant for a site strategy.
pub trait ExtractorFactory: Send + Sync {
    fn extractor_for(&self, strategy: SiteStrategy) -> Box<dyn ListingExtractor>;
}

/// Production factory: shared HTTP client for static sites, a fresh browser
/// session per scan for protected ones.
pub struct DefaultExtractors {
    config: Arc<Config>,
    client: Client,
}

impl DefaultExtractors {
    pub fn new(config: Arc<Config>, client: Client) -> Self {
        Self { config, client }
    }
}

impl ExtractorFactory for DefaultExtractors {
    fn extractor_for(&self, strategy: SiteStrategy) -> Box<dyn ListingExtractor> {
        match strategy {
            SiteStrategy::StaticHtml => Box::new(StaticExtractor::new(
                self.client.clone(),
                self.config.listing.clone(),
                self.config.http_timeout(),
                self.config.http_retry(),
            )),
            SiteStrategy::Browser => Box::new(BrowserExtractor::new(
                self.config.browser.clone(),
                self.config.user_agent.clone(),
            )),
        }
    }
}
