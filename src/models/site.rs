use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// How pages of a site are turned into readings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SiteStrategy {
    /// Plain HTTP GET plus selector extraction; records prices.
    StaticHtml,
    /// Headless browser rendering; records view counts.
    Browser,
}

impl SiteStrategy {
    pub fn key(&self) -> &'static str {
        match self {
            SiteStrategy::StaticHtml => "static_html",
            SiteStrategy::Browser => "browser",
        }
    }

    /// Column header for the value this strategy records.
    pub fn value_label(&self) -> &'static str {
        match self {
            SiteStrategy::StaticHtml => "Price",
            SiteStrategy::Browser => "Views",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Site {
    pub id: i64,
    pub title: String,
    pub created_at: DateTime<Utc>,
}
