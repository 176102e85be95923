use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Current observable state of one tracked page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductLink {
    pub id: i64,
    pub group_id: i64,
    pub url: String,
    pub product_name: Option<String>,
    pub company_name: Option<String>,
    pub last_price: Option<f64>,
    pub views: Option<i64>,
    pub last_check: Option<DateTime<Utc>>,
}

/// The single value an observation carries; which one depends on the site.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ObservedValue {
    Price(i64),
    Views(i64),
}

impl ObservedValue {
    pub fn amount(&self) -> i64 {
        match self {
            ObservedValue::Price(v) | ObservedValue::Views(v) => *v,
        }
    }
}

impl fmt::Display for ObservedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.amount())
    }
}

/// Immutable history record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub id: i64,
    pub link_id: i64,
    pub captured_at: DateTime<Utc>,
    pub value: ObservedValue,
}

/// What an extractor read off a page.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Reading {
    Price(f64),
    Views(i64),
}

impl Reading {
    /// History stores integers; prices are truncated toward zero.
    pub fn observed(&self) -> ObservedValue {
        match self {
            Reading::Price(price) => ObservedValue::Price(price.trunc() as i64),
            Reading::Views(views) => ObservedValue::Views(*views),
        }
    }
}

/// Fields pulled from one page. Empty strings mean "not found".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Extraction {
    pub title: String,
    pub company: String,
    pub reading: Reading,
}
