use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub telegram_id: i64,
    pub name: String,
    pub username: Option<String>,
}

/// A named batch of tracked links; the unit of one scan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductGroup {
    pub id: i64,
    pub site_id: i64,
    pub owner_id: i64,
    /// Chat identity of the owner, joined from `users`.
    pub owner_chat_id: i64,
    pub title: String,
    pub is_active: bool,
    pub last_scan_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}
