use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::models::{Observation, ProductGroup, ProductLink, Reading, Site, User};

mod sqlite;
pub use sqlite::SqliteStorage;

/// New current-state fields for a link. Empty names keep the stored ones.
#[derive(Debug, Clone, PartialEq)]
pub struct LinkUpdate {
    pub product_name: String,
    pub company_name: String,
    pub reading: Reading,
}

#[async_trait]
pub trait Storage: Send + Sync {
    async fn migrate(&self) -> Result<()>;

    async fn ensure_site(&self, title: &str) -> Result<Site>;
    async fn get_site(&self, site_id: i64) -> Result<Option<Site>>;
    async fn list_sites(&self) -> Result<Vec<Site>>;

    async fn upsert_user(&self, telegram_id: i64, name: &str, username: Option<&str>) -> Result<User>;
    async fn find_user(&self, telegram_id: i64) -> Result<Option<User>>;

    async fn create_group(&self, site_id: i64, owner_id: i64, title: &str) -> Result<ProductGroup>;
    async fn get_group(&self, group_id: i64) -> Result<Option<ProductGroup>>;
    async fn groups_for_owner(&self, site_id: i64, owner_id: i64) -> Result<Vec<ProductGroup>>;
    async fn active_groups(&self) -> Result<Vec<ProductGroup>>;
    async fn set_group_active(&self, group_id: i64, is_active: bool) -> Result<bool>;
    async fn mark_group_scanned(&self, group_id: i64, at: DateTime<Utc>) -> Result<()>;
    /// Deletes the group with its links and their history.
    async fn delete_group(&self, group_id: i64) -> Result<usize>;

    /// Inserts a link; returns false when the URL already exists in the group.
    async fn add_link(&self, group_id: i64, url: &str) -> Result<bool>;
    /// Links of a group in insertion order.
    async fn links_for_group(&self, group_id: i64) -> Result<Vec<ProductLink>>;
    async fn count_links(&self, group_id: i64) -> Result<usize>;
    async fn delete_links(&self, group_id: i64) -> Result<usize>;

    /// Updates the link's current state and appends one observation, both
    /// stamped with `at`, in a single transaction.
    async fn record_observation(
        &self,
        link_id: i64,
        update: &LinkUpdate,
        at: DateTime<Utc>,
    ) -> Result<Observation>;

    /// Most recent observations of a link, newest first.
    async fn recent_observations(&self, link_id: i64, limit: usize) -> Result<Vec<Observation>>;
}
