use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::info;

use crate::models::{Observation, ObservedValue, ProductGroup, ProductLink, Reading, Site, User};
use crate::storage::{LinkUpdate, Storage};

const GROUP_COLUMNS: &str = "g.id, g.site_id, g.owner_id, u.telegram_id, g.title, g.is_active, g.last_scan_at, g.created_at";

const LINK_COLUMNS: &str = "id, group_id, url, product_name, company_name, last_price, views, last_check";

pub struct SqliteStorage {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStorage {
    pub async fn new(db_path: &str) -> Result<Self> {
        let conn = Connection::open(db_path)
            .context("Failed to open SQLite database")?;

        Self::from_connection(conn)
    }

    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .context("Failed to open in-memory SQLite database")?;

        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")
            .context("Failed to enable foreign keys")?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow!("SQLite connection mutex poisoned"))
    }
}

fn site_from_row(row: &Row<'_>) -> rusqlite::Result<Site> {
    Ok(Site {
        id: row.get(0)?,
        title: row.get(1)?,
        created_at: row.get(2)?,
    })
}

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        telegram_id: row.get(1)?,
        name: row.get(2)?,
        username: row.get(3)?,
    })
}

fn group_from_row(row: &Row<'_>) -> rusqlite::Result<ProductGroup> {
    Ok(ProductGroup {
        id: row.get(0)?,
        site_id: row.get(1)?,
        owner_id: row.get(2)?,
        owner_chat_id: row.get(3)?,
        title: row.get(4)?,
        is_active: row.get(5)?,
        last_scan_at: row.get(6)?,
        created_at: row.get(7)?,
    })
}

fn link_from_row(row: &Row<'_>) -> rusqlite::Result<ProductLink> {
    Ok(ProductLink {
        id: row.get(0)?,
        group_id: row.get(1)?,
        url: row.get(2)?,
        product_name: row.get(3)?,
        company_name: row.get(4)?,
        last_price: row.get(5)?,
        views: row.get(6)?,
        last_check: row.get(7)?,
    })
}

fn observation_from_row(row: &Row<'_>) -> rusqlite::Result<Observation> {
    let price: Option<i64> = row.get(3)?;
    let views: Option<i64> = row.get(4)?;
    let value = match price {
        Some(price) => ObservedValue::Price(price),
        None => ObservedValue::Views(views.unwrap_or_default()),
    };

    Ok(Observation {
        id: row.get(0)?,
        link_id: row.get(1)?,
        captured_at: row.get(2)?,
        value,
    })
}

fn query_group(conn: &Connection, group_id: i64) -> Result<Option<ProductGroup>> {
    let sql = format!(
        "SELECT {GROUP_COLUMNS} FROM product_groups g JOIN users u ON u.id = g.owner_id WHERE g.id = ?1"
    );
    let group = conn
        .query_row(&sql, params![group_id], group_from_row)
        .optional()?;

    Ok(group)
}

#[async_trait]
impl Storage for SqliteStorage {
    async fn migrate(&self) -> Result<()> {
        let conn = self.lock()?;

        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS sites (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                title TEXT NOT NULL UNIQUE,
                created_at TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS users (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                telegram_id INTEGER NOT NULL UNIQUE,
                name TEXT NOT NULL,
                username TEXT
            );
            CREATE TABLE IF NOT EXISTS product_groups (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                site_id INTEGER NOT NULL REFERENCES sites(id) ON DELETE CASCADE,
                owner_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                title TEXT NOT NULL,
                is_active INTEGER NOT NULL DEFAULT 0,
                last_scan_at TEXT,
                created_at TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS product_links (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                group_id INTEGER NOT NULL REFERENCES product_groups(id) ON DELETE CASCADE,
                url TEXT NOT NULL,
                product_name TEXT,
                company_name TEXT,
                last_price REAL,
                views INTEGER,
                last_check TEXT,
                UNIQUE (url, group_id)
            );
            CREATE TABLE IF NOT EXISTS observations (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                link_id INTEGER NOT NULL REFERENCES product_links(id) ON DELETE CASCADE,
                captured_at TEXT NOT NULL,
                price INTEGER,
                views INTEGER,
                CHECK ((price IS NULL) <> (views IS NULL))
            );
            CREATE INDEX IF NOT EXISTS idx_groups_active ON product_groups(is_active);
            CREATE INDEX IF NOT EXISTS idx_links_group ON product_links(group_id);
            CREATE INDEX IF NOT EXISTS idx_observations_link_time
                ON observations(link_id, captured_at DESC);",
        )?;

        info!("Database migration completed");
        Ok(())
    }

    async fn ensure_site(&self, title: &str) -> Result<Site> {
        let conn = self.lock()?;

        conn.execute(
            "INSERT OR IGNORE INTO sites (title, created_at) VALUES (?1, ?2)",
            params![title, Utc::now()],
        )?;

        let site = conn.query_row(
            "SELECT id, title, created_at FROM sites WHERE title = ?1",
            params![title],
            site_from_row,
        )?;

        Ok(site)
    }

    async fn get_site(&self, site_id: i64) -> Result<Option<Site>> {
        let conn = self.lock()?;

        let site = conn
            .query_row(
                "SELECT id, title, created_at FROM sites WHERE id = ?1",
                params![site_id],
                site_from_row,
            )
            .optional()?;

        Ok(site)
    }

    async fn list_sites(&self) -> Result<Vec<Site>> {
        let conn = self.lock()?;

        let mut stmt = conn.prepare("SELECT id, title, created_at FROM sites ORDER BY id")?;
        let sites = stmt
            .query_map([], site_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(sites)
    }

    async fn upsert_user(&self, telegram_id: i64, name: &str, username: Option<&str>) -> Result<User> {
        let conn = self.lock()?;

        conn.execute(
            "INSERT INTO users (telegram_id, name, username) VALUES (?1, ?2, ?3)
             ON CONFLICT(telegram_id) DO UPDATE SET name = excluded.name, username = excluded.username",
            params![telegram_id, name, username],
        )?;

        let user = conn.query_row(
            "SELECT id, telegram_id, name, username FROM users WHERE telegram_id = ?1",
            params![telegram_id],
            user_from_row,
        )?;

        Ok(user)
    }

    async fn find_user(&self, telegram_id: i64) -> Result<Option<User>> {
        let conn = self.lock()?;

        let user = conn
            .query_row(
                "SELECT id, telegram_id, name, username FROM users WHERE telegram_id = ?1",
                params![telegram_id],
                user_from_row,
            )
            .optional()?;

        Ok(user)
    }

    async fn create_group(&self, site_id: i64, owner_id: i64, title: &str) -> Result<ProductGroup> {
        let conn = self.lock()?;

        conn.execute(
            "INSERT INTO product_groups (site_id, owner_id, title, is_active, created_at)
             VALUES (?1, ?2, ?3, 0, ?4)",
            params![site_id, owner_id, title, Utc::now()],
        )
        .context("Failed to insert product group")?;

        let group_id = conn.last_insert_rowid();
        query_group(&conn, group_id)?
            .ok_or_else(|| anyhow!("group {} vanished after insert", group_id))
    }

    async fn get_group(&self, group_id: i64) -> Result<Option<ProductGroup>> {
        let conn = self.lock()?;
        query_group(&conn, group_id)
    }

    async fn groups_for_owner(&self, site_id: i64, owner_id: i64) -> Result<Vec<ProductGroup>> {
        let conn = self.lock()?;

        let sql = format!(
            "SELECT {GROUP_COLUMNS} FROM product_groups g JOIN users u ON u.id = g.owner_id
             WHERE g.site_id = ?1 AND g.owner_id = ?2 ORDER BY g.id"
        );
        let mut stmt = conn.prepare(&sql)?;
        let groups = stmt
            .query_map(params![site_id, owner_id], group_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(groups)
    }

    async fn active_groups(&self) -> Result<Vec<ProductGroup>> {
        let conn = self.lock()?;

        let sql = format!(
            "SELECT {GROUP_COLUMNS} FROM product_groups g JOIN users u ON u.id = g.owner_id
             WHERE g.is_active = 1 ORDER BY g.id"
        );
        let mut stmt = conn.prepare(&sql)?;
        let groups = stmt
            .query_map([], group_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(groups)
    }

    async fn set_group_active(&self, group_id: i64, is_active: bool) -> Result<bool> {
        let conn = self.lock()?;

        let changed = conn.execute(
            "UPDATE product_groups SET is_active = ?1 WHERE id = ?2",
            params![is_active, group_id],
        )?;

        Ok(changed > 0)
    }

    async fn mark_group_scanned(&self, group_id: i64, at: DateTime<Utc>) -> Result<()> {
        let conn = self.lock()?;

        conn.execute(
            "UPDATE product_groups SET last_scan_at = ?1 WHERE id = ?2",
            params![at, group_id],
        )?;

        Ok(())
    }

    async fn delete_group(&self, group_id: i64) -> Result<usize> {
        let conn = self.lock()?;

        let deleted = conn.execute("DELETE FROM product_groups WHERE id = ?1", params![group_id])?;
        Ok(deleted)
    }

    async fn add_link(&self, group_id: i64, url: &str) -> Result<bool> {
        let conn = self.lock()?;

        let inserted = conn
            .execute(
                "INSERT OR IGNORE INTO product_links (group_id, url) VALUES (?1, ?2)",
                params![group_id, url],
            )
            .with_context(|| format!("Failed to insert link {}", url))?;

        Ok(inserted > 0)
    }

    async fn links_for_group(&self, group_id: i64) -> Result<Vec<ProductLink>> {
        let conn = self.lock()?;

        let sql = format!("SELECT {LINK_COLUMNS} FROM product_links WHERE group_id = ?1 ORDER BY id");
        let mut stmt = conn.prepare(&sql)?;
        let links = stmt
            .query_map(params![group_id], link_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(links)
    }

    async fn count_links(&self, group_id: i64) -> Result<usize> {
        let conn = self.lock()?;

        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM product_links WHERE group_id = ?1",
            params![group_id],
            |row| row.get(0),
        )?;

        Ok(count as usize)
    }

    async fn delete_links(&self, group_id: i64) -> Result<usize> {
        let conn = self.lock()?;

        let deleted = conn.execute("DELETE FROM product_links WHERE group_id = ?1", params![group_id])?;
        Ok(deleted)
    }

    async fn record_observation(
        &self,
        link_id: i64,
        update: &LinkUpdate,
        at: DateTime<Utc>,
    ) -> Result<Observation> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        let (last_price, views) = match update.reading {
            Reading::Price(price) => (Some(price), None),
            Reading::Views(views) => (None, Some(views)),
        };

        let changed = tx.execute(
            "UPDATE product_links SET
                product_name = COALESCE(NULLIF(?1, ''), product_name),
                company_name = COALESCE(NULLIF(?2, ''), company_name),
                last_price = COALESCE(?3, last_price),
                views = COALESCE(?4, views),
                last_check = ?5
             WHERE id = ?6",
            params![update.product_name, update.company_name, last_price, views, at, link_id],
        )?;

        if changed == 0 {
            bail!("link {} not found", link_id);
        }

        let value = update.reading.observed();
        let (price_value, views_value) = match value {
            ObservedValue::Price(price) => (Some(price), None),
            ObservedValue::Views(views) => (None, Some(views)),
        };

        tx.execute(
            "INSERT INTO observations (link_id, captured_at, price, views) VALUES (?1, ?2, ?3, ?4)",
            params![link_id, at, price_value, views_value],
        )?;
        let id = tx.last_insert_rowid();

        tx.commit().context("Failed to commit observation")?;

        Ok(Observation {
            id,
            link_id,
            captured_at: at,
            value,
        })
    }

    async fn recent_observations(&self, link_id: i64, limit: usize) -> Result<Vec<Observation>> {
        let conn = self.lock()?;

        let mut stmt = conn.prepare(
            "SELECT id, link_id, captured_at, price, views FROM observations
             WHERE link_id = ?1 ORDER BY captured_at DESC, id DESC LIMIT ?2",
        )?;
        let observations = stmt
            .query_map(params![link_id, limit as i64], observation_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(observations)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use pretty_assertions::assert_eq;

    async fn seeded() -> (SqliteStorage, ProductGroup) {
        let storage = SqliteStorage::in_memory().unwrap();
        storage.migrate().await.unwrap();
        let site = storage.ensure_site("SATU KZ").await.unwrap();
        let user = storage.upsert_user(42, "Owner", None).await.unwrap();
        let group = storage.create_group(site.id, user.id, "Tools").await.unwrap();
        (storage, group)
    }

    fn price_update(price: f64) -> LinkUpdate {
        LinkUpdate {
            product_name: "Drill".to_string(),
            company_name: String::new(),
            reading: Reading::Price(price),
        }
    }

    #[tokio::test]
    async fn ensure_site_is_idempotent() {
        let storage = SqliteStorage::in_memory().unwrap();
        storage.migrate().await.unwrap();

        let first = storage.ensure_site("SATU KZ").await.unwrap();
        let second = storage.ensure_site("SATU KZ").await.unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(storage.list_sites().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn new_groups_start_inactive_with_owner_chat() {
        let (storage, group) = seeded().await;

        assert!(!group.is_active);
        assert_eq!(group.owner_chat_id, 42);
        assert!(storage.active_groups().await.unwrap().is_empty());

        assert!(storage.set_group_active(group.id, true).await.unwrap());
        assert_eq!(storage.active_groups().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn url_uniqueness_is_scoped_to_group() {
        let (storage, group) = seeded().await;
        let other = storage
            .create_group(group.site_id, group.owner_id, "Other")
            .await
            .unwrap();

        assert!(storage.add_link(group.id, "https://satu.kz/p1").await.unwrap());
        assert!(!storage.add_link(group.id, "https://satu.kz/p1").await.unwrap());
        assert!(storage.add_link(other.id, "https://satu.kz/p1").await.unwrap());
        assert_eq!(storage.count_links(group.id).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn observation_and_state_share_timestamp() {
        let (storage, group) = seeded().await;
        storage.add_link(group.id, "https://satu.kz/p1").await.unwrap();
        let link = storage.links_for_group(group.id).await.unwrap().remove(0);

        let at = Utc::now();
        let observation = storage
            .record_observation(link.id, &price_update(150.75), at)
            .await
            .unwrap();

        let link = storage.links_for_group(group.id).await.unwrap().remove(0);
        assert_eq!(link.last_check, Some(at));
        assert_eq!(link.last_price, Some(150.75));
        assert_eq!(link.product_name.as_deref(), Some("Drill"));
        assert_eq!(link.company_name, None);
        assert_eq!(observation.value, ObservedValue::Price(150));
        assert_eq!(observation.captured_at, at);
    }

    #[tokio::test]
    async fn missing_link_writes_nothing() {
        let (storage, _group) = seeded().await;

        let result = storage
            .record_observation(9999, &price_update(10.0), Utc::now())
            .await;

        assert!(result.is_err());
        assert!(storage.recent_observations(9999, 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn failed_history_insert_rolls_back_state() {
        let (storage, group) = seeded().await;
        storage.add_link(group.id, "https://satu.kz/p1").await.unwrap();
        let link = storage.links_for_group(group.id).await.unwrap().remove(0);
        let first_at = Utc::now() - Duration::hours(1);
        storage
            .record_observation(link.id, &price_update(100.0), first_at)
            .await
            .unwrap();

        storage
            .lock()
            .unwrap()
            .execute_batch("DROP TABLE observations;")
            .unwrap();

        let update = LinkUpdate {
            product_name: "Hammer".to_string(),
            company_name: "Other Shop".to_string(),
            reading: Reading::Price(250.0),
        };
        let result = storage.record_observation(link.id, &update, Utc::now()).await;
        assert!(result.is_err());

        let after = storage.links_for_group(group.id).await.unwrap().remove(0);
        assert_eq!(after.last_price, Some(100.0));
        assert_eq!(after.last_check, Some(first_at));
        assert_eq!(after.product_name.as_deref(), Some("Drill"));
        assert_eq!(after.company_name, None);
    }

    #[tokio::test]
    async fn recent_observations_are_newest_first() {
        let (storage, group) = seeded().await;
        storage.add_link(group.id, "https://satu.kz/p1").await.unwrap();
        let link = storage.links_for_group(group.id).await.unwrap().remove(0);

        let start = Utc::now();
        for (offset, price) in [(0, 100.0), (1, 200.0), (2, 250.0)] {
            storage
                .record_observation(link.id, &price_update(price), start + Duration::minutes(offset))
                .await
                .unwrap();
        }

        let recent = storage.recent_observations(link.id, 2).await.unwrap();
        let values: Vec<i64> = recent.iter().map(|o| o.value.amount()).collect();
        assert_eq!(values, vec![250, 200]);
    }

    #[tokio::test]
    async fn deleting_group_cascades() {
        let (storage, group) = seeded().await;
        storage.add_link(group.id, "https://satu.kz/p1").await.unwrap();
        let link = storage.links_for_group(group.id).await.unwrap().remove(0);
        storage
            .record_observation(link.id, &price_update(10.0), Utc::now())
            .await
            .unwrap();

        assert_eq!(storage.delete_group(group.id).await.unwrap(), 1);
        assert!(storage.get_group(group.id).await.unwrap().is_none());
        assert!(storage.links_for_group(group.id).await.unwrap().is_empty());
        assert!(storage.recent_observations(link.id, 10).await.unwrap().is_empty());
    }
}
