//! Administration of sites, owners, groups and their links.

use std::collections::HashSet;
use std::sync::Arc;
use tracing::{info, warn};
use url::Url;

use crate::config::Config;
use crate::error::CatalogError;
use crate::export::{ExportedFile, Sheet, TableRow, TabularExport};
use crate::models::{ProductGroup, ProductLink, Site, User};
use crate::storage::Storage;

pub const MAX_GROUP_TITLE_LEN: usize = 100;

/// Trims and checks a group title.
pub fn validate_group_title(title: &str) -> Result<String, CatalogError> {
    let title = title.trim();
    if title.is_empty() {
        return Err(CatalogError::EmptyTitle);
    }

    let len = title.chars().count();
    if len > MAX_GROUP_TITLE_LEN {
        return Err(CatalogError::TitleTooLong(len));
    }

    Ok(title.to_string())
}

/// Same scheme, host and port as `prefix`, with a path at or below its path.
fn is_under_prefix(url: &Url, prefix: &Url) -> bool {
    let base = prefix.path().trim_end_matches('/');
    let path = url.path();

    url.scheme() == prefix.scheme()
        && url.host_str() == prefix.host_str()
        && url.port_or_known_default() == prefix.port_or_known_default()
        && (path == base || path.starts_with(&format!("{}/", base)))
}

/// Result of one batch link submission.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LinkImport {
    pub created: usize,
    pub rejected: usize,
    pub duplicates: usize,
}

struct InputRow<'a>(&'a ProductLink);

impl TableRow for InputRow<'_> {
    fn to_record(&self) -> Vec<String> {
        vec![
            self.0.company_name.clone().unwrap_or_default(),
            self.0.product_name.clone().unwrap_or_default(),
            self.0.url.clone(),
        ]
    }
}

pub struct Catalog {
    config: Arc<Config>,
    storage: Arc<dyn Storage>,
}

impl Catalog {
    pub fn new(config: Arc<Config>, storage: Arc<dyn Storage>) -> Self {
        Self { config, storage }
    }

    pub async fn ensure_site(&self, title: &str) -> Result<Site, CatalogError> {
        Ok(self.storage.ensure_site(title).await?)
    }

    /// Creates every configured site that is not in the store yet.
    pub async fn seed_sites(&self) -> Result<Vec<Site>, CatalogError> {
        let mut sites = Vec::new();
        for site_config in self.config.sites.values() {
            sites.push(self.ensure_site(&site_config.name).await?);
        }

        info!("{} sites available", sites.len());
        Ok(sites)
    }

    pub async fn register_user(
        &self,
        telegram_id: i64,
        name: &str,
        username: Option<&str>,
    ) -> Result<User, CatalogError> {
        Ok(self.storage.upsert_user(telegram_id, name, username).await?)
    }

    /// New groups start inactive.
    pub async fn create_group(
        &self,
        site_id: i64,
        owner_telegram_id: i64,
        title: &str,
    ) -> Result<ProductGroup, CatalogError> {
        let title = validate_group_title(title)?;

        self.storage
            .get_site(site_id)
            .await?
            .ok_or(CatalogError::SiteNotFound(site_id))?;
        let owner = self
            .storage
            .find_user(owner_telegram_id)
            .await?
            .ok_or(CatalogError::UnknownUser(owner_telegram_id))?;

        let group = self.storage.create_group(site_id, owner.id, &title).await?;
        info!("Created group '{}' (id={}) for user {}", group.title, group.id, owner_telegram_id);
        Ok(group)
    }

    pub async fn set_group_active(&self, group_id: i64, is_active: bool) -> Result<(), CatalogError> {
        if !self.storage.set_group_active(group_id, is_active).await? {
            return Err(CatalogError::GroupNotFound(group_id));
        }
        Ok(())
    }

    /// Removes the group together with its links and their history.
    pub async fn delete_group(&self, group_id: i64) -> Result<(), CatalogError> {
        if self.storage.delete_group(group_id).await? == 0 {
            return Err(CatalogError::GroupNotFound(group_id));
        }
        info!("Deleted group {}", group_id);
        Ok(())
    }

    pub async fn count_links(&self, group_id: i64) -> Result<usize, CatalogError> {
        Ok(self.storage.count_links(group_id).await?)
    }

    pub async fn delete_links(&self, group_id: i64) -> Result<usize, CatalogError> {
        let deleted = self.storage.delete_links(group_id).await?;
        info!("Deleted {} links from group {}", deleted, group_id);
        Ok(deleted)
    }

    async fn group_with_prefix(&self, group_id: i64) -> Result<(ProductGroup, Url), CatalogError> {
        let group = self
            .storage
            .get_group(group_id)
            .await?
            .ok_or(CatalogError::GroupNotFound(group_id))?;
        let site = self
            .storage
            .get_site(group.site_id)
            .await?
            .ok_or(CatalogError::SiteNotFound(group.site_id))?;
        let prefix = self
            .config
            .site_by_name(&site.title)
            .and_then(|site_config| Url::parse(&site_config.url_prefix).ok())
            .ok_or_else(|| CatalogError::UnknownSite(site.title.clone()))?;

        Ok((group, prefix))
    }

    /// Adds a batch of URLs to a group. Blank lines and in-batch repeats are
    /// dropped silently; URLs already in the group count as duplicates.
    pub async fn add_links<S: AsRef<str>>(
        &self,
        group_id: i64,
        urls: &[S],
    ) -> Result<LinkImport, CatalogError> {
        let (group, prefix) = self.group_with_prefix(group_id).await?;
        let mut seen = HashSet::new();
        let mut import = LinkImport::default();

        for raw in urls {
            let url = raw.as_ref().trim();
            if url.is_empty() || !seen.insert(url.to_string()) {
                continue;
            }

            let accepted = Url::parse(url)
                .map(|parsed| is_under_prefix(&parsed, &prefix))
                .unwrap_or(false);
            if !accepted {
                warn!("Rejected link for group '{}': {}", group.title, url);
                import.rejected += 1;
                continue;
            }

            if self.storage.add_link(group.id, url).await? {
                import.created += 1;
            } else {
                import.duplicates += 1;
            }
        }

        info!(
            "Group '{}': {} links added, {} rejected, {} already present",
            group.title, import.created, import.rejected, import.duplicates
        );
        Ok(import)
    }

    /// The submitted links as a table: company, product, URL.
    pub async fn input_table(
        &self,
        exporter: &dyn TabularExport,
        group_id: i64,
    ) -> Result<ExportedFile, CatalogError> {
        let group = self
            .storage
            .get_group(group_id)
            .await?
            .ok_or(CatalogError::GroupNotFound(group_id))?;
        let links = self.storage.links_for_group(group.id).await?;

        let rows: Vec<InputRow<'_>> = links.iter().map(InputRow).collect();
        let sheet = Sheet::new(&group.title, &["Company", "Product", "URL"], &rows);

        Ok(exporter.export(&sheet)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::export::CsvExport;
    use crate::storage::SqliteStorage;
    use pretty_assertions::assert_eq;

    async fn catalog() -> (Catalog, ProductGroup) {
        let storage = Arc::new(SqliteStorage::in_memory().unwrap());
        storage.migrate().await.unwrap();
        let catalog = Catalog::new(Arc::new(Config::default()), storage);

        let sites = catalog.seed_sites().await.unwrap();
        let satu = sites.iter().find(|s| s.title == "SATU KZ").unwrap().clone();
        catalog.register_user(5, "Owner", Some("owner")).await.unwrap();
        let group = catalog.create_group(satu.id, 5, "  Tools  ").await.unwrap();

        (catalog, group)
    }

    #[test]
    fn title_validation() {
        assert!(matches!(validate_group_title("   "), Err(CatalogError::EmptyTitle)));
        assert!(matches!(
            validate_group_title(&"x".repeat(101)),
            Err(CatalogError::TitleTooLong(101))
        ));
        assert_eq!(validate_group_title(&"я".repeat(100)).unwrap().chars().count(), 100);
    }

    #[tokio::test]
    async fn groups_are_trimmed_and_inactive() {
        let (_catalog, group) = catalog().await;
        assert_eq!(group.title, "Tools");
        assert!(!group.is_active);
        assert_eq!(group.owner_chat_id, 5);
    }

    #[tokio::test]
    async fn unregistered_owner_is_rejected() {
        let (catalog, group) = catalog().await;
        let result = catalog.create_group(group.site_id, 999, "Other").await;
        assert!(matches!(result, Err(CatalogError::UnknownUser(999))));
    }

    #[tokio::test]
    async fn add_links_sorts_out_the_batch() {
        let (catalog, group) = catalog().await;
        catalog.add_links(group.id, &["https://satu.kz/p/1"]).await.unwrap();

        let import = catalog
            .add_links(
                group.id,
                &[
                    " https://satu.kz/p/2 ",
                    "https://satu.kz/p/2",
                    "",
                    "https://satu.kz/p/1",
                    "https://www.olx.kz/d/ad",
                    "not a url",
                    "https://satu.kz.evil.example/p/1",
                    "https://satu.kzz/x",
                    "http://satu.kz/p/3",
                ],
            )
            .await
            .unwrap();

        assert_eq!(
            import,
            LinkImport {
                created: 1,
                rejected: 5,
                duplicates: 1,
            }
        );
        assert_eq!(catalog.count_links(group.id).await.unwrap(), 2);
    }

    #[test]
    fn prefix_match_stops_at_host_and_path_boundaries() {
        let shop = Url::parse("https://shop.example/catalog").unwrap();
        let accepts = |raw: &str| is_under_prefix(&Url::parse(raw).unwrap(), &shop);

        assert!(accepts("https://shop.example/catalog"));
        assert!(accepts("https://shop.example/catalog/item-1"));
        assert!(accepts("https://shop.example:443/catalog/item-1"));
        assert!(!accepts("https://shop.example/catalogue/item-1"));
        assert!(!accepts("https://shop.example.evil.example/catalog/item-1"));
        assert!(!accepts("https://shop.example:8443/catalog/item-1"));
    }

    #[tokio::test]
    async fn activation_and_deletion_need_an_existing_group() {
        let (catalog, group) = catalog().await;

        catalog.set_group_active(group.id, true).await.unwrap();
        assert!(matches!(
            catalog.set_group_active(404, true).await,
            Err(CatalogError::GroupNotFound(404))
        ));

        catalog.add_links(group.id, &["https://satu.kz/p/1"]).await.unwrap();
        assert_eq!(catalog.delete_links(group.id).await.unwrap(), 1);

        catalog.delete_group(group.id).await.unwrap();
        assert!(matches!(
            catalog.delete_group(group.id).await,
            Err(CatalogError::GroupNotFound(_))
        ));
    }

    #[tokio::test]
    async fn input_table_lists_links() {
        let (catalog, group) = catalog().await;
        catalog.add_links(group.id, &["https://satu.kz/p/1"]).await.unwrap();

        let file = catalog.input_table(&CsvExport, group.id).await.unwrap();

        assert_eq!(file.file_name, "Tools.csv");
        let text = String::from_utf8_lossy(&file.bytes);
        assert!(text.contains("Company,Product,URL"));
        assert!(text.contains(",,https://satu.kz/p/1"));
    }
}
