//! Scan engine: runs one group's links through the matching extractor,
//! persists state plus history per link, and reports progress.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::error::ScanError;
use crate::export::{Sheet, TableRow, TabularExport};
use crate::extractors::{ExtractorFactory, ListingExtractor};
use crate::models::{ProductGroup, ProductLink, Site, SiteStrategy, EMOJI_CHECK};
use crate::notify::Notifier;
use crate::storage::{LinkUpdate, Storage};

pub mod cadence;
pub mod progress;
pub mod registry;

pub use cadence::Cadence;
pub use progress::ProgressContext;
pub use registry::{ScanGuard, ScanRegistry};

/// Outcome of one group scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanSummary {
    pub group_id: i64,
    pub total: usize,
    pub processed: usize,
    pub succeeded: usize,
    pub cancelled: bool,
}

/// Row of the post-scan report: current state of one link.
#[derive(Debug, Clone)]
pub struct ScanReportRow {
    pub last_check: Option<DateTime<Utc>>,
    pub product_name: Option<String>,
    pub company_name: Option<String>,
    pub value: Option<String>,
    pub url: String,
}

impl ScanReportRow {
    fn from_link(link: &ProductLink, strategy: SiteStrategy) -> Self {
        let value = match strategy {
            SiteStrategy::StaticHtml => link.last_price.map(|price| price.to_string()),
            SiteStrategy::Browser => link.views.map(|views| views.to_string()),
        };

        Self {
            last_check: link.last_check,
            product_name: link.product_name.clone(),
            company_name: link.company_name.clone(),
            value,
            url: link.url.clone(),
        }
    }
}

impl TableRow for ScanReportRow {
    fn to_record(&self) -> Vec<String> {
        let na = || "N/A".to_string();
        vec![
            self.last_check
                .map(|at| at.format("%d.%m.%Y").to_string())
                .unwrap_or_else(na),
            self.product_name.clone().unwrap_or_else(na),
            self.company_name.clone().unwrap_or_else(na),
            self.value.clone().unwrap_or_else(na),
            self.url.clone(),
        ]
    }
}

pub struct Scanner {
    config: Arc<Config>,
    storage: Arc<dyn Storage>,
    notifier: Arc<dyn Notifier>,
    extractors: Arc<dyn ExtractorFactory>,
    exporter: Arc<dyn TabularExport>,
    registry: ScanRegistry,
}

impl Scanner {
    pub fn new(
        config: Arc<Config>,
        storage: Arc<dyn Storage>,
        notifier: Arc<dyn Notifier>,
        extractors: Arc<dyn ExtractorFactory>,
        exporter: Arc<dyn TabularExport>,
    ) -> Self {
        Self {
            config,
            storage,
            notifier,
            extractors,
            exporter,
            registry: ScanRegistry::new(),
        }
    }

    pub fn registry(&self) -> &ScanRegistry {
        &self.registry
    }

    /// Requests that an in-flight scan stop at the next link boundary.
    pub fn cancel(&self, group_id: i64) -> bool {
        self.registry.cancel(group_id)
    }

    /// Scans one group now. Rejected if the group is already being scanned.
    pub async fn scan_group(&self, group_id: i64) -> Result<ScanSummary, ScanError> {
        let guard = self
            .registry
            .try_acquire(group_id)
            .ok_or(ScanError::AlreadyRunning(group_id))?;

        self.run_scan(&guard).await
    }

    /// Scans every active group the cadence selects, one after another. A
    /// failing group is logged and does not stop the pass.
    pub async fn scan_eligible(&self, cadence: Cadence) -> Result<Vec<ScanSummary>, ScanError> {
        let now = Utc::now();
        let strategies = self.site_strategies().await?;
        let groups = self.storage.active_groups().await?;

        let eligible: Vec<ProductGroup> = groups
            .into_iter()
            .filter(|group| match strategies.get(&group.site_id) {
                Some(strategy) => cadence.is_eligible(group, *strategy, now),
                None => false,
            })
            .collect();

        if eligible.is_empty() {
            info!("No groups eligible for {} scan", cadence.name());
            return Ok(Vec::new());
        }

        info!("Starting {} scan over {} groups", cadence.name(), eligible.len());

        let mut summaries = Vec::new();
        for group in eligible {
            match self.scan_group(group.id).await {
                Ok(summary) => summaries.push(summary),
                Err(ScanError::AlreadyRunning(id)) => {
                    info!("Group {} is already being scanned, skipping", id)
                }
                Err(e) => error!("Scan of group '{}' (id={}) aborted: {}", group.title, group.id, e),
            }
        }

        info!("{} scan finished: {} groups scanned", cadence.name(), summaries.len());
        Ok(summaries)
    }

    fn strategy_for(&self, site: &Site) -> Result<SiteStrategy, ScanError> {
        self.config
            .site_by_name(&site.title)
            .map(|site_config| site_config.strategy)
            .ok_or_else(|| ScanError::UnknownSite(site.title.clone()))
    }

    async fn site_strategies(&self) -> Result<HashMap<i64, SiteStrategy>, ScanError> {
        let sites = self.storage.list_sites().await?;
        let mut strategies = HashMap::new();

        for site in sites {
            match self.strategy_for(&site) {
                Ok(strategy) => {
                    strategies.insert(site.id, strategy);
                }
                Err(e) => warn!("{}", e),
            }
        }

        Ok(strategies)
    }

    async fn run_scan(&self, guard: &ScanGuard) -> Result<ScanSummary, ScanError> {
        let group_id = guard.group_id();
        let group = self
            .storage
            .get_group(group_id)
            .await?
            .ok_or(ScanError::GroupNotFound(group_id))?;
        let site = self
            .storage
            .get_site(group.site_id)
            .await?
            .ok_or(ScanError::SiteNotFound(group.site_id))?;
        let strategy = self.strategy_for(&site)?;
        let links = self.storage.links_for_group(group.id).await?;

        info!(
            "Scanning group '{}' (id={}) on {}: {} links via {}",
            group.title,
            group.id,
            site.title,
            links.len(),
            strategy.key()
        );

        let mut extractor = self.extractors.extractor_for(strategy);
        let summary = self.scan_links(&group, &links, extractor.as_mut(), guard).await;
        extractor.shutdown().await;

        if let Err(e) = self.storage.mark_group_scanned(group.id, Utc::now()).await {
            error!("Failed to stamp scan time on group {}: {:#}", group.id, e);
        }

        info!(
            "Group '{}' done: {}/{} links scanned successfully{}",
            group.title,
            summary.succeeded,
            summary.total,
            if summary.cancelled { " (cancelled)" } else { "" }
        );

        if summary.succeeded > 0 {
            self.deliver_report(&group, strategy, &summary).await;
        }

        Ok(summary)
    }

    /// Sequential per-link loop. Never fails: link-level problems are logged
    /// and the link is skipped.
    async fn scan_links(
        &self,
        group: &ProductGroup,
        links: &[ProductLink],
        extractor: &mut dyn ListingExtractor,
        guard: &ScanGuard,
    ) -> ScanSummary {
        let total = links.len();
        let mut progress = ProgressContext::new(group.owner_chat_id);
        let mut summary = ScanSummary {
            group_id: group.id,
            total,
            processed: 0,
            succeeded: 0,
            cancelled: false,
        };

        for link in links {
            if guard.is_cancelled() {
                info!("Scan of group {} cancelled after {} links", group.id, summary.processed);
                summary.cancelled = true;
                break;
            }

            match extractor.extract(&link.url).await {
                Ok(extraction) => {
                    let update = LinkUpdate {
                        product_name: extraction.title,
                        company_name: extraction.company,
                        reading: extraction.reading,
                    };

                    match self.storage.record_observation(link.id, &update, Utc::now()).await {
                        Ok(_) => summary.succeeded += 1,
                        Err(e) => error!("Failed to persist {}: {:#}", link.url, e),
                    }
                }
                Err(e) => warn!("Skipping {} this cycle: {}", link.url, e),
            }

            summary.processed += 1;
            progress
                .report(self.notifier.as_ref(), &group.title, summary.processed, total)
                .await;
        }

        summary
    }

    async fn deliver_report(&self, group: &ProductGroup, strategy: SiteStrategy, summary: &ScanSummary) {
        let links = match self.storage.links_for_group(group.id).await {
            Ok(links) => links,
            Err(e) => {
                error!("Failed to load links for report of group {}: {:#}", group.id, e);
                return;
            }
        };

        let rows: Vec<ScanReportRow> = links
            .iter()
            .map(|link| ScanReportRow::from_link(link, strategy))
            .collect();
        let headers = ["Last check", "Product", "Company", strategy.value_label(), "URL"];
        let sheet = Sheet::new(&group.title, &headers, &rows);

        let file = match self.exporter.export(&sheet) {
            Ok(file) => file,
            Err(e) => {
                error!("Failed to export report for group {}: {:#}", group.id, e);
                return;
            }
        };

        let caption = format!(
            "{} Scan finished.\nTotal links: {}\nScanned successfully: {}\n\nReport for group: {}",
            EMOJI_CHECK, summary.total, summary.succeeded, group.title
        );

        self.notifier
            .send_document(group.owner_chat_id, &file.file_name, file.bytes, &caption)
            .await;
        info!("Report for group '{}' sent to {}", group.title, group.owner_chat_id);
    }
}
