//! Before/after analytics over persisted history. Read-only.

use anyhow::Result;
use tracing::info;

use crate::export::{ExportedFile, Sheet, TableRow, TabularExport};
use crate::storage::Storage;

mod diff;
pub use diff::{diff, LinkDiff, Trend};

pub const DIFF_HEADERS: [&str; 8] = [
    "Company", "Product", "Previous", "Latest", "Delta", "Percent", "Trend", "URL",
];

const INSUFFICIENT_DATA: &str = "insufficient data";

/// One link's line in the diff report.
#[derive(Debug, Clone, PartialEq)]
pub struct DiffRow {
    pub company_name: Option<String>,
    pub product_name: Option<String>,
    pub url: String,
    pub diff: LinkDiff,
}

impl TableRow for DiffRow {
    fn to_record(&self) -> Vec<String> {
        let mut record = vec![
            self.company_name.clone().unwrap_or_default(),
            self.product_name.clone().unwrap_or_default(),
        ];

        match &self.diff {
            LinkDiff::Comparison {
                previous,
                current,
                delta,
                percent,
                trend,
            } => record.extend([
                previous.to_string(),
                current.to_string(),
                delta.to_string(),
                format!("{:.2}", percent),
                trend.marker().to_string(),
            ]),
            LinkDiff::InsufficientData { latest } => record.extend([
                String::new(),
                latest.to_string(),
                String::new(),
                String::new(),
                INSUFFICIENT_DATA.to_string(),
            ]),
        }

        record.push(self.url.clone());
        record
    }
}

/// Diff rows for every link of the group that has any history, in link
/// order. `None` when no link has been observed yet.
pub async fn build_diff_report(storage: &dyn Storage, group_id: i64) -> Result<Option<Vec<DiffRow>>> {
    let links = storage.links_for_group(group_id).await?;
    let mut rows = Vec::new();

    for link in links {
        let history = storage.recent_observations(link.id, 2).await?;
        if let Some(diff) = diff(&history) {
            rows.push(DiffRow {
                company_name: link.company_name,
                product_name: link.product_name,
                url: link.url,
                diff,
            });
        }
    }

    if rows.is_empty() {
        info!("No history to diff for group {}", group_id);
        return Ok(None);
    }

    Ok(Some(rows))
}

pub async fn diff_report_table(
    storage: &dyn Storage,
    exporter: &dyn TabularExport,
    group_id: i64,
    title: &str,
) -> Result<Option<ExportedFile>> {
    let Some(rows) = build_diff_report(storage, group_id).await? else {
        return Ok(None);
    };

    let sheet = Sheet::new(title, &DIFF_HEADERS, &rows);
    exporter.export(&sheet).map(Some)
}
