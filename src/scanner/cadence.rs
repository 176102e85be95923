use chrono::{DateTime, Duration, Utc};

use crate::models::{ProductGroup, SiteStrategy};

/// Scheduling predicate choosing which groups a scan pass covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cadence {
    /// Every active group on a static-HTML site.
    Daily,
    /// Active browser-site groups whose last scan is older than the cooldown.
    Cooldown(Duration),
}

impl Cadence {
    pub fn is_eligible(&self, group: &ProductGroup, strategy: SiteStrategy, now: DateTime<Utc>) -> bool {
        if !group.is_active {
            return false;
        }

        match self {
            Cadence::Daily => strategy == SiteStrategy::StaticHtml,
            Cadence::Cooldown(cooldown) => {
                strategy == SiteStrategy::Browser
                    && group
                        .last_scan_at
                        .map_or(true, |last| now - last > *cooldown)
            }
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Cadence::Daily => "daily",
            Cadence::Cooldown(_) => "cooldown",
        }
    }
}
