use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

use crate::models::SiteStrategy;
use crate::parsers::ListingSelectors;
use crate::utils::retry::{Backoff, RetryPolicy};

const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub database_path: String,
    pub user_agent: String,
    pub sites: HashMap<String, SiteConfig>,
    pub listing: ListingSelectors,
    pub http: HttpConfig,
    pub browser: BrowserConfig,
    pub schedule: ScheduleConfig,
    pub telegram: TelegramConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SiteConfig {
    /// Display title, matches `sites.title` in the store.
    pub name: String,
    pub strategy: SiteStrategy,
    /// Submitted links must start with this prefix.
    pub url_prefix: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub timeout_secs: u64,
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub pool_max_idle_per_host: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserConfig {
    pub headless: bool,
    pub chrome_executable: Option<String>,
    pub navigation_timeout_secs: u64,
    pub settle_delay_ms: u64,
    pub blocked_backoff_secs: u64,
    pub max_attempts: u32,
    pub counter_wait_secs: u64,
    pub scroll_steps: u32,
    pub view_counter_selector: String,
    pub title_selector: String,
    pub block_markers: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    pub daily_interval_hours: u64,
    pub browser_poll_minutes: u64,
    pub browser_cooldown_days: i64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TelegramConfig {
    pub bot_token: Option<String>,
    pub api_base: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub json: bool,
}

impl Default for Config {
    fn default() -> Self {
        let mut sites = HashMap::new();

        sites.insert(
            "satu".to_string(),
            SiteConfig {
                name: "SATU KZ".to_string(),
                strategy: SiteStrategy::StaticHtml,
                url_prefix: "https://satu.kz".to_string(),
            },
        );

        sites.insert(
            "olx".to_string(),
            SiteConfig {
                name: "OLX KZ".to_string(),
                strategy: SiteStrategy::Browser,
                url_prefix: "https://www.olx.kz".to_string(),
            },
        );

        Self {
            database_path: "listing_monitor.db".to_string(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            sites,
            listing: ListingSelectors::default(),
            http: HttpConfig::default(),
            browser: BrowserConfig::default(),
            schedule: ScheduleConfig::default(),
            telegram: TelegramConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 10,
            max_attempts: 3,
            base_delay_ms: 100,
            pool_max_idle_per_host: 6,
        }
    }
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            headless: true,
            chrome_executable: None,
            navigation_timeout_secs: 60,
            settle_delay_ms: 3_000,
            blocked_backoff_secs: 30,
            max_attempts: 3,
            counter_wait_secs: 10,
            scroll_steps: 3,
            view_counter_selector: "[data-testid=\"page-view-counter\"]".to_string(),
            title_selector: "[data-cy=\"ad_title\"], h1".to_string(),
            block_markers: vec![
                "Access Denied".to_string(),
                "captcha".to_string(),
                "Too Many Requests".to_string(),
                "Доступ ограничен".to_string(),
            ],
        }
    }
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            daily_interval_hours: 24,
            browser_poll_minutes: 5,
            browser_cooldown_days: 7,
        }
    }
}

impl Config {
    /// Defaults, then `listing_monitor.{toml,yaml,json}` if present, then
    /// `LISTING_MONITOR__*` environment variables.
    pub fn load() -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name("listing_monitor").required(false))
            .add_source(
                config::Environment::with_prefix("LISTING_MONITOR")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to read configuration sources")?;

        let config: Config = settings
            .try_deserialize()
            .context("Failed to deserialize configuration")?;
        config.validate().context("Invalid configuration")?;

        Ok(config)
    }

    /// Rejects values the scheduler cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.schedule.daily_interval_hours == 0 {
            bail!("schedule.daily_interval_hours must be at least 1");
        }
        if self.schedule.browser_poll_minutes == 0 {
            bail!("schedule.browser_poll_minutes must be at least 1");
        }
        if self.schedule.browser_cooldown_days < 0 {
            bail!("schedule.browser_cooldown_days must not be negative");
        }

        Ok(())
    }

    /// Looks up the configured site whose display title matches `title`.
    pub fn site_by_name(&self, title: &str) -> Option<&SiteConfig> {
        self.sites.values().find(|site| site.name == title)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http.timeout_secs)
    }

    pub fn http_retry(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.http.max_attempts,
            Duration::from_millis(self.http.base_delay_ms),
            Backoff::Linear,
        )
    }
}

impl BrowserConfig {
    pub fn retry(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.max_attempts,
            Duration::from_secs(self.blocked_backoff_secs),
            Backoff::Fixed,
        )
    }

    pub fn navigation_timeout(&self) -> Duration {
        Duration::from_secs(self.navigation_timeout_secs)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub fn counter_wait(&self) -> Duration {
        Duration::from_secs(self.counter_wait_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_map_titles_to_strategies() {
        let config = Config::default();

        let satu = config.site_by_name("SATU KZ").expect("satu configured");
        assert_eq!(satu.strategy, SiteStrategy::StaticHtml);
        assert_eq!(satu.url_prefix, "https://satu.kz");

        let olx = config.site_by_name("OLX KZ").expect("olx configured");
        assert_eq!(olx.strategy, SiteStrategy::Browser);

        assert!(config.site_by_name("Unknown").is_none());
    }

    #[test]
    fn zero_scheduler_intervals_are_rejected() {
        assert!(Config::default().validate().is_ok());

        let mut config = Config::default();
        config.schedule.daily_interval_hours = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("daily_interval_hours"));

        let mut config = Config::default();
        config.schedule.browser_poll_minutes = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("browser_poll_minutes"));
    }

    #[test]
    fn http_retry_is_linear_with_three_attempts() {
        let policy = Config::default().http_retry();
        assert_eq!(policy.max_attempts(), 3);
        assert_eq!(policy.delay_for(1), Duration::from_millis(100));
        assert_eq!(policy.delay_for(2), Duration::from_millis(200));
    }
}
