use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use listing_monitor::catalog::Catalog;
use listing_monitor::config::Config;
use listing_monitor::export::CsvExport;
use listing_monitor::extractors::DefaultExtractors;
use listing_monitor::notify::{LogNotifier, Notifier, TelegramNotifier};
use listing_monitor::scanner::{Cadence, Scanner};
use listing_monitor::storage::{SqliteStorage, Storage};
use listing_monitor::utils;

fn init_logging(json: bool) -> Result<()> {
    let filter = EnvFilter::from_default_env().add_directive("listing_monitor=info".parse()?);

    if json {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    Ok(())
}

/// Runs scan passes for one cadence forever.
async fn drive(scanner: Arc<Scanner>, cadence: Cadence, every: Duration) {
    let mut ticker = interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;

        match scanner.scan_eligible(cadence).await {
            Ok(summaries) => {
                let succeeded: usize = summaries.iter().map(|s| s.succeeded).sum();
                info!(
                    "{} pass done: {} groups, {} links updated; next in {:?}",
                    cadence.name(),
                    summaries.len(),
                    succeeded,
                    every
                );
            }
            Err(e) => error!("{} pass failed: {}", cadence.name(), e),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = Arc::new(Config::load()?);
    init_logging(config.logging.json)?;

    info!("Starting Listing Monitor");

    // Storage
    let storage = Arc::new(SqliteStorage::new(&config.database_path).await?);
    storage.migrate().await?;
    let storage: Arc<dyn Storage> = storage;

    let catalog = Catalog::new(config.clone(), storage.clone());
    catalog.seed_sites().await?;

    // Shared HTTP client with connection pooling
    let client = utils::http::create_client(&config)?;

    let notifier: Arc<dyn Notifier> = match &config.telegram.bot_token {
        Some(token) => Arc::new(TelegramNotifier::new(
            client.clone(),
            token.clone(),
            config.telegram.api_base.clone(),
        )),
        None => {
            info!("No Telegram bot token configured, notifications go to the log");
            Arc::new(LogNotifier)
        }
    };

    let scanner = Arc::new(Scanner::new(
        config.clone(),
        storage,
        notifier,
        Arc::new(DefaultExtractors::new(config.clone(), client)),
        Arc::new(CsvExport),
    ));

    let schedule = &config.schedule;
    let daily = tokio::spawn(drive(
        scanner.clone(),
        Cadence::Daily,
        Duration::from_secs(schedule.daily_interval_hours * 3600),
    ));
    let cooldown = tokio::spawn(drive(
        scanner.clone(),
        Cadence::Cooldown(chrono::Duration::days(schedule.browser_cooldown_days)),
        Duration::from_secs(schedule.browser_poll_minutes * 60),
    ));

    tokio::select! {
        _ = tokio::signal::ctrl_c() => info!("Shutdown requested"),
        result = daily => error!("Daily scheduler stopped: {:?}", result),
        result = cooldown => error!("Cooldown scheduler stopped: {:?}", result),
    }

    Ok(())
}
