use async_trait::async_trait;
use chromiumoxide::{Browser, BrowserConfig as ChromeConfig, Page};
use futures::StreamExt;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout, Instant};
use tracing::{debug, info, warn};

use crate::config::BrowserConfig;
use crate::error::ExtractError;
use crate::extractors::ListingExtractor;
use crate::models::{Extraction, Reading};
use crate::parsers::{clean_text, detect_blocking, parse_view_count};
use crate::utils::retry::RetryPolicy;

const NAVIGATION_STATUS_SCRIPT: &str = r#"
(() => {
    const entry = performance.getEntriesByType('navigation')[0];
    return entry && entry.responseStatus ? entry.responseStatus : null;
})()
"#;

const SCROLL_SCRIPT: &str = "window.scrollBy(0, Math.max(400, document.body.scrollHeight / 3)); true";

const SCROLL_PAUSE: Duration = Duration::from_millis(700);
const COUNTER_POLL: Duration = Duration::from_millis(500);

/// Renders protected pages in headless Chrome and reads their view counter.
///
/// One browser and one page are launched lazily on the first link and reused
/// for every following link of the scan.
pub struct BrowserExtractor {
    settings: BrowserConfig,
    user_agent: String,
    retry: RetryPolicy,
    session: Option<BrowserSession>,
}

struct BrowserSession {
    browser: Browser,
    page: Page,
    handler: JoinHandle<()>,
}

impl Drop for BrowserSession {
    fn drop(&mut self) {
        self.handler.abort();
    }
}

enum PageOutcome {
    Loaded(Extraction),
    Blocked,
}

impl BrowserExtractor {
    pub fn new(settings: BrowserConfig, user_agent: String) -> Self {
        let retry = settings.retry();
        Self {
            settings,
            user_agent,
            retry,
            session: None,
        }
    }

    async fn ensure_session(&mut self) -> Result<Page, ExtractError> {
        if let Some(session) = &self.session {
            return Ok(session.page.clone());
        }

        info!("Launching browser (headless={})", self.settings.headless);

        let mut builder = ChromeConfig::builder()
            .request_timeout(self.settings.navigation_timeout())
            .arg("--disable-blink-features=AutomationControlled")
            .arg("--disable-dev-shm-usage")
            .arg("--no-first-run")
            .arg("--no-default-browser-check")
            .arg("--no-sandbox")
            .arg("--disable-gpu");

        if !self.settings.headless {
            builder = builder.with_head();
        }

        if let Some(path) = &self.settings.chrome_executable {
            builder = builder.chrome_executable(path);
        }

        let config = builder
            .build()
            .map_err(|e| ExtractError::Session(format!("Failed to build browser config: {}", e)))?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| ExtractError::Session(format!("Failed to launch browser: {}", e)))?;

        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    break;
                }
            }
        });

        let page = browser
            .new_page("about:blank")
            .await
            .map_err(|e| ExtractError::Session(format!("Failed to open page: {}", e)))?;

        page.set_user_agent(self.user_agent.as_str())
            .await
            .map_err(|e| ExtractError::Session(format!("Failed to set user agent: {}", e)))?;

        self.session = Some(BrowserSession {
            browser,
            page: page.clone(),
            handler,
        });

        Ok(page)
    }
}

/// Page operations a listing render needs.
#[async_trait]
trait PageDriver: Send + Sync {
    async fn navigate(&self, url: &str) -> Result<(), String>;
    /// HTTP status of the last navigation, if the page exposes it.
    async fn response_status(&self) -> Option<u16>;
    async fn markup(&self) -> Result<String, String>;
    async fn scroll(&self) -> Result<(), String>;
    /// Inner text of the first element matching `selector`.
    async fn text_of(&self, selector: &str) -> Option<String>;
    async fn document_title(&self) -> Option<String>;
}

#[async_trait]
impl PageDriver for Page {
    async fn navigate(&self, url: &str) -> Result<(), String> {
        self.goto(url).await.map(|_| ()).map_err(|e| e.to_string())
    }

    async fn response_status(&self) -> Option<u16> {
        match self.evaluate(NAVIGATION_STATUS_SCRIPT.to_string()).await {
            Ok(result) => result.into_value::<Option<u16>>().unwrap_or(None),
            Err(e) => {
                debug!("Could not read navigation status: {}", e);
                None
            }
        }
    }

    async fn markup(&self) -> Result<String, String> {
        self.content().await.map_err(|e| e.to_string())
    }

    async fn scroll(&self) -> Result<(), String> {
        self.evaluate(SCROLL_SCRIPT.to_string())
            .await
            .map(|_| ())
            .map_err(|e| e.to_string())
    }

    async fn text_of(&self, selector: &str) -> Option<String> {
        let element = self.find_element(selector).await.ok()?;
        element.inner_text().await.ok().flatten()
    }

    async fn document_title(&self) -> Option<String> {
        self.get_title().await.ok().flatten()
    }
}

/// Renders `url` up to the policy's attempt bound. The last attempt's
/// outcome decides between `Blocked` and `Browser` once attempts run out.
async fn render_listing(
    page: &dyn PageDriver,
    settings: &BrowserConfig,
    retry: &RetryPolicy,
    url: &str,
) -> Result<Extraction, ExtractError> {
    let max_attempts = retry.max_attempts();
    let mut blocked = false;
    let mut last_reason = String::new();

    for attempt in 1..=max_attempts {
        debug!("Rendering {} (attempt {}/{})", url, attempt, max_attempts);

        match load_page(page, settings, url).await {
            Ok(PageOutcome::Loaded(extraction)) => return Ok(extraction),
            Ok(PageOutcome::Blocked) => {
                warn!("Blocked on {} (attempt {}/{})", url, attempt, max_attempts);
                blocked = true;
            }
            Err(reason) => {
                warn!("Failed to render {} (attempt {}/{}): {}", url, attempt, max_attempts, reason);
                blocked = false;
                last_reason = reason;
            }
        }

        if retry.has_next(attempt) {
            sleep(retry.delay_for(attempt)).await;
        }
    }

    if blocked {
        Err(ExtractError::Blocked {
            url: url.to_string(),
            attempts: max_attempts,
        })
    } else {
        Err(ExtractError::Browser {
            url: url.to_string(),
            attempts: max_attempts,
            reason: last_reason,
        })
    }
}

async fn load_page(page: &dyn PageDriver, settings: &BrowserConfig, url: &str) -> Result<PageOutcome, String> {
    match timeout(settings.navigation_timeout(), page.navigate(url)).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => return Err(format!("navigation failed: {}", e)),
        Err(_) => return Err("navigation timed out".to_string()),
    }

    sleep(settings.settle_delay()).await;

    let status = page.response_status().await;
    let content = page
        .markup()
        .await
        .map_err(|e| format!("failed to read content: {}", e))?;

    if detect_blocking(status, &content, &settings.block_markers) {
        return Ok(PageOutcome::Blocked);
    }

    for _ in 0..settings.scroll_steps {
        if let Err(e) = page.scroll().await {
            debug!("Scroll failed on {}: {}", url, e);
            break;
        }
        sleep(SCROLL_PAUSE).await;
    }

    let views = match wait_for_counter(page, settings).await {
        Some(text) => parse_view_count(&text).unwrap_or(0),
        None => {
            debug!("No view counter on {}, recording 0", url);
            0
        }
    };

    let title = read_title(page, settings).await;

    Ok(PageOutcome::Loaded(Extraction {
        title,
        company: String::new(),
        reading: Reading::Views(views),
    }))
}

/// Polls for the counter until it has text or the wait runs out.
async fn wait_for_counter(page: &dyn PageDriver, settings: &BrowserConfig) -> Option<String> {
    let deadline = Instant::now() + settings.counter_wait();

    loop {
        if let Some(text) = page.text_of(&settings.view_counter_selector).await {
            if !text.trim().is_empty() {
                return Some(text);
            }
        }

        if Instant::now() >= deadline {
            return None;
        }
        sleep(COUNTER_POLL).await;
    }
}

async fn read_title(page: &dyn PageDriver, settings: &BrowserConfig) -> String {
    if let Some(text) = page.text_of(&settings.title_selector).await {
        let title = clean_text(&text);
        if !title.is_empty() {
            return title;
        }
    }

    page.document_title()
        .await
        .map(|title| clean_text(&title))
        .unwrap_or_default()
}

#[async_trait]
impl ListingExtractor for BrowserExtractor {
    async fn extract(&mut self, url: &str) -> Result<Extraction, ExtractError> {
        let page = self.ensure_session().await?;
        render_listing(&page, &self.settings, &self.retry, url).await
    }

    async fn shutdown(&mut self) {
        let Some(mut session) = self.session.take() else {
            return;
        };

        if let Err(e) = session.page.clone().close().await {
            debug!("Failed to close page: {}", e);
        }
        if let Err(e) = session.browser.close().await {
            warn!("Failed to close browser: {}", e);
        }
        if let Err(e) = session.browser.wait().await {
            warn!("Failed to wait for browser exit: {}", e);
        }

        info!("Browser session closed");
    }
}
