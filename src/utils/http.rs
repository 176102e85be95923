use anyhow::Result;
use reqwest::{Client, ClientBuilder};
use std::time::Duration;
use tokio::time::sleep;
use tracing::warn;

use crate::config::Config;
use crate::error::FetchError;
use crate::utils::retry::RetryPolicy;

pub fn create_client(config: &Config) -> Result<Client> {
    let client = ClientBuilder::new()
        .user_agent(&config.user_agent)
        .timeout(config.http_timeout())
        .pool_max_idle_per_host(config.http.pool_max_idle_per_host)
        .build()?;

    Ok(client)
}

/// GETs `url` and returns the body, retrying transport errors, timeouts and
/// non-success statuses up to the policy bound. The last failure is returned
/// once attempts are exhausted.
pub async fn fetch_markup(
    client: &Client,
    url: &str,
    timeout: Duration,
    policy: &RetryPolicy,
) -> Result<String, FetchError> {
    let mut attempt = 0;

    loop {
        attempt += 1;

        let error = match fetch_once(client, url, timeout).await {
            Ok(body) => return Ok(body),
            Err(e) => e,
        };

        warn!(
            "Attempt {}/{} for {} failed: {}",
            attempt,
            policy.max_attempts(),
            url,
            error
        );

        if !policy.has_next(attempt) {
            return Err(error);
        }

        sleep(policy.delay_for(attempt)).await;
    }
}

async fn fetch_once(client: &Client, url: &str, timeout: Duration) -> Result<String, FetchError> {
    let response = client
        .get(url)
        .timeout(timeout)
        .send()
        .await
        .map_err(|e| FetchError::from_reqwest(url, e))?;

    let status = response.status();
    if !status.is_success() {
        return Err(FetchError::Status {
            url: url.to_string(),
            status: status.as_u16(),
        });
    }

    response
        .text()
        .await
        .map_err(|e| FetchError::from_reqwest(url, e))
}
