use std::future::Future;

use anyhow::{Context, Result, ensure};
use serde_json::Value;
use tracing::{debug, error, instrument};

/// Runs `attempt` until it succeeds or `max_attempts` attempts have failed
///
/// Every failure is logged together with its attempt number. There is no delay
/// between attempts. Returns `None` once all attempts are exhausted.
pub async fn retry<T, F, Fut>(max_attempts: u32, what: &str, mut attempt: F) -> Option<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    for n in 1..=max_attempts {
        match attempt().await {
            Ok(v) => return Some(v),
            Err(e) => error!("Error fetching {what} (attempt {n}/{max_attempts}): {e:#}"),
        }
    }

    None
}

/// HTTP GET with a bounded retry count
#[derive(Debug, Clone)]
pub struct Fetcher {
    client: reqwest::Client,
    max_attempts: u32,
}

impl Fetcher {
    #[must_use]
    pub const fn new(client: reqwest::Client, max_attempts: u32) -> Self {
        Self {
            client,
            max_attempts,
        }
    }

    /// Fetches `url` and parses the body as JSON
    ///
    /// Network errors, non-success statuses and malformed bodies are all retried.
    #[instrument(skip(self))]
    pub async fn json(&self, url: &str) -> Option<Value> {
        retry(self.max_attempts, "API data", || async move {
            let body = self.get(url).await?;
            serde_json::from_str::<Value>(&body).context("Parsing response body as JSON")
        })
        .await
    }

    /// Fetches `url` and returns the body as text
    #[instrument(skip(self))]
    pub async fn text(&self, url: &str) -> Option<String> {
        retry(self.max_attempts, "document", || self.get(url)).await
    }

    async fn get(&self, url: &str) -> Result<String> {
        let res = self
            .client
            .get(url)
            .send()
            .await
            .context("Sending request")?;

        let status = res.status();
        ensure!(status.is_success(), "HTTP error! Status: {status}");

        let body = res.text().await.context("Reading response body")?;
        debug!("Fetched {} bytes from {url}", body.len());
        Ok(body)
    }
}
