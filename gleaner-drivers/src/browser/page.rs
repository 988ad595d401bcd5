use anyhow::Result;
use fantoccini::{Client, Locator};
use std::time::Duration;
use tokio::time::{sleep, Instant};

const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// High-level page wrapper over a WebDriver session.
pub struct GleanerPage {
    pub(crate) client: Client,
}

impl GleanerPage {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    pub async fn goto(&self, url: &str) -> Result<()> {
        self.client.goto(url).await.map_err(anyhow::Error::from)
    }

    /// Return the full page HTML source.
    pub async fn content(&self) -> Result<String> {
        self.client.source().await.map_err(anyhow::Error::from)
    }

    pub async fn current_url(&self) -> Result<String> {
        self.client
            .current_url()
            .await
            .map(|url| url.to_string())
            .map_err(anyhow::Error::from)
    }

    /// Poll until any of `selectors` matches or `timeout` elapses.
    ///
    /// Returns the selector that matched first, `None` on timeout.
    pub async fn wait_for_any(&self, selectors: &[String], timeout: Duration) -> Result<Option<String>> {
        if selectors.is_empty() {
            return Ok(None);
        }
        let deadline = Instant::now() + timeout;
        loop {
            for selector in selectors {
                if self.client.find(Locator::Css(selector)).await.is_ok() {
                    tracing::debug!(%selector, "browser.settled");
                    return Ok(Some(selector.clone()));
                }
            }
            if Instant::now() >= deadline {
                tracing::debug!(timeout_ms = timeout.as_millis() as u64, "browser.settle_timeout");
                return Ok(None);
            }
            sleep(POLL_INTERVAL).await;
        }
    }

    /// PNG screenshot of the viewport.
    pub async fn screenshot(&self) -> Result<Vec<u8>> {
        self.client.screenshot().await.map_err(anyhow::Error::from)
    }
}
