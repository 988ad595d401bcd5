use crate::diagnostics::DiagnosticSink;
use crate::strategy::{find_block_marker, resolve_target_url, FetchStrategy};
use async_trait::async_trait;
use gleaner_common::{ExtractionTarget, FetchError, FetchParams, RawContent};
use gleaner_config::{BrowserBackendConfig, BrowserEngine};
use gleaner_drivers::{is_timeout, DriverOptions, Engine, GleanerDriver, GleanerPage};
use std::future::Future;
use std::time::Duration;
use tokio::time::timeout;

/// Renders the target in a WebDriver-controlled browser.
///
/// One browser session per attempt, so a rotated proxy or user-agent always
/// takes effect. The session is closed whatever the outcome. Every WebDriver
/// command is bounded by `navigation_timeout_ms`; running out of time is a
/// `Timeout`, which the retry controller treats as transient.
pub struct BrowserFetcher {
    config: BrowserBackendConfig,
    diagnostics: Option<DiagnosticSink>,
}

impl BrowserFetcher {
    pub fn new(config: BrowserBackendConfig) -> Self {
        Self {
            config,
            diagnostics: None,
        }
    }

    /// Save a screenshot here whenever an attempt fails after navigation.
    pub fn with_diagnostics(mut self, sink: DiagnosticSink) -> Self {
        self.diagnostics = Some(sink);
        self
    }

    pub fn driver_options(&self, params: &FetchParams) -> DriverOptions {
        DriverOptions {
            webdriver_url: self.config.webdriver_url.clone(),
            engine: match self.config.engine {
                BrowserEngine::Chromium => Engine::Chromium,
                BrowserEngine::Firefox => Engine::Firefox,
            },
            headless: self.config.headless,
            user_agent: params.user_agent.clone(),
            proxy: params.proxy.clone(),
            locale: params.locale.clone(),
            window: (self.config.viewport_width, self.config.viewport_height),
            page_load_timeout: Some(self.command_timeout()),
        }
    }

    fn command_timeout(&self) -> Duration {
        Duration::from_millis(self.config.navigation_timeout_ms)
    }

    /// Run one WebDriver step under the command timeout.
    async fn bounded<T, F>(&self, target: &ExtractionTarget, step: &str, fut: F) -> Result<T, FetchError>
    where
        F: Future<Output = anyhow::Result<T>>,
    {
        let limit = self.command_timeout();
        match timeout(limit, fut).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) if is_timeout(&e) => Err(FetchError::timeout(target, format!("{step}: {e:#}"))),
            Ok(Err(e)) => Err(FetchError::unknown(target, format!("{step}: {e:#}"))),
            Err(_) => Err(FetchError::timeout(
                target,
                format!("{step}: no answer from webdriver within {}ms", limit.as_millis()),
            )),
        }
    }

    async fn load(
        &self,
        driver: &GleanerDriver,
        target: &ExtractionTarget,
        params: &FetchParams,
        url: &str,
    ) -> Result<(GleanerPage, Result<RawContent, FetchError>), FetchError> {
        let page = self.bounded(target, "navigation", driver.goto(url)).await?;

        // Each selector probe is a WebDriver round trip of its own.
        let settle_limit = params.settle_timeout + self.command_timeout();
        let settled = match timeout(
            settle_limit,
            page.wait_for_any(&self.config.settle_selectors, params.settle_timeout),
        )
        .await
        {
            Ok(Ok(found)) => found,
            Ok(Err(e)) => {
                tracing::debug!(target_id = %target, error = %e, "browser.settle_failed");
                None
            }
            Err(_) => {
                tracing::debug!(target_id = %target, "browser.settle_stalled");
                None
            }
        };

        let html = match self.bounded(target, "page source", page.content()).await {
            Ok(html) => html,
            Err(err) => return Ok((page, Err(err))),
        };
        if let Some(marker) = find_block_marker(&html, &self.config.blocked_markers) {
            let err = FetchError::blocked(target, format!("block page marker {marker:?}"));
            return Ok((page, Err(err)));
        }
        if settled.is_none() {
            // Unsettled pages still go to extraction; the rules decide.
            tracing::info!(
                target_id = %target,
                timeout_ms = params.settle_timeout.as_millis() as u64,
                "browser.unsettled"
            );
        }

        let final_url = self
            .bounded(target, "current url", page.current_url())
            .await
            .unwrap_or_else(|_| url.to_string());
        let raw = RawContent::markup(target, self.name(), html).with_final_url(final_url);
        Ok((page, Ok(raw)))
    }

    async fn capture(&self, page: &GleanerPage, target: &ExtractionTarget, err: &FetchError) {
        let Some(sink) = &self.diagnostics else {
            return;
        };
        if !self.config.screenshot_on_failure {
            return;
        }
        match self.bounded(target, "screenshot", page.screenshot()).await {
            Ok(png) => {
                let label = format!("{}_{}", err.kind, target);
                sink.save(&label, "png", &png).await;
            }
            Err(e) => tracing::debug!(target_id = %target, error = %e, "browser.screenshot_failed"),
        }
    }
}

#[async_trait]
impl FetchStrategy for BrowserFetcher {
    fn name(&self) -> &str {
        "browser"
    }

    async fn fetch(&self, target: &ExtractionTarget, params: &FetchParams) -> Result<RawContent, FetchError> {
        let url = resolve_target_url(target, self.config.search_url.as_deref())?;
        let driver = self
            .bounded(target, "webdriver session", GleanerDriver::connect(self.driver_options(params)))
            .await?;

        let result = match self.load(&driver, target, params, url.as_str()).await {
            Ok((_page, Ok(raw))) => Ok(raw),
            Ok((page, Err(err))) => {
                self.capture(&page, target, &err).await;
                Err(err)
            }
            Err(err) => Err(err),
        };

        if let Err(e) = self.bounded(target, "close", driver.close()).await {
            tracing::warn!(target_id = %target, error = %e, "browser.close_failed");
        }
        result
    }
}
