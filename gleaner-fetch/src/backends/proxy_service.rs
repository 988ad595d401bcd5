use crate::strategy::{classify_http, find_block_marker, resolve_target_url, FetchStrategy};
use async_trait::async_trait;
use gleaner_common::{ExtractionTarget, FetchError, FetchParams, RawContent};
use gleaner_config::ProxyServiceConfig;
use gleaner_http::{Auth, HttpClient, RequestOpts};
use std::borrow::Cow;
use std::time::Duration;

/// Fetches through a rendering proxy service (ScrapingBee-style GET API).
///
/// The service renders the page on its side; rotation is expressed as
/// `country_code` and `user_agent` query parameters instead of a local proxy.
pub struct ProxyServiceFetcher {
    client: HttpClient,
    config: ProxyServiceConfig,
}

impl ProxyServiceFetcher {
    pub fn new(config: ProxyServiceConfig) -> Result<Self, FetchError> {
        let client = HttpClient::new(&config.endpoint)
            .map_err(|e| FetchError::unknown("proxy service", e.to_string()))?
            .with_timeout(Duration::from_millis(config.timeout_ms));
        Ok(Self { client, config })
    }

    /// Query parameters for one attempt, without the API key.
    pub fn query_params<'a>(&'a self, url: &'a str, params: &'a FetchParams) -> Vec<(&'a str, Cow<'a, str>)> {
        let flag = |on: bool| Cow::Borrowed(if on { "true" } else { "false" });
        let mut query = vec![
            ("url", Cow::Borrowed(url)),
            ("render_js", flag(self.config.render_js)),
        ];
        if self.config.premium_proxy {
            query.push(("premium_proxy", flag(true)));
        }
        if let Some(wait) = self.config.wait_ms {
            query.push(("wait", Cow::Owned(wait.to_string())));
        }
        if let Some(selector) = self.config.wait_for.as_deref() {
            query.push(("wait_for", Cow::Borrowed(selector)));
        }
        if let Some(country) = params.country_code() {
            query.push(("country_code", Cow::Owned(country)));
        }
        if let Some(ua) = params.user_agent.as_deref() {
            query.push(("user_agent", Cow::Borrowed(ua)));
        }
        query
    }
}

#[async_trait]
impl FetchStrategy for ProxyServiceFetcher {
    fn name(&self) -> &str {
        "proxy_service"
    }

    async fn fetch(&self, target: &ExtractionTarget, params: &FetchParams) -> Result<RawContent, FetchError> {
        let url = resolve_target_url(target, self.config.search_url.as_deref())?;
        let opts = RequestOpts {
            query: Some(self.query_params(url.as_str(), params)),
            auth: Some(Auth::Query {
                name: "api_key",
                value: Cow::Borrowed(&self.config.api_key),
            }),
            ..Default::default()
        };

        let resp = self
            .client
            .get_text("", opts)
            .await
            .map_err(|e| classify_http(target, &e))?;

        if let Some(marker) = find_block_marker(&resp.body, &self.config.blocked_markers) {
            return Err(FetchError::blocked(target, format!("block page marker {marker:?}")));
        }
        tracing::debug!(target_id = %target, bytes = resp.body.len(), "proxy_service.fetched");
        Ok(RawContent::markup(target, self.name(), resp.body).with_final_url(url.to_string()))
    }
}
