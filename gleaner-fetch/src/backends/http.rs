use crate::strategy::{accept_language, classify_http, find_block_marker, resolve_target_url, FetchStrategy};
use async_trait::async_trait;
use gleaner_common::{ExtractionTarget, FetchError, FetchParams, RawContent};
use gleaner_config::HttpBackendConfig;
use gleaner_http::{HttpClient, RequestOpts};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, ACCEPT_LANGUAGE};
use std::time::Duration;

const ACCEPT_HTML: &str = "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8";

/// Plain HTTP GET of the target page.
pub struct HttpFetcher {
    client: HttpClient,
    config: HttpBackendConfig,
    headers: HeaderMap,
}

impl HttpFetcher {
    pub fn new(config: HttpBackendConfig) -> Result<Self, FetchError> {
        let client = HttpClient::absolute_only()
            .map_err(|e| FetchError::unknown("http backend", e.to_string()))?
            .with_timeout(Duration::from_millis(config.timeout_ms));
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static(ACCEPT_HTML));
        for (name, value) in &config.headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| FetchError::unknown("http backend", format!("header {name}: {e}")))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| FetchError::unknown("http backend", format!("header {name}: {e}")))?;
            headers.insert(name, value);
        }
        Ok(Self {
            client,
            config,
            headers,
        })
    }

    fn client_for(&self, target: &ExtractionTarget, params: &FetchParams) -> Result<HttpClient, FetchError> {
        match params.proxy.as_deref() {
            Some(proxy) => self
                .client
                .with_proxy(proxy)
                .map_err(|e| FetchError::unknown(target, e.to_string())),
            None => Ok(self.client.clone()),
        }
    }
}

#[async_trait]
impl FetchStrategy for HttpFetcher {
    fn name(&self) -> &str {
        "http"
    }

    async fn fetch(&self, target: &ExtractionTarget, params: &FetchParams) -> Result<RawContent, FetchError> {
        let url = resolve_target_url(target, self.config.search_url.as_deref())?;
        let client = self.client_for(target, params)?;

        let mut headers = self.headers.clone();
        if let Some(locale) = params.locale.as_deref() {
            if let Ok(value) = HeaderValue::from_str(&accept_language(locale)) {
                headers.insert(ACCEPT_LANGUAGE, value);
            }
        }
        let opts = RequestOpts {
            headers: Some(headers),
            user_agent: params.user_agent.as_deref(),
            allow_absolute: true,
            ..Default::default()
        };

        let resp = client
            .get_text(url.as_str(), opts)
            .await
            .map_err(|e| classify_http(target, &e))?;

        if let Some(marker) = find_block_marker(&resp.body, &self.config.blocked_markers) {
            return Err(FetchError::blocked(target, format!("block page marker {marker:?}")));
        }
        tracing::debug!(
            target_id = %target,
            url = %resp.final_url,
            bytes = resp.body.len(),
            "http.fetched"
        );
        Ok(RawContent::markup(target, self.name(), resp.body).with_final_url(resp.final_url.to_string()))
    }
}
