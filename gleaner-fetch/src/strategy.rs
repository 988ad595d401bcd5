//! The fetch contract shared by every backend.

use async_trait::async_trait;
use gleaner_common::{ExtractionTarget, FetchError, FetchParams, RawContent, TargetKind};
use gleaner_http::HttpError;
use reqwest::StatusCode;
use url::Url;

/// Obtains raw content for a target through one concrete channel.
///
/// Implementations apply whichever [`FetchParams`] fields they support and
/// classify every failure so the retry controller can decide what to do.
#[async_trait]
pub trait FetchStrategy: Send + Sync {
    /// Short backend name used in logs and on [`RawContent::backend`].
    fn name(&self) -> &str;

    async fn fetch(
        &self,
        target: &ExtractionTarget,
        params: &FetchParams,
    ) -> Result<RawContent, FetchError>;
}

/// URL to load for `target`.
///
/// URL targets are used as is. Query targets need a search template in which
/// `{query}` is replaced by the form-encoded query text.
pub fn resolve_target_url(
    target: &ExtractionTarget,
    search_url: Option<&str>,
) -> Result<Url, FetchError> {
    if target.kind() == TargetKind::Url {
        if let Some(url) = target.as_url() {
            return Ok(url);
        }
    }
    let template = search_url.ok_or_else(|| {
        FetchError::unknown(target, "query target but no search_url is configured")
    })?;
    let encoded: String = url::form_urlencoded::byte_serialize(target.as_str().as_bytes()).collect();
    let raw = template.replace("{query}", &encoded);
    Url::parse(&raw).map_err(|e| FetchError::unknown(target, format!("bad search url {raw}: {e}")))
}

/// Map an HTTP failure onto the fetch taxonomy.
///
/// 403/429 are blocks, 404/410 are missing, 408/502/503/504 and client
/// timeouts are timeouts; everything else is unknown.
pub fn classify_http(target: &ExtractionTarget, err: &HttpError) -> FetchError {
    let message = err.to_string();
    if err.is_timeout() {
        return FetchError::timeout(target, message);
    }
    match err.status() {
        Some(StatusCode::FORBIDDEN) | Some(StatusCode::TOO_MANY_REQUESTS) => {
            FetchError::blocked(target, message)
        }
        Some(StatusCode::NOT_FOUND) | Some(StatusCode::GONE) => FetchError::not_found(target, message),
        Some(StatusCode::REQUEST_TIMEOUT)
        | Some(StatusCode::BAD_GATEWAY)
        | Some(StatusCode::SERVICE_UNAVAILABLE)
        | Some(StatusCode::GATEWAY_TIMEOUT) => FetchError::timeout(target, message),
        _ => FetchError::unknown(target, message),
    }
}

/// First configured marker found in `body`, compared case-insensitively.
pub fn find_block_marker<'a>(body: &str, markers: &'a [String]) -> Option<&'a str> {
    if markers.is_empty() {
        return None;
    }
    let lowered = body.to_lowercase();
    markers
        .iter()
        .map(String::as_str)
        .filter(|m| !m.is_empty())
        .find(|m| lowered.contains(&m.to_lowercase()))
}

/// `Accept-Language` value for a BCP 47 locale (`en-US` -> `en-US,en;q=0.9`).
pub fn accept_language(locale: &str) -> String {
    match locale.split(['-', '_']).next() {
        Some(lang) if lang != locale => format!("{locale},{lang};q=0.9"),
        _ => locale.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gleaner_common::FetchErrorKind;

    fn api(status: u16) -> HttpError {
        HttpError::Api {
            status: StatusCode::from_u16(status).unwrap(),
            message: "x".into(),
            request_id: "-".into(),
        }
    }

    #[test]
    fn statuses_are_classified() {
        let t = ExtractionTarget::new("https://x.test");
        assert_eq!(classify_http(&t, &api(403)).kind, FetchErrorKind::Blocked);
        assert_eq!(classify_http(&t, &api(429)).kind, FetchErrorKind::Blocked);
        assert_eq!(classify_http(&t, &api(404)).kind, FetchErrorKind::NotFound);
        assert_eq!(classify_http(&t, &api(410)).kind, FetchErrorKind::NotFound);
        assert_eq!(classify_http(&t, &api(504)).kind, FetchErrorKind::Timeout);
        assert_eq!(classify_http(&t, &api(500)).kind, FetchErrorKind::Unknown);
        assert_eq!(
            classify_http(&t, &HttpError::Timeout("slow".into())).kind,
            FetchErrorKind::Timeout
        );
        assert_eq!(
            classify_http(&t, &HttpError::Network("refused".into())).kind,
            FetchErrorKind::Unknown
        );
    }

    #[test]
    fn query_targets_use_search_template() {
        let t = ExtractionTarget::new("top 10 cars in india");
        let url = resolve_target_url(&t, Some("https://www.example.com/search?q={query}")).unwrap();
        assert_eq!(url.as_str(), "https://www.example.com/search?q=top+10+cars+in+india");
        assert!(resolve_target_url(&t, None).is_err());
    }

    #[test]
    fn url_targets_ignore_template() {
        let t = ExtractionTarget::new("https://www.example.com/search/abc");
        let url = resolve_target_url(&t, Some("https://other.test/?q={query}")).unwrap();
        assert_eq!(url.as_str(), "https://www.example.com/search/abc");
    }

    #[test]
    fn block_markers_are_case_insensitive() {
        let markers = vec!["captcha".to_string(), "Access Denied".to_string()];
        assert_eq!(find_block_marker("<h1>ACCESS DENIED</h1>", &markers), Some("Access Denied"));
        assert_eq!(find_block_marker("<p>fine</p>", &markers), None);
        assert_eq!(find_block_marker("captcha", &[]), None);
    }

    #[test]
    fn accept_language_adds_base_language() {
        assert_eq!(accept_language("en-US"), "en-US,en;q=0.9");
        assert_eq!(accept_language("de"), "de");
    }
}
