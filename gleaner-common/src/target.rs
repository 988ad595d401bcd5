use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use url::Url;

/// Identifier the workflow attempts to fetch content for.
///
/// Targets are immutable: the identifier is fixed at construction and only
/// exposed by reference.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExtractionTarget {
    id: String,
}

/// Whether a target names a page directly or is free text to search for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TargetKind {
    Url,
    Query,
}

impl ExtractionTarget {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into().trim().to_string(),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.id
    }

    /// `Url` for absolute http(s) URLs, `Query` for anything else.
    pub fn kind(&self) -> TargetKind {
        match self.as_url() {
            Some(_) => TargetKind::Url,
            None => TargetKind::Query,
        }
    }

    /// Parse the identifier as an absolute http(s) URL.
    pub fn as_url(&self) -> Option<Url> {
        Url::parse(&self.id)
            .ok()
            .filter(|u| matches!(u.scheme(), "http" | "https"))
    }
}

impl fmt::Display for ExtractionTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.id)
    }
}

impl From<&str> for ExtractionTarget {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for ExtractionTarget {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

/// Backend parameters for a single fetch attempt.
///
/// The retry controller draws a fresh set from the parameter pool and rotates
/// it between attempts; backends apply whichever fields they support.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchParams {
    pub user_agent: Option<String>,
    pub proxy: Option<String>,
    /// BCP 47 tag such as `en-US`.
    pub locale: Option<String>,
    /// Upper bound on waiting for dynamic content to appear.
    #[serde(with = "duration_ms")]
    pub settle_timeout: Duration,
}

impl Default for FetchParams {
    fn default() -> Self {
        Self {
            user_agent: None,
            proxy: None,
            locale: None,
            settle_timeout: Duration::from_secs(15),
        }
    }
}

impl FetchParams {
    /// Country part of the locale, lowercased (`en-US` -> `us`).
    ///
    /// A bare two-letter value such as `gb` is returned as is.
    pub fn country_code(&self) -> Option<String> {
        let locale = self.locale.as_deref()?.trim();
        if locale.is_empty() {
            return None;
        }
        let region = locale
            .rsplit(['-', '_'])
            .next()
            .unwrap_or(locale)
            .to_ascii_lowercase();
        Some(region)
    }
}

mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(d)?))
    }
}
