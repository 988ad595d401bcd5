use crate::error::FailureClass;
use crate::target::{ExtractionTarget, FetchParams};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// A cited source: anchor text plus link.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceLink {
    pub text: String,
    pub url: String,
}

impl SourceLink {
    pub fn new(text: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            url: url.into(),
        }
    }
}

/// Answer delivered already structured (chat API, push listener).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructuredAnswer {
    #[serde(default)]
    pub title: Option<String>,
    pub answer: String,
    #[serde(default)]
    pub sources: Vec<SourceLink>,
    #[serde(default)]
    pub related: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum ContentBody {
    /// HTML document or fragment.
    Markup(String),
    Answer(StructuredAnswer),
}

/// What a fetch strategy hands to the extraction pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawContent {
    pub target: ExtractionTarget,
    pub body: ContentBody,
    /// Name of the backend that produced the content.
    pub backend: String,
    /// Final URL after redirects, when the backend knows it.
    pub final_url: Option<String>,
    pub fetched_at: DateTime<Utc>,
}

impl RawContent {
    pub fn markup(
        target: &ExtractionTarget,
        backend: impl Into<String>,
        html: impl Into<String>,
    ) -> Self {
        Self {
            target: target.clone(),
            body: ContentBody::Markup(html.into()),
            backend: backend.into(),
            final_url: None,
            fetched_at: Utc::now(),
        }
    }

    pub fn answer(
        target: &ExtractionTarget,
        backend: impl Into<String>,
        answer: StructuredAnswer,
    ) -> Self {
        Self {
            target: target.clone(),
            body: ContentBody::Answer(answer),
            backend: backend.into(),
            final_url: None,
            fetched_at: Utc::now(),
        }
    }

    pub fn with_final_url(mut self, url: impl Into<String>) -> Self {
        self.final_url = Some(url.into());
        self
    }

    pub fn len(&self) -> usize {
        match &self.body {
            ContentBody::Markup(html) => html.len(),
            ContentBody::Answer(a) => a.answer.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Structured result of a successful extraction.
///
/// Built once by the pipeline and only ever passed by reference afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractedRecord {
    pub title: String,
    pub main_content: Option<String>,
    pub sources: Vec<SourceLink>,
    pub related: Vec<String>,
    pub captured_at: DateTime<Utc>,
    pub origin_target: ExtractionTarget,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "class", rename_all = "snake_case")]
pub enum AttemptOutcome {
    Success,
    TransientFailure(FailureClass),
    PermanentFailure(FailureClass),
}

/// One try at retrieving content inside a retry run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchAttempt {
    /// 1-based.
    pub index: u32,
    pub params: FetchParams,
    pub outcome: AttemptOutcome,
    pub elapsed: Duration,
}
