//! Error taxonomy shared by every stage of the workflow.
//!
//! Fetch and extraction failures are *classified*; the classification, not
//! the message, drives the retry controller.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Classification carried by every [`FetchError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchErrorKind {
    /// The server explicitly rejected us (403/429 or a block page).
    Blocked,
    Timeout,
    NotFound,
    Unknown,
}

/// A failed fetch, classified for the retry controller.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind} fetching {target}: {message}")]
pub struct FetchError {
    pub kind: FetchErrorKind,
    pub target: String,
    pub message: String,
}

impl FetchError {
    pub fn new(kind: FetchErrorKind, target: impl fmt::Display, message: impl Into<String>) -> Self {
        Self {
            kind,
            target: target.to_string(),
            message: message.into(),
        }
    }

    pub fn blocked(target: impl fmt::Display, message: impl Into<String>) -> Self {
        Self::new(FetchErrorKind::Blocked, target, message)
    }

    pub fn timeout(target: impl fmt::Display, message: impl Into<String>) -> Self {
        Self::new(FetchErrorKind::Timeout, target, message)
    }

    pub fn not_found(target: impl fmt::Display, message: impl Into<String>) -> Self {
        Self::new(FetchErrorKind::NotFound, target, message)
    }

    pub fn unknown(target: impl fmt::Display, message: impl Into<String>) -> Self {
        Self::new(FetchErrorKind::Unknown, target, message)
    }
}

impl fmt::Display for FetchErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FetchErrorKind::Blocked => "blocked",
            FetchErrorKind::Timeout => "timeout",
            FetchErrorKind::NotFound => "not found",
            FetchErrorKind::Unknown => "unknown error",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExtractionError {
    /// No rule produced non-empty main content.
    #[error("no rule matched")]
    NoRuleMatched,
}

/// Unified classification over fetch and extraction failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureClass {
    Blocked,
    Timeout,
    NotFound,
    Unknown,
    NoRuleMatched,
}

impl FailureClass {
    /// Transient failures are retried with parameter rotation.
    pub fn is_transient(self) -> bool {
        matches!(
            self,
            FailureClass::Blocked | FailureClass::Timeout | FailureClass::NoRuleMatched
        )
    }
}

impl From<FetchErrorKind> for FailureClass {
    fn from(kind: FetchErrorKind) -> Self {
        match kind {
            FetchErrorKind::Blocked => FailureClass::Blocked,
            FetchErrorKind::Timeout => FailureClass::Timeout,
            FetchErrorKind::NotFound => FailureClass::NotFound,
            FetchErrorKind::Unknown => FailureClass::Unknown,
        }
    }
}

impl From<&ExtractionError> for FailureClass {
    fn from(err: &ExtractionError) -> Self {
        match err {
            ExtractionError::NoRuleMatched => FailureClass::NoRuleMatched,
        }
    }
}

impl fmt::Display for FailureClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FailureClass::Blocked => "blocked",
            FailureClass::Timeout => "timeout",
            FailureClass::NotFound => "not_found",
            FailureClass::Unknown => "unknown",
            FailureClass::NoRuleMatched => "no_rule_matched",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GiveUpReason {
    /// Every allowed attempt was used.
    BudgetExhausted,
    /// A permanent classification reached its consecutive threshold.
    Permanent,
}

/// Terminal failure of a retry run.
///
/// Not fatal to a batch: callers log it and move on to the next target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GiveUpError {
    pub target: String,
    /// `None` only when the attempt budget was zero.
    pub last_classification: Option<FailureClass>,
    pub attempts_made: u32,
    pub reason: GiveUpReason,
    pub last_message: Option<String>,
}

impl fmt::Display for GiveUpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "gave up on {} after {} attempt(s) ({:?}, last: ",
            self.target, self.attempts_made, self.reason
        )?;
        match self.last_classification {
            Some(class) => write!(f, "{class})"),
            None => f.write_str("none)"),
        }
    }
}

impl std::error::Error for GiveUpError {}

#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("write failed for {}: {source}", .path.display())]
    WriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
}
