//! Common types and utilities shared across Gleaner crates.
//!
//! This crate defines the data model that flows through the fetch, extract
//! and persist workflow, the error taxonomy every stage speaks, and the
//! observability helpers used by binaries and tests. It is intentionally
//! lightweight so that every crate can depend on it.
//!
//! # Overview
//!
//! - [`ExtractionTarget`] and [`FetchParams`]: what to fetch and how
//! - [`RawContent`], [`StructuredAnswer`]: what a backend hands back
//! - [`ExtractedRecord`]: the immutable result handed to a sink
//! - [`FetchAttempt`]: one logged try inside a retry run
//! - [`FetchError`], [`ExtractionError`], [`GiveUpError`], [`SinkError`]
//! - [`observability`]: centralised tracing/logging initialisation
//!
//! # Examples
//!
//! ```rust
//! use gleaner_common::{ExtractionTarget, TargetKind};
//!
//! let target = ExtractionTarget::new("https://example.com/search/abc");
//! assert_eq!(target.kind(), TargetKind::Url);
//!
//! let query = ExtractionTarget::new("top 10 cars in india");
//! assert_eq!(query.kind(), TargetKind::Query);
//! ```

pub mod error;
pub mod observability;
pub mod record;
pub mod target;

pub use error::{
    ExtractionError, FailureClass, FetchError, FetchErrorKind, GiveUpError, GiveUpReason,
    SinkError,
};
pub use record::{
    AttemptOutcome, ContentBody, ExtractedRecord, FetchAttempt, RawContent, SourceLink,
    StructuredAnswer,
};
pub use target::{ExtractionTarget, FetchParams, TargetKind};
