//! Fetch, retry and persist.
//!
//! - [`FetchStrategy`] and the concrete [`backends`]
//! - [`ParamPool`]: user-agents, proxies and locales to rotate through
//! - [`RetryController`]: bounded attempts with jittered backoff
//! - [`ResultSink`] / [`FileSink`]: durable Markdown or JSON records
//! - [`BatchRunner`]: sequential processing of many targets
//!
//! ```
//! use gleaner_common::{ExtractionTarget, FetchErrorKind};
//! use gleaner_extract::ExtractionPipeline;
//! use gleaner_fetch::backends::ScriptedFetcher;
//! use gleaner_fetch::{BackoffPolicy, ParamPool, RetryController, RetryPolicy};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! # tokio_test_block(async {
//! let strategy = ScriptedFetcher::failing_then(
//!     FetchErrorKind::Blocked,
//!     1,
//!     "<div class='prose'>Hello world</div>",
//! );
//! let policy = RetryPolicy {
//!     backoff: BackoffPolicy::new(Duration::ZERO, Duration::ZERO),
//!     ..Default::default()
//! };
//! let controller = RetryController::new(
//!     Arc::new(strategy),
//!     Arc::new(ExtractionPipeline::with_default_rules().unwrap()),
//!     Arc::new(ParamPool::default()),
//!     policy,
//! );
//! let record = controller.run(&ExtractionTarget::new("ok-target")).await.unwrap();
//! assert_eq!(record.main_content.as_deref(), Some("Hello world"));
//! # });
//! # fn tokio_test_block<F: std::future::Future>(f: F) -> F::Output {
//! #     tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(f)
//! # }
//! ```

pub mod backends;
pub mod batch;
pub mod diagnostics;
pub mod params;
pub mod retry;
pub mod sink;
pub mod strategy;

pub use batch::{BatchReport, BatchRunner, TargetOutcome};
pub use diagnostics::DiagnosticSink;
pub use params::ParamPool;
pub use retry::{BackoffPolicy, ControllerState, RetryController, RetryPolicy, RunTrace};
pub use sink::{FileSink, ResultSink, SinkFormat};
pub use strategy::FetchStrategy;
