//! Rule-driven extraction of structured records from fetched content.
//!
//! - [`normalize`]: entity decoding, tag stripping and whitespace collapse
//! - [`rules`]: declarative locators (CSS selector or class pattern) bound to
//!   a record field, plus the built-in rule set
//! - [`ExtractionPipeline`]: first-match-wins evaluation in priority order
//!
//! ```
//! use gleaner_common::{ExtractionTarget, RawContent};
//! use gleaner_extract::ExtractionPipeline;
//!
//! let pipeline = ExtractionPipeline::with_default_rules().unwrap();
//! let raw = RawContent::markup(
//!     &ExtractionTarget::new("ok-target"),
//!     "http",
//!     r#"<div class="prose">Hello <b>world</b></div>"#,
//! );
//! let record = pipeline.extract(&raw).unwrap();
//! assert_eq!(record.main_content.as_deref(), Some("Hello world"));
//! ```

pub mod normalize;
pub mod pipeline;
pub mod rules;

pub use normalize::normalize;
pub use pipeline::ExtractionPipeline;
pub use rules::{default_rules, Field, Locator, Rule, RuleError};
