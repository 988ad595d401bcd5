//! Driver layer for browser automation.
//!
//! This crate wraps a WebDriver session so fetch backends can render pages
//! that only produce their content after scripts run.
//!
//! - [`browser::driver::GleanerDriver`]: WebDriver client wrapper
//! - [`browser::driver::DriverOptions`]: engine, headless flag, user-agent,
//!   proxy, locale and window size for one session
//! - [`browser::page::GleanerPage`]: navigation, settle waits, page source
//!   and screenshots
pub mod browser;

pub use browser::driver::{build_capabilities, is_timeout, DriverOptions, Engine, GleanerDriver};
pub use browser::page::GleanerPage;
