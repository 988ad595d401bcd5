//! Concrete [`FetchStrategy`](crate::FetchStrategy) implementations.
//!
//! - [`http::HttpFetcher`]: plain GET, proxy and user-agent per attempt
//! - [`browser::BrowserFetcher`]: WebDriver-rendered page
//! - [`proxy_service::ProxyServiceFetcher`]: third-party rendering proxy
//! - [`chat_api::ChatApiFetcher`]: chat-completions API, already structured
//! - [`scripted::ScriptedFetcher`]: canned responses

pub mod browser;
pub mod chat_api;
pub mod http;
pub mod proxy_service;
pub mod scripted;

pub use browser::BrowserFetcher;
pub use chat_api::ChatApiFetcher;
pub use http::HttpFetcher;
pub use proxy_service::ProxyServiceFetcher;
pub use scripted::{ScriptedFetcher, Step};
