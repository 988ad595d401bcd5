use crate::browser::page::GleanerPage;
use anyhow::{anyhow, Context, Result};
use fantoccini::error::{CmdError, ErrorStatus, NewSessionError, WebDriver};
use fantoccini::wd::TimeoutConfiguration;
use fantoccini::{Client, ClientBuilder};
use serde_json::{json, Map, Value};
use std::time::Duration;
use url::Url;
use webdriver::capabilities::Capabilities;

/// Browser engine behind the WebDriver endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Engine {
    #[default]
    Chromium,
    Firefox,
}

/// Per-session browser settings.
#[derive(Debug, Clone)]
pub struct DriverOptions {
    pub webdriver_url: String,
    pub engine: Engine,
    pub headless: bool,
    pub user_agent: Option<String>,
    /// `scheme://host:port`; applied to HTTP and HTTPS traffic.
    pub proxy: Option<String>,
    pub locale: Option<String>,
    pub window: (u32, u32),
    /// Page-load timeout handed to the browser itself.
    pub page_load_timeout: Option<Duration>,
}

impl Default for DriverOptions {
    fn default() -> Self {
        Self {
            webdriver_url: "http://localhost:4444".into(),
            engine: Engine::Chromium,
            headless: true,
            user_agent: None,
            proxy: None,
            locale: None,
            window: (1280, 800),
            page_load_timeout: None,
        }
    }
}

/// Translate [`DriverOptions`] into W3C capabilities for the chosen engine.
///
/// Chromium takes everything as command-line switches. Firefox takes the
/// user-agent and locale as prefs and the proxy as a W3C `proxy` capability.
pub fn build_capabilities(opts: &DriverOptions) -> Result<Capabilities> {
    let mut caps = Capabilities::new();
    match opts.engine {
        Engine::Chromium => {
            let mut args = vec![
                json!(format!("--window-size={},{}", opts.window.0, opts.window.1)),
                json!("--no-first-run"),
            ];
            if opts.headless {
                args.push(json!("--headless=new"));
                args.push(json!("--disable-gpu"));
            }
            if let Some(ua) = &opts.user_agent {
                args.push(json!(format!("--user-agent={ua}")));
            }
            if let Some(proxy) = &opts.proxy {
                args.push(json!(format!("--proxy-server={proxy}")));
            }
            if let Some(locale) = &opts.locale {
                args.push(json!(format!("--lang={locale}")));
            }
            caps.insert("browserName".into(), json!("chrome"));
            caps.insert("goog:chromeOptions".into(), json!({ "args": args }));
        }
        Engine::Firefox => {
            let mut args = vec![
                json!(format!("--width={}", opts.window.0)),
                json!(format!("--height={}", opts.window.1)),
            ];
            if opts.headless {
                args.push(json!("-headless"));
            }
            let mut prefs = Map::new();
            if let Some(ua) = &opts.user_agent {
                prefs.insert("general.useragent.override".into(), json!(ua));
            }
            if let Some(locale) = &opts.locale {
                prefs.insert("intl.accept_languages".into(), json!(locale));
            }
            if let Some(proxy) = &opts.proxy {
                caps.insert("proxy".into(), manual_proxy(proxy)?);
            }
            caps.insert("browserName".into(), json!("firefox"));
            caps.insert(
                "moz:firefoxOptions".into(),
                json!({ "args": args, "prefs": Value::Object(prefs) }),
            );
        }
    }
    Ok(caps)
}

fn manual_proxy(proxy: &str) -> Result<Value> {
    let url = Url::parse(proxy).with_context(|| format!("invalid proxy url: {proxy}"))?;
    let host = url
        .host_str()
        .ok_or_else(|| anyhow!("proxy url has no host: {proxy}"))?;
    let endpoint = match url.port_or_known_default() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    };
    Ok(json!({
        "proxyType": "manual",
        "httpProxy": endpoint,
        "sslProxy": endpoint,
    }))
}

/// Thin wrapper around a `fantoccini` WebDriver client.
pub struct GleanerDriver {
    client: Client,
    options: DriverOptions,
}

impl GleanerDriver {
    /// Open a new session on a running WebDriver service.
    pub async fn connect(options: DriverOptions) -> Result<Self> {
        let caps = build_capabilities(&options)?;
        tracing::debug!(
            webdriver = %options.webdriver_url,
            engine = ?options.engine,
            headless = options.headless,
            proxied = options.proxy.is_some(),
            "browser.session.connect"
        );
        let client = ClientBuilder::native()
            .capabilities(caps)
            .connect(&options.webdriver_url)
            .await
            .with_context(|| format!("webdriver session at {}", options.webdriver_url))?;

        if let Some(page_load) = options.page_load_timeout {
            let timeouts = TimeoutConfiguration::new(None, Some(page_load), None);
            if let Err(e) = client.update_timeouts(timeouts).await {
                tracing::debug!(error = %e, "browser.session.timeouts_rejected");
            }
        }

        Ok(Self { client, options })
    }

    pub fn options(&self) -> &DriverOptions {
        &self.options
    }

    /// Navigate to `url` and hand back the page.
    pub async fn goto(&self, url: &str) -> Result<GleanerPage> {
        let page = GleanerPage::new(self.client.clone());
        page.goto(url).await?;
        Ok(page)
    }

    /// Close the underlying browser session.
    pub async fn close(self) -> Result<()> {
        self.client.close().await?;
        Ok(())
    }
}

/// Whether a driver error reports a WebDriver-side timeout: page load,
/// script or a wait condition.
pub fn is_timeout(err: &anyhow::Error) -> bool {
    fn status_is_timeout(w: &WebDriver) -> bool {
        matches!(w.error, ErrorStatus::Timeout | ErrorStatus::ScriptTimeout)
    }
    err.chain().any(|cause| {
        if let Some(cmd) = cause.downcast_ref::<CmdError>() {
            return match cmd {
                CmdError::WaitTimeout => true,
                CmdError::Standard(w) => status_is_timeout(w),
                _ => false,
            };
        }
        if let Some(NewSessionError::SessionNotCreated(w)) = cause.downcast_ref::<NewSessionError>() {
            return status_is_timeout(w);
        }
        cause.downcast_ref::<WebDriver>().is_some_and(status_is_timeout)
    })
}
