//! Loader for Gleaner configuration with YAML + environment overlays.
//!
//! Sources are merged in order: `GLEANER__`-prefixed environment variables
//! first, then any YAML files or inline snippets attached to the loader, so a
//! later source wins for the keys it sets. After merging, `${VAR}` and `$VAR`
//! placeholders in string values are expanded from the process environment
//! (recursively, up to a fixed depth) before the typed structs are built.
//!
//! Every section except `backend.config` secrets is optional and falls back to
//! the defaults documented on each struct.
use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

const MAXIMUM_ENV_EXPANSION_DEPTH: usize = 8;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct GleanerConfig {
    pub version: Option<String>,
    /// URLs or free-text queries processed by `gleaner run`.
    #[serde(default)]
    pub targets: Vec<String>,
    #[serde(default)]
    pub pool: PoolConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub backend: BackendSpec,
    #[serde(default)]
    pub extraction: ExtractionConfig,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub listener: Option<ListenerConfig>,
    #[serde(default)]
    pub log: LogSettings,
}

/// Values the retry controller rotates through between attempts.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PoolConfig {
    #[serde(default)]
    pub user_agents: Vec<String>,
    #[serde(default)]
    pub proxies: Vec<String>,
    #[serde(default)]
    pub locales: Vec<String>,
    #[serde(default = "default_settle_timeout_ms")]
    pub settle_timeout_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_min_delay_ms")]
    pub min_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    /// Consecutive `NotFound`/`Unknown` attempts before giving up.
    #[serde(default = "default_permanent_after")]
    pub permanent_after: u32,
    #[serde(default)]
    pub pause_between_targets_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            min_delay_ms: default_min_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            permanent_after: default_permanent_after(),
            pause_between_targets_ms: 0,
        }
    }
}

/// The tag is `kind`; the payload lives in `config`.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind")]
pub enum BackendSpec {
    #[serde(rename = "http")]
    Http {
        #[serde(default)]
        config: HttpBackendConfig,
    },

    #[serde(rename = "browser")]
    Browser {
        #[serde(default)]
        config: BrowserBackendConfig,
    },

    #[serde(rename = "proxy_service")]
    ProxyService { config: ProxyServiceConfig },

    #[serde(rename = "chat_api")]
    ChatApi { config: ChatApiConfig },
}

impl Default for BackendSpec {
    fn default() -> Self {
        BackendSpec::Http {
            config: HttpBackendConfig::default(),
        }
    }
}

impl BackendSpec {
    pub fn kind(&self) -> &'static str {
        match self {
            BackendSpec::Http { .. } => "http",
            BackendSpec::Browser { .. } => "browser",
            BackendSpec::ProxyService { .. } => "proxy_service",
            BackendSpec::ChatApi { .. } => "chat_api",
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct HttpBackendConfig {
    /// Template for query targets; `{query}` is replaced with the encoded text.
    #[serde(default)]
    pub search_url: Option<String>,
    #[serde(default = "default_http_timeout_ms")]
    pub timeout_ms: u64,
    /// Case-insensitive substrings that mark a 200 response as a block page.
    #[serde(default = "default_blocked_markers")]
    pub blocked_markers: Vec<String>,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
}

impl Default for HttpBackendConfig {
    fn default() -> Self {
        Self {
            search_url: None,
            timeout_ms: default_http_timeout_ms(),
            blocked_markers: default_blocked_markers(),
            headers: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BrowserEngine {
    #[default]
    Chromium,
    Firefox,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BrowserBackendConfig {
    #[serde(default = "default_webdriver_url")]
    pub webdriver_url: String,
    #[serde(default)]
    pub engine: BrowserEngine,
    #[serde(default = "default_true")]
    pub headless: bool,
    #[serde(default)]
    pub search_url: Option<String>,
    /// Selectors that signal the answer has rendered.
    #[serde(default = "default_settle_selectors")]
    pub settle_selectors: Vec<String>,
    #[serde(default = "default_blocked_markers")]
    pub blocked_markers: Vec<String>,
    #[serde(default = "default_viewport_width")]
    pub viewport_width: u32,
    #[serde(default = "default_viewport_height")]
    pub viewport_height: u32,
    #[serde(default = "default_true")]
    pub screenshot_on_failure: bool,
    /// Upper bound for each WebDriver command: session setup, navigation,
    /// page source, screenshot and close.
    #[serde(default = "default_navigation_timeout_ms")]
    pub navigation_timeout_ms: u64,
}

impl Default for BrowserBackendConfig {
    fn default() -> Self {
        Self {
            webdriver_url: default_webdriver_url(),
            engine: BrowserEngine::default(),
            headless: true,
            search_url: None,
            settle_selectors: default_settle_selectors(),
            blocked_markers: default_blocked_markers(),
            viewport_width: default_viewport_width(),
            viewport_height: default_viewport_height(),
            screenshot_on_failure: true,
            navigation_timeout_ms: default_navigation_timeout_ms(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProxyServiceConfig {
    #[serde(default = "default_proxy_service_endpoint")]
    pub endpoint: String,
    pub api_key: String,
    #[serde(default = "default_true")]
    pub render_js: bool,
    #[serde(default)]
    pub premium_proxy: bool,
    /// Fixed wait the service applies after load, in milliseconds.
    #[serde(default)]
    pub wait_ms: Option<u64>,
    #[serde(default)]
    pub wait_for: Option<String>,
    #[serde(default)]
    pub search_url: Option<String>,
    #[serde(default = "default_proxy_service_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_blocked_markers")]
    pub blocked_markers: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatApiConfig {
    #[serde(default = "default_chat_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_chat_model")]
    pub model: String,
    pub api_key: String,
    #[serde(default)]
    pub system_prompt: Option<String>,
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default)]
    pub max_tokens: Option<u32>,
    #[serde(default = "default_chat_timeout_ms")]
    pub timeout_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleField {
    Title,
    MainContent,
    Sources,
    Related,
}

/// One declarative rule. Exactly one of `css` or `class_pattern` must be set.
#[derive(Debug, Clone, Deserialize)]
pub struct RuleSpec {
    pub field: RuleField,
    #[serde(default)]
    pub css: Option<String>,
    #[serde(default)]
    pub class_pattern: Option<String>,
    /// Restricts a class pattern to one element name.
    #[serde(default)]
    pub tag: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExtractionConfig {
    #[serde(default = "default_min_content_chars")]
    pub min_content_chars: usize,
    /// Empty means the built-in rule set.
    #[serde(default)]
    pub rules: Vec<RuleSpec>,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            min_content_chars: default_min_content_chars(),
            rules: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Markdown,
    Json,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    #[serde(default = "default_output_dir")]
    pub dir: PathBuf,
    #[serde(default)]
    pub format: OutputFormat,
    /// Screenshots land here; `None` disables them.
    #[serde(default)]
    pub diagnostics_dir: Option<PathBuf>,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: default_output_dir(),
            format: OutputFormat::default(),
            diagnostics_dir: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ListenerConfig {
    pub url: String,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    /// Raw frames sent right after the connection opens.
    #[serde(default)]
    pub opening_frames: Vec<String>,
    #[serde(default = "default_answer_event")]
    pub answer_event: String,
    #[serde(default = "default_query_event")]
    pub query_event: String,
    #[serde(default = "default_monitor_secs")]
    pub monitor_secs: u64,
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

impl ListenerConfig {
    /// Listener on `url` with every other field at its default.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            headers: BTreeMap::new(),
            connect_timeout_ms: default_connect_timeout_ms(),
            opening_frames: Vec::new(),
            answer_event: default_answer_event(),
            query_event: default_query_event(),
            monitor_secs: default_monitor_secs(),
            queue_capacity: default_queue_capacity(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LogSettings {
    #[serde(default)]
    pub dir: Option<PathBuf>,
    #[serde(default = "default_log_format")]
    pub format: String,
    #[serde(default = "default_log_filter")]
    pub filter: String,
    #[serde(default = "default_true")]
    pub stderr: bool,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            dir: None,
            format: default_log_format(),
            filter: default_log_filter(),
            stderr: true,
        }
    }
}

fn default_true() -> bool {
    true
}
fn default_settle_timeout_ms() -> u64 {
    15_000
}
fn default_max_attempts() -> u32 {
    3
}
fn default_min_delay_ms() -> u64 {
    1_000
}
fn default_max_delay_ms() -> u64 {
    5_000
}
fn default_permanent_after() -> u32 {
    1
}
fn default_http_timeout_ms() -> u64 {
    30_000
}
fn default_blocked_markers() -> Vec<String> {
    vec![
        "captcha".into(),
        "access denied".into(),
        "verify you are human".into(),
    ]
}
fn default_webdriver_url() -> String {
    "http://localhost:4444".into()
}
fn default_settle_selectors() -> Vec<String> {
    vec![
        ".prose".into(),
        ".answer-content".into(),
        "[role='article']".into(),
        "article.content".into(),
    ]
}
fn default_navigation_timeout_ms() -> u64 {
    30_000
}
fn default_viewport_width() -> u32 {
    1280
}
fn default_viewport_height() -> u32 {
    800
}
fn default_proxy_service_endpoint() -> String {
    "https://app.scrapingbee.com/api/v1/".into()
}
fn default_proxy_service_timeout_ms() -> u64 {
    60_000
}
fn default_chat_endpoint() -> String {
    "https://api.perplexity.ai".into()
}
fn default_chat_model() -> String {
    "sonar-pro".into()
}
fn default_chat_timeout_ms() -> u64 {
    60_000
}
fn default_min_content_chars() -> usize {
    1
}
fn default_output_dir() -> PathBuf {
    dirs::data_dir()
        .map(|d| d.join("gleaner").join("records"))
        .unwrap_or_else(|| PathBuf::from("gleaner-output"))
}
fn default_connect_timeout_ms() -> u64 {
    10_000
}
fn default_answer_event() -> String {
    "query_response".into()
}
fn default_query_event() -> String {
    "query".into()
}
fn default_monitor_secs() -> u64 {
    60
}
fn default_queue_capacity() -> usize {
    256
}
fn default_log_format() -> String {
    "text".into()
}
fn default_log_filter() -> String {
    "info".into()
}

fn expand_env_in_value(v: &mut Value) {
    match v {
        Value::String(s) => {
            if s.contains('$') {
                let mut cur = std::mem::take(s);
                for _ in 0..MAXIMUM_ENV_EXPANSION_DEPTH {
                    let expanded = match shellexpand::env(&cur) {
                        Ok(cow) => cow.into_owned(),
                        Err(_) => cur.clone(),
                    };
                    if expanded == cur {
                        break;
                    }
                    cur = expanded;
                }
                *s = cur;
            }
        }
        Value::Array(arr) => arr.iter_mut().for_each(expand_env_in_value),
        Value::Object(obj) => obj.values_mut().for_each(expand_env_in_value),
        _ => {}
    }
}

/// Builder hides the `config` crate wiring (YAML + env overrides).
pub struct GleanerConfigLoader {
    builder: config::ConfigBuilder<config::builder::DefaultState>,
}

impl Default for GleanerConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl GleanerConfigLoader {
    /// Start with `GLEANER__` env overrides; everything else is defaulted.
    ///
    /// ```
    /// use gleaner_config::GleanerConfigLoader;
    ///
    /// let config = GleanerConfigLoader::new()
    ///     .with_yaml_str("version: '1'\ntargets: []")
    ///     .load()
    ///     .expect("valid config");
    ///
    /// assert_eq!(config.version.as_deref(), Some("1"));
    /// assert_eq!(config.retry.max_attempts, 3);
    /// assert_eq!(config.backend.kind(), "http");
    /// ```
    pub fn new() -> Self {
        let builder = Config::builder().add_source(
            Environment::with_prefix("GLEANER")
                .separator("__")
                .try_parsing(true)
                .list_separator(",")
                .with_list_parse_key("targets"),
        );
        Self { builder }
    }

    /// Attach a YAML/TOML/JSON file; the `config` crate infers format by suffix.
    pub fn with_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.builder = self
            .builder
            .add_source(File::from(path.as_ref()).required(true));
        self
    }

    /// Like [`with_file`](Self::with_file) but tolerates a missing file, so
    /// deployments can rely on environment variables alone.
    pub fn with_optional_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.builder = self
            .builder
            .add_source(File::from(path.as_ref()).required(false));
        self
    }

    /// Allow tests/CLI to merge inline YAML snippets.
    ///
    /// ```
    /// use gleaner_config::{BackendSpec, GleanerConfigLoader};
    ///
    /// let cfg = GleanerConfigLoader::new()
    ///     .with_yaml_str(
    ///         r#"
    /// backend:
    ///   kind: browser
    ///   config:
    ///     engine: firefox
    /// "#,
    ///     )
    ///     .load()
    ///     .unwrap();
    ///
    /// match cfg.backend {
    ///     BackendSpec::Browser { config } => assert!(config.headless),
    ///     other => panic!("unexpected backend {}", other.kind()),
    /// }
    /// ```
    pub fn with_yaml_str(mut self, yaml: &str) -> Self {
        self.builder = self
            .builder
            .add_source(File::from_str(yaml, config::FileFormat::Yaml));
        self
    }

    /// Consume the builder and deserialize the merged sources.
    ///
    /// `${VAR}` placeholders are expanded before the typed structs are built,
    /// which keeps API keys out of the YAML file.
    ///
    /// ```
    /// use gleaner_config::{BackendSpec, GleanerConfigLoader};
    ///
    /// unsafe { std::env::set_var("CHAT_API_TOKEN", "injected-from-env"); }
    ///
    /// let config = GleanerConfigLoader::new()
    ///     .with_yaml_str(r#"
    /// backend:
    ///   kind: chat_api
    ///   config:
    ///     api_key: "${CHAT_API_TOKEN}"
    /// "#)
    ///     .load()
    ///     .expect("valid configuration");
    ///
    /// match &config.backend {
    ///     BackendSpec::ChatApi { config } => {
    ///         assert_eq!(config.api_key, "injected-from-env");
    ///         assert_eq!(config.model, "sonar-pro");
    ///     }
    ///     other => panic!("unexpected backend {}", other.kind()),
    /// }
    ///
    /// unsafe { std::env::remove_var("CHAT_API_TOKEN"); }
    /// ```
    pub fn load(self) -> Result<GleanerConfig, ConfigError> {
        let cfg = self.builder.build()?;

        let mut v: Value = cfg.try_deserialize()?;
        expand_env_in_value(&mut v);

        let typed: GleanerConfig =
            serde_json::from_value(v).map_err(|e| ConfigError::Message(e.to_string()))?;
        validate(&typed)?;

        Ok(typed)
    }
}

fn validate(cfg: &GleanerConfig) -> Result<(), ConfigError> {
    if cfg.retry.min_delay_ms > cfg.retry.max_delay_ms {
        return Err(ConfigError::Message(format!(
            "retry.min_delay_ms ({}) exceeds retry.max_delay_ms ({})",
            cfg.retry.min_delay_ms, cfg.retry.max_delay_ms
        )));
    }
    for (i, rule) in cfg.extraction.rules.iter().enumerate() {
        if rule.css.is_some() == rule.class_pattern.is_some() {
            return Err(ConfigError::Message(format!(
                "extraction.rules[{i}] needs exactly one of `css` or `class_pattern`"
            )));
        }
    }
    Ok(())
}
