use gleaner_config::{
    BackendSpec, BrowserEngine, GleanerConfigLoader, OutputFormat, RuleField,
};
use serial_test::serial;
use std::{fs, path::PathBuf};
use tempfile::TempDir;

/// Helper to write a YAML file in a temp dir and return its path.
fn write_yaml(tmp: &TempDir, name: &str, yaml: &str) -> PathBuf {
    let p = tmp.path().join(name);
    fs::write(&p, yaml).expect("write yaml");
    p
}

#[test]
#[serial]
fn loads_full_file() {
    let tmp = TempDir::new().unwrap();
    let out_dir = tmp.path().join("records");

    let file_yaml = format!(
        r#"
version: "0.1"
targets:
  - "https://www.example.com/search/top-10-cars"
  - "explain quantum computing"
pool:
  user_agents:
    - "Mozilla/5.0 (X11; Linux x86_64) Gecko/20100101 Firefox/117.0"
  proxies: ["http://proxy-a:8080", "http://proxy-b:8080"]
  locales: ["en-US", "en-GB"]
retry:
  max_attempts: 5
  min_delay_ms: 2000
  max_delay_ms: 7000
backend:
  kind: proxy_service
  config:
    api_key: "${{GLEANER_TEST_PROXY_KEY}}"
    wait_for: ".prose"
extraction:
  min_content_chars: 50
  rules:
    - field: main_content
      class_pattern: "prose|answer"
      tag: div
    - field: sources
      css: "footer a[href^='http']"
output:
  dir: "{}"
  format: json
"#,
        out_dir.display()
    );
    let p = write_yaml(&tmp, "gleaner.yaml", &file_yaml);

    temp_env::with_var("GLEANER_TEST_PROXY_KEY", Some("sekret"), || {
        let config = GleanerConfigLoader::new()
            .with_file(&p)
            .load()
            .expect("load config");

        assert_eq!(config.targets.len(), 2);
        assert_eq!(config.pool.proxies.len(), 2);
        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.retry.permanent_after, 1);
        assert_eq!(config.extraction.min_content_chars, 50);
        assert_eq!(config.extraction.rules[0].field, RuleField::MainContent);
        assert_eq!(config.extraction.rules[0].tag.as_deref(), Some("div"));
        assert_eq!(config.output.format, OutputFormat::Json);
        assert_eq!(config.output.dir, out_dir);
        match config.backend {
            BackendSpec::ProxyService { config } => {
                assert_eq!(config.api_key, "sekret");
                assert!(config.render_js);
                assert_eq!(config.wait_for.as_deref(), Some(".prose"));
            }
            other => panic!("unexpected backend {}", other.kind()),
        }
    });
}

#[test]
#[serial]
fn defaults_apply_to_empty_document() {
    let config = GleanerConfigLoader::new()
        .with_yaml_str("{}")
        .load()
        .expect("empty config");

    assert!(config.targets.is_empty());
    assert_eq!(config.retry.max_attempts, 3);
    assert_eq!(config.retry.min_delay_ms, 1000);
    assert_eq!(config.retry.max_delay_ms, 5000);
    assert_eq!(config.extraction.min_content_chars, 1);
    assert_eq!(config.output.format, OutputFormat::Markdown);
    assert!(config.listener.is_none());
    assert_eq!(config.backend.kind(), "http");
}

#[test]
#[serial]
fn env_overrides_file_values() {
    let tmp = TempDir::new().unwrap();
    let p = write_yaml(
        &tmp,
        "gleaner.yaml",
        "retry:\n  max_attempts: 2\nbackend:\n  kind: browser\n",
    );

    temp_env::with_var("GLEANER__RETRY__MAX_DELAY_MS", Some("9000"), || {
        let config = GleanerConfigLoader::new()
            .with_file(&p)
            .load()
            .expect("load config");
        assert_eq!(config.retry.max_attempts, 2);
        assert_eq!(config.retry.max_delay_ms, 9000);
        match config.backend {
            BackendSpec::Browser { config } => {
                assert_eq!(config.engine, BrowserEngine::Chromium);
                assert_eq!(config.webdriver_url, "http://localhost:4444");
            }
            other => panic!("unexpected backend {}", other.kind()),
        }
    });
}

#[test]
#[serial]
fn missing_optional_file_is_tolerated() {
    let tmp = TempDir::new().unwrap();
    let config = GleanerConfigLoader::new()
        .with_optional_file(tmp.path().join("absent.yaml"))
        .load()
        .expect("defaults only");
    assert_eq!(config.retry.max_attempts, 3);
}

#[test]
#[serial]
fn missing_required_secret_is_an_error() {
    let err = GleanerConfigLoader::new()
        .with_yaml_str("backend:\n  kind: chat_api\n  config: {}\n")
        .load()
        .expect_err("api_key is required");
    assert!(err.to_string().contains("api_key"));
}

#[test]
#[serial]
fn listener_section_takes_defaults() {
    let config = GleanerConfigLoader::new()
        .with_yaml_str(
            r#"
listener:
  url: "wss://push.example.com/socket.io/?EIO=4&transport=websocket"
  opening_frames: ['42["session_init",{}]']
"#,
        )
        .load()
        .expect("listener config");
    let listener = config.listener.expect("listener present");
    assert_eq!(listener.answer_event, "query_response");
    assert_eq!(listener.query_event, "query");
    assert_eq!(listener.connect_timeout_ms, 10_000);
    assert_eq!(listener.opening_frames.len(), 1);
}
