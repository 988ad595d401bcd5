use anyhow::{bail, Context, Result};
use gleaner_common::observability::{LogConfig, LogFormat};
use gleaner_config::{
    BackendSpec, ExtractionConfig, GleanerConfig, LogSettings, OutputConfig, OutputFormat,
    PoolConfig, RetryConfig, RuleField, RuleSpec,
};
use gleaner_extract::{ExtractionPipeline, Field, Rule};
use gleaner_fetch::backends::{BrowserFetcher, ChatApiFetcher, HttpFetcher, ProxyServiceFetcher};
use gleaner_fetch::{
    BackoffPolicy, DiagnosticSink, FetchStrategy, FileSink, ParamPool, RetryController,
    RetryPolicy, SinkFormat,
};
use std::sync::Arc;
use std::time::Duration;

pub fn log_config(settings: &LogSettings) -> LogConfig {
    LogConfig {
        log_dir: settings.dir.clone(),
        emit_stderr: settings.stderr,
        format: LogFormat::parse(&settings.format),
        default_filter: settings.filter.clone(),
        ..LogConfig::default()
    }
}

/// Configured rules replace the built-in set; none configured keeps it.
pub fn build_pipeline(cfg: &ExtractionConfig) -> Result<ExtractionPipeline> {
    let pipeline = if cfg.rules.is_empty() {
        ExtractionPipeline::with_default_rules()?
    } else {
        let rules = cfg
            .rules
            .iter()
            .enumerate()
            .map(|(i, spec)| rule_from_spec(spec).with_context(|| format!("extraction.rules[{i}]")))
            .collect::<Result<Vec<_>>>()?;
        ExtractionPipeline::new(rules)
    };
    Ok(pipeline.with_min_content_chars(cfg.min_content_chars))
}

fn rule_from_spec(spec: &RuleSpec) -> Result<Rule> {
    let field = match spec.field {
        RuleField::Title => Field::Title,
        RuleField::MainContent => Field::MainContent,
        RuleField::Sources => Field::Sources,
        RuleField::Related => Field::Related,
    };
    let rule = match (&spec.css, &spec.class_pattern) {
        (Some(css), None) => Rule::css(field, css)?,
        (None, Some(pattern)) => Rule::class_pattern(field, pattern, spec.tag.as_deref())?,
        _ => bail!("a rule needs exactly one of css or class_pattern"),
    };
    Ok(rule)
}

pub fn build_pool(cfg: &PoolConfig) -> ParamPool {
    ParamPool::new(cfg.user_agents.clone(), cfg.proxies.clone(), cfg.locales.clone())
        .with_settle_timeout(Duration::from_millis(cfg.settle_timeout_ms))
}

pub fn retry_policy(cfg: &RetryConfig) -> RetryPolicy {
    RetryPolicy {
        max_attempts: cfg.max_attempts,
        backoff: BackoffPolicy::new(
            Duration::from_millis(cfg.min_delay_ms),
            Duration::from_millis(cfg.max_delay_ms),
        ),
        permanent_after: cfg.permanent_after,
    }
}

pub fn build_strategy(spec: &BackendSpec, output: &OutputConfig) -> Result<Arc<dyn FetchStrategy>> {
    let strategy: Arc<dyn FetchStrategy> = match spec {
        BackendSpec::Http { config } => Arc::new(HttpFetcher::new(config.clone())?),
        BackendSpec::Browser { config } => {
            let mut fetcher = BrowserFetcher::new(config.clone());
            if let Some(dir) = &output.diagnostics_dir {
                fetcher = fetcher.with_diagnostics(DiagnosticSink::new(dir));
            }
            Arc::new(fetcher)
        }
        BackendSpec::ProxyService { config } => Arc::new(ProxyServiceFetcher::new(config.clone())?),
        BackendSpec::ChatApi { config } => Arc::new(ChatApiFetcher::new(config.clone())?),
    };
    Ok(strategy)
}

pub fn build_sink(cfg: &OutputConfig) -> FileSink {
    let format = match cfg.format {
        OutputFormat::Markdown => SinkFormat::Markdown,
        OutputFormat::Json => SinkFormat::Json,
    };
    FileSink::new(&cfg.dir, format)
}

pub fn build_controller(cfg: &GleanerConfig, pipeline: Arc<ExtractionPipeline>) -> Result<RetryController> {
    let strategy = build_strategy(&cfg.backend, &cfg.output)?;
    tracing::info!(
        backend = cfg.backend.kind(),
        max_attempts = cfg.retry.max_attempts,
        "wiring.controller"
    );
    Ok(RetryController::new(
        strategy,
        pipeline,
        Arc::new(build_pool(&cfg.pool)),
        retry_policy(&cfg.retry),
    ))
}
