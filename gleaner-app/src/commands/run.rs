use crate::wiring;
use anyhow::{bail, Result};
use clap::Args;
use gleaner_common::ExtractionTarget;
use gleaner_config::GleanerConfig;
use gleaner_fetch::{BatchReport, BatchRunner, TargetOutcome};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

#[derive(Args)]
pub struct RunArgs {
    /// Targets to process instead of the configured list
    pub targets: Vec<String>,
}

/// `true` when every target was persisted.
pub async fn run(args: &RunArgs, cfg: &GleanerConfig, cancel: CancellationToken) -> Result<bool> {
    let raw = if args.targets.is_empty() {
        &cfg.targets
    } else {
        &args.targets
    };
    let targets: Vec<ExtractionTarget> = raw
        .iter()
        .map(|t| ExtractionTarget::new(t.as_str()))
        .filter(|t| !t.as_str().is_empty())
        .collect();
    if targets.is_empty() {
        bail!("no targets: pass them on the command line or set `targets` in the config");
    }

    let pipeline = Arc::new(wiring::build_pipeline(&cfg.extraction)?);
    let controller = Arc::new(wiring::build_controller(cfg, pipeline)?);
    let sink = Arc::new(wiring::build_sink(&cfg.output));
    let runner = BatchRunner::new(controller, sink)
        .with_pause(Duration::from_millis(cfg.retry.pause_between_targets_ms))
        .with_cancellation(cancel);

    let report = runner.run(&targets).await;
    print_summary(&report);
    Ok(report.all_succeeded())
}

fn print_summary(report: &BatchReport) {
    for (target, outcome) in &report.outcomes {
        match outcome {
            TargetOutcome::Persisted(path) => println!("ok      {target} -> {}", path.display()),
            TargetOutcome::GaveUp(err) => println!("failed  {target}: {err}"),
            TargetOutcome::SinkFailed(err) => println!("failed  {target}: {err}"),
            TargetOutcome::Skipped => println!("skipped {target}"),
        }
    }
    println!(
        "{} succeeded, {} failed",
        report.succeeded(),
        report.failed()
    );
}
