use crate::wiring;
use anyhow::{Context, Result};
use clap::Args;
use gleaner_common::{ExtractionTarget, RawContent};
use gleaner_config::GleanerConfig;
use gleaner_extract::ExtractionPipeline;
use gleaner_fetch::{FileSink, ResultSink};
use gleaner_stream::{answer_from_event, Frame, MonitorEnd, Subscription};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

const BACKEND: &str = "listener";

#[derive(Args)]
pub struct ListenArgs {
    /// Seconds to keep listening (defaults to `listener.monitor_secs`)
    #[arg(long)]
    pub duration: Option<u64>,
    /// Send this query once the connection is open
    #[arg(long)]
    pub query: Option<String>,
}

/// `true` when no received answer failed to persist.
pub async fn run(args: &ListenArgs, cfg: &GleanerConfig, cancel: CancellationToken) -> Result<bool> {
    let listener = cfg
        .listener
        .as_ref()
        .context("`listener` section is missing from the config")?;
    let pipeline = Arc::new(wiring::build_pipeline(&cfg.extraction)?);
    let sink = Arc::new(wiring::build_sink(&cfg.output));
    let duration = Duration::from_secs(args.duration.unwrap_or(listener.monitor_secs));

    let mut subscription = Subscription::connect(listener).await?;
    let stop = subscription.cancellation();
    let forward = tokio::spawn(async move {
        cancel.cancelled().await;
        stop.cancel();
    });
    if let Some(query) = args.query.as_deref() {
        subscription.send_query(query).await?;
    }

    let persisted = Arc::new(AtomicUsize::new(0));
    let failed = Arc::new(AtomicUsize::new(0));
    let fallback = ExtractionTarget::new(listener.url.as_str());
    let answer_event = listener.answer_event.clone();

    let summary = subscription
        .monitor(duration, |frame| {
            let pipeline = pipeline.clone();
            let sink = sink.clone();
            let persisted = persisted.clone();
            let failed = failed.clone();
            let fallback = fallback.clone();
            let answer_event = answer_event.clone();
            async move {
                let Frame::Event { name, data } = frame else {
                    return;
                };
                if name != answer_event {
                    tracing::debug!(event = %name, "listen.event_ignored");
                    return;
                }
                let Some((query, answer)) = answer_from_event(&data) else {
                    tracing::debug!(event = %name, "listen.event_without_answer");
                    return;
                };
                let target = query.map(ExtractionTarget::new).unwrap_or(fallback);
                let counter = match persist(&pipeline, sink.as_ref(), &target, answer).await {
                    Ok(()) => persisted,
                    Err(e) => {
                        tracing::error!(target_id = %target, error = %format!("{e:#}"), "listen.persist_failed");
                        failed
                    }
                };
                counter.fetch_add(1, Ordering::SeqCst);
            }
        })
        .await;

    subscription.close().await;
    forward.abort();

    let persisted = persisted.load(Ordering::SeqCst);
    let failed = failed.load(Ordering::SeqCst);
    let ended = match summary.ended {
        MonitorEnd::Elapsed => "duration elapsed",
        MonitorEnd::PeerClosed => "peer closed",
        MonitorEnd::Cancelled => "cancelled",
    };
    println!(
        "{} frames, {persisted} answers persisted, {failed} failed ({ended})",
        summary.frames
    );
    Ok(failed == 0)
}

async fn persist(
    pipeline: &ExtractionPipeline,
    sink: &FileSink,
    target: &ExtractionTarget,
    answer: gleaner_common::StructuredAnswer,
) -> Result<()> {
    let raw = RawContent::answer(target, BACKEND, answer);
    let record = pipeline.extract(&raw)?;
    let path = sink.persist(&record).await?;
    println!("ok      {target} -> {}", path.display());
    Ok(())
}
