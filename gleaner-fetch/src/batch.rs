use crate::retry::RetryController;
use crate::sink::ResultSink;
use gleaner_common::{ExtractionTarget, GiveUpError, SinkError};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

#[derive(Debug)]
pub enum TargetOutcome {
    Persisted(PathBuf),
    GaveUp(GiveUpError),
    SinkFailed(SinkError),
    /// Not attempted because the run was cancelled.
    Skipped,
}

impl TargetOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, TargetOutcome::Persisted(_))
    }
}

#[derive(Debug, Default)]
pub struct BatchReport {
    pub outcomes: Vec<(ExtractionTarget, TargetOutcome)>,
}

impl BatchReport {
    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|(_, o)| o.is_success()).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.succeeded()
    }

    pub fn all_succeeded(&self) -> bool {
        self.failed() == 0
    }
}

/// Runs targets one after another through a controller and a sink.
///
/// A give-up or a failed write is recorded and the batch moves on.
pub struct BatchRunner {
    controller: Arc<RetryController>,
    sink: Arc<dyn ResultSink>,
    pause_between: Duration,
    cancel: CancellationToken,
}

impl BatchRunner {
    pub fn new(controller: Arc<RetryController>, sink: Arc<dyn ResultSink>) -> Self {
        Self {
            controller,
            sink,
            pause_between: Duration::ZERO,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_pause(mut self, pause: Duration) -> Self {
        self.pause_between = pause;
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancellation(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub async fn run(&self, targets: &[ExtractionTarget]) -> BatchReport {
        let mut report = BatchReport::default();
        tracing::info!(
            targets = targets.len(),
            backend = self.controller.strategy_name(),
            "batch.start"
        );

        for (i, target) in targets.iter().enumerate() {
            if self.cancel.is_cancelled() {
                report.outcomes.push((target.clone(), TargetOutcome::Skipped));
                continue;
            }
            if i > 0 && !self.pause_between.is_zero() {
                tokio::select! {
                    _ = self.cancel.cancelled() => {
                        report.outcomes.push((target.clone(), TargetOutcome::Skipped));
                        continue;
                    }
                    _ = tokio::time::sleep(self.pause_between) => {}
                }
            }

            let outcome = self.process(target).await;
            report.outcomes.push((target.clone(), outcome));
        }

        tracing::info!(
            succeeded = report.succeeded(),
            failed = report.failed(),
            cancelled = self.cancel.is_cancelled(),
            "batch.finished"
        );
        report
    }

    /// Cancellation interrupts fetching and backoff, never a write that has
    /// started: a dropped write would leave a truncated file behind.
    async fn process(&self, target: &ExtractionTarget) -> TargetOutcome {
        let run = tokio::select! {
            _ = self.cancel.cancelled() => return TargetOutcome::Skipped,
            run = self.controller.run(target) => run,
        };
        let record = match run {
            Ok(record) => record,
            Err(give_up) => {
                tracing::warn!(target_id = %target, error = %give_up, "batch.target.gave_up");
                return TargetOutcome::GaveUp(give_up);
            }
        };
        if self.cancel.is_cancelled() {
            return TargetOutcome::Skipped;
        }
        match self.sink.persist(&record).await {
            Ok(path) => TargetOutcome::Persisted(path),
            Err(e) => {
                tracing::error!(target_id = %target, error = %e, "batch.target.sink_failed");
                TargetOutcome::SinkFailed(e)
            }
        }
    }
}
