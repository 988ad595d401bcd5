use async_trait::async_trait;
use gleaner_common::{
    ExtractedRecord, ExtractionTarget, FetchError, FetchParams, RawContent, SinkError,
};
use gleaner_extract::ExtractionPipeline;
use gleaner_fetch::{
    BackoffPolicy, BatchRunner, FetchStrategy, FileSink, ParamPool, ResultSink, RetryController,
    RetryPolicy, SinkFormat, TargetOutcome,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Serves a page for every target except those starting with `missing`.
struct ByName;

#[async_trait]
impl FetchStrategy for ByName {
    fn name(&self) -> &str {
        "by-name"
    }

    async fn fetch(&self, target: &ExtractionTarget, _params: &FetchParams) -> Result<RawContent, FetchError> {
        if target.as_str().starts_with("missing") {
            return Err(FetchError::not_found(target, "404"));
        }
        let html = format!("<div class='prose'>Body of {target}</div>");
        Ok(RawContent::markup(target, self.name(), html))
    }
}

#[derive(Default)]
struct MemorySink {
    records: std::sync::Mutex<Vec<ExtractedRecord>>,
}

#[async_trait]
impl ResultSink for MemorySink {
    async fn persist(&self, record: &ExtractedRecord) -> Result<PathBuf, SinkError> {
        let mut records = self.records.lock().unwrap();
        records.push(record.clone());
        Ok(PathBuf::from(format!("mem-{}", records.len())))
    }
}

struct RejectingSink;

#[async_trait]
impl ResultSink for RejectingSink {
    async fn persist(&self, _record: &ExtractedRecord) -> Result<PathBuf, SinkError> {
        Err(SinkError::WriteFailed {
            path: PathBuf::from("/nowhere"),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        })
    }
}

/// Cancels the batch as soon as a write starts, then takes a while to finish it.
struct CancelDuringWrite {
    cancel: CancellationToken,
    finished: std::sync::Mutex<Vec<String>>,
}

#[async_trait]
impl ResultSink for CancelDuringWrite {
    async fn persist(&self, record: &ExtractedRecord) -> Result<PathBuf, SinkError> {
        self.cancel.cancel();
        tokio::time::sleep(Duration::from_millis(500)).await;
        self.finished.lock().unwrap().push(record.origin_target.to_string());
        Ok(PathBuf::from("written"))
    }
}

fn controller() -> Arc<RetryController> {
    Arc::new(RetryController::new(
        Arc::new(ByName),
        Arc::new(ExtractionPipeline::with_default_rules().unwrap()),
        Arc::new(ParamPool::default()),
        RetryPolicy {
            max_attempts: 2,
            backoff: BackoffPolicy::new(Duration::from_millis(10), Duration::from_millis(20)),
            permanent_after: 1,
        },
    ))
}

fn targets(names: &[&str]) -> Vec<ExtractionTarget> {
    names.iter().map(|n| ExtractionTarget::new(*n)).collect()
}

#[tokio::test(start_paused = true)]
async fn give_up_does_not_stop_the_batch() {
    let tmp = tempfile::tempdir().unwrap();
    let runner = BatchRunner::new(controller(), Arc::new(FileSink::new(tmp.path(), SinkFormat::Markdown)))
        .with_pause(Duration::from_millis(100));

    let report = runner.run(&targets(&["first", "missing-page", "third"])).await;

    assert_eq!(report.outcomes.len(), 3);
    assert_eq!(report.succeeded(), 2);
    assert_eq!(report.failed(), 1);
    assert!(!report.all_succeeded());
    assert!(matches!(report.outcomes[1].1, TargetOutcome::GaveUp(_)));
    assert_eq!(std::fs::read_dir(tmp.path()).unwrap().count(), 2);
}

#[tokio::test]
async fn sink_failure_is_reported_per_target() {
    let runner = BatchRunner::new(controller(), Arc::new(RejectingSink));

    let report = runner.run(&targets(&["a", "b"])).await;

    assert_eq!(report.failed(), 2);
    assert!(report
        .outcomes
        .iter()
        .all(|(_, o)| matches!(o, TargetOutcome::SinkFailed(_))));
}

#[tokio::test(start_paused = true)]
async fn cancellation_skips_remaining_targets() {
    let sink = Arc::new(MemorySink::default());
    let cancel = CancellationToken::new();
    let runner = BatchRunner::new(controller(), sink.clone())
        .with_pause(Duration::from_secs(60))
        .with_cancellation(cancel.clone());

    let canceller = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(30)).await;
        cancel.cancel();
    });
    let report = runner.run(&targets(&["a", "b", "c"])).await;
    canceller.await.unwrap();

    assert_eq!(report.succeeded(), 1);
    assert_eq!(sink.records.lock().unwrap().len(), 1);
    assert!(matches!(report.outcomes[1].1, TargetOutcome::Skipped));
    assert!(matches!(report.outcomes[2].1, TargetOutcome::Skipped));
}

#[tokio::test(start_paused = true)]
async fn cancellation_lets_a_started_write_finish() {
    let cancel = CancellationToken::new();
    let sink = Arc::new(CancelDuringWrite {
        cancel: cancel.clone(),
        finished: Default::default(),
    });
    let runner = BatchRunner::new(controller(), sink.clone()).with_cancellation(cancel);

    let report = runner.run(&targets(&["a", "b"])).await;

    assert_eq!(*sink.finished.lock().unwrap(), vec!["a".to_string()]);
    assert!(matches!(report.outcomes[0].1, TargetOutcome::Persisted(_)));
    assert!(matches!(report.outcomes[1].1, TargetOutcome::Skipped));
}

#[tokio::test]
async fn empty_batch_is_successful() {
    let runner = BatchRunner::new(controller(), Arc::new(RejectingSink));
    let report = runner.run(&[]).await;
    assert!(report.all_succeeded());
    assert!(report.outcomes.is_empty());
}
