use crate::strategy::FetchStrategy;
use async_trait::async_trait;
use gleaner_common::{ExtractionTarget, FetchError, FetchErrorKind, FetchParams, RawContent};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

/// One scripted response.
#[derive(Debug, Clone)]
pub enum Step {
    Markup(String),
    Fail(FetchErrorKind),
}

/// Replays a fixed sequence of responses; useful in tests and dry runs.
///
/// Once the script is exhausted the last step repeats. Every call records the
/// parameters it was given.
#[derive(Debug, Default)]
pub struct ScriptedFetcher {
    steps: Mutex<VecDeque<Step>>,
    last: Mutex<Option<Step>>,
    calls: AtomicU32,
    seen: Mutex<Vec<FetchParams>>,
}

impl ScriptedFetcher {
    pub fn new(steps: impl IntoIterator<Item = Step>) -> Self {
        Self {
            steps: Mutex::new(steps.into_iter().collect()),
            ..Default::default()
        }
    }

    /// `failures` copies of `kind`, then `html`.
    pub fn failing_then(kind: FetchErrorKind, failures: usize, html: &str) -> Self {
        let mut steps = vec![Step::Fail(kind); failures];
        steps.push(Step::Markup(html.to_string()));
        Self::new(steps)
    }

    pub fn always(kind: FetchErrorKind) -> Self {
        Self::new([Step::Fail(kind)])
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn seen_params(&self) -> Vec<FetchParams> {
        self.seen.lock().map(|s| s.clone()).unwrap_or_default()
    }

    fn next_step(&self) -> Option<Step> {
        let mut steps = self.steps.lock().ok()?;
        let mut last = self.last.lock().ok()?;
        if let Some(step) = steps.pop_front() {
            *last = Some(step);
        }
        last.clone()
    }
}

#[async_trait]
impl FetchStrategy for ScriptedFetcher {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn fetch(&self, target: &ExtractionTarget, params: &FetchParams) -> Result<RawContent, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut seen) = self.seen.lock() {
            seen.push(params.clone());
        }
        match self.next_step() {
            Some(Step::Markup(html)) => Ok(RawContent::markup(target, self.name(), html)),
            Some(Step::Fail(kind)) => Err(FetchError::new(kind, target, "scripted failure")),
            None => Err(FetchError::unknown(target, "empty script")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn replays_then_repeats_last() {
        let f = ScriptedFetcher::failing_then(FetchErrorKind::Blocked, 1, "<p>x</p>");
        let t = ExtractionTarget::new("ok-target");
        let p = FetchParams::default();
        assert_eq!(f.fetch(&t, &p).await.unwrap_err().kind, FetchErrorKind::Blocked);
        assert!(f.fetch(&t, &p).await.is_ok());
        assert!(f.fetch(&t, &p).await.is_ok());
        assert_eq!(f.calls(), 3);
        assert_eq!(f.seen_params().len(), 3);
    }
}
