use gleaner_common::{AttemptOutcome, ExtractionTarget, FailureClass, FetchErrorKind, GiveUpReason};
use gleaner_extract::ExtractionPipeline;
use gleaner_fetch::backends::{ScriptedFetcher, Step};
use gleaner_fetch::{BackoffPolicy, ControllerState, ParamPool, RetryController, RetryPolicy};
use std::sync::Arc;
use std::time::Duration;

const PAGE: &str = "<html><body><div class='prose'>Hello world</div></body></html>";

fn controller(strategy: Arc<ScriptedFetcher>, max_attempts: u32, permanent_after: u32) -> RetryController {
    let pool = ParamPool::new(
        vec!["ua-1".into(), "ua-2".into(), "ua-3".into()],
        vec!["http://p1:8080".into(), "http://p2:8080".into()],
        vec!["en-US".into(), "en-GB".into()],
    );
    RetryController::new(
        strategy,
        Arc::new(ExtractionPipeline::with_default_rules().unwrap()),
        Arc::new(pool),
        RetryPolicy {
            max_attempts,
            backoff: BackoffPolicy::new(Duration::from_millis(1000), Duration::from_millis(5000)),
            permanent_after,
        },
    )
}

#[tokio::test(start_paused = true)]
async fn blocked_three_times_then_success() {
    let strategy = Arc::new(ScriptedFetcher::failing_then(FetchErrorKind::Blocked, 3, PAGE));
    let ctl = controller(strategy.clone(), 5, 1);

    let trace = ctl.run_traced(&ExtractionTarget::new("ok-target")).await;
    let record = trace.result.unwrap();

    assert_eq!(record.main_content.as_deref(), Some("Hello world"));
    assert_eq!(strategy.calls(), 4);
    assert_eq!(trace.attempts.len(), 4);
    assert_eq!(trace.attempts[3].outcome, AttemptOutcome::Success);
    assert!(trace.attempts[..3]
        .iter()
        .all(|a| a.outcome == AttemptOutcome::TransientFailure(FailureClass::Blocked)));
    assert_eq!(trace.states.first(), Some(&ControllerState::Idle));
    assert_eq!(trace.states.last(), Some(&ControllerState::Success));
}

#[tokio::test(start_paused = true)]
async fn rotation_changes_params_after_transient_failure() {
    let strategy = Arc::new(ScriptedFetcher::failing_then(FetchErrorKind::Blocked, 2, PAGE));
    let ctl = controller(strategy.clone(), 3, 1);

    ctl.run(&ExtractionTarget::new("ok-target")).await.unwrap();

    let seen = strategy.seen_params();
    assert_eq!(seen.len(), 3);
    for pair in seen.windows(2) {
        assert_ne!(pair[0].user_agent, pair[1].user_agent);
        assert_ne!(pair[0].proxy, pair[1].proxy);
        assert_ne!(pair[0].locale, pair[1].locale);
    }
}

#[tokio::test(start_paused = true)]
async fn always_blocked_exhausts_budget() {
    let strategy = Arc::new(ScriptedFetcher::always(FetchErrorKind::Blocked));
    let ctl = controller(strategy.clone(), 3, 1);

    let trace = ctl.run_traced(&ExtractionTarget::new("ok-target")).await;
    let err = trace.result.unwrap_err();

    assert_eq!(strategy.calls(), 3);
    assert_eq!(err.attempts_made, 3);
    assert_eq!(err.reason, GiveUpReason::BudgetExhausted);
    assert_eq!(err.last_classification, Some(FailureClass::Blocked));
    assert_eq!(trace.states.last(), Some(&ControllerState::GivenUp));
    // no backoff after the final attempt
    let retries = trace.states.iter().filter(|s| **s == ControllerState::Retrying).count();
    assert_eq!(retries, 2);
}

#[tokio::test(start_paused = true)]
async fn not_found_gives_up_immediately() {
    let strategy = Arc::new(ScriptedFetcher::always(FetchErrorKind::NotFound));
    let ctl = controller(strategy.clone(), 5, 1);

    let trace = ctl.run_traced(&ExtractionTarget::new("missing-target")).await;
    let err = trace.result.unwrap_err();

    assert_eq!(strategy.calls(), 1);
    assert_eq!(err.attempts_made, 1);
    assert_eq!(err.reason, GiveUpReason::Permanent);
    assert_eq!(err.last_classification, Some(FailureClass::NotFound));
    assert_eq!(
        trace.attempts[0].outcome,
        AttemptOutcome::PermanentFailure(FailureClass::NotFound)
    );
    assert!(!trace.states.contains(&ControllerState::Retrying));
}

#[tokio::test(start_paused = true)]
async fn permanent_threshold_counts_consecutive_failures() {
    let strategy = Arc::new(ScriptedFetcher::new([
        Step::Fail(FetchErrorKind::Unknown),
        Step::Fail(FetchErrorKind::Timeout),
        Step::Fail(FetchErrorKind::Unknown),
        Step::Fail(FetchErrorKind::Unknown),
    ]));
    let ctl = controller(strategy.clone(), 10, 2);

    let err = ctl.run(&ExtractionTarget::new("ok-target")).await.unwrap_err();

    // the timeout in between resets the streak
    assert_eq!(strategy.calls(), 4);
    assert_eq!(err.reason, GiveUpReason::Permanent);
    assert_eq!(err.last_classification, Some(FailureClass::Unknown));
}

#[tokio::test(start_paused = true)]
async fn unmatched_content_is_retried() {
    let strategy = Arc::new(ScriptedFetcher::new([
        Step::Markup("<html><body><nav>menu</nav></body></html>".into()),
        Step::Markup(PAGE.into()),
    ]));
    let ctl = controller(strategy.clone(), 3, 1);

    let trace = ctl.run_traced(&ExtractionTarget::new("ok-target")).await;

    assert!(trace.result.is_ok());
    assert_eq!(strategy.calls(), 2);
    assert_eq!(
        trace.attempts[0].outcome,
        AttemptOutcome::TransientFailure(FailureClass::NoRuleMatched)
    );
}

#[tokio::test(start_paused = true)]
async fn backoff_waits_inside_the_window() {
    let strategy = Arc::new(ScriptedFetcher::always(FetchErrorKind::Timeout));
    let ctl = controller(strategy.clone(), 3, 1);

    let started = tokio::time::Instant::now();
    ctl.run(&ExtractionTarget::new("ok-target")).await.unwrap_err();
    let waited = started.elapsed();

    // two backoffs of 1..=5 s each
    assert!(waited >= Duration::from_secs(2), "waited {waited:?}");
    assert!(waited <= Duration::from_secs(10) + Duration::from_millis(50), "waited {waited:?}");
}

#[tokio::test(start_paused = true)]
async fn never_exceeds_budget() {
    for max in 1..=6 {
        let strategy = Arc::new(ScriptedFetcher::always(FetchErrorKind::Blocked));
        let ctl = controller(strategy.clone(), max, 1);
        let err = ctl.run(&ExtractionTarget::new("ok-target")).await.unwrap_err();
        assert_eq!(strategy.calls(), max);
        assert_eq!(err.attempts_made, max);
    }
}
