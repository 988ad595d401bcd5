//! Retry/backoff controller around one fetch strategy and the pipeline.
//!
//! A run moves through `Idle -> Attempting -> {Success, Retrying, GivenUp}`:
//!
//! - `Blocked`, `Timeout` and `NoRuleMatched` are transient. The controller
//!   rotates parameters from the pool, sleeps a jittered interval inside the
//!   backoff window and tries again.
//! - `NotFound` and `Unknown` are permanent. Once `permanent_after`
//!   consecutive attempts end that way the run gives up at once; below the
//!   threshold it retries with the same parameters.
//! - The strategy is invoked at most `max_attempts` times per run.

use crate::params::ParamPool;
use crate::strategy::FetchStrategy;
use gleaner_common::{
    AttemptOutcome, ExtractedRecord, ExtractionTarget, FailureClass, FetchAttempt, GiveUpError,
    GiveUpReason,
};
use gleaner_extract::ExtractionPipeline;
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, Instant};

/// Uniform jitter window between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    pub min_delay: Duration,
    pub max_delay: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            min_delay: Duration::from_millis(1_000),
            max_delay: Duration::from_millis(5_000),
        }
    }
}

impl BackoffPolicy {
    pub fn new(min_delay: Duration, max_delay: Duration) -> Self {
        Self {
            min_delay,
            max_delay,
        }
    }

    /// A delay drawn uniformly from `[min_delay, max_delay]`.
    pub fn jittered<R: Rng + ?Sized>(&self, rng: &mut R) -> Duration {
        if self.max_delay <= self.min_delay {
            return self.min_delay;
        }
        let lo = self.min_delay.as_millis() as u64;
        let hi = self.max_delay.as_millis() as u64;
        Duration::from_millis(rng.gen_range(lo..=hi))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: BackoffPolicy,
    /// Consecutive permanent failures tolerated before giving up; 0 acts as 1.
    pub permanent_after: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: BackoffPolicy::default(),
            permanent_after: 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerState {
    Idle,
    Attempting,
    Retrying,
    Success,
    GivenUp,
}

/// Everything one run produced: the result, each attempt, every state.
#[derive(Debug)]
pub struct RunTrace {
    pub result: Result<ExtractedRecord, GiveUpError>,
    pub attempts: Vec<FetchAttempt>,
    pub states: Vec<ControllerState>,
}

pub struct RetryController {
    strategy: Arc<dyn FetchStrategy>,
    pipeline: Arc<ExtractionPipeline>,
    pool: Arc<ParamPool>,
    policy: RetryPolicy,
}

impl RetryController {
    pub fn new(
        strategy: Arc<dyn FetchStrategy>,
        pipeline: Arc<ExtractionPipeline>,
        pool: Arc<ParamPool>,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            strategy,
            pipeline,
            pool,
            policy,
        }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn strategy_name(&self) -> &str {
        self.strategy.name()
    }

    pub async fn run(&self, target: &ExtractionTarget) -> Result<ExtractedRecord, GiveUpError> {
        self.run_traced(target).await.result
    }

    /// Like [`run`](Self::run), keeping the attempt history and state path.
    pub async fn run_traced(&self, target: &ExtractionTarget) -> RunTrace {
        let mut attempts: Vec<FetchAttempt> = Vec::new();
        let mut states = vec![ControllerState::Idle];
        let max_attempts = self.policy.max_attempts;
        let permanent_after = self.policy.permanent_after.max(1);

        let mut params = self.pool.draw();
        let mut consecutive_permanent = 0u32;
        let mut last_class: Option<FailureClass> = None;
        let mut last_message: Option<String> = None;
        let mut reason = GiveUpReason::BudgetExhausted;

        for index in 1..=max_attempts {
            states.push(ControllerState::Attempting);
            tracing::debug!(
                target_id = %target,
                attempt = index,
                max_attempts,
                backend = self.strategy.name(),
                user_agent = ?params.user_agent,
                proxied = params.proxy.is_some(),
                locale = ?params.locale,
                "fetch.attempt.start"
            );

            let started = Instant::now();
            let outcome = match self.strategy.fetch(target, &params).await {
                Ok(raw) => self
                    .pipeline
                    .extract(&raw)
                    .map_err(|e| (FailureClass::from(&e), e.to_string())),
                Err(e) => Err((FailureClass::from(e.kind), e.to_string())),
            };
            let elapsed = started.elapsed();

            let (class, message) = match outcome {
                Ok(record) => {
                    attempts.push(FetchAttempt {
                        index,
                        params,
                        outcome: AttemptOutcome::Success,
                        elapsed,
                    });
                    states.push(ControllerState::Success);
                    tracing::info!(
                        target_id = %target,
                        attempt = index,
                        elapsed_ms = elapsed.as_millis() as u64,
                        "fetch.attempt.succeeded"
                    );
                    return RunTrace {
                        result: Ok(record),
                        attempts,
                        states,
                    };
                }
                Err(failure) => failure,
            };

            tracing::warn!(
                target_id = %target,
                attempt = index,
                class = %class,
                message = %message,
                elapsed_ms = elapsed.as_millis() as u64,
                "fetch.attempt.failed"
            );
            last_class = Some(class);
            last_message = Some(message);

            let transient = class.is_transient();
            attempts.push(FetchAttempt {
                index,
                params: params.clone(),
                outcome: if transient {
                    AttemptOutcome::TransientFailure(class)
                } else {
                    AttemptOutcome::PermanentFailure(class)
                },
                elapsed,
            });

            if transient {
                consecutive_permanent = 0;
            } else {
                consecutive_permanent += 1;
                if consecutive_permanent >= permanent_after {
                    reason = GiveUpReason::Permanent;
                    break;
                }
            }

            if index == max_attempts {
                break;
            }

            states.push(ControllerState::Retrying);
            if transient {
                params = self.pool.rotate(&params);
            }
            let delay = self.policy.backoff.jittered(&mut rand::thread_rng());
            tracing::debug!(
                target_id = %target,
                next_attempt = index + 1,
                delay_ms = delay.as_millis() as u64,
                rotated = transient,
                "retry.backoff"
            );
            sleep(delay).await;
        }

        states.push(ControllerState::GivenUp);
        let give_up = GiveUpError {
            target: target.to_string(),
            last_classification: last_class,
            attempts_made: attempts.len() as u32,
            reason,
            last_message,
        };
        tracing::warn!(
            target_id = %target,
            attempts_made = give_up.attempts_made,
            reason = ?give_up.reason,
            last = ?give_up.last_classification,
            "retry.giving_up"
        );
        RunTrace {
            result: Err(give_up),
            attempts,
            states,
        }
    }
}
