//! Request executor: one logical request, many attempts.
//!
//! The retry loop is an explicit state machine:
//!
//! ```text
//! Attempt ──▶ Classify ──▶ Stop        (success, rejected, budget spent)
//!    ▲            │
//!    └─ Backoff ◀─┘                    (transient, rate limited, blocked)
//! ```
//!
//! Each backoff wait is the larger of the throttle's retry delay, the
//! exponential floor for that attempt and the previous wait, so waits never
//! shrink within one request.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::outcome::{classify_response, classify_transport_error, RetryableOutcome};
use super::sleeper::Sleeper;
use super::throttle::ThrottleController;
use crate::data::transport::{RequestSpec, Transport};

/// Retry budget and backoff shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Attempts per logical request, including the first.
    pub max_attempts: u32,
    pub timeout_secs: u64,
    /// Floor of the first backoff wait.
    pub base_backoff_ms: u64,
    /// Growth of the floor per additional attempt; must be > 1.
    pub backoff_factor: f64,
    pub max_backoff_secs: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            timeout_secs: 15,
            base_backoff_ms: 2_000,
            backoff_factor: 2.0,
            max_backoff_secs: 600,
        }
    }
}

impl RetryPolicy {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }

    /// Minimum wait after the `failures`-th failed attempt (1-based):
    /// `base * factor^(failures - 1)`, capped at `max_backoff_secs`.
    pub fn floor_for(&self, failures: u32) -> Duration {
        let factor = if self.backoff_factor > 1.0 {
            self.backoff_factor
        } else {
            2.0
        };
        let exp = failures.saturating_sub(1).min(64) as i32;
        let secs = (self.base_backoff_ms as f64 / 1_000.0) * factor.powi(exp);
        Duration::from_secs_f64(secs.min(self.max_backoff_secs as f64))
    }
}

enum Step {
    Attempt,
    Classify(RetryableOutcome),
    Backoff(RetryableOutcome),
    Stop(RetryableOutcome),
}

/// Executes request specs against a transport under a retry policy.
///
/// Never panics or returns an error: every failure is folded into a
/// [`RetryableOutcome`].
pub struct RequestExecutor {
    transport: Arc<dyn Transport>,
    throttle: Arc<ThrottleController>,
    sleeper: Arc<dyn Sleeper>,
    policy: RetryPolicy,
}

impl RequestExecutor {
    pub fn new(
        transport: Arc<dyn Transport>,
        throttle: Arc<ThrottleController>,
        sleeper: Arc<dyn Sleeper>,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            transport,
            throttle,
            sleeper,
            policy,
        }
    }

    pub fn throttle(&self) -> &ThrottleController {
        &self.throttle
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Run one logical request to a final outcome: `Success`, `Rejected`
    /// or `Exhausted`.
    pub fn execute(&self, spec: &RequestSpec) -> RetryableOutcome {
        self.sleeper.sleep(self.throttle.pre_delay());

        let max_attempts = self.policy.attempts();
        let mut attempts = 0u32;
        let mut last_wait = Duration::ZERO;
        let mut step = Step::Attempt;

        loop {
            step = match step {
                Step::Attempt => {
                    attempts += 1;
                    Step::Classify(self.attempt(spec))
                }
                Step::Classify(outcome) => {
                    self.throttle.on_outcome(&outcome);
                    if !outcome.is_retryable() {
                        Step::Stop(outcome)
                    } else if attempts >= max_attempts {
                        log::warn!("{}: giving up after {attempts} attempts ({outcome})", spec.label());
                        Step::Stop(RetryableOutcome::Exhausted {
                            attempts,
                            last: Box::new(outcome),
                        })
                    } else {
                        Step::Backoff(outcome)
                    }
                }
                Step::Backoff(outcome) => {
                    let wait = self
                        .throttle
                        .retry_delay(&outcome)
                        .max(self.policy.floor_for(attempts))
                        .max(last_wait);
                    log::info!(
                        "{}: {outcome} on attempt {attempts}/{max_attempts}, retrying in {:.1}s",
                        spec.label(),
                        wait.as_secs_f64()
                    );
                    self.sleeper.sleep(wait);
                    last_wait = wait;
                    Step::Attempt
                }
                Step::Stop(outcome) => return outcome,
            };
        }
    }

    fn attempt(&self, spec: &RequestSpec) -> RetryableOutcome {
        let shape = self.throttle.next_identity();
        log::trace!("{}: GET {} as {}", spec.label(), spec.url, shape.name());
        match self.transport.send(spec, &shape, self.policy.timeout()) {
            Ok(resp) => classify_response(resp),
            Err(e) => classify_transport_error(e),
        }
    }
}
