//! Throttle controller: pacing, cooldowns and identity rotation.
//!
//! Three kinds of wait live here:
//! - steady-state jitter between logical requests (`[min_delay, max_delay]`)
//! - cooldowns scheduled by rate-limit and block signals, and by the
//!   consecutive-failure breaker
//! - the intra-retry delay handed to the executor
//!
//! A cooldown is a shared deadline rather than a queued sleep. Every caller
//! of [`ThrottleController::pre_delay`] or
//! [`ThrottleController::retry_delay`] waits until the deadline has passed,
//! so a burst of 429s across concurrent workers pauses all of them once.
//!
//! A rate-limit or block cooldown stays armed until a success is observed
//! after its deadline; further 429s or 403s in the same episode do not
//! schedule another one. Sustained failure escalates through the breaker.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use super::breaker::{BreakerState, FailureBreaker};
use super::identity::{IdentityPool, RequestShape};
use super::outcome::{OutcomeKind, RetryableOutcome};
use super::sleeper::{Clock, MonotonicClock};
use super::stats::RequestStats;

/// Throttle tuning. All values are plain scalars so they map onto TOML.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThrottleConfig {
    pub min_delay_ms: u64,
    pub max_delay_ms: u64,
    pub rate_limit_cooldown_secs: u64,
    pub block_cooldown_secs: u64,
    /// Consecutive failed attempts before the breaker cooldown is scheduled.
    pub failure_ceiling: u32,
    pub breaker_cooldown_secs: u64,
    /// Fixed jitter seed; `None` seeds from entropy.
    pub seed: Option<u64>,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            min_delay_ms: 1_000,
            max_delay_ms: 2_500,
            rate_limit_cooldown_secs: 60,
            block_cooldown_secs: 90,
            failure_ceiling: 5,
            breaker_cooldown_secs: 300,
            seed: None,
        }
    }
}

impl ThrottleConfig {
    /// No waiting at all; for tests and replays against local fixtures.
    pub fn immediate() -> Self {
        Self {
            min_delay_ms: 0,
            max_delay_ms: 0,
            rate_limit_cooldown_secs: 0,
            block_cooldown_secs: 0,
            breaker_cooldown_secs: 0,
            seed: Some(0),
            ..Self::default()
        }
    }

    pub fn rate_limit_cooldown(&self) -> Duration {
        Duration::from_secs(self.rate_limit_cooldown_secs)
    }

    pub fn block_cooldown(&self) -> Duration {
        Duration::from_secs(self.block_cooldown_secs)
    }

    pub fn breaker_cooldown(&self) -> Duration {
        Duration::from_secs(self.breaker_cooldown_secs)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CooldownKind {
    RateLimit,
    Block,
    Breaker,
}

#[derive(Debug, Default)]
struct Cooldowns {
    /// Nobody sends before this instant.
    resume_at: Option<Instant>,
    rate_limit: Option<Instant>,
    block: Option<Instant>,
    breaker: Option<Instant>,
}

impl Cooldowns {
    fn slot(&mut self, kind: CooldownKind) -> &mut Option<Instant> {
        match kind {
            CooldownKind::RateLimit => &mut self.rate_limit,
            CooldownKind::Block => &mut self.block,
            CooldownKind::Breaker => &mut self.breaker,
        }
    }

    fn remaining(&self, now: Instant) -> Duration {
        self.resume_at
            .map_or(Duration::ZERO, |t| t.saturating_duration_since(now))
    }

    /// Push the shared deadline out by `duration` unless `kind` is already
    /// armed. The breaker re-arms once its own deadline has passed.
    fn schedule(&mut self, kind: CooldownKind, duration: Duration, now: Instant) -> bool {
        let armed = match *self.slot(kind) {
            Some(until) => kind != CooldownKind::Breaker || until > now,
            None => false,
        };
        if armed {
            return false;
        }
        let start = self.resume_at.filter(|t| *t > now).unwrap_or(now);
        let until = start + duration;
        self.resume_at = Some(until);
        *self.slot(kind) = Some(until);
        true
    }

    /// A success after a cooldown has run out ends that episode.
    fn disarm_elapsed(&mut self, now: Instant) {
        for slot in [&mut self.rate_limit, &mut self.block] {
            if slot.is_some_and(|until| until <= now) {
                *slot = None;
            }
        }
    }
}

#[derive(Debug)]
struct ThrottleState {
    breaker: FailureBreaker,
    cooldowns: Cooldowns,
    identities: IdentityPool,
    stats: RequestStats,
    rng: StdRng,
}

impl ThrottleState {
    fn jitter(&mut self, config: &ThrottleConfig) -> Duration {
        let lo = config.min_delay_ms;
        let hi = config.max_delay_ms.max(lo);
        let ms = if lo == hi { lo } else { self.rng.gen_range(lo..=hi) };
        Duration::from_millis(ms)
    }

    fn schedule(&mut self, kind: CooldownKind, duration: Duration, now: Instant) -> bool {
        if !self.cooldowns.schedule(kind, duration, now) {
            return false;
        }
        self.stats.cooldowns_scheduled += 1;
        self.stats.cooldown_ms += duration.as_millis() as u64;
        true
    }
}

/// Adaptive pacing shared by every executor in a run.
pub struct ThrottleController {
    config: ThrottleConfig,
    clock: Arc<dyn Clock>,
    state: Mutex<ThrottleState>,
}

impl fmt::Debug for ThrottleController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThrottleController")
            .field("config", &self.config)
            .field("state", &*self.state.lock())
            .finish_non_exhaustive()
    }
}

impl ThrottleController {
    pub fn new(config: ThrottleConfig) -> Self {
        Self::with_identities(config, IdentityPool::default())
    }

    pub fn with_identities(config: ThrottleConfig, identities: IdentityPool) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let state = ThrottleState {
            breaker: FailureBreaker::new(config.failure_ceiling),
            cooldowns: Cooldowns::default(),
            identities,
            stats: RequestStats::default(),
            rng,
        };
        Self {
            config,
            clock: Arc::new(MonotonicClock),
            state: Mutex::new(state),
        }
    }

    /// Read cooldown deadlines off `clock` instead of the monotonic clock.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(&self) -> &ThrottleConfig {
        &self.config
    }

    /// Wait before a new logical request: jitter plus whatever is left of
    /// the current cooldown.
    pub fn pre_delay(&self) -> Duration {
        let now = self.clock.now();
        let mut state = self.state.lock();
        let jitter = state.jitter(&self.config);
        let cooldown = state.cooldowns.remaining(now);
        if !cooldown.is_zero() {
            log::info!("throttle: cooling down for {:.1}s", cooldown.as_secs_f64());
        }
        jitter + cooldown
    }

    /// Delay before retrying after a failed attempt. Includes the remaining
    /// cooldown, so a retry after a 429 or 403 waits it out.
    pub fn retry_delay(&self, outcome: &RetryableOutcome) -> Duration {
        let now = self.clock.now();
        let mut state = self.state.lock();
        let wait = state.jitter(&self.config) + state.cooldowns.remaining(now);
        log::debug!("throttle: retry after {outcome} in {}ms", wait.as_millis());
        wait
    }

    /// Feed back one attempt's classification.
    pub fn on_outcome(&self, outcome: &RetryableOutcome) {
        let now = self.clock.now();
        let mut state = self.state.lock();
        let kind = outcome.kind();
        state.stats.record(kind);

        let degraded = match kind {
            OutcomeKind::Success => {
                state.breaker.record_success();
                state.cooldowns.disarm_elapsed(now);
                false
            }
            OutcomeKind::RateLimited => {
                if state.schedule(CooldownKind::RateLimit, self.config.rate_limit_cooldown(), now) {
                    log::warn!(
                        "throttle: rate limited, cooling down {}s",
                        self.config.rate_limit_cooldown_secs
                    );
                }
                true
            }
            OutcomeKind::Blocked => {
                if state.schedule(CooldownKind::Block, self.config.block_cooldown(), now) {
                    log::warn!(
                        "throttle: blocked, cooling down {}s",
                        self.config.block_cooldown_secs
                    );
                }
                true
            }
            OutcomeKind::Transient => true,
            // A 404 says nothing about our standing with the remote.
            OutcomeKind::Rejected | OutcomeKind::Exhausted => false,
        };

        if degraded && state.breaker.record_failure() == BreakerState::Tripped {
            state.stats.breaker_trips += 1;
            if state.schedule(CooldownKind::Breaker, self.config.breaker_cooldown(), now) {
                log::warn!(
                    "throttle: {} consecutive failures, breaker cooling down {}s",
                    self.config.failure_ceiling,
                    self.config.breaker_cooldown_secs
                );
            }
        }
    }

    /// Next request shape in the rotation.
    pub fn next_identity(&self) -> RequestShape {
        self.state.lock().identities.next_shape()
    }

    /// Snapshot of the request tallies.
    pub fn stats(&self) -> RequestStats {
        self.state.lock().stats
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.state.lock().breaker.consecutive_failures()
    }

    /// Time left until the shared cooldown deadline.
    pub fn cooldown_remaining(&self) -> Duration {
        let now = self.clock.now();
        self.state.lock().cooldowns.remaining(now)
    }
}
