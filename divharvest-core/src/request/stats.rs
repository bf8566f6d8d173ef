use serde::{Deserialize, Serialize};

use super::outcome::OutcomeKind;

/// Request tallies owned by the throttle controller.
///
/// Counts attempts, not logical requests: a request that succeeds on its
/// third try contributes two failures and one success.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestStats {
    pub total: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub transient: u64,
    pub rate_limited: u64,
    pub blocked: u64,
    pub rejected: u64,
    pub cooldowns_scheduled: u64,
    pub breaker_trips: u64,
    /// Total cooldown time scheduled, in milliseconds.
    pub cooldown_ms: u64,
}

impl RequestStats {
    pub fn record(&mut self, kind: OutcomeKind) {
        // Exhaustion summarizes attempts that were already counted.
        if kind == OutcomeKind::Exhausted {
            return;
        }
        self.total += 1;
        match kind {
            OutcomeKind::Success => self.succeeded += 1,
            OutcomeKind::Transient => self.transient += 1,
            OutcomeKind::RateLimited => self.rate_limited += 1,
            OutcomeKind::Blocked => self.blocked += 1,
            OutcomeKind::Rejected => self.rejected += 1,
            OutcomeKind::Exhausted => {}
        }
        if kind != OutcomeKind::Success {
            self.failed += 1;
        }
    }

    /// Fraction of attempts that succeeded; 0.0 when nothing was attempted.
    pub fn success_rate(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.succeeded as f64 / self.total as f64
        }
    }

    /// Sum of two tallies (e.g. a checkpointed segment plus the current one).
    pub fn merged(&self, other: &RequestStats) -> RequestStats {
        RequestStats {
            total: self.total + other.total,
            succeeded: self.succeeded + other.succeeded,
            failed: self.failed + other.failed,
            transient: self.transient + other.transient,
            rate_limited: self.rate_limited + other.rate_limited,
            blocked: self.blocked + other.blocked,
            rejected: self.rejected + other.rejected,
            cooldowns_scheduled: self.cooldowns_scheduled + other.cooldowns_scheduled,
            breaker_trips: self.breaker_trips + other.breaker_trips,
            cooldown_ms: self.cooldown_ms + other.cooldown_ms,
        }
    }
}
