//! Consecutive-failure breaker.
//!
//! Counts failed attempts in a row. When the count reaches the ceiling the
//! breaker trips once and the counter starts over, so sustained degradation
//! produces one long cooldown per ceiling's worth of failures rather than an
//! ever-growing one.

/// State of the breaker after recording an attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    /// Below the ceiling: keep going.
    Closed { consecutive_failures: u32 },
    /// The ceiling was just reached; the counter has been reset.
    Tripped,
}

/// Failure counter with a trip ceiling.
#[derive(Debug, Clone)]
pub struct FailureBreaker {
    consecutive_failures: u32,
    ceiling: u32,
}

impl FailureBreaker {
    /// A ceiling of zero is treated as one.
    pub fn new(ceiling: u32) -> Self {
        Self {
            consecutive_failures: 0,
            ceiling: ceiling.max(1),
        }
    }

    /// Record a successful attempt: resets the failure counter.
    pub fn record_success(&mut self) {
        self.consecutive_failures = 0;
    }

    /// Record a failed attempt. Trips and resets when the ceiling is reached.
    pub fn record_failure(&mut self) -> BreakerState {
        self.consecutive_failures += 1;
        if self.consecutive_failures >= self.ceiling {
            self.consecutive_failures = 0;
            BreakerState::Tripped
        } else {
            BreakerState::Closed {
                consecutive_failures: self.consecutive_failures,
            }
        }
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_closed() {
        let b = FailureBreaker::new(3);
        assert_eq!(b.consecutive_failures(), 0);
    }

    #[test]
    fn trips_at_ceiling_and_resets() {
        let mut b = FailureBreaker::new(3);
        assert_eq!(b.record_failure(), BreakerState::Closed { consecutive_failures: 1 });
        assert_eq!(b.record_failure(), BreakerState::Closed { consecutive_failures: 2 });
        assert_eq!(b.record_failure(), BreakerState::Tripped);
        assert_eq!(b.consecutive_failures(), 0);
        // Counting starts over rather than escalating.
        assert_eq!(b.record_failure(), BreakerState::Closed { consecutive_failures: 1 });
    }

    #[test]
    fn success_resets_counter() {
        let mut b = FailureBreaker::new(3);
        b.record_failure();
        b.record_failure();
        b.record_success();
        assert_eq!(b.record_failure(), BreakerState::Closed { consecutive_failures: 1 });
        assert_eq!(b.consecutive_failures(), 1);
    }

    #[test]
    fn zero_ceiling_trips_every_failure() {
        let mut b = FailureBreaker::new(0);
        assert_eq!(b.record_failure(), BreakerState::Tripped);
        assert_eq!(b.record_failure(), BreakerState::Tripped);
    }
}
