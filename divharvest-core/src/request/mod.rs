//! Outbound request machinery: executor, throttle controller, identity
//! rotation and the sleeping seam.

pub mod breaker;
pub mod executor;
pub mod identity;
pub mod outcome;
pub mod sleeper;
pub mod stats;
pub mod throttle;

pub use breaker::{BreakerState, FailureBreaker};
pub use executor::{RequestExecutor, RetryPolicy};
pub use identity::{default_shapes, IdentityPool, RequestShape};
pub use outcome::{OutcomeKind, RetryableOutcome, TransientReason};
pub use sleeper::{Clock, MonotonicClock, Sleeper, ThreadSleeper};
pub use stats::RequestStats;
pub use throttle::{ThrottleConfig, ThrottleController};
