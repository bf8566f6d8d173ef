//! Attempt classification.

use serde_json::Value;

use crate::data::transport::{RawResponse, TransportError};

/// Why an attempt is worth retrying.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransientReason {
    Timeout,
    Connection(String),
    /// 408 or 5xx.
    Server(u16),
    /// 2xx whose body was not JSON (block pages are often served as HTML 200s).
    MalformedBody(String),
}

impl std::fmt::Display for TransientReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Timeout => write!(f, "timeout"),
            Self::Connection(msg) => write!(f, "connection: {msg}"),
            Self::Server(status) => write!(f, "server status {status}"),
            Self::MalformedBody(msg) => write!(f, "malformed body: {msg}"),
        }
    }
}

/// Tagged result of one executor call (or one attempt within it).
///
/// `Exhausted` and `Rejected` are only produced as final results; the other
/// variants are per-attempt classifications that the executor may retry.
#[derive(Debug, Clone, PartialEq)]
pub enum RetryableOutcome {
    Success(Value),
    TransientFailure(TransientReason),
    RateLimited,
    Blocked,
    /// Non-retryable non-2xx status (404, 401, 400...).
    Rejected { status: u16 },
    /// Retry budget spent; carries the final attempt's classification.
    Exhausted {
        attempts: u32,
        last: Box<RetryableOutcome>,
    },
}

/// Payload-free discriminant, used for counters and log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutcomeKind {
    Success,
    Transient,
    RateLimited,
    Blocked,
    Rejected,
    Exhausted,
}

impl RetryableOutcome {
    pub fn kind(&self) -> OutcomeKind {
        match self {
            Self::Success(_) => OutcomeKind::Success,
            Self::TransientFailure(_) => OutcomeKind::Transient,
            Self::RateLimited => OutcomeKind::RateLimited,
            Self::Blocked => OutcomeKind::Blocked,
            Self::Rejected { .. } => OutcomeKind::Rejected,
            Self::Exhausted { .. } => OutcomeKind::Exhausted,
        }
    }

    /// Whether the executor should spend another unit of budget on this.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::TransientFailure(_) | Self::RateLimited | Self::Blocked
        )
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    pub fn into_payload(self) -> Option<Value> {
        match self {
            Self::Success(v) => Some(v),
            _ => None,
        }
    }
}

impl std::fmt::Display for RetryableOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Success(_) => write!(f, "success"),
            Self::TransientFailure(reason) => write!(f, "transient failure ({reason})"),
            Self::RateLimited => write!(f, "rate limited"),
            Self::Blocked => write!(f, "blocked"),
            Self::Rejected { status } => write!(f, "rejected with status {status}"),
            Self::Exhausted { attempts, last } => {
                write!(f, "exhausted after {attempts} attempts (last: {last})")
            }
        }
    }
}

/// Map an HTTP exchange onto the outcome taxonomy.
pub fn classify_response(resp: RawResponse) -> RetryableOutcome {
    match resp.status {
        200..=299 => match serde_json::from_str::<Value>(&resp.body) {
            Ok(v) => RetryableOutcome::Success(v),
            Err(e) => RetryableOutcome::TransientFailure(TransientReason::MalformedBody(e.to_string())),
        },
        429 => RetryableOutcome::RateLimited,
        403 => RetryableOutcome::Blocked,
        408 | 500..=599 => RetryableOutcome::TransientFailure(TransientReason::Server(resp.status)),
        status => RetryableOutcome::Rejected { status },
    }
}

/// Transport failures are always transient.
pub fn classify_transport_error(err: TransportError) -> RetryableOutcome {
    let reason = match err {
        TransportError::Timeout => TransientReason::Timeout,
        TransportError::Connect(msg) | TransportError::Other(msg) => TransientReason::Connection(msg),
    };
    RetryableOutcome::TransientFailure(reason)
}
