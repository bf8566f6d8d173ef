//! Test doubles: a URL-scripted transport, a sleeper that records instead
//! of blocking, and a hand-advanced clock. Used by this crate's tests and by downstream crates'
//! integration tests.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde_json::Value;

use crate::data::transport::{RawResponse, RequestSpec, Transport, TransportError};
use crate::request::identity::RequestShape;
use crate::request::sleeper::{Clock, Sleeper};

/// One scripted reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scripted {
    Respond { status: u16, body: String },
    Timeout,
    ConnectError,
}

impl Scripted {
    pub fn json(value: Value) -> Self {
        Self::Respond {
            status: 200,
            body: value.to_string(),
        }
    }

    pub fn status(status: u16) -> Self {
        Self::Respond {
            status,
            body: String::new(),
        }
    }

    fn reply(&self) -> Result<RawResponse, TransportError> {
        match self {
            Self::Respond { status, body } => Ok(RawResponse {
                status: *status,
                body: body.clone(),
            }),
            Self::Timeout => Err(TransportError::Timeout),
            Self::ConnectError => Err(TransportError::Connect("connection refused".into())),
        }
    }
}

#[derive(Debug)]
struct Route {
    queue: VecDeque<Scripted>,
    then: Scripted,
}

/// A recorded attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    pub url: String,
    pub shape: String,
    pub timeout: Duration,
}

/// Transport that answers by exact URL. Unknown URLs get a 404.
#[derive(Debug, Default)]
pub struct ScriptedTransport {
    routes: Mutex<HashMap<String, Route>>,
    calls: Mutex<Vec<Call>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Always answer `url` with `reply`.
    pub fn on(&self, url: impl Into<String>, reply: Scripted) -> &Self {
        self.on_sequence(url, Vec::new(), reply)
    }

    /// Answer `url` with each of `first` in turn, then `then` forever.
    pub fn on_sequence(&self, url: impl Into<String>, first: Vec<Scripted>, then: Scripted) -> &Self {
        self.routes.lock().insert(
            url.into(),
            Route {
                queue: first.into(),
                then,
            },
        );
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }

    pub fn calls_to(&self, url: &str) -> usize {
        self.calls.lock().iter().filter(|c| c.url == url).count()
    }
}

impl Transport for ScriptedTransport {
    fn send(
        &self,
        spec: &RequestSpec,
        shape: &RequestShape,
        timeout: Duration,
    ) -> Result<RawResponse, TransportError> {
        self.calls.lock().push(Call {
            url: spec.url.clone(),
            shape: shape.name().to_string(),
            timeout,
        });
        let mut routes = self.routes.lock();
        match routes.get_mut(&spec.url) {
            Some(route) => match route.queue.pop_front() {
                Some(next) => next.reply(),
                None => route.then.reply(),
            },
            None => Scripted::status(404).reply(),
        }
    }
}

/// Records every requested sleep and returns immediately. With a
/// [`ManualClock`] attached, each sleep also advances that clock.
#[derive(Debug, Default)]
pub struct RecordingSleeper {
    sleeps: Mutex<Vec<Duration>>,
    clock: Option<Arc<ManualClock>>,
}

impl RecordingSleeper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_clock(clock: Arc<ManualClock>) -> Self {
        Self {
            sleeps: Mutex::new(Vec::new()),
            clock: Some(clock),
        }
    }

    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps.lock().clone()
    }

    pub fn total(&self) -> Duration {
        self.sleeps.lock().iter().sum()
    }
}

impl Sleeper for RecordingSleeper {
    fn sleep(&self, duration: Duration) {
        self.sleeps.lock().push(duration);
        if let Some(clock) = &self.clock {
            clock.advance(duration);
        }
    }
}

/// Simulated time that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    origin: Instant,
    elapsed: Mutex<Duration>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            elapsed: Mutex::new(Duration::ZERO),
        }
    }

    pub fn advance(&self, by: Duration) {
        *self.elapsed.lock() += by;
    }

    pub fn elapsed(&self) -> Duration {
        *self.elapsed.lock()
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.origin + self.elapsed()
    }
}
