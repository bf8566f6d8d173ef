//! The outbound HTTP seam.
//!
//! The executor never talks to `reqwest` directly; it goes through the
//! [`Transport`] trait so retry and throttle behaviour can be driven by a
//! scripted transport in tests.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::provider::DataError;
use crate::request::identity::RequestShape;

/// Which logical endpoint a request targets. Used for logging and stats only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Endpoint {
    Listing,
    Dividends,
    Profile,
    Growth,
}

impl Endpoint {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Listing => "listing",
            Self::Dividends => "dividends",
            Self::Profile => "profile",
            Self::Growth => "growth",
        }
    }
}

/// Descriptor for one logical request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestSpec {
    pub endpoint: Endpoint,
    pub url: String,
    /// Entity the request belongs to (`None` for the listing call).
    pub symbol: Option<String>,
}

impl RequestSpec {
    pub fn new(endpoint: Endpoint, url: impl Into<String>) -> Self {
        Self {
            endpoint,
            url: url.into(),
            symbol: None,
        }
    }

    pub fn for_symbol(mut self, symbol: impl Into<String>) -> Self {
        self.symbol = Some(symbol.into());
        self
    }

    /// Short label such as `dividends:KO`.
    pub fn label(&self) -> String {
        match &self.symbol {
            Some(s) => format!("{}:{s}", self.endpoint.as_str()),
            None => self.endpoint.as_str().to_string(),
        }
    }
}

/// Status and body of a completed HTTP exchange, whatever the status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawResponse {
    pub status: u16,
    pub body: String,
}

/// Failure below the HTTP layer; every variant is treated as transient.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("request timed out")]
    Timeout,
    #[error("connection failed: {0}")]
    Connect(String),
    #[error("transport error: {0}")]
    Other(String),
}

/// Performs a single attempt. Implementations enforce `timeout`.
pub trait Transport: Send + Sync {
    fn send(
        &self,
        spec: &RequestSpec,
        shape: &RequestShape,
        timeout: Duration,
    ) -> Result<RawResponse, TransportError>;
}

/// Blocking `reqwest` transport.
pub struct HttpTransport {
    client: reqwest::blocking::Client,
}

impl HttpTransport {
    pub fn new() -> Result<Self, DataError> {
        let client = reqwest::blocking::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| DataError::Transport(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client })
    }
}

impl Transport for HttpTransport {
    fn send(
        &self,
        spec: &RequestSpec,
        shape: &RequestShape,
        timeout: Duration,
    ) -> Result<RawResponse, TransportError> {
        let mut req = self.client.get(&spec.url).timeout(timeout);
        for (name, value) in shape.headers() {
            req = req.header(name.as_str(), value.as_str());
        }
        let resp = req.send().map_err(map_reqwest_error)?;
        let status = resp.status().as_u16();
        let body = resp.text().map_err(map_reqwest_error)?;
        Ok(RawResponse { status, body })
    }
}

fn map_reqwest_error(e: reqwest::Error) -> TransportError {
    if e.is_timeout() {
        TransportError::Timeout
    } else if e.is_connect() {
        TransportError::Connect(e.to_string())
    } else {
        TransportError::Other(e.to_string())
    }
}
