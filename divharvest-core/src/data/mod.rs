//! Data source seam: request shaping, response parsing, transport.

pub mod nasdaq;
pub mod parse;
pub mod provider;
pub mod transport;

pub use nasdaq::NasdaqSource;
pub use provider::{
    CompanyProfile, DataError, DataSource, DividendSnapshot, PriceHistory, PricePoint,
};
pub use transport::{
    Endpoint, HttpTransport, RawResponse, RequestSpec, Transport, TransportError,
};
