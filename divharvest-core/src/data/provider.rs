//! Data source trait, payload types and structured error types.
//!
//! A [`DataSource`] knows how to *shape* requests for a particular remote API
//! and how to *parse* the JSON it returns. It never performs I/O itself: the
//! request executor owns transport, retries and throttling, so the same parser
//! runs unchanged against live responses and scripted test payloads.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use super::transport::RequestSpec;
use crate::domain::{DividendPayment, Entity};

/// Structured error types for data operations.
///
/// These are designed to be displayable in both log lines and the CLI.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum DataError {
    #[error("response format changed: {0}")]
    ResponseFormatChanged(String),

    #[error("symbol not found: {symbol}")]
    SymbolNotFound { symbol: String },

    #[error("transport setup failed: {0}")]
    Transport(String),

    #[error("data error: {0}")]
    Other(String),
}

/// Primary metric payload: dividend yield and the raw payment history.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DividendSnapshot {
    /// Trailing yield in percent (3.1 means 3.1%).
    pub dividend_yield: Option<f64>,
    pub annual_dividend: Option<f64>,
    pub payout_ratio: Option<f64>,
    pub ex_dividend_date: Option<NaiveDate>,
    pub payments: Vec<DividendPayment>,
}

impl DividendSnapshot {
    /// Earliest ex-date in the payment history.
    pub fn first_payment_date(&self) -> Option<NaiveDate> {
        self.payments.iter().map(|p| p.ex_date).min()
    }
}

/// Supplementary profile payload.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompanyProfile {
    pub sector: Option<String>,
    pub industry: Option<String>,
    pub exchange: Option<String>,
    pub market_cap: Option<f64>,
    pub pe_ratio: Option<f64>,
}

/// One closing price from the growth payload.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PricePoint {
    pub date: NaiveDate,
    pub close: f64,
}

/// Supplementary growth payload: closing prices over the dividend window.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PriceHistory {
    pub closes: Vec<PricePoint>,
}

impl PriceHistory {
    /// First and last close by date.
    pub fn endpoints(&self) -> Option<(PricePoint, PricePoint)> {
        let first = self.closes.iter().min_by_key(|p| p.date)?;
        let last = self.closes.iter().max_by_key(|p| p.date)?;
        Some((*first, *last))
    }
}

/// A remote API described as request builders plus parsers.
///
/// The listing call and the primary (dividend) call are mandatory for a
/// record; the profile and growth calls are supplementary. The growth request
/// takes the primary payload as input so it can bound its date range.
pub trait DataSource: Send + Sync {
    /// Human-readable name of this source.
    fn name(&self) -> &str;

    fn listing_request(&self) -> RequestSpec;

    fn parse_listing(&self, payload: &Value) -> Result<Vec<Entity>, DataError>;

    fn dividends_request(&self, entity: &Entity) -> RequestSpec;

    /// `Ok` with an empty snapshot means the source has no dividend data for
    /// the entity; `Err` means the payload could not be understood.
    fn parse_dividends(&self, entity: &Entity, payload: &Value)
        -> Result<DividendSnapshot, DataError>;

    fn profile_request(&self, entity: &Entity) -> RequestSpec;

    fn parse_profile(&self, entity: &Entity, payload: &Value) -> Result<CompanyProfile, DataError>;

    fn growth_request(&self, entity: &Entity, dividends: &DividendSnapshot) -> RequestSpec;

    fn parse_growth(&self, entity: &Entity, payload: &Value) -> Result<PriceHistory, DataError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn first_payment_is_earliest_not_first_listed() {
        let snap = DividendSnapshot {
            payments: vec![
                DividendPayment { ex_date: d(2024, 3, 1), amount: 0.5 },
                DividendPayment { ex_date: d(2019, 3, 1), amount: 0.4 },
            ],
            ..Default::default()
        };
        assert_eq!(snap.first_payment_date(), Some(d(2019, 3, 1)));
        assert_eq!(DividendSnapshot::default().first_payment_date(), None);
    }

    #[test]
    fn price_endpoints_ignore_order() {
        let h = PriceHistory {
            closes: vec![
                PricePoint { date: d(2024, 1, 2), close: 60.0 },
                PricePoint { date: d(2020, 1, 2), close: 40.0 },
                PricePoint { date: d(2022, 1, 2), close: 50.0 },
            ],
        };
        let (first, last) = h.endpoints().unwrap();
        assert_eq!(first.close, 40.0);
        assert_eq!(last.close, 60.0);
    }
}
