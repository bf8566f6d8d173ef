//! Nasdaq-style quote API data source.
//!
//! Endpoints (relative to `base_url`):
//! - `/api/screener/stocks`: the full equity listing
//! - `/api/quote/{SYM}/dividends`: yield, annualized dividend, payment history
//! - `/api/quote/{SYM}/summary`: sector, industry, market cap, P/E
//! - `/api/quote/{SYM}/historical`: daily closes since the first dividend
//!
//! The API has no published contract. Every value arrives as a display
//! string and fields come and go, so parsing is lenient field-by-field and
//! only structural surprises are reported as [`DataError::ResponseFormatChanged`].

use chrono::{Months, NaiveDate};
use serde_json::Value;

use super::parse::{parse_date, value_number, value_text};
use super::provider::{
    CompanyProfile, DataError, DataSource, DividendSnapshot, PriceHistory, PricePoint,
};
use super::transport::{Endpoint, RequestSpec};
use crate::domain::{DividendPayment, Entity};

pub const DEFAULT_BASE_URL: &str = "https://api.nasdaq.com";

/// Nasdaq data source.
#[derive(Debug, Clone)]
pub struct NasdaqSource {
    base_url: String,
    as_of: NaiveDate,
    default_lookback_years: u32,
}

impl NasdaqSource {
    pub fn new(base_url: impl Into<String>, as_of: NaiveDate) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            as_of,
            default_lookback_years: 10,
        }
    }

    /// Lookback used for the growth window when an entity has no payments.
    pub fn with_default_lookback(mut self, years: u32) -> Self {
        self.default_lookback_years = years.max(1);
        self
    }

    pub fn as_of(&self) -> NaiveDate {
        self.as_of
    }

    /// Share classes are listed as `BRK/B`; the quote API expects `BRK.B`.
    fn url_symbol(symbol: &str) -> String {
        symbol.trim().replace('/', ".")
    }

    fn quote_url(&self, symbol: &str, tail: &str) -> String {
        format!(
            "{}/api/quote/{}/{tail}",
            self.base_url,
            Self::url_symbol(symbol)
        )
    }

    /// The `data` object, or `None` when the API answered with `data: null`.
    fn data<'a>(payload: &'a Value) -> Result<Option<&'a Value>, DataError> {
        match payload.get("data") {
            Some(Value::Null) => Ok(None),
            Some(d @ Value::Object(_)) => Ok(Some(d)),
            Some(other) => Err(DataError::ResponseFormatChanged(format!(
                "`data` is not an object: {}",
                type_name(other)
            ))),
            None => Err(DataError::ResponseFormatChanged("missing `data` field".into())),
        }
    }

    /// Error message from `status.bCodeMessage`, if the API supplied one.
    fn status_message(payload: &Value) -> Option<String> {
        payload
            .pointer("/status/bCodeMessage")
            .and_then(Value::as_array)
            .and_then(|msgs| msgs.first())
            .and_then(|m| m.get("errorMessage"))
            .and_then(value_text)
    }
}

fn type_name(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn field_text(obj: &Value, key: &str) -> Option<String> {
    obj.get(key).and_then(value_text)
}

fn field_number(obj: &Value, key: &str) -> Option<f64> {
    obj.get(key).and_then(value_number)
}

/// `summaryData` entries are `{ "label": ..., "value": ... }` pairs.
fn summary_value<'a>(summary: &'a Value, key: &str) -> Option<&'a Value> {
    summary.get(key).and_then(|entry| entry.get("value"))
}

impl DataSource for NasdaqSource {
    fn name(&self) -> &str {
        "nasdaq"
    }

    fn listing_request(&self) -> RequestSpec {
        RequestSpec::new(
            Endpoint::Listing,
            format!(
                "{}/api/screener/stocks?tableonly=true&download=true",
                self.base_url
            ),
        )
    }

    fn parse_listing(&self, payload: &Value) -> Result<Vec<Entity>, DataError> {
        let data = Self::data(payload)?.ok_or_else(|| {
            DataError::ResponseFormatChanged(
                Self::status_message(payload).unwrap_or_else(|| "listing returned no data".into()),
            )
        })?;
        // The download variant puts rows at `data.rows`, the paged variant at `data.table.rows`.
        let rows = data
            .get("rows")
            .or_else(|| data.pointer("/table/rows"))
            .and_then(Value::as_array)
            .ok_or_else(|| DataError::ResponseFormatChanged("listing has no rows".into()))?;

        let mut entities = Vec::with_capacity(rows.len());
        for row in rows {
            let Some(symbol) = field_text(row, "symbol") else {
                continue;
            };
            // Preferred shares and units (`ABR^D`, `XYZ~`) have no quote pages.
            if symbol.contains('^') || symbol.contains('~') {
                continue;
            }
            entities.push(Entity {
                name: field_text(row, "name").unwrap_or_else(|| symbol.clone()),
                sector: field_text(row, "sector"),
                industry: field_text(row, "industry"),
                country: field_text(row, "country"),
                symbol,
            });
        }
        Ok(entities)
    }

    fn dividends_request(&self, entity: &Entity) -> RequestSpec {
        RequestSpec::new(
            Endpoint::Dividends,
            self.quote_url(&entity.symbol, "dividends?assetclass=stocks"),
        )
        .for_symbol(&entity.symbol)
    }

    fn parse_dividends(
        &self,
        entity: &Entity,
        payload: &Value,
    ) -> Result<DividendSnapshot, DataError> {
        let Some(data) = Self::data(payload)? else {
            log::debug!("{}: no dividend data", entity.symbol);
            return Ok(DividendSnapshot::default());
        };

        let mut payments = Vec::new();
        if let Some(rows) = data.pointer("/dividends/rows") {
            let rows = rows.as_array().ok_or_else(|| {
                DataError::ResponseFormatChanged(format!(
                    "{}: dividends.rows is {}",
                    entity.symbol,
                    type_name(rows)
                ))
            })?;
            for row in rows {
                let date = row
                    .get("exOrEffDate")
                    .and_then(Value::as_str)
                    .and_then(parse_date);
                let amount = field_number(row, "amount");
                if let (Some(ex_date), Some(amount)) = (date, amount) {
                    payments.push(DividendPayment { ex_date, amount });
                }
            }
        }

        Ok(DividendSnapshot {
            dividend_yield: field_number(data, "yield"),
            annual_dividend: field_number(data, "annualizedDividend"),
            payout_ratio: field_number(data, "payoutRatio"),
            ex_dividend_date: data
                .get("exDividendDate")
                .and_then(Value::as_str)
                .and_then(parse_date),
            payments,
        })
    }

    fn profile_request(&self, entity: &Entity) -> RequestSpec {
        RequestSpec::new(
            Endpoint::Profile,
            self.quote_url(&entity.symbol, "summary?assetclass=stocks"),
        )
        .for_symbol(&entity.symbol)
    }

    fn parse_profile(&self, entity: &Entity, payload: &Value) -> Result<CompanyProfile, DataError> {
        let data = Self::data(payload)?.ok_or_else(|| DataError::SymbolNotFound {
            symbol: entity.symbol.clone(),
        })?;
        let summary = data.get("summaryData").ok_or_else(|| {
            DataError::ResponseFormatChanged(format!("{}: no summaryData", entity.symbol))
        })?;
        Ok(CompanyProfile {
            sector: summary_value(summary, "Sector").and_then(value_text),
            industry: summary_value(summary, "Industry").and_then(value_text),
            exchange: summary_value(summary, "Exchange").and_then(value_text),
            market_cap: summary_value(summary, "MarketCap").and_then(value_number),
            pe_ratio: summary_value(summary, "PERatio").and_then(value_number),
        })
    }

    fn growth_request(&self, entity: &Entity, dividends: &DividendSnapshot) -> RequestSpec {
        let from = dividends.first_payment_date().unwrap_or_else(|| {
            self.as_of
                .checked_sub_months(Months::new(12 * self.default_lookback_years))
                .unwrap_or(self.as_of)
        });
        RequestSpec::new(
            Endpoint::Growth,
            self.quote_url(
                &entity.symbol,
                &format!(
                    "historical?assetclass=stocks&fromdate={}&todate={}&limit=9999",
                    from.format("%Y-%m-%d"),
                    self.as_of.format("%Y-%m-%d")
                ),
            ),
        )
        .for_symbol(&entity.symbol)
    }

    fn parse_growth(&self, entity: &Entity, payload: &Value) -> Result<PriceHistory, DataError> {
        let data = Self::data(payload)?.ok_or_else(|| DataError::SymbolNotFound {
            symbol: entity.symbol.clone(),
        })?;
        let rows = data
            .pointer("/tradesTable/rows")
            .and_then(Value::as_array)
            .ok_or_else(|| {
                DataError::ResponseFormatChanged(format!("{}: no tradesTable rows", entity.symbol))
            })?;
        let closes = rows
            .iter()
            .filter_map(|row| {
                let date = row.get("date").and_then(Value::as_str).and_then(parse_date)?;
                let close = field_number(row, "close").filter(|c| *c > 0.0)?;
                Some(PricePoint { date, close })
            })
            .collect();
        Ok(PriceHistory { closes })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn source() -> NasdaqSource {
        NasdaqSource::new("http://test/", NaiveDate::from_ymd_opt(2025, 6, 30).unwrap())
    }

    fn ko() -> Entity {
        Entity::new("KO", "Coca-Cola")
    }

    #[test]
    fn listing_reads_both_row_layouts_and_drops_preferreds() {
        let src = source();
        let flat = json!({"data": {"rows": [
            {"symbol": "KO", "name": "Coca-Cola", "sector": "Consumer Staples", "industry": "Beverages", "country": "United States"},
            {"symbol": "ABR^D", "name": "Arbor pref"},
            {"symbol": " ", "name": "blank"}
        ]}});
        let entities = src.parse_listing(&flat).unwrap();
        assert_eq!(entities.len(), 1);
        assert_eq!(entities[0].sector.as_deref(), Some("Consumer Staples"));

        let paged = json!({"data": {"table": {"rows": [{"symbol": "PEP", "name": "PepsiCo"}]}}});
        assert_eq!(src.parse_listing(&paged).unwrap()[0].symbol, "PEP");
    }

    #[test]
    fn listing_with_null_data_is_an_error() {
        let payload = json!({"data": null, "status": {"bCodeMessage": [{"code": 1, "errorMessage": "maintenance"}]}});
        let err = source().parse_listing(&payload).unwrap_err();
        assert_eq!(err, DataError::ResponseFormatChanged("maintenance".into()));
    }

    #[test]
    fn dividends_parse_display_strings() {
        let payload = json!({"data": {
            "exDividendDate": "03/14/2025",
            "yield": "2.91%",
            "annualizedDividend": "2.04",
            "payoutRatio": "81.6",
            "dividends": {"rows": [
                {"exOrEffDate": "03/14/2025", "amount": "$0.51"},
                {"exOrEffDate": "11/29/2024", "amount": "$0.485"},
                {"exOrEffDate": "N/A", "amount": "$0.485"}
            ]}
        }});
        let snap = source().parse_dividends(&ko(), &payload).unwrap();
        assert_eq!(snap.dividend_yield, Some(2.91));
        assert_eq!(snap.annual_dividend, Some(2.04));
        assert_eq!(snap.payments.len(), 2);
        assert_eq!(snap.ex_dividend_date, NaiveDate::from_ymd_opt(2025, 3, 14));
    }

    #[test]
    fn null_dividend_data_is_empty_not_error() {
        let snap = source().parse_dividends(&ko(), &json!({"data": null})).unwrap();
        assert_eq!(snap, DividendSnapshot::default());
    }

    #[test]
    fn dividends_with_wrong_shape_is_format_change() {
        let payload = json!({"data": {"dividends": {"rows": "nope"}}});
        assert!(matches!(
            source().parse_dividends(&ko(), &payload),
            Err(DataError::ResponseFormatChanged(_))
        ));
    }

    #[test]
    fn profile_reads_summary_pairs() {
        let payload = json!({"data": {"summaryData": {
            "Sector": {"label": "Sector", "value": "Consumer Staples"},
            "Industry": {"label": "Industry", "value": "Beverages"},
            "MarketCap": {"label": "Market Cap", "value": "301,234,000,000"},
            "PERatio": {"label": "P/E Ratio", "value": 28.1}
        }}});
        let p = source().parse_profile(&ko(), &payload).unwrap();
        assert_eq!(p.sector.as_deref(), Some("Consumer Staples"));
        assert_eq!(p.market_cap, Some(301_234_000_000.0));
        assert_eq!(p.pe_ratio, Some(28.1));
        assert_eq!(p.exchange, None);
    }

    #[test]
    fn growth_window_starts_at_first_dividend() {
        let src = source();
        let snap = DividendSnapshot {
            payments: vec![DividendPayment {
                ex_date: NaiveDate::from_ymd_opt(2016, 3, 1).unwrap(),
                amount: 0.35,
            }],
            ..Default::default()
        };
        let spec = src.growth_request(&ko(), &snap);
        assert!(spec.url.contains("fromdate=2016-03-01&todate=2025-06-30"), "{}", spec.url);

        let spec = src.growth_request(&ko(), &DividendSnapshot::default());
        assert!(spec.url.contains("fromdate=2015-06-30"), "{}", spec.url);
    }

    #[test]
    fn urls_are_normalized() {
        let src = source();
        let spec = src.dividends_request(&Entity::new("BRK/B", "Berkshire"));
        assert_eq!(spec.url, "http://test/api/quote/BRK.B/dividends?assetclass=stocks");
        assert_eq!(spec.symbol.as_deref(), Some("BRK/B"));
    }

    #[test]
    fn growth_skips_unparseable_rows() {
        let payload = json!({"data": {"tradesTable": {"rows": [
            {"date": "06/27/2025", "close": "$70.10"},
            {"date": "bad", "close": "$1"},
            {"date": "06/26/2025", "close": "N/A"}
        ]}}});
        let h = source().parse_growth(&ko(), &payload).unwrap();
        assert_eq!(h.closes.len(), 1);
        assert_eq!(h.closes[0].close, 70.10);
    }
}
