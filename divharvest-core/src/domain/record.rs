use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::dividend::DividendHistoryEntry;
use super::Symbol;
use crate::data::parse::parse_number;

/// Field names written into an [`EntityRecord`].
pub mod fields {
    pub const SYMBOL: &str = "symbol";
    pub const NAME: &str = "name";
    pub const DIVIDEND_YIELD: &str = "dividend_yield";
    pub const ANNUAL_DIVIDEND: &str = "annual_dividend";
    pub const PAYOUT_RATIO: &str = "payout_ratio";
    pub const EX_DIVIDEND_DATE: &str = "ex_dividend_date";
    pub const SECTOR: &str = "sector";
    pub const INDUSTRY: &str = "industry";
    pub const COUNTRY: &str = "country";
    pub const MARKET_CAP: &str = "market_cap";
    pub const PE_RATIO: &str = "pe_ratio";
    pub const EXCHANGE: &str = "exchange";
    pub const PROFILE_SOURCE: &str = "profile_source";
    pub const DIVIDEND_CAGR: &str = "dividend_cagr";
    pub const DIVIDEND_STREAK: &str = "dividend_streak";
    pub const PRICE_CAGR: &str = "price_cagr";
    pub const PRICE_YEARS: &str = "price_years";
}

/// The validated, assembled result for one entity.
///
/// Records are only constructed by [`RecordBuilder::finish`]; once built they
/// are never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityRecord {
    pub symbol: Symbol,
    fields: BTreeMap<String, Value>,
    #[serde(default)]
    dividend_history: Vec<DividendHistoryEntry>,
}

impl EntityRecord {
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    /// Numeric view of a field. Numeric strings (`"3.2%"`, `"$1.10"`) are
    /// accepted; anything else, including non-finite numbers, is `None`.
    pub fn number(&self, field: &str) -> Option<f64> {
        match self.fields.get(field)? {
            Value::Number(n) => n.as_f64().filter(|v| v.is_finite()),
            Value::String(s) => parse_number(s),
            _ => None,
        }
    }

    pub fn text(&self, field: &str) -> Option<&str> {
        match self.fields.get(field)? {
            Value::String(s) if !s.trim().is_empty() => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn fields(&self) -> &BTreeMap<String, Value> {
        &self.fields
    }

    pub fn dividend_history(&self) -> &[DividendHistoryEntry] {
        &self.dividend_history
    }
}

/// Why a builder refused to produce a record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MissingField {
    Empty(&'static str),
    NotPositive(&'static str),
}

impl std::fmt::Display for MissingField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Empty(name) => write!(f, "required field '{name}' is empty"),
            Self::NotPositive(name) => write!(f, "required field '{name}' is missing or zero"),
        }
    }
}

/// Incremental builder used while an entity's sub-fetches complete.
#[derive(Debug, Clone, Default)]
pub struct RecordBuilder {
    symbol: Symbol,
    fields: BTreeMap<String, Value>,
    dividend_history: Vec<DividendHistoryEntry>,
}

impl RecordBuilder {
    pub fn new(symbol: impl Into<String>) -> Self {
        let symbol = symbol.into();
        let mut fields = BTreeMap::new();
        fields.insert(fields::SYMBOL.to_string(), Value::String(symbol.clone()));
        Self {
            symbol,
            fields,
            dividend_history: Vec::new(),
        }
    }

    /// Set a text field; blank strings are not stored.
    pub fn text(&mut self, field: &str, value: Option<&str>) -> &mut Self {
        if let Some(v) = value.map(str::trim).filter(|v| !v.is_empty()) {
            self.fields.insert(field.to_string(), Value::String(v.to_string()));
        }
        self
    }

    /// Set a numeric field; `None` and non-finite values are not stored.
    pub fn number(&mut self, field: &str, value: Option<f64>) -> &mut Self {
        if let Some(n) = value.and_then(serde_json::Number::from_f64) {
            self.fields.insert(field.to_string(), Value::Number(n));
        }
        self
    }

    pub fn integer(&mut self, field: &str, value: Option<u32>) -> &mut Self {
        if let Some(v) = value {
            self.fields.insert(field.to_string(), Value::from(v));
        }
        self
    }

    pub fn history(&mut self, history: Vec<DividendHistoryEntry>) -> &mut Self {
        self.dividend_history = history;
        self
    }

    pub fn has(&self, field: &str) -> bool {
        self.fields.contains_key(field)
    }

    /// Validate required fields and freeze the record.
    ///
    /// Required: non-empty symbol and name, and a positive dividend yield.
    pub fn finish(self) -> Result<EntityRecord, MissingField> {
        if self.symbol.trim().is_empty() {
            return Err(MissingField::Empty(fields::SYMBOL));
        }
        let name_ok = matches!(self.fields.get(fields::NAME), Some(Value::String(s)) if !s.trim().is_empty());
        if !name_ok {
            return Err(MissingField::Empty(fields::NAME));
        }
        let yield_ok = self
            .fields
            .get(fields::DIVIDEND_YIELD)
            .and_then(Value::as_f64)
            .is_some_and(|y| y > 0.0);
        if !yield_ok {
            return Err(MissingField::NotPositive(fields::DIVIDEND_YIELD));
        }
        Ok(EntityRecord {
            symbol: self.symbol,
            fields: self.fields,
            dividend_history: self.dividend_history,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn builder() -> RecordBuilder {
        let mut b = RecordBuilder::new("KO");
        b.text(fields::NAME, Some("Coca-Cola Co"));
        b
    }

    #[test]
    fn requires_positive_yield() {
        let mut b = builder();
        b.number(fields::DIVIDEND_YIELD, Some(0.0));
        assert_eq!(
            b.finish().unwrap_err(),
            MissingField::NotPositive(fields::DIVIDEND_YIELD)
        );

        let b = builder();
        assert!(b.finish().is_err());
    }

    #[test]
    fn requires_name() {
        let mut b = RecordBuilder::new("KO");
        b.text(fields::NAME, Some("   "));
        b.number(fields::DIVIDEND_YIELD, Some(3.1));
        assert_eq!(b.finish().unwrap_err(), MissingField::Empty(fields::NAME));
    }

    #[test]
    fn numeric_view_tolerates_strings_and_rejects_garbage() {
        let mut b = builder();
        b.number(fields::DIVIDEND_YIELD, Some(3.1));
        b.text(fields::PAYOUT_RATIO, Some("65.5%"));
        b.text(fields::SECTOR, Some("Consumer Staples"));
        let r = b.finish().unwrap();
        assert_eq!(r.number(fields::DIVIDEND_YIELD), Some(3.1));
        assert_eq!(r.number(fields::PAYOUT_RATIO), Some(65.5));
        assert_eq!(r.number(fields::SECTOR), None);
        assert_eq!(r.number("no_such_field"), None);
        assert_eq!(r.text(fields::SYMBOL), Some("KO"));
    }

    #[test]
    fn nan_is_never_stored() {
        let mut b = builder();
        b.number(fields::MARKET_CAP, Some(f64::NAN));
        assert!(!b.has(fields::MARKET_CAP));
    }
}
