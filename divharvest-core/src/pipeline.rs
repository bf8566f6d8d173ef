//! Per-entity collection pipeline.
//!
//! ```text
//! dividends ──Stop──▶ Skipped / Failed
//!     │
//!  Continue
//!     ├──▶ profile ─┐   (run concurrently)
//!     └──▶ growth  ─┴──▶ assemble ──▶ Recorded / Skipped
//! ```
//!
//! The dividends stage is mandatory and gates everything else. The two
//! supplementary stages never stop the pipeline: a failed fetch degrades to
//! [`Supplement::Unavailable`] and the [`FallbackPolicy`] decides what goes
//! into the record instead.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::data::provider::{CompanyProfile, DataError, DataSource, DividendSnapshot, PriceHistory};
use crate::data::transport::RequestSpec;
use crate::domain::{
    aggregate_by_year, fields, Entity, EntityRecord, EntityState, MissingField, RecordBuilder,
};
use crate::finance;
use crate::request::executor::RequestExecutor;
use crate::request::outcome::RetryableOutcome;

/// What to record when a supplementary profile fetch fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackPolicy {
    /// Use the listing's seed attributes (sector, industry).
    #[default]
    Listing,
    /// Leave the fields absent.
    Blank,
}

/// Why an entity was filtered out. Not an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// The source has no dividend data, or reports a zero yield.
    NoDividendData,
    MissingField(MissingField),
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoDividendData => write!(f, "no dividend data"),
            Self::MissingField(m) => write!(f, "{m}"),
        }
    }
}

/// Terminal result for one entity.
#[derive(Debug, Clone, PartialEq)]
pub enum EntityOutcome {
    Recorded(EntityRecord),
    Skipped { symbol: String, reason: SkipReason },
    Failed { symbol: String, reason: String },
}

impl EntityOutcome {
    pub fn symbol(&self) -> &str {
        match self {
            Self::Recorded(r) => &r.symbol,
            Self::Skipped { symbol, .. } | Self::Failed { symbol, .. } => symbol,
        }
    }

    pub fn state(&self) -> EntityState {
        match self {
            Self::Recorded(_) => EntityState::Recorded,
            Self::Skipped { .. } => EntityState::Skipped,
            Self::Failed { .. } => EntityState::Failed,
        }
    }
}

/// Result of a gating stage.
#[derive(Debug, Clone, PartialEq)]
pub enum StageFlow<T> {
    Continue(T),
    Stop(EntityOutcome),
}

/// Result of a supplementary stage.
#[derive(Debug, Clone, PartialEq)]
pub enum Supplement<T> {
    Fetched(T),
    Unavailable(String),
}

/// Runs the stage sequence for one entity at a time.
pub struct EntityPipeline<'a> {
    source: &'a dyn DataSource,
    executor: &'a RequestExecutor,
    fallback: FallbackPolicy,
    current_year: i32,
}

impl<'a> EntityPipeline<'a> {
    /// `current_year` marks the partial year excluded from dividend growth.
    pub fn new(
        source: &'a dyn DataSource,
        executor: &'a RequestExecutor,
        fallback: FallbackPolicy,
        current_year: i32,
    ) -> Self {
        Self {
            source,
            executor,
            fallback,
            current_year,
        }
    }

    pub fn collect(&self, entity: &Entity) -> EntityOutcome {
        let dividends = match self.dividends_stage(entity) {
            StageFlow::Continue(d) => d,
            StageFlow::Stop(outcome) => return outcome,
        };
        let (profile, growth) = rayon::join(
            || self.profile_stage(entity),
            || self.growth_stage(entity, &dividends),
        );
        self.assemble(entity, dividends, profile, growth)
    }

    /// Primary fetch. Stops with `Skipped` when there is no positive yield
    /// and with `Failed` when the request or the payload is unusable.
    pub fn dividends_stage(&self, entity: &Entity) -> StageFlow<DividendSnapshot> {
        let spec = self.source.dividends_request(entity);
        let payload = match self.executor.execute(&spec) {
            RetryableOutcome::Success(payload) => payload,
            other => return StageFlow::Stop(failed(entity, other.to_string())),
        };
        match self.source.parse_dividends(entity, &payload) {
            Ok(snap) if snap.dividend_yield.is_some_and(|y| y > 0.0) => StageFlow::Continue(snap),
            Ok(_) => StageFlow::Stop(EntityOutcome::Skipped {
                symbol: entity.symbol.clone(),
                reason: SkipReason::NoDividendData,
            }),
            Err(e) => StageFlow::Stop(failed(entity, e.to_string())),
        }
    }

    pub fn profile_stage(&self, entity: &Entity) -> Supplement<CompanyProfile> {
        let spec = self.source.profile_request(entity);
        self.supplement(&spec, |payload| self.source.parse_profile(entity, payload))
    }

    pub fn growth_stage(&self, entity: &Entity, dividends: &DividendSnapshot) -> Supplement<PriceHistory> {
        let spec = self.source.growth_request(entity, dividends);
        self.supplement(&spec, |payload| self.source.parse_growth(entity, payload))
    }

    fn supplement<T>(
        &self,
        spec: &RequestSpec,
        parse: impl FnOnce(&Value) -> Result<T, DataError>,
    ) -> Supplement<T> {
        let reason = match self.executor.execute(spec) {
            RetryableOutcome::Success(payload) => match parse(&payload) {
                Ok(v) => return Supplement::Fetched(v),
                Err(e) => e.to_string(),
            },
            other => other.to_string(),
        };
        log::info!("{}: unavailable ({reason})", spec.label());
        Supplement::Unavailable(reason)
    }

    /// Merge stage outputs into a validated record.
    pub fn assemble(
        &self,
        entity: &Entity,
        dividends: DividendSnapshot,
        profile: Supplement<CompanyProfile>,
        growth: Supplement<PriceHistory>,
    ) -> EntityOutcome {
        let mut b = RecordBuilder::new(&entity.symbol);
        b.text(fields::NAME, Some(&entity.name))
            .text(fields::COUNTRY, entity.country.as_deref())
            .number(fields::DIVIDEND_YIELD, dividends.dividend_yield)
            .number(fields::ANNUAL_DIVIDEND, dividends.annual_dividend)
            .number(fields::PAYOUT_RATIO, dividends.payout_ratio);
        if let Some(d) = dividends.ex_dividend_date {
            b.text(fields::EX_DIVIDEND_DATE, Some(&d.format("%Y-%m-%d").to_string()));
        }

        let listing = self.fallback == FallbackPolicy::Listing;
        match profile {
            Supplement::Fetched(p) => {
                let sector = p.sector.or_else(|| listing.then(|| entity.sector.clone()).flatten());
                let industry = p
                    .industry
                    .or_else(|| listing.then(|| entity.industry.clone()).flatten());
                b.text(fields::SECTOR, sector.as_deref())
                    .text(fields::INDUSTRY, industry.as_deref())
                    .text(fields::EXCHANGE, p.exchange.as_deref())
                    .number(fields::MARKET_CAP, p.market_cap)
                    .number(fields::PE_RATIO, p.pe_ratio)
                    .text(fields::PROFILE_SOURCE, Some("profile"));
            }
            Supplement::Unavailable(_) if listing => {
                b.text(fields::SECTOR, entity.sector.as_deref())
                    .text(fields::INDUSTRY, entity.industry.as_deref())
                    .text(fields::PROFILE_SOURCE, Some("listing"));
            }
            Supplement::Unavailable(_) => {
                b.text(fields::PROFILE_SOURCE, Some("none"));
            }
        }

        let history = aggregate_by_year(&dividends.payments);
        b.number(fields::DIVIDEND_CAGR, finance::dividend_cagr(&history, self.current_year))
            .integer(
                fields::DIVIDEND_STREAK,
                Some(finance::dividend_streak(&history, self.current_year)),
            )
            .history(history);

        if let Supplement::Fetched(prices) = growth {
            if let Some((rate, years)) = finance::price_cagr(&prices) {
                b.number(fields::PRICE_CAGR, Some(rate))
                    .number(fields::PRICE_YEARS, Some(years));
            }
        }

        match b.finish() {
            Ok(record) => EntityOutcome::Recorded(record),
            Err(missing) => EntityOutcome::Skipped {
                symbol: entity.symbol.clone(),
                reason: SkipReason::MissingField(missing),
            },
        }
    }
}

fn failed(entity: &Entity, reason: String) -> EntityOutcome {
    log::warn!("{}: failed ({reason})", entity.symbol);
    EntityOutcome::Failed {
        symbol: entity.symbol.clone(),
        reason,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::NasdaqSource;
    use crate::request::{RetryPolicy, ThrottleConfig, ThrottleController};
    use crate::testing::{RecordingSleeper, Scripted, ScriptedTransport};
    use chrono::NaiveDate;
    use serde_json::json;
    use std::sync::Arc;

    const DIVIDENDS: &str = "http://t/api/quote/KO/dividends?assetclass=stocks";
    const SUMMARY: &str = "http://t/api/quote/KO/summary?assetclass=stocks";
    const HISTORICAL: &str = "http://t/api/quote/KO/historical?assetclass=stocks&fromdate=2021-03-01&todate=2025-06-30&limit=9999";

    struct Fixture {
        transport: Arc<ScriptedTransport>,
        source: NasdaqSource,
        executor: RequestExecutor,
    }

    fn fixture() -> Fixture {
        let transport = Arc::new(ScriptedTransport::new());
        let executor = RequestExecutor::new(
            transport.clone(),
            Arc::new(ThrottleController::new(ThrottleConfig::immediate())),
            Arc::new(RecordingSleeper::new()),
            RetryPolicy {
                max_attempts: 2,
                base_backoff_ms: 0,
                ..RetryPolicy::default()
            },
        );
        Fixture {
            transport,
            source: NasdaqSource::new("http://t", NaiveDate::from_ymd_opt(2025, 6, 30).unwrap()),
            executor,
        }
    }

    fn ko() -> Entity {
        Entity::new("KO", "Coca-Cola")
            .with_sector("Consumer Staples")
            .with_industry("Beverages")
    }

    fn dividends(yield_text: &str) -> Scripted {
        Scripted::json(json!({"data": {
            "yield": yield_text,
            "annualizedDividend": "2.04",
            "exDividendDate": "03/14/2025",
            "dividends": {"rows": [
                {"exOrEffDate": "03/01/2021", "amount": "1.00"},
                {"exOrEffDate": "03/01/2022", "amount": "1.10"},
                {"exOrEffDate": "03/01/2023", "amount": "1.21"},
                {"exOrEffDate": "03/01/2025", "amount": "0.50"}
            ]}
        }}))
    }

    fn summary() -> Scripted {
        Scripted::json(json!({"data": {"summaryData": {
            "Sector": {"value": "Staples"},
            "Exchange": {"value": "NYSE"}
        }}}))
    }

    fn pipeline(f: &Fixture, fallback: FallbackPolicy) -> EntityPipeline<'_> {
        EntityPipeline::new(&f.source, &f.executor, fallback, 2025)
    }

    #[test]
    fn full_record_merges_all_stages() {
        let f = fixture();
        f.transport.on(DIVIDENDS, dividends("3.10%"));
        f.transport.on(SUMMARY, summary());
        f.transport.on(
            HISTORICAL,
            Scripted::json(json!({"data": {"tradesTable": {"rows": [
                {"date": "06/30/2025", "close": "$121.00"},
                {"date": "06/30/2023", "close": "$100.00"}
            ]}}})),
        );

        let EntityOutcome::Recorded(rec) = pipeline(&f, FallbackPolicy::Listing).collect(&ko()) else {
            panic!("expected a record");
        };
        assert_eq!(rec.number(fields::DIVIDEND_YIELD), Some(3.10));
        assert_eq!(rec.text(fields::SECTOR), Some("Staples"));
        // Profile had no industry; the listing fills it in.
        assert_eq!(rec.text(fields::INDUSTRY), Some("Beverages"));
        assert_eq!(rec.text(fields::PROFILE_SOURCE), Some("profile"));
        assert_eq!(rec.text(fields::EX_DIVIDEND_DATE), Some("2025-03-14"));
        assert_eq!(rec.number(fields::DIVIDEND_STREAK), Some(2.0));
        assert!((rec.number(fields::DIVIDEND_CAGR).unwrap() - 10.0).abs() < 1e-6);
        assert!((rec.number(fields::PRICE_CAGR).unwrap() - 10.0).abs() < 0.1);
        assert_eq!(rec.dividend_history().len(), 4);
    }

    #[test]
    fn zero_yield_is_skipped() {
        let f = fixture();
        f.transport.on(DIVIDENDS, dividends("0.00%"));
        let out = pipeline(&f, FallbackPolicy::Listing).collect(&ko());
        assert_eq!(
            out,
            EntityOutcome::Skipped {
                symbol: "KO".into(),
                reason: SkipReason::NoDividendData
            }
        );
        assert_eq!(f.transport.calls_to(SUMMARY), 0);
    }

    #[test]
    fn missing_dividend_data_is_skipped() {
        let f = fixture();
        f.transport.on(DIVIDENDS, Scripted::json(json!({"data": null})));
        let out = pipeline(&f, FallbackPolicy::Listing).collect(&ko());
        assert_eq!(out.state(), EntityState::Skipped);
    }

    #[test]
    fn exhausted_primary_fails_entity() {
        let f = fixture();
        f.transport.on(DIVIDENDS, Scripted::status(503));
        let out = pipeline(&f, FallbackPolicy::Listing).collect(&ko());
        assert_eq!(out.state(), EntityState::Failed);
        assert_eq!(f.transport.calls_to(DIVIDENDS), 2);
    }

    #[test]
    fn profile_failure_falls_back_to_listing() {
        let f = fixture();
        f.transport.on(DIVIDENDS, dividends("2.5"));
        let EntityOutcome::Recorded(rec) = pipeline(&f, FallbackPolicy::Listing).collect(&ko()) else {
            panic!("expected a record");
        };
        assert_eq!(rec.text(fields::SECTOR), Some("Consumer Staples"));
        assert_eq!(rec.text(fields::PROFILE_SOURCE), Some("listing"));
        assert_eq!(rec.number(fields::PRICE_CAGR), None);
    }

    #[test]
    fn profile_failure_with_blank_policy_leaves_fields_absent() {
        let f = fixture();
        f.transport.on(DIVIDENDS, dividends("2.5"));
        let EntityOutcome::Recorded(rec) = pipeline(&f, FallbackPolicy::Blank).collect(&ko()) else {
            panic!("expected a record");
        };
        assert_eq!(rec.text(fields::SECTOR), None);
        assert_eq!(rec.text(fields::INDUSTRY), None);
        assert_eq!(rec.text(fields::PROFILE_SOURCE), Some("none"));
    }

    #[test]
    fn fallback_policy_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&FallbackPolicy::Blank).unwrap(), "\"blank\"");
        let p: FallbackPolicy = serde_json::from_str("\"listing\"").unwrap();
        assert_eq!(p, FallbackPolicy::Listing);
    }
}
