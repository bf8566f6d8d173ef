//! Property tests for core invariants.
//!
//! Uses proptest to verify:
//! 1. Lenient number parsing never yields a non-finite value
//! 2. Yearly aggregation conserves positive payment totals
//! 3. Backoff waits never decrease within one logical request
//! 4. Only records with a positive yield survive validation

use std::sync::Arc;

use chrono::NaiveDate;
use divharvest_core::data::parse::parse_number;
use divharvest_core::data::{Endpoint, RequestSpec};
use divharvest_core::domain::{aggregate_by_year, fields, DividendPayment, RecordBuilder};
use divharvest_core::request::{RequestExecutor, RetryPolicy, ThrottleConfig, ThrottleController};
use divharvest_core::testing::{RecordingSleeper, Scripted, ScriptedTransport};
use proptest::prelude::*;

// ── Strategies (proptest) ────────────────────────────────────────────

fn arb_payment() -> impl Strategy<Value = DividendPayment> {
    (2000i32..2030, 1u32..13, 0.0..5.0_f64).prop_map(|(y, m, amount)| DividendPayment {
        ex_date: NaiveDate::from_ymd_opt(y, m, 1).unwrap(),
        amount: (amount * 1_000.0).round() / 1_000.0,
    })
}

fn arb_reply() -> impl Strategy<Value = Scripted> {
    prop_oneof![
        Just(Scripted::status(429)),
        Just(Scripted::status(403)),
        Just(Scripted::status(503)),
        Just(Scripted::Timeout),
        Just(Scripted::ConnectError),
    ]
}

// ── 1. Number parsing ────────────────────────────────────────────────

proptest! {
    #[test]
    fn parse_number_is_finite_or_none(s in ".{0,24}") {
        if let Some(v) = parse_number(&s) {
            prop_assert!(v.is_finite());
        }
    }

    #[test]
    fn parse_number_reads_formatted_amounts(cents in 0u64..10_000_000) {
        let v = cents as f64 / 100.0;
        let text = format!("${v:.2}");
        let parsed = parse_number(&text).unwrap();
        prop_assert!((parsed - v).abs() < 1e-6);
    }
}

// ── 2. Aggregation ───────────────────────────────────────────────────

proptest! {
    #[test]
    fn aggregation_is_sorted_and_conserves_totals(payments in prop::collection::vec(arb_payment(), 0..60)) {
        let history = aggregate_by_year(&payments);
        prop_assert!(history.windows(2).all(|w| w[0].period < w[1].period));

        let expected: f64 = payments.iter().filter(|p| p.amount > 0.0).map(|p| p.amount).sum();
        let actual: f64 = history.iter().map(|h| h.amount).sum();
        // per-year rounding to 4 dp
        prop_assert!((expected - actual).abs() < 1e-3 * (history.len().max(1) as f64));

        let counted: u32 = history.iter().map(|h| h.payments).sum();
        prop_assert_eq!(counted as usize, payments.iter().filter(|p| p.amount > 0.0).count());
    }
}

// ── 3. Backoff monotonicity ──────────────────────────────────────────

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn backoff_never_decreases(
        failures in prop::collection::vec(arb_reply(), 1..8),
        seed in any::<u64>(),
        base in 0u64..2_000,
    ) {
        let url = "http://t/x";
        let transport = Arc::new(ScriptedTransport::new());
        let attempts = failures.len() as u32 + 1;
        transport.on_sequence(url, failures, Scripted::json(serde_json::json!({})));
        let sleeper = Arc::new(RecordingSleeper::new());
        let throttle = ThrottleConfig {
            min_delay_ms: 0,
            max_delay_ms: 3_000,
            seed: Some(seed),
            ..ThrottleConfig::immediate()
        };
        let executor = RequestExecutor::new(
            transport.clone(),
            Arc::new(ThrottleController::new(throttle)),
            sleeper.clone(),
            RetryPolicy { max_attempts: attempts, base_backoff_ms: base, ..RetryPolicy::default() },
        );

        let out = executor.execute(&RequestSpec::new(Endpoint::Listing, url));
        prop_assert!(out.is_success());
        let sleeps = sleeper.sleeps();
        prop_assert_eq!(sleeps.len(), attempts as usize);
        prop_assert!(sleeps[1..].windows(2).all(|w| w[0] <= w[1]));
    }
}

// ── 4. Record validation ─────────────────────────────────────────────

proptest! {
    #[test]
    fn only_positive_yields_validate(y in -10.0..10.0_f64) {
        let mut b = RecordBuilder::new("KO");
        b.text(fields::NAME, Some("Coca-Cola")).number(fields::DIVIDEND_YIELD, Some(y));
        prop_assert_eq!(b.finish().is_ok(), y > 0.0);
    }
}
