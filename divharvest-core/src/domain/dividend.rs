use std::collections::BTreeMap;

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

/// A single dividend payment as reported by the data source.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DividendPayment {
    pub ex_date: NaiveDate,
    pub amount: f64,
}

/// Aggregate dividend amount for one calendar year.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DividendHistoryEntry {
    pub period: i32,
    pub amount: f64,
    pub payments: u32,
}

/// Fold payments into per-year entries.
///
/// The result is sorted ascending by period with one entry per year.
/// Non-finite and non-positive amounts are ignored.
pub fn aggregate_by_year(payments: &[DividendPayment]) -> Vec<DividendHistoryEntry> {
    let mut by_year: BTreeMap<i32, (f64, u32)> = BTreeMap::new();
    for p in payments {
        if !p.amount.is_finite() || p.amount <= 0.0 {
            continue;
        }
        let slot = by_year.entry(p.ex_date.year()).or_insert((0.0, 0));
        slot.0 += p.amount;
        slot.1 += 1;
    }
    by_year
        .into_iter()
        .map(|(period, (amount, payments))| DividendHistoryEntry {
            period,
            amount: round_cents(amount),
            payments,
        })
        .collect()
}

/// Round to 4 decimal places; payments are quoted in fractions of a cent.
fn round_cents(v: f64) -> f64 {
    (v * 10_000.0).round() / 10_000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pay(y: i32, m: u32, amount: f64) -> DividendPayment {
        DividendPayment {
            ex_date: NaiveDate::from_ymd_opt(y, m, 15).unwrap(),
            amount,
        }
    }

    #[test]
    fn groups_and_sorts_by_year() {
        let payments = vec![
            pay(2023, 3, 0.46),
            pay(2021, 6, 0.42),
            pay(2023, 9, 0.46),
            pay(2022, 1, 0.44),
            pay(2021, 12, 0.42),
        ];
        let history = aggregate_by_year(&payments);
        let periods: Vec<i32> = history.iter().map(|h| h.period).collect();
        assert_eq!(periods, vec![2021, 2022, 2023]);
        assert_eq!(history[0].amount, 0.84);
        assert_eq!(history[0].payments, 2);
        assert_eq!(history[2].amount, 0.92);
    }

    #[test]
    fn ignores_bad_amounts() {
        let payments = vec![pay(2020, 1, f64::NAN), pay(2020, 2, 0.0), pay(2020, 3, -1.0)];
        assert!(aggregate_by_year(&payments).is_empty());
    }
}
