//! Compound-growth helpers over already-fetched payloads.
//!
//! Growth rates are returned in percent (4.0 means 4% per year).

use crate::data::provider::PriceHistory;
use crate::domain::DividendHistoryEntry;

/// Compound annual growth rate from `start` to `end` over `years`.
pub fn cagr(start: f64, end: f64, years: f64) -> Option<f64> {
    if !(start > 0.0 && end > 0.0 && years > 0.0) || !start.is_finite() || !end.is_finite() {
        return None;
    }
    let rate = ((end / start).powf(1.0 / years) - 1.0) * 100.0;
    rate.is_finite().then_some(rate)
}

/// Entries for calendar years strictly before `current_year`. The current
/// year is usually partial and would understate growth.
fn complete_years(history: &[DividendHistoryEntry], current_year: i32) -> &[DividendHistoryEntry] {
    let end = history.partition_point(|h| h.period < current_year);
    &history[..end]
}

/// Dividend CAGR between the first and last complete years.
pub fn dividend_cagr(history: &[DividendHistoryEntry], current_year: i32) -> Option<f64> {
    let complete = complete_years(history, current_year);
    let (first, last) = (complete.first()?, complete.last()?);
    cagr(first.amount, last.amount, (last.period - first.period) as f64)
}

/// Consecutive year-over-year increases ending at the last complete year.
/// A missing year ends the streak.
pub fn dividend_streak(history: &[DividendHistoryEntry], current_year: i32) -> u32 {
    let complete = complete_years(history, current_year);
    complete
        .windows(2)
        .rev()
        .take_while(|w| w[1].period == w[0].period + 1 && w[1].amount > w[0].amount)
        .count() as u32
}

/// Price CAGR between the first and last close, with the span in years.
pub fn price_cagr(history: &PriceHistory) -> Option<(f64, f64)> {
    let (first, last) = history.endpoints()?;
    let years = (last.date - first.date).num_days() as f64 / 365.25;
    let rate = cagr(first.close, last.close, years)?;
    Some((rate, (years * 100.0).round() / 100.0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::provider::PricePoint;
    use chrono::NaiveDate;

    fn entry(period: i32, amount: f64) -> DividendHistoryEntry {
        DividendHistoryEntry {
            period,
            amount,
            payments: 4,
        }
    }

    #[test]
    fn cagr_doubling_over_one_year() {
        assert!((cagr(10.0, 20.0, 1.0).unwrap() - 100.0).abs() < 1e-9);
    }

    #[test]
    fn cagr_rejects_degenerate_inputs() {
        assert_eq!(cagr(0.0, 1.0, 1.0), None);
        assert_eq!(cagr(1.0, 2.0, 0.0), None);
        assert_eq!(cagr(f64::NAN, 2.0, 1.0), None);
    }

    #[test]
    fn dividend_cagr_ignores_current_year() {
        let h = vec![entry(2020, 1.00), entry(2022, 1.21), entry(2025, 0.30)];
        let g = dividend_cagr(&h, 2025).unwrap();
        assert!((g - 10.0).abs() < 1e-9, "{g}");
    }

    #[test]
    fn dividend_cagr_needs_two_complete_years() {
        assert_eq!(dividend_cagr(&[entry(2024, 1.0)], 2025), None);
        assert_eq!(dividend_cagr(&[], 2025), None);
    }

    #[test]
    fn streak_counts_back_from_last_complete_year() {
        let h = vec![
            entry(2018, 1.0),
            entry(2019, 0.9),
            entry(2020, 1.0),
            entry(2021, 1.1),
            entry(2022, 1.2),
            entry(2023, 1.3),
            entry(2024, 1.2),
        ];
        assert_eq!(dividend_streak(&h, 2024), 4);
        assert_eq!(dividend_streak(&h, 2025), 0);
    }

    #[test]
    fn streak_breaks_on_gap() {
        let h = vec![entry(2019, 1.0), entry(2021, 1.1), entry(2022, 1.2)];
        assert_eq!(dividend_streak(&h, 2023), 1);
    }

    #[test]
    fn price_growth_over_span() {
        let h = PriceHistory {
            closes: vec![
                PricePoint {
                    date: NaiveDate::from_ymd_opt(2020, 1, 1).unwrap(),
                    close: 100.0,
                },
                PricePoint {
                    date: NaiveDate::from_ymd_opt(2021, 12, 31).unwrap(),
                    close: 121.0,
                },
            ],
        };
        let (rate, years) = price_cagr(&h).unwrap();
        assert!((years - 2.0).abs() < 0.01);
        assert!((rate - 10.0).abs() < 0.1, "{rate}");
        assert_eq!(price_cagr(&PriceHistory::default()), None);
    }
}
