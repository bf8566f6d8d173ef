//! Aggregation over completed records: yield distribution, category rollups
//! and rankings.
//!
//! Pure functions of the record list. A record missing a field (or holding a
//! non-numeric value) contributes nothing to that field's sums and is left
//! out of its denominators.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use divharvest_core::domain::{fields, EntityRecord};

/// Upper bounds of the default yield buckets, in percent.
pub const DEFAULT_BUCKET_BOUNDS: [f64; 5] = [2.0, 4.0, 6.0, 8.0, 10.0];
pub const DEFAULT_TOP_N: usize = 20;
/// Category name for records without a sector or industry.
pub const UNKNOWN: &str = "Unknown";

/// Records whose yield falls in `[lower, upper)`; the last bucket is unbounded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BucketCount {
    pub label: String,
    pub lower: f64,
    pub upper: Option<f64>,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupSummary {
    pub name: String,
    pub count: usize,
    pub average_yield: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedEntry {
    pub rank: usize,
    pub symbol: String,
    pub name: Option<String>,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Statistics {
    pub total_records: usize,
    pub average_yield: Option<f64>,
    pub average_payout_ratio: Option<f64>,
    pub yield_buckets: Vec<BucketCount>,
    /// Largest group first; ties by name.
    pub sectors: Vec<GroupSummary>,
    pub industries: Vec<GroupSummary>,
    pub top_by_yield: Vec<RankedEntry>,
    pub top_by_dividend_growth: Vec<RankedEntry>,
}

/// Knobs for [`summarize_with`].
#[derive(Debug, Clone, PartialEq)]
pub struct SummaryOptions {
    /// Strictly ascending upper bounds; `n` bounds make `n + 1` buckets.
    pub bucket_bounds: Vec<f64>,
    pub top_n: usize,
}

impl Default for SummaryOptions {
    fn default() -> Self {
        Self {
            bucket_bounds: DEFAULT_BUCKET_BOUNDS.to_vec(),
            top_n: DEFAULT_TOP_N,
        }
    }
}

pub fn summarize(records: &[EntityRecord]) -> Statistics {
    summarize_with(records, &SummaryOptions::default())
}

pub fn summarize_with(records: &[EntityRecord], options: &SummaryOptions) -> Statistics {
    Statistics {
        total_records: records.len(),
        average_yield: average(records.iter().filter_map(|r| r.number(fields::DIVIDEND_YIELD))),
        average_payout_ratio: average(records.iter().filter_map(|r| r.number(fields::PAYOUT_RATIO))),
        yield_buckets: yield_buckets(records, &options.bucket_bounds),
        sectors: rollup(records, fields::SECTOR),
        industries: rollup(records, fields::INDUSTRY),
        top_by_yield: top_by(records, fields::DIVIDEND_YIELD, options.top_n),
        top_by_dividend_growth: top_by(records, fields::DIVIDEND_CAGR, options.top_n),
    }
}

fn average(values: impl Iterator<Item = f64>) -> Option<f64> {
    let (sum, n) = values.fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
    (n > 0).then(|| sum / n as f64)
}

/// Bucket counts for the given upper bounds. Unsorted or duplicate bounds
/// are sorted and deduplicated first.
pub fn yield_buckets(records: &[EntityRecord], bounds: &[f64]) -> Vec<BucketCount> {
    let mut bounds: Vec<f64> = bounds.iter().copied().filter(|b| b.is_finite()).collect();
    bounds.sort_by(f64::total_cmp);
    bounds.dedup();

    let mut buckets: Vec<BucketCount> = Vec::with_capacity(bounds.len() + 1);
    let mut lower = 0.0;
    for &upper in &bounds {
        buckets.push(BucketCount {
            label: format!("{lower}-{upper}"),
            lower,
            upper: Some(upper),
            count: 0,
        });
        lower = upper;
    }
    buckets.push(BucketCount {
        label: format!("{lower}+"),
        lower,
        upper: None,
        count: 0,
    });

    for y in records.iter().filter_map(|r| r.number(fields::DIVIDEND_YIELD)) {
        let idx = bounds.partition_point(|b| *b <= y);
        buckets[idx].count += 1;
    }
    buckets
}

/// Count and average yield per value of `field`.
pub fn rollup(records: &[EntityRecord], field: &str) -> Vec<GroupSummary> {
    #[derive(Default)]
    struct Acc {
        count: usize,
        yield_sum: f64,
        yield_n: usize,
    }

    let mut groups: BTreeMap<&str, Acc> = BTreeMap::new();
    for r in records {
        let acc = groups.entry(r.text(field).unwrap_or(UNKNOWN)).or_default();
        acc.count += 1;
        if let Some(y) = r.number(fields::DIVIDEND_YIELD) {
            acc.yield_sum += y;
            acc.yield_n += 1;
        }
    }

    let mut out: Vec<GroupSummary> = groups
        .into_iter()
        .map(|(name, acc)| GroupSummary {
            name: name.to_string(),
            count: acc.count,
            average_yield: (acc.yield_n > 0).then(|| acc.yield_sum / acc.yield_n as f64),
        })
        .collect();
    // stable: equal counts stay in name order
    out.sort_by(|a, b| b.count.cmp(&a.count));
    out
}

/// Top `n` records by `field`, descending. Ties keep record order.
pub fn top_by(records: &[EntityRecord], field: &str, n: usize) -> Vec<RankedEntry> {
    let mut ranked: Vec<(&EntityRecord, f64)> = records
        .iter()
        .filter_map(|r| r.number(field).map(|v| (r, v)))
        .collect();
    ranked.sort_by(|a, b| b.1.total_cmp(&a.1));
    ranked
        .into_iter()
        .take(n)
        .enumerate()
        .map(|(i, (r, value))| RankedEntry {
            rank: i + 1,
            symbol: r.symbol.clone(),
            name: r.text(fields::NAME).map(str::to_string),
            value,
        })
        .collect()
}
