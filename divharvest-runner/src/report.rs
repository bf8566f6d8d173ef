//! Collection report assembly and export: JSON report and CSV of records.
//!
//! The JSON report carries a `schema_version`; newer versions are rejected
//! on load.

use std::path::Path;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use divharvest_core::domain::{fields, EntityRecord};
use divharvest_core::request::RequestStats;

use crate::aggregate::Statistics;

pub const REPORT_SCHEMA_VERSION: u32 = 1;

fn default_schema_version() -> u32 {
    REPORT_SCHEMA_VERSION
}

/// Run totals, merged across resumed segments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunMetadata {
    pub source: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub elapsed_secs: f64,
    pub segments: u32,
    pub total_entities: usize,
    pub recorded: usize,
    pub skipped: u64,
    pub failed: u64,
    pub requests: RequestStats,
    pub request_success_rate: f64,
}

/// One finished snapshot of a collection run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionReport {
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,
    pub metadata: RunMetadata,
    pub statistics: Statistics,
    pub records: Vec<EntityRecord>,
}

pub fn export_json(report: &CollectionReport) -> Result<String> {
    serde_json::to_string_pretty(report).context("failed to serialize CollectionReport to JSON")
}

pub fn import_json(json: &str) -> Result<CollectionReport> {
    let report: CollectionReport =
        serde_json::from_str(json).context("failed to deserialize CollectionReport from JSON")?;
    if report.schema_version > REPORT_SCHEMA_VERSION {
        bail!(
            "unsupported schema version {} (max supported: {})",
            report.schema_version,
            REPORT_SCHEMA_VERSION
        );
    }
    Ok(report)
}

/// Write `contents` to `path` via a sibling tmp file and rename.
fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    std::fs::write(&tmp, contents)
        .with_context(|| format!("failed to write {}", Path::new(&tmp).display()))?;
    std::fs::rename(&tmp, path).with_context(|| format!("failed to move report to {}", path.display()))?;
    Ok(())
}

pub fn write_report(report: &CollectionReport, path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    write_atomic(path, &export_json(report)?)?;
    log::info!("report written to {}", path.display());
    Ok(())
}

pub fn read_report(path: impl AsRef<Path>) -> Result<CollectionReport> {
    let path = path.as_ref();
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    import_json(&json)
}

/// CSV column order.
pub const CSV_COLUMNS: [&str; 17] = [
    fields::SYMBOL,
    fields::NAME,
    fields::SECTOR,
    fields::INDUSTRY,
    fields::COUNTRY,
    fields::EXCHANGE,
    fields::DIVIDEND_YIELD,
    fields::ANNUAL_DIVIDEND,
    fields::PAYOUT_RATIO,
    fields::EX_DIVIDEND_DATE,
    fields::MARKET_CAP,
    fields::PE_RATIO,
    fields::DIVIDEND_CAGR,
    fields::DIVIDEND_STREAK,
    fields::PRICE_CAGR,
    fields::PRICE_YEARS,
    fields::PROFILE_SOURCE,
];

fn cell(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::Bool(b)) => b.to_string(),
        _ => String::new(),
    }
}

/// One row per record; absent fields are empty cells.
pub fn export_records_csv(records: &[EntityRecord]) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record(CSV_COLUMNS)?;
    for r in records {
        wtr.write_record(CSV_COLUMNS.iter().map(|c| cell(r.get(c))))?;
    }
    let data = wtr.into_inner().context("failed to flush CSV writer")?;
    String::from_utf8(data).context("CSV output is not valid UTF-8")
}

pub fn write_records_csv(records: &[EntityRecord], path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    write_atomic(path, &export_records_csv(records)?)?;
    log::info!("{} records exported to {}", records.len(), path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::summarize;
    use divharvest_core::domain::RecordBuilder;

    fn records() -> Vec<EntityRecord> {
        let mut a = RecordBuilder::new("KO");
        a.text(fields::NAME, Some("Coca-Cola, Inc."))
            .number(fields::DIVIDEND_YIELD, Some(2.9))
            .integer(fields::DIVIDEND_STREAK, Some(3));
        let mut b = RecordBuilder::new("T");
        b.text(fields::NAME, Some("AT&T"))
            .number(fields::DIVIDEND_YIELD, Some(6.1))
            .text(fields::SECTOR, Some("Telecom"));
        vec![a.finish().unwrap(), b.finish().unwrap()]
    }

    fn report() -> CollectionReport {
        let records = records();
        let now = Utc::now();
        CollectionReport {
            schema_version: REPORT_SCHEMA_VERSION,
            metadata: RunMetadata {
                source: "nasdaq".into(),
                started_at: now,
                finished_at: now,
                elapsed_secs: 1.5,
                segments: 1,
                total_entities: 3,
                recorded: records.len(),
                skipped: 1,
                failed: 0,
                requests: RequestStats::default(),
                request_success_rate: 1.0,
            },
            statistics: summarize(&records),
            records,
        }
    }

    #[test]
    fn report_json_roundtrip() {
        let r = report();
        assert_eq!(import_json(&export_json(&r).unwrap()).unwrap(), r);
    }

    #[test]
    fn newer_schema_is_rejected() {
        let mut r = report();
        r.schema_version = REPORT_SCHEMA_VERSION + 1;
        let json = serde_json::to_string(&r).unwrap();
        assert!(import_json(&json).unwrap_err().to_string().contains("unsupported schema version"));
    }

    #[test]
    fn write_report_is_atomic_and_creates_dirs() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("out/report.json");
        write_report(&report(), &path).unwrap();
        assert!(path.exists());
        assert!(!temp_dir.path().join("out/report.json.tmp").exists());
        assert_eq!(read_report(&path).unwrap().records.len(), 2);
    }

    #[test]
    fn csv_has_header_and_quoted_cells() {
        let csv = export_records_csv(&records()).unwrap();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("symbol,name,sector"));
        assert!(lines[1].starts_with("KO,\"Coca-Cola, Inc.\",,"));
        assert!(lines[1].contains(",3,"));
        assert!(lines[2].starts_with("T,AT&T,Telecom,"));
    }
}
