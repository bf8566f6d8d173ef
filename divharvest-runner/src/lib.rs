//! Divharvest Runner: batch orchestration, checkpoints, aggregation, reports.
//!
//! This crate builds on `divharvest-core` to provide:
//! - TOML run configuration with defaults and validation
//! - A two-document checkpoint store with file and in-memory backends
//! - The batch orchestrator (grouped fan-out, checkpoint cadence, resume)
//! - Aggregation of records into buckets, rollups and rankings
//! - JSON report and CSV export

pub mod aggregate;
pub mod checkpoint;
pub mod config;
pub mod orchestrator;
pub mod report;

pub use aggregate::{
    summarize, summarize_with, BucketCount, GroupSummary, RankedEntry, Statistics, SummaryOptions,
};
pub use checkpoint::{
    CheckpointBackend, CheckpointError, CheckpointState, CheckpointStatus, CheckpointStore,
    FileBackend, MemoryBackend, RunTallies,
};
pub use config::{CheckpointConfig, ConfigError, HarvestConfig, DEFAULT_CONFIG_FILE};
pub use orchestrator::{select_entities, BatchOrchestrator, HarvestError, RunOptions, RunOutcome};
pub use report::{
    export_records_csv, read_report, write_records_csv, write_report, CollectionReport,
    RunMetadata, REPORT_SCHEMA_VERSION,
};

#[cfg(test)]
mod send_sync_checks {
    use super::*;

    fn assert_send<T: Send>() {}
    fn assert_sync<T: Sync>() {}

    #[test]
    fn orchestrator_is_send_sync() {
        assert_send::<BatchOrchestrator>();
        assert_sync::<BatchOrchestrator>();
    }

    #[test]
    fn checkpoint_types_are_send_sync() {
        assert_send::<CheckpointStore>();
        assert_sync::<CheckpointStore>();
        assert_send::<CheckpointState>();
        assert_sync::<CheckpointState>();
    }

    #[test]
    fn report_types_are_send_sync() {
        assert_send::<CollectionReport>();
        assert_sync::<CollectionReport>();
        assert_send::<Statistics>();
        assert_sync::<Statistics>();
    }

    #[test]
    fn config_types_are_send_sync() {
        assert_send::<HarvestConfig>();
        assert_sync::<HarvestConfig>();
    }
}
