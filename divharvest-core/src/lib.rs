//! Divharvest Core: domain types, data source, request machinery, entity pipeline.
//!
//! This crate contains everything needed to turn one equity ticker into one
//! validated record:
//! - Domain types (entities, records, dividend history)
//! - The data source seam and the Nasdaq-style implementation
//! - Request executor with classified outcomes and bounded retries
//! - Throttle controller with cooldowns, breaker and identity rotation
//! - The staged per-entity pipeline
//!
//! Batch orchestration, checkpointing and reporting live in `divharvest-runner`.

pub mod data;
pub mod domain;
pub mod finance;
pub mod pipeline;
pub mod request;
pub mod testing;

pub use pipeline::{EntityOutcome, EntityPipeline, FallbackPolicy, SkipReason, StageFlow, Supplement};

#[cfg(test)]
mod tests {
    use super::*;

    /// Compile-time check: everything shared across worker threads is Send + Sync.
    #[allow(dead_code)]
    fn assert_send_sync() {
        fn require_send<T: Send>() {}
        fn require_sync<T: Sync>() {}

        // Domain types
        require_send::<domain::Entity>();
        require_sync::<domain::Entity>();
        require_send::<domain::EntityRecord>();
        require_sync::<domain::EntityRecord>();
        require_send::<domain::DividendHistoryEntry>();
        require_sync::<domain::DividendHistoryEntry>();

        // Data seam
        require_send::<data::NasdaqSource>();
        require_sync::<data::NasdaqSource>();
        require_send::<data::HttpTransport>();
        require_sync::<data::HttpTransport>();
        require_send::<data::DataError>();
        require_sync::<data::DataError>();

        // Request machinery
        require_send::<request::RequestExecutor>();
        require_sync::<request::RequestExecutor>();
        require_send::<request::ThrottleController>();
        require_sync::<request::ThrottleController>();
        require_send::<request::RetryableOutcome>();
        require_sync::<request::RetryableOutcome>();

        // Pipeline
        require_send::<EntityOutcome>();
        require_sync::<EntityOutcome>();
        require_sync::<EntityPipeline<'static>>();

        // Test doubles
        require_send::<testing::ScriptedTransport>();
        require_sync::<testing::ScriptedTransport>();
        require_sync::<testing::RecordingSleeper>();
        require_sync::<testing::ManualClock>();
    }

    /// Architecture contract: the pipeline reaches the network only through
    /// `Transport`, so any `DataSource` can run against scripted replies.
    #[test]
    fn data_source_is_object_safe() {
        fn _check(source: &dyn data::DataSource, entity: &domain::Entity) -> data::RequestSpec {
            source.dividends_request(entity)
        }
    }
}
