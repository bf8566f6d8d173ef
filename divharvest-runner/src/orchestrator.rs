//! Batch orchestrator: listing, grouped fan-out, checkpoint cadence, report.
//!
//! Entities run in fixed-size groups on a private rayon pool. All state
//! mutation (records, tallies, checkpoint writes) happens at the join point
//! after each group, on the calling thread.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use chrono::{Datelike, NaiveDate, Utc};
use parking_lot::Mutex;
use rayon::prelude::*;
use thiserror::Error;

use divharvest_core::data::{DataError, DataSource, HttpTransport, NasdaqSource};
use divharvest_core::domain::{Entity, EntityState};
use divharvest_core::pipeline::{EntityOutcome, EntityPipeline, FallbackPolicy};
use divharvest_core::request::{
    RequestExecutor, RequestStats, RetryableOutcome, ThreadSleeper, ThrottleController,
};

use crate::aggregate::{summarize_with, SummaryOptions, DEFAULT_TOP_N};
use crate::checkpoint::{CheckpointError, CheckpointState, CheckpointStore, RunTallies};
use crate::config::{ConfigError, HarvestConfig};
use crate::report::{CollectionReport, RunMetadata, REPORT_SCHEMA_VERSION};

/// Errors that end a run.
#[derive(Debug, Error)]
pub enum HarvestError {
    #[error("listing failed: {0}")]
    Listing(String),
    #[error("failed to set up data source: {0}")]
    Setup(#[from] DataError),
    #[error("failed to build worker pool: {0}")]
    Pool(#[from] rayon::ThreadPoolBuildError),
    #[error("checkpoint error: {0}")]
    Checkpoint(#[from] CheckpointError),
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
}

/// How a call to [`BatchOrchestrator::run`] ended.
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    Complete(Box<CollectionReport>),
    /// The per-segment entity budget ran out; progress is checkpointed.
    Suspended { processed: usize, remaining: usize },
}

/// Per-run knobs that are not part of the request machinery.
#[derive(Debug, Clone, PartialEq)]
pub struct RunOptions {
    pub fallback: FallbackPolicy,
    pub checkpoint_every: usize,
    pub top_n: usize,
    pub max_entities: Option<usize>,
    /// Calendar year treated as partial by the growth metrics.
    pub current_year: i32,
    /// Start from an existing checkpoint when one is present.
    pub resume: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            fallback: FallbackPolicy::default(),
            checkpoint_every: 25,
            top_n: DEFAULT_TOP_N,
            max_entities: None,
            current_year: Utc::now().year(),
            resume: true,
        }
    }
}

impl RunOptions {
    pub fn from_config(config: &HarvestConfig, as_of: NaiveDate) -> Self {
        Self {
            fallback: config.fallback,
            checkpoint_every: config.checkpoint.every.max(1),
            top_n: config.top_n,
            max_entities: config.max_entities,
            current_year: as_of.year(),
            resume: true,
        }
    }
}

/// Narrow a listing to `allowlist` (when non-empty) and the first `limit`
/// entities. Duplicate symbols keep their first occurrence.
pub fn select_entities(entities: Vec<Entity>, allowlist: &[String], limit: Option<usize>) -> Vec<Entity> {
    let wanted: HashSet<String> = allowlist.iter().map(|s| s.trim().to_uppercase()).collect();
    let mut seen = HashSet::new();
    let mut selected: Vec<Entity> = entities
        .into_iter()
        .filter(|e| wanted.is_empty() || wanted.contains(&e.symbol.to_uppercase()))
        .filter(|e| seen.insert(e.symbol.clone()))
        .collect();
    if !wanted.is_empty() {
        let found: HashSet<String> = selected.iter().map(|e| e.symbol.to_uppercase()).collect();
        for missing in wanted.iter().filter(|s| !found.contains(*s)) {
            log::warn!("{missing}: not in listing, ignored");
        }
    }
    if let Some(limit) = limit {
        selected.truncate(limit);
    }
    selected
}

pub struct BatchOrchestrator {
    source: Arc<dyn DataSource>,
    executor: RequestExecutor,
    store: CheckpointStore,
    options: RunOptions,
    /// Request tallies already attributed to a finished `run` call.
    accounted: Mutex<RequestStats>,
}

impl BatchOrchestrator {
    pub fn new(
        source: Arc<dyn DataSource>,
        executor: RequestExecutor,
        store: CheckpointStore,
        options: RunOptions,
    ) -> Self {
        Self {
            source,
            executor,
            store,
            options,
            accounted: Mutex::new(RequestStats::default()),
        }
    }

    /// Live wiring: Nasdaq source over HTTP, thread sleeps, file checkpoints.
    pub fn from_config(config: &HarvestConfig, as_of: NaiveDate) -> Result<Self, HarvestError> {
        config.validate()?;
        let source = NasdaqSource::new(&config.base_url, as_of)
            .with_default_lookback(config.default_lookback_years);
        let executor = RequestExecutor::new(
            Arc::new(HttpTransport::new()?),
            Arc::new(ThrottleController::new(config.throttle.clone())),
            Arc::new(ThreadSleeper),
            config.retry.clone(),
        );
        let store = CheckpointStore::in_dir(&config.checkpoint.dir, config.checkpoint.staleness());
        Ok(Self::new(
            Arc::new(source),
            executor,
            store,
            RunOptions::from_config(config, as_of),
        ))
    }

    pub fn with_resume(mut self, resume: bool) -> Self {
        self.options.resume = resume;
        self
    }

    pub fn options(&self) -> &RunOptions {
        &self.options
    }

    pub fn store(&self) -> &CheckpointStore {
        &self.store
    }

    /// Request tallies for this process so far.
    pub fn request_stats(&self) -> RequestStats {
        self.executor.throttle().stats()
    }

    /// Fetch the entity universe. Failure here is fatal for the run.
    pub fn list_entities(&self) -> Result<Vec<Entity>, HarvestError> {
        let spec = self.source.listing_request();
        log::info!("fetching listing from {}", self.source.name());
        match self.executor.execute(&spec) {
            RetryableOutcome::Success(payload) => {
                let entities = self
                    .source
                    .parse_listing(&payload)
                    .map_err(|e| HarvestError::Listing(e.to_string()))?;
                log::info!("listing returned {} entities", entities.len());
                Ok(entities)
            }
            other => Err(HarvestError::Listing(other.to_string())),
        }
    }

    fn initial_state(&self) -> CheckpointState {
        if !self.options.resume {
            if let Err(e) = self.store.clear() {
                log::warn!("could not clear checkpoint: {e}");
            }
            return CheckpointState::new(Utc::now());
        }
        match self.store.load() {
            Ok(Some(state)) => {
                log::info!(
                    "resuming from checkpoint saved {}: {} processed, {} recorded",
                    state.saved_at,
                    state.processed.len(),
                    state.records.len()
                );
                state
            }
            Ok(None) => CheckpointState::new(Utc::now()),
            Err(e) => {
                log::warn!("checkpoint unusable ({e}), starting fresh");
                CheckpointState::new(Utc::now())
            }
        }
    }

    fn collect_one(&self, entity: &Entity) -> EntityOutcome {
        log::debug!("{}: {:?} -> {:?}", entity.symbol, EntityState::Pending, EntityState::InFlight);
        let pipeline = EntityPipeline::new(
            self.source.as_ref(),
            &self.executor,
            self.options.fallback,
            self.options.current_year,
        );
        let outcome = pipeline.collect(entity);
        debug_assert!(EntityState::InFlight.can_advance_to(outcome.state()));
        log::debug!("{}: {:?} -> {:?}", entity.symbol, EntityState::InFlight, outcome.state());
        outcome
    }

    /// Process every entity not yet in the checkpoint.
    ///
    /// `concurrency` of 1 runs sequentially on the calling thread.
    pub fn run(&self, entities: &[Entity], concurrency: usize) -> Result<RunOutcome, HarvestError> {
        let clock = Instant::now();
        let segment_start = Utc::now();
        let mut state = self.initial_state();
        let base = state.tallies.clone();
        let stats_at_start = *self.accounted.lock();

        let pending: Vec<&Entity> = entities
            .iter()
            .filter(|e| !state.is_processed(&e.symbol))
            .collect();
        let budget = self.options.max_entities.unwrap_or(usize::MAX).min(pending.len());
        let (now, later) = pending.split_at(budget);
        log::info!(
            "{} entities: {} already processed, {} this segment, {} deferred",
            entities.len(),
            entities.len() - pending.len(),
            now.len(),
            later.len()
        );

        let concurrency = concurrency.max(1);
        let pool = if concurrency > 1 {
            Some(
                rayon::ThreadPoolBuilder::new()
                    .num_threads(concurrency)
                    .thread_name(|i| format!("divharvest-worker-{i}"))
                    .build()?,
            )
        } else {
            None
        };

        let tallies = |state: &CheckpointState| -> RunTallies {
            let segment_requests = delta(&self.request_stats(), &stats_at_start);
            RunTallies {
                skipped: state.tallies.skipped,
                failed: state.tallies.failed,
                requests: base.requests.merged(&segment_requests),
                segments: base.segments + 1,
                started_at: Some(base.started_at.unwrap_or(segment_start)),
                elapsed_secs: base.elapsed_secs + clock.elapsed().as_secs_f64(),
            }
        };

        let every = self.options.checkpoint_every.max(1);
        let mut processed_here = 0usize;
        let mut saves_due = 0usize;
        for group in now.chunks(concurrency) {
            let outcomes: Vec<EntityOutcome> = match pool {
                Some(ref tp) => tp.install(|| group.par_iter().map(|e| self.collect_one(e)).collect()),
                None => group.iter().map(|e| self.collect_one(e)).collect(),
            };

            for outcome in outcomes {
                state.processed.insert(outcome.symbol().to_string());
                match outcome {
                    EntityOutcome::Recorded(record) => state.records.push(record),
                    EntityOutcome::Skipped { symbol, reason } => {
                        log::info!("{symbol}: skipped ({reason})");
                        state.tallies.skipped += 1;
                    }
                    EntityOutcome::Failed { .. } => state.tallies.failed += 1,
                }
            }

            processed_here += group.len();
            log::info!(
                "progress: {}/{} processed, {} recorded, {} skipped, {} failed",
                state.processed.len(),
                entities.len(),
                state.records.len(),
                state.tallies.skipped,
                state.tallies.failed
            );
            // save at the first join point past each multiple of `every`
            if processed_here / every > saves_due {
                saves_due = processed_here / every;
                state.tallies = tallies(&state);
                state.saved_at = Utc::now();
                if let Err(e) = self.store.save(&state) {
                    log::error!("checkpoint save failed, continuing: {e}");
                }
            }
        }

        state.tallies = tallies(&state);
        state.saved_at = Utc::now();
        *self.accounted.lock() = self.request_stats();

        if !later.is_empty() {
            self.store.save(&state)?;
            log::info!(
                "segment budget reached, suspending with {} entities remaining",
                later.len()
            );
            return Ok(RunOutcome::Suspended {
                processed: now.len(),
                remaining: later.len(),
            });
        }

        let report = self.build_report(entities.len(), state);
        if let Err(e) = self.store.clear() {
            log::warn!("could not clear checkpoint after completion: {e}");
        }
        Ok(RunOutcome::Complete(Box::new(report)))
    }

    fn build_report(&self, total_entities: usize, state: CheckpointState) -> CollectionReport {
        let options = SummaryOptions {
            top_n: self.options.top_n,
            ..SummaryOptions::default()
        };
        let statistics = summarize_with(&state.records, &options);
        let t = &state.tallies;
        log::info!(
            "collection complete: {} recorded, {} skipped, {} failed, {:.1}% request success",
            state.records.len(),
            t.skipped,
            t.failed,
            t.requests.success_rate() * 100.0
        );
        CollectionReport {
            schema_version: REPORT_SCHEMA_VERSION,
            metadata: RunMetadata {
                source: self.source.name().to_string(),
                started_at: t.started_at.unwrap_or(state.saved_at),
                finished_at: state.saved_at,
                elapsed_secs: t.elapsed_secs,
                segments: t.segments,
                total_entities,
                recorded: state.records.len(),
                skipped: t.skipped,
                failed: t.failed,
                requests: t.requests,
                request_success_rate: t.requests.success_rate(),
            },
            statistics,
            records: state.records,
        }
    }
}

/// Counters accumulated since `start`, which must be an earlier snapshot.
fn delta(now: &RequestStats, start: &RequestStats) -> RequestStats {
    RequestStats {
        total: now.total - start.total,
        succeeded: now.succeeded - start.succeeded,
        failed: now.failed - start.failed,
        transient: now.transient - start.transient,
        rate_limited: now.rate_limited - start.rate_limited,
        blocked: now.blocked - start.blocked,
        rejected: now.rejected - start.rejected,
        cooldowns_scheduled: now.cooldowns_scheduled - start.cooldowns_scheduled,
        breaker_trips: now.breaker_trips - start.breaker_trips,
        cooldown_ms: now.cooldown_ms - start.cooldown_ms,
    }
}
