//! Checkpoint store: resumable progress as two whole documents.
//!
//! - `records`: the partial record list
//! - `progress`: processed symbols, recorded symbols, run tallies and a
//!   BLAKE3 digest of the records document
//!
//! `save` writes `records` first and `progress` second. A crash between the
//! two leaves a records document that is ahead of the progress document;
//! `load` drops records whose symbol is not processed and un-marks symbols
//! whose record is missing, so the worst case is re-processing.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use divharvest_core::domain::EntityRecord;
use divharvest_core::request::RequestStats;

pub const PROGRESS_DOC: &str = "progress";
pub const RECORDS_DOC: &str = "records";

/// Current schema version of both documents.
pub const CHECKPOINT_VERSION: u32 = 1;

#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error("checkpoint I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("checkpoint document `{doc}` is corrupt: {source}")]
    Corrupt {
        doc: &'static str,
        #[source]
        source: serde_json::Error,
    },
    #[error("unsupported checkpoint version {found} (max supported: {max})", max = CHECKPOINT_VERSION)]
    Version { found: u32 },
}

/// Whole-document storage under a name.
pub trait CheckpointBackend: Send + Sync {
    fn read(&self, doc: &str) -> Result<Option<String>, CheckpointError>;
    fn write(&self, doc: &str, contents: &str) -> Result<(), CheckpointError>;
    /// Removing a missing document is not an error.
    fn remove(&self, doc: &str) -> Result<(), CheckpointError>;
}

impl<T: CheckpointBackend + ?Sized> CheckpointBackend for Arc<T> {
    fn read(&self, doc: &str) -> Result<Option<String>, CheckpointError> {
        (**self).read(doc)
    }

    fn write(&self, doc: &str, contents: &str) -> Result<(), CheckpointError> {
        (**self).write(doc, contents)
    }

    fn remove(&self, doc: &str) -> Result<(), CheckpointError> {
        (**self).remove(doc)
    }
}

/// One JSON file per document, written via tmp file and rename.
#[derive(Debug, Clone)]
pub struct FileBackend {
    dir: PathBuf,
}

impl FileBackend {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path(&self, doc: &str) -> PathBuf {
        self.dir.join(format!("{doc}.json"))
    }
}

fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> CheckpointError + '_ {
    move |source| CheckpointError::Io {
        path: path.to_path_buf(),
        source,
    }
}

impl CheckpointBackend for FileBackend {
    fn read(&self, doc: &str) -> Result<Option<String>, CheckpointError> {
        let path = self.path(doc);
        match std::fs::read_to_string(&path) {
            Ok(s) => Ok(Some(s)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(io_err(&path)(e)),
        }
    }

    fn write(&self, doc: &str, contents: &str) -> Result<(), CheckpointError> {
        std::fs::create_dir_all(&self.dir).map_err(io_err(&self.dir))?;
        let path = self.path(doc);
        let tmp = self.dir.join(format!("{doc}.json.tmp"));
        std::fs::write(&tmp, contents).map_err(io_err(&tmp))?;
        std::fs::rename(&tmp, &path).map_err(io_err(&path))?;
        Ok(())
    }

    fn remove(&self, doc: &str) -> Result<(), CheckpointError> {
        let path = self.path(doc);
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(io_err(&path)(e)),
        }
    }
}

/// In-process backend for tests and dry runs.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    docs: Mutex<HashMap<String, String>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, doc: &str) -> Option<String> {
        self.docs.lock().get(doc).cloned()
    }

    pub fn put(&self, doc: &str, contents: impl Into<String>) {
        self.docs.lock().insert(doc.to_string(), contents.into());
    }

    pub fn len(&self) -> usize {
        self.docs.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl CheckpointBackend for MemoryBackend {
    fn read(&self, doc: &str) -> Result<Option<String>, CheckpointError> {
        Ok(self.get(doc))
    }

    fn write(&self, doc: &str, contents: &str) -> Result<(), CheckpointError> {
        self.put(doc, contents);
        Ok(())
    }

    fn remove(&self, doc: &str) -> Result<(), CheckpointError> {
        self.docs.lock().remove(doc);
        Ok(())
    }
}

/// Counters carried across resumed segments.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunTallies {
    pub skipped: u64,
    pub failed: u64,
    pub requests: RequestStats,
    /// Segments that have contributed, including the current one once saved.
    pub segments: u32,
    /// Start of the first segment.
    pub started_at: Option<DateTime<Utc>>,
    /// Wall time spent in completed segments.
    pub elapsed_secs: f64,
}

/// Restorable progress of a collection run.
#[derive(Debug, Clone, PartialEq)]
pub struct CheckpointState {
    pub processed: BTreeSet<String>,
    pub records: Vec<EntityRecord>,
    pub saved_at: DateTime<Utc>,
    pub tallies: RunTallies,
}

impl CheckpointState {
    pub fn new(saved_at: DateTime<Utc>) -> Self {
        Self {
            processed: BTreeSet::new(),
            records: Vec::new(),
            saved_at,
            tallies: RunTallies::default(),
        }
    }

    pub fn is_processed(&self, symbol: &str) -> bool {
        self.processed.contains(symbol)
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct ProgressDoc {
    version: u32,
    saved_at: DateTime<Utc>,
    processed: Vec<String>,
    recorded: Vec<String>,
    records_digest: String,
    #[serde(default)]
    tallies: RunTallies,
}

#[derive(Debug, Serialize, Deserialize)]
struct RecordsDoc {
    version: u32,
    records: Vec<EntityRecord>,
}

/// Summary of the checkpoint on the backend, without loading records.
#[derive(Debug, Clone, PartialEq)]
pub struct CheckpointStatus {
    pub saved_at: DateTime<Utc>,
    pub age: chrono::Duration,
    pub stale: bool,
    pub processed: usize,
    pub recorded: usize,
    pub segments: u32,
}

/// Loads and saves [`CheckpointState`] through a backend.
pub struct CheckpointStore {
    backend: Box<dyn CheckpointBackend>,
    staleness: chrono::Duration,
}

impl CheckpointStore {
    pub fn new(backend: impl CheckpointBackend + 'static, staleness: chrono::Duration) -> Self {
        Self {
            backend: Box::new(backend),
            staleness,
        }
    }

    /// File-backed store in `dir`.
    pub fn in_dir(dir: impl AsRef<Path>, staleness: chrono::Duration) -> Self {
        Self::new(FileBackend::new(dir), staleness)
    }

    pub fn staleness(&self) -> chrono::Duration {
        self.staleness
    }

    pub fn load(&self) -> Result<Option<CheckpointState>, CheckpointError> {
        self.load_at(Utc::now())
    }

    /// Load as of `now`. Missing or stale checkpoints are `None`.
    pub fn load_at(&self, now: DateTime<Utc>) -> Result<Option<CheckpointState>, CheckpointError> {
        let Some(progress) = self.read_progress()? else {
            return Ok(None);
        };
        if now - progress.saved_at > self.staleness {
            log::info!(
                "checkpoint from {} is older than {}h, ignoring",
                progress.saved_at,
                self.staleness.num_hours()
            );
            return Ok(None);
        }

        let (records_json, records) = match self.backend.read(RECORDS_DOC)? {
            Some(json) => match serde_json::from_str::<RecordsDoc>(&json) {
                Ok(doc) => (json, doc.records),
                Err(e) => {
                    log::warn!("checkpoint records document unreadable ({e}), re-fetching recorded entities");
                    (json, Vec::new())
                }
            },
            None => (String::new(), Vec::new()),
        };
        if digest(&records_json) != progress.records_digest {
            log::warn!("checkpoint records document is out of step with progress, reconciling");
        }

        let mut processed: BTreeSet<String> = progress.processed.into_iter().collect();
        let mut seen = HashSet::new();
        let records: Vec<EntityRecord> = records
            .into_iter()
            .filter(|r| processed.contains(&r.symbol) && seen.insert(r.symbol.clone()))
            .collect();
        for symbol in progress.recorded {
            if !seen.contains(&symbol) && processed.remove(&symbol) {
                log::warn!("{symbol}: record missing from checkpoint, will re-process");
            }
        }

        Ok(Some(CheckpointState {
            processed,
            records,
            saved_at: progress.saved_at,
            tallies: progress.tallies,
        }))
    }

    /// Persist `state`. Saving the same state twice leaves the same documents.
    pub fn save(&self, state: &CheckpointState) -> Result<(), CheckpointError> {
        let records_json = serde_json::to_string(&RecordsDoc {
            version: CHECKPOINT_VERSION,
            records: state.records.clone(),
        })
        .map_err(|source| CheckpointError::Corrupt {
            doc: RECORDS_DOC,
            source,
        })?;
        let progress = ProgressDoc {
            version: CHECKPOINT_VERSION,
            saved_at: state.saved_at,
            processed: state.processed.iter().cloned().collect(),
            recorded: state.records.iter().map(|r| r.symbol.clone()).collect(),
            records_digest: digest(&records_json),
            tallies: state.tallies.clone(),
        };
        let progress_json =
            serde_json::to_string_pretty(&progress).map_err(|source| CheckpointError::Corrupt {
                doc: PROGRESS_DOC,
                source,
            })?;

        self.backend.write(RECORDS_DOC, &records_json)?;
        self.backend.write(PROGRESS_DOC, &progress_json)?;
        log::debug!(
            "checkpoint saved: {} processed, {} recorded",
            state.processed.len(),
            state.records.len()
        );
        Ok(())
    }

    pub fn clear(&self) -> Result<(), CheckpointError> {
        self.backend.remove(PROGRESS_DOC)?;
        self.backend.remove(RECORDS_DOC)?;
        Ok(())
    }

    pub fn status(&self) -> Result<Option<CheckpointStatus>, CheckpointError> {
        self.status_at(Utc::now())
    }

    pub fn status_at(&self, now: DateTime<Utc>) -> Result<Option<CheckpointStatus>, CheckpointError> {
        Ok(self.read_progress()?.map(|p| {
            let age = now - p.saved_at;
            CheckpointStatus {
                saved_at: p.saved_at,
                age,
                stale: age > self.staleness,
                processed: p.processed.len(),
                recorded: p.recorded.len(),
                segments: p.tallies.segments,
            }
        }))
    }

    fn read_progress(&self) -> Result<Option<ProgressDoc>, CheckpointError> {
        let Some(json) = self.backend.read(PROGRESS_DOC)? else {
            return Ok(None);
        };
        let progress: ProgressDoc =
            serde_json::from_str(&json).map_err(|source| CheckpointError::Corrupt {
                doc: PROGRESS_DOC,
                source,
            })?;
        if progress.version > CHECKPOINT_VERSION {
            return Err(CheckpointError::Version {
                found: progress.version,
            });
        }
        Ok(Some(progress))
    }
}

fn digest(records_json: &str) -> String {
    blake3::hash(records_json.as_bytes()).to_hex().to_string()
}
