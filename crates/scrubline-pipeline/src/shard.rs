//! Shard writer: buffering, rollover, and storage dispatch.
//!
//! A shard is OPEN while documents accumulate, CLOSED when a record or
//! byte threshold is crossed (or the stream ends), then dispatched to
//! every enabled backend exactly once. A backend failure is retried with
//! backoff; on exhaustion the shard spills locally and the run continues.

use std::path::PathBuf;

use rustc_hash::FxHashMap;

use scrubline_core::retry::retry_with_backoff;
use scrubline_core::store::{ShardStore, spill_shard};

use crate::document::Document;
use crate::error::ConfigError;

/// Rollover thresholds. A shard closes when either is reached.
#[derive(Debug, Clone, Copy)]
pub struct ShardLimits {
    pub max_records: usize,
    pub max_bytes: usize,
}

impl Default for ShardLimits {
    fn default() -> Self {
        Self {
            max_records: 10_000,
            max_bytes: 64 * 1024 * 1024,
        }
    }
}

/// What to do when a document id repeats within one shard.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DuplicateIdPolicy {
    /// Abort the dataset. The default: silent duplicates hide data bugs.
    Fail,
    /// Last write wins; the earlier record is replaced in place.
    Overwrite,
}

impl DuplicateIdPolicy {
    pub fn parse(s: &str) -> Result<Self, ConfigError> {
        match s {
            "fail" => Ok(Self::Fail),
            "overwrite" => Ok(Self::Overwrite),
            other => Err(ConfigError::new(format!(
                "invalid duplicate id policy '{other}' (expected fail or overwrite)"
            ))),
        }
    }
}

/// Error from appending a document. Fatal to the dataset, by policy.
#[derive(Debug)]
pub enum ShardError {
    DuplicateId { id: String, shard: String },
    Serialize(serde_json::Error),
}

impl std::fmt::Display for ShardError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DuplicateId { id, shard } => {
                write!(f, "duplicate document id '{id}' in shard {shard}")
            }
            Self::Serialize(e) => write!(f, "serialize: {e}"),
        }
    }
}

impl std::error::Error for ShardError {}

/// Dispatch result for one backend.
#[derive(Debug)]
pub enum DispatchOutcome {
    Stored,
    Failed(String),
}

/// Final fate of one closed shard.
#[derive(Debug)]
pub struct ShardOutcome {
    pub key: String,
    pub records: usize,
    pub bytes: usize,
    /// (backend name, outcome) per enabled backend, in dispatch order
    pub backends: Vec<(String, DispatchOutcome)>,
    /// Set when at least one backend failed permanently and the shard
    /// was written to the spill dir
    pub spilled: Option<PathBuf>,
}

impl ShardOutcome {
    pub fn fully_stored(&self) -> bool {
        self.backends
            .iter()
            .all(|(_, o)| matches!(o, DispatchOutcome::Stored))
    }
}

/// Per-dataset, per-run shard writer.
///
/// Owns documents only until they are serialized into the line buffer;
/// the buffer is handed off at close and never touched again.
pub struct ShardWriter<'a> {
    /// Key prefix: `{dataset}/{run_id}` (plus language subpath if any)
    prefix: String,
    seq: usize,
    lines: Vec<Vec<u8>>,
    /// id → line index within the open shard, for dup detection
    ids: FxHashMap<String, usize>,
    bytes: usize,
    limits: ShardLimits,
    dup_policy: DuplicateIdPolicy,
    stores: &'a [Box<dyn ShardStore>],
    spill_dir: PathBuf,
    max_retries: u32,
    outcomes: Vec<ShardOutcome>,
}

impl<'a> ShardWriter<'a> {
    pub fn new(
        dataset_path: &str,
        run_id: &str,
        limits: ShardLimits,
        dup_policy: DuplicateIdPolicy,
        stores: &'a [Box<dyn ShardStore>],
        spill_dir: impl Into<PathBuf>,
        max_retries: u32,
    ) -> Self {
        Self {
            prefix: format!("{dataset_path}/{run_id}"),
            seq: 0,
            lines: Vec::new(),
            ids: FxHashMap::default(),
            bytes: 0,
            limits,
            dup_policy,
            stores,
            spill_dir: spill_dir.into(),
            max_retries,
            outcomes: Vec::new(),
        }
    }

    fn key(&self) -> String {
        format!("{}/part-{:05}.jsonl", self.prefix, self.seq)
    }

    /// Append one document to the open shard, closing and dispatching it
    /// if a threshold is crossed.
    pub fn append(&mut self, doc: &Document) -> Result<(), ShardError> {
        let mut line = serde_json::to_vec(doc).map_err(ShardError::Serialize)?;
        line.push(b'\n');

        if let Some(&idx) = self.ids.get(&doc.id) {
            match self.dup_policy {
                DuplicateIdPolicy::Fail => {
                    return Err(ShardError::DuplicateId {
                        id: doc.id.clone(),
                        shard: self.key(),
                    });
                }
                DuplicateIdPolicy::Overwrite => {
                    self.bytes = self.bytes - self.lines[idx].len() + line.len();
                    self.lines[idx] = line;
                    return Ok(());
                }
            }
        }

        self.bytes += line.len();
        self.ids.insert(doc.id.clone(), self.lines.len());
        self.lines.push(line);

        if self.lines.len() >= self.limits.max_records || self.bytes >= self.limits.max_bytes {
            self.close_open_shard();
        }
        Ok(())
    }

    /// Close and dispatch the open shard. Storage failure never
    /// propagates; it is recorded in the outcome.
    fn close_open_shard(&mut self) {
        if self.lines.is_empty() {
            return;
        }

        let key = self.key();
        let records = self.lines.len();
        let body: Vec<u8> = self.lines.drain(..).flatten().collect();
        let bytes = body.len();
        self.ids.clear();
        self.bytes = 0;
        self.seq += 1;

        log::debug!("{key}: closed with {records} records ({bytes} bytes)");

        let mut backends = Vec::with_capacity(self.stores.len());
        let mut any_failed = false;
        for store in self.stores {
            let label = format!("{} → {}", key, store.name());
            let outcome = match retry_with_backoff(&label, self.max_retries, || {
                store.store(&key, &body)
            }) {
                Ok(()) => DispatchOutcome::Stored,
                Err(e) => {
                    any_failed = true;
                    DispatchOutcome::Failed(e.to_string())
                }
            };
            backends.push((store.name().to_string(), outcome));
        }

        let spilled = if any_failed {
            match spill_shard(&self.spill_dir, &key, &body) {
                Ok(path) => {
                    log::warn!("{key}: spilled to {}", path.display());
                    Some(path)
                }
                Err(e) => {
                    log::error!("{key}: spill failed: {e}");
                    None
                }
            }
        } else {
            None
        };

        self.outcomes.push(ShardOutcome {
            key,
            records,
            bytes,
            backends,
            spilled,
        });
    }

    /// Number of records in the open shard.
    pub fn pending(&self) -> usize {
        self.lines.len()
    }

    /// Flush the open shard and return the fate of every shard written.
    pub fn finish(mut self) -> Vec<ShardOutcome> {
        self.close_open_shard();
        self.outcomes
    }
}
