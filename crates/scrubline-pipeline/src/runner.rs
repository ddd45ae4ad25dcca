//! Run orchestration: datasets in parallel, rows in order.
//!
//! Each dataset worker drives one row at a time through
//! normalize → mask → metadata → document → shard writer. Rows within a
//! dataset are strictly sequential; parallelism exists only across
//! datasets, each worker owning its shard writer and counters.

use std::sync::Mutex;
use std::time::Instant;

use anyhow::{Context, Result};
use serde_json::{Map, Value};

use scrubline_core::progress::upgrade_to_bytes;
use scrubline_core::store::ShardStore;
use scrubline_core::{CancelToken, SharedProgress, fmt_num};

use crate::document::{IdPolicy, assemble};
use crate::error::ConfigError;
use crate::mask::{MaskedResult, mask};
use crate::metadata::{RunContext, merge_metadata, run_metadata, validate_run_fields};
use crate::normalize::normalize;
use crate::shard::{DuplicateIdPolicy, ShardLimits, ShardWriter};
use crate::source::{RowSource, SourceError};
use crate::summary::{DatasetCounters, DatasetReport, RunSummary};
use crate::tagger::{Tagger, tagger_by_id};

/// What to do with a document whose tagger call failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagFailurePolicy {
    /// Emit the document with text masked to empty (subject to the
    /// empty-text gate below)
    MaskEmpty,
    /// Drop the document entirely
    Drop,
}

impl TagFailurePolicy {
    pub fn parse(s: &str) -> Result<Self, ConfigError> {
        match s {
            "mask_empty" => Ok(Self::MaskEmpty),
            "drop" => Ok(Self::Drop),
            other => Err(ConfigError::new(format!(
                "invalid tag failure policy '{other}' (expected mask_empty or drop)"
            ))),
        }
    }
}

/// Masking stage configuration.
#[derive(Debug, Clone)]
pub struct MaskingOptions {
    pub enabled: bool,
    pub tagger_id: String,
    pub mask_token: String,
    pub on_error: TagFailurePolicy,
}

impl Default for MaskingOptions {
    fn default() -> Self {
        Self {
            enabled: true,
            tagger_id: "pii_regex".to_string(),
            mask_token: "<PII>".to_string(),
            on_error: TagFailurePolicy::MaskEmpty,
        }
    }
}

/// Run-wide pipeline options, identical across datasets.
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub normalize_enabled: bool,
    pub masking: MaskingOptions,
    /// Emit documents whose post-mask text is empty
    pub keep_empty: bool,
    pub shard_limits: ShardLimits,
    pub dup_policy: DuplicateIdPolicy,
    pub global_metadata: Map<String, Value>,
    pub run_metadata_enabled: bool,
    /// Allow-listed field names; `None` = all
    pub run_metadata_include: Option<Vec<String>>,
    pub dispatch_retries: u32,
    pub spill_dir: std::path::PathBuf,
    /// Bounded parallelism across datasets
    pub workers: usize,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            normalize_enabled: true,
            masking: MaskingOptions::default(),
            keep_empty: false,
            shard_limits: ShardLimits::default(),
            dup_policy: DuplicateIdPolicy::Fail,
            global_metadata: Map::new(),
            run_metadata_enabled: false,
            run_metadata_include: None,
            dispatch_retries: 3,
            spill_dir: std::path::PathBuf::from("spill"),
            workers: 2,
        }
    }
}

/// One dataset to process. Language-expanded datasets appear as several
/// specs sharing a name but differing in derived metadata and path.
pub struct DatasetSpec {
    pub name: String,
    pub source: Box<dyn RowSource>,
    /// Row field holding the document text
    pub text_field: String,
    pub id_policy: IdPolicy,
    pub metadata: Map<String, Value>,
    /// Auto-derived per-record fields, e.g. a language tag
    pub derived: Map<String, Value>,
    /// Shard key subpath: dataset name, or `{dataset}/{lang}`
    pub output_path: String,
    /// Row cap from test mode; applied at the enumeration boundary
    pub row_cap: Option<usize>,
}

/// Fail-fast validation of everything a run depends on.
///
/// Raised before any row is pulled; per-row failures are never fatal.
pub fn validate(specs: &[DatasetSpec], opts: &RunOptions) -> Result<(), ConfigError> {
    if specs.is_empty() {
        return Err(ConfigError::new("no datasets configured"));
    }
    if opts.masking.enabled && tagger_by_id(&opts.masking.tagger_id).is_none() {
        return Err(ConfigError::new(format!(
            "unknown tagger '{}' (available: {})",
            opts.masking.tagger_id,
            crate::tagger::tagger_ids().join(", ")
        )));
    }
    if let Some(include) = &opts.run_metadata_include {
        validate_run_fields(include)?;
    }
    Ok(())
}

/// Execute the run: all datasets, bounded parallelism, one summary.
///
/// Returns after every closed shard is stored, spilled, or recorded as
/// failed, so completion implies durability or an explicit failure entry.
pub fn run(
    specs: &[DatasetSpec],
    opts: &RunOptions,
    ctx: &RunContext,
    stores: &[Box<dyn ShardStore>],
    progress: &SharedProgress,
    cancel: &CancelToken,
) -> Result<RunSummary> {
    validate(specs, opts).map_err(anyhow::Error::from)?;

    let start = Instant::now();
    let run_md = if opts.run_metadata_enabled {
        Some(run_metadata(ctx, opts.run_metadata_include.as_deref()))
    } else {
        None
    };

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(opts.workers.max(1))
        .build()
        .context("failed to create dataset worker pool")?;

    // Append-only aggregation point; workers push exactly once each
    let reports: Mutex<Vec<DatasetReport>> = Mutex::new(Vec::with_capacity(specs.len()));

    pool.install(|| {
        rayon::scope(|scope| {
            for spec in specs {
                let reports = &reports;
                let run_md = run_md.as_ref();
                scope.spawn(move |_| {
                    let report =
                        process_dataset(spec, opts, ctx, run_md, stores, progress, cancel);
                    reports.lock().expect("reports mutex").push(report);
                });
            }
        });
    });

    let mut datasets = reports.into_inner().expect("reports mutex");
    datasets.sort_by(|a, b| a.dataset.cmp(&b.dataset));

    let summary = RunSummary {
        datasets,
        elapsed: start.elapsed(),
        cancelled: cancel.is_cancelled(),
    };
    log_summary(&summary);
    Ok(summary)
}

/// Pull the text field out of a raw row. `None` is a skip.
fn text_of<'a>(row: &'a Map<String, Value>, field: &str) -> Option<&'a str> {
    match row.get(field) {
        Some(Value::String(s)) => Some(s),
        _ => None,
    }
}

fn process_dataset(
    spec: &DatasetSpec,
    opts: &RunOptions,
    ctx: &RunContext,
    run_md: Option<&Map<String, Value>>,
    stores: &[Box<dyn ShardStore>],
    progress: &SharedProgress,
    cancel: &CancelToken,
) -> DatasetReport {
    let mut counters = DatasetCounters::default();
    let pb = progress.dataset_bar(&spec.output_path);

    let opened = match spec.source.open() {
        Ok(o) => o,
        Err(e) => {
            pb.finish_and_clear();
            return DatasetReport {
                dataset: spec.output_path.clone(),
                counters,
                error: Some(format!("source {}: {e}", spec.source.describe())),
            };
        }
    };
    let byte_counter = opened.byte_progress.map(|(counter, total)| {
        upgrade_to_bytes(&pb, total);
        counter
    });

    // Test mode is only a row cap at the enumeration boundary
    let rows: Box<dyn Iterator<Item = Result<_, SourceError>>> = match spec.row_cap {
        Some(cap) => Box::new(opened.rows.take(cap)),
        None => Box::new(opened.rows),
    };

    let tagger = opts
        .masking
        .enabled
        .then(|| tagger_by_id(&opts.masking.tagger_id).expect("tagger validated at startup"));

    let mut writer = ShardWriter::new(
        &spec.output_path,
        &ctx.run_id,
        opts.shard_limits,
        opts.dup_policy,
        stores,
        &opts.spill_dir,
        opts.dispatch_retries,
    );

    let mut fatal: Option<String> = None;
    for (ordinal, row) in rows.enumerate() {
        // Cancellation is honored only between rows
        if cancel.is_cancelled() {
            log::info!("{}: cancelled at row {}", spec.output_path, ordinal);
            break;
        }
        counters.rows_seen += 1;
        match &byte_counter {
            Some(counter) => pb.set_position(counter.load(std::sync::atomic::Ordering::Relaxed)),
            None => pb.set_position(counters.rows_seen as u64),
        }

        let row = match row {
            Ok(r) => r,
            Err(e @ SourceError::Parse { .. }) => {
                log::debug!("{}: skipping row {}: {e}", spec.output_path, ordinal);
                counters.rows_skipped += 1;
                continue;
            }
            Err(e) => {
                // Stream and read failures poison the iterator; a dead
                // connection would otherwise skip-loop forever
                log::error!("{}: source failed at row {}: {e}", spec.output_path, ordinal);
                fatal = Some(format!("source {}: {e}", spec.source.describe()));
                break;
            }
        };

        let Some(raw_text) = text_of(&row, &spec.text_field) else {
            log::debug!(
                "{}: row {} missing text field '{}'",
                spec.output_path,
                ordinal,
                spec.text_field
            );
            counters.rows_skipped += 1;
            continue;
        };

        let text = if opts.normalize_enabled {
            normalize(raw_text)
        } else {
            raw_text.to_string()
        };

        let masked = match apply_masking(text, tagger.as_deref(), &opts.masking, &mut counters) {
            Some(m) => m,
            None => continue,
        };

        if masked.total_spans() > 0 {
            counters.rows_masked += 1;
            for (label, n) in &masked.span_counts {
                *counters.spans.entry(label.clone()).or_default() += n;
            }
        }

        if masked.text.is_empty() && !opts.keep_empty {
            counters.rows_empty += 1;
            continue;
        }

        // Per-record masking stats ride along with the static derived fields
        let mut derived = spec.derived.clone();
        if tagger.is_some() {
            derived.insert("pii_masked".to_string(), Value::Bool(masked.total_spans() > 0));
            derived.insert("pii_span_count".to_string(), Value::from(masked.total_spans()));
        }
        let metadata = merge_metadata(&opts.global_metadata, &spec.metadata, &derived, run_md);
        let doc = assemble(
            &spec.name,
            ctx,
            ordinal,
            &spec.id_policy,
            &row,
            masked.text,
            metadata,
        );

        if let Err(e) = writer.append(&doc) {
            log::error!("{}: {e}", spec.output_path);
            fatal = Some(e.to_string());
            break;
        }
        counters.docs_written += 1;
    }

    // Flush the open shard even on cancellation or abort, and keep the
    // outcomes of shards dispatched before the failure
    let outcomes = writer.finish();
    counters.shards = outcomes.len();
    for outcome in &outcomes {
        if !outcome.fully_stored() {
            counters.dispatch_failures += 1;
        }
        if outcome.spilled.is_some() {
            counters.shards_spilled += 1;
        }
    }

    pb.finish_and_clear();
    if fatal.is_none() {
        log::info!(
            "{}: {} docs in {} shards ({} rows seen, {} skipped, {} masked)",
            spec.output_path,
            fmt_num(counters.docs_written),
            counters.shards,
            fmt_num(counters.rows_seen),
            counters.rows_skipped,
            counters.rows_masked,
        );
    }

    DatasetReport {
        dataset: spec.output_path.clone(),
        counters,
        error: fatal,
    }
}

/// Masking stage for one row. `None` means the document is dropped under
/// the `drop` tag-failure policy.
fn apply_masking(
    text: String,
    tagger: Option<&dyn Tagger>,
    masking: &MaskingOptions,
    counters: &mut DatasetCounters,
) -> Option<MaskedResult> {
    let Some(tagger) = tagger else {
        return Some(MaskedResult::passthrough(text));
    };
    match mask(&text, tagger, &masking.mask_token) {
        Ok(result) => Some(result),
        Err(e) => {
            log::debug!("tagger '{}': {e}", tagger.id());
            counters.tag_errors += 1;
            match masking.on_error {
                TagFailurePolicy::Drop => None,
                TagFailurePolicy::MaskEmpty => Some(MaskedResult::passthrough(String::new())),
            }
        }
    }
}

fn log_summary(summary: &RunSummary) {
    log::info!("=== Run Summary ===");
    for report in &summary.datasets {
        let c = &report.counters;
        match &report.error {
            Some(e) => log::error!("{}: FAILED: {e}", report.dataset),
            None => log::info!(
                "{}: {} docs, {} shards ({} spilled), {} skipped, {} tag errors, {} spans",
                report.dataset,
                fmt_num(c.docs_written),
                c.shards,
                c.shards_spilled,
                c.rows_skipped,
                c.tag_errors,
                fmt_num(c.total_spans()),
            ),
        }
    }
    log::info!(
        "Total: {} docs in {} shards, {:.1}s{}",
        fmt_num(summary.total_docs()),
        summary.total_shards(),
        summary.elapsed.as_secs_f64(),
        if summary.cancelled { " (cancelled)" } else { "" }
    );
}
