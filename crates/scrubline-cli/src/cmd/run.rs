//! Run subcommand - process all configured datasets

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use chrono::Utc;
use clap::Args;
use comfy_table::{Cell, Color, Table, modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL};

use scrubline_core::store::{LocalDirStore, ObjectStore, ShardStore};
use scrubline_core::{CancelToken, SharedProgress};
use scrubline_pipeline::runner::{DatasetSpec, MaskingOptions, RunOptions, TagFailurePolicy};
use scrubline_pipeline::source::{JsonlFileSource, RemoteJsonlSource, RowSource};
use scrubline_pipeline::{
    ConfigError, DuplicateIdPolicy, IdPolicy, RunContext, RunSummary, ShardLimits,
};

use crate::config::{Config, DatasetConfig};

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Override config mode (test | full)
    #[arg(short, long)]
    pub mode: Option<String>,

    /// Override storage mode (local | remote | both)
    #[arg(short, long)]
    pub storage: Option<String>,

    /// Override local output directory
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Row cap per dataset (overrides per-dataset test_limit)
    #[arg(short = 'l', long)]
    pub limit: Option<usize>,

    /// Number of parallel dataset workers
    #[arg(short, long)]
    pub workers: Option<usize>,

    /// Duplicate document id policy (fail | overwrite)
    #[arg(long)]
    pub duplicate_ids: Option<String>,
}

pub fn run(
    args: RunArgs,
    config: &Config,
    config_path: Option<&Path>,
    progress: &SharedProgress,
) -> Result<()> {
    // CLI overrides on top of file config
    let mut config = config.clone();
    if let Some(mode) = args.mode {
        config.mode = mode;
    }
    if let Some(storage) = args.storage {
        config.storage.mode = storage;
    }
    if let Some(output) = args.output {
        config.storage.local_dir = output;
    }

    // All ConfigError paths surface here, before any row is pulled
    let opts = build_options(&config, &args.workers, args.duplicate_ids.as_deref())?;
    let specs = build_specs(&config, args.limit)?;
    let stores = build_stores(&config)?;

    let ctx = RunContext {
        run_id: uuid::Uuid::new_v4().to_string(),
        started_at: Utc::now(),
        mode: config.mode.clone(),
        storage_mode: config.storage.mode.clone(),
        config_path: config_path.map(|p| p.display().to_string()),
        bucket: config.remote.base_url.clone(),
        prefix: config.remote.prefix.clone(),
    };

    // SIGINT/SIGTERM finish the current row, flush open shards, then exit
    let cancel = CancelToken::new();
    signal_hook::flag::register(signal_hook::consts::SIGINT, cancel.flag())
        .context("failed to register SIGINT handler")?;
    signal_hook::flag::register(signal_hook::consts::SIGTERM, cancel.flag())
        .context("failed to register SIGTERM handler")?;

    log::info!(
        "Starting run {} ({} datasets, mode {}, storage {})",
        ctx.run_id,
        specs.len(),
        ctx.mode,
        ctx.storage_mode
    );

    let summary = scrubline_pipeline::run(&specs, &opts, &ctx, &stores, progress, &cancel)?;
    print_summary(&summary, progress);

    if summary.has_failures() {
        bail!("run completed with failures (see summary)");
    }
    Ok(())
}

fn build_options(
    config: &Config,
    workers: &Option<usize>,
    duplicate_ids: Option<&str>,
) -> Result<RunOptions> {
    let processing = &config.processing;
    let masking = MaskingOptions {
        enabled: processing.enabled && processing.masking.enabled,
        tagger_id: processing.masking.tagger.clone(),
        mask_token: processing.masking.mask_token.clone(),
        on_error: TagFailurePolicy::parse(&processing.masking.on_error)?,
    };

    let dup_policy = match duplicate_ids {
        Some(s) => DuplicateIdPolicy::parse(s)?,
        None => DuplicateIdPolicy::Fail,
    };

    let workers = workers
        .unwrap_or(config.workers.default)
        .clamp(1, config.workers.max);

    Ok(RunOptions {
        normalize_enabled: processing.enabled && processing.normalize.enabled,
        masking,
        keep_empty: processing.keep_empty,
        shard_limits: ShardLimits {
            max_records: config.shard.max_records,
            max_bytes: config.shard.max_bytes,
        },
        dup_policy,
        global_metadata: processing.metadata.clone(),
        run_metadata_enabled: processing.run_metadata.enabled,
        run_metadata_include: processing.run_metadata.include.clone(),
        dispatch_retries: config.storage.max_retries,
        spill_dir: config.storage.spill_dir(),
        workers,
    })
}

fn source_for(name: &str, dcfg: &DatasetConfig, lang: Option<&str>) -> Result<Box<dyn RowSource>> {
    let substitute = |s: &str| match lang {
        Some(lang) => s.replace("{lang}", lang),
        None => s.to_string(),
    };

    match (&dcfg.path, &dcfg.url) {
        (Some(path), None) => Ok(Box::new(JsonlFileSource::new(substitute(
            &path.display().to_string(),
        )))),
        (None, Some(url)) => Ok(Box::new(RemoteJsonlSource::new(substitute(url)))),
        (Some(_), Some(_)) => Err(ConfigError::new(format!(
            "dataset '{name}': set either path or url, not both"
        ))
        .into()),
        (None, None) => {
            Err(ConfigError::new(format!("dataset '{name}': missing path or url")).into())
        }
    }
}

/// Expand dataset configs into runner specs, one per language variant.
fn build_specs(config: &Config, limit_override: Option<usize>) -> Result<Vec<DatasetSpec>> {
    let test_mode = match config.mode.as_str() {
        "test" => true,
        "full" => false,
        other => bail!(ConfigError::new(format!(
            "invalid mode '{other}' (expected test or full)"
        ))),
    };

    let mut specs = Vec::new();
    for (name, dcfg) in &config.datasets {
        let id_policy = IdPolicy::parse(dcfg.id())
            .map_err(|e| anyhow::anyhow!("dataset '{name}': {e}"))?;
        let row_cap = if test_mode {
            limit_override.or(dcfg.test_limit)
        } else {
            limit_override
        };

        let variants: Vec<Option<&str>> = match &dcfg.languages {
            Some(langs) => langs.iter().map(|l| Some(l.as_str())).collect(),
            None => vec![None],
        };

        for lang in variants {
            let mut derived = serde_json::Map::new();
            let output_path = match lang {
                Some(lang) => {
                    derived.insert("lang".to_string(), serde_json::Value::String(lang.into()));
                    format!("{name}/{lang}")
                }
                None => name.clone(),
            };

            specs.push(DatasetSpec {
                name: name.clone(),
                source: source_for(name, dcfg, lang)?,
                text_field: dcfg.text_field().to_string(),
                id_policy: id_policy.clone(),
                metadata: dcfg.metadata.clone(),
                derived,
                output_path,
                row_cap,
            });
        }
    }
    Ok(specs)
}

fn build_stores(config: &Config) -> Result<Vec<Box<dyn ShardStore>>> {
    let (local, remote) = match config.storage.mode.as_str() {
        "local" => (true, false),
        "remote" => (false, true),
        "both" => (true, true),
        other => bail!(ConfigError::new(format!(
            "invalid storage mode '{other}' (expected local, remote, or both)"
        ))),
    };

    let mut stores: Vec<Box<dyn ShardStore>> = Vec::new();
    if local {
        stores.push(Box::new(LocalDirStore::new(&config.storage.local_dir)));
    }
    if remote {
        let base_url = config
            .remote
            .base_url
            .as_deref()
            .ok_or_else(|| ConfigError::new("storage mode includes remote but remote.base_url is not set"))?;
        let endpoint = match config.remote.prefix.as_deref() {
            Some(prefix) => format!("{}/{}", base_url.trim_end_matches('/'), prefix),
            None => base_url.to_string(),
        };
        stores.push(Box::new(ObjectStore::new(endpoint)));
    }
    Ok(stores)
}

fn print_summary(summary: &RunSummary, progress: &SharedProgress) {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_header(vec![
            Cell::new("Dataset").fg(Color::Cyan),
            Cell::new("Docs").fg(Color::Cyan),
            Cell::new("Shards").fg(Color::Cyan),
            Cell::new("Skipped").fg(Color::Cyan),
            Cell::new("Masked").fg(Color::Cyan),
            Cell::new("Spans").fg(Color::Cyan),
            Cell::new("Status").fg(Color::Cyan),
        ]);

    for report in &summary.datasets {
        let c = &report.counters;
        let status = match &report.error {
            Some(e) => Cell::new(format!("FAILED: {e}")).fg(Color::Red),
            None if c.dispatch_failures > 0 => {
                Cell::new(format!("{} dispatch failures", c.dispatch_failures)).fg(Color::Yellow)
            }
            None => Cell::new("ok").fg(Color::Green),
        };
        table.add_row(vec![
            Cell::new(&report.dataset),
            Cell::new(c.docs_written),
            Cell::new(c.shards),
            Cell::new(c.rows_skipped),
            Cell::new(c.rows_masked),
            Cell::new(c.total_spans()),
            status,
        ]);
    }

    progress.println(format!("\n{table}"));
    progress.println(format!(
        "Run finished in {:.1}s{}",
        summary.elapsed.as_secs_f64(),
        if summary.cancelled { " (cancelled)" } else { "" }
    ));
}
