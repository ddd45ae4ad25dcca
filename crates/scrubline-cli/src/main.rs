//! scrubline - streaming text sanitization pipeline
//!
//! Pulls text records from dataset sources, normalizes and PII-masks
//! them, and writes JSON-Lines shards to local and/or remote storage.

use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};

mod cmd;
mod config;

use config::Config;

#[derive(Parser)]
#[command(name = "scrubline")]
#[command(about = "Normalize, mask, and shard streaming text datasets")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Enable debug logging
    #[arg(long, global = true)]
    debug: bool,

    /// Config file path (default: ./scrubline.toml or ~/.config/scrubline/config.toml)
    #[arg(short, long, global = true)]
    config: Option<std::path::PathBuf>,
}

#[derive(Subcommand)]
enum Command {
    /// Process all configured datasets
    Run(cmd::run::RunArgs),
    /// List registered tagger identifiers
    Taggers,
    /// Show current configuration
    Config,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Progress context (TTY auto-detect)
    let progress = Arc::new(scrubline_core::ProgressContext::new());

    // Logging:
    //   TTY:     quiet (warn) unless --debug  — progress bars show activity
    //   non-TTY: info unless --debug          — logs are the only progress indicator
    let is_tty = progress.is_tty();
    let multi = if is_tty { Some(progress.multi()) } else { None };
    let quiet = if is_tty { !cli.debug } else { false };
    scrubline_core::init_logging(quiet, cli.debug, multi);

    let config_path = cli.config.clone();
    let config = match &config_path {
        Some(path) => Config::from_file(path)?,
        None => Config::load()?,
    };

    match cli.command {
        Command::Run(args) => cmd::run::run(args, &config, config_path.as_deref(), &progress),
        Command::Taggers => {
            for id in scrubline_pipeline::tagger_ids() {
                println!("{id}");
            }
            Ok(())
        }
        Command::Config => {
            use comfy_table::{
                Cell, Color, Table, modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL,
            };

            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .apply_modifier(UTF8_ROUND_CORNERS)
                .set_header(vec![
                    Cell::new("Setting").fg(Color::Cyan),
                    Cell::new("Value").fg(Color::Cyan),
                ]);

            table.add_row(vec!["Mode", &config.mode]);
            table.add_row(vec!["Storage mode", &config.storage.mode]);
            table.add_row(vec![
                "Local dir",
                &config.storage.local_dir.display().to_string(),
            ]);
            table.add_row(vec![
                "Spill dir",
                &config.storage.spill_dir().display().to_string(),
            ]);
            table.add_row(vec![
                "Remote endpoint",
                config.remote.base_url.as_deref().unwrap_or("not set"),
            ]);
            table.add_row(vec![
                "Shard limits",
                &format!(
                    "{} records / {} bytes",
                    config.shard.max_records, config.shard.max_bytes
                ),
            ]);
            table.add_row(vec![
                "Masking",
                &if config.processing.masking.enabled {
                    format!(
                        "{} (token {})",
                        config.processing.masking.tagger, config.processing.masking.mask_token
                    )
                } else {
                    "disabled".to_string()
                },
            ]);
            table.add_row(vec![
                "Workers",
                &format!("{} (max: {})", config.workers.default, config.workers.max),
            ]);
            table.add_row(vec!["Datasets", &config.datasets.len().to_string()]);

            eprintln!("\n{table}");
            Ok(())
        }
    }
}
