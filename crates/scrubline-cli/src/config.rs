//! Configuration loading from TOML files

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::{Map, Value};

/// Full configuration for a scrubline run
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// `test` caps each dataset at its `test_limit`; `full` does not
    pub mode: String,
    pub storage: StorageConfig,
    pub remote: RemoteConfig,
    pub shard: ShardConfig,
    pub processing: ProcessingConfig,
    pub workers: WorkersConfig,
    pub datasets: BTreeMap<String, DatasetConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            mode: "full".to_string(),
            storage: StorageConfig::default(),
            remote: RemoteConfig::default(),
            shard: ShardConfig::default(),
            processing: ProcessingConfig::default(),
            workers: WorkersConfig::default(),
            datasets: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// local | remote | both
    pub mode: String,
    pub local_dir: PathBuf,
    /// Defaults to `{local_dir}/spill`
    pub spill_dir: Option<PathBuf>,
    /// Retry attempts per backend per shard
    pub max_retries: u32,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            mode: "local".to_string(),
            local_dir: PathBuf::from("./data"),
            spill_dir: None,
            max_retries: 3,
        }
    }
}

impl StorageConfig {
    pub fn spill_dir(&self) -> PathBuf {
        self.spill_dir
            .clone()
            .unwrap_or_else(|| self.local_dir.join("spill"))
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct RemoteConfig {
    /// Object-store endpoint; required when storage mode includes remote
    pub base_url: Option<String>,
    /// Key prefix under the endpoint
    pub prefix: Option<String>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct ShardConfig {
    pub max_records: usize,
    pub max_bytes: usize,
}

impl Default for ShardConfig {
    fn default() -> Self {
        Self {
            max_records: 10_000,
            max_bytes: 64 * 1024 * 1024,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ProcessingConfig {
    pub enabled: bool,
    pub normalize: NormalizeConfig,
    pub masking: MaskingConfig,
    /// Emit documents that are empty after masking
    pub keep_empty: bool,
    /// Global metadata attached to every document (lowest precedence)
    pub metadata: Map<String, Value>,
    pub run_metadata: RunMetadataConfig,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            normalize: NormalizeConfig::default(),
            masking: MaskingConfig::default(),
            keep_empty: false,
            metadata: Map::new(),
            run_metadata: RunMetadataConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct NormalizeConfig {
    pub enabled: bool,
}

impl Default for NormalizeConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MaskingConfig {
    pub enabled: bool,
    pub tagger: String,
    pub mask_token: String,
    /// mask_empty | drop
    pub on_error: String,
}

impl Default for MaskingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            tagger: "pii_regex".to_string(),
            mask_token: "<PII>".to_string(),
            on_error: "mask_empty".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct RunMetadataConfig {
    pub enabled: bool,
    /// Allow-listed fields to include; omitted = all
    pub include: Option<Vec<String>>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct WorkersConfig {
    pub default: usize,
    pub max: usize,
}

impl Default for WorkersConfig {
    fn default() -> Self {
        let cpus = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(4);
        Self {
            default: cpus.min(4),
            max: 8,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct DatasetConfig {
    /// Local JSONL file (plain or .gz); exactly one of path/url
    pub path: Option<PathBuf>,
    /// Remote gzipped JSONL URL
    pub url: Option<String>,
    pub text_field: Option<String>,
    /// ordinal | content-hash | field:<name>
    pub id: Option<String>,
    /// Expand into one sub-run per language; `{lang}` in path/url is
    /// substituted and `metadata.lang` derived
    pub languages: Option<Vec<String>>,
    /// Per-dataset metadata (overrides global keys)
    pub metadata: Map<String, Value>,
    /// Row cap applied in test mode
    pub test_limit: Option<usize>,
}

impl DatasetConfig {
    pub fn text_field(&self) -> &str {
        self.text_field.as_deref().unwrap_or("text")
    }

    pub fn id(&self) -> &str {
        self.id.as_deref().unwrap_or("ordinal")
    }
}

impl Config {
    /// Load from explicit path.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config: {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("failed to parse config: {}", path.display()))
    }

    /// Load from default locations: ./scrubline.toml, then
    /// ~/.config/scrubline/config.toml, then built-in defaults.
    pub fn load() -> Result<Self> {
        let local = PathBuf::from("scrubline.toml");
        if local.exists() {
            return Self::from_file(&local);
        }

        if let Some(dirs) = directories::ProjectDirs::from("", "", "scrubline") {
            let user = dirs.config_dir().join("config.toml");
            if user.exists() {
                return Self::from_file(&user);
            }
        }

        Ok(Self::default())
    }
}
