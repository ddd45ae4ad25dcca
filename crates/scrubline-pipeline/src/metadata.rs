//! Metadata assembly: precedence merge and run-identifying fields.

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{Map, Value};

use crate::error::ConfigError;

/// Run-identifying state, created once at run start and threaded
/// explicitly through the pipeline (no ambient globals).
#[derive(Debug, Clone)]
pub struct RunContext {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub mode: String,
    pub storage_mode: String,
    pub config_path: Option<String>,
    pub bucket: Option<String>,
    pub prefix: Option<String>,
}

impl RunContext {
    /// Run timestamp in RFC 3339, used for `created`/`added` fields.
    pub fn timestamp(&self) -> String {
        self.started_at.to_rfc3339_opts(SecondsFormat::Secs, true)
    }
}

/// Fields a run-metadata `include` list may name.
pub const RUN_FIELDS: &[&str] = &[
    "run_id",
    "started_at",
    "config_path",
    "mode",
    "storage_mode",
    "bucket",
    "prefix",
    "pipeline_version",
];

/// Validate a run-metadata include list against the allow-list.
///
/// Surfaced at run start, never per document.
pub fn validate_run_fields(include: &[String]) -> Result<(), ConfigError> {
    for field in include {
        if !RUN_FIELDS.contains(&field.as_str()) {
            return Err(ConfigError::new(format!(
                "unknown run metadata field '{field}' (allowed: {})",
                RUN_FIELDS.join(", ")
            )));
        }
    }
    Ok(())
}

/// Build the `run` metadata sub-object from the allow-listed fields.
///
/// `include = None` means all fields. Call [`validate_run_fields`] first;
/// unknown names here are silently skipped.
pub fn run_metadata(ctx: &RunContext, include: Option<&[String]>) -> Map<String, Value> {
    let keep = |key: &str| include.is_none_or(|list| list.iter().any(|f| f == key));

    let mut md = Map::new();
    if keep("run_id") {
        md.insert("run_id".into(), Value::String(ctx.run_id.clone()));
    }
    if keep("started_at") {
        md.insert("started_at".into(), Value::String(ctx.timestamp()));
    }
    if keep("config_path") {
        if let Some(path) = &ctx.config_path {
            md.insert("config_path".into(), Value::String(path.clone()));
        }
    }
    if keep("mode") {
        md.insert("mode".into(), Value::String(ctx.mode.clone()));
    }
    if keep("storage_mode") {
        md.insert("storage_mode".into(), Value::String(ctx.storage_mode.clone()));
    }
    if keep("bucket") {
        if let Some(bucket) = &ctx.bucket {
            md.insert("bucket".into(), Value::String(bucket.clone()));
        }
    }
    if keep("prefix") {
        if let Some(prefix) = &ctx.prefix {
            md.insert("prefix".into(), Value::String(prefix.clone()));
        }
    }
    if keep("pipeline_version") {
        md.insert(
            "pipeline_version".into(),
            Value::String(crate::PIPELINE_VERSION.to_string()),
        );
    }
    md
}

/// Merge metadata sources in increasing precedence: global config,
/// per-dataset config, derived per-record fields, then the `run`
/// sub-object. Later sources overwrite earlier keys on collision; that
/// precedence is the contract, not an accident.
pub fn merge_metadata(
    global: &Map<String, Value>,
    dataset: &Map<String, Value>,
    derived: &Map<String, Value>,
    run: Option<&Map<String, Value>>,
) -> Map<String, Value> {
    let mut merged = global.clone();
    for (k, v) in dataset {
        merged.insert(k.clone(), v.clone());
    }
    for (k, v) in derived {
        merged.insert(k.clone(), v.clone());
    }
    if let Some(run) = run {
        // Merge into any pre-existing `run` object rather than clobbering it
        let entry = merged
            .entry("run".to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        if let Value::Object(existing) = entry {
            for (k, v) in run {
                existing.insert(k.clone(), v.clone());
            }
        } else {
            *entry = Value::Object(run.clone());
        }
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ctx() -> RunContext {
        RunContext {
            run_id: "run-abc".to_string(),
            started_at: DateTime::parse_from_rfc3339("2026-01-02T03:04:05Z")
                .unwrap()
                .with_timezone(&Utc),
            mode: "test".to_string(),
            storage_mode: "local".to_string(),
            config_path: Some("scrubline.toml".to_string()),
            bucket: None,
            prefix: Some("corpus".to_string()),
        }
    }

    fn obj(v: Value) -> Map<String, Value> {
        match v {
            Value::Object(m) => m,
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn precedence_low_to_high() {
        let global = obj(json!({"a": 1}));
        let dataset = obj(json!({"a": 2, "b": 3}));
        let derived = obj(json!({"b": 4}));
        let merged = merge_metadata(&global, &dataset, &derived, None);
        assert_eq!(Value::Object(merged), json!({"a": 2, "b": 4}));
    }

    #[test]
    fn run_object_attached_last() {
        let empty = Map::new();
        let run = obj(json!({"run_id": "r1"}));
        let merged = merge_metadata(&empty, &empty, &empty, Some(&run));
        assert_eq!(merged["run"], json!({"run_id": "r1"}));
    }

    #[test]
    fn run_object_merges_into_existing() {
        let dataset = obj(json!({"run": {"note": "keep me"}}));
        let empty = Map::new();
        let run = obj(json!({"run_id": "r1"}));
        let merged = merge_metadata(&empty, &dataset, &empty, Some(&run));
        assert_eq!(merged["run"], json!({"note": "keep me", "run_id": "r1"}));
    }

    #[test]
    fn run_replaces_non_object_run_key() {
        let dataset = obj(json!({"run": "oops"}));
        let empty = Map::new();
        let run = obj(json!({"run_id": "r1"}));
        let merged = merge_metadata(&empty, &dataset, &empty, Some(&run));
        assert_eq!(merged["run"], json!({"run_id": "r1"}));
    }

    #[test]
    fn validate_accepts_known_fields() {
        let include = vec!["run_id".to_string(), "storage_mode".to_string()];
        assert!(validate_run_fields(&include).is_ok());
    }

    #[test]
    fn validate_rejects_unknown_field() {
        let include = vec!["hostname".to_string()];
        let err = validate_run_fields(&include).unwrap_err();
        assert!(format!("{err}").contains("hostname"));
    }

    #[test]
    fn run_metadata_respects_include() {
        let include = vec!["run_id".to_string(), "mode".to_string()];
        let md = run_metadata(&ctx(), Some(&include));
        assert_eq!(md.len(), 2);
        assert_eq!(md["run_id"], json!("run-abc"));
        assert_eq!(md["mode"], json!("test"));
    }

    #[test]
    fn run_metadata_full_set() {
        let md = run_metadata(&ctx(), None);
        assert_eq!(md["started_at"], json!("2026-01-02T03:04:05Z"));
        assert_eq!(md["storage_mode"], json!("local"));
        assert_eq!(md["prefix"], json!("corpus"));
        // bucket unset → omitted
        assert!(!md.contains_key("bucket"));
        assert_eq!(md["pipeline_version"], json!(crate::PIPELINE_VERSION));
    }
}
