//! Document assembly: the canonical output record.

use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::ConfigError;
use crate::metadata::RunContext;
use crate::source::RawRow;

/// One output record, serialized as a single JSON line.
///
/// Consumers must not rely on key ordering.
#[derive(Debug, Clone, Serialize)]
pub struct Document {
    pub id: String,
    pub text: String,
    pub source: String,
    pub created: String,
    pub added: String,
    pub version: String,
    pub metadata: Map<String, Value>,
}

/// How document ids are derived, per dataset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdPolicy {
    /// `{dataset}:{run_id}:{ordinal}` — reproducible across re-runs of
    /// the same row sequence. The default.
    Ordinal,
    /// Natural id taken from a named row field; rows without the field
    /// fall back to a content hash.
    Field(String),
    /// blake3 over dataset id + text.
    ContentHash,
}

impl IdPolicy {
    /// Parse the config form: `ordinal`, `content-hash`, or `field:<name>`.
    pub fn parse(s: &str) -> Result<Self, ConfigError> {
        match s {
            "ordinal" => Ok(Self::Ordinal),
            "content-hash" => Ok(Self::ContentHash),
            other => match other.strip_prefix("field:") {
                Some(name) if !name.is_empty() => Ok(Self::Field(name.to_string())),
                _ => Err(ConfigError::new(format!(
                    "invalid id policy '{other}' (expected ordinal, content-hash, or field:<name>)"
                ))),
            },
        }
    }
}

/// Content-derived id: blake3 over dataset id and text.
pub fn content_id(dataset: &str, text: &str) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(dataset.as_bytes());
    hasher.update(b"\0");
    hasher.update(text.as_bytes());
    hasher.finalize().to_hex().to_string()
}

fn field_id(row: &RawRow, field: &str) -> Option<String> {
    match row.get(field)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Assemble the final document from the processed text and its context.
///
/// `ordinal` is the row's position in source-emission order, which makes
/// ordinal ids reproducible on re-runs.
pub fn assemble(
    dataset: &str,
    ctx: &RunContext,
    ordinal: usize,
    policy: &IdPolicy,
    row: &RawRow,
    text: String,
    metadata: Map<String, Value>,
) -> Document {
    let id = match policy {
        IdPolicy::Ordinal => format!("{dataset}:{}:{ordinal}", ctx.run_id),
        IdPolicy::Field(name) => {
            field_id(row, name).unwrap_or_else(|| content_id(dataset, &text))
        }
        IdPolicy::ContentHash => content_id(dataset, &text),
    };

    let timestamp = ctx.timestamp();
    Document {
        id,
        text,
        source: dataset.to_string(),
        created: timestamp.clone(),
        added: timestamp,
        version: crate::PIPELINE_VERSION.to_string(),
        metadata,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Utc};

    fn ctx() -> RunContext {
        RunContext {
            run_id: "r1".to_string(),
            started_at: DateTime::parse_from_rfc3339("2026-01-02T03:04:05Z")
                .unwrap()
                .with_timezone(&Utc),
            mode: "test".to_string(),
            storage_mode: "local".to_string(),
            config_path: None,
            bucket: None,
            prefix: None,
        }
    }

    fn row(json: serde_json::Value) -> RawRow {
        match json {
            serde_json::Value::Object(m) => m,
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn id_policy_parse() {
        assert_eq!(IdPolicy::parse("ordinal").unwrap(), IdPolicy::Ordinal);
        assert_eq!(IdPolicy::parse("content-hash").unwrap(), IdPolicy::ContentHash);
        assert_eq!(
            IdPolicy::parse("field:doc_id").unwrap(),
            IdPolicy::Field("doc_id".to_string())
        );
        assert!(IdPolicy::parse("field:").is_err());
        assert!(IdPolicy::parse("natural").is_err());
    }

    #[test]
    fn ordinal_id_shape() {
        let doc = assemble(
            "wiki",
            &ctx(),
            7,
            &IdPolicy::Ordinal,
            &RawRow::new(),
            "hello".to_string(),
            Map::new(),
        );
        assert_eq!(doc.id, "wiki:r1:7");
    }

    #[test]
    fn ordinal_ids_reproducible() {
        for _ in 0..2 {
            let doc = assemble(
                "wiki",
                &ctx(),
                3,
                &IdPolicy::Ordinal,
                &RawRow::new(),
                "same".to_string(),
                Map::new(),
            );
            assert_eq!(doc.id, "wiki:r1:3");
        }
    }

    #[test]
    fn field_id_used_when_present() {
        let r = row(serde_json::json!({"doc_id": "abc-123", "text": "t"}));
        let doc = assemble(
            "wiki",
            &ctx(),
            0,
            &IdPolicy::Field("doc_id".to_string()),
            &r,
            "t".to_string(),
            Map::new(),
        );
        assert_eq!(doc.id, "abc-123");
    }

    #[test]
    fn field_id_numeric_stringified() {
        let r = row(serde_json::json!({"doc_id": 42}));
        let doc = assemble(
            "wiki",
            &ctx(),
            0,
            &IdPolicy::Field("doc_id".to_string()),
            &r,
            "t".to_string(),
            Map::new(),
        );
        assert_eq!(doc.id, "42");
    }

    #[test]
    fn field_id_missing_falls_back_to_hash() {
        let r = row(serde_json::json!({"other": 1}));
        let doc = assemble(
            "wiki",
            &ctx(),
            0,
            &IdPolicy::Field("doc_id".to_string()),
            &r,
            "t".to_string(),
            Map::new(),
        );
        assert_eq!(doc.id, content_id("wiki", "t"));
    }

    #[test]
    fn content_id_deterministic_and_keyed() {
        assert_eq!(content_id("a", "x"), content_id("a", "x"));
        assert_ne!(content_id("a", "x"), content_id("b", "x"));
        assert_ne!(content_id("a", "x"), content_id("a", "y"));
    }

    #[test]
    fn timestamps_from_run_context() {
        let doc = assemble(
            "wiki",
            &ctx(),
            0,
            &IdPolicy::Ordinal,
            &RawRow::new(),
            "t".to_string(),
            Map::new(),
        );
        assert_eq!(doc.created, "2026-01-02T03:04:05Z");
        assert_eq!(doc.created, doc.added);
    }

    #[test]
    fn serializes_to_flat_json_object() {
        let doc = assemble(
            "wiki",
            &ctx(),
            0,
            &IdPolicy::Ordinal,
            &RawRow::new(),
            "t".to_string(),
            Map::new(),
        );
        let line = serde_json::to_string(&doc).unwrap();
        let back: serde_json::Value = serde_json::from_str(&line).unwrap();
        assert_eq!(back["source"], "wiki");
        assert_eq!(back["text"], "t");
    }
}
