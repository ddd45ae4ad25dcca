//! Scrubline Pipeline - the record processing core
//!
//! Turns raw rows from streaming dataset sources into normalized,
//! PII-masked, metadata-enriched JSON-Lines documents, sharded and
//! dispatched to storage backends.
//!
//! Data flows strictly forward:
//! row → normalize → mask → metadata → document → shard → store.

pub mod document;
pub mod error;
pub mod mask;
pub mod metadata;
pub mod normalize;
pub mod runner;
pub mod shard;
pub mod source;
pub mod summary;
pub mod tagger;

// Re-exports for convenience
pub use document::{Document, IdPolicy, assemble};
pub use error::ConfigError;
pub use mask::{MaskedResult, mask, resolve_spans};
pub use metadata::{RunContext, merge_metadata, run_metadata, validate_run_fields};
pub use normalize::normalize;
pub use runner::{DatasetSpec, MaskingOptions, RunOptions, TagFailurePolicy, run};
pub use shard::{DuplicateIdPolicy, ShardLimits, ShardOutcome, ShardWriter};
pub use source::{JsonlFileSource, RawRow, RemoteJsonlSource, RowSource, SourceError};
pub use summary::{DatasetCounters, DatasetReport, RunSummary};
pub use tagger::{SpanMatch, TagError, Tagger, tagger_by_id, tagger_ids};

/// Version stamped into every emitted document and the run metadata.
pub const PIPELINE_VERSION: &str = env!("CARGO_PKG_VERSION");
