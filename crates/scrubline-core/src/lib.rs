//! Scrubline Core - Shared infrastructure for text sanitization pipelines
//!
//! This crate provides the pieces that are independent of any particular
//! dataset: HTTP streaming, storage backends with retry, progress
//! reporting, logging, and cancellation.

pub mod cancel;
pub mod logging;
pub mod progress;
pub mod retry;
pub mod store;
pub mod stream;

// Re-exports for convenience
pub use cancel::CancelToken;
pub use logging::{IndicatifLogger, init_logging};
pub use progress::{ProgressContext, SharedProgress, fmt_num};
pub use retry::{backoff_duration, retry_with_backoff};
pub use store::{LocalDirStore, ObjectStore, ShardStore, StoreError, spill_shard};
pub use stream::{ByteCounter, GzipLineReader, StreamError, http_client, open_gzip_reader};
