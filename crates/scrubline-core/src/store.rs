//! Storage backends for closed shards.
//!
//! A shard is a finished blob of JSONL bytes addressed by a key like
//! `dataset/run/part-00003.jsonl`. Backends only need to store bytes at a
//! key durably; everything else (rollover, retry, spill) happens above.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::stream::{StreamError, block_on, http_client};

/// Error from a single store attempt
#[derive(Debug)]
pub enum StoreError {
    Http {
        status: Option<u16>,
        message: String,
    },
    Io(io::Error),
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Http {
                status: Some(s),
                message,
            } => write!(f, "HTTP {s}: {message}"),
            Self::Http {
                status: None,
                message,
            } => write!(f, "HTTP error: {message}"),
            Self::Io(e) => write!(f, "IO: {e}"),
        }
    }
}

impl std::error::Error for StoreError {}

impl From<io::Error> for StoreError {
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}

impl StoreError {
    pub fn is_retryable(&self) -> bool {
        match self {
            // Auth/permission failures won't heal; throttling and 5xx will
            Self::Http { status, .. } => !matches!(status, Some(401) | Some(403) | Some(404)),
            Self::Io(e) => e.kind() != io::ErrorKind::StorageFull,
        }
    }
}

impl From<StreamError> for StoreError {
    fn from(e: StreamError) -> Self {
        match e {
            StreamError::Http { status, message } => Self::Http { status, message },
            StreamError::Io(e) => Self::Io(e),
        }
    }
}

/// Durably store shard bytes at a key.
///
/// Implementations must be safe to call repeatedly with the same key
/// (re-runs overwrite).
pub trait ShardStore: Send + Sync {
    /// Short backend name for logs and the run summary
    fn name(&self) -> &str;

    fn store(&self, key: &str, bytes: &[u8]) -> Result<(), StoreError>;
}

/// Local filesystem backend: `root/<key>`, written tmp→rename so a
/// crashed run never leaves a truncated shard at the final path.
pub struct LocalDirStore {
    root: PathBuf,
}

impl LocalDirStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl ShardStore for LocalDirStore {
    fn name(&self) -> &str {
        "local"
    }

    fn store(&self, key: &str, bytes: &[u8]) -> Result<(), StoreError> {
        let final_path = self.root.join(key);
        if let Some(parent) = final_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let tmp_path = final_path.with_extension("jsonl.tmp");
        fs::write(&tmp_path, bytes)?;
        fs::rename(&tmp_path, &final_path)?;
        Ok(())
    }
}

/// Remote object storage backend: HTTP PUT to `{base_url}/{key}`.
///
/// The endpoint is expected to behave like an object store (idempotent
/// PUT, 2xx on success). Credentials, if any, ride on the URL.
pub struct ObjectStore {
    base_url: String,
}

impl ObjectStore {
    pub fn new(base_url: impl Into<String>) -> Self {
        let mut base_url = base_url.into();
        while base_url.ends_with('/') {
            base_url.pop();
        }
        Self { base_url }
    }

    pub fn object_url(&self, key: &str) -> String {
        format!("{}/{}", self.base_url, key)
    }
}

impl ShardStore for ObjectStore {
    fn name(&self) -> &str {
        "remote"
    }

    fn store(&self, key: &str, bytes: &[u8]) -> Result<(), StoreError> {
        let url = self.object_url(key);
        let body = bytes.to_vec();
        block_on(async {
            http_client()
                .put(&url)
                .header(reqwest::header::CONTENT_TYPE, "application/x-ndjson")
                .body(body)
                .send()
                .await
                .and_then(|r| r.error_for_status())
                .map_err(|e| StoreError::Http {
                    status: e.status().map(|s| s.as_u16()),
                    message: e.to_string(),
                })?;
            Ok(())
        })
    }
}

/// Last-resort local copy of a shard whose backends all failed.
///
/// Keys are flattened (`/` → `_`) so the spill dir stays a single level.
/// Returns the spill path.
pub fn spill_shard(spill_dir: &Path, key: &str, bytes: &[u8]) -> io::Result<PathBuf> {
    fs::create_dir_all(spill_dir)?;
    let flat = key.replace('/', "_");
    let path = spill_dir.join(flat);
    fs::write(&path, bytes)?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn local_store_writes_under_key() {
        let dir = TempDir::new().unwrap();
        let store = LocalDirStore::new(dir.path());
        store
            .store("wiki/run-1/part-00000.jsonl", b"{\"id\":\"a\"}\n")
            .unwrap();

        let path = dir.path().join("wiki/run-1/part-00000.jsonl");
        assert_eq!(fs::read(path).unwrap(), b"{\"id\":\"a\"}\n");
    }

    #[test]
    fn local_store_leaves_no_tmp_file() {
        let dir = TempDir::new().unwrap();
        let store = LocalDirStore::new(dir.path());
        store.store("ds/r/part-00000.jsonl", b"x\n").unwrap();

        let entries: Vec<_> = fs::read_dir(dir.path().join("ds/r"))
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(entries, vec!["part-00000.jsonl"]);
    }

    #[test]
    fn local_store_overwrites_existing() {
        let dir = TempDir::new().unwrap();
        let store = LocalDirStore::new(dir.path());
        store.store("k.jsonl", b"old\n").unwrap();
        store.store("k.jsonl", b"new\n").unwrap();
        assert_eq!(fs::read(dir.path().join("k.jsonl")).unwrap(), b"new\n");
    }

    #[test]
    fn object_store_url_join() {
        let store = ObjectStore::new("https://bucket.example.com/corpus/");
        assert_eq!(
            store.object_url("wiki/run-1/part-00000.jsonl"),
            "https://bucket.example.com/corpus/wiki/run-1/part-00000.jsonl"
        );
    }

    #[test]
    fn spill_flattens_key() {
        let dir = TempDir::new().unwrap();
        let path = spill_shard(dir.path(), "wiki/run-1/part-00002.jsonl", b"data\n").unwrap();
        assert_eq!(
            path.file_name().unwrap().to_str().unwrap(),
            "wiki_run-1_part-00002.jsonl"
        );
        assert_eq!(fs::read(&path).unwrap(), b"data\n");
    }

    #[test]
    fn store_error_403_not_retryable() {
        let err = StoreError::Http {
            status: Some(403),
            message: "forbidden".to_string(),
        };
        assert!(!err.is_retryable());
    }

    #[test]
    fn store_error_503_retryable() {
        let err = StoreError::Http {
            status: Some(503),
            message: "unavailable".to_string(),
        };
        assert!(err.is_retryable());
    }

    #[test]
    fn store_error_disk_full_not_retryable() {
        let err = StoreError::Io(io::Error::new(io::ErrorKind::StorageFull, "full"));
        assert!(!err.is_retryable());
    }
}
