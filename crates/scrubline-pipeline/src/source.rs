//! Row sources: lazy sequences of raw records.
//!
//! A source yields JSON objects one at a time; the pipeline consumes them
//! in emission order until exhaustion or a configured row cap. Malformed
//! lines are row-level errors the runner skips and counts.

use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};

use flate2::read::GzDecoder;
use serde_json::Value;

use scrubline_core::stream::{ByteCounter, StreamError, open_gzip_reader};

/// One raw record: an opaque field→value mapping.
pub type RawRow = serde_json::Map<String, Value>;

/// Row-level source failure. The runner skips the row and counts it.
#[derive(Debug)]
pub enum SourceError {
    Stream(StreamError),
    Io(io::Error),
    /// A line that is not a JSON object (1-based line number)
    Parse {
        line: usize,
        message: String,
    },
}

impl std::fmt::Display for SourceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Stream(e) => write!(f, "{e}"),
            Self::Io(e) => write!(f, "IO: {e}"),
            Self::Parse { line, message } => write!(f, "line {line}: {message}"),
        }
    }
}

impl std::error::Error for SourceError {}

impl From<io::Error> for SourceError {
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<StreamError> for SourceError {
    fn from(e: StreamError) -> Self {
        Self::Stream(e)
    }
}

/// Boxed lazy row iterator.
pub type RowIter = Box<dyn Iterator<Item = Result<RawRow, SourceError>> + Send>;

/// An opened source: the rows plus optional byte progress for remote
/// streams (compressed bytes consumed, total when known).
pub struct OpenedSource {
    pub rows: RowIter,
    pub byte_progress: Option<(ByteCounter, u64)>,
}

/// Produces a lazy sequence of raw rows for one dataset.
pub trait RowSource: Send + Sync {
    /// Human-readable origin for logs.
    fn describe(&self) -> String;

    fn open(&self) -> Result<OpenedSource, SourceError>;
}

/// Parse a line reader into rows. Read failures and non-object lines
/// become per-row errors rather than ending the iterator.
fn parse_lines<R: BufRead + Send + 'static>(reader: R) -> RowIter {
    let iter = reader.lines().enumerate().filter_map(|(i, line)| {
        let line_no = i + 1;
        let line = match line {
            Ok(l) => l,
            Err(e) => return Some(Err(SourceError::Io(e))),
        };
        if line.trim().is_empty() {
            return None;
        }
        match serde_json::from_str::<Value>(&line) {
            Ok(Value::Object(map)) => Some(Ok(map)),
            Ok(_) => Some(Err(SourceError::Parse {
                line: line_no,
                message: "not a JSON object".to_string(),
            })),
            Err(e) => Some(Err(SourceError::Parse {
                line: line_no,
                message: e.to_string(),
            })),
        }
    });
    Box::new(iter)
}

/// Local JSONL file, gzipped or plain by extension.
pub struct JsonlFileSource {
    path: PathBuf,
}

impl JsonlFileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

fn is_gzip(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == "gz")
}

impl RowSource for JsonlFileSource {
    fn describe(&self) -> String {
        self.path.display().to_string()
    }

    fn open(&self) -> Result<OpenedSource, SourceError> {
        let file = File::open(&self.path)?;
        let rows = if is_gzip(&self.path) {
            parse_lines(BufReader::new(GzDecoder::new(file)))
        } else {
            parse_lines(BufReader::new(file))
        };
        Ok(OpenedSource {
            rows,
            byte_progress: None,
        })
    }
}

/// Remote gzipped JSONL over HTTP, streamed with stall detection.
pub struct RemoteJsonlSource {
    url: String,
}

impl RemoteJsonlSource {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

impl RowSource for RemoteJsonlSource {
    fn describe(&self) -> String {
        self.url.clone()
    }

    fn open(&self) -> Result<OpenedSource, SourceError> {
        let (reader, counter, total) = open_gzip_reader(&self.url)?;
        Ok(OpenedSource {
            rows: parse_lines(reader),
            byte_progress: total.map(|t| (counter, t)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    #[test]
    fn reads_plain_jsonl() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("rows.jsonl");
        std::fs::write(&path, "{\"text\":\"a\"}\n{\"text\":\"b\"}\n").unwrap();

        let source = JsonlFileSource::new(&path);
        let rows: Vec<_> = source.open().unwrap().rows.collect();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].as_ref().unwrap()["text"], "a");
        assert_eq!(rows[1].as_ref().unwrap()["text"], "b");
    }

    #[test]
    fn reads_gzipped_jsonl() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("rows.jsonl.gz");
        let file = File::create(&path).unwrap();
        let mut gz = flate2::write::GzEncoder::new(file, flate2::Compression::default());
        gz.write_all(b"{\"text\":\"zipped\"}\n").unwrap();
        gz.finish().unwrap();

        let source = JsonlFileSource::new(&path);
        let rows: Vec<_> = source.open().unwrap().rows.collect();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].as_ref().unwrap()["text"], "zipped");
    }

    #[test]
    fn blank_lines_skipped() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("rows.jsonl");
        std::fs::write(&path, "{\"a\":1}\n\n   \n{\"b\":2}\n").unwrap();

        let rows: Vec<_> = JsonlFileSource::new(&path).open().unwrap().rows.collect();
        assert_eq!(rows.len(), 2);
    }

    #[test]
    fn malformed_line_is_row_error_not_fatal() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("rows.jsonl");
        std::fs::write(&path, "{\"a\":1}\nnot json\n{\"b\":2}\n").unwrap();

        let rows: Vec<_> = JsonlFileSource::new(&path).open().unwrap().rows.collect();
        assert_eq!(rows.len(), 3);
        assert!(rows[0].is_ok());
        assert!(matches!(rows[1], Err(SourceError::Parse { line: 2, .. })));
        assert!(rows[2].is_ok());
    }

    #[test]
    fn non_object_json_is_row_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("rows.jsonl");
        std::fs::write(&path, "[1,2,3]\n").unwrap();

        let rows: Vec<_> = JsonlFileSource::new(&path).open().unwrap().rows.collect();
        assert!(matches!(rows[0], Err(SourceError::Parse { .. })));
    }

    #[test]
    fn missing_file_fails_open() {
        let source = JsonlFileSource::new("/nonexistent/rows.jsonl");
        assert!(source.open().is_err());
    }
}
