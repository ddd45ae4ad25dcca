//! Per-dataset counters and the run-level summary.

use std::collections::BTreeMap;
use std::time::Duration;

/// Counters for one dataset's pass. Every skip is counted; a completed
/// run with non-zero error counters is still a completed run.
#[derive(Debug, Default, Clone)]
pub struct DatasetCounters {
    pub rows_seen: usize,
    /// Source read failures + missing/non-string text fields
    pub rows_skipped: usize,
    /// Documents dropped for empty post-mask text
    pub rows_empty: usize,
    /// Rows where at least one span was masked
    pub rows_masked: usize,
    /// Tagger failures (per-document, isolated)
    pub tag_errors: usize,
    pub docs_written: usize,
    /// Accepted spans per label
    pub spans: BTreeMap<String, usize>,
    pub shards: usize,
    pub shards_spilled: usize,
    pub dispatch_failures: usize,
}

impl DatasetCounters {
    pub fn total_spans(&self) -> usize {
        self.spans.values().sum()
    }
}

/// One dataset's outcome: counters plus a fatal error, if any.
#[derive(Debug)]
pub struct DatasetReport {
    pub dataset: String,
    pub counters: DatasetCounters,
    /// Set when the dataset aborted (source open failure, duplicate id)
    pub error: Option<String>,
}

/// Final structured record for the whole run.
#[derive(Debug)]
pub struct RunSummary {
    pub datasets: Vec<DatasetReport>,
    pub elapsed: Duration,
    pub cancelled: bool,
}

impl RunSummary {
    pub fn total_docs(&self) -> usize {
        self.datasets.iter().map(|d| d.counters.docs_written).sum()
    }

    pub fn total_shards(&self) -> usize {
        self.datasets.iter().map(|d| d.counters.shards).sum()
    }

    /// True when any dataset aborted or any shard dispatch failed.
    pub fn has_failures(&self) -> bool {
        self.datasets
            .iter()
            .any(|d| d.error.is_some() || d.counters.dispatch_failures > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(docs: usize, error: Option<&str>, dispatch_failures: usize) -> DatasetReport {
        DatasetReport {
            dataset: "ds".to_string(),
            counters: DatasetCounters {
                docs_written: docs,
                dispatch_failures,
                ..Default::default()
            },
            error: error.map(String::from),
        }
    }

    #[test]
    fn totals_sum_across_datasets() {
        let summary = RunSummary {
            datasets: vec![report(3, None, 0), report(5, None, 0)],
            elapsed: Duration::from_secs(1),
            cancelled: false,
        };
        assert_eq!(summary.total_docs(), 8);
        assert!(!summary.has_failures());
    }

    #[test]
    fn dataset_error_is_a_failure() {
        let summary = RunSummary {
            datasets: vec![report(0, Some("boom"), 0)],
            elapsed: Duration::from_secs(1),
            cancelled: false,
        };
        assert!(summary.has_failures());
    }

    #[test]
    fn dispatch_failure_is_a_failure() {
        let summary = RunSummary {
            datasets: vec![report(2, None, 1)],
            elapsed: Duration::from_secs(1),
            cancelled: false,
        };
        assert!(summary.has_failures());
    }
}
