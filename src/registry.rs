//! Listing of the runs under an output root.
//!
//! Only each run's `run_stats.json` is read. A run without a readable sidecar (still
//! streaming, or interrupted) is listed as incomplete with an unknown creation time and zero
//! totals instead of failing the listing.

use crate::error::{Result, StoreError};
use crate::layout::{RUN_PREFIX, STATS_FILE};
use crate::query::DatasetQuery;
use glob::{glob, Pattern};
use serde::Serialize;
use serde_json::Value;
use std::cmp::Ordering;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;

pub const UNKNOWN: &str = "Unknown";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunSummary {
    pub run_directory: PathBuf,
    pub run_name: String,
    pub created: String,
    pub total_authors: u64,
    pub total_publications: u64,
    pub compression_enabled: Option<bool>,
    pub total_chunks: Option<u64>,
    /// `run_stats.json` was present and parsed
    pub complete: bool,
}

impl RunSummary {
    fn unknown(run_dir: &Path) -> Self {
        RunSummary {
            run_directory: run_dir.to_path_buf(),
            run_name: run_dir
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
            created: UNKNOWN.to_string(),
            total_authors: 0,
            total_publications: 0,
            compression_enabled: None,
            total_chunks: None,
            complete: false,
        }
    }

    fn from_sidecar(run_dir: &Path) -> Self {
        let mut summary = RunSummary::unknown(run_dir);
        let stats_path = run_dir.join(STATS_FILE);
        if !stats_path.is_file() {
            return summary;
        }

        let parsed = fs::read(&stats_path)
            .map_err(StoreError::from)
            .and_then(|bytes| Ok(serde_json::from_slice::<Value>(&bytes)?));
        let stats = match parsed {
            Ok(stats) if stats.is_object() => stats,
            Ok(_) => {
                warn!("Ignoring {}: not a JSON object", stats_path.display());
                return summary;
            }
            Err(e) => {
                warn!("Ignoring unreadable {}: {}", stats_path.display(), e);
                return summary;
            }
        };

        if let Some(created) = stats.pointer("/metadata/timestamp").and_then(Value::as_str) {
            summary.created = created.to_string();
        }
        summary.total_authors = stats
            .pointer("/processing_stats/total_authors")
            .and_then(Value::as_u64)
            .unwrap_or(0);
        summary.total_publications = stats
            .pointer("/processing_stats/total_publications")
            .and_then(Value::as_u64)
            .unwrap_or(0);
        summary.compression_enabled = stats
            .pointer("/files/compression_enabled")
            .and_then(Value::as_bool);
        summary.total_chunks = stats.pointer("/files/total_chunks").and_then(Value::as_u64);
        summary.complete = true;
        summary
    }

    fn has_known_creation(&self) -> bool {
        self.created != UNKNOWN
    }
}

// Newest first; runs with an unknown creation time go last, newest name first.
fn newest_first(a: &RunSummary, b: &RunSummary) -> Ordering {
    match (a.has_known_creation(), b.has_known_creation()) {
        (true, true) => b.created.cmp(&a.created),
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        (false, false) => b.run_name.cmp(&a.run_name),
    }
}

pub struct RunRegistry {
    output_dir: PathBuf,
}

impl RunRegistry {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        RunRegistry {
            output_dir: output_dir.into(),
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Every `run_*` directory under the root, newest first. A missing root lists nothing.
    pub fn list_runs(&self) -> Result<Vec<RunSummary>> {
        let pattern = format!(
            "{}/{}*",
            Pattern::escape(&self.output_dir.to_string_lossy()),
            RUN_PREFIX
        );

        let mut runs = Vec::new();
        for entry in glob(&pattern).map_err(|e| StoreError::InvalidInput(e.to_string()))? {
            match entry {
                Ok(path) => {
                    if path.is_dir() {
                        runs.push(RunSummary::from_sidecar(&path));
                    }
                }
                Err(e) => warn!("Error reading glob entry: {}", e),
            }
        }

        runs.sort_by(newest_first);
        Ok(runs)
    }

    /// Query engine for the newest run, if any.
    pub fn latest_run(&self) -> Result<Option<DatasetQuery>> {
        match self.list_runs()?.into_iter().next() {
            Some(run) => Ok(Some(DatasetQuery::open(&run.run_directory)?)),
            None => Ok(None),
        }
    }

    /// Query engine for `run_name` under the root, or `None` if no such directory exists.
    pub fn get_run(&self, run_name: &str) -> Result<Option<DatasetQuery>> {
        let run_dir = self.output_dir.join(run_name);
        if !run_dir.is_dir() {
            return Ok(None);
        }
        Ok(Some(DatasetQuery::open(run_dir)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_sidecar(run_dir: &Path, timestamp: &str, authors: u64, publications: u64) {
        fs::create_dir_all(run_dir).unwrap();
        let doc = serde_json::json!({
            "metadata": {"timestamp": timestamp},
            "processing_stats": {
                "total_authors": authors,
                "total_publications": publications,
            },
            "files": {"compression_enabled": true, "total_chunks": 2},
        });
        fs::write(run_dir.join(STATS_FILE), doc.to_string()).unwrap();
    }

    #[test]
    fn missing_root_lists_nothing() {
        let dir = TempDir::new().unwrap();
        let registry = RunRegistry::new(dir.path().join("absent"));
        assert!(registry.list_runs().unwrap().is_empty());
        assert!(registry.latest_run().unwrap().is_none());
    }

    #[test]
    fn sorts_newest_first_with_unknown_last() {
        let dir = TempDir::new().unwrap();
        write_sidecar(&dir.path().join("run_20240101_000000"), "2024-01-01T00:00:00", 1, 2);
        write_sidecar(&dir.path().join("run_20240301_000000"), "2024-03-01T00:00:00", 3, 4);
        fs::create_dir_all(dir.path().join("run_20240401_000000")).unwrap();
        fs::create_dir_all(dir.path().join("not_a_run")).unwrap();

        let runs = RunRegistry::new(dir.path()).list_runs().unwrap();
        let names: Vec<&str> = runs.iter().map(|r| r.run_name.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "run_20240301_000000",
                "run_20240101_000000",
                "run_20240401_000000"
            ]
        );
        assert_eq!(runs[0].total_authors, 3);
        assert_eq!(runs[0].total_chunks, Some(2));
        assert!(runs[0].complete);
    }

    #[test]
    fn garbage_sidecar_degrades_to_unknown() {
        let dir = TempDir::new().unwrap();
        let run = dir.path().join("run_20240101_000000");
        fs::create_dir_all(&run).unwrap();
        fs::write(run.join(STATS_FILE), b"{ not json").unwrap();

        let runs = RunRegistry::new(dir.path()).list_runs().unwrap();
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].created, UNKNOWN);
        assert_eq!(runs[0].total_publications, 0);
        assert!(!runs[0].complete);
    }

    #[test]
    fn named_run_lookup() {
        let dir = TempDir::new().unwrap();
        write_sidecar(&dir.path().join("run_20240101_000000"), "2024-01-01T00:00:00", 0, 0);

        let registry = RunRegistry::new(dir.path());
        assert!(registry.get_run("run_20240101_000000").unwrap().is_some());
        assert!(registry.get_run("run_19990101_000000").unwrap().is_none());
    }
}
