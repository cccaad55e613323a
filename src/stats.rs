//! The `run_stats.json` sidecar written when a run is finalized.

use crate::error::Result;
use chrono::Local;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

pub const PIPELINE_VERSION: &str = "1.0";
pub const FORMAT: &str = "JSONL (JSON Lines)";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunMetadata {
    pub timestamp: String,
    pub codec: String,
    pub pipeline_version: String,
    pub format: String,
}

/// Running counters for one run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProcessingStats {
    pub total_authors: u64,
    pub total_publications: u64,
    pub pdfs_downloaded: u64,
    pub stonybrook_mentions_found: u64,
    pub summaries_generated: u64,
    pub start_time: String,
    #[serde(default)]
    pub end_time: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunManifest {
    pub authors: String,
    pub publications_chunks: Vec<String>,
    pub total_chunks: usize,
    pub compression_enabled: bool,
    /// `None` for an unbounded (single-file) run
    pub chunk_size: Option<usize>,
    pub total_size_mb: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatsDocument {
    pub metadata: RunMetadata,
    pub processing_stats: ProcessingStats,
    pub files: RunManifest,
}

impl StatsDocument {
    pub fn read(path: &Path) -> Result<Self> {
        let bytes = fs::read(path)?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(self)?;
        fs::write(path, bytes)?;
        Ok(())
    }
}

/// Local wall-clock time as an ISO-8601 string with microseconds, e.g.
/// `2024-05-01T10:00:00.123456`. Lexicographic order matches chronological order.
pub fn timestamp_now() -> String {
    Local::now()
        .naive_local()
        .format("%Y-%m-%dT%H:%M:%S%.6f")
        .to_string()
}

/// Bytes to megabytes, two decimals.
pub fn size_in_mb(bytes: u64) -> f64 {
    (bytes as f64 / (1024.0 * 1024.0) * 100.0).round() / 100.0
}
