//! Error types for the run store

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for run store operations
pub type Result<T> = std::result::Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Caller handed the store something it cannot work with
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Run already finalized: {}", .0.display())]
    Finalized(PathBuf),

    /// An earlier write failed; the run is left without a sidecar
    #[error("Run aborted after a write failure: {}", .0.display())]
    Aborted(PathBuf),

    #[error("Author {author_id}: {publications} publications but {results} processing results")]
    LengthMismatch {
        author_id: String,
        publications: usize,
        results: usize,
    },

    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    #[error("Parquet error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),
}
