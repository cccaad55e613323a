//! Append-only, chunked JSONL store for author/publication processing runs.
//!
//! A [`RunWriter`] streams one run into a timestamped directory under an output root, a
//! [`DatasetQuery`] scans a finished (or still-growing) run lazily, and a [`RunRegistry`]
//! lists the runs under a root.

pub mod codec;
pub mod compression;
pub mod error;
pub mod export;
pub mod layout;
pub mod model;
pub mod parquet_export;
pub mod predicate;
pub mod query;
pub mod registry;
pub mod stats;
pub mod writer;

#[cfg(test)]
mod test_support;

pub use codec::Codec;
pub use error::{Result, StoreError};
pub use export::combine_all_publications;
pub use model::{
    Author, AuthorRecord, ProcessingRecord, ProcessingResult, Publication, PublicationRecord,
    StonybrookValidation,
};
pub use parquet_export::{export_run_to_parquet, ParquetSummary};
pub use predicate::Predicate;
pub use query::{DatasetQuery, DatasetStatistics, Records, TopAuthor};
pub use registry::{RunRegistry, RunSummary};
pub use stats::{ProcessingStats, StatsDocument};
pub use writer::{RunWriter, WriterOptions};

use std::path::Path;

/// Open the newest run under `output_dir`, if there is one.
pub fn query_latest_run(output_dir: impl AsRef<Path>) -> Result<Option<DatasetQuery>> {
    RunRegistry::new(output_dir.as_ref()).latest_run()
}
