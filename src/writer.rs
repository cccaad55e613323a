//! Streaming writer for one run directory.
//!
//! Authors go to a single author log; publications go to numbered chunk files that rotate
//! after `chunk_size` records. All mutable state sits behind one mutex, so a `RunWriter` can
//! be shared by reference across worker threads and every `add_author` call, rotation
//! included, runs as one critical section.

use crate::codec::Codec;
use crate::compression::LineSink;
use crate::error::{Result, StoreError};
use crate::layout::{self, STATS_FILE};
use crate::model::{
    Author, AuthorRecord, AuthorTally, ProcessingResult, Publication, PublicationRecord,
};
use crate::stats::{
    size_in_mb, timestamp_now, ProcessingStats, RunManifest, RunMetadata, StatsDocument, FORMAT,
    PIPELINE_VERSION,
};
use chrono::Local;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{info, warn};

pub const DEFAULT_CHUNK_SIZE: usize = 1000;
pub const DEFAULT_COMPRESSION_LEVEL: u32 = 6;

#[derive(Debug, Clone, PartialEq)]
pub struct WriterOptions {
    /// Gzip every output file
    pub compress: bool,
    /// Publication records per chunk; `None` writes one unbounded `publications.jsonl`
    pub chunk_size: Option<usize>,
    pub codec: Codec,
    /// Gzip level 0-9
    pub compression_level: u32,
}

impl Default for WriterOptions {
    fn default() -> Self {
        WriterOptions {
            compress: true,
            chunk_size: Some(DEFAULT_CHUNK_SIZE),
            codec: Codec::Compact,
            compression_level: DEFAULT_COMPRESSION_LEVEL,
        }
    }
}

impl WriterOptions {
    /// Single uncompressed publications file, the layout older runs used.
    pub fn legacy() -> Self {
        WriterOptions {
            compress: false,
            chunk_size: None,
            ..Default::default()
        }
    }

    pub fn uncompressed(chunk_size: usize) -> Self {
        WriterOptions {
            compress: false,
            chunk_size: Some(chunk_size),
            ..Default::default()
        }
    }
}

struct WriterState {
    authors_path: PathBuf,
    authors: LineSink,
    publications: LineSink,
    chunk_index: u32,
    records_in_chunk: usize,
    chunk_paths: Vec<PathBuf>,
    metadata: RunMetadata,
    stats: ProcessingStats,
    line: Vec<u8>,
    finalized: bool,
    /// Set by the first write failure; the run accepts nothing afterwards
    failed: bool,
}

pub struct RunWriter {
    run_dir: PathBuf,
    options: WriterOptions,
    state: Mutex<WriterState>,
}

impl RunWriter {
    /// Start a new run in a fresh `run_<YYYYMMDD>_<HHMMSS>` directory under `output_root`.
    pub fn create(output_root: &Path, options: WriterOptions) -> Result<Self> {
        validate(&options)?;
        let run_dir = layout::allocate_run_dir(output_root, &Local::now())?;
        Self::open(run_dir, options)
    }

    /// Start a new run in `run_dir`, creating it if needed. Refuses a directory that already
    /// holds a finalized run.
    pub fn create_at(run_dir: &Path, options: WriterOptions) -> Result<Self> {
        validate(&options)?;
        if run_dir.join(STATS_FILE).exists() {
            return Err(StoreError::Finalized(run_dir.to_path_buf()));
        }
        fs::create_dir_all(run_dir)?;
        Self::open(run_dir.to_path_buf(), options)
    }

    fn open(run_dir: PathBuf, options: WriterOptions) -> Result<Self> {
        let compress = options.compress;
        let level = options.compression_level;

        let authors_path = run_dir.join(layout::authors_file_name(compress));
        let publications_path = match options.chunk_size {
            Some(_) => run_dir.join(layout::chunk_file_name(0, compress)),
            None => run_dir.join(layout::legacy_publications_file_name(compress)),
        };

        let authors = LineSink::create(&authors_path, compress, level)?;
        let publications = LineSink::create(&publications_path, compress, level)?;

        let start_time = timestamp_now();
        let state = WriterState {
            authors_path,
            authors,
            publications,
            chunk_index: 0,
            records_in_chunk: 0,
            chunk_paths: vec![publications_path],
            metadata: RunMetadata {
                timestamp: start_time.clone(),
                codec: options.codec.name().to_string(),
                pipeline_version: PIPELINE_VERSION.to_string(),
                format: FORMAT.to_string(),
            },
            stats: ProcessingStats {
                start_time,
                ..Default::default()
            },
            line: Vec::with_capacity(4096),
            finalized: false,
            failed: false,
        };

        info!(
            "Initialized streaming export to: {} ({})",
            run_dir.display(),
            if compress { "compressed" } else { "uncompressed" }
        );

        Ok(RunWriter {
            run_dir,
            options,
            state: Mutex::new(state),
        })
    }

    pub fn run_dir(&self) -> &Path {
        &self.run_dir
    }

    pub fn options(&self) -> &WriterOptions {
        &self.options
    }

    pub fn stats_path(&self) -> PathBuf {
        self.run_dir.join(STATS_FILE)
    }

    /// Snapshot of the running counters.
    pub fn stats(&self) -> ProcessingStats {
        self.lock().stats.clone()
    }

    pub fn is_finalized(&self) -> bool {
        self.lock().finalized
    }

    /// True once a write failure has aborted the run.
    pub fn is_aborted(&self) -> bool {
        self.lock().failed
    }

    /// Append one author and its publications. `results[i]` is the processing outcome of
    /// `publications[i]`.
    ///
    /// Publication lines are written first and the author line last, so an author present in
    /// the log always has all of its publications on disk. Both files are flushed before the
    /// call returns. Any I/O failure aborts the run: every later `add_author` and `finalize`
    /// returns [`StoreError::Aborted`] and no sidecar is written.
    pub fn add_author(
        &self,
        author: &Author,
        publications: &[Publication],
        results: &[ProcessingResult],
    ) -> Result<()> {
        if publications.len() != results.len() {
            return Err(StoreError::LengthMismatch {
                author_id: author.id.clone(),
                publications: publications.len(),
                results: results.len(),
            });
        }

        let tally = AuthorTally::from_results(results);
        let author_record = AuthorRecord::from_upstream(author, tally, timestamp_now());

        let mut guard = self.lock();
        let state = &mut *guard;
        self.ensure_writable(state)?;

        if let Err(e) = self.append(state, author, &author_record, publications, results) {
            state.failed = true;
            warn!("Run {} aborted: {}", self.run_dir.display(), e);
            return Err(e);
        }

        state.stats.total_authors += 1;
        state.stats.total_publications += tally.publications;
        state.stats.pdfs_downloaded += tally.pdfs;
        state.stats.stonybrook_mentions_found += tally.mentions;
        state.stats.summaries_generated += tally.summaries;
        Ok(())
    }

    fn ensure_writable(&self, state: &WriterState) -> Result<()> {
        if state.finalized {
            return Err(StoreError::Finalized(self.run_dir.clone()));
        }
        if state.failed {
            return Err(StoreError::Aborted(self.run_dir.clone()));
        }
        Ok(())
    }

    fn append(
        &self,
        state: &mut WriterState,
        author: &Author,
        author_record: &AuthorRecord,
        publications: &[Publication],
        results: &[ProcessingResult],
    ) -> Result<()> {
        for (idx, (publication, result)) in publications.iter().zip(results).enumerate() {
            if let Some(limit) = self.options.chunk_size {
                if state.records_in_chunk >= limit {
                    self.rotate(state)?;
                }
            }

            let record =
                PublicationRecord::from_upstream(author, publication, idx as u64 + 1, result);
            state.line.clear();
            self.options.codec.encode_line(&record, &mut state.line)?;
            state.publications.write_line(&state.line)?;
            state.records_in_chunk += 1;
        }

        state.line.clear();
        self.options.codec.encode_line(author_record, &mut state.line)?;
        state.authors.write_line(&state.line)?;

        state.publications.flush()?;
        state.authors.flush()?;
        Ok(())
    }

    fn rotate(&self, state: &mut WriterState) -> Result<()> {
        state.publications.finish()?;

        let next_index = state.chunk_index + 1;
        let path = self
            .run_dir
            .join(layout::chunk_file_name(next_index, self.options.compress));
        state.publications =
            LineSink::create(&path, self.options.compress, self.options.compression_level)?;
        state.chunk_index = next_index;
        state.records_in_chunk = 0;

        info!(
            "Rotated to new publications chunk: {}",
            path.file_name().unwrap_or_default().to_string_lossy()
        );
        state.chunk_paths.push(path);
        Ok(())
    }

    /// Close every file and write `run_stats.json`. A second call does nothing and returns the
    /// same path. A run aborted by an earlier write failure gets no sidecar.
    pub fn finalize(&self) -> Result<PathBuf> {
        let stats_path = self.stats_path();
        let mut guard = self.lock();
        let state = &mut *guard;
        if state.finalized {
            return Ok(stats_path);
        }
        if state.failed {
            return Err(StoreError::Aborted(self.run_dir.clone()));
        }

        if let Err(e) = self.write_sidecar(state, &stats_path) {
            state.failed = true;
            return Err(e);
        }
        state.finalized = true;

        info!(
            "Export completed: {} authors, {} publications in {} chunk(s) at {}",
            state.stats.total_authors,
            state.stats.total_publications,
            state.chunk_paths.len(),
            self.run_dir.display()
        );
        Ok(stats_path)
    }

    fn write_sidecar(&self, state: &mut WriterState, stats_path: &Path) -> Result<()> {
        state.authors.finish()?;
        state.publications.finish()?;
        state.stats.end_time = Some(timestamp_now());

        let mut total_bytes = file_size(&state.authors_path);
        for path in &state.chunk_paths {
            total_bytes += file_size(path);
        }

        let document = StatsDocument {
            metadata: state.metadata.clone(),
            processing_stats: state.stats.clone(),
            files: RunManifest {
                authors: state.authors_path.display().to_string(),
                publications_chunks: state
                    .chunk_paths
                    .iter()
                    .map(|p| p.display().to_string())
                    .collect(),
                total_chunks: state.chunk_paths.len(),
                compression_enabled: self.options.compress,
                chunk_size: self.options.chunk_size,
                total_size_mb: size_in_mb(total_bytes),
            },
        };
        document.write(stats_path)
    }

    /// Same as [`finalize`](Self::finalize), discarding the path.
    pub fn close(&self) -> Result<()> {
        self.finalize().map(|_| ())
    }

    fn lock(&self) -> MutexGuard<'_, WriterState> {
        // A panicking worker can at worst leave a partial trailing line, which readers skip.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for RunWriter {
    fn drop(&mut self) {
        let state = self.state.get_mut().unwrap_or_else(PoisonError::into_inner);
        if state.finalized {
            return;
        }
        let _ = state.authors.finish();
        let _ = state.publications.finish();
        warn!(
            "Run {} dropped without finalize; no {} written",
            self.run_dir.display(),
            STATS_FILE
        );
    }
}

fn validate(options: &WriterOptions) -> Result<()> {
    if options.chunk_size == Some(0) {
        return Err(StoreError::InvalidInput(
            "chunk size must be at least 1".to_string(),
        ));
    }
    if options.compression_level > 9 {
        return Err(StoreError::InvalidInput(format!(
            "compression level {} out of range 0-9",
            options.compression_level
        )));
    }
    Ok(())
}

fn file_size(path: &Path) -> u64 {
    fs::metadata(path).map(|m| m.len()).unwrap_or(0)
}
