use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use glob::glob;
use indicatif::{ProgressBar, ProgressStyle};
use openalex_runstore::compression::open_reader;
use openalex_runstore::parquet_export::DEFAULT_BATCH_SIZE;
use openalex_runstore::writer::{DEFAULT_CHUNK_SIZE, DEFAULT_COMPRESSION_LEVEL};
use openalex_runstore::{
    combine_all_publications, export_run_to_parquet, Author, Codec, DatasetQuery,
    ProcessingResult, Publication, RunRegistry, RunWriter, StoreError, WriterOptions,
};
use rayon::prelude::*;
use serde::Deserialize;
use std::io::BufRead;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "openalex_runstore")]
#[command(about = "Chunked JSONL store for author/publication processing runs")]
struct Cli {
    /// Root directory holding the run_* directories
    #[arg(short, long, default_value = "./output")]
    output_dir: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List runs, newest first
    ListRuns,

    /// Dataset statistics for a run (default: latest)
    Stats {
        #[arg(short, long)]
        run: Option<String>,
    },

    /// Find authors by name
    Authors {
        name: String,
        #[arg(short, long)]
        run: Option<String>,
        /// Case-sensitive full-name match instead of substring
        #[arg(long)]
        exact: bool,
    },

    /// Publications from one year
    Year {
        year: i32,
        #[arg(short, long)]
        run: Option<String>,
        #[arg(short, long, default_value = "10")]
        limit: usize,
    },

    /// Authors with at least one validated mention
    MentionAuthors {
        #[arg(short, long)]
        run: Option<String>,
    },

    /// Concatenate every publication chunk into one JSONL file
    Combine {
        #[arg(short, long)]
        run: Option<String>,
        #[arg(long, default_value = "all_publications.jsonl")]
        output: PathBuf,
    },

    /// Convert a run to authors.parquet / publications.parquet
    ExportParquet {
        #[arg(short, long)]
        run: Option<String>,
        #[arg(long, default_value = "./parquet")]
        parquet_dir: PathBuf,
        #[arg(short, long, default_value_t = DEFAULT_BATCH_SIZE)]
        batch_size: usize,
    },

    /// Stream author bundles (JSONL, optionally gzipped) into a new run
    Ingest {
        /// Input file or glob pattern
        input: String,

        /// Number of parallel workers (default: all cores)
        #[arg(short, long)]
        workers: Option<usize>,

        #[arg(short, long, default_value_t = DEFAULT_CHUNK_SIZE)]
        chunk_size: usize,

        /// Write a single unbounded publications.jsonl instead of chunks
        #[arg(long)]
        single_file: bool,

        #[arg(long)]
        no_compress: bool,

        #[arg(long, default_value_t = DEFAULT_COMPRESSION_LEVEL)]
        compression_level: u32,

        /// Sort object keys in every written line
        #[arg(long)]
        canonical: bool,
    },
}

/// One line of ingest input: an author plus its aligned publications and results.
#[derive(Deserialize)]
struct AuthorBundle {
    author: Author,
    #[serde(default)]
    publications: Vec<Publication>,
    #[serde(default)]
    processing_results: Vec<ProcessingResult>,
}

fn open_run(output_dir: &Path, run: Option<&str>) -> Result<DatasetQuery> {
    let registry = RunRegistry::new(output_dir);
    match run {
        Some(run) if Path::new(run).is_dir() => Ok(DatasetQuery::open(run)?),
        Some(run) => registry
            .get_run(run)?
            .with_context(|| format!("Run not found: {}", run)),
        None => registry
            .latest_run()?
            .with_context(|| format!("No runs found in {}", output_dir.display())),
    }
}

fn list_runs(output_dir: &Path) -> Result<()> {
    let runs = RunRegistry::new(output_dir).list_runs()?;
    if runs.is_empty() {
        println!("No runs found in {}", output_dir.display());
        return Ok(());
    }

    for run in runs {
        let state = if run.complete { "" } else { " (incomplete)" };
        println!(
            "{}  created={}  authors={}  publications={}  chunks={}{}",
            run.run_name,
            run.created,
            run.total_authors,
            run.total_publications,
            run.total_chunks
                .map(|c| c.to_string())
                .unwrap_or_else(|| "-".to_string()),
            state
        );
    }
    Ok(())
}

fn find_input_files(input: &str) -> Result<Vec<PathBuf>> {
    if Path::new(input).is_file() {
        return Ok(vec![PathBuf::from(input)]);
    }

    let mut files = Vec::new();
    for entry in glob(input)? {
        match entry {
            Ok(path) if path.is_file() => files.push(path),
            Ok(_) => {}
            Err(e) => warn!("Error reading glob entry: {}", e),
        }
    }
    files.sort();
    info!("Found {} input files for {}", files.len(), input);
    Ok(files)
}

/// Feed every bundle in `path` to `writer`. Malformed bundles and bundles whose publication
/// and result lists differ in length are skipped; any other error aborts the ingest.
fn ingest_file(path: &Path, writer: &RunWriter, skipped: &AtomicU64) -> Result<u64> {
    let reader = open_reader(path).with_context(|| format!("opening {}", path.display()))?;
    let mut authors = 0u64;

    for (line_no, line) in reader.lines().enumerate() {
        let line = line.with_context(|| format!("reading {}", path.display()))?;
        if line.trim().is_empty() {
            continue;
        }
        let bundle: AuthorBundle = match serde_json::from_str(&line) {
            Ok(bundle) => bundle,
            Err(e) => {
                warn!("{}:{}: skipping bundle: {}", path.display(), line_no + 1, e);
                skipped.fetch_add(1, Ordering::Relaxed);
                continue;
            }
        };

        match writer.add_author(
            &bundle.author,
            &bundle.publications,
            &bundle.processing_results,
        ) {
            Ok(()) => authors += 1,
            Err(e @ StoreError::LengthMismatch { .. }) => {
                warn!("{}:{}: skipping bundle: {}", path.display(), line_no + 1, e);
                skipped.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => {
                return Err(e).with_context(|| {
                    format!(
                        "writing author {} from {}:{}",
                        bundle.author.id,
                        path.display(),
                        line_no + 1
                    )
                })
            }
        }
    }
    Ok(authors)
}

#[allow(clippy::too_many_arguments)]
fn ingest(
    output_dir: &Path,
    input: &str,
    workers: Option<usize>,
    chunk_size: usize,
    single_file: bool,
    no_compress: bool,
    compression_level: u32,
    canonical: bool,
) -> Result<()> {
    let files = find_input_files(input)?;
    if files.is_empty() {
        bail!("No input files match {}", input);
    }

    let options = WriterOptions {
        compress: !no_compress,
        chunk_size: if single_file { None } else { Some(chunk_size) },
        codec: if canonical { Codec::Canonical } else { Codec::Compact },
        compression_level,
    };
    let writer = RunWriter::create(output_dir, options)?;

    let max_workers = num_cpus::get();
    let num_workers = workers.unwrap_or(max_workers).max(1);
    info!("Using {} workers (max available: {})", num_workers, max_workers);

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(num_workers)
        .thread_name(|i| format!("runstore-worker-{}", i))
        .build()?;

    let progress = ProgressBar::new(files.len() as u64);
    progress.set_style(ProgressStyle::with_template(
        "[{elapsed_precise}] {bar:50.cyan/blue} {pos:>7}/{len:7} input files | {msg}",
    )?);
    progress.set_message("Ingesting authors...");

    let ingested = AtomicU64::new(0);
    let skipped = AtomicU64::new(0);

    pool.install(|| {
        files.par_iter().try_for_each(|path| -> Result<()> {
            let authors = ingest_file(path, &writer, &skipped)?;
            let total = ingested.fetch_add(authors, Ordering::Relaxed) + authors;
            progress.set_message(format!("{} authors", total));
            progress.inc(1);
            Ok(())
        })
    })?;
    progress.finish_with_message("Done");

    let stats_path = writer.finalize()?;
    let stats = writer.stats();

    info!("Final Processing Statistics:");
    info!("  Authors: {}", stats.total_authors);
    info!("  Publications: {}", stats.total_publications);
    info!("  PDFs downloaded: {}", stats.pdfs_downloaded);
    info!("  Mentions found: {}", stats.stonybrook_mentions_found);
    info!("  Summaries generated: {}", stats.summaries_generated);
    let skipped = skipped.load(Ordering::Relaxed);
    if skipped > 0 {
        warn!("  Skipped bundles: {}", skipped);
    }
    info!("Run written to {} (stats: {})", writer.run_dir().display(), stats_path.display());
    Ok(())
}

fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let output_dir = cli.output_dir.as_path();

    match cli.command {
        Command::ListRuns => list_runs(output_dir)?,
        Command::Stats { run } => {
            let query = open_run(output_dir, run.as_deref())?;
            let stats = query.get_statistics();
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }
        Command::Authors { name, run, exact } => {
            let query = open_run(output_dir, run.as_deref())?;
            let mut found = 0usize;
            for author in query.get_author_by_name(&name, exact) {
                println!(
                    "{}  {}  publications={}  mentions={}",
                    author.id,
                    author.name,
                    author.publications_processed,
                    author.stonybrook_mentions
                );
                found += 1;
            }
            info!("{} authors matching {:?}", found, name);
        }
        Command::Year { year, run, limit } => {
            let query = open_run(output_dir, run.as_deref())?;
            let matching: Vec<_> = query.get_publications_by_year(year).collect();
            println!("{} publications from {}", matching.len(), year);
            for publication in matching.iter().take(limit) {
                println!(
                    "  [{}] {} ({})",
                    publication.id, publication.title, publication.author_name
                );
            }
        }
        Command::MentionAuthors { run } => {
            let query = open_run(output_dir, run.as_deref())?;
            for author in query.get_authors_with_mentions() {
                println!("{}  {}  mentions={}", author.id, author.name, author.stonybrook_mentions);
            }
        }
        Command::Combine { run, output } => {
            let query = open_run(output_dir, run.as_deref())?;
            let count = combine_all_publications(query.run_dir(), &output)?;
            println!("Combined {} publications into {}", count, output.display());
        }
        Command::ExportParquet {
            run,
            parquet_dir,
            batch_size,
        } => {
            let query = open_run(output_dir, run.as_deref())?;
            let summary = export_run_to_parquet(&query, &parquet_dir, batch_size)?;
            info!(
                "Parquet export complete: {} authors, {} publications in {}",
                summary.authors,
                summary.publications,
                parquet_dir.display()
            );
        }
        Command::Ingest {
            input,
            workers,
            chunk_size,
            single_file,
            no_compress,
            compression_level,
            canonical,
        } => ingest(
            output_dir,
            &input,
            workers,
            chunk_size,
            single_file,
            no_compress,
            compression_level,
            canonical,
        )?,
    }

    Ok(())
}
