//! File naming contract of a run directory.
//!
//! ```text
//! run_20240501_103000/
//!   authors.jsonl[.gz]
//!   publications_chunk_0000.jsonl[.gz]
//!   publications_chunk_0001.jsonl[.gz]
//!   ...                                   (or a single legacy publications.jsonl[.gz])
//!   run_stats.json
//! ```

use chrono::{DateTime, Local};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::warn;

pub const RUN_PREFIX: &str = "run_";
pub const STATS_FILE: &str = "run_stats.json";
pub const AUTHORS_STEM: &str = "authors";
pub const CHUNK_PREFIX: &str = "publications_chunk_";
pub const LEGACY_PUBLICATIONS_STEM: &str = "publications";

const JSONL: &str = ".jsonl";
const JSONL_GZ: &str = ".jsonl.gz";

pub fn jsonl_extension(compress: bool) -> &'static str {
    if compress {
        JSONL_GZ
    } else {
        JSONL
    }
}

pub fn authors_file_name(compress: bool) -> String {
    format!("{}{}", AUTHORS_STEM, jsonl_extension(compress))
}

pub fn chunk_file_name(index: u32, compress: bool) -> String {
    format!("{}{:04}{}", CHUNK_PREFIX, index, jsonl_extension(compress))
}

pub fn legacy_publications_file_name(compress: bool) -> String {
    format!("{}{}", LEGACY_PUBLICATIONS_STEM, jsonl_extension(compress))
}

pub fn run_dir_name(now: &DateTime<Local>) -> String {
    format!("{}{}", RUN_PREFIX, now.format("%Y%m%d_%H%M%S"))
}

/// Create a fresh run directory under `root`. If the timestamped name is taken (two runs in
/// the same second), `_1`, `_2`, ... is appended until an unused name is found.
pub fn allocate_run_dir(root: &Path, now: &DateTime<Local>) -> io::Result<PathBuf> {
    fs::create_dir_all(root)?;
    let base = run_dir_name(now);
    let mut candidate = root.join(&base);
    let mut suffix = 0u32;
    loop {
        match fs::create_dir(&candidate) {
            Ok(()) => return Ok(candidate),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                suffix += 1;
                candidate = root.join(format!("{}_{}", base, suffix));
            }
            Err(e) => return Err(e),
        }
    }
}

/// Which publication file a name refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum PublicationFile {
    /// Single-file `publications.jsonl[.gz]`
    Legacy,
    /// Rotated `publications_chunk_<NNNN>.jsonl[.gz]`
    Chunk(u32),
}

fn strip_jsonl(name: &str) -> Option<&str> {
    name.strip_suffix(JSONL_GZ)
        .or_else(|| name.strip_suffix(JSONL))
}

pub fn parse_publication_file(name: &str) -> Option<PublicationFile> {
    let stem = strip_jsonl(name)?;
    if stem == LEGACY_PUBLICATIONS_STEM {
        return Some(PublicationFile::Legacy);
    }
    let digits = stem.strip_prefix(CHUNK_PREFIX)?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok().map(PublicationFile::Chunk)
}

/// The author log, compressed name preferred.
pub fn discover_authors_file(run_dir: &Path) -> Option<PathBuf> {
    [true, false]
        .into_iter()
        .map(|compress| run_dir.join(authors_file_name(compress)))
        .find(|path| path.is_file())
}

/// All publication files in read order: the legacy file first, then chunks by index.
pub fn discover_publication_files(run_dir: &Path) -> io::Result<Vec<PathBuf>> {
    let mut found = Vec::new();
    for entry in fs::read_dir(run_dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let name = entry.file_name();
        let Some(name) = name.to_str() else {
            continue;
        };
        match parse_publication_file(name) {
            Some(kind) => found.push((kind, name.to_string(), entry.path())),
            None if name.starts_with(CHUNK_PREFIX) => {
                warn!("Ignoring unrecognized chunk file {}", entry.path().display())
            }
            None => {}
        }
    }
    found.sort();
    Ok(found.into_iter().map(|(_, _, path)| path).collect())
}
