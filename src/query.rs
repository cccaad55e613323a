//! Read-only access to a run directory.
//!
//! Every query returns a lazy [`Records`] iterator that opens its own file handles, so scans
//! are restartable, never materialize a run, and need no locking: any number of engines (or
//! scans from one engine) may run side by side. Decompression is chosen per file from its
//! extension.

use crate::codec::Codec;
use crate::compression::open_reader;
use crate::error::{Result, StoreError};
use crate::export;
use crate::layout;
use crate::model::{AuthorRecord, PublicationRecord};
use crate::predicate::{
    All, AuthorId, HasMentions, HasPdf, NameMatch, Predicate, TitleContains, Year, YearRange,
};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::cmp::Reverse;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::io::BufRead;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

pub const TOP_AUTHORS: usize = 10;

pub struct DatasetQuery {
    run_dir: PathBuf,
    codec: Codec,
    authors_file: Option<PathBuf>,
    publication_chunks: Vec<PathBuf>,
}

impl DatasetQuery {
    /// Open `run_dir` and discover its files. Fails if the directory does not exist.
    pub fn open(run_dir: impl AsRef<Path>) -> Result<Self> {
        Self::open_with_codec(run_dir, Codec::default())
    }

    pub fn open_with_codec(run_dir: impl AsRef<Path>, codec: Codec) -> Result<Self> {
        let run_dir = run_dir.as_ref().to_path_buf();
        if !run_dir.is_dir() {
            return Err(StoreError::InvalidInput(format!(
                "Run directory does not exist: {}",
                run_dir.display()
            )));
        }

        let authors_file = layout::discover_authors_file(&run_dir);
        if authors_file.is_none() {
            warn!("No authors file found in {}", run_dir.display());
        }
        let publication_chunks = layout::discover_publication_files(&run_dir)?;

        info!(
            "Dataset query initialized: {} (authors file: {}, publication chunks: {})",
            run_dir.display(),
            authors_file
                .as_deref()
                .and_then(Path::file_name)
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| "not found".to_string()),
            publication_chunks.len()
        );

        Ok(DatasetQuery {
            run_dir,
            codec,
            authors_file,
            publication_chunks,
        })
    }

    pub fn run_dir(&self) -> &Path {
        &self.run_dir
    }

    pub fn authors_file(&self) -> Option<&Path> {
        self.authors_file.as_deref()
    }

    pub fn publication_chunks(&self) -> &[PathBuf] {
        &self.publication_chunks
    }

    // ====== BASE SCANS ======

    /// Scan the author log. A run without one yields nothing.
    pub fn query_authors<P: Predicate<AuthorRecord>>(
        &self,
        predicate: P,
    ) -> Records<AuthorRecord, P> {
        let files = self.authors_file.iter().cloned().collect();
        Records::new(files, self.codec, predicate)
    }

    /// Scan every publication chunk in index order.
    pub fn query_publications<P: Predicate<PublicationRecord>>(
        &self,
        predicate: P,
    ) -> Records<PublicationRecord, P> {
        Records::new(self.publication_chunks.clone(), self.codec, predicate)
    }

    /// Scan a single publication file of this run.
    pub(crate) fn publications_in(&self, chunk: &Path) -> Records<PublicationRecord, All> {
        Records::new(vec![chunk.to_path_buf()], self.codec, All)
    }

    pub fn authors(&self) -> Records<AuthorRecord, All> {
        self.query_authors(All)
    }

    pub fn publications(&self) -> Records<PublicationRecord, All> {
        self.query_publications(All)
    }

    pub fn count_authors<P: Predicate<AuthorRecord>>(&self, predicate: P) -> usize {
        self.query_authors(predicate).count()
    }

    pub fn count_publications<P: Predicate<PublicationRecord>>(&self, predicate: P) -> usize {
        self.query_publications(predicate).count()
    }

    // ====== LOOKUPS ======

    /// First author with this id; stops reading at the first hit.
    pub fn get_author_by_id(&self, id: &str) -> Option<AuthorRecord> {
        self.query_authors(AuthorId(id.to_string())).next()
    }

    pub fn get_author_by_name(&self, name: &str, exact: bool) -> Records<AuthorRecord, NameMatch> {
        self.query_authors(NameMatch::new(name, exact))
    }

    pub fn get_publications_by_author(
        &self,
        author_id: &str,
    ) -> Records<PublicationRecord, AuthorId> {
        self.query_publications(AuthorId(author_id.to_string()))
    }

    pub fn get_publications_by_year(&self, year: i32) -> Records<PublicationRecord, Year> {
        self.query_publications(Year(year))
    }

    pub fn get_publications_by_year_range(
        &self,
        start: i32,
        end: i32,
    ) -> Records<PublicationRecord, YearRange> {
        self.query_publications(YearRange { start, end })
    }

    pub fn search_publications_by_title(
        &self,
        text: &str,
        case_sensitive: bool,
    ) -> Records<PublicationRecord, TitleContains> {
        self.query_publications(TitleContains::new(text, case_sensitive))
    }

    pub fn get_publications_with_pdfs(&self) -> Records<PublicationRecord, HasPdf> {
        self.query_publications(HasPdf)
    }

    pub fn get_publications_with_mentions(&self) -> Records<PublicationRecord, HasMentions> {
        self.query_publications(HasMentions)
    }

    // ====== JOINS AND AGGREGATES ======

    /// Authors owning at least one publication with a mention.
    ///
    /// One pass over the publications collects the distinct author ids (in first-appearance
    /// order), then each id costs one point lookup in the author log. Lookups happen lazily
    /// as the returned iterator is consumed.
    pub fn get_authors_with_mentions(&self) -> impl Iterator<Item = AuthorRecord> + '_ {
        let mut seen = HashSet::new();
        let mut ids = Vec::new();
        for publication in self.get_publications_with_mentions() {
            if seen.insert(publication.author_id.clone()) {
                ids.push(publication.author_id);
            }
        }
        ids.into_iter()
            .filter_map(move |id| self.get_author_by_id(&id))
    }

    /// Dataset-wide numbers from a single publication scan plus one author-log count.
    pub fn get_statistics(&self) -> DatasetStatistics {
        let mut total_publications = 0u64;
        let mut with_pdfs = 0u64;
        let mut with_mentions = 0u64;
        let mut years = BTreeSet::new();
        let mut mention_authors = HashSet::new();
        // author id -> (publication count, first-appearance rank)
        let mut per_author: HashMap<String, (u64, usize)> = HashMap::new();

        for publication in self.publications() {
            total_publications += 1;
            if publication.has_pdf() {
                with_pdfs += 1;
            }
            if publication.has_mentions() {
                with_mentions += 1;
                mention_authors.insert(publication.author_id.clone());
            }
            if let Some(year) = publication.publication_year {
                years.insert(year);
            }
            let rank = per_author.len();
            per_author
                .entry(publication.author_id)
                .or_insert((0, rank))
                .0 += 1;
        }

        let mut ranked: Vec<(String, u64, usize)> = per_author
            .into_iter()
            .map(|(id, (count, rank))| (id, count, rank))
            .collect();
        ranked.sort_by_key(|(_, count, rank)| (Reverse(*count), *rank));
        ranked.truncate(TOP_AUTHORS);

        let top_authors_by_publications = ranked
            .into_iter()
            .filter_map(|(author_id, count, _)| {
                let author = self.get_author_by_id(&author_id)?;
                Some(TopAuthor {
                    author_id,
                    name: author.name,
                    publication_count: count,
                })
            })
            .collect();

        let year_range = match (years.first(), years.last()) {
            (Some(lo), Some(hi)) => Some((*lo, *hi)),
            _ => None,
        };

        DatasetStatistics {
            run_directory: self.run_dir.display().to_string(),
            total_authors: self.count_authors(All) as u64,
            total_publications,
            publications_with_pdfs: with_pdfs,
            publications_with_mentions: with_mentions,
            authors_with_mentions: mention_authors.len() as u64,
            unique_years: years.into_iter().collect(),
            year_range,
            top_authors_by_publications,
        }
    }

    /// Write the matching publications to `output_path` as JSON lines and return how many
    /// were written. With `compress`, `.gz` is appended to the path unless already present.
    pub fn export_filtered<P: Predicate<PublicationRecord>>(
        &self,
        output_path: &Path,
        predicate: P,
        compress: bool,
    ) -> Result<usize> {
        let (path, count) = export::write_jsonl(
            output_path,
            self.query_publications(predicate),
            compress,
            self.codec,
        )?;
        info!("Exported {} publications to {}", count, path.display());
        Ok(count)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TopAuthor {
    pub author_id: String,
    pub name: String,
    pub publication_count: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DatasetStatistics {
    pub run_directory: String,
    pub total_authors: u64,
    pub total_publications: u64,
    pub publications_with_pdfs: u64,
    pub publications_with_mentions: u64,
    pub authors_with_mentions: u64,
    pub unique_years: Vec<i32>,
    pub year_range: Option<(i32, i32)>,
    pub top_authors_by_publications: Vec<TopAuthor>,
}

struct OpenFile {
    path: PathBuf,
    reader: Box<dyn BufRead + Send>,
    line_no: usize,
}

/// Lazy scan over a list of JSONL files, yielding the decoded records that match `P`.
///
/// Malformed lines are skipped with a warning. A file that cannot be opened, or that fails
/// mid-read (for example a gzip stream cut short), is abandoned with a warning and the scan
/// moves on to the next file.
pub struct Records<T, P> {
    files: std::vec::IntoIter<PathBuf>,
    current: Option<OpenFile>,
    codec: Codec,
    predicate: P,
    buf: Vec<u8>,
    _record: PhantomData<fn() -> T>,
}

impl<T, P> Records<T, P> {
    fn new(files: Vec<PathBuf>, codec: Codec, predicate: P) -> Self {
        Records {
            files: files.into_iter(),
            current: None,
            codec,
            predicate,
            buf: Vec::with_capacity(4096),
            _record: PhantomData,
        }
    }
}

impl<T, P> Iterator for Records<T, P>
where
    T: DeserializeOwned,
    P: Predicate<T>,
{
    type Item = T;

    fn next(&mut self) -> Option<T> {
        loop {
            if self.current.is_none() {
                let path = self.files.next()?;
                match open_reader(&path) {
                    Ok(reader) => {
                        self.current = Some(OpenFile {
                            path,
                            reader,
                            line_no: 0,
                        })
                    }
                    Err(e) => {
                        warn!("Skipping unreadable file {}: {}", path.display(), e);
                        continue;
                    }
                }
            }
            let Some(file) = self.current.as_mut() else {
                continue;
            };

            self.buf.clear();
            match file.reader.read_until(b'\n', &mut self.buf) {
                Ok(0) => {
                    self.current = None;
                }
                Ok(_) => {
                    file.line_no += 1;
                    let line = match std::str::from_utf8(&self.buf) {
                        Ok(line) => line.trim(),
                        Err(e) => {
                            warn!(
                                "Skipping non-UTF-8 line {} in {}: {}",
                                file.line_no,
                                file.path.display(),
                                e
                            );
                            continue;
                        }
                    };
                    if line.is_empty() {
                        continue;
                    }
                    match self.codec.decode_line::<T>(line) {
                        Ok(record) => {
                            if self.predicate.matches(&record) {
                                return Some(record);
                            }
                        }
                        Err(e) => warn!(
                            "Skipping malformed line {} in {}: {}",
                            file.line_no,
                            file.path.display(),
                            e
                        ),
                    }
                }
                Err(e) => {
                    warn!(
                        "Stopped reading {} after line {}: {}",
                        file.path.display(),
                        file.line_no,
                        e
                    );
                    self.current = None;
                }
            }
        }
    }
}
