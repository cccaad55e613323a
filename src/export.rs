//! Re-serializing record streams into standalone JSONL files.

use crate::codec::Codec;
use crate::compression::{is_gzip, LineSink};
use crate::error::Result;
use crate::query::DatasetQuery;
use crate::writer::DEFAULT_COMPRESSION_LEVEL;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::info;

/// Where a JSONL export actually lands: `.gz` is appended when compressing unless the path
/// already ends in it.
pub fn export_path(output_path: &Path, compress: bool) -> PathBuf {
    if compress && !is_gzip(output_path) {
        let mut name = output_path.as_os_str().to_os_string();
        name.push(".gz");
        PathBuf::from(name)
    } else {
        output_path.to_path_buf()
    }
}

/// Stream `records` into a new JSONL file. Returns the final path and the record count.
pub fn write_jsonl<T, I>(
    output_path: &Path,
    records: I,
    compress: bool,
    codec: Codec,
) -> Result<(PathBuf, usize)>
where
    T: Serialize,
    I: IntoIterator<Item = T>,
{
    let path = export_path(output_path, compress);
    let mut sink = LineSink::create(&path, compress, DEFAULT_COMPRESSION_LEVEL)?;
    let mut line = Vec::with_capacity(4096);
    let mut count = 0usize;

    for record in records {
        line.clear();
        codec.encode_line(&record, &mut line)?;
        sink.write_line(&line)?;
        count += 1;
    }
    sink.finish()?;
    Ok((path, count))
}

/// Concatenate every publication chunk of `run_dir`, in chunk order, into one uncompressed
/// JSONL file.
pub fn combine_all_publications(run_dir: &Path, output_path: &Path) -> Result<usize> {
    let query = DatasetQuery::open(run_dir)?;
    let (path, count) = write_jsonl(output_path, query.publications(), false, Codec::default())?;
    info!("Combined {} publications into {}", count, path.display());
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gz_suffix_only_added_when_missing() {
        assert_eq!(
            export_path(Path::new("out/all.jsonl"), true),
            PathBuf::from("out/all.jsonl.gz")
        );
        assert_eq!(
            export_path(Path::new("out/all.jsonl.gz"), true),
            PathBuf::from("out/all.jsonl.gz")
        );
        assert_eq!(
            export_path(Path::new("out/all.jsonl"), false),
            PathBuf::from("out/all.jsonl")
        );
    }
}
