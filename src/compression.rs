//! Plain/gzip file sinks and sources.
//!
//! Writers pick gzip or plain once at open time; readers infer it from the `.gz` extension.
//! Everything above this module deals in lines only.

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::Path;

const READ_BUFFER: usize = 256 * 1024;
const WRITE_BUFFER: usize = 64 * 1024;

pub const GZIP_EXTENSION: &str = "gz";

pub fn is_gzip(path: &Path) -> bool {
    path.extension().and_then(|s| s.to_str()) == Some(GZIP_EXTENSION)
}

/// Open a file for line reading, decompressing if it ends in `.gz`.
pub fn open_reader(path: &Path) -> io::Result<Box<dyn BufRead + Send>> {
    let file = File::open(path)?;
    if is_gzip(path) {
        let decoder = GzDecoder::new(file);
        Ok(Box::new(BufReader::with_capacity(READ_BUFFER, decoder)))
    } else {
        Ok(Box::new(BufReader::with_capacity(READ_BUFFER, file)))
    }
}

/// An append-only output file. Once finished, further writes fail.
pub enum LineSink {
    Plain(Option<BufWriter<File>>),
    Gzip(Option<GzEncoder<BufWriter<File>>>),
}

impl LineSink {
    /// Create (truncate) `path`. `level` is the gzip level 0-9, ignored when not compressing.
    pub fn create(path: &Path, compress: bool, level: u32) -> io::Result<Self> {
        let file = File::create(path)?;
        let buffered = BufWriter::with_capacity(WRITE_BUFFER, file);
        if compress {
            Ok(LineSink::Gzip(Some(GzEncoder::new(
                buffered,
                Compression::new(level.min(9)),
            ))))
        } else {
            Ok(LineSink::Plain(Some(buffered)))
        }
    }

    pub fn write_line(&mut self, line: &[u8]) -> io::Result<()> {
        match self {
            LineSink::Plain(Some(w)) => w.write_all(line),
            LineSink::Gzip(Some(w)) => w.write_all(line),
            _ => Err(io::Error::other("write to finished sink")),
        }
    }

    /// Push buffered bytes to disk. For gzip this is a sync flush, so everything written so
    /// far decodes even if the stream is never finished.
    pub fn flush(&mut self) -> io::Result<()> {
        match self {
            LineSink::Plain(Some(w)) => w.flush(),
            LineSink::Gzip(Some(w)) => w.flush(),
            _ => Ok(()),
        }
    }

    /// Flush, write the gzip trailer if any, and close the file. Safe to call twice.
    pub fn finish(&mut self) -> io::Result<()> {
        match self {
            LineSink::Plain(w) => match w.take() {
                Some(mut writer) => writer.flush(),
                None => Ok(()),
            },
            LineSink::Gzip(w) => match w.take() {
                Some(encoder) => encoder.finish()?.flush(),
                None => Ok(()),
            },
        }
    }

    pub fn is_finished(&self) -> bool {
        matches!(self, LineSink::Plain(None) | LineSink::Gzip(None))
    }
}
