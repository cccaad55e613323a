//! Columnar export of a finished run: `authors.parquet` and `publications.parquet`,
//! ready for Spark/Polars/DuckDB. List fields are stored as JSON strings.

use crate::error::Result;
use crate::model::{AuthorRecord, PublicationRecord};
use crate::query::DatasetQuery;
use arrow::array::*;
use arrow::datatypes::*;
use arrow::record_batch::RecordBatch;
use indicatif::{ProgressBar, ProgressStyle};
use parquet::arrow::ArrowWriter;
use parquet::file::properties::WriterProperties;
use std::fs::{create_dir_all, File};
use std::path::Path;
use std::sync::Arc;
use tracing::info;

pub const DEFAULT_BATCH_SIZE: usize = 50_000;

// Macro for creating Arrow schema fields
macro_rules! field {
    ($name:expr, $data_type:expr) => {
        Field::new($name, $data_type, true)
    };
    ($name:expr, $data_type:expr, $nullable:expr) => {
        Field::new($name, $data_type, $nullable)
    };
}

// Macro for creating schemas with less boilerplate
macro_rules! schema {
    ($($name:expr => $data_type:expr $(, $nullable:expr)?);* $(;)?) => {
        Schema::new(vec![
            $(field!($name, $data_type $(, $nullable)?),)*
        ])
    };
}

macro_rules! string_array_required {
    ($records:expr, $field:ident) => {
        Arc::new(StringArray::from_iter_values(
            $records.iter().map(|r| &r.$field),
        ))
    };
}

macro_rules! string_array_optional {
    ($records:expr, $field:ident) => {
        Arc::new(StringArray::from_iter(
            $records.iter().map(|r| r.$field.as_deref()),
        ))
    };
}

macro_rules! large_string_array_required {
    ($records:expr, $field:ident) => {
        Arc::new(LargeStringArray::from_iter_values(
            $records.iter().map(|r| &r.$field),
        ))
    };
}

macro_rules! large_string_array_optional {
    ($records:expr, $field:ident) => {
        Arc::new(LargeStringArray::from_iter(
            $records.iter().map(|r| r.$field.as_deref()),
        ))
    };
}

macro_rules! int64_array {
    ($records:expr, $field:ident) => {
        Arc::new(Int64Array::from_iter_values(
            $records.iter().map(|r| r.$field),
        ))
    };
}

macro_rules! int32_array_optional {
    ($records:expr, $field:ident) => {
        Arc::new(Int32Array::from_iter($records.iter().map(|r| r.$field)))
    };
}

macro_rules! bool_array_required {
    ($records:expr, $field:ident) => {
        Arc::new(BooleanArray::from_iter(
            $records.iter().map(|r| Some(r.$field)),
        ))
    };
}

macro_rules! record_batch {
    ($schema:expr, $($array:expr),* $(,)?) => {
        RecordBatch::try_new(Arc::new($schema), vec![$($array,)*])
    };
}

#[derive(Debug, Clone)]
struct AuthorRow {
    id: String,
    name: String,
    works_count: i64,
    cited_by_count: i64,
    affiliations: String,
    publications_processed: i64,
    pdfs_found: i64,
    stonybrook_mentions: i64,
    summaries_generated: i64,
    processing_timestamp: Option<String>,
}

impl From<AuthorRecord> for AuthorRow {
    fn from(r: AuthorRecord) -> Self {
        AuthorRow {
            affiliations: serde_json::to_string(&r.affiliations).unwrap_or_default(),
            id: r.id,
            name: r.name,
            works_count: r.works_count,
            cited_by_count: r.cited_by_count,
            publications_processed: r.publications_processed as i64,
            pdfs_found: r.pdfs_found as i64,
            stonybrook_mentions: r.stonybrook_mentions as i64,
            summaries_generated: r.summaries_generated as i64,
            processing_timestamp: r.processing_timestamp,
        }
    }
}

#[derive(Debug, Clone)]
struct PublicationRow {
    id: String,
    title: String,
    doi: Option<String>,
    publication_year: Option<i32>,
    authors: String,
    abstract_text: Option<String>,
    pdf_url: Option<String>,
    author_id: String,
    author_name: String,
    sequence_number: i64,
    pdf_downloaded: bool,
    pdf_path: Option<String>,
    text_extracted: bool,
    text_length: i64,
    stonybrook_found: bool,
    stonybrook_count: i64,
    stonybrook_mentions: String,
    summary: Option<String>,
    processing_timestamp: Option<String>,
}

impl From<PublicationRecord> for PublicationRow {
    fn from(r: PublicationRecord) -> Self {
        let processing = r.processing;
        let validation = processing.stonybrook_validation;
        PublicationRow {
            authors: serde_json::to_string(&r.authors).unwrap_or_default(),
            id: r.id,
            title: r.title,
            doi: r.doi,
            publication_year: r.publication_year,
            abstract_text: r.abstract_text,
            pdf_url: r.pdf_url,
            author_id: r.author_id,
            author_name: r.author_name,
            sequence_number: r.sequence_number as i64,
            pdf_downloaded: processing.pdf_downloaded,
            pdf_path: processing.pdf_path,
            text_extracted: processing.text_extracted,
            text_length: processing.text_length,
            stonybrook_found: validation.found,
            stonybrook_count: validation.count,
            stonybrook_mentions: serde_json::to_string(&validation.mentions).unwrap_or_default(),
            summary: processing.summary,
            processing_timestamp: processing.processing_timestamp,
        }
    }
}

fn authors_schema() -> Schema {
    schema! {
        "id" => DataType::Utf8, false;
        "name" => DataType::Utf8, false;
        "works_count" => DataType::Int64, false;
        "cited_by_count" => DataType::Int64, false;
        "affiliations" => DataType::Utf8, false;
        "publications_processed" => DataType::Int64, false;
        "pdfs_found" => DataType::Int64, false;
        "stonybrook_mentions" => DataType::Int64, false;
        "summaries_generated" => DataType::Int64, false;
        "processing_timestamp" => DataType::Utf8;
    }
}

fn publications_schema() -> Schema {
    schema! {
        "id" => DataType::Utf8, false;
        "title" => DataType::LargeUtf8, false;
        "doi" => DataType::Utf8;
        "publication_year" => DataType::Int32;
        "authors" => DataType::LargeUtf8, false;
        "abstract" => DataType::LargeUtf8;
        "pdf_url" => DataType::Utf8;
        "author_id" => DataType::Utf8, false;
        "author_name" => DataType::Utf8, false;
        "sequence_number" => DataType::Int64, false;
        "pdf_downloaded" => DataType::Boolean, false;
        "pdf_path" => DataType::Utf8;
        "text_extracted" => DataType::Boolean, false;
        "text_length" => DataType::Int64, false;
        "stonybrook_found" => DataType::Boolean, false;
        "stonybrook_count" => DataType::Int64, false;
        "stonybrook_mentions" => DataType::Utf8, false;
        "summary" => DataType::LargeUtf8;
        "processing_timestamp" => DataType::Utf8;
    }
}

fn authors_to_record_batch(records: Vec<AuthorRow>) -> Result<RecordBatch> {
    let batch = record_batch!(
        authors_schema(),
        string_array_required!(records, id),
        string_array_required!(records, name),
        int64_array!(records, works_count),
        int64_array!(records, cited_by_count),
        string_array_required!(records, affiliations),
        int64_array!(records, publications_processed),
        int64_array!(records, pdfs_found),
        int64_array!(records, stonybrook_mentions),
        int64_array!(records, summaries_generated),
        string_array_optional!(records, processing_timestamp),
    )?;

    Ok(batch)
}

fn publications_to_record_batch(records: Vec<PublicationRow>) -> Result<RecordBatch> {
    let batch = record_batch!(
        publications_schema(),
        string_array_required!(records, id),
        large_string_array_required!(records, title),
        string_array_optional!(records, doi),
        int32_array_optional!(records, publication_year),
        large_string_array_required!(records, authors),
        large_string_array_optional!(records, abstract_text),
        string_array_optional!(records, pdf_url),
        string_array_required!(records, author_id),
        string_array_required!(records, author_name),
        int64_array!(records, sequence_number),
        bool_array_required!(records, pdf_downloaded),
        string_array_optional!(records, pdf_path),
        bool_array_required!(records, text_extracted),
        int64_array!(records, text_length),
        bool_array_required!(records, stonybrook_found),
        int64_array!(records, stonybrook_count),
        string_array_required!(records, stonybrook_mentions),
        large_string_array_optional!(records, summary),
        string_array_optional!(records, processing_timestamp),
    )?;

    Ok(batch)
}

fn create_parquet_writer(output_path: &Path, schema: Schema) -> Result<ArrowWriter<File>> {
    let file = File::create(output_path)?;
    let props = WriterProperties::builder()
        .set_compression(parquet::basic::Compression::SNAPPY)
        .build();

    let writer = ArrowWriter::try_new(file, Arc::new(schema), Some(props))?;
    Ok(writer)
}

fn write_parquet_batch<T>(
    writer: &mut ArrowWriter<File>,
    records: Vec<T>,
    to_record_batch: fn(Vec<T>) -> Result<RecordBatch>,
) -> Result<()> {
    if records.is_empty() {
        return Ok(());
    }

    let batch = to_record_batch(records)?;
    writer.write(&batch)?;
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParquetSummary {
    pub authors: usize,
    pub publications: usize,
}

/// Convert the run behind `query` into `authors.parquet` and `publications.parquet` under
/// `output_dir`, holding at most `batch_size` rows in memory per table.
pub fn export_run_to_parquet(
    query: &DatasetQuery,
    output_dir: &Path,
    batch_size: usize,
) -> Result<ParquetSummary> {
    let batch_size = batch_size.max(1);
    create_dir_all(output_dir)?;
    info!(
        "Exporting {} to Parquet in {}",
        query.run_dir().display(),
        output_dir.display()
    );

    // Authors
    let mut authors_writer =
        create_parquet_writer(&output_dir.join("authors.parquet"), authors_schema())?;
    let mut authors_batch = Vec::with_capacity(batch_size);
    let mut authors_count = 0usize;

    for record in query.authors() {
        authors_batch.push(AuthorRow::from(record));
        authors_count += 1;
        if authors_batch.len() >= batch_size {
            write_parquet_batch(
                &mut authors_writer,
                std::mem::take(&mut authors_batch),
                authors_to_record_batch,
            )?;
        }
    }
    write_parquet_batch(&mut authors_writer, authors_batch, authors_to_record_batch)?;
    authors_writer.close()?;

    // Publications, one chunk at a time
    let chunks = query.publication_chunks();
    let progress = ProgressBar::new(chunks.len() as u64);
    progress.set_style(
        ProgressStyle::with_template(
            "[{elapsed_precise}] {bar:50.cyan/blue} {pos:>7}/{len:7} chunks | {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar()),
    );
    progress.set_message("Converting publications...");

    let mut publications_writer = create_parquet_writer(
        &output_dir.join("publications.parquet"),
        publications_schema(),
    )?;
    let mut publications_batch = Vec::with_capacity(batch_size);
    let mut publications_count = 0usize;

    for chunk in chunks {
        for record in query.publications_in(chunk) {
            publications_batch.push(PublicationRow::from(record));
            publications_count += 1;
            if publications_batch.len() >= batch_size {
                write_parquet_batch(
                    &mut publications_writer,
                    std::mem::take(&mut publications_batch),
                    publications_to_record_batch,
                )?;
            }
        }
        progress.inc(1);
    }
    write_parquet_batch(
        &mut publications_writer,
        publications_batch,
        publications_to_record_batch,
    )?;
    publications_writer.close()?;

    progress.finish_with_message("Publications converted");
    info!(
        "Wrote {} authors and {} publications to Parquet",
        authors_count, publications_count
    );

    Ok(ParquetSummary {
        authors: authors_count,
        publications: publications_count,
    })
}
