use openalex_runstore::layout::STATS_FILE;
use openalex_runstore::{
    combine_all_publications, query_latest_run, Author, DatasetQuery, ProcessingRecord,
    ProcessingResult, Publication, PublicationRecord, RunRegistry, RunWriter, StatsDocument,
    StonybrookValidation, WriterOptions,
};
use rayon::prelude::*;
use std::collections::HashMap;
use std::fs;
use std::io::{BufRead, BufReader};
use std::path::Path;
use tempfile::TempDir;

fn author(id: &str, name: &str) -> Author {
    Author {
        id: id.to_string(),
        name: name.to_string(),
        works_count: 10,
        cited_by_count: 100,
        affiliations: vec!["Stony Brook University".to_string()],
    }
}

fn publication(id: &str, title: &str, year: Option<i32>) -> Publication {
    Publication {
        id: id.to_string(),
        title: title.to_string(),
        doi: Some(format!("10.1000/{}", id)),
        publication_year: year,
        pdf_url: None,
        authors: vec![],
        abstract_text: None,
    }
}

fn result(pdf: bool, mention: bool) -> ProcessingResult {
    ProcessingResult {
        pdf_downloaded: pdf,
        pdf_path: pdf.then(|| "/tmp/paper.pdf".to_string()),
        text_extracted: pdf,
        text_length: if pdf { 1200 } else { 0 },
        stonybrook_validation: StonybrookValidation {
            found: mention,
            mentions: if mention { vec!["Stony Brook".to_string()] } else { vec![] },
            contexts: if mention {
                vec!["a".into(), "b".into(), "c".into(), "d".into()]
            } else {
                vec![]
            },
            count: mention as i64,
        },
        summary: mention.then(|| "summary".to_string()),
        timestamp: None,
    }
}

/// Three authors, seven publications, three of them with mentions.
fn write_sample_run(root: &Path, options: WriterOptions) -> std::path::PathBuf {
    let writer = RunWriter::create(root, options).unwrap();

    writer
        .add_author(
            &author("A1", "Ada Lovelace"),
            &[
                publication("W1", "Analytical Engines", Some(2020)),
                publication("W2", "More Engines", Some(2021)),
                publication("W3", "Notes", None),
            ],
            &[result(true, true), result(false, false), result(true, false)],
        )
        .unwrap();
    writer
        .add_author(
            &author("A2", "Alan Turing"),
            &[publication("W4", "Computable Numbers", Some(2020))],
            &[result(false, false)],
        )
        .unwrap();
    writer
        .add_author(
            &author("A3", "Grace Hopper"),
            &[
                publication("W5", "Compilers", Some(2019)),
                publication("W6", "COBOL", Some(2021)),
                publication("W7", "Nanoseconds", Some(2021)),
            ],
            &[result(true, true), result(true, true), result(false, false)],
        )
        .unwrap();

    writer.finalize().unwrap();
    writer.run_dir().to_path_buf()
}

#[test]
fn uncompressed_run_round_trips() {
    let dir = TempDir::new().unwrap();
    let run_dir = write_sample_run(dir.path(), WriterOptions::uncompressed(2));

    let query = DatasetQuery::open(&run_dir).unwrap();
    assert_eq!(query.publication_chunks().len(), 4);
    assert_eq!(query.authors().count(), 3);

    let ids: Vec<String> = query.publications().map(|p| p.id).collect();
    assert_eq!(ids, vec!["W1", "W2", "W3", "W4", "W5", "W6", "W7"]);

    let w1 = query.publications().next().unwrap();
    assert_eq!(w1.author_id, "A1");
    assert_eq!(w1.sequence_number, 1);
    assert_eq!(w1.processing.stonybrook_validation.contexts.len(), 3);

    let stats = StatsDocument::read(&run_dir.join(STATS_FILE)).unwrap();
    assert_eq!(stats.processing_stats.total_authors, 3);
    assert_eq!(stats.processing_stats.total_publications, 7);
    assert_eq!(stats.processing_stats.pdfs_downloaded, 4);
    assert_eq!(stats.processing_stats.stonybrook_mentions_found, 3);
    assert_eq!(stats.processing_stats.summaries_generated, 3);
    assert_eq!(stats.files.total_chunks, 4);
    assert!(!stats.files.compression_enabled);
}

#[test]
fn compressed_run_preserves_every_publication_field() {
    let dir = TempDir::new().unwrap();
    let writer = RunWriter::create(dir.path(), WriterOptions::default()).unwrap();

    let ada = author("A1", "Ada Lovelace");
    let paper = Publication {
        id: "W1".to_string(),
        title: "Sketch of the Analytical Engine".to_string(),
        doi: Some("10.1000/w1".to_string()),
        publication_year: Some(1843),
        pdf_url: Some("https://example.org/w1.pdf".to_string()),
        authors: vec!["Ada Lovelace".to_string(), "Luigi Menabrea".to_string()],
        abstract_text: Some("Notes on the engine.".to_string()),
    };
    let outcome = ProcessingResult {
        pdf_downloaded: true,
        pdf_path: Some("/data/pdfs/w1.pdf".to_string()),
        text_extracted: true,
        text_length: 48_213,
        stonybrook_validation: StonybrookValidation {
            found: true,
            mentions: vec!["Stony Brook University".to_string()],
            contexts: vec!["c1".into(), "c2".into(), "c3".into(), "c4".into()],
            count: 4,
        },
        summary: Some("A translation with extensive notes.".to_string()),
        timestamp: Some("2024-05-01T10:30:00.000000".to_string()),
    };
    writer.add_author(&ada, &[paper], &[outcome]).unwrap();
    writer.finalize().unwrap();
    assert!(writer.run_dir().join("publications_chunk_0000.jsonl.gz").is_file());

    let expected = PublicationRecord {
        id: "W1".to_string(),
        title: "Sketch of the Analytical Engine".to_string(),
        doi: Some("10.1000/w1".to_string()),
        publication_year: Some(1843),
        authors: vec!["Ada Lovelace".to_string(), "Luigi Menabrea".to_string()],
        abstract_text: Some("Notes on the engine.".to_string()),
        pdf_url: Some("https://example.org/w1.pdf".to_string()),
        author_id: "A1".to_string(),
        author_name: "Ada Lovelace".to_string(),
        sequence_number: 1,
        processing: ProcessingRecord {
            pdf_downloaded: true,
            pdf_path: Some("/data/pdfs/w1.pdf".to_string()),
            text_extracted: true,
            text_length: 48_213,
            stonybrook_validation: StonybrookValidation {
                found: true,
                mentions: vec!["Stony Brook University".to_string()],
                contexts: vec!["c1".into(), "c2".into(), "c3".into()],
                count: 4,
            },
            summary: Some("A translation with extensive notes.".to_string()),
            processing_timestamp: Some("2024-05-01T10:30:00.000000".to_string()),
        },
    };

    let query = DatasetQuery::open(writer.run_dir()).unwrap();
    let records: Vec<PublicationRecord> = query.publications().collect();
    assert_eq!(records, vec![expected]);

    let stored = query.get_author_by_id("A1").unwrap();
    assert_eq!(stored.affiliations, vec!["Stony Brook University"]);
    assert_eq!(stored.publications_processed, 1);
    assert_eq!(stored.pdfs_found, 1);
    assert_eq!(stored.stonybrook_mentions, 1);
    assert_eq!(stored.summaries_generated, 1);
    assert!(stored.processing_timestamp.is_some());
}

#[test]
fn compression_is_transparent_to_queries() {
    let dir = TempDir::new().unwrap();
    let plain = write_sample_run(&dir.path().join("plain"), WriterOptions::uncompressed(2));
    let gzip = write_sample_run(
        &dir.path().join("gzip"),
        WriterOptions {
            chunk_size: Some(2),
            ..Default::default()
        },
    );

    assert!(gzip.join("authors.jsonl.gz").is_file());
    assert!(gzip.join("publications_chunk_0000.jsonl.gz").is_file());

    let plain = DatasetQuery::open(&plain).unwrap();
    let gzip = DatasetQuery::open(&gzip).unwrap();

    let strip = |mut a: openalex_runstore::AuthorRecord| {
        a.processing_timestamp = None;
        a
    };
    let plain_authors: Vec<_> = plain.authors().map(strip).collect();
    let gzip_authors: Vec<_> = gzip.authors().map(strip).collect();
    assert_eq!(plain_authors, gzip_authors);

    let plain_pubs: Vec<PublicationRecord> = plain.publications().collect();
    let gzip_pubs: Vec<PublicationRecord> = gzip.publications().collect();
    assert_eq!(plain_pubs.len(), 7);
    assert_eq!(plain_pubs, gzip_pubs);

    let mut plain_stats = plain.get_statistics();
    let mut gzip_stats = gzip.get_statistics();
    plain_stats.run_directory.clear();
    gzip_stats.run_directory.clear();
    assert_eq!(plain_stats, gzip_stats);
}

#[test]
fn every_publication_joins_to_an_author() {
    let dir = TempDir::new().unwrap();
    let run_dir = write_sample_run(dir.path(), WriterOptions::default());
    let query = DatasetQuery::open(&run_dir).unwrap();

    let authors: HashMap<String, u64> = query
        .authors()
        .map(|a| (a.id, a.publications_processed))
        .collect();

    let mut per_author: HashMap<String, u64> = HashMap::new();
    for publication in query.publications() {
        assert!(authors.contains_key(&publication.author_id));
        *per_author.entry(publication.author_id).or_default() += 1;
    }
    assert_eq!(per_author, authors);

    let mention_authors: Vec<String> = query.get_authors_with_mentions().map(|a| a.id).collect();
    assert_eq!(mention_authors, vec!["A1", "A3"]);
}

#[test]
fn concurrent_writers_keep_chunks_contiguous() {
    let dir = TempDir::new().unwrap();
    let writer = RunWriter::create(dir.path(), WriterOptions::uncompressed(5)).unwrap();

    (0..40).into_par_iter().for_each(|i| {
        let n = i % 4 + 1;
        let publications: Vec<Publication> = (0..n)
            .map(|p| publication(&format!("A{}-W{}", i, p), "Parallel", Some(2020)))
            .collect();
        let results = vec![result(p_has_pdf(i), false); n];
        writer
            .add_author(&author(&format!("A{}", i), "Worker"), &publications, &results)
            .unwrap();
    });
    writer.finalize().unwrap();

    let expected_publications: u64 = (0..40u64).map(|i| i % 4 + 1).sum();
    let stats = writer.stats();
    assert_eq!(stats.total_authors, 40);
    assert_eq!(stats.total_publications, expected_publications);

    let query = DatasetQuery::open(writer.run_dir()).unwrap();

    // Every chunk but the last is full
    let chunks = query.publication_chunks().to_vec();
    for chunk in &chunks[..chunks.len() - 1] {
        let lines = BufReader::new(fs::File::open(chunk).unwrap()).lines().count();
        assert_eq!(lines, 5);
    }

    // One author's publications are never interleaved with another's
    let order: Vec<String> = query.publications().map(|p| p.author_id).collect();
    let mut seen = std::collections::HashSet::new();
    let mut previous: Option<&String> = None;
    for id in &order {
        if previous != Some(id) {
            assert!(seen.insert(id.clone()), "author {} split across the log", id);
        }
        previous = Some(id);
    }
    assert_eq!(order.len() as u64, expected_publications);
}

fn p_has_pdf(i: usize) -> bool {
    i % 3 == 0
}

#[test]
fn registry_finds_latest_and_named_runs() {
    let dir = TempDir::new().unwrap();
    let first = write_sample_run(dir.path(), WriterOptions::uncompressed(2));
    let second = write_sample_run(dir.path(), WriterOptions::default());
    assert_ne!(first, second);

    let registry = RunRegistry::new(dir.path());
    let runs = registry.list_runs().unwrap();
    assert_eq!(runs.len(), 2);
    assert!(runs.iter().all(|r| r.complete && r.total_publications == 7));
    assert_eq!(runs[0].run_directory, second);

    let latest = query_latest_run(dir.path()).unwrap().unwrap();
    assert_eq!(latest.run_dir(), second.as_path());

    let name = first.file_name().unwrap().to_str().unwrap();
    let named = registry.get_run(name).unwrap().unwrap();
    assert_eq!(named.count_publications(|_: &PublicationRecord| true), 7);
}

#[test]
fn unfinished_run_is_listed_and_queryable() {
    let dir = TempDir::new().unwrap();
    let writer = RunWriter::create(dir.path(), WriterOptions::default()).unwrap();
    writer
        .add_author(
            &author("A1", "Ada Lovelace"),
            &[publication("W1", "Analytical Engines", Some(2020))],
            &[result(true, true)],
        )
        .unwrap();

    let runs = RunRegistry::new(dir.path()).list_runs().unwrap();
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].created, "Unknown");
    assert_eq!(runs[0].total_authors, 0);
    assert!(!runs[0].complete);

    // Flushed gzip members are readable before finalize
    let query = DatasetQuery::open(writer.run_dir()).unwrap();
    assert_eq!(query.publications().count(), 1);
    assert_eq!(query.get_author_by_id("A1").unwrap().pdfs_found, 1);

    writer.finalize().unwrap();
}

#[test]
fn combine_concatenates_chunks_in_order() {
    let dir = TempDir::new().unwrap();
    let run_dir = write_sample_run(dir.path(), WriterOptions {
        chunk_size: Some(3),
        ..Default::default()
    });

    let output = dir.path().join("all_publications.jsonl");
    let count = combine_all_publications(&run_dir, &output).unwrap();
    assert_eq!(count, 7);

    let lines: Vec<String> = BufReader::new(fs::File::open(&output).unwrap())
        .lines()
        .map(|l| l.unwrap())
        .collect();
    assert_eq!(lines.len(), 7);
    let first: serde_json::Value = serde_json::from_str(&lines[0]).unwrap();
    assert_eq!(first["id"], "W1");
    let last: serde_json::Value = serde_json::from_str(&lines[6]).unwrap();
    assert_eq!(last["id"], "W7");
}
