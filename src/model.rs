//! Record types persisted by the store, plus the upstream shapes they are built from.
//!
//! The upstream types (`Author`, `Publication`, `ProcessingResult`) mirror what the fetch and
//! PDF-processing stages hand over. The store never produces them; it only folds them into
//! `AuthorRecord` / `PublicationRecord` lines.

use serde::{Deserialize, Serialize};

/// Maximum number of context snippets kept per validation result
pub const MAX_CONTEXTS: usize = 3;

// ====== UPSTREAM SHAPES ======

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Author {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub works_count: i64,
    #[serde(default)]
    pub cited_by_count: i64,
    #[serde(default)]
    pub affiliations: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Publication {
    pub id: String,
    #[serde(default)]
    pub title: String,
    pub doi: Option<String>,
    pub publication_year: Option<i32>,
    pub pdf_url: Option<String>,
    #[serde(default)]
    pub authors: Vec<String>,
    #[serde(rename = "abstract")]
    pub abstract_text: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StonybrookValidation {
    pub found: bool,
    pub mentions: Vec<String>,
    pub contexts: Vec<String>,
    pub count: i64,
}

/// Per-publication outcome of the PDF/text/validation/summary stage.
///
/// Every key is optional on the wire; an absent `stonybrook_validation` (or an empty
/// object) reads as "not found".
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessingResult {
    pub pdf_downloaded: bool,
    pub pdf_path: Option<String>,
    pub text_extracted: bool,
    pub text_length: i64,
    pub stonybrook_validation: StonybrookValidation,
    pub summary: Option<String>,
    pub timestamp: Option<String>,
}

impl ProcessingResult {
    pub fn has_summary(&self) -> bool {
        self.summary.as_deref().is_some_and(|s| !s.is_empty())
    }
}

// ====== PERSISTED RECORDS ======

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthorRecord {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub works_count: i64,
    #[serde(default)]
    pub cited_by_count: i64,
    #[serde(default)]
    pub affiliations: Vec<String>,
    #[serde(default)]
    pub publications_processed: u64,
    #[serde(default)]
    pub pdfs_found: u64,
    #[serde(default)]
    pub stonybrook_mentions: u64,
    #[serde(default)]
    pub summaries_generated: u64,
    #[serde(default)]
    pub processing_timestamp: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessingRecord {
    pub pdf_downloaded: bool,
    pub pdf_path: Option<String>,
    pub text_extracted: bool,
    pub text_length: i64,
    pub stonybrook_validation: StonybrookValidation,
    pub summary: Option<String>,
    pub processing_timestamp: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublicationRecord {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub doi: Option<String>,
    #[serde(default)]
    pub publication_year: Option<i32>,
    #[serde(default)]
    pub authors: Vec<String>,
    #[serde(rename = "abstract", default)]
    pub abstract_text: Option<String>,
    #[serde(default)]
    pub pdf_url: Option<String>,
    pub author_id: String,
    #[serde(default)]
    pub author_name: String,
    #[serde(default)]
    pub sequence_number: u64,
    #[serde(default)]
    pub processing: ProcessingRecord,
}

impl From<&ProcessingResult> for ProcessingRecord {
    fn from(result: &ProcessingResult) -> Self {
        let mut validation = result.stonybrook_validation.clone();
        validation.contexts.truncate(MAX_CONTEXTS);

        ProcessingRecord {
            pdf_downloaded: result.pdf_downloaded,
            pdf_path: result.pdf_path.clone(),
            text_extracted: result.text_extracted,
            text_length: result.text_length,
            stonybrook_validation: validation,
            summary: result.summary.clone(),
            processing_timestamp: result.timestamp.clone(),
        }
    }
}

impl PublicationRecord {
    /// Build the persisted record for the `sequence_number`-th (1-based) publication of `author`.
    pub fn from_upstream(
        author: &Author,
        publication: &Publication,
        sequence_number: u64,
        result: &ProcessingResult,
    ) -> Self {
        PublicationRecord {
            id: publication.id.clone(),
            title: publication.title.clone(),
            doi: publication.doi.clone(),
            publication_year: publication.publication_year,
            authors: publication.authors.clone(),
            abstract_text: publication.abstract_text.clone(),
            pdf_url: publication.pdf_url.clone(),
            author_id: author.id.clone(),
            author_name: author.name.clone(),
            sequence_number,
            processing: ProcessingRecord::from(result),
        }
    }

    pub fn has_pdf(&self) -> bool {
        self.processing.pdf_downloaded
    }

    pub fn has_mentions(&self) -> bool {
        self.processing.stonybrook_validation.found
    }

    pub fn has_summary(&self) -> bool {
        self.processing
            .summary
            .as_deref()
            .is_some_and(|s| !s.is_empty())
    }
}

/// Per-author tallies derived from that author's processing results.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AuthorTally {
    pub publications: u64,
    pub pdfs: u64,
    pub mentions: u64,
    pub summaries: u64,
}

impl AuthorTally {
    pub fn from_results(results: &[ProcessingResult]) -> Self {
        let mut tally = AuthorTally {
            publications: results.len() as u64,
            ..Default::default()
        };
        for result in results {
            if result.pdf_downloaded {
                tally.pdfs += 1;
            }
            if result.stonybrook_validation.found {
                tally.mentions += 1;
            }
            if result.has_summary() {
                tally.summaries += 1;
            }
        }
        tally
    }
}

impl AuthorRecord {
    pub fn from_upstream(author: &Author, tally: AuthorTally, timestamp: String) -> Self {
        AuthorRecord {
            id: author.id.clone(),
            name: author.name.clone(),
            works_count: author.works_count,
            cited_by_count: author.cited_by_count,
            affiliations: author.affiliations.clone(),
            publications_processed: tally.publications,
            pdfs_found: tally.pdfs,
            stonybrook_mentions: tally.mentions,
            summaries_generated: tally.summaries,
            processing_timestamp: Some(timestamp),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn processing_result_accepts_empty_validation_object() {
        let raw = r#"{
            "pdf_downloaded": true,
            "stonybrook_validation": {},
            "timestamp": "2024-01-01T00:00:00"
        }"#;
        let result: ProcessingResult = serde_json::from_str(raw).unwrap();
        assert!(result.pdf_downloaded);
        assert!(!result.stonybrook_validation.found);
        assert_eq!(result.text_length, 0);
        assert_eq!(result.timestamp.as_deref(), Some("2024-01-01T00:00:00"));
    }

    #[test]
    fn contexts_are_capped_when_embedded() {
        let result = ProcessingResult {
            stonybrook_validation: StonybrookValidation {
                found: true,
                mentions: vec!["stony brook".into()],
                contexts: (0..5).map(|i| format!("ctx {}", i)).collect(),
                count: 5,
            },
            ..Default::default()
        };
        let record = ProcessingRecord::from(&result);
        assert_eq!(record.stonybrook_validation.contexts.len(), MAX_CONTEXTS);
        assert_eq!(record.stonybrook_validation.count, 5);
    }

    #[test]
    fn tally_counts_only_non_empty_summaries() {
        let results = vec![
            ProcessingResult {
                pdf_downloaded: true,
                summary: Some("short summary".into()),
                ..Default::default()
            },
            ProcessingResult {
                summary: Some(String::new()),
                ..Default::default()
            },
            ProcessingResult::default(),
        ];
        let tally = AuthorTally::from_results(&results);
        assert_eq!(
            tally,
            AuthorTally {
                publications: 3,
                pdfs: 1,
                mentions: 0,
                summaries: 1,
            }
        );
    }

    #[test]
    fn abstract_uses_wire_name() {
        let publication = Publication {
            id: "W1".into(),
            title: "Title".into(),
            doi: None,
            publication_year: Some(2020),
            pdf_url: None,
            authors: vec![],
            abstract_text: Some("text".into()),
        };
        let value = serde_json::to_value(&publication).unwrap();
        assert_eq!(value["abstract"], "text");
    }
}
