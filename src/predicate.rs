//! Filters passed to the query engine.
//!
//! Any `Fn(&T) -> bool` is a predicate, so ad hoc filters stay one-liners; the named
//! strategies below back the engine's built-in queries.

use crate::model::{AuthorRecord, PublicationRecord};

pub trait Predicate<T> {
    fn matches(&self, record: &T) -> bool;
}

impl<T, F> Predicate<T> for F
where
    F: Fn(&T) -> bool,
{
    fn matches(&self, record: &T) -> bool {
        self(record)
    }
}

/// Matches every record.
#[derive(Debug, Clone, Copy, Default)]
pub struct All;

impl<T> Predicate<T> for All {
    fn matches(&self, _record: &T) -> bool {
        true
    }
}

#[derive(Debug, Clone)]
pub struct AuthorId(pub String);

impl Predicate<AuthorRecord> for AuthorId {
    fn matches(&self, record: &AuthorRecord) -> bool {
        record.id == self.0
    }
}

impl Predicate<PublicationRecord> for AuthorId {
    fn matches(&self, record: &PublicationRecord) -> bool {
        record.author_id == self.0
    }
}

/// Exact name, or case-insensitive substring.
#[derive(Debug, Clone)]
pub struct NameMatch {
    needle: String,
    exact: bool,
}

impl NameMatch {
    pub fn new(name: &str, exact: bool) -> Self {
        let needle = if exact {
            name.to_string()
        } else {
            name.to_lowercase()
        };
        NameMatch { needle, exact }
    }
}

impl Predicate<AuthorRecord> for NameMatch {
    fn matches(&self, record: &AuthorRecord) -> bool {
        if self.exact {
            record.name == self.needle
        } else {
            record.name.to_lowercase().contains(&self.needle)
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Year(pub i32);

impl Predicate<PublicationRecord> for Year {
    fn matches(&self, record: &PublicationRecord) -> bool {
        record.publication_year == Some(self.0)
    }
}

/// Inclusive on both ends; records without a year never match.
#[derive(Debug, Clone, Copy)]
pub struct YearRange {
    pub start: i32,
    pub end: i32,
}

impl Predicate<PublicationRecord> for YearRange {
    fn matches(&self, record: &PublicationRecord) -> bool {
        record
            .publication_year
            .is_some_and(|year| self.start <= year && year <= self.end)
    }
}

#[derive(Debug, Clone)]
pub struct TitleContains {
    needle: String,
    case_sensitive: bool,
}

impl TitleContains {
    pub fn new(text: &str, case_sensitive: bool) -> Self {
        let needle = if case_sensitive {
            text.to_string()
        } else {
            text.to_lowercase()
        };
        TitleContains {
            needle,
            case_sensitive,
        }
    }
}

impl Predicate<PublicationRecord> for TitleContains {
    fn matches(&self, record: &PublicationRecord) -> bool {
        if self.case_sensitive {
            record.title.contains(&self.needle)
        } else {
            record.title.to_lowercase().contains(&self.needle)
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct HasPdf;

impl Predicate<PublicationRecord> for HasPdf {
    fn matches(&self, record: &PublicationRecord) -> bool {
        record.has_pdf()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct HasMentions;

impl Predicate<PublicationRecord> for HasMentions {
    fn matches(&self, record: &PublicationRecord) -> bool {
        record.has_mentions()
    }
}
