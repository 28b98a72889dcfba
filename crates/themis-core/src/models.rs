//! Domain models shared by the harvesting and enrichment services.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// Canonical identifier of a harvested document.
///
/// Always derived from the upstream's identifier field, never from a store's
/// internal primary key, so that re-discovery across runs is idempotent.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentIdentity(String);

impl DocumentIdentity {
    /// Creates an identity, trimming surrounding whitespace.
    pub fn new(raw: impl AsRef<str>) -> Self {
        Self(raw.as_ref().trim().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for DocumentIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DocumentIdentity {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for DocumentIdentity {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

/// Raw record returned by the search API for one identity.
///
/// Does not necessarily carry the full text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HarvestedDocument {
    pub identity: DocumentIdentity,
    /// Name of the category whose search discovered this document.
    pub category: String,
    pub title: Option<String>,
    pub decision_date: Option<NaiveDate>,
    pub court: Option<String>,
    pub case_number: Option<String>,
    pub full_text: Option<String>,
    /// Any remaining upstream fields, kept verbatim.
    #[serde(default)]
    pub metadata: serde_json::Value,
}

impl HarvestedDocument {
    /// Creates a document with only an identity and category.
    pub fn new(identity: impl Into<DocumentIdentity>, category: impl Into<String>) -> Self {
        Self {
            identity: identity.into(),
            category: category.into(),
            title: None,
            decision_date: None,
            court: None,
            case_number: None,
            full_text: None,
            metadata: serde_json::Value::Null,
        }
    }
}

/// A document as it exists in the persistent store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredDocument {
    pub identity: DocumentIdentity,
    pub category: Option<String>,
    pub title: Option<String>,
    pub decision_date: Option<NaiveDate>,
    pub court: Option<String>,
    pub case_number: Option<String>,
    pub full_text: Option<String>,
    pub full_text_html: Option<String>,
    pub first_seen_at: DateTime<Utc>,
    pub last_updated_at: DateTime<Utc>,
}

impl StoredDocument {
    /// Length in characters of the stored full text, zero when absent.
    pub fn full_text_len(&self) -> usize {
        self.full_text
            .as_deref()
            .map(|t| t.trim().chars().count())
            .unwrap_or(0)
    }

    /// Returns true if the stored text is at least `min_chars` long.
    pub fn has_full_text(&self, min_chars: usize) -> bool {
        self.full_text.is_some() && self.full_text_len() >= min_chars
    }
}

/// Content obtained for one document by the fetcher.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FetchedDocument {
    pub title: Option<String>,
    pub case_number: Option<String>,
    /// Body paragraphs in reading order.
    pub paragraphs: Vec<String>,
    /// Raw HTML of the content container, when fetched from a page.
    pub html: Option<String>,
    pub source_url: Option<String>,
}

impl FetchedDocument {
    /// Joins the paragraphs into the plain full text.
    pub fn full_text(&self) -> String {
        self.paragraphs
            .iter()
            .map(|p| p.trim())
            .filter(|p| !p.is_empty())
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

/// Full-text record written by the enrichment pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentRecord {
    pub identity: DocumentIdentity,
    pub title: Option<String>,
    pub case_number: Option<String>,
    pub full_text: String,
    pub full_text_html: Option<String>,
    pub source_url: Option<String>,
}

/// Structural label of a decision section.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SectionKind {
    /// Caption, parties and anything before the first recognised marker.
    Header,
    Facts,
    Reasoning,
    Decision,
    /// A heading that did not match any known marker.
    Other,
}

impl SectionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SectionKind::Header => "header",
            SectionKind::Facts => "facts",
            SectionKind::Reasoning => "reasoning",
            SectionKind::Decision => "decision",
            SectionKind::Other => "other",
        }
    }

    /// Sections worth embedding for later semantic search.
    pub fn is_searchable(&self) -> bool {
        matches!(
            self,
            SectionKind::Facts | SectionKind::Reasoning | SectionKind::Decision
        )
    }
}

impl fmt::Display for SectionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SectionKind {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "header" => Ok(SectionKind::Header),
            "facts" => Ok(SectionKind::Facts),
            "reasoning" => Ok(SectionKind::Reasoning),
            "decision" => Ok(SectionKind::Decision),
            "other" => Ok(SectionKind::Other),
            _ => Err(AppError::Generic(format!("invalid section kind: {}", s))),
        }
    }
}

/// A labelled section of a decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Section {
    pub kind: SectionKind,
    /// Heading line that opened the section, if any.
    pub heading: Option<String>,
    /// Zero-based position in the document.
    pub position: usize,
    pub text: String,
}

/// An embedded slice of a searchable section.
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddingChunk {
    pub identity: DocumentIdentity,
    pub section_kind: SectionKind,
    pub chunk_index: usize,
    pub content: String,
    pub embedding: Vec<f32>,
}

/// Outcome of enriching one document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScrapeResult {
    pub doc_id: DocumentIdentity,
    pub full_text: Option<String>,
    pub full_text_html: Option<String>,
    pub case_number: Option<String>,
    pub sections_count: usize,
    pub embeddings_count: usize,
    /// True when the store already had enough text and nothing was fetched.
    pub cached: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ScrapeResult {
    pub fn cached(document: StoredDocument) -> Self {
        Self {
            doc_id: document.identity,
            full_text: document.full_text,
            full_text_html: document.full_text_html,
            case_number: document.case_number,
            sections_count: 0,
            embeddings_count: 0,
            cached: true,
            error: None,
        }
    }

    pub fn failed(doc_id: DocumentIdentity, error: impl Into<String>) -> Self {
        Self {
            doc_id,
            full_text: None,
            full_text_html: None,
            case_number: None,
            sections_count: 0,
            embeddings_count: 0,
            cached: false,
            error: Some(error.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Aggregate statistics about the document store.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DocumentStats {
    pub total_documents: i64,
    pub with_full_text: i64,
    pub total_sections: i64,
    pub total_chunks: i64,
    pub last_update: Option<DateTime<Utc>>,
}
