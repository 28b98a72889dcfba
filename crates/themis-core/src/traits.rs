//! Trait definitions for external dependencies.
//!
//! The harvesting and enrichment services only see these traits, never the
//! HTTP clients or the PostgreSQL repositories behind them. Tests substitute
//! in-memory mocks.

use std::future::Future;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::checkpoint::{CheckpointConfig, CheckpointUpdate, ScrapeCheckpoint};
use crate::models::{
    DocumentIdentity, DocumentRecord, DocumentStats, EmbeddingChunk, FetchedDocument,
    HarvestedDocument, Section, StoredDocument,
};
use crate::AppError;

/// One page request against the search API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchQuery {
    /// Name of the category the keyword belongs to.
    pub category: String,
    pub keyword: String,
    pub date_from: NaiveDate,
    pub date_to: NaiveDate,
    /// Jurisdiction filter; the category's `form` when set.
    pub jurisdictions: Vec<String>,
    pub justice_kind: Option<String>,
    /// One-based page number.
    pub page: u32,
    pub page_size: usize,
    pub order_by: Option<String>,
}

/// One page of search results.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchPage {
    pub items: Vec<HarvestedDocument>,
    /// Upstream hint that more pages exist.
    pub has_more: bool,
}

/// Client for the paginated search API.
pub trait SearchClient: Send + Sync + Clone {
    fn search(
        &self,
        query: &SearchQuery,
    ) -> impl Future<Output = Result<SearchPage, AppError>> + Send;
}

/// Source of full text for a single document.
pub trait DocumentFetcher: Send + Sync + Clone {
    /// Looks the document up through the structured full-text API.
    ///
    /// `Ok(None)` means the API does not know the document or has no text for
    /// it; callers then fall back to [`DocumentFetcher::fetch_page`].
    fn fetch_direct(
        &self,
        id: &DocumentIdentity,
    ) -> impl Future<Output = Result<Option<FetchedDocument>, AppError>> + Send;

    /// Downloads and parses the public document page.
    fn fetch_page(
        &self,
        id: &DocumentIdentity,
    ) -> impl Future<Output = Result<FetchedDocument, AppError>> + Send;
}

/// Persistent store of documents, sections and embedding chunks.
pub trait DocumentStore: Send + Sync + Clone {
    fn get_document(
        &self,
        id: &DocumentIdentity,
    ) -> impl Future<Output = Result<Option<StoredDocument>, AppError>> + Send;

    /// Upserts harvested documents by identity.
    ///
    /// Existing full text is never overwritten with an absent value.
    ///
    /// # Returns
    ///
    /// The number of rows written.
    fn save_documents(
        &self,
        documents: &[HarvestedDocument],
    ) -> impl Future<Output = Result<u64, AppError>> + Send;

    /// Stores the full text obtained by enrichment.
    fn save_document(
        &self,
        record: &DocumentRecord,
    ) -> impl Future<Output = Result<(), AppError>> + Send;

    /// Replaces the sections of a document.
    fn save_sections(
        &self,
        id: &DocumentIdentity,
        sections: &[Section],
    ) -> impl Future<Output = Result<(), AppError>> + Send;

    /// Removes every embedding chunk of a document before it is re-embedded.
    fn clear_chunks(
        &self,
        id: &DocumentIdentity,
    ) -> impl Future<Output = Result<(), AppError>> + Send;

    /// Upserts one chunk by (identity, section kind, chunk index).
    fn store_chunk(
        &self,
        chunk: &EmbeddingChunk,
    ) -> impl Future<Output = Result<(), AppError>> + Send;

    fn count_documents(&self) -> impl Future<Output = Result<i64, AppError>> + Send;

    /// Identities whose stored text is missing or shorter than `min_chars`.
    fn list_missing_full_text(
        &self,
        min_chars: usize,
        limit: usize,
    ) -> impl Future<Output = Result<Vec<DocumentIdentity>, AppError>> + Send;

    fn stats(&self) -> impl Future<Output = Result<DocumentStats, AppError>> + Send;
}

/// Durable store of scrape checkpoints.
pub trait CheckpointStore: Send + Sync + Clone {
    fn get_checkpoint(
        &self,
        config: &CheckpointConfig,
    ) -> impl Future<Output = Result<Option<ScrapeCheckpoint>, AppError>> + Send;

    /// Creates or updates the checkpoint of `config`.
    ///
    /// `last_scraped_at` is refreshed only when `update.status` is terminal.
    fn upsert_checkpoint(
        &self,
        config: &CheckpointConfig,
        update: &CheckpointUpdate,
    ) -> impl Future<Output = Result<(), AppError>> + Send;
}

/// Provider for generating text embeddings.
pub trait EmbeddingProvider: Send + Sync + Clone {
    /// Short provider name used in logs.
    fn name(&self) -> &'static str;

    /// Length of the vectors returned by [`EmbeddingProvider::generate`].
    fn dimension(&self) -> usize;

    fn generate(&self, text: &str) -> impl Future<Output = Result<Vec<f32>, AppError>> + Send;
}

/// Remote enrichment endpoint used in [`crate::PersistenceMode::Remote`].
pub trait RemoteIngest: Send + Sync + Clone {
    /// Submits one document.
    ///
    /// Throttling surfaces as [`AppError::RateLimitExceeded`]; implementations
    /// do not retry it themselves.
    fn ingest(
        &self,
        document: &HarvestedDocument,
    ) -> impl Future<Output = Result<(), AppError>> + Send;
}

/// Placeholder for runs that never use remote persistence.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoRemoteIngest;

impl RemoteIngest for NoRemoteIngest {
    async fn ingest(&self, document: &HarvestedDocument) -> Result<(), AppError> {
        Err(AppError::ConfigError(format!(
            "no remote ingest endpoint configured for document {}",
            document.identity
        )))
    }
}

/// Placeholder for enrichment without embeddings.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoEmbeddings;

impl EmbeddingProvider for NoEmbeddings {
    fn name(&self) -> &'static str {
        "none"
    }

    fn dimension(&self) -> usize {
        0
    }

    async fn generate(&self, _text: &str) -> Result<Vec<f32>, AppError> {
        Err(AppError::EmbeddingError(
            "embedding generation is disabled".to_string(),
        ))
    }
}
