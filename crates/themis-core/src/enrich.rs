//! Full-text enrichment of harvested documents.
//!
//! For each identity the pipeline:
//! 1. returns early (`cached`) if the store already holds enough text,
//! 2. takes a slot from the [`ConcurrencyGate`],
//! 3. waits out the [`IntervalLimiter`],
//! 4. fetches the text (direct API first when enabled, then the public page),
//! 5. persists it, splits it into sections and embeds the searchable ones.
//!
//! The slot is an RAII permit, so it is released on every exit path. Embedding
//! failures are logged and never undo the persisted document.

use std::collections::HashMap;

use futures::future::join_all;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::EnrichmentConfig;
use crate::gate::{ConcurrencyGate, QueueDepth};
use crate::job::JobTracker;
use crate::models::{
    DocumentIdentity, DocumentRecord, EmbeddingChunk, FetchedDocument, ScrapeResult, Section,
    SectionKind,
};
use crate::progress::{HarvestEvent, ProgressReporter};
use crate::rate_limit::IntervalLimiter;
use crate::sections::{chunk_text, extract_sections};
use crate::traits::{DocumentFetcher, DocumentStore, EmbeddingProvider};
use crate::AppError;

pub struct EnrichmentService<F, S, E>
where
    F: DocumentFetcher,
    S: DocumentStore,
    E: EmbeddingProvider,
{
    fetcher: F,
    store: S,
    embeddings: E,
    config: EnrichmentConfig,
    gate: ConcurrencyGate,
    limiter: IntervalLimiter,
}

impl<F, S, E> Clone for EnrichmentService<F, S, E>
where
    F: DocumentFetcher,
    S: DocumentStore,
    E: EmbeddingProvider,
{
    fn clone(&self) -> Self {
        Self {
            fetcher: self.fetcher.clone(),
            store: self.store.clone(),
            embeddings: self.embeddings.clone(),
            config: self.config.clone(),
            gate: self.gate.clone(),
            limiter: self.limiter.clone(),
        }
    }
}

impl<F, S, E> EnrichmentService<F, S, E>
where
    F: DocumentFetcher,
    S: DocumentStore,
    E: EmbeddingProvider,
{
    /// Creates the service and its gate and limiter.
    ///
    /// Clones share the same gate and limiter.
    pub fn new(fetcher: F, store: S, embeddings: E, config: EnrichmentConfig) -> Result<Self, AppError> {
        config.validate()?;
        Ok(Self {
            gate: ConcurrencyGate::new(config.concurrency),
            limiter: IntervalLimiter::new(config.min_request_interval),
            fetcher,
            store,
            embeddings,
            config,
        })
    }

    pub fn config(&self) -> &EnrichmentConfig {
        &self.config
    }

    pub fn queue_depth(&self) -> QueueDepth {
        self.gate.queue_depth()
    }

    /// Enriches one document. Failures are reported in [`ScrapeResult::error`].
    pub async fn enrich(&self, id: &DocumentIdentity, cancel: &CancellationToken) -> ScrapeResult {
        match self.try_enrich(id, cancel).await {
            Ok(result) => result,
            Err(e) => ScrapeResult::failed(id.clone(), e.to_string()),
        }
    }

    async fn try_enrich(
        &self,
        id: &DocumentIdentity,
        cancel: &CancellationToken,
    ) -> Result<ScrapeResult, AppError> {
        if cancel.is_cancelled() {
            return Err(AppError::Cancelled);
        }

        match self.store.get_document(id).await {
            Ok(Some(stored)) if stored.has_full_text(self.config.min_full_text_chars) => {
                debug!(doc_id = %id, "Full text already stored");
                return Ok(ScrapeResult::cached(stored));
            }
            Ok(_) => {}
            Err(e) => warn!(doc_id = %id, error = %e, "Store lookup failed, fetching anyway"),
        }

        let _permit = tokio::select! {
            _ = cancel.cancelled() => return Err(AppError::Cancelled),
            permit = self.gate.acquire() => permit?,
        };

        tokio::select! {
            _ = cancel.cancelled() => return Err(AppError::Cancelled),
            _ = self.limiter.until_ready() => {}
        }

        let fetched = tokio::select! {
            _ = cancel.cancelled() => return Err(AppError::Cancelled),
            fetched = self.fetch(id) => fetched?,
        };

        let full_text = fetched.full_text();
        if full_text.is_empty() {
            return Err(AppError::ParseError(format!("no text extracted for {}", id)));
        }

        let record = DocumentRecord {
            identity: id.clone(),
            title: fetched.title.clone(),
            case_number: fetched.case_number.clone(),
            full_text: full_text.clone(),
            full_text_html: fetched.html.clone(),
            source_url: fetched.source_url.clone(),
        };
        self.store.save_document(&record).await?;

        let sections = extract_sections(&fetched.paragraphs);
        let sections_count = match self.store.save_sections(id, &sections).await {
            Ok(()) => sections.len(),
            Err(e) => {
                warn!(doc_id = %id, error = %e, "Failed to save sections");
                0
            }
        };

        let embeddings_count = if self.config.generate_embeddings {
            self.embed_sections(id, &sections, cancel).await
        } else {
            0
        };

        Ok(ScrapeResult {
            doc_id: id.clone(),
            full_text: Some(full_text),
            full_text_html: fetched.html,
            case_number: fetched.case_number,
            sections_count,
            embeddings_count,
            cached: false,
            error: None,
        })
    }

    async fn fetch(&self, id: &DocumentIdentity) -> Result<FetchedDocument, AppError> {
        if self.config.direct_lookup {
            match self.fetcher.fetch_direct(id).await {
                Ok(Some(document)) if !document.full_text().is_empty() => return Ok(document),
                Ok(_) => debug!(doc_id = %id, "No direct full text, falling back to page"),
                Err(e) => warn!(doc_id = %id, error = %e, "Direct lookup failed, falling back to page"),
            }
        }
        self.fetcher.fetch_page(id).await
    }

    /// Embeds the searchable sections; returns the number of stored chunks.
    async fn embed_sections(
        &self,
        id: &DocumentIdentity,
        sections: &[Section],
        cancel: &CancellationToken,
    ) -> usize {
        let mut next_index: HashMap<SectionKind, usize> = HashMap::new();
        let mut stored = 0;

        // A shorter text yields fewer chunks; old trailing ones must not survive.
        if let Err(e) = self.store.clear_chunks(id).await {
            warn!(doc_id = %id, error = %e, "Failed to clear previous chunks");
        }

        for section in sections.iter().filter(|s| s.kind.is_searchable()) {
            for content in chunk_text(&section.text, self.config.chunk_max_chars) {
                if cancel.is_cancelled() {
                    return stored;
                }
                let index = next_index.entry(section.kind).or_insert(0);
                let chunk_index = *index;
                *index += 1;

                let embedding = match self.embeddings.generate(&content).await {
                    Ok(embedding) => embedding,
                    Err(e) => {
                        warn!(doc_id = %id, provider = self.embeddings.name(), error = %e, "Embedding failed");
                        continue;
                    }
                };

                let chunk = EmbeddingChunk {
                    identity: id.clone(),
                    section_kind: section.kind,
                    chunk_index,
                    content,
                    embedding,
                };
                match self.store.store_chunk(&chunk).await {
                    Ok(()) => stored += 1,
                    Err(e) => warn!(doc_id = %id, error = %e, "Failed to store chunk"),
                }
            }
        }
        stored
    }

    /// Enriches many documents, `batch_size` at a time.
    ///
    /// The gate bounds how many of a batch run at once. Job progress is
    /// recomputed after every batch.
    pub async fn enrich_many<P: ProgressReporter>(
        &self,
        ids: &[DocumentIdentity],
        reporter: &P,
        tracker: Option<&JobTracker>,
        cancel: CancellationToken,
    ) -> Vec<ScrapeResult> {
        if let Some(tracker) = tracker {
            tracker.start(ids.len());
        }

        let mut results = Vec::with_capacity(ids.len());
        for batch in ids.chunks(self.config.batch_size) {
            if cancel.is_cancelled() {
                break;
            }

            let batch_results = join_all(batch.iter().map(|id| self.enrich(id, &cancel))).await;

            let mut errors = 0;
            for result in &batch_results {
                match &result.error {
                    None => reporter.report(HarvestEvent::DocumentEnriched {
                        doc_id: &result.doc_id,
                        cached: result.cached,
                        sections: result.sections_count,
                        embeddings: result.embeddings_count,
                    }),
                    Some(error) => {
                        errors += 1;
                        reporter.report(HarvestEvent::DocumentFailed {
                            doc_id: &result.doc_id,
                            error,
                        });
                        if let Some(tracker) = tracker {
                            tracker.push_error(format!("{}: {}", result.doc_id, error));
                        }
                    }
                }
            }
            if let Some(tracker) = tracker {
                tracker.record_processed(batch_results.len(), errors);
            }
            results.extend(batch_results);
        }

        if let Some(tracker) = tracker {
            if cancel.is_cancelled() {
                tracker.fail(AppError::Cancelled.to_string());
            } else {
                tracker.complete();
            }
        }
        results
    }

    /// Backfills documents whose stored text is missing or too short.
    pub async fn enrich_missing<P: ProgressReporter>(
        &self,
        limit: usize,
        reporter: &P,
        tracker: Option<&JobTracker>,
        cancel: CancellationToken,
    ) -> Result<Vec<ScrapeResult>, AppError> {
        let ids = match self
            .store
            .list_missing_full_text(self.config.min_full_text_chars, limit)
            .await
        {
            Ok(ids) => ids,
            Err(e) => {
                if let Some(tracker) = tracker {
                    tracker.fail(e.to_string());
                }
                return Err(e);
            }
        };
        Ok(self.enrich_many(&ids, reporter, tracker, cancel).await)
    }
}
