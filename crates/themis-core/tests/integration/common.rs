//! Test utilities and mock implementations for integration tests.
//!
//! Provides in-memory implementations of the core traits for testing
//! `HarvestService` and `EnrichmentService` in isolation.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{NaiveDate, Utc};
use themis_core::checkpoint::{CheckpointConfig, CheckpointUpdate, ScrapeCheckpoint};
use themis_core::traits::{
    CheckpointStore, DocumentFetcher, DocumentStore, EmbeddingProvider, RemoteIngest,
    SearchClient, SearchPage, SearchQuery,
};
use themis_core::{
    AppError, DocumentIdentity, DocumentRecord, DocumentStats, EmbeddingChunk, FetchedDocument,
    HarvestConfig, HarvestedDocument, SearchCategory, Section, StoredDocument,
};

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

pub fn category(name: &str, keywords: &[&str]) -> SearchCategory {
    SearchCategory::new(name, keywords.iter().map(|k| k.to_string()).collect())
}

/// Harvest config with no artificial delays and a single 30-day window.
pub fn fast_config() -> HarvestConfig {
    HarvestConfig::default()
        .with_date_range(date(2023, 1, 1), Some(date(2023, 1, 30)))
        .with_page_size(10)
        .with_batch_size(10)
        .with_window_concurrency(2)
        .with_delays(Duration::ZERO, Duration::ZERO, Duration::ZERO)
}

// =============================================================================
// MockSearchClient
// =============================================================================

/// Search client serving a fixed number of results per (keyword, window).
///
/// Identities are unique per stream by default; with `shared_ids` every
/// stream returns the same identities, exercising cross-task dedup.
#[derive(Clone)]
pub struct MockSearchClient {
    per_task: usize,
    shared_ids: bool,
    failing_pages: Arc<HashSet<u32>>,
    delay: Duration,
    pub calls: Arc<Mutex<Vec<SearchQuery>>>,
}

impl MockSearchClient {
    pub fn new(per_task: usize) -> Self {
        Self {
            per_task,
            shared_ids: false,
            failing_pages: Arc::new(HashSet::new()),
            delay: Duration::ZERO,
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn with_shared_ids(mut self) -> Self {
        self.shared_ids = true;
        self
    }

    pub fn with_failing_pages(mut self, pages: &[u32]) -> Self {
        self.failing_pages = Arc::new(pages.iter().copied().collect());
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn pages_requested(&self) -> Vec<u32> {
        self.calls.lock().unwrap().iter().map(|q| q.page).collect()
    }

    fn identity(&self, query: &SearchQuery, index: usize) -> String {
        if self.shared_ids {
            format!("doc-{}", index)
        } else {
            format!("{}-{}-{}", query.keyword, query.date_from, index)
        }
    }
}

impl SearchClient for MockSearchClient {
    async fn search(&self, query: &SearchQuery) -> Result<SearchPage, AppError> {
        self.calls.lock().unwrap().push(query.clone());
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.failing_pages.contains(&query.page) {
            return Err(AppError::ClientError("Server error: HTTP 503".to_string()));
        }

        let start = (query.page as usize - 1) * query.page_size;
        let end = (start + query.page_size).min(self.per_task);
        let items = (start..end)
            .map(|i| {
                let mut doc = HarvestedDocument::new(self.identity(query, i), query.category.clone());
                doc.title = Some(format!("Decision {}", i));
                doc.decision_date = Some(query.date_from);
                doc
            })
            .collect();

        Ok(SearchPage {
            items,
            has_more: end < self.per_task,
        })
    }
}

// =============================================================================
// MockDocumentStore
// =============================================================================

/// In-memory document store with scriptable batch failures.
#[derive(Clone, Default)]
pub struct MockDocumentStore {
    pub documents: Arc<Mutex<HashMap<DocumentIdentity, StoredDocument>>>,
    pub sections: Arc<Mutex<HashMap<DocumentIdentity, Vec<Section>>>>,
    pub chunks: Arc<Mutex<Vec<EmbeddingChunk>>>,
    save_calls: Arc<AtomicUsize>,
    failing_calls: Arc<Mutex<HashSet<usize>>>,
}

impl MockDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the n-th (1-based) `save_documents` call fail.
    pub fn fail_save_call(self, n: usize) -> Self {
        self.failing_calls.lock().unwrap().insert(n);
        self
    }

    pub fn save_call_count(&self) -> usize {
        self.save_calls.load(Ordering::SeqCst)
    }

    pub fn len(&self) -> usize {
        self.documents.lock().unwrap().len()
    }

    pub fn insert_with_text(&self, id: &str, text: &str) {
        let identity = DocumentIdentity::new(id);
        let mut doc = stored(identity.clone());
        doc.full_text = Some(text.to_string());
        self.documents.lock().unwrap().insert(identity, doc);
    }
}

fn stored(identity: DocumentIdentity) -> StoredDocument {
    StoredDocument {
        identity,
        category: None,
        title: None,
        decision_date: None,
        court: None,
        case_number: None,
        full_text: None,
        full_text_html: None,
        first_seen_at: Utc::now(),
        last_updated_at: Utc::now(),
    }
}

impl DocumentStore for MockDocumentStore {
    async fn get_document(&self, id: &DocumentIdentity) -> Result<Option<StoredDocument>, AppError> {
        Ok(self.documents.lock().unwrap().get(id).cloned())
    }

    async fn save_documents(&self, documents: &[HarvestedDocument]) -> Result<u64, AppError> {
        let call = self.save_calls.fetch_add(1, Ordering::SeqCst) + 1;
        if self.failing_calls.lock().unwrap().contains(&call) {
            return Err(AppError::Generic(format!("batch {} rejected", call)));
        }

        let mut stored_docs = self.documents.lock().unwrap();
        for doc in documents {
            let entry = stored_docs
                .entry(doc.identity.clone())
                .or_insert_with(|| stored(doc.identity.clone()));
            entry.category = Some(doc.category.clone());
            entry.title = doc.title.clone().or(entry.title.take());
            entry.decision_date = doc.decision_date.or(entry.decision_date);
            if doc.full_text.is_some() {
                entry.full_text = doc.full_text.clone();
            }
            entry.last_updated_at = Utc::now();
        }
        Ok(documents.len() as u64)
    }

    async fn save_document(&self, record: &DocumentRecord) -> Result<(), AppError> {
        let mut docs = self.documents.lock().unwrap();
        let entry = docs
            .entry(record.identity.clone())
            .or_insert_with(|| stored(record.identity.clone()));
        entry.full_text = Some(record.full_text.clone());
        entry.full_text_html = record.full_text_html.clone();
        entry.case_number = record.case_number.clone();
        Ok(())
    }

    async fn save_sections(&self, id: &DocumentIdentity, sections: &[Section]) -> Result<(), AppError> {
        self.sections
            .lock()
            .unwrap()
            .insert(id.clone(), sections.to_vec());
        Ok(())
    }

    async fn clear_chunks(&self, id: &DocumentIdentity) -> Result<(), AppError> {
        self.chunks.lock().unwrap().retain(|c| &c.identity != id);
        Ok(())
    }

    async fn store_chunk(&self, chunk: &EmbeddingChunk) -> Result<(), AppError> {
        self.chunks.lock().unwrap().push(chunk.clone());
        Ok(())
    }

    async fn count_documents(&self) -> Result<i64, AppError> {
        Ok(self.documents.lock().unwrap().len() as i64)
    }

    async fn list_missing_full_text(
        &self,
        min_chars: usize,
        limit: usize,
    ) -> Result<Vec<DocumentIdentity>, AppError> {
        let docs = self.documents.lock().unwrap();
        let mut ids: Vec<_> = docs
            .values()
            .filter(|d| !d.has_full_text(min_chars))
            .map(|d| d.identity.clone())
            .collect();
        ids.sort();
        ids.truncate(limit);
        Ok(ids)
    }

    async fn stats(&self) -> Result<DocumentStats, AppError> {
        let docs = self.documents.lock().unwrap();
        Ok(DocumentStats {
            total_documents: docs.len() as i64,
            with_full_text: docs.values().filter(|d| d.full_text.is_some()).count() as i64,
            total_sections: self.sections.lock().unwrap().values().map(Vec::len).sum::<usize>() as i64,
            total_chunks: self.chunks.lock().unwrap().len() as i64,
            last_update: None,
        })
    }
}

// =============================================================================
// MockCheckpointStore
// =============================================================================

#[derive(Clone, Default)]
pub struct MockCheckpointStore {
    pub checkpoints: Arc<Mutex<HashMap<String, ScrapeCheckpoint>>>,
    pub upserts: Arc<AtomicUsize>,
}

impl MockCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, checkpoint: ScrapeCheckpoint) {
        self.checkpoints
            .lock()
            .unwrap()
            .insert(checkpoint.config_hash.clone(), checkpoint);
    }

    pub fn get(&self, config: &CheckpointConfig) -> Option<ScrapeCheckpoint> {
        self.checkpoints
            .lock()
            .unwrap()
            .get(&config.config_hash())
            .cloned()
    }

    pub fn upsert_count(&self) -> usize {
        self.upserts.load(Ordering::SeqCst)
    }
}

impl CheckpointStore for MockCheckpointStore {
    async fn get_checkpoint(&self, config: &CheckpointConfig) -> Result<Option<ScrapeCheckpoint>, AppError> {
        Ok(self.get(config))
    }

    async fn upsert_checkpoint(
        &self,
        config: &CheckpointConfig,
        update: &CheckpointUpdate,
    ) -> Result<(), AppError> {
        self.upserts.fetch_add(1, Ordering::SeqCst);
        let hash = config.config_hash();
        let mut checkpoints = self.checkpoints.lock().unwrap();
        let previous_scraped_at = checkpoints.get(&hash).and_then(|c| c.last_scraped_at);
        checkpoints.insert(
            hash.clone(),
            ScrapeCheckpoint {
                config_hash: hash,
                category_form: config.category_form.clone(),
                keywords: config.keyword_set(),
                justice_kind: config.justice_kind.clone(),
                last_page: update.last_page,
                documents_scraped: update.documents_scraped,
                documents_failed: update.documents_failed,
                status: update.status,
                last_error: update.error.clone(),
                last_scraped_at: if update.status.is_terminal() {
                    Some(Utc::now())
                } else {
                    previous_scraped_at
                },
                updated_at: Utc::now(),
            },
        );
        Ok(())
    }
}

// =============================================================================
// MockFetcher
// =============================================================================

/// Document fetcher returning a canned decision text.
#[derive(Clone)]
pub struct MockFetcher {
    pub direct_calls: Arc<AtomicUsize>,
    pub page_calls: Arc<AtomicUsize>,
    direct_available: bool,
    fail_page: bool,
    delay: Duration,
    in_flight: Arc<AtomicUsize>,
    pub peak_in_flight: Arc<AtomicUsize>,
}

impl MockFetcher {
    pub fn new() -> Self {
        Self {
            direct_calls: Arc::new(AtomicUsize::new(0)),
            page_calls: Arc::new(AtomicUsize::new(0)),
            direct_available: false,
            fail_page: false,
            delay: Duration::ZERO,
            in_flight: Arc::new(AtomicUsize::new(0)),
            peak_in_flight: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn with_direct(mut self) -> Self {
        self.direct_available = true;
        self
    }

    pub fn failing(mut self) -> Self {
        self.fail_page = true;
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn total_calls(&self) -> usize {
        self.direct_calls.load(Ordering::SeqCst) + self.page_calls.load(Ordering::SeqCst)
    }

    async fn simulate_work(&self) {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

pub fn decision_paragraphs() -> Vec<String> {
    [
        "DISTRICT COURT",
        "Case 17/2023",
        "FACTS",
        "The tenant was served an eviction notice without the statutory notice period.",
        "REASONING",
        "The notice period is mandatory and cannot be shortened by contract.",
        "DECISION",
        "The eviction is void.",
    ]
    .iter()
    .map(|p| p.to_string())
    .collect()
}

impl DocumentFetcher for MockFetcher {
    async fn fetch_direct(&self, _id: &DocumentIdentity) -> Result<Option<FetchedDocument>, AppError> {
        self.direct_calls.fetch_add(1, Ordering::SeqCst);
        self.simulate_work().await;
        if !self.direct_available {
            return Ok(None);
        }
        Ok(Some(FetchedDocument {
            title: Some("Direct".to_string()),
            case_number: Some("17/2023".to_string()),
            paragraphs: decision_paragraphs(),
            html: None,
            source_url: None,
        }))
    }

    async fn fetch_page(&self, id: &DocumentIdentity) -> Result<FetchedDocument, AppError> {
        self.page_calls.fetch_add(1, Ordering::SeqCst);
        self.simulate_work().await;
        if self.fail_page {
            return Err(AppError::NetworkError(format!("connection reset fetching {}", id)));
        }
        Ok(FetchedDocument {
            title: Some("Page".to_string()),
            case_number: Some("17/2023".to_string()),
            paragraphs: decision_paragraphs(),
            html: Some("<div>...</div>".to_string()),
            source_url: Some(format!("https://decisions.example.com/{}", id)),
        })
    }
}

// =============================================================================
// MockEmbeddingProvider
// =============================================================================

/// Mock embedding provider that returns deterministic vectors.
#[derive(Clone)]
pub struct MockEmbeddingProvider {
    dimension: usize,
    pub calls: Arc<AtomicUsize>,
    fail: bool,
}

impl MockEmbeddingProvider {
    pub fn new() -> Self {
        Self {
            dimension: 8,
            calls: Arc::new(AtomicUsize::new(0)),
            fail: false,
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::new()
        }
    }
}

impl EmbeddingProvider for MockEmbeddingProvider {
    fn name(&self) -> &'static str {
        "mock"
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn generate(&self, text: &str) -> Result<Vec<f32>, AppError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(AppError::EmbeddingError("quota exhausted".to_string()));
        }
        let seed = text.len() as f32;
        Ok((0..self.dimension).map(|i| (seed + i as f32) / 1000.0).collect())
    }
}

// =============================================================================
// MockRemoteIngest
// =============================================================================

/// Remote endpoint that can throttle or reject specific identities.
#[derive(Clone, Default)]
pub struct MockRemoteIngest {
    pub ingested: Arc<Mutex<Vec<DocumentIdentity>>>,
    pub attempts: Arc<AtomicUsize>,
    throttle_once: Arc<Mutex<HashSet<String>>>,
    always_throttle: Arc<HashSet<String>>,
    reject: Arc<HashSet<String>>,
}

impl MockRemoteIngest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn throttle_once(self, ids: &[&str]) -> Self {
        self.throttle_once
            .lock()
            .unwrap()
            .extend(ids.iter().map(|s| s.to_string()));
        self
    }

    pub fn always_throttle(mut self, ids: &[&str]) -> Self {
        self.always_throttle = Arc::new(ids.iter().map(|s| s.to_string()).collect());
        self
    }

    pub fn reject(mut self, ids: &[&str]) -> Self {
        self.reject = Arc::new(ids.iter().map(|s| s.to_string()).collect());
        self
    }
}

impl RemoteIngest for MockRemoteIngest {
    async fn ingest(&self, document: &HarvestedDocument) -> Result<(), AppError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let id = document.identity.as_str();
        if self.reject.contains(id) {
            return Err(AppError::ClientError("HTTP 422".to_string()));
        }
        if self.always_throttle.contains(id) || self.throttle_once.lock().unwrap().remove(id) {
            return Err(AppError::RateLimitExceeded {
                retry_after: Some(Duration::from_millis(5)),
            });
        }
        self.ingested.lock().unwrap().push(document.identity.clone());
        Ok(())
    }
}
