//! Integration tests for EnrichmentService.

use std::sync::atomic::Ordering;
use std::time::Duration;

use themis_core::{
    DocumentIdentity, EmbeddingChunk, EnrichmentConfig, EnrichmentService, JobKind, JobStatus,
    JobTracker, SectionKind, SilentReporter,
};
use tokio_util::sync::CancellationToken;

use crate::integration::common::{MockDocumentStore, MockEmbeddingProvider, MockFetcher};

fn config() -> EnrichmentConfig {
    EnrichmentConfig::default()
        .with_min_request_interval(Duration::ZERO)
        .with_min_full_text_chars(50)
}

fn ids(count: usize) -> Vec<DocumentIdentity> {
    (0..count)
        .map(|i| DocumentIdentity::new(format!("doc-{}", i)))
        .collect()
}

#[tokio::test]
async fn test_cached_document_makes_no_network_calls() {
    // Arrange
    let store = MockDocumentStore::new();
    store.insert_with_text("doc-1", &"x".repeat(80));
    let fetcher = MockFetcher::new();
    let service =
        EnrichmentService::new(fetcher.clone(), store, MockEmbeddingProvider::new(), config())
            .unwrap();

    // Act
    let result = service
        .enrich(&"doc-1".into(), &CancellationToken::new())
        .await;

    // Assert
    assert!(result.cached);
    assert!(result.is_success());
    assert_eq!(result.full_text.as_deref().map(str::len), Some(80));
    assert_eq!(fetcher.total_calls(), 0);
}

#[tokio::test]
async fn test_short_stored_text_is_refetched() {
    let store = MockDocumentStore::new();
    store.insert_with_text("doc-1", "too short");
    let fetcher = MockFetcher::new();
    let service =
        EnrichmentService::new(fetcher.clone(), store, MockEmbeddingProvider::new(), config())
            .unwrap();

    let result = service
        .enrich(&"doc-1".into(), &CancellationToken::new())
        .await;

    assert!(!result.cached);
    assert!(result.is_success());
    assert_eq!(fetcher.page_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_enrich_persists_text_sections_and_embeddings() {
    let store = MockDocumentStore::new();
    let fetcher = MockFetcher::new();
    let embeddings = MockEmbeddingProvider::new();
    let service =
        EnrichmentService::new(fetcher.clone(), store.clone(), embeddings.clone(), config())
            .unwrap();
    let id = DocumentIdentity::new("doc-7");

    let result = service.enrich(&id, &CancellationToken::new()).await;

    assert!(result.is_success());
    assert_eq!(result.case_number.as_deref(), Some("17/2023"));
    assert_eq!(result.sections_count, 4);
    // Facts, reasoning and decision are embedded; the header is not.
    assert_eq!(result.embeddings_count, 3);
    assert_eq!(embeddings.calls.load(Ordering::SeqCst), 3);

    let stored = store.documents.lock().unwrap().get(&id).cloned().unwrap();
    assert!(stored.full_text.unwrap().contains("eviction is void"));
    assert!(stored.full_text_html.is_some());

    let sections = store.sections.lock().unwrap().get(&id).cloned().unwrap();
    let kinds: Vec<_> = sections.iter().map(|s| s.kind).collect();
    assert_eq!(
        kinds,
        vec![
            SectionKind::Other,
            SectionKind::Facts,
            SectionKind::Reasoning,
            SectionKind::Decision
        ]
    );

    let chunks = store.chunks.lock().unwrap();
    assert!(chunks.iter().all(|c| c.identity == id && c.chunk_index == 0));
    assert!(chunks.iter().all(|c| c.section_kind.is_searchable()));
}

#[tokio::test]
async fn test_reenrichment_replaces_previous_chunks() {
    let store = MockDocumentStore::new();
    let stale = |id: &str, index: usize| EmbeddingChunk {
        identity: DocumentIdentity::new(id),
        section_kind: SectionKind::Facts,
        chunk_index: index,
        content: "older, longer text".to_string(),
        embedding: vec![0.0; 4],
    };
    store
        .chunks
        .lock()
        .unwrap()
        .extend([stale("doc-7", 0), stale("doc-7", 1), stale("doc-7", 2), stale("doc-8", 0)]);
    let service = EnrichmentService::new(
        MockFetcher::new(),
        store.clone(),
        MockEmbeddingProvider::new(),
        config(),
    )
    .unwrap();

    let result = service
        .enrich(&DocumentIdentity::new("doc-7"), &CancellationToken::new())
        .await;

    assert_eq!(result.embeddings_count, 3);
    let chunks = store.chunks.lock().unwrap();
    let own: Vec<_> = chunks.iter().filter(|c| c.identity.as_str() == "doc-7").collect();
    assert_eq!(own.len(), 3);
    assert!(own.iter().all(|c| c.chunk_index == 0));
    assert_eq!(
        chunks.iter().filter(|c| c.identity.as_str() == "doc-8").count(),
        1,
        "other documents keep their chunks"
    );
}

#[tokio::test]
async fn test_direct_lookup_preferred_over_page() {
    let store = MockDocumentStore::new();
    let fetcher = MockFetcher::new().with_direct();
    let service =
        EnrichmentService::new(fetcher.clone(), store, MockEmbeddingProvider::new(), config())
            .unwrap();

    let result = service
        .enrich(&"doc-1".into(), &CancellationToken::new())
        .await;

    assert!(result.is_success());
    assert_eq!(fetcher.direct_calls.load(Ordering::SeqCst), 1);
    assert_eq!(fetcher.page_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_direct_lookup_disabled_goes_to_page() {
    let store = MockDocumentStore::new();
    let fetcher = MockFetcher::new().with_direct();
    let service = EnrichmentService::new(
        fetcher.clone(),
        store,
        MockEmbeddingProvider::new(),
        config().with_direct_lookup(false),
    )
    .unwrap();

    service
        .enrich(&"doc-1".into(), &CancellationToken::new())
        .await;

    assert_eq!(fetcher.direct_calls.load(Ordering::SeqCst), 0);
    assert_eq!(fetcher.page_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_fetch_failure_is_returned_and_releases_slot() {
    let store = MockDocumentStore::new();
    let fetcher = MockFetcher::new().failing();
    let service = EnrichmentService::new(
        fetcher,
        store.clone(),
        MockEmbeddingProvider::new(),
        config().with_concurrency(1),
    )
    .unwrap();

    let first = service
        .enrich(&"doc-1".into(), &CancellationToken::new())
        .await;
    let second = service
        .enrich(&"doc-2".into(), &CancellationToken::new())
        .await;

    assert!(first.error.unwrap().contains("connection reset"));
    assert!(second.error.is_some(), "second call still got a slot");
    assert_eq!(service.queue_depth().in_flight, 0);
    assert_eq!(store.len(), 0);
}

#[tokio::test]
async fn test_embedding_failure_keeps_document() {
    let store = MockDocumentStore::new();
    let service = EnrichmentService::new(
        MockFetcher::new(),
        store.clone(),
        MockEmbeddingProvider::failing(),
        config(),
    )
    .unwrap();

    let result = service
        .enrich(&"doc-1".into(), &CancellationToken::new())
        .await;

    assert!(result.is_success());
    assert_eq!(result.embeddings_count, 0);
    assert_eq!(store.len(), 1);
}

#[tokio::test]
async fn test_embeddings_disabled() {
    let store = MockDocumentStore::new();
    let embeddings = MockEmbeddingProvider::new();
    let service = EnrichmentService::new(
        MockFetcher::new(),
        store,
        embeddings.clone(),
        config().without_embeddings(),
    )
    .unwrap();

    let result = service
        .enrich(&"doc-1".into(), &CancellationToken::new())
        .await;

    assert!(result.is_success());
    assert_eq!(result.embeddings_count, 0);
    assert_eq!(embeddings.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_gate_bounds_concurrent_fetches() {
    // Arrange
    let fetcher = MockFetcher::new().with_delay(Duration::from_millis(30));
    let service = EnrichmentService::new(
        fetcher.clone(),
        MockDocumentStore::new(),
        MockEmbeddingProvider::new(),
        config()
            .with_concurrency(5)
            .with_batch_size(20)
            .with_direct_lookup(false),
    )
    .unwrap();
    let tracker = JobTracker::new(JobKind::Enrich);

    // Act
    let results = service
        .enrich_many(&ids(20), &SilentReporter, Some(&tracker), CancellationToken::new())
        .await;

    // Assert
    assert_eq!(results.len(), 20);
    assert!(results.iter().all(|r| r.is_success()));
    assert!(fetcher.peak_in_flight.load(Ordering::SeqCst) <= 5);
    assert_eq!(fetcher.page_calls.load(Ordering::SeqCst), 20);
    assert_eq!(service.queue_depth().in_flight, 0);
    assert_eq!(service.queue_depth().pending, 0);

    let job = tracker.snapshot();
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.processed, 20);
    assert_eq!(job.progress, 100.0);
}

#[tokio::test]
async fn test_queue_depth_visible_while_running() {
    let fetcher = MockFetcher::new().with_delay(Duration::from_millis(200));
    let service = EnrichmentService::new(
        fetcher,
        MockDocumentStore::new(),
        MockEmbeddingProvider::new(),
        config()
            .with_concurrency(5)
            .with_batch_size(20)
            .with_direct_lookup(false),
    )
    .unwrap();

    let runner = service.clone();
    let handle = tokio::spawn(async move {
        runner
            .enrich_many(&ids(20), &SilentReporter, None, CancellationToken::new())
            .await
    });

    tokio::time::sleep(Duration::from_millis(50)).await;
    let depth = service.queue_depth();
    assert_eq!(depth.in_flight, 5);
    assert_eq!(depth.pending, 15);

    let results = handle.await.unwrap();
    assert_eq!(results.len(), 20);
    assert_eq!(service.queue_depth().pending, 0);
}

#[tokio::test]
async fn test_enrich_many_counts_errors_in_tracker() {
    let service = EnrichmentService::new(
        MockFetcher::new().failing(),
        MockDocumentStore::new(),
        MockEmbeddingProvider::new(),
        config().with_batch_size(2),
    )
    .unwrap();
    let tracker = JobTracker::new(JobKind::Enrich);

    let results = service
        .enrich_many(&ids(5), &SilentReporter, Some(&tracker), CancellationToken::new())
        .await;

    assert!(results.iter().all(|r| !r.is_success()));
    let job = tracker.snapshot();
    assert_eq!(job.errors, 5);
    assert_eq!(job.error_details.len(), 5);
    assert_eq!(job.processed, 5);
}

#[tokio::test]
async fn test_enrich_missing_backfills_short_texts() {
    let store = MockDocumentStore::new();
    store.insert_with_text("complete", &"x".repeat(80));
    store.insert_with_text("stub-1", "");
    store.insert_with_text("stub-2", "short");
    let fetcher = MockFetcher::new();
    let service =
        EnrichmentService::new(fetcher.clone(), store.clone(), MockEmbeddingProvider::new(), config())
            .unwrap();

    let results = service
        .enrich_missing(10, &SilentReporter, None, CancellationToken::new())
        .await
        .unwrap();

    let mut done: Vec<_> = results.iter().map(|r| r.doc_id.as_str().to_string()).collect();
    done.sort();
    assert_eq!(done, vec!["stub-1", "stub-2"]);
    assert!(results.iter().all(|r| r.is_success() && !r.cached));
    assert_eq!(fetcher.page_calls.load(Ordering::SeqCst), 2);
}
