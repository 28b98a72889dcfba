//! Integration tests for HarvestService.

use std::time::Duration;

use chrono::{TimeZone, Utc};
use themis_core::checkpoint::{CheckpointConfig, CheckpointStatus, ScrapeCheckpoint};
use themis_core::{
    AppError, HarvestConfig, HarvestService, JobKind, JobStatus, JobTracker, NoRemoteIngest,
    SearchCategory, SilentReporter,
};
use tokio_util::sync::CancellationToken;

use crate::integration::common::{
    MockCheckpointStore, MockDocumentStore, MockSearchClient, category, date, fast_config,
};

type TestService =
    HarvestService<MockSearchClient, MockDocumentStore, MockCheckpointStore, NoRemoteIngest>;

fn service(
    search: &MockSearchClient,
    store: &MockDocumentStore,
    checkpoints: &MockCheckpointStore,
    config: HarvestConfig,
) -> TestService {
    HarvestService::new(
        search.clone(),
        store.clone(),
        checkpoints.clone(),
        None,
        config,
    )
}

fn checkpoint_config(category: &SearchCategory, config: &HarvestConfig) -> CheckpointConfig {
    CheckpointConfig::for_category(category, None, config.date_from, config.date_to)
}

#[tokio::test]
async fn test_harvest_persists_all_streams() {
    // Arrange
    let search = MockSearchClient::new(25);
    let store = MockDocumentStore::new();
    let checkpoints = MockCheckpointStore::new();
    let categories = vec![category("tenancy", &["eviction", "rent increase"])];

    // Act
    let summary = service(&search, &store, &checkpoints, fast_config())
        .harvest(&categories)
        .await
        .unwrap();

    // Assert
    assert_eq!(summary.unique_documents, 50);
    assert_eq!(store.len(), 50);
    assert_eq!(summary.before_total, Some(0));
    assert_eq!(summary.after_total, Some(50));
    assert_eq!(summary.categories.len(), 1);
    assert_eq!(summary.categories[0].fetched, 50);
    assert_eq!(summary.categories[0].new_documents, 50);
    assert_eq!(summary.categories[0].pages, 6);
    assert_eq!(summary.batches.persisted, 50);
    assert_eq!(summary.batches.failed_batches, 0);
    assert!(!summary.cancelled);
    assert!(!summary.cap_reached);
}

#[tokio::test]
async fn test_rerun_does_not_duplicate_documents() {
    let search = MockSearchClient::new(25);
    let store = MockDocumentStore::new();
    let checkpoints = MockCheckpointStore::new();
    let categories = vec![category("tenancy", &["eviction", "rent increase"])];

    let first = service(&search, &store, &checkpoints, fast_config())
        .harvest(&categories)
        .await
        .unwrap();
    let second = service(&search, &store, &checkpoints, fast_config())
        .harvest(&categories)
        .await
        .unwrap();

    assert_eq!(first.after_total, Some(50));
    assert_eq!(second.before_total, Some(50));
    assert_eq!(second.after_total, Some(50));
    assert_eq!(second.store_delta(), Some(0));
    assert_eq!(store.len(), 50);
}

#[tokio::test]
async fn test_dedup_across_concurrent_keywords() {
    // Both keywords return the same 25 identities.
    let search = MockSearchClient::new(25).with_shared_ids();
    let store = MockDocumentStore::new();
    let checkpoints = MockCheckpointStore::new();
    let categories = vec![category("labour", &["dismissal", "overtime"])];

    let summary = service(&search, &store, &checkpoints, fast_config())
        .harvest(&categories)
        .await
        .unwrap();

    let stats = &summary.categories[0];
    assert_eq!(summary.unique_documents, 25);
    assert_eq!(stats.fetched, 50);
    assert_eq!(stats.new_documents, 25);
    assert_eq!(stats.duplicates, 25);
    assert_eq!(store.len(), 25);
}

#[tokio::test]
async fn test_global_cap_stops_new_requests() {
    // Arrange
    let search = MockSearchClient::new(200);
    let store = MockDocumentStore::new();
    let checkpoints = MockCheckpointStore::new();
    let categories = vec![category("labour", &["dismissal"])];
    let config = fast_config()
        .with_max_documents(50)
        .with_window_concurrency(1);

    // Act
    let summary = service(&search, &store, &checkpoints, config.clone())
        .harvest(&categories)
        .await
        .unwrap();

    // Assert
    assert_eq!(summary.unique_documents, 50);
    assert!(summary.cap_reached);
    assert_eq!(store.len(), 50);
    assert_eq!(search.call_count(), 5, "no page requested after the cap");

    let cp = checkpoints
        .get(&checkpoint_config(&categories[0], &config))
        .unwrap();
    assert_eq!(cp.status, CheckpointStatus::InProgress);
    assert_eq!(cp.last_page, 5);
}

#[tokio::test]
async fn test_cap_applies_across_categories() {
    let search = MockSearchClient::new(30);
    let store = MockDocumentStore::new();
    let checkpoints = MockCheckpointStore::new();
    let categories = vec![
        category("labour", &["dismissal"]),
        category("tenancy", &["eviction"]),
    ];

    let summary = service(
        &search,
        &store,
        &checkpoints,
        fast_config().with_max_documents(30),
    )
    .harvest(&categories)
    .await
    .unwrap();

    assert_eq!(summary.unique_documents, 30);
    assert_eq!(summary.categories.len(), 1, "second category never started");
    assert!(search.calls.lock().unwrap().iter().all(|q| q.category == "labour"));
}

#[tokio::test]
async fn test_failed_page_is_skipped_not_fatal() {
    let search = MockSearchClient::new(30).with_failing_pages(&[2]);
    let store = MockDocumentStore::new();
    let checkpoints = MockCheckpointStore::new();
    let categories = vec![category("labour", &["dismissal"])];
    let tracker = JobTracker::new(JobKind::Harvest);

    let summary = service(&search, &store, &checkpoints, fast_config())
        .harvest_cancellable(
            &categories,
            &SilentReporter,
            Some(&tracker),
            CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(search.pages_requested(), vec![1, 2, 3]);
    assert_eq!(summary.categories[0].errors, 1);
    assert_eq!(summary.categories[0].pages, 2);
    assert_eq!(summary.unique_documents, 20);

    let job = tracker.snapshot();
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.errors, 1);
    assert_eq!(job.errors, job.error_details.len());
    assert!(job.error_details[0].contains("page 2"));
}

#[tokio::test]
async fn test_all_pages_failing_marks_checkpoint_failed() {
    let search = MockSearchClient::new(30).with_failing_pages(&[1, 2]);
    let store = MockDocumentStore::new();
    let checkpoints = MockCheckpointStore::new();
    let categories = vec![category("labour", &["dismissal"])];
    let config = fast_config().with_max_pages(2);

    let summary = service(&search, &store, &checkpoints, config.clone())
        .harvest(&categories)
        .await
        .unwrap();

    assert_eq!(summary.categories[0].errors, 2);
    let cp = checkpoints
        .get(&checkpoint_config(&categories[0], &config))
        .unwrap();
    assert_eq!(cp.status, CheckpointStatus::Failed);
    assert!(cp.last_error.is_some());
}

#[tokio::test]
async fn test_max_pages_ceiling() {
    let search = MockSearchClient::new(1_000);
    let store = MockDocumentStore::new();
    let checkpoints = MockCheckpointStore::new();
    let categories = vec![category("labour", &["dismissal"])];

    let summary = service(
        &search,
        &store,
        &checkpoints,
        fast_config().with_max_pages(3),
    )
    .harvest(&categories)
    .await
    .unwrap();

    assert_eq!(search.call_count(), 3);
    assert_eq!(summary.unique_documents, 30);
}

#[tokio::test]
async fn test_search_queries_carry_window_and_form() {
    let search = MockSearchClient::new(5);
    let store = MockDocumentStore::new();
    let checkpoints = MockCheckpointStore::new();
    let categories = vec![category("administrative", &["permit"]).with_form("ADM")];
    let config = fast_config()
        .with_date_range(date(2023, 1, 1), Some(date(2023, 3, 15)))
        .with_window_days(30);

    service(&search, &store, &checkpoints, config)
        .harvest(&categories)
        .await
        .unwrap();

    let mut windows: Vec<_> = search
        .calls
        .lock()
        .unwrap()
        .iter()
        .map(|q| (q.date_from, q.date_to, q.jurisdictions.clone()))
        .collect();
    windows.sort();
    assert_eq!(
        windows,
        vec![
            (date(2023, 1, 1), date(2023, 1, 30), vec!["ADM".to_string()]),
            (date(2023, 1, 31), date(2023, 3, 1), vec!["ADM".to_string()]),
            (date(2023, 3, 2), date(2023, 3, 15), vec!["ADM".to_string()]),
        ]
    );
}

#[tokio::test]
async fn test_checkpoint_completed_after_run() {
    let search = MockSearchClient::new(25);
    let store = MockDocumentStore::new();
    let checkpoints = MockCheckpointStore::new();
    let categories = vec![category("tenancy", &["eviction"])];
    let config = fast_config();

    service(&search, &store, &checkpoints, config.clone())
        .harvest(&categories)
        .await
        .unwrap();

    let cp = checkpoints
        .get(&checkpoint_config(&categories[0], &config))
        .unwrap();
    assert_eq!(cp.status, CheckpointStatus::Completed);
    assert_eq!(cp.last_page, 3);
    assert_eq!(cp.documents_scraped, 25);
    assert!(cp.last_scraped_at.is_some());
    // Pages 1 and 2 fill whole batches. Page 3 stays buffered until the
    // category flush, after which only the final upsert is written.
    assert_eq!(checkpoints.upsert_count(), 3);
}

#[tokio::test]
async fn test_resumes_unfinished_checkpoint_after_last_page() {
    // Arrange
    let search = MockSearchClient::new(100);
    let store = MockDocumentStore::new();
    let checkpoints = MockCheckpointStore::new();
    let categories = vec![category("tenancy", &["eviction"])];
    let config = fast_config();
    let key = checkpoint_config(&categories[0], &config);

    checkpoints.insert(ScrapeCheckpoint {
        config_hash: key.config_hash(),
        category_form: None,
        keywords: key.keyword_set(),
        justice_kind: None,
        last_page: 7,
        documents_scraped: 70,
        documents_failed: 0,
        status: CheckpointStatus::InProgress,
        last_error: None,
        last_scraped_at: None,
        updated_at: Utc::now(),
    });

    // Act
    let summary = service(&search, &store, &checkpoints, config)
        .harvest(&categories)
        .await
        .unwrap();

    // Assert
    assert_eq!(search.pages_requested(), vec![8, 9, 10]);
    assert_eq!(summary.unique_documents, 30);
    let cp = checkpoints.get(&key).unwrap();
    assert_eq!(cp.status, CheckpointStatus::Completed);
    assert_eq!(cp.last_page, 10);
    assert_eq!(cp.documents_scraped, 100);
}

#[tokio::test]
async fn test_interrupted_run_never_checkpoints_unflushed_pages() {
    // Arrange: ten pages fit in one batch, so nothing is written before the interruption.
    let search = MockSearchClient::new(60).with_delay(Duration::from_millis(10));
    let store = MockDocumentStore::new();
    let checkpoints = MockCheckpointStore::new();
    let categories = vec![category("tenancy", &["eviction"])];
    let config = fast_config().with_batch_size(100);
    let key = checkpoint_config(&categories[0], &config);

    // Act: the run future is dropped mid-way, as in a crash.
    let interrupted = tokio::time::timeout(
        Duration::from_millis(55),
        service(&search, &store, &checkpoints, config.clone()).harvest(&categories),
    )
    .await;

    // Assert
    assert!(interrupted.is_err(), "run was still in progress");
    assert!(search.call_count() >= 2);
    assert_eq!(store.len(), 0);
    assert!(checkpoints.get(&key).is_none(), "no page is marked done before its batch is written");

    // Act: a fresh run resumes the configuration.
    service(&search, &store, &checkpoints, config)
        .harvest(&categories)
        .await
        .unwrap();

    // Assert: every document is stored, including those of the first pages.
    assert_eq!(store.len(), 60);
    assert!(store.documents.lock().unwrap().contains_key(&"eviction-2023-01-01-0".into()));
    assert_eq!(checkpoints.get(&key).unwrap().status, CheckpointStatus::Completed);
}

#[tokio::test]
async fn test_interrupted_run_resumes_after_last_flushed_page() {
    // Arrange: two pages per batch.
    let search = MockSearchClient::new(60).with_delay(Duration::from_millis(10));
    let store = MockDocumentStore::new();
    let checkpoints = MockCheckpointStore::new();
    let categories = vec![category("tenancy", &["eviction"])];
    let config = fast_config().with_batch_size(20);
    let key = checkpoint_config(&categories[0], &config);

    // Act
    let interrupted = tokio::time::timeout(
        Duration::from_millis(55),
        service(&search, &store, &checkpoints, config.clone()).harvest(&categories),
    )
    .await;
    assert!(interrupted.is_err());

    // Assert: the checkpoint never runs ahead of the store.
    let cp = checkpoints.get(&key).unwrap();
    assert_eq!(cp.status, CheckpointStatus::InProgress);
    assert!(cp.last_page >= 2);
    assert_eq!(cp.last_page % 2, 0, "only whole batches are checkpointed");
    assert!(store.len() as u64 >= cp.documents_scraped);
    assert_eq!(cp.documents_scraped, u64::from(cp.last_page) * 10);

    // Act
    let calls_before = search.call_count();
    service(&search, &store, &checkpoints, config)
        .harvest(&categories)
        .await
        .unwrap();

    // Assert
    let resumed = search.pages_requested()[calls_before];
    assert_eq!(resumed, cp.last_page + 1);
    assert_eq!(store.len(), 60);
    let done = checkpoints.get(&key).unwrap();
    assert_eq!(done.status, CheckpointStatus::Completed);
    assert_eq!(done.documents_scraped, 60);
}

#[tokio::test]
async fn test_incremental_mode_starts_from_last_completion() {
    let search = MockSearchClient::new(5);
    let store = MockDocumentStore::new();
    let checkpoints = MockCheckpointStore::new();
    let categories = vec![category("tenancy", &["eviction"])];
    let config = fast_config().with_window_days(10).with_incremental();
    let key = checkpoint_config(&categories[0], &config);

    checkpoints.insert(ScrapeCheckpoint {
        config_hash: key.config_hash(),
        category_form: None,
        keywords: key.keyword_set(),
        justice_kind: None,
        last_page: 1,
        documents_scraped: 5,
        documents_failed: 0,
        status: CheckpointStatus::Completed,
        last_error: None,
        last_scraped_at: Some(Utc.with_ymd_and_hms(2023, 1, 21, 8, 0, 0).unwrap()),
        updated_at: Utc::now(),
    });

    service(&search, &store, &checkpoints, config)
        .harvest(&categories)
        .await
        .unwrap();

    let calls = search.calls.lock().unwrap();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].date_from, date(2023, 1, 21));
    assert_eq!(calls[0].date_to, date(2023, 1, 30));
}

#[tokio::test]
async fn test_dry_run_counts_without_persisting() {
    let search = MockSearchClient::new(25);
    let store = MockDocumentStore::new();
    let checkpoints = MockCheckpointStore::new();
    let categories = vec![category("tenancy", &["eviction"])];

    let summary = service(&search, &store, &checkpoints, fast_config().with_dry_run())
        .harvest(&categories)
        .await
        .unwrap();

    assert!(summary.dry_run);
    assert_eq!(summary.unique_documents, 25);
    assert_eq!(summary.before_total, None);
    assert_eq!(summary.batches.persisted, 0);
    assert_eq!(store.len(), 0);
    assert_eq!(store.save_call_count(), 0);
    assert_eq!(checkpoints.upsert_count(), 0);
}

#[tokio::test]
async fn test_tracker_reaches_completed_with_known_total() {
    let search = MockSearchClient::new(5);
    let store = MockDocumentStore::new();
    let checkpoints = MockCheckpointStore::new();
    let categories = vec![
        category("labour", &["dismissal", "overtime"]),
        category("tenancy", &["eviction"]),
    ];
    let tracker = JobTracker::new(JobKind::Harvest);

    service(&search, &store, &checkpoints, fast_config())
        .harvest_cancellable(
            &categories,
            &SilentReporter,
            Some(&tracker),
            CancellationToken::new(),
        )
        .await
        .unwrap();

    let job = tracker.snapshot();
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.total, 3);
    assert_eq!(job.processed, 3);
    assert_eq!(job.progress, 100.0);
}

#[tokio::test]
async fn test_capped_job_completes_at_full_progress() {
    let search = MockSearchClient::new(50);
    let store = MockDocumentStore::new();
    let checkpoints = MockCheckpointStore::new();
    let categories = vec![category("labour", &["dismissal", "overtime", "wages"])];
    let tracker = JobTracker::new(JobKind::Harvest);
    let config = fast_config()
        .with_max_documents(20)
        .with_window_concurrency(1);

    let summary = service(&search, &store, &checkpoints, config)
        .harvest_cancellable(
            &categories,
            &SilentReporter,
            Some(&tracker),
            CancellationToken::new(),
        )
        .await
        .unwrap();

    assert!(summary.cap_reached);
    assert_eq!(search.calls.lock().unwrap().iter().filter(|q| q.keyword != "dismissal").count(), 0);
    let job = tracker.snapshot();
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.total, 3);
    assert_eq!(job.processed, 3);
    assert_eq!(job.progress, 100.0);
}

#[tokio::test]
async fn test_skip_and_only_select_categories() {
    let search = MockSearchClient::new(5);
    let store = MockDocumentStore::new();
    let checkpoints = MockCheckpointStore::new();
    let categories = vec![
        category("labour", &["dismissal"]),
        category("tenancy", &["eviction"]),
        category("administrative", &["permit"]),
    ];
    let mut config = fast_config();
    config.only_categories = Some(vec![1, 2]);
    config.skip_categories = vec![2];

    let summary = service(&search, &store, &checkpoints, config)
        .harvest(&categories)
        .await
        .unwrap();

    let names: Vec<_> = summary.categories.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, vec!["tenancy"]);
}

#[tokio::test]
async fn test_empty_plan_is_a_configuration_error() {
    let search = MockSearchClient::new(5);
    let store = MockDocumentStore::new();
    let checkpoints = MockCheckpointStore::new();
    let mut disabled = category("labour", &["dismissal"]);
    disabled.enabled = false;
    let tracker = JobTracker::new(JobKind::Harvest);

    let result = service(&search, &store, &checkpoints, fast_config())
        .harvest_cancellable(
            &[disabled],
            &SilentReporter,
            Some(&tracker),
            CancellationToken::new(),
        )
        .await;

    assert!(matches!(result, Err(AppError::ConfigError(_))));
    assert_eq!(search.call_count(), 0);
    assert_eq!(tracker.snapshot().status, JobStatus::Failed);
}

#[tokio::test]
async fn test_invalid_config_aborts_before_any_request() {
    let search = MockSearchClient::new(5);
    let store = MockDocumentStore::new();
    let checkpoints = MockCheckpointStore::new();
    let categories = vec![category("labour", &["dismissal"])];

    let result = service(
        &search,
        &store,
        &checkpoints,
        fast_config().with_page_size(0),
    )
    .harvest(&categories)
    .await;

    assert!(matches!(result, Err(AppError::ConfigError(_))));
    assert_eq!(search.call_count(), 0);
}
