//! Integration tests for DocumentRepository.

use themis_core::{DocumentIdentity, DocumentRecord, Section, SectionKind};
use themis_db::DocumentRepository;

use crate::integration::common::{sample_chunk, sample_document, setup_test_db};

#[tokio::test]
async fn test_upsert_batch_inserts_and_is_idempotent() {
    let (pool, _container) = setup_test_db().await;
    let repo = DocumentRepository::new(pool);
    let batch = vec![sample_document("d-1"), sample_document("d-2")];

    let first = repo.upsert_batch(&batch).await.expect("first upsert");
    let second = repo.upsert_batch(&batch).await.expect("second upsert");

    assert_eq!(first, 2);
    assert_eq!(second, 2);
    assert_eq!(repo.count().await.unwrap(), 2, "identity is the conflict key");

    let stored = repo.get(&"d-1".into()).await.unwrap().expect("stored");
    assert_eq!(stored.category.as_deref(), Some("labour"));
    assert_eq!(stored.court.as_deref(), Some("Court of Appeal"));
    assert!(stored.first_seen_at <= stored.last_updated_at);
}

#[tokio::test]
async fn test_upsert_batch_tolerates_duplicate_identities() {
    let (pool, _container) = setup_test_db().await;
    let repo = DocumentRepository::new(pool);

    let mut later = sample_document("d-1");
    later.title = Some("Corrected title".to_string());
    let written = repo
        .upsert_batch(&[sample_document("d-1"), later])
        .await
        .expect("duplicates collapse");

    assert_eq!(written, 1);
    let stored = repo.get(&"d-1".into()).await.unwrap().unwrap();
    assert_eq!(stored.title.as_deref(), Some("Corrected title"));
}

#[tokio::test]
async fn test_harvest_never_erases_full_text() {
    let (pool, _container) = setup_test_db().await;
    let repo = DocumentRepository::new(pool);
    repo.upsert_batch(&[sample_document("d-1")]).await.unwrap();

    repo.upsert_full_text(&DocumentRecord {
        identity: DocumentIdentity::new("d-1"),
        title: None,
        case_number: Some("17/2023".to_string()),
        full_text: "FACTS\n\nThe tenant received notice.".to_string(),
        full_text_html: Some("<p>FACTS</p>".to_string()),
        source_url: Some("https://court.example.org/d/d-1".to_string()),
    })
    .await
    .unwrap();

    // A later search hit carries no text and a different category.
    let mut rediscovered = sample_document("d-1");
    rediscovered.category = "housing".to_string();
    repo.upsert_batch(&[rediscovered]).await.unwrap();

    let stored = repo.get(&"d-1".into()).await.unwrap().unwrap();
    assert!(stored.has_full_text(10));
    assert_eq!(stored.case_number.as_deref(), Some("17/2023"));
    assert_eq!(stored.title.as_deref(), Some("Decision d-1"));
    assert_eq!(stored.category.as_deref(), Some("labour"));
}

#[tokio::test]
async fn test_full_text_for_unknown_identity_creates_row() {
    let (pool, _container) = setup_test_db().await;
    let repo = DocumentRepository::new(pool);

    repo.upsert_full_text(&DocumentRecord {
        identity: DocumentIdentity::new("fresh"),
        title: Some("Fresh".to_string()),
        case_number: None,
        full_text: "text".to_string(),
        full_text_html: None,
        source_url: None,
    })
    .await
    .unwrap();

    let stored = repo.get(&"fresh".into()).await.unwrap().unwrap();
    assert!(stored.category.is_none());
    assert_eq!(stored.full_text.as_deref(), Some("text"));
}

#[tokio::test]
async fn test_sections_are_replaced() {
    let (pool, _container) = setup_test_db().await;
    let repo = DocumentRepository::new(pool);
    repo.upsert_batch(&[sample_document("d-1")]).await.unwrap();
    let id = DocumentIdentity::new("d-1");

    let section = |kind, position| Section {
        kind,
        heading: None,
        position,
        text: format!("{}", kind),
    };
    repo.replace_sections(
        &id,
        &[
            section(SectionKind::Header, 0),
            section(SectionKind::Facts, 1),
            section(SectionKind::Decision, 2),
        ],
    )
    .await
    .unwrap();
    repo.replace_sections(&id, &[section(SectionKind::Reasoning, 0)])
        .await
        .unwrap();

    let stats = repo.get_stats().await.unwrap();
    assert_eq!(stats.total_sections, 1);
}

#[tokio::test]
async fn test_chunks_upsert_by_position() {
    let (pool, _container) = setup_test_db().await;
    let repo = DocumentRepository::new(pool);
    repo.upsert_batch(&[sample_document("d-1")]).await.unwrap();

    repo.upsert_chunk(&sample_chunk("d-1", SectionKind::Facts, 0))
        .await
        .unwrap();
    repo.upsert_chunk(&sample_chunk("d-1", SectionKind::Facts, 0))
        .await
        .unwrap();
    repo.upsert_chunk(&sample_chunk("d-1", SectionKind::Reasoning, 0))
        .await
        .unwrap();

    let stats = repo.get_stats().await.unwrap();
    assert_eq!(stats.total_chunks, 2);
}

#[tokio::test]
async fn test_delete_chunks_only_touches_one_document() {
    let (pool, _container) = setup_test_db().await;
    let repo = DocumentRepository::new(pool);
    repo.upsert_batch(&[sample_document("d-1"), sample_document("d-2")])
        .await
        .unwrap();
    for index in 0..3 {
        repo.upsert_chunk(&sample_chunk("d-1", SectionKind::Facts, index))
            .await
            .unwrap();
    }
    repo.upsert_chunk(&sample_chunk("d-2", SectionKind::Facts, 0))
        .await
        .unwrap();

    let deleted = repo
        .delete_chunks(&DocumentIdentity::new("d-1"))
        .await
        .unwrap();

    assert_eq!(deleted, 3);
    assert_eq!(repo.get_stats().await.unwrap().total_chunks, 1);
}

#[tokio::test]
async fn test_list_missing_full_text() {
    let (pool, _container) = setup_test_db().await;
    let repo = DocumentRepository::new(pool);
    repo.upsert_batch(&[
        sample_document("empty"),
        sample_document("short"),
        sample_document("complete"),
    ])
    .await
    .unwrap();
    for (id, text) in [("short", "  tiny  "), ("complete", "a long enough decision text")] {
        repo.upsert_full_text(&DocumentRecord {
            identity: DocumentIdentity::new(id),
            title: None,
            case_number: None,
            full_text: text.to_string(),
            full_text_html: None,
            source_url: None,
        })
        .await
        .unwrap();
    }

    let mut missing: Vec<String> = repo
        .list_missing_full_text(10, 100)
        .await
        .unwrap()
        .into_iter()
        .map(|id| id.as_str().to_string())
        .collect();
    missing.sort();

    assert_eq!(missing, vec!["empty", "short"]);
    assert_eq!(repo.list_missing_full_text(10, 1).await.unwrap().len(), 1);

    let stats = repo.get_stats().await.unwrap();
    assert_eq!(stats.total_documents, 3);
    assert_eq!(stats.with_full_text, 2);
    assert!(stats.last_update.is_some());
}

#[tokio::test]
async fn test_health_check() {
    let (pool, _container) = setup_test_db().await;
    let repo = DocumentRepository::new(pool);

    repo.health_check().await.expect("database reachable");
}
