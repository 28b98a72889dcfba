use axum::http::StatusCode;
use serde_json::json;
use themis_core::JobKind;

use super::common::{ADMIN_TOKEN, app, categories, get, post_json, send, test_state};

#[tokio::test]
async fn test_job_routes_forbidden_without_admin_token() {
    let state = test_state(None, Some(categories()));

    let (status, body) = send(
        app(state.clone()),
        post_json("/api/v1/jobs/harvest", Some("anything"), json!({})),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "forbidden");

    let (status, _) = send(
        app(state),
        post_json("/api/v1/jobs/enrich", None, json!({"missing": 10})),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_job_routes_require_matching_bearer() {
    let state = test_state(Some(ADMIN_TOKEN), Some(categories()));

    let (status, body) = send(
        app(state.clone()),
        post_json("/api/v1/jobs/harvest", None, json!({})),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "unauthorized");

    let (status, _) = send(
        app(state.clone()),
        post_json("/api/v1/jobs/harvest", Some("wrong-token"), json!({})),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    assert!(state.jobs.list().is_empty());
}

#[tokio::test]
async fn test_harvest_job_accepted_and_tracked() {
    let state = test_state(Some(ADMIN_TOKEN), Some(categories()));

    let (status, body) = send(
        app(state.clone()),
        post_json(
            "/api/v1/jobs/harvest",
            Some(ADMIN_TOKEN),
            json!({"dry_run": true, "max_documents": 10, "date_from": "2023-01-01", "date_to": "2023-03-15"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["kind"], "harvest");
    assert_eq!(body["status"], "queued");

    let job_id = body["job_id"].as_str().unwrap().to_string();

    let (status, job) = send(app(state.clone()), get(&format!("/api/v1/jobs/{}", job_id))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(job["job_id"], job_id.as_str());

    let (status, jobs) = send(app(state), get("/api/v1/jobs")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(jobs.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_second_harvest_job_conflicts_while_one_is_active() {
    let state = test_state(Some(ADMIN_TOKEN), Some(categories()));
    let running = state.jobs.create(JobKind::Harvest);
    running.start(4);

    let (status, body) = send(
        app(state.clone()),
        post_json("/api/v1/jobs/harvest", Some(ADMIN_TOKEN), json!({"dry_run": true})),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "conflict");
    assert_eq!(state.jobs.list().len(), 1);

    // Enrichment jobs do not touch checkpoints and are still accepted.
    let (status, _) = send(
        app(state.clone()),
        post_json("/api/v1/jobs/enrich", Some(ADMIN_TOKEN), json!({"missing": 5})),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);

    running.fail("stopped");
    let (status, _) = send(
        app(state),
        post_json("/api/v1/jobs/harvest", Some(ADMIN_TOKEN), json!({"dry_run": true})),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);
}

#[tokio::test]
async fn test_harvest_job_rejects_bad_overrides() {
    let state = test_state(Some(ADMIN_TOKEN), Some(categories()));

    let (status, body) = send(
        app(state.clone()),
        post_json(
            "/api/v1/jobs/harvest",
            Some(ADMIN_TOKEN),
            json!({"date_from": "2023-03-15", "date_to": "2023-01-01"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "bad_request");
    assert!(state.jobs.list().is_empty());
}

#[tokio::test]
async fn test_harvest_job_requires_categories() {
    let state = test_state(Some(ADMIN_TOKEN), None);

    let (status, body) = send(
        app(state),
        post_json("/api/v1/jobs/harvest", Some(ADMIN_TOKEN), json!({})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "No categories configured");
}

#[tokio::test]
async fn test_enrich_job_validation() {
    let state = test_state(Some(ADMIN_TOKEN), None);

    let (status, _) = send(
        app(state.clone()),
        post_json("/api/v1/jobs/enrich", Some(ADMIN_TOKEN), json!({})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = send(
        app(state),
        post_json(
            "/api/v1/jobs/enrich",
            Some(ADMIN_TOKEN),
            json!({"document_ids": ["cd-2023-0042"]}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["kind"], "enrich");
}

#[tokio::test]
async fn test_unknown_job_is_not_found() {
    let state = test_state(None, None);

    let (status, body) = send(
        app(state),
        get("/api/v1/jobs/00000000-0000-0000-0000-000000000000"),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "not_found");
}

#[tokio::test]
async fn test_queue_depth_idle() {
    let state = test_state(None, None);

    let (status, body) = send(app(state), get("/api/v1/queue")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["in_flight"], 0);
    assert_eq!(body["pending"], 0);
    assert_eq!(body["active_jobs"], 0);
}

#[tokio::test]
async fn test_health_reports_unreachable_database() {
    let state = test_state(None, None);

    let (status, body) = send(app(state), get("/api/v1/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "degraded");
    assert_eq!(body["database"]["healthy"], false);
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
}
