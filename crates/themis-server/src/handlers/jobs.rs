//! Background job endpoints.
//!
//! Launching a job registers a tracker, spawns the run on a task with a child
//! of the shutdown token and answers `202` immediately. Observers poll the
//! snapshot through `GET /api/v1/jobs/{id}`.
//!
//! Only one harvest runs at a time: concurrent runs would race on the same
//! checkpoint rows.

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use tracing::{info, warn};
use uuid::Uuid;

use themis_core::{JobKind, TracingReporter};

use crate::dto::{EnrichJobRequest, EnrichTarget, HarvestJobRequest, JobResponse};
use crate::error::ApiError;
use crate::state::AppState;

/// Launch a harvest of the configured categories.
#[utoipa::path(
    post,
    path = "/api/v1/jobs/harvest",
    request_body = HarvestJobRequest,
    responses(
        (status = 202, description = "Harvest job accepted", body = JobResponse),
        (status = 400, description = "Invalid overrides or no categories configured"),
        (status = 401, description = "Missing or invalid token"),
        (status = 403, description = "Job endpoints disabled"),
        (status = 409, description = "A harvest job is already running"),
    ),
    tag = "jobs"
)]
pub async fn create_harvest_job(
    State(state): State<AppState>,
    Json(request): Json<HarvestJobRequest>,
) -> Result<(StatusCode, Json<JobResponse>), ApiError> {
    let Some(categories) = &state.categories_config else {
        return Err(ApiError::BadRequest(
            "No categories configured".to_string(),
        ));
    };
    if categories.enabled_categories().is_empty() {
        return Err(ApiError::BadRequest(
            "No enabled categories found".to_string(),
        ));
    }

    let config = request.apply(state.harvest_service.config())?;
    let service = state.harvest_service.with_config(config);
    let categories = categories.categories.clone();

    let tracker = state.jobs.create_exclusive(JobKind::Harvest).ok_or_else(|| {
        ApiError::Conflict("A harvest job is already queued or running".to_string())
    })?;
    let snapshot = tracker.snapshot();
    let cancel = state.shutdown_token.child_token();

    info!(job_id = %snapshot.job_id, "Harvest job accepted");

    tokio::spawn(async move {
        match service
            .harvest_cancellable(&categories, &TracingReporter, Some(&tracker), cancel)
            .await
        {
            Ok(summary) => info!(
                job_id = %tracker.id(),
                unique = summary.unique_documents,
                persisted = summary.batches.persisted,
                cancelled = summary.cancelled,
                "Harvest job finished"
            ),
            Err(e) => warn!(job_id = %tracker.id(), error = %e, "Harvest job failed"),
        }
    });

    Ok((StatusCode::ACCEPTED, Json(JobResponse::from(snapshot))))
}

/// Launch an enrichment of explicit documents or of the missing-text backlog.
#[utoipa::path(
    post,
    path = "/api/v1/jobs/enrich",
    request_body = EnrichJobRequest,
    responses(
        (status = 202, description = "Enrichment job accepted", body = JobResponse),
        (status = 400, description = "Neither or both of document_ids and missing given"),
        (status = 401, description = "Missing or invalid token"),
        (status = 403, description = "Job endpoints disabled"),
    ),
    tag = "jobs"
)]
pub async fn create_enrich_job(
    State(state): State<AppState>,
    Json(request): Json<EnrichJobRequest>,
) -> Result<(StatusCode, Json<JobResponse>), ApiError> {
    let target = request.target()?;
    let service = state.enrichment_service.clone();

    let tracker = state.jobs.create(JobKind::Enrich);
    let snapshot = tracker.snapshot();
    let cancel = state.shutdown_token.child_token();

    info!(job_id = %snapshot.job_id, "Enrichment job accepted");

    tokio::spawn(async move {
        let results = match target {
            EnrichTarget::Documents(ids) => Ok(service
                .enrich_many(&ids, &TracingReporter, Some(&tracker), cancel)
                .await),
            EnrichTarget::Missing(limit) => {
                service
                    .enrich_missing(limit, &TracingReporter, Some(&tracker), cancel)
                    .await
            }
        };

        match results {
            Ok(results) => {
                let succeeded = results.iter().filter(|r| r.is_success()).count();
                let cached = results.iter().filter(|r| r.cached).count();
                info!(
                    job_id = %tracker.id(),
                    total = results.len(),
                    succeeded,
                    cached,
                    failed = results.len() - succeeded,
                    "Enrichment job finished"
                );
            }
            Err(e) => warn!(job_id = %tracker.id(), error = %e, "Enrichment job failed"),
        }
    });

    Ok((StatusCode::ACCEPTED, Json(JobResponse::from(snapshot))))
}

/// List every job launched since startup, newest first.
#[utoipa::path(
    get,
    path = "/api/v1/jobs",
    responses(
        (status = 200, description = "Job snapshots", body = Vec<JobResponse>),
    ),
    tag = "jobs"
)]
pub async fn list_jobs(State(state): State<AppState>) -> Json<Vec<JobResponse>> {
    Json(state.jobs.list().into_iter().map(JobResponse::from).collect())
}

/// Get the current snapshot of one job.
#[utoipa::path(
    get,
    path = "/api/v1/jobs/{id}",
    params(("id" = Uuid, Path, description = "Job id")),
    responses(
        (status = 200, description = "Job snapshot", body = JobResponse),
        (status = 404, description = "Unknown job"),
    ),
    tag = "jobs"
)]
pub async fn get_job(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<JobResponse>, ApiError> {
    state
        .jobs
        .get(id)
        .map(|job| Json(JobResponse::from(job)))
        .ok_or_else(|| ApiError::NotFound(format!("Job not found: {}", id)))
}
