//! Enrichment queue depth endpoint.

use axum::{Json, extract::State};

use crate::dto::QueueResponse;
use crate::state::AppState;

/// Current occupancy of the enrichment gate.
#[utoipa::path(
    get,
    path = "/api/v1/queue",
    responses(
        (status = 200, description = "Queue depth", body = QueueResponse),
    ),
    tag = "jobs"
)]
pub async fn get_queue(State(state): State<AppState>) -> Json<QueueResponse> {
    Json(QueueResponse::new(
        state.enrichment_service.queue_depth(),
        state.jobs.active_count(),
    ))
}
