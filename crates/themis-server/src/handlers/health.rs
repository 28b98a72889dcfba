//! Health check endpoint.

use axum::{Json, extract::State};

use crate::dto::{HealthResponse, ServiceStatus};
use crate::error::ApiError;
use crate::state::AppState;

/// Health check endpoint.
///
/// Returns the server status, version and database connectivity. An
/// unreachable database degrades the status but still answers 200.
#[utoipa::path(
    get,
    path = "/api/v1/health",
    responses(
        (status = 200, description = "Server is up", body = HealthResponse),
    ),
    tag = "system"
)]
pub async fn health_check(
    State(state): State<AppState>,
) -> Result<Json<HealthResponse>, ApiError> {
    let database = match state.document_repo.health_check().await {
        Ok(()) => ServiceStatus {
            healthy: true,
            message: None,
        },
        Err(e) => {
            tracing::warn!(error = %e, "Database health check failed");
            ServiceStatus {
                healthy: false,
                message: Some(e.to_string()),
            }
        }
    };

    let status = if database.healthy { "healthy" } else { "degraded" };

    Ok(Json(HealthResponse {
        status: status.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        database,
    }))
}
