//! Authentication middleware for the job-launching endpoints.

use axum::extract::State;
use axum::http::{Request, StatusCode, header};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use crate::error::ErrorResponse;
use crate::state::AppState;

/// Constant-time byte comparison for token checks.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter()
        .zip(b.iter())
        .fold(0u8, |acc, (x, y)| acc | (x ^ y))
        == 0
}

fn reject(status: StatusCode, error: &str, message: &str) -> Response {
    let body = ErrorResponse {
        error: error.to_string(),
        message: message.to_string(),
        details: None,
    };
    (status, axum::Json(body)).into_response()
}

/// Validates `Authorization: Bearer <token>` against the configured admin token.
///
/// - No admin token configured: 403 Forbidden, the endpoints are disabled.
/// - Missing or wrong token: 401 Unauthorized.
pub async fn require_api_key(
    State(state): State<AppState>,
    request: Request<axum::body::Body>,
    next: Next,
) -> Response {
    let Some(expected_token) = &state.admin_token else {
        return reject(
            StatusCode::FORBIDDEN,
            "forbidden",
            "Job endpoints are disabled (no THEMIS_ADMIN_TOKEN configured)",
        );
    };

    let authenticated = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .is_some_and(|token| constant_time_eq(token.as_bytes(), expected_token.as_bytes()));

    if !authenticated {
        return reject(
            StatusCode::UNAUTHORIZED,
            "unauthorized",
            "Missing or invalid Authorization header. Expected: Bearer <token>",
        );
    }

    next.run(request).await
}
