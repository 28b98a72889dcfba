//! Router configuration and route composition.

use std::sync::Arc;
use std::time::Duration;

use axum::http::{HeaderValue, Method};
use axum::{
    Router, middleware,
    routing::{get, post},
};
use themis_core::AppError;
use tower_governor::{GovernorLayer, governor::GovernorConfigBuilder};
use tower_http::{compression::CompressionLayer, cors::CorsLayer, trace::TraceLayer};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::auth::require_api_key;
use crate::config::ServerConfig;
use crate::handlers::{health, jobs, queue, stats};
use crate::openapi::ApiDoc;
use crate::state::AppState;

/// Routes under `/api/v1`, without the transport middleware.
pub fn api_router(state: AppState) -> Router {
    // Public routes (no authentication required)
    let public_routes = Router::new()
        .route("/health", get(health::health_check))
        .route("/stats", get(stats::get_stats))
        .route("/queue", get(queue::get_queue))
        .route("/jobs", get(jobs::list_jobs))
        .route("/jobs/:id", get(jobs::get_job));

    // Protected routes (require Bearer token)
    let protected_routes = Router::new()
        .route("/jobs/harvest", post(jobs::create_harvest_job))
        .route("/jobs/enrich", post(jobs::create_enrich_job))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            require_api_key,
        ));

    Router::new()
        .nest("/api/v1", public_routes.merge(protected_routes))
        .with_state(state)
}

/// Creates the main application router with all routes and middleware.
///
/// The per-client rate limit keys on the peer address, so the router must be
/// served with `into_make_service_with_connect_info::<SocketAddr>()`.
pub fn create_router(state: AppState, config: &ServerConfig) -> Result<Router, AppError> {
    let governor_config = Arc::new(
        GovernorConfigBuilder::default()
            .per_second(config.rate_limit_rps.into())
            .burst_size(config.rate_limit_burst)
            .finish()
            .ok_or_else(|| {
                AppError::ConfigError(format!(
                    "invalid rate limit: {} rps, burst {}",
                    config.rate_limit_rps, config.rate_limit_burst
                ))
            })?,
    );

    let cors_layer = build_cors_layer(&config.cors_origins);

    Ok(api_router(state)
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        // Middleware layers (order matters: bottom layers run first)
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer)
        .layer(GovernorLayer {
            config: governor_config,
        }))
}

/// Build CORS layer from configuration.
///
/// `"*"` allows any origin; otherwise a comma-separated list of origins.
fn build_cors_layer(origins: &str) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([
            axum::http::header::CONTENT_TYPE,
            axum::http::header::AUTHORIZATION,
            axum::http::header::ACCEPT,
        ])
        .max_age(Duration::from_secs(3600));

    if origins == "*" {
        cors.allow_origin(tower_http::cors::Any)
    } else {
        let allowed: Vec<HeaderValue> = origins
            .split(',')
            .filter_map(|s| s.trim().parse().ok())
            .collect();
        cors.allow_origin(allowed)
    }
}
