//! OpenAPI documentation configuration.

use utoipa::OpenApi;

use crate::dto::{
    EnrichJobRequest, HarvestJobRequest, HealthResponse, JobResponse, QueueResponse,
    ServiceStatus, StatsResponse,
};
use crate::error::ErrorResponse;
use crate::handlers::{health, jobs, queue, stats};

/// OpenAPI documentation for the Themis API.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "Themis API",
        version = "0.3.0",
        description = "Resumable harvesting and enrichment of court decisions.

Themis discovers decisions through a paginated search API, persists them in
batches and backfills their full text, sections and embeddings. Runs are
launched as background jobs and polled for progress.

## Authentication

`POST /api/v1/jobs/*` require `Authorization: Bearer <THEMIS_ADMIN_TOKEN>`.
Without a configured token these endpoints answer 403.

## Quick Start

1. Check server health: `GET /api/v1/health`
2. Launch a harvest: `POST /api/v1/jobs/harvest` with `{\"dry_run\": true}`
3. Poll it: `GET /api/v1/jobs/{id}`
",
        license(
            name = "Apache-2.0",
            url = "https://www.apache.org/licenses/LICENSE-2.0"
        )
    ),
    servers(
        (url = "http://localhost:3000", description = "Local development server")
    ),
    paths(
        health::health_check,
        stats::get_stats,
        queue::get_queue,
        jobs::create_harvest_job,
        jobs::create_enrich_job,
        jobs::list_jobs,
        jobs::get_job,
    ),
    components(
        schemas(
            // Request types
            HarvestJobRequest,
            EnrichJobRequest,
            // Response types
            HealthResponse,
            ServiceStatus,
            StatsResponse,
            JobResponse,
            QueueResponse,
            ErrorResponse,
        )
    ),
    tags(
        (name = "system", description = "System health and statistics"),
        (name = "jobs", description = "Background harvest and enrichment jobs"),
    )
)]
pub struct ApiDoc;
