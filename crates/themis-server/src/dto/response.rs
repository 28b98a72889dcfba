//! Response DTOs for API endpoints.

use chrono::{DateTime, Utc};
use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use themis_core::{BulkScrapeJob, DocumentStats, JobKind, QueueDepth};

// =============================================================================
// Health & Stats
// =============================================================================

/// Health check response.
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    /// Health status ("healthy" or "degraded")
    pub status: String,
    /// Server version
    pub version: String,
    /// Database connectivity status
    pub database: ServiceStatus,
}

/// Status of an individual service component.
#[derive(Debug, Serialize, ToSchema)]
pub struct ServiceStatus {
    /// Whether the service is reachable
    pub healthy: bool,
    /// Optional message (e.g., error details)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Document store statistics.
#[derive(Debug, Serialize, ToSchema)]
pub struct StatsResponse {
    pub total_documents: i64,
    /// Documents whose full text has been stored
    pub with_full_text: i64,
    pub total_sections: i64,
    /// Embedded chunks
    pub total_chunks: i64,
    pub last_update: Option<DateTime<Utc>>,
}

impl From<DocumentStats> for StatsResponse {
    fn from(s: DocumentStats) -> Self {
        Self {
            total_documents: s.total_documents,
            with_full_text: s.with_full_text,
            total_sections: s.total_sections,
            total_chunks: s.total_chunks,
            last_update: s.last_update,
        }
    }
}

// =============================================================================
// Jobs
// =============================================================================

/// Snapshot of a background job.
#[derive(Debug, Serialize, ToSchema)]
pub struct JobResponse {
    pub job_id: Uuid,
    /// "harvest" or "enrich"
    pub kind: String,
    /// "queued", "running", "completed" or "failed"
    pub status: String,
    /// Percentage in [0, 100]
    pub progress: f64,
    /// Units of work once the job is running (tasks or documents)
    pub total: usize,
    pub processed: usize,
    pub errors: usize,
    /// Most recent error messages, oldest first
    pub error_details: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl From<BulkScrapeJob> for JobResponse {
    fn from(job: BulkScrapeJob) -> Self {
        let kind = match job.kind {
            JobKind::Harvest => "harvest",
            JobKind::Enrich => "enrich",
        };
        Self {
            job_id: job.job_id,
            kind: kind.to_string(),
            status: job.status.as_str().to_string(),
            progress: job.progress,
            total: job.total,
            processed: job.processed,
            errors: job.errors,
            error_details: job.error_details.into_iter().collect(),
            created_at: job.created_at,
            started_at: job.started_at,
            completed_at: job.completed_at,
        }
    }
}

/// Occupancy of the enrichment gate.
#[derive(Debug, Serialize, ToSchema)]
pub struct QueueResponse {
    /// Enrichment operations holding a slot
    pub in_flight: usize,
    /// Enrichment operations waiting for a slot
    pub pending: usize,
    /// Jobs not yet completed or failed
    pub active_jobs: usize,
}

impl QueueResponse {
    pub fn new(depth: QueueDepth, active_jobs: usize) -> Self {
        Self {
            in_flight: depth.in_flight,
            pending: depth.pending,
            active_jobs,
        }
    }
}
