//! In-memory tracking of background harvesting and enrichment jobs.
//!
//! Jobs are process-lifetime only. A restart loses their visibility but not
//! the durable checkpoint progress.
//!
//! ```text
//! queued → running → completed
//!              ↓
//!           failed
//! ```

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Upper bound of the rolling error sample kept per job.
pub const MAX_ERROR_DETAILS: usize = 100;

/// Finished jobs a registry keeps before evicting the oldest.
pub const MAX_FINISHED_JOBS: usize = 200;

// =============================================================================
// Job Status
// =============================================================================

/// Status of a bulk job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    /// Created, plan not yet enumerated.
    Queued,
    /// Total is known and work is in progress.
    Running,
    Completed,
    Failed,
}

impl JobStatus {
    /// Returns the string representation used in API responses.
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    /// Returns true if the job is in a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

/// Error type for parsing JobStatus from string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseJobStatusError(String);

impl std::fmt::Display for ParseJobStatusError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "invalid job status: {}", self.0)
    }
}

impl std::error::Error for ParseJobStatusError {}

impl std::str::FromStr for JobStatus {
    type Err = ParseJobStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queued" => Ok(JobStatus::Queued),
            "running" => Ok(JobStatus::Running),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            _ => Err(ParseJobStatusError(s.to_string())),
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// What a job does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobKind {
    Harvest,
    Enrich,
}

// =============================================================================
// Job Snapshot
// =============================================================================

/// Observable state of one bulk job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BulkScrapeJob {
    pub job_id: Uuid,
    pub kind: JobKind,
    pub status: JobStatus,
    /// Percentage in `[0, 100]`.
    pub progress: f64,
    pub total: usize,
    pub processed: usize,
    pub errors: usize,
    /// Most recent error messages, oldest first.
    pub error_details: VecDeque<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl BulkScrapeJob {
    fn new(kind: JobKind) -> Self {
        Self {
            job_id: Uuid::new_v4(),
            kind,
            status: JobStatus::Queued,
            progress: 0.0,
            total: 0,
            processed: 0,
            errors: 0,
            error_details: VecDeque::new(),
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        }
    }

    fn recompute_progress(&mut self) {
        self.progress = if self.total == 0 {
            0.0
        } else {
            (self.processed.min(self.total) as f64 / self.total as f64) * 100.0
        };
    }
}

/// Shared handle mutated by the services and polled by observers.
#[derive(Debug, Clone)]
pub struct JobTracker {
    inner: Arc<Mutex<BulkScrapeJob>>,
    max_error_details: usize,
}

impl JobTracker {
    pub fn new(kind: JobKind) -> Self {
        Self {
            inner: Arc::new(Mutex::new(BulkScrapeJob::new(kind))),
            max_error_details: MAX_ERROR_DETAILS,
        }
    }

    pub fn with_max_error_details(mut self, max: usize) -> Self {
        self.max_error_details = max.max(1);
        self
    }

    pub fn id(&self) -> Uuid {
        self.lock().job_id
    }

    /// Enters `running` once the total amount of work is known.
    pub fn start(&self, total: usize) {
        let mut job = self.lock();
        job.total = total;
        job.status = JobStatus::Running;
        job.started_at = Some(Utc::now());
        job.recompute_progress();
    }

    /// Adds finished work and recomputes the percentage.
    pub fn record_processed(&self, processed: usize, errors: usize) {
        let mut job = self.lock();
        job.processed += processed;
        job.errors += errors;
        job.recompute_progress();
    }

    /// Appends to the rolling error sample, dropping the oldest past the cap.
    pub fn push_error(&self, message: impl Into<String>) {
        let mut job = self.lock();
        if job.error_details.len() >= self.max_error_details {
            job.error_details.pop_front();
        }
        job.error_details.push_back(message.into());
    }

    /// Marks the job done.
    ///
    /// Work skipped after a cap or an early stop counts as processed, so a
    /// completed job always reports 100%.
    pub fn complete(&self) {
        let mut job = self.lock();
        job.processed = job.processed.max(job.total);
        job.recompute_progress();
        job.status = JobStatus::Completed;
        job.completed_at = Some(Utc::now());
    }

    pub fn fail(&self, error: impl Into<String>) {
        let error = error.into();
        {
            let mut job = self.lock();
            job.status = JobStatus::Failed;
            job.completed_at = Some(Utc::now());
        }
        self.push_error(error);
    }

    pub fn snapshot(&self) -> BulkScrapeJob {
        self.lock().clone()
    }

    fn lock(&self) -> MutexGuard<'_, BulkScrapeJob> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

/// Process-wide index of jobs, keyed by id.
///
/// Active jobs are always kept. Past `max_finished` terminal jobs, the ones
/// that finished first are evicted when a new job is registered.
#[derive(Debug, Clone)]
pub struct JobRegistry {
    jobs: Arc<RwLock<HashMap<Uuid, JobTracker>>>,
    max_finished: usize,
}

impl Default for JobRegistry {
    fn default() -> Self {
        Self {
            jobs: Arc::default(),
            max_finished: MAX_FINISHED_JOBS,
        }
    }
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_finished(mut self, max: usize) -> Self {
        self.max_finished = max;
        self
    }

    /// Creates a queued job and registers it.
    pub fn create(&self, kind: JobKind) -> JobTracker {
        let mut jobs = self.write();
        Self::register(&mut jobs, kind, self.max_finished)
    }

    /// Creates a queued job unless another job of `kind` is still active.
    ///
    /// The check and the insert happen under one lock, so two concurrent
    /// callers cannot both succeed.
    pub fn create_exclusive(&self, kind: JobKind) -> Option<JobTracker> {
        let mut jobs = self.write();
        let busy = jobs.values().map(JobTracker::snapshot).any(|job| {
            job.kind == kind && !job.status.is_terminal()
        });
        (!busy).then(|| Self::register(&mut jobs, kind, self.max_finished))
    }

    fn register(
        jobs: &mut HashMap<Uuid, JobTracker>,
        kind: JobKind,
        max_finished: usize,
    ) -> JobTracker {
        Self::evict_finished(jobs, max_finished);
        let tracker = JobTracker::new(kind);
        jobs.insert(tracker.id(), tracker.clone());
        tracker
    }

    fn evict_finished(jobs: &mut HashMap<Uuid, JobTracker>, max_finished: usize) {
        let mut finished: Vec<(DateTime<Utc>, Uuid)> = jobs
            .values()
            .map(JobTracker::snapshot)
            .filter(|job| job.status.is_terminal())
            .map(|job| (job.completed_at.unwrap_or(job.created_at), job.job_id))
            .collect();
        if finished.len() <= max_finished {
            return;
        }
        finished.sort();
        let excess = finished.len() - max_finished;
        for (_, id) in finished.into_iter().take(excess) {
            jobs.remove(&id);
        }
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<Uuid, JobTracker>> {
        match self.jobs.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub fn get(&self, id: Uuid) -> Option<BulkScrapeJob> {
        let jobs = match self.jobs.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        jobs.get(&id).map(JobTracker::snapshot)
    }

    /// Snapshots of every job, newest first.
    pub fn list(&self) -> Vec<BulkScrapeJob> {
        let jobs = match self.jobs.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let mut snapshots: Vec<_> = jobs.values().map(JobTracker::snapshot).collect();
        snapshots.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        snapshots
    }

    /// Number of jobs not yet in a terminal state.
    pub fn active_count(&self) -> usize {
        self.list()
            .iter()
            .filter(|job| !job.status.is_terminal())
            .count()
    }
}
