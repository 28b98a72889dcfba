//! Resumable progress records for search configurations.
//!
//! A checkpoint is keyed by a stable hash of (category form, keyword set,
//! justice kind). The date bounds are deliberately left out so a rerun with a
//! later `date_from` finds the same record (incremental mode).
//!
//! No locking is attempted: two processes harvesting the same configuration
//! race on the same row. Runs are expected to come from a single operator
//! process.

use std::collections::VecDeque;
use std::fmt;
use std::str::FromStr;
use std::sync::Mutex;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::config::SearchCategory;

// =============================================================================
// Checkpoint Status
// =============================================================================

/// Lifecycle of a checkpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckpointStatus {
    InProgress,
    Completed,
    Failed,
}

impl CheckpointStatus {
    /// Returns the string representation for database storage.
    pub fn as_str(&self) -> &'static str {
        match self {
            CheckpointStatus::InProgress => "in_progress",
            CheckpointStatus::Completed => "completed",
            CheckpointStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, CheckpointStatus::Completed | CheckpointStatus::Failed)
    }
}

/// Error type for parsing CheckpointStatus from string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseCheckpointStatusError(String);

impl fmt::Display for ParseCheckpointStatusError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid checkpoint status: {}", self.0)
    }
}

impl std::error::Error for ParseCheckpointStatusError {}

impl FromStr for CheckpointStatus {
    type Err = ParseCheckpointStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "in_progress" => Ok(CheckpointStatus::InProgress),
            "completed" => Ok(CheckpointStatus::Completed),
            "failed" => Ok(CheckpointStatus::Failed),
            _ => Err(ParseCheckpointStatusError(s.to_string())),
        }
    }
}

impl fmt::Display for CheckpointStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Checkpoint Key
// =============================================================================

/// Search configuration a checkpoint belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckpointConfig {
    pub category_form: Option<String>,
    pub keywords: Vec<String>,
    pub justice_kind: Option<String>,
    /// Sliding lower bound; not part of the hash.
    pub date_from: NaiveDate,
    /// Upper bound; not part of the hash.
    pub date_to: Option<NaiveDate>,
}

impl CheckpointConfig {
    pub fn for_category(
        category: &SearchCategory,
        justice_kind: Option<&str>,
        date_from: NaiveDate,
        date_to: Option<NaiveDate>,
    ) -> Self {
        Self {
            category_form: category.form.clone(),
            keywords: category.keywords.clone(),
            justice_kind: justice_kind.map(str::to_string),
            date_from,
            date_to,
        }
    }

    /// Keywords as a set: trimmed, blanks dropped, sorted, deduplicated.
    pub fn keyword_set(&self) -> Vec<String> {
        let mut keywords: Vec<String> = self
            .keywords
            .iter()
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())
            .collect();
        keywords.sort();
        keywords.dedup();
        keywords
    }

    /// Stable SHA-256 hex digest of form, keyword set and justice kind.
    pub fn config_hash(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(b"form:");
        hasher.update(self.category_form.as_deref().unwrap_or("").as_bytes());
        hasher.update(b"\x1fkeywords:");
        for keyword in self.keyword_set() {
            hasher.update(keyword.as_bytes());
            hasher.update(b"\x1e");
        }
        hasher.update(b"\x1fjustice:");
        hasher.update(self.justice_kind.as_deref().unwrap_or("").as_bytes());
        hex::encode(hasher.finalize())
    }
}

// =============================================================================
// Checkpoint Record
// =============================================================================

/// Durable progress record of one search configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScrapeCheckpoint {
    pub config_hash: String,
    pub category_form: Option<String>,
    pub keywords: Vec<String>,
    pub justice_kind: Option<String>,
    pub last_page: u32,
    pub documents_scraped: u64,
    pub documents_failed: u64,
    pub status: CheckpointStatus,
    pub last_error: Option<String>,
    /// Only set when the record reached a terminal status.
    pub last_scraped_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl ScrapeCheckpoint {
    /// Page to restart from when the previous run stopped mid-way.
    ///
    /// `last_page` is only written once its documents were flushed, so the
    /// next run starts right after it.
    pub fn resume_page(&self) -> Option<u32> {
        (self.status == CheckpointStatus::InProgress && self.last_page > 0)
            .then(|| self.last_page.saturating_add(1))
    }

    /// Lower date bound an incremental rerun may start from.
    pub fn incremental_from(&self) -> Option<NaiveDate> {
        match self.status {
            CheckpointStatus::Completed => self.last_scraped_at.map(|t| t.date_naive()),
            _ => None,
        }
    }
}

/// Values written by one checkpoint upsert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckpointUpdate {
    pub last_page: u32,
    pub documents_scraped: u64,
    pub documents_failed: u64,
    pub status: CheckpointStatus,
    pub error: Option<String>,
}

/// Running counters of one configuration during a run.
///
/// Shared by the window tasks of a category. A completed page is queued with
/// the batcher's push count at that moment and only becomes writable once the
/// batcher's settled watermark reaches it.
#[derive(Debug, Default)]
pub struct CheckpointProgress {
    inner: Mutex<CheckpointUpdateState>,
}

#[derive(Debug, Default)]
struct CheckpointUpdateState {
    last_page: u32,
    scraped: u64,
    failed: u64,
    /// Recorded pages waiting for their documents to be flushed.
    pending: VecDeque<(u64, CheckpointUpdate)>,
}

impl CheckpointProgress {
    /// Starts from zero, or from the counts of an unfinished checkpoint.
    pub fn resume_from(previous: Option<&ScrapeCheckpoint>) -> Self {
        let state = match previous {
            Some(cp) if cp.status == CheckpointStatus::InProgress => CheckpointUpdateState {
                last_page: cp.last_page,
                scraped: cp.documents_scraped,
                failed: cp.documents_failed,
                pending: VecDeque::new(),
            },
            _ => CheckpointUpdateState::default(),
        };
        Self {
            inner: Mutex::new(state),
        }
    }

    /// Records a finished page.
    ///
    /// `pushed_through` is the batcher's push count once the page's documents
    /// were handed over. The returned update is only safe to write after the
    /// watermark reaches that count; [`Self::settled`] hands it out then.
    pub fn record_page(
        &self,
        page: u32,
        new_documents: u64,
        failed: u64,
        pushed_through: u64,
    ) -> CheckpointUpdate {
        let mut state = self.lock();
        state.last_page = page;
        state.scraped += new_documents;
        state.failed += failed;
        let update = CheckpointUpdate {
            last_page: state.last_page,
            documents_scraped: state.scraped,
            documents_failed: state.failed,
            status: CheckpointStatus::InProgress,
            error: None,
        };
        // Pages recorded later never carry a smaller push count.
        let pushed_through = state
            .pending
            .back()
            .map_or(pushed_through, |(seq, _)| pushed_through.max(*seq));
        state.pending.push_back((pushed_through, update.clone()));
        update
    }

    /// Latest recorded update whose documents are all below `settled_through`.
    ///
    /// Earlier settled updates are superseded and dropped.
    pub fn settled(&self, settled_through: u64) -> Option<CheckpointUpdate> {
        let mut state = self.lock();
        let mut latest = None;
        while state
            .pending
            .front()
            .is_some_and(|(seq, _)| *seq <= settled_through)
        {
            latest = state.pending.pop_front().map(|(_, update)| update);
        }
        latest
    }

    /// Builds the final update for the run.
    ///
    /// Callers flush the batcher first; pending page updates are discarded.
    pub fn finish(&self, status: CheckpointStatus, error: Option<String>) -> CheckpointUpdate {
        let mut state = self.lock();
        state.pending.clear();
        CheckpointUpdate {
            last_page: state.last_page,
            documents_scraped: state.scraped,
            documents_failed: state.failed,
            status,
            error,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, CheckpointUpdateState> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}
