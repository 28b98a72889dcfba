//! Run statistics for harvesting.
//!
//! Counters shared between concurrent window tasks are atomics; the plain
//! structs are snapshots handed to reporters and callers.

use std::sync::atomic::{AtomicUsize, Ordering};

use serde::Serialize;

/// Outcome of one page of search results.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageOutcome {
    /// Page fetched; `new` of its `fetched` items were first sightings.
    Fetched { fetched: usize, new: usize },
    /// The page request failed and was skipped.
    Failed,
}

/// Per-category counters updated by concurrent window tasks.
#[derive(Debug, Default)]
pub struct AtomicCategoryStats {
    fetched: AtomicUsize,
    new_documents: AtomicUsize,
    duplicates: AtomicUsize,
    errors: AtomicUsize,
    pages: AtomicUsize,
}

impl AtomicCategoryStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, outcome: PageOutcome) {
        match outcome {
            PageOutcome::Fetched { fetched, new } => {
                self.pages.fetch_add(1, Ordering::Relaxed);
                self.fetched.fetch_add(fetched, Ordering::Relaxed);
                self.new_documents.fetch_add(new, Ordering::Relaxed);
                self.duplicates
                    .fetch_add(fetched.saturating_sub(new), Ordering::Relaxed);
            }
            PageOutcome::Failed => {
                self.errors.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    pub fn errors(&self) -> usize {
        self.errors.load(Ordering::Relaxed)
    }

    pub fn to_stats(&self, name: &str) -> CategoryStats {
        CategoryStats {
            name: name.to_string(),
            fetched: self.fetched.load(Ordering::Relaxed),
            new_documents: self.new_documents.load(Ordering::Relaxed),
            duplicates: self.duplicates.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
            pages: self.pages.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of one category's counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CategoryStats {
    pub name: String,
    /// Items returned by the search API, duplicates included.
    pub fetched: usize,
    /// Items admitted to the run-wide dedup set.
    pub new_documents: usize,
    pub duplicates: usize,
    /// Failed page requests.
    pub errors: usize,
    pub pages: usize,
}

/// Counters of the persistence batcher.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BatchStats {
    pub batches_flushed: usize,
    pub failed_batches: usize,
    pub persisted: usize,
    /// Documents lost to failed batches or failed remote calls.
    pub failed_documents: usize,
    /// Remote calls that were throttled at least once.
    pub throttled: usize,
}

/// Final report of a harvesting run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct HarvestSummary {
    pub categories: Vec<CategoryStats>,
    /// Size of the run-wide dedup set at the end of the run.
    pub unique_documents: usize,
    pub batches: BatchStats,
    /// Store size before the run; absent on dry runs or when counting failed.
    pub before_total: Option<i64>,
    pub after_total: Option<i64>,
    pub dry_run: bool,
    pub cap_reached: bool,
    pub cancelled: bool,
}

impl HarvestSummary {
    pub fn total_fetched(&self) -> usize {
        self.categories.iter().map(|c| c.fetched).sum()
    }

    pub fn total_errors(&self) -> usize {
        self.categories.iter().map(|c| c.errors).sum()
    }

    /// Net growth of the store over the run.
    pub fn store_delta(&self) -> Option<i64> {
        match (self.before_total, self.after_total) {
            (Some(before), Some(after)) => Some(after - before),
            _ => None,
        }
    }
}
