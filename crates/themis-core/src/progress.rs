//! Progress reporting for harvesting and enrichment.
//!
//! Services emit [`HarvestEvent`]s through a [`ProgressReporter`] instead of
//! logging directly, so the CLI, the server and tests can each decide what to
//! do with them.

use tracing::{info, warn};

use crate::models::DocumentIdentity;
use crate::plan::DateWindow;
use crate::stats::{BatchStats, CategoryStats, HarvestSummary};

/// Events emitted during a run.
#[derive(Debug, Clone)]
pub enum HarvestEvent<'a> {
    /// The plan was built.
    RunStarted {
        categories: usize,
        total_tasks: usize,
        dry_run: bool,
    },
    CategoryStarted {
        index: usize,
        name: &'a str,
        windows: usize,
    },
    /// An unfinished checkpoint was found for the category.
    ResumingCheckpoint {
        name: &'a str,
        last_page: u32,
        documents_scraped: u64,
    },
    /// Incremental mode moved the lower date bound.
    IncrementalFrom {
        name: &'a str,
        date_from: chrono::NaiveDate,
    },
    PageFetched {
        category: &'a str,
        keyword: &'a str,
        window: DateWindow,
        page: u32,
        fetched: usize,
        new: usize,
    },
    PageFailed {
        category: &'a str,
        keyword: &'a str,
        window: DateWindow,
        page: u32,
        error: &'a str,
    },
    BatchFlushed {
        size: usize,
        stats: &'a BatchStats,
    },
    BatchFailed {
        size: usize,
        error: &'a str,
    },
    CategoryCompleted {
        stats: &'a CategoryStats,
    },
    /// The global document cap was hit; no further pages are requested.
    CapReached { cap: usize },
    RunCompleted { summary: &'a HarvestSummary },
    RunCancelled { summary: &'a HarvestSummary },
    DocumentEnriched {
        doc_id: &'a DocumentIdentity,
        cached: bool,
        sections: usize,
        embeddings: usize,
    },
    DocumentFailed {
        doc_id: &'a DocumentIdentity,
        error: &'a str,
    },
}

/// Receiver of [`HarvestEvent`]s.
pub trait ProgressReporter: Send + Sync {
    /// Called when an event occurs.
    ///
    /// The default implementation does nothing (silent mode).
    fn report(&self, event: HarvestEvent<'_>) {
        let _ = event;
    }
}

/// Reporter that ignores all events.
#[derive(Debug, Default, Clone, Copy)]
pub struct SilentReporter;

impl ProgressReporter for SilentReporter {}

/// Reporter that logs events through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingReporter;

impl ProgressReporter for TracingReporter {
    fn report(&self, event: HarvestEvent<'_>) {
        match event {
            HarvestEvent::RunStarted {
                categories,
                total_tasks,
                dry_run,
            } => {
                info!(categories, total_tasks, dry_run, "Harvest started");
            }
            HarvestEvent::CategoryStarted {
                index,
                name,
                windows,
            } => {
                info!(index, category = name, windows, "Category started");
            }
            HarvestEvent::ResumingCheckpoint {
                name,
                last_page,
                documents_scraped,
            } => {
                info!(
                    category = name,
                    last_page, documents_scraped, "Resuming unfinished checkpoint"
                );
            }
            HarvestEvent::IncrementalFrom { name, date_from } => {
                info!(category = name, %date_from, "Incremental run from last completion");
            }
            HarvestEvent::PageFetched {
                category,
                keyword,
                window,
                page,
                fetched,
                new,
            } => {
                tracing::debug!(category, keyword, %window, page, fetched, new, "Page fetched");
            }
            HarvestEvent::PageFailed {
                category,
                keyword,
                window,
                page,
                error,
            } => {
                warn!(category, keyword, %window, page, error, "Page failed, skipping");
            }
            HarvestEvent::BatchFlushed { size, stats } => {
                info!(
                    size,
                    persisted = stats.persisted,
                    failed_batches = stats.failed_batches,
                    "Batch flushed"
                );
            }
            HarvestEvent::BatchFailed { size, error } => {
                warn!(size, error, "Batch write failed");
            }
            HarvestEvent::CategoryCompleted { stats } => {
                info!(
                    category = %stats.name,
                    fetched = stats.fetched,
                    new = stats.new_documents,
                    duplicates = stats.duplicates,
                    errors = stats.errors,
                    "Category completed"
                );
            }
            HarvestEvent::CapReached { cap } => {
                info!(cap, "Document cap reached, stopping discovery");
            }
            HarvestEvent::RunCompleted { summary } => {
                info!(
                    unique = summary.unique_documents,
                    persisted = summary.batches.persisted,
                    failed_batches = summary.batches.failed_batches,
                    delta = ?summary.store_delta(),
                    "Harvest completed"
                );
            }
            HarvestEvent::RunCancelled { summary } => {
                warn!(
                    unique = summary.unique_documents,
                    persisted = summary.batches.persisted,
                    "Harvest cancelled, partial progress saved"
                );
            }
            HarvestEvent::DocumentEnriched {
                doc_id,
                cached,
                sections,
                embeddings,
            } => {
                info!(%doc_id, cached, sections, embeddings, "Document enriched");
            }
            HarvestEvent::DocumentFailed { doc_id, error } => {
                warn!(%doc_id, error, "Document enrichment failed");
            }
        }
    }
}
