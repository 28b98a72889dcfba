//! Harvest service: windowed search, deduplication and incremental persistence.
//!
//! # Architecture
//!
//! The [`HarvestService`] is generic over four traits:
//! - [`SearchClient`] - the paginated upstream search API
//! - [`DocumentStore`] - persistence of discovered documents
//! - [`CheckpointStore`] - durable per-configuration progress
//! - [`RemoteIngest`] - optional per-document remote persistence
//!
//! # Flow
//!
//! ```text
//! CrawlPlan ─► (keyword × window) tasks, window_concurrency at a time
//!                 │ pages 1.. in sequence
//!                 ▼
//!             DedupSet ─► PersistenceBatcher ─► store / remote endpoint
//!                 │
//!                 └─► checkpoint upsert once a page's documents are flushed
//! ```
//!
//! A page's checkpoint update waits until the batcher's settled watermark
//! covers every document pushed before it, so a crash never leaves a
//! checkpoint ahead of the store. Each category flushes the batcher before
//! its final upsert.
//!
//! A failed page is counted, followed by a backoff, and the task moves on to
//! the next page. Batch write failures are counted and do not stop the run.
//! Only configuration errors abort a run before work starts.
//!
//! # Cancellation
//!
//! [`HarvestService::harvest_cancellable`] checks the token before every page
//! and every window batch and races it against every delay. On cancellation
//! the buffered documents are still flushed, checkpoints stay `in_progress`
//! for the next run to resume, and the summary is marked cancelled.

use std::sync::atomic::{AtomicBool, Ordering};

use chrono::NaiveDate;
use futures::future::join_all;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::batcher::{BatcherSettings, PersistenceBatcher};
use crate::checkpoint::{CheckpointConfig, CheckpointProgress, CheckpointStatus, ScrapeCheckpoint};
use crate::config::{HarvestConfig, SearchCategory};
use crate::dedup::{Admission, DedupSet};
use crate::job::JobTracker;
use crate::plan::{CategoryPlan, CrawlPlan, CrawlTask};
use crate::progress::{HarvestEvent, ProgressReporter, SilentReporter};
use crate::stats::{AtomicCategoryStats, CategoryStats, HarvestSummary, PageOutcome};
use crate::traits::{CheckpointStore, DocumentStore, RemoteIngest, SearchClient, SearchQuery};
use crate::AppError;

/// Service orchestrating one harvesting run over a category taxonomy.
pub struct HarvestService<Q, S, C, R>
where
    Q: SearchClient,
    S: DocumentStore,
    C: CheckpointStore,
    R: RemoteIngest,
{
    search: Q,
    store: S,
    checkpoints: C,
    remote: Option<R>,
    config: HarvestConfig,
}

impl<Q, S, C, R> Clone for HarvestService<Q, S, C, R>
where
    Q: SearchClient,
    S: DocumentStore,
    C: CheckpointStore,
    R: RemoteIngest,
{
    fn clone(&self) -> Self {
        Self {
            search: self.search.clone(),
            store: self.store.clone(),
            checkpoints: self.checkpoints.clone(),
            remote: self.remote.clone(),
            config: self.config.clone(),
        }
    }
}

/// Run-wide state shared by every window task.
struct RunContext<'r, S, R, P>
where
    S: DocumentStore,
    R: RemoteIngest,
    P: ProgressReporter,
{
    dedup: DedupSet,
    batcher: PersistenceBatcher<'r, S, R>,
    reporter: &'r P,
    tracker: Option<&'r JobTracker>,
    cancel: &'r CancellationToken,
    cap_hit: AtomicBool,
}

/// Per-category state shared by the category's window tasks.
struct CategoryRun<'a> {
    plan: CategoryPlan<'a>,
    checkpoint: CheckpointConfig,
    progress: CheckpointProgress,
    /// Page the single stream of a resumed category restarts at.
    resume_page: Option<u32>,
    stats: AtomicCategoryStats,
    /// Serializes upserts so an older update never lands after a newer one.
    checkpoint_writes: tokio::sync::Mutex<()>,
}

impl<Q, S, C, R> HarvestService<Q, S, C, R>
where
    Q: SearchClient,
    S: DocumentStore,
    C: CheckpointStore,
    R: RemoteIngest,
{
    /// Creates a new harvest service.
    ///
    /// `remote` is only used with [`crate::PersistenceMode::Remote`].
    pub fn new(search: Q, store: S, checkpoints: C, remote: Option<R>, config: HarvestConfig) -> Self {
        Self {
            search,
            store,
            checkpoints,
            remote,
            config,
        }
    }

    pub fn config(&self) -> &HarvestConfig {
        &self.config
    }

    /// Same collaborators, different run settings.
    pub fn with_config(&self, config: HarvestConfig) -> Self {
        Self {
            config,
            ..self.clone()
        }
    }

    /// Runs the harvest without progress reporting or cancellation.
    pub async fn harvest(&self, categories: &[SearchCategory]) -> Result<HarvestSummary, AppError> {
        self.harvest_cancellable(categories, &SilentReporter, None, CancellationToken::new())
            .await
    }

    /// Runs the harvest, reporting progress and honoring `cancel`.
    ///
    /// When `tracker` is given it enters `running` once the plan is known,
    /// advances after every window batch and is finalized at the end.
    pub async fn harvest_cancellable<P: ProgressReporter>(
        &self,
        categories: &[SearchCategory],
        reporter: &P,
        tracker: Option<&JobTracker>,
        cancel: CancellationToken,
    ) -> Result<HarvestSummary, AppError> {
        let result = self.run(categories, reporter, tracker, &cancel).await;

        if let (Err(e), Some(tracker)) = (&result, tracker) {
            tracker.fail(e.to_string());
        }
        result
    }

    async fn run<P: ProgressReporter>(
        &self,
        categories: &[SearchCategory],
        reporter: &P,
        tracker: Option<&JobTracker>,
        cancel: &CancellationToken,
    ) -> Result<HarvestSummary, AppError> {
        self.config.validate()?;
        let date_to = self.config.effective_date_to();

        let plan = CrawlPlan::build(
            categories,
            &self.config.skip_categories,
            self.config.only_categories.as_deref(),
            self.config.date_from,
            date_to,
            self.config.window_days,
        )?;
        if plan.is_empty() {
            return Err(AppError::ConfigError(
                "crawl plan is empty: no enabled category with keywords was selected".to_string(),
            ));
        }

        let settings = BatcherSettings::from(&self.config);
        let batcher = PersistenceBatcher::new(&self.store, self.remote.as_ref(), settings)?;

        let mut runs = Vec::with_capacity(plan.categories.len());
        for category_plan in plan.categories {
            runs.push(self.prepare_category(category_plan, date_to, reporter).await?);
        }

        let total_tasks: usize = runs.iter().map(|r| r.plan.task_count()).sum();
        if let Some(tracker) = tracker {
            tracker.start(total_tasks);
        }
        reporter.report(HarvestEvent::RunStarted {
            categories: runs.len(),
            total_tasks,
            dry_run: self.config.dry_run,
        });

        let before_total = self.count_documents().await;

        let ctx = RunContext {
            dedup: DedupSet::new(self.config.max_documents),
            batcher,
            reporter,
            tracker,
            cancel,
            cap_hit: AtomicBool::new(false),
        };

        let mut summary = HarvestSummary {
            dry_run: self.config.dry_run,
            before_total,
            ..Default::default()
        };

        for run in &runs {
            if cancel.is_cancelled() || ctx.dedup.is_full() {
                break;
            }
            let stats = self.harvest_category(run, &ctx).await;
            summary.categories.push(stats);
        }

        summary.cancelled = cancel.is_cancelled();
        summary.cap_reached = ctx.cap_hit.load(Ordering::SeqCst) || ctx.dedup.is_full();
        summary.batches = ctx.batcher.finish(reporter, cancel).await;
        summary.unique_documents = ctx.dedup.len();
        summary.after_total = self.count_documents().await;

        if summary.cancelled {
            reporter.report(HarvestEvent::RunCancelled { summary: &summary });
            if let Some(tracker) = tracker {
                tracker.fail(AppError::Cancelled.to_string());
            }
        } else {
            reporter.report(HarvestEvent::RunCompleted { summary: &summary });
            if let Some(tracker) = tracker {
                tracker.complete();
            }
        }

        Ok(summary)
    }

    /// Looks up the category's checkpoint and applies resume/incremental rules.
    async fn prepare_category<'a, P: ProgressReporter>(
        &self,
        mut plan: CategoryPlan<'a>,
        date_to: NaiveDate,
        reporter: &P,
    ) -> Result<CategoryRun<'a>, AppError> {
        let checkpoint = CheckpointConfig::for_category(
            plan.category,
            self.config.justice_kind.as_deref(),
            self.config.date_from,
            Some(date_to),
        );

        let previous: Option<ScrapeCheckpoint> =
            match self.checkpoints.get_checkpoint(&checkpoint).await {
                Ok(previous) => previous,
                Err(e) => {
                    warn!(category = %plan.category.name, error = %e, "Checkpoint lookup failed, starting fresh");
                    None
                }
            };

        let incremental_from = previous
            .as_ref()
            .and_then(ScrapeCheckpoint::incremental_from)
            .filter(|from| self.config.incremental && *from > self.config.date_from);
        if let Some(from) = incremental_from {
            plan.restrict_from(from, date_to, self.config.window_days)?;
            reporter.report(HarvestEvent::IncrementalFrom {
                name: &plan.category.name,
                date_from: from,
            });
        }

        let resume_page = previous.as_ref().and_then(ScrapeCheckpoint::resume_page);
        if let (Some(_), Some(cp)) = (resume_page, previous.as_ref()) {
            reporter.report(HarvestEvent::ResumingCheckpoint {
                name: &plan.category.name,
                last_page: cp.last_page,
                documents_scraped: cp.documents_scraped,
            });
        }

        // Page numbers only identify a position when the category is a single
        // (keyword, window) stream.
        let resume_page = resume_page.filter(|_| plan.task_count() == 1);

        Ok(CategoryRun {
            progress: CheckpointProgress::resume_from(previous.as_ref()),
            checkpoint,
            plan,
            resume_page,
            stats: AtomicCategoryStats::new(),
            checkpoint_writes: tokio::sync::Mutex::new(()),
        })
    }

    async fn harvest_category<P: ProgressReporter>(
        &self,
        run: &CategoryRun<'_>,
        ctx: &RunContext<'_, S, R, P>,
    ) -> CategoryStats {
        let name = run.plan.category.name.as_str();
        ctx.reporter.report(HarvestEvent::CategoryStarted {
            index: run.plan.index,
            name,
            windows: run.plan.windows.len(),
        });

        let tasks = run.plan.tasks();
        let start_page = run.resume_page.unwrap_or(1);

        for batch in tasks.chunks(self.config.window_concurrency) {
            if ctx.cancel.is_cancelled() || ctx.dedup.is_full() {
                break;
            }

            let futures = batch
                .iter()
                .map(|task| self.search_task(task, start_page, run, ctx));
            let failed_pages: usize = join_all(futures).await.into_iter().sum();

            if let Some(tracker) = ctx.tracker {
                tracker.record_processed(batch.len(), failed_pages);
            }
        }

        ctx.batcher.flush(ctx.reporter, ctx.cancel).await;

        let stats = run.stats.to_stats(name);
        let capped = ctx.cap_hit.load(Ordering::SeqCst);

        // Cancelled or capped categories stay in_progress so the next run resumes them.
        if ctx.cancel.is_cancelled() || capped {
            self.write_settled(run, ctx).await;
        } else if !self.config.dry_run {
            let (status, error) = if stats.pages == 0 && stats.errors > 0 {
                (
                    CheckpointStatus::Failed,
                    Some(format!("all {} page requests failed", stats.errors)),
                )
            } else {
                (CheckpointStatus::Completed, None)
            };
            let update = run.progress.finish(status, error);
            let _guard = run.checkpoint_writes.lock().await;
            if let Err(e) = self.checkpoints.upsert_checkpoint(&run.checkpoint, &update).await {
                warn!(category = name, error = %e, "Failed to finalize checkpoint");
            }
        }

        ctx.reporter
            .report(HarvestEvent::CategoryCompleted { stats: &stats });
        stats
    }

    /// Pages through one (keyword, window) pair and returns the failed page count.
    async fn search_task<P: ProgressReporter>(
        &self,
        task: &CrawlTask<'_>,
        start_page: u32,
        run: &CategoryRun<'_>,
        ctx: &RunContext<'_, S, R, P>,
    ) -> usize {
        let category = task.category;
        let max_pages = u32::try_from(self.config.max_pages).unwrap_or(u32::MAX);
        let mut page = start_page.max(1);
        let mut failed_pages = 0;

        while page <= max_pages {
            if ctx.cancel.is_cancelled() {
                break;
            }
            if ctx.dedup.is_full() {
                self.mark_cap(ctx);
                break;
            }

            let query = SearchQuery {
                category: category.name.clone(),
                keyword: task.keyword.to_string(),
                date_from: task.window.start,
                date_to: task.window.end,
                jurisdictions: category.form.iter().cloned().collect(),
                justice_kind: self.config.justice_kind.clone(),
                page,
                page_size: self.config.page_size,
                order_by: self.config.order_by.clone(),
            };

            let result = tokio::select! {
                _ = ctx.cancel.cancelled() => break,
                result = self.search.search(&query) => result,
            };

            match result {
                Ok(results) => {
                    let fetched = results.items.len();
                    let mut new = 0;

                    for mut item in results.items {
                        if item.identity.is_empty() {
                            continue;
                        }
                        match ctx.dedup.admit(&item.identity) {
                            Admission::Inserted => {
                                new += 1;
                                if item.category.is_empty() {
                                    item.category = category.name.clone();
                                }
                                ctx.batcher.push(item, ctx.reporter, ctx.cancel).await;
                            }
                            Admission::Duplicate => {}
                            Admission::CapReached => {
                                self.mark_cap(ctx);
                                break;
                            }
                        }
                    }

                    run.stats.record(PageOutcome::Fetched { fetched, new });
                    ctx.reporter.report(HarvestEvent::PageFetched {
                        category: &category.name,
                        keyword: task.keyword,
                        window: task.window,
                        page,
                        fetched,
                        new,
                    });
                    self.save_progress(run, ctx, page, new as u64, 0).await;

                    if ctx.dedup.is_full() {
                        self.mark_cap(ctx);
                        break;
                    }
                    if fetched < self.config.page_size || !results.has_more {
                        break;
                    }

                    if !self.pause(self.config.page_delay, ctx.cancel).await {
                        break;
                    }
                }
                Err(e) => {
                    let error = e.to_string();
                    failed_pages += 1;
                    run.stats.record(PageOutcome::Failed);
                    ctx.reporter.report(HarvestEvent::PageFailed {
                        category: &category.name,
                        keyword: task.keyword,
                        window: task.window,
                        page,
                        error: &error,
                    });
                    if let Some(tracker) = ctx.tracker {
                        tracker.push_error(format!(
                            "{} / '{}' {} page {}: {}",
                            category.name, task.keyword, task.window, page, error
                        ));
                    }
                    self.save_progress(run, ctx, page, 0, 1).await;

                    if !self.pause(self.config.error_backoff, ctx.cancel).await {
                        break;
                    }
                }
            }

            page += 1;
        }

        failed_pages
    }

    async fn save_progress<P: ProgressReporter>(
        &self,
        run: &CategoryRun<'_>,
        ctx: &RunContext<'_, S, R, P>,
        page: u32,
        new: u64,
        failed: u64,
    ) {
        run.progress.record_page(page, new, failed, ctx.batcher.pushed());
        self.write_settled(run, ctx).await;
    }

    /// Upserts the newest page update whose documents have all been flushed.
    async fn write_settled<P: ProgressReporter>(
        &self,
        run: &CategoryRun<'_>,
        ctx: &RunContext<'_, S, R, P>,
    ) {
        let _guard = run.checkpoint_writes.lock().await;
        let Some(update) = run.progress.settled(ctx.batcher.settled_through()) else {
            return;
        };
        if self.config.dry_run {
            return;
        }
        if let Err(e) = self.checkpoints.upsert_checkpoint(&run.checkpoint, &update).await {
            warn!(
                category = %run.plan.category.name,
                page = update.last_page,
                error = %e,
                "Failed to save checkpoint"
            );
        }
    }

    fn mark_cap<P: ProgressReporter>(&self, ctx: &RunContext<'_, S, R, P>) {
        if !ctx.cap_hit.swap(true, Ordering::SeqCst) {
            ctx.reporter.report(HarvestEvent::CapReached {
                cap: ctx.dedup.cap(),
            });
        }
    }

    /// Sleeps unless cancelled first. Returns false on cancellation.
    async fn pause(&self, delay: std::time::Duration, cancel: &CancellationToken) -> bool {
        if delay.is_zero() {
            return !cancel.is_cancelled();
        }
        tokio::select! {
            _ = cancel.cancelled() => false,
            _ = tokio::time::sleep(delay) => true,
        }
    }

    async fn count_documents(&self) -> Option<i64> {
        if self.config.dry_run {
            return None;
        }
        match self.store.count_documents().await {
            Ok(count) => Some(count),
            Err(e) => {
                warn!(error = %e, "Could not count stored documents");
                None
            }
        }
    }
}
