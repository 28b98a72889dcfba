//! Incremental persistence of newly discovered documents.
//!
//! Window tasks push documents as they are admitted by the dedup set. Once the
//! buffer reaches `batch_size` it is taken out under the lock and written
//! outside it, so concurrent pushers never wait on a write. A failed write is
//! counted and dropped; the run continues with the next batch.
//!
//! Every pushed document gets a sequence number. [`PersistenceBatcher::settled_through`]
//! is the length of the longest prefix of that sequence whose batches have all
//! been written (or reported as failed). Checkpoints must not move past a page
//! until the watermark covers every document pushed before the page was recorded.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::{HarvestConfig, PersistenceMode};
use crate::models::HarvestedDocument;
use crate::progress::{HarvestEvent, ProgressReporter};
use crate::stats::BatchStats;
use crate::traits::{DocumentStore, RemoteIngest};
use crate::AppError;

/// Settings the batcher takes from the run configuration.
#[derive(Debug, Clone)]
pub struct BatcherSettings {
    pub mode: PersistenceMode,
    pub batch_size: usize,
    pub dry_run: bool,
    pub batch_pause: Duration,
    pub throttle_wait: Duration,
    pub max_throttle_wait: Duration,
}

impl From<&HarvestConfig> for BatcherSettings {
    fn from(config: &HarvestConfig) -> Self {
        Self {
            mode: config.persistence,
            batch_size: config.batch_size.max(1),
            dry_run: config.dry_run,
            batch_pause: config.batch_pause,
            throttle_wait: config.throttle_wait,
            max_throttle_wait: config.max_throttle_wait,
        }
    }
}

#[derive(Debug, Default)]
struct AtomicBatchStats {
    batches_flushed: AtomicUsize,
    failed_batches: AtomicUsize,
    persisted: AtomicUsize,
    failed_documents: AtomicUsize,
    throttled: AtomicUsize,
}

impl AtomicBatchStats {
    fn to_stats(&self) -> BatchStats {
        BatchStats {
            batches_flushed: self.batches_flushed.load(Ordering::Relaxed),
            failed_batches: self.failed_batches.load(Ordering::Relaxed),
            persisted: self.persisted.load(Ordering::Relaxed),
            failed_documents: self.failed_documents.load(Ordering::Relaxed),
            throttled: self.throttled.load(Ordering::Relaxed),
        }
    }
}

/// Documents waiting for the next flush.
#[derive(Debug, Default)]
struct PendingBuffer {
    documents: Vec<HarvestedDocument>,
    /// Sequence number of `documents[0]`.
    first_seq: u64,
}

/// Settled prefix of the push sequence.
#[derive(Debug, Default)]
struct Watermark {
    through: u64,
    /// Settled ranges beyond `through`, start to end.
    ahead: BTreeMap<u64, u64>,
}

impl Watermark {
    fn settle(&mut self, start: u64, end: u64) {
        self.ahead.insert(start, end);
        while let Some(end) = self.ahead.remove(&self.through) {
            self.through = end;
        }
    }
}

pub struct PersistenceBatcher<'a, S, R>
where
    S: DocumentStore,
    R: RemoteIngest,
{
    store: &'a S,
    remote: Option<&'a R>,
    settings: BatcherSettings,
    buffer: Mutex<PendingBuffer>,
    pushed: AtomicU64,
    watermark: Mutex<Watermark>,
    stats: AtomicBatchStats,
}

impl<'a, S, R> PersistenceBatcher<'a, S, R>
where
    S: DocumentStore,
    R: RemoteIngest,
{
    /// Fails when remote mode is selected without a remote endpoint.
    pub fn new(
        store: &'a S,
        remote: Option<&'a R>,
        settings: BatcherSettings,
    ) -> Result<Self, AppError> {
        if settings.mode == PersistenceMode::Remote && remote.is_none() && !settings.dry_run {
            return Err(AppError::ConfigError(
                "remote persistence selected but no remote ingest endpoint is configured"
                    .to_string(),
            ));
        }
        Ok(Self {
            store,
            remote,
            buffer: Mutex::new(PendingBuffer {
                documents: Vec::with_capacity(settings.batch_size),
                first_seq: 0,
            }),
            settings,
            pushed: AtomicU64::new(0),
            watermark: Mutex::new(Watermark::default()),
            stats: AtomicBatchStats::default(),
        })
    }

    /// Buffers one document, flushing when the batch is full.
    pub async fn push<P: ProgressReporter>(
        &self,
        document: HarvestedDocument,
        reporter: &P,
        cancel: &CancellationToken,
    ) {
        let full = {
            let mut buffer = self.lock_buffer();
            buffer.documents.push(document);
            self.pushed.fetch_add(1, Ordering::SeqCst);
            if buffer.documents.len() >= self.settings.batch_size {
                Some(Self::take(&mut buffer))
            } else {
                None
            }
        };

        if let Some((first_seq, batch)) = full {
            self.flush_batch(first_seq, batch, reporter, cancel).await;
        }
    }

    /// Writes the partially filled buffer, if any.
    ///
    /// Runs even after cancellation so buffered documents are not lost.
    pub async fn flush<P: ProgressReporter>(&self, reporter: &P, cancel: &CancellationToken) {
        let remaining = {
            let mut buffer = self.lock_buffer();
            (!buffer.documents.is_empty()).then(|| Self::take(&mut buffer))
        };
        if let Some((first_seq, batch)) = remaining {
            self.flush_batch(first_seq, batch, reporter, cancel).await;
        }
    }

    /// Flushes whatever remains and returns the final counters.
    pub async fn finish<P: ProgressReporter>(
        &self,
        reporter: &P,
        cancel: &CancellationToken,
    ) -> BatchStats {
        self.flush(reporter, cancel).await;
        self.stats.to_stats()
    }

    /// Number of documents pushed so far.
    pub fn pushed(&self) -> u64 {
        self.pushed.load(Ordering::SeqCst)
    }

    /// Every document with a sequence number below this has been flushed.
    pub fn settled_through(&self) -> u64 {
        self.lock_watermark().through
    }

    pub fn stats(&self) -> BatchStats {
        self.stats.to_stats()
    }

    pub fn buffered(&self) -> usize {
        self.lock_buffer().documents.len()
    }

    fn take(buffer: &mut PendingBuffer) -> (u64, Vec<HarvestedDocument>) {
        let first_seq = buffer.first_seq;
        let batch = std::mem::take(&mut buffer.documents);
        buffer.first_seq += batch.len() as u64;
        (first_seq, batch)
    }

    async fn flush_batch<P: ProgressReporter>(
        &self,
        first_seq: u64,
        batch: Vec<HarvestedDocument>,
        reporter: &P,
        cancel: &CancellationToken,
    ) {
        let size = batch.len();
        let end_seq = first_seq + size as u64;

        if self.settings.dry_run {
            debug!(size, "Dry run, batch not persisted");
            self.lock_watermark().settle(first_seq, end_seq);
            return;
        }

        match self.settings.mode {
            PersistenceMode::Direct => match self.store.save_documents(&batch).await {
                Ok(_) => {
                    self.stats.persisted.fetch_add(size, Ordering::Relaxed);
                }
                Err(e) => {
                    self.stats.failed_batches.fetch_add(1, Ordering::Relaxed);
                    self.stats
                        .failed_documents
                        .fetch_add(size, Ordering::Relaxed);
                    let error = e.to_string();
                    reporter.report(HarvestEvent::BatchFailed {
                        size,
                        error: &error,
                    });
                }
            },
            PersistenceMode::Remote => {
                if let Some(remote) = self.remote {
                    for document in &batch {
                        self.ingest_one(remote, document, cancel).await;
                    }
                }
            }
        }

        self.lock_watermark().settle(first_seq, end_seq);
        self.stats.batches_flushed.fetch_add(1, Ordering::Relaxed);
        let stats = self.stats.to_stats();
        reporter.report(HarvestEvent::BatchFlushed {
            size,
            stats: &stats,
        });

        if !self.settings.batch_pause.is_zero() {
            tokio::select! {
                _ = cancel.cancelled() => {}
                _ = tokio::time::sleep(self.settings.batch_pause) => {}
            }
        }
    }

    async fn ingest_one(&self, remote: &R, document: &HarvestedDocument, cancel: &CancellationToken) {
        let result = match remote.ingest(document).await {
            Err(AppError::RateLimitExceeded { retry_after }) => {
                self.stats.throttled.fetch_add(1, Ordering::Relaxed);
                let wait = retry_after
                    .unwrap_or(self.settings.throttle_wait)
                    .min(self.settings.max_throttle_wait);
                debug!(doc_id = %document.identity, wait_ms = wait.as_millis() as u64, "Throttled, retrying once");

                let cancelled = tokio::select! {
                    _ = cancel.cancelled() => true,
                    _ = tokio::time::sleep(wait) => false,
                };
                if cancelled {
                    Err(AppError::Cancelled)
                } else {
                    remote.ingest(document).await
                }
            }
            other => other,
        };

        match result {
            Ok(()) => {
                self.stats.persisted.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => {
                self.stats.failed_documents.fetch_add(1, Ordering::Relaxed);
                warn!(doc_id = %document.identity, error = %e, "Remote ingest failed, skipping document");
            }
        }
    }

    fn lock_buffer(&self) -> std::sync::MutexGuard<'_, PendingBuffer> {
        match self.buffer.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn lock_watermark(&self) -> std::sync::MutexGuard<'_, Watermark> {
        match self.watermark.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}
