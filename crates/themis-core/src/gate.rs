//! Bounded concurrency for enrichment operations.
//!
//! A [`ConcurrencyGate`] admits at most N operations at a time and reports how
//! many are running and how many are waiting for a slot. Waiting is FIFO
//! (tokio semaphores are fair).

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use serde::Serialize;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::AppError;

/// Snapshot of the gate's occupancy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct QueueDepth {
    pub in_flight: usize,
    pub pending: usize,
}

#[derive(Debug, Clone)]
pub struct ConcurrencyGate {
    semaphore: Arc<Semaphore>,
    max: usize,
    in_flight: Arc<AtomicUsize>,
    pending: Arc<AtomicUsize>,
}

impl ConcurrencyGate {
    pub fn new(max: usize) -> Self {
        let max = max.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(max)),
            max,
            in_flight: Arc::new(AtomicUsize::new(0)),
            pending: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn max(&self) -> usize {
        self.max
    }

    /// Waits for a free slot.
    ///
    /// Dropping the returned future before it resolves leaves the counters
    /// untouched.
    pub async fn acquire(&self) -> Result<GatePermit, AppError> {
        let waiting = PendingGuard::enter(self.pending.clone());
        let permit = self
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| AppError::Generic("concurrency gate closed".to_string()))?;
        drop(waiting);

        self.in_flight.fetch_add(1, Ordering::SeqCst);
        Ok(GatePermit {
            _permit: permit,
            in_flight: self.in_flight.clone(),
        })
    }

    pub fn queue_depth(&self) -> QueueDepth {
        QueueDepth {
            in_flight: self.in_flight.load(Ordering::SeqCst),
            pending: self.pending.load(Ordering::SeqCst),
        }
    }
}

/// Held for the duration of one operation; frees the slot on drop.
#[derive(Debug)]
pub struct GatePermit {
    _permit: OwnedSemaphorePermit,
    in_flight: Arc<AtomicUsize>,
}

impl Drop for GatePermit {
    fn drop(&mut self) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

struct PendingGuard(Arc<AtomicUsize>);

impl PendingGuard {
    fn enter(counter: Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for PendingGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}
