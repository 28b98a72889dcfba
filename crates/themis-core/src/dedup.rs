//! Run-wide deduplication of document identities.
//!
//! One [`DedupSet`] is created per run and cloned into every window task.
//! Its size is the authoritative "unique documents discovered" counter and
//! the signal for the global document cap.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use crate::models::DocumentIdentity;

/// Result of offering an identity to the set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// First sighting; the caller owns forwarding it downstream.
    Inserted,
    /// Already discovered earlier in this run.
    Duplicate,
    /// Not present, but the cap is reached so it was not admitted.
    CapReached,
}

/// Shared, capped set of identities with atomic test-and-insert.
#[derive(Debug, Clone)]
pub struct DedupSet {
    seen: Arc<Mutex<HashSet<DocumentIdentity>>>,
    cap: usize,
}

impl DedupSet {
    pub fn new(cap: usize) -> Self {
        Self {
            seen: Arc::new(Mutex::new(HashSet::new())),
            cap,
        }
    }

    /// Tests and inserts under one lock acquisition.
    pub fn admit(&self, identity: &DocumentIdentity) -> Admission {
        let mut seen = match self.seen.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if seen.contains(identity) {
            Admission::Duplicate
        } else if seen.len() >= self.cap {
            Admission::CapReached
        } else {
            seen.insert(identity.clone());
            Admission::Inserted
        }
    }

    pub fn len(&self) -> usize {
        self.seen.lock().map(|s| s.len()).unwrap_or_else(|p| p.into_inner().len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn cap(&self) -> usize {
        self.cap
    }

    /// True once the set holds `cap` identities.
    pub fn is_full(&self) -> bool {
        self.len() >= self.cap
    }
}
