//! Minimum spacing between outbound fetches.

use std::sync::Arc;
use std::time::Duration;

use governor::{Quota, RateLimiter};

type DirectRateLimiter = RateLimiter<
    governor::state::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

/// Spaces acquisitions at least `interval` apart, process-wide for its clones.
///
/// A zero interval disables limiting.
#[derive(Clone)]
pub struct IntervalLimiter {
    limiter: Option<Arc<DirectRateLimiter>>,
    interval: Duration,
}

impl std::fmt::Debug for IntervalLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IntervalLimiter")
            .field("interval", &self.interval)
            .finish()
    }
}

impl IntervalLimiter {
    pub fn new(interval: Duration) -> Self {
        let limiter = Quota::with_period(interval).map(|quota| Arc::new(RateLimiter::direct(quota)));
        Self { limiter, interval }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Waits until the next request may be sent.
    pub async fn until_ready(&self) {
        if let Some(limiter) = &self.limiter {
            limiter.until_ready().await;
        }
    }
}
