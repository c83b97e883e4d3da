//! Process-wide request rate limiter.
//!
//! The remote service enforces one aggregate quota no matter how many
//! files are in flight, so every client shares a single limiter (via
//! `Arc`) and all dispatches serialize through its mutex. The lock is
//! held across the sleep on purpose: that is the single serialization
//! point that spaces requests out.

use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

/// Timestamp gate enforcing a minimum interval between dispatches.
#[derive(Debug)]
pub struct RateLimiter {
    min_interval: Duration,
    last_dispatch: Mutex<Option<Instant>>,
}

impl RateLimiter {
    /// Limiter with the given minimum interval between requests.
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_dispatch: Mutex::new(None),
        }
    }

    /// Limiter from a configured `rate_limit` in seconds between
    /// requests (the MusicBrainz default is 1.0).
    pub fn from_secs(rate_limit: f64) -> Self {
        Self::new(Duration::from_secs_f64(rate_limit.max(0.0)))
    }

    /// Wait until a request may be dispatched, then claim the slot.
    pub async fn acquire(&self) {
        let mut last = self.last_dispatch.lock().await;
        if let Some(previous) = *last {
            let elapsed = previous.elapsed();
            if elapsed < self.min_interval {
                tokio::time::sleep(self.min_interval - elapsed).await;
            }
        }
        *last = Some(Instant::now());
    }
}
