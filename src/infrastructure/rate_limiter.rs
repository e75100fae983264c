//! Rate-limit discipline for REST `BarSource` adapters (§5): a minimum
//! inter-request delay, plus proactive backoff when the upstream reports a
//! low remaining-request counter.

use std::sync::atomic::{AtomicI64, Ordering};
use tokio::time::{Duration, Instant};
use tracing::debug;

/// Sleep proactively once the upstream's remaining-quota counter drops to or
/// below this many requests (§5 "sleeping proactively when remaining-request
/// count falls below a small threshold").
const LOW_REMAINING_THRESHOLD: u32 = 5;
const LOW_REMAINING_SLEEP: Duration = Duration::from_millis(1000);

/// Throttles a single `BarSource` adapter to at most one request per
/// `min_interval`. Cheap to share across concurrent fetch-pool workers via
/// `Arc` since its only mutable state is a lock-free timestamp.
pub struct RateLimiter {
    min_interval: Duration,
    last_request_nanos: AtomicI64,
}

impl RateLimiter {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_request_nanos: AtomicI64::new(0),
        }
    }

    /// The platform default: 350ms between requests to the same backend.
    pub fn default_for_rest() -> Self {
        Self::new(Duration::from_millis(350))
    }

    /// Blocks the caller until at least `min_interval` has elapsed since the
    /// last call through this limiter, then additionally sleeps if
    /// `remaining_quota` (when known) is below the low-remaining threshold.
    pub async fn throttle(&self, remaining_quota: Option<u32>) {
        let last = self.last_request_nanos.load(Ordering::Acquire);
        let now_nanos = now_monotonic_nanos();
        if last != 0 {
            let elapsed = Duration::from_nanos((now_nanos - last).max(0) as u64);
            if elapsed < self.min_interval {
                tokio::time::sleep(self.min_interval - elapsed).await;
            }
        }
        self.last_request_nanos.store(now_monotonic_nanos(), Ordering::Release);

        if let Some(remaining) = remaining_quota {
            if remaining <= LOW_REMAINING_THRESHOLD {
                debug!(remaining, "remaining request quota low, sleeping proactively");
                tokio::time::sleep(LOW_REMAINING_SLEEP).await;
            }
        }
    }
}

fn now_monotonic_nanos() -> i64 {
    static START: std::sync::OnceLock<Instant> = std::sync::OnceLock::new();
    let start = *START.get_or_init(Instant::now);
    Instant::now().saturating_duration_since(start).as_nanos() as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn throttle_enforces_minimum_spacing() {
        let limiter = RateLimiter::new(Duration::from_millis(50));
        let start = Instant::now();
        limiter.throttle(None).await;
        limiter.throttle(None).await;
        assert!(start.elapsed() >= Duration::from_millis(45));
    }

    #[tokio::test]
    async fn low_remaining_quota_adds_extra_sleep() {
        let limiter = RateLimiter::new(Duration::from_millis(1));
        let start = Instant::now();
        limiter.throttle(Some(1)).await;
        assert!(start.elapsed() >= LOW_REMAINING_SLEEP);
    }
}
