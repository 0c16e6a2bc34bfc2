//! Fixed-window request rate limiting.
//!
//! One counter exists per `(client, window)` pair; a new window starts at
//! every multiple of the window length, so a burst straddling a boundary can
//! admit up to twice the per-window maximum. That approximation is accepted
//! for a demo-grade limiter and intentionally not "fixed" here.
//!
//! The counter is read then conditionally written, without a lock across the
//! two. Concurrent requests in the same window can race and undercount, which
//! admits slightly more than the maximum; that is the safe failure direction.
//! A lost increment never causes a spurious rejection.

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tracing::{debug, warn};

use crate::store::CounterStore;

/// Outcome of one admission check.
#[derive(Debug, Clone, Copy)]
pub struct RateDecision {
    pub allowed: bool,
    /// Requests left in the current window after this one.
    pub remaining: u32,
    /// Seconds until the current window ends.
    pub retry_after_secs: u64,
}

pub struct RateLimiter {
    store: Arc<dyn CounterStore>,
    window_secs: u64,
    max_requests: u32,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn CounterStore>, window_secs: u64, max_requests: u32) -> Self {
        Self {
            store,
            window_secs,
            max_requests,
        }
    }

    pub fn max_requests(&self) -> u32 {
        self.max_requests
    }

    /// Admit or reject one request from `identity`.
    ///
    /// If the counter store is unreachable the request is admitted anyway:
    /// a best-effort demo limiter must not become a single point of outage.
    pub async fn check(&self, identity: &str) -> RateDecision {
        let now_secs = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        self.check_at(identity, now_secs).await
    }

    /// Admission check against an explicit clock, for tests.
    pub async fn check_at(&self, identity: &str, now_secs: u64) -> RateDecision {
        let window_start = now_secs - (now_secs % self.window_secs);
        let key = format!("{identity}:{window_start}");
        let retry_after_secs = self.window_secs - (now_secs % self.window_secs);

        let count = match self.store.get(&key).await {
            Ok(count) => count.unwrap_or(0),
            Err(e) => {
                warn!(error = %e, identity, "counter store read failed, admitting request");
                return RateDecision {
                    allowed: true,
                    remaining: self.max_requests.saturating_sub(1),
                    retry_after_secs,
                };
            }
        };

        if count >= u64::from(self.max_requests) {
            debug!(identity, count, max = self.max_requests, "rate limit exceeded");
            return RateDecision {
                allowed: false,
                remaining: 0,
                retry_after_secs,
            };
        }

        // TTL of twice the window: the entry only needs to survive its own
        // window, after which it is garbage.
        let ttl = Duration::from_secs(self.window_secs * 2);
        if let Err(e) = self.store.put(&key, count + 1, ttl).await {
            warn!(error = %e, identity, "counter store write failed, admitting request");
        }

        RateDecision {
            allowed: true,
            remaining: self.max_requests - count as u32 - 1,
            retry_after_secs,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryCounterStore, StoreError};
    use async_trait::async_trait;

    struct DownStore;

    #[async_trait]
    impl CounterStore for DownStore {
        async fn get(&self, _key: &str) -> Result<Option<u64>, StoreError> {
            Err(StoreError("connection refused".into()))
        }

        async fn put(&self, _key: &str, _value: u64, _ttl: Duration) -> Result<(), StoreError> {
            Err(StoreError("connection refused".into()))
        }
    }

    fn limiter(max: u32) -> RateLimiter {
        RateLimiter::new(Arc::new(MemoryCounterStore::new()), 60, max)
    }

    #[tokio::test]
    async fn admits_up_to_max_then_rejects() {
        let limiter = limiter(3);
        for expected_remaining in [2, 1, 0] {
            let d = limiter.check_at("1.2.3.4", 1_000).await;
            assert!(d.allowed);
            assert_eq!(d.remaining, expected_remaining);
        }
        let d = limiter.check_at("1.2.3.4", 1_000).await;
        assert!(!d.allowed);
        assert_eq!(d.remaining, 0);
    }

    #[tokio::test]
    async fn counts_reset_in_next_window() {
        let limiter = limiter(1);
        assert!(limiter.check_at("c", 120).await.allowed);
        assert!(!limiter.check_at("c", 130).await.allowed);
        // 180 starts a fresh window; the previous count must not carry over.
        let d = limiter.check_at("c", 180).await;
        assert!(d.allowed);
        assert_eq!(d.remaining, 0);
    }

    #[tokio::test]
    async fn identities_are_independent() {
        let limiter = limiter(1);
        assert!(limiter.check_at("a", 50).await.allowed);
        assert!(limiter.check_at("b", 50).await.allowed);
        assert!(!limiter.check_at("a", 55).await.allowed);
    }

    #[tokio::test]
    async fn rejection_does_not_touch_the_counter() {
        let store = Arc::new(MemoryCounterStore::new());
        let limiter = RateLimiter::new(store.clone(), 60, 1);
        assert!(limiter.check_at("c", 0).await.allowed);
        for _ in 0..5 {
            assert!(!limiter.check_at("c", 1).await.allowed);
        }
        assert_eq!(store.get("c:0").await.unwrap(), Some(1));
    }

    #[tokio::test]
    async fn fails_open_when_store_is_down() {
        let limiter = RateLimiter::new(Arc::new(DownStore), 60, 10);
        let d = limiter.check_at("c", 0).await;
        assert!(d.allowed);
    }

    #[tokio::test]
    async fn retry_after_points_at_window_end() {
        let limiter = limiter(0);
        let d = limiter.check_at("c", 75).await;
        assert!(!d.allowed);
        assert_eq!(d.retry_after_secs, 45);
    }
}
