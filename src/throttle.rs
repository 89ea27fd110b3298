//! Per-user throttling of inbound events.
//!
//! A user is admitted when no throttle entry exists for them; admitting
//! creates one that expires after the throttle window. Presence of the
//! entry is the signal, it carries no value.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use moka::policy::EvictionPolicy;
use moka::sync::Cache;
use teloxide::types::UserId;
use tracing::{debug, warn};

#[derive(Debug)]
pub struct StoreError(pub String);

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "throttle store error: {}", self.0)
    }
}

impl std::error::Error for StoreError {}

/// Storage for throttle entries.
pub trait ThrottleStore: Send + Sync {
    /// Mark `user_id` unless it is already marked.
    ///
    /// Returns `Ok(true)` when the mark was created by this call. Must be
    /// atomic per key: of two racing calls for one user only one gets `true`.
    fn try_mark(&self, user_id: u64) -> Result<bool, StoreError>;
}

/// In-memory store backed by a moka TTL cache.
#[derive(Clone)]
pub struct MokaThrottleStore {
    cache: Cache<u64, ()>,
}

impl MokaThrottleStore {
    /// A full store evicts its least recently marked user. The default
    /// TinyLFU policy may instead reject a fresh mark, which would let that
    /// user straight through again.
    pub fn new(window: Duration, max_capacity: u64) -> Self {
        let cache = Cache::builder()
            .max_capacity(max_capacity)
            .time_to_live(window)
            .eviction_policy(EvictionPolicy::lru())
            .build();
        Self { cache }
    }

    /// Entries currently held, including ones not yet evicted after expiry.
    pub fn entry_count(&self) -> u64 {
        self.cache.run_pending_tasks();
        self.cache.entry_count()
    }
}

impl ThrottleStore for MokaThrottleStore {
    fn try_mark(&self, user_id: u64) -> Result<bool, StoreError> {
        Ok(self.cache.entry(user_id).or_insert(()).is_fresh())
    }
}

/// Decides whether an inbound event goes through.
#[derive(Clone)]
pub struct RateLimiter {
    store: Arc<dyn ThrottleStore>,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn ThrottleStore>) -> Self {
        Self { store }
    }

    /// Limiter with its own moka store.
    pub fn with_window(window: Duration, max_capacity: u64) -> Self {
        Self::new(Arc::new(MokaThrottleStore::new(window, max_capacity)))
    }

    /// `false` means drop the event silently.
    ///
    /// Anonymous events are always admitted, and so is every event while the
    /// store is failing.
    pub fn admit(&self, user_id: Option<UserId>) -> bool {
        let Some(user_id) = user_id else {
            return true;
        };
        match self.store.try_mark(user_id.0) {
            Ok(true) => true,
            Ok(false) => {
                debug!("Throttled event from user {}", user_id);
                false
            }
            Err(e) => {
                warn!("Admitting user {} without throttling: {e}", user_id);
                true
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;
    use std::time::Duration;

    const WINDOW: Duration = Duration::from_millis(100);

    struct FailingStore;

    impl ThrottleStore for FailingStore {
        fn try_mark(&self, _user_id: u64) -> Result<bool, StoreError> {
            Err(StoreError("unavailable".into()))
        }
    }

    #[test]
    fn test_second_call_within_window_denied() {
        let limiter = RateLimiter::with_window(WINDOW, 10_000);
        assert!(limiter.admit(Some(UserId(42))));
        assert!(!limiter.admit(Some(UserId(42))));
    }

    #[test]
    fn test_admitted_again_after_window() {
        let limiter = RateLimiter::with_window(WINDOW, 10_000);
        assert!(limiter.admit(Some(UserId(42))));
        thread::sleep(Duration::from_millis(150));
        assert!(limiter.admit(Some(UserId(42))));
    }

    #[test]
    fn test_denied_call_does_not_extend_window() {
        let limiter = RateLimiter::with_window(WINDOW, 10_000);
        assert!(limiter.admit(Some(UserId(7))));
        thread::sleep(Duration::from_millis(60));
        assert!(!limiter.admit(Some(UserId(7))));
        thread::sleep(Duration::from_millis(60));
        // 120ms after the first admission
        assert!(limiter.admit(Some(UserId(7))));
    }

    #[test]
    fn test_users_are_independent() {
        let limiter = RateLimiter::with_window(WINDOW, 10_000);
        assert!(limiter.admit(Some(UserId(1))));
        assert!(limiter.admit(Some(UserId(2))));
        assert!(!limiter.admit(Some(UserId(1))));
    }

    #[test]
    fn test_anonymous_always_admitted() {
        let limiter = RateLimiter::with_window(WINDOW, 10_000);
        for _ in 0..5 {
            assert!(limiter.admit(None));
        }
    }

    #[test]
    fn test_store_failure_fails_open() {
        let limiter = RateLimiter::new(Arc::new(FailingStore));
        assert!(limiter.admit(Some(UserId(42))));
        assert!(limiter.admit(Some(UserId(42))));
    }

    #[test]
    fn test_isolated_stores() {
        let a = RateLimiter::with_window(WINDOW, 10_000);
        let b = RateLimiter::with_window(WINDOW, 10_000);
        assert!(a.admit(Some(UserId(5))));
        assert!(b.admit(Some(UserId(5))));
    }

    #[test]
    fn test_concurrent_same_user_admitted_once() {
        let limiter = RateLimiter::with_window(Duration::from_secs(5), 10_000);
        let admitted = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let limiter = limiter.clone();
                let admitted = admitted.clone();
                thread::spawn(move || {
                    if limiter.admit(Some(UserId(99))) {
                        admitted.fetch_add(1, Ordering::SeqCst);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(admitted.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_concurrent_distinct_users_all_admitted() {
        let limiter = RateLimiter::with_window(Duration::from_secs(5), 10_000);
        let handles: Vec<_> = (0..16u64)
            .map(|id| {
                let limiter = limiter.clone();
                thread::spawn(move || limiter.admit(Some(UserId(id))))
            })
            .collect();
        for h in handles {
            assert!(h.join().unwrap());
        }
    }

    #[test]
    fn test_capacity_bounds_entries() {
        let store = MokaThrottleStore::new(Duration::from_secs(60), 100);
        for id in 0..1_000u64 {
            store.try_mark(id).unwrap();
        }
        assert!(store.entry_count() <= 100);
    }

    #[test]
    fn test_new_user_throttled_when_store_full() {
        let limiter = RateLimiter::with_window(Duration::from_secs(30), 10);
        for _ in 0..5 {
            for id in 0..10u64 {
                limiter.admit(Some(UserId(id)));
            }
        }

        let mut admitted = 0;
        for _ in 0..20 {
            if limiter.admit(Some(UserId(999))) {
                admitted += 1;
            }
            thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(admitted, 1, "user 999 admitted {admitted} times within one window");
    }
}
