//! Time-bounded memoization for slow-changing reference data.
//!
//! The cache is instance-scoped (a member of the client, never a
//! global), so two clients pointed at different instances cannot
//! cross-contaminate. Staleness is judged lazily at lookup time only;
//! nothing expires in the background, and an idle entry may outlive its
//! nominal TTL until someone looks it up again.

use crate::error::Result;
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use tokio::sync::Mutex;
use tokio::time::{Duration, Instant};
use tracing::debug;

/// Default time-to-live for cached reference data.
pub const DEFAULT_TTL: Duration = Duration::from_secs(5 * 60);

struct Entry {
    value: Value,
    stored_at: Instant,
}

/// A TTL cache keyed by string, safe for concurrent use.
pub struct TtlCache {
    entries: Mutex<HashMap<String, Entry>>,
    ttl: Duration,
}

impl TtlCache {
    /// Create a cache with the given TTL.
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl,
        }
    }

    /// Return the cached value for `key` if it is still fresh, otherwise
    /// run `fetch`, store its result and return it.
    ///
    /// The lock is released while `fetch` runs, so two concurrent misses
    /// for the same key may both fetch; the second write wins and the
    /// duplicate round-trip is harmless.
    ///
    /// # Errors
    /// Propagates the error from `fetch`; nothing is stored on failure.
    pub async fn get_or_fetch<F, Fut>(&self, key: &str, fetch: F) -> Result<Value>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Value>>,
    {
        {
            let entries = self.entries.lock().await;
            if let Some(entry) = entries.get(key) {
                if entry.stored_at.elapsed() < self.ttl {
                    debug!(key, "cache hit");
                    return Ok(entry.value.clone());
                }
            }
        }

        debug!(key, "cache miss, fetching fresh data");
        let value = fetch().await?;
        self.entries.lock().await.insert(
            key.to_string(),
            Entry {
                value: value.clone(),
                stored_at: Instant::now(),
            },
        );
        Ok(value)
    }

    /// Drop a single entry; the next lookup for that key will fetch.
    pub async fn invalidate(&self, key: &str) {
        if self.entries.lock().await.remove(key).is_some() {
            debug!(key, "cache entry invalidated");
        }
    }

    /// Drop every entry.
    pub async fn clear(&self) {
        self.entries.lock().await.clear();
        debug!("cache cleared");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    async fn fetch_counting(counter: &AtomicUsize) -> Result<Value> {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(json!(["fetched"]))
    }

    #[tokio::test(start_paused = true)]
    async fn test_hit_within_ttl() {
        let cache = TtlCache::new(Duration::from_secs(300));
        let calls = AtomicUsize::new(0);

        let first = cache
            .get_or_fetch("types", || fetch_counting(&calls))
            .await
            .unwrap();
        assert_eq!(first, json!(["fetched"]));
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        // 4:59 after population: still fresh, fetch not invoked again.
        tokio::time::advance(Duration::from_secs(299)).await;
        cache
            .get_or_fetch("types", || fetch_counting(&calls))
            .await
            .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_miss_after_ttl() {
        let cache = TtlCache::new(Duration::from_secs(300));
        let calls = AtomicUsize::new(0);

        cache
            .get_or_fetch("types", || fetch_counting(&calls))
            .await
            .unwrap();

        // 5:01 after population: stale, fetch runs again.
        tokio::time::advance(Duration::from_secs(301)).await;
        cache
            .get_or_fetch("types", || fetch_counting(&calls))
            .await
            .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalidate_single_key() {
        let cache = TtlCache::new(Duration::from_secs(300));
        let calls = AtomicUsize::new(0);

        cache
            .get_or_fetch("types", || fetch_counting(&calls))
            .await
            .unwrap();
        cache
            .get_or_fetch("statuses", || fetch_counting(&calls))
            .await
            .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        cache.invalidate("types").await;

        // Invalidated key refetches, the other stays cached.
        cache
            .get_or_fetch("types", || fetch_counting(&calls))
            .await
            .unwrap();
        cache
            .get_or_fetch("statuses", || fetch_counting(&calls))
            .await
            .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_clear_all() {
        let cache = TtlCache::new(Duration::from_secs(300));
        let calls = AtomicUsize::new(0);

        cache
            .get_or_fetch("types", || fetch_counting(&calls))
            .await
            .unwrap();
        cache.clear().await;
        cache
            .get_or_fetch("types", || fetch_counting(&calls))
            .await
            .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fetch_failure_not_cached() {
        let cache = TtlCache::new(Duration::from_secs(300));
        let calls = AtomicUsize::new(0);

        let result = cache
            .get_or_fetch("types", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(crate::error::ApiError::Transport("boom".to_string()))
            })
            .await;
        assert!(result.is_err());

        // Next lookup fetches again rather than serving a stored error.
        cache
            .get_or_fetch("types", || fetch_counting(&calls))
            .await
            .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
