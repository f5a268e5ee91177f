//! Time-boxed read-through cache.
//!
//! Entries expire a fixed TTL after insertion. Expired entries read as
//! misses and are evicted lazily. Stale reads within the TTL are accepted
//! by every caller, so the cache never coordinates with writers.

use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use tokio::time::Instant;

/// Thread-safe map whose entries expire after a fixed TTL.
#[derive(Debug)]
pub struct TtlCache<K, V> {
    ttl: Duration,
    entries: RwLock<HashMap<K, (Instant, V)>>,
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Fresh value for `key`, if any.
    pub fn get(&self, key: &K) -> Option<V> {
        let expired = {
            let entries = self.read();
            match entries.get(key) {
                Some((at, value)) if at.elapsed() < self.ttl => return Some(value.clone()),
                Some(_) => true,
                None => false,
            }
        };
        if expired {
            self.write().remove(key);
        }
        None
    }

    pub fn insert(&self, key: K, value: V) {
        self.write().insert(key, (Instant::now(), value));
    }

    pub fn invalidate(&self, key: &K) {
        self.write().remove(key);
    }

    pub fn clear(&self) {
        self.write().clear();
    }

    /// Number of stored entries, expired ones included until evicted.
    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Return the cached value or load, store, and return a fresh one.
    ///
    /// Loader errors are passed through and nothing is cached.
    pub async fn get_or_try_insert_with<F, Fut, E>(&self, key: K, load: F) -> Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        if let Some(hit) = self.get(&key) {
            return Ok(hit);
        }
        let value = load().await?;
        self.insert(key, value.clone());
        Ok(value)
    }

    // A poisoned lock only means another reader panicked; the map is still usable.
    fn read(&self) -> RwLockReadGuard<'_, HashMap<K, (Instant, V)>> {
        self.entries.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<K, (Instant, V)>> {
        self.entries.write().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_entry_expires_after_ttl() {
        let cache = TtlCache::new(Duration::from_secs(300));
        cache.insert("a", 1);
        assert_eq!(cache.get(&"a"), Some(1));

        tokio::time::advance(Duration::from_secs(299)).await;
        assert_eq!(cache.get(&"a"), Some(1));

        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(cache.get(&"a"), None);
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_clear_resets_state() {
        let cache = TtlCache::new(Duration::from_secs(300));
        cache.insert(1, "x");
        cache.insert(2, "y");
        assert_eq!(cache.len(), 2);
        cache.clear();
        assert_eq!(cache.get(&1), None);
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_read_through_loads_once() {
        let cache = TtlCache::new(Duration::from_secs(300));
        let mut loads = 0;

        for _ in 0..3 {
            let v: Result<u32, ()> = cache
                .get_or_try_insert_with("k", || {
                    loads += 1;
                    async { Ok(7) }
                })
                .await;
            assert_eq!(v, Ok(7));
        }
        assert_eq!(loads, 1);
    }

    #[tokio::test]
    async fn test_read_through_does_not_cache_errors() {
        let cache: TtlCache<&str, u32> = TtlCache::new(Duration::from_secs(300));
        let failed: Result<u32, &str> = cache
            .get_or_try_insert_with("k", || async { Err("down") })
            .await;
        assert_eq!(failed, Err("down"));
        assert!(cache.get(&"k").is_none());
    }
}
