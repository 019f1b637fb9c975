use moka::future::Cache as MokaCache;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::trace;

/// Cache statistics for monitoring
#[derive(Debug, Clone, Default)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub invalidations: u64,
    pub size: usize,
}

/// A thread-safe cache with a cache-wide TTL, backed by `moka`.
///
/// Values are stored behind an `Arc` so large values (reward lists) are
/// shared between readers instead of cloned inside the cache.
pub struct Cache<K, V> {
    inner: MokaCache<K, Arc<V>>,
    hits: AtomicU64,
    misses: AtomicU64,
    invalidations: AtomicU64,
}

impl<K, V> Cache<K, V>
where
    K: std::hash::Hash + Eq + Clone + Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    /// Create a new cache with the specified maximum size and TTL
    pub fn new(max_entries: usize, ttl: Duration) -> Self {
        let inner = MokaCache::builder()
            .max_capacity(max_entries as u64)
            .time_to_live(ttl)
            .build();

        Self {
            inner,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            invalidations: AtomicU64::new(0),
        }
    }

    /// Get a shared handle to a value.
    /// Returns None if the key is not found or the entry has expired.
    pub async fn get(&self, key: &K) -> Option<Arc<V>> {
        match self.inner.get(key).await {
            Some(value) => {
                trace!("Cache hit for key");
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(value)
            }
            None => {
                trace!("Cache miss for key");
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    pub async fn insert(&self, key: K, value: V) -> Arc<V> {
        let value = Arc::new(value);
        self.inner.insert(key, Arc::clone(&value)).await;
        value
    }

    pub async fn invalidate(&self, key: &K) {
        self.inner.invalidate(key).await;
        self.invalidations.fetch_add(1, Ordering::Relaxed);
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            invalidations: self.invalidations.load(Ordering::Relaxed),
            size: self.inner.entry_count() as usize,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_cache_basic_operations() {
        let cache: Cache<&'static str, Vec<u64>> = Cache::new(10, Duration::from_secs(60));

        cache.insert("active", vec![1, 2, 3]).await;
        assert_eq!(cache.get(&"active").await.as_deref(), Some(&vec![1, 2, 3]));
        assert!(cache.get(&"disabled").await.is_none());

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
    }

    #[tokio::test]
    async fn test_cache_ttl() {
        let cache: Cache<&'static str, u64> = Cache::new(10, Duration::from_millis(100));

        cache.insert("active", 42).await;
        assert!(cache.get(&"active").await.is_some());

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert!(cache.get(&"active").await.is_none());
    }

    #[tokio::test]
    async fn test_cache_invalidate() {
        let cache: Cache<&'static str, u64> = Cache::new(10, Duration::from_secs(60));

        cache.insert("active", 42).await;
        cache.invalidate(&"active").await;
        assert!(cache.get(&"active").await.is_none());
        assert_eq!(cache.stats().invalidations, 1);
    }
}
