//! Query result cache.
//!
//! Backed by `moka::sync::Cache`. Entries never expire on their own; the
//! engine clears the cache whenever the index changes. An optional capacity
//! bounds memory, with moka choosing which entries to evict.

use moka::notification::RemovalCause;
use moka::sync::Cache;
use serde::Serialize;
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Default number of cached queries
pub const DEFAULT_CAPACITY: usize = 256;

/// Trim, collapse internal whitespace and lowercase a query.
pub fn normalize_query(query: &str) -> String {
    query
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Identity of a cached query.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    query: String,
    n_results: usize,
    hybrid: bool,
}

impl CacheKey {
    pub fn new(query: &str, n_results: usize, hybrid: bool) -> Self {
        Self {
            query: normalize_query(query),
            n_results,
            hybrid,
        }
    }

    /// Normalized query text.
    pub fn query(&self) -> &str {
        &self.query
    }
}

/// Cache counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    /// Entries removed by invalidation
    pub invalidations: u64,
    /// Entries removed to stay within capacity
    pub evictions: u64,
    pub entries: usize,
}

impl CacheStats {
    /// Percentage of lookups answered from the cache.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64 * 100.0
        }
    }
}

/// Bookkeeping kept next to the moka cache.
#[derive(Debug, Default)]
struct CacheState {
    /// Bumped by every invalidation
    generation: u64,
    hits: u64,
    misses: u64,
    invalidations: u64,
}

/// Cache of query results keyed by normalized query and query options.
pub struct QueryCache<V> {
    entries: Cache<CacheKey, V>,
    capacity: Option<usize>,
    /// Held across stores and invalidations so a stale value is never stored
    state: Mutex<CacheState>,
    evictions: Arc<AtomicU64>,
}

impl<V> fmt::Debug for QueryCache<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryCache")
            .field("capacity", &self.capacity)
            .finish_non_exhaustive()
    }
}

impl<V: Clone + Send + Sync + 'static> Default for QueryCache<V> {
    fn default() -> Self {
        Self::new(Some(DEFAULT_CAPACITY))
    }
}

impl<V: Clone + Send + Sync + 'static> QueryCache<V> {
    /// Create a cache; `None` leaves it unbounded.
    pub fn new(capacity: Option<usize>) -> Self {
        let evictions = Arc::new(AtomicU64::new(0));
        let counter = evictions.clone();

        let mut builder = Cache::builder().eviction_listener(
            move |_key: Arc<CacheKey>, _value: V, cause: RemovalCause| {
                if matches!(cause, RemovalCause::Size) {
                    counter.fetch_add(1, Ordering::Relaxed);
                }
            },
        );
        if let Some(capacity) = capacity {
            builder = builder.max_capacity(capacity as u64);
        }

        Self {
            entries: builder.build(),
            capacity,
            state: Mutex::new(CacheState::default()),
            evictions,
        }
    }

    fn lock(&self) -> MutexGuard<'_, CacheState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Look up a cached value, counting the hit or miss.
    pub fn get(&self, key: &CacheKey) -> Option<V> {
        self.lookup(key).ok()
    }

    /// Cached value, or the generation a fresh value must be computed against.
    fn lookup(&self, key: &CacheKey) -> Result<V, u64> {
        let mut state = self.lock();

        if let Some(value) = self.entries.get(key) {
            state.hits += 1;
            tracing::debug!("Cache hit for '{}'", key.query);
            return Ok(value);
        }

        state.misses += 1;
        tracing::debug!("Cache miss for '{}'", key.query);
        Err(state.generation)
    }

    /// Return the cached value for `key`, or compute, cache and return it.
    ///
    /// A failed computation is returned to the caller and not cached. A value
    /// computed across an [`invalidate_all`](Self::invalidate_all) is returned
    /// but not cached, since it may reflect the old index.
    pub async fn get_or_compute<F, Fut, E>(&self, key: CacheKey, compute: F) -> Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        let generation = match self.lookup(&key) {
            Ok(value) => return Ok(value),
            Err(generation) => generation,
        };

        let value = compute().await?;
        self.insert(key, value.clone(), generation);
        Ok(value)
    }

    fn insert(&self, key: CacheKey, value: V, generation: u64) {
        let state = self.lock();

        if state.generation != generation {
            tracing::debug!("Discarding stale result for '{}'", key.query);
            return;
        }

        self.entries.insert(key, value);
    }

    /// Remove every entry.
    pub fn invalidate_all(&self) {
        let mut state = self.lock();
        self.entries.run_pending_tasks();
        let count = self.entries.entry_count();

        self.entries.invalidate_all();
        self.entries.run_pending_tasks();
        state.generation += 1;
        state.invalidations += count;

        if count > 0 {
            tracing::debug!("Cleared all {} cache entries", count);
        }
    }

    pub fn stats(&self) -> CacheStats {
        let entries = self.len();
        let state = self.lock();
        CacheStats {
            hits: state.hits,
            misses: state.misses,
            invalidations: state.invalidations,
            evictions: self.evictions.load(Ordering::Relaxed),
            entries,
        }
    }

    /// Number of live entries, after moka's pending maintenance has run.
    pub fn len(&self) -> usize {
        self.entries.run_pending_tasks();
        self.entries.entry_count() as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    async fn compute_counted(
        cache: &QueryCache<Vec<String>>,
        key: CacheKey,
        calls: &AtomicUsize,
    ) -> Vec<String> {
        cache
            .get_or_compute(key, || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok::<_, String>(vec!["result".to_string()])
            })
            .await
            .unwrap()
    }

    #[test]
    fn test_normalize_query() {
        assert_eq!(normalize_query("  Neural   Networks\t"), "neural networks");
        assert_eq!(
            CacheKey::new("A  b", 3, true),
            CacheKey::new("a b", 3, true)
        );
        assert_ne!(CacheKey::new("a", 3, true), CacheKey::new("a", 4, true));
        assert_ne!(CacheKey::new("a", 3, true), CacheKey::new("a", 3, false));
    }

    #[tokio::test]
    async fn test_second_lookup_is_hit() {
        let cache = QueryCache::default();
        let calls = AtomicUsize::new(0);

        compute_counted(&cache, CacheKey::new("query", 3, true), &calls).await;
        compute_counted(&cache, CacheKey::new(" QUERY ", 3, true), &calls).await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        let stats = cache.stats();
        assert_eq!((stats.hits, stats.misses, stats.entries), (1, 1, 1));
        assert!((stats.hit_rate() - 50.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_failure_is_not_cached() {
        let cache: QueryCache<Vec<String>> = QueryCache::default();
        let key = CacheKey::new("query", 3, true);

        let result = cache
            .get_or_compute(key.clone(), || async { Err::<Vec<String>, _>("boom") })
            .await;
        assert_eq!(result, Err("boom"));
        assert!(cache.is_empty());

        let calls = AtomicUsize::new(0);
        compute_counted(&cache, key, &calls).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_invalidate_all() {
        let cache = QueryCache::default();
        let calls = AtomicUsize::new(0);

        compute_counted(&cache, CacheKey::new("a", 3, true), &calls).await;
        compute_counted(&cache, CacheKey::new("b", 3, true), &calls).await;
        cache.invalidate_all();
        compute_counted(&cache, CacheKey::new("a", 3, true), &calls).await;

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(cache.stats().invalidations, 2);
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn test_result_computed_across_invalidation_is_not_stored() {
        let cache: QueryCache<Vec<String>> = QueryCache::default();

        let value = cache
            .get_or_compute(CacheKey::new("q", 1, true), || async {
                cache.invalidate_all();
                Ok::<_, String>(vec!["stale".to_string()])
            })
            .await
            .unwrap();

        assert_eq!(value, vec!["stale".to_string()]);
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_capacity_bounds_entries() {
        let cache = QueryCache::new(Some(2));
        let calls = AtomicUsize::new(0);

        for query in ["a", "b", "c"] {
            compute_counted(&cache, CacheKey::new(query, 1, true), &calls).await;
        }

        let stats = cache.stats();
        assert_eq!(stats.entries, 2);
        assert_eq!(stats.evictions, 1);
        assert_eq!(stats.misses, 3);
    }

    #[tokio::test]
    async fn test_unbounded() {
        let cache = QueryCache::new(None);
        let calls = AtomicUsize::new(0);

        for i in 0..300 {
            compute_counted(&cache, CacheKey::new(&format!("q{}", i), 1, true), &calls).await;
        }
        for i in 0..300 {
            assert!(cache.get(&CacheKey::new(&format!("q{}", i), 1, true)).is_some());
        }
        assert_eq!(cache.stats().evictions, 0);
        assert_eq!(calls.load(Ordering::SeqCst), 300);
    }
}
