//! TTL+LRU cache in front of `search`, keyed on normalized query + mode.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use serde_json::Value;

/// Cache configuration.
#[derive(Debug, Clone, Copy)]
pub struct QueryCacheConfig {
    pub max_entries: usize,
    pub ttl: Duration,
}

impl Default for QueryCacheConfig {
    fn default() -> Self {
        Self {
            max_entries: 128,
            ttl: Duration::from_secs(30),
        }
    }
}

/// Counter snapshot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub current_size: usize,
}

struct Entry {
    key: String,
    value: Value,
    inserted_at: Instant,
}

#[derive(Default)]
struct CacheState {
    /// MRU at the front.
    order: Vec<Entry>,
    index: HashMap<String, usize>,
    hits: u64,
    misses: u64,
    evictions: u64,
}

impl CacheState {
    fn reindex(&mut self) {
        self.index.clear();
        for (i, entry) in self.order.iter().enumerate() {
            self.index.insert(entry.key.clone(), i);
        }
    }
}

/// Small TTL+LRU response cache with exact eviction accounting.
pub struct QueryCache {
    config: QueryCacheConfig,
    state: Mutex<CacheState>,
}

impl QueryCache {
    #[must_use]
    pub fn new(config: QueryCacheConfig) -> Self {
        Self {
            config,
            state: Mutex::new(CacheState::default()),
        }
    }

    /// Cached value for `key`, moving it to MRU. TTL-expired entries are
    /// evicted lazily and count as a miss.
    pub fn get(&self, key: &str) -> Option<Value> {
        let Ok(mut state) = self.state.lock() else {
            return None;
        };
        let Some(&pos) = state.index.get(key) else {
            state.misses += 1;
            return None;
        };

        if state.order[pos].inserted_at.elapsed() >= self.config.ttl {
            state.order.remove(pos);
            state.reindex();
            state.misses += 1;
            return None;
        }

        let entry = state.order.remove(pos);
        let value = entry.value.clone();
        state.order.insert(0, entry);
        state.reindex();
        state.hits += 1;
        Some(value)
    }

    /// Insert or replace `key`. At capacity, LRU entries are evicted until
    /// below capacity, counting each eviction.
    pub fn put(&self, key: &str, value: Value) {
        let Ok(mut state) = self.state.lock() else {
            return;
        };
        if let Some(&pos) = state.index.get(key) {
            state.order.remove(pos);
        }
        while state.order.len() >= self.config.max_entries && !state.order.is_empty() {
            state.order.pop();
            state.evictions += 1;
        }
        state.order.insert(
            0,
            Entry {
                key: key.to_owned(),
                value,
                inserted_at: Instant::now(),
            },
        );
        state.reindex();
    }

    /// Drop every entry.
    pub fn clear(&self) {
        if let Ok(mut state) = self.state.lock() {
            state.order.clear();
            state.index.clear();
        }
    }

    /// Current counters.
    pub fn stats(&self) -> CacheStats {
        self.state.lock().map_or_else(
            |_| CacheStats::default(),
            |state| CacheStats {
                hits: state.hits,
                misses: state.misses,
                evictions: state.evictions,
                current_size: state.order.len(),
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn put_then_get_returns_value_and_counts_hit() {
        let cache = QueryCache::new(QueryCacheConfig::default());
        cache.put("k", json!({"n": 1}));
        assert_eq!(cache.get("k"), Some(json!({"n": 1})));
        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 0);
        assert_eq!(stats.current_size, 1);
    }

    #[test]
    fn lru_eviction_counts_and_prefers_recently_used() {
        let cache = QueryCache::new(QueryCacheConfig {
            max_entries: 2,
            ttl: Duration::from_secs(60),
        });
        cache.put("a", json!(1));
        cache.put("b", json!(2));
        // Touch "a" so "b" becomes LRU.
        let _ = cache.get("a");
        cache.put("c", json!(3));

        assert!(cache.get("b").is_none(), "LRU entry evicted");
        assert!(cache.get("a").is_some());
        assert!(cache.get("c").is_some());
        assert_eq!(cache.stats().evictions, 1);
    }

    #[test]
    fn replace_does_not_evict() {
        let cache = QueryCache::new(QueryCacheConfig {
            max_entries: 2,
            ttl: Duration::from_secs(60),
        });
        cache.put("a", json!(1));
        cache.put("a", json!(2));
        assert_eq!(cache.get("a"), Some(json!(2)));
        assert_eq!(cache.stats().evictions, 0);
        assert_eq!(cache.stats().current_size, 1);
    }

    #[test]
    fn ttl_expiry_is_lazy_and_counts_a_miss() {
        let cache = QueryCache::new(QueryCacheConfig {
            max_entries: 8,
            ttl: Duration::from_millis(10),
        });
        cache.put("k", json!(1));
        std::thread::sleep(Duration::from_millis(25));
        assert!(cache.get("k").is_none());
        let stats = cache.stats();
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.current_size, 0);
    }

    #[test]
    fn clear_empties_everything() {
        let cache = QueryCache::new(QueryCacheConfig::default());
        cache.put("a", json!(1));
        cache.put("b", json!(2));
        cache.clear();
        assert_eq!(cache.stats().current_size, 0);
        assert!(cache.get("a").is_none());
    }
}
