//! Query-text plan cache: memoizes compiled plans (and, for read-only
//! queries, their results) by canonical query text, with a configurable
//! size bound (spec.md §4.8).

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::common::limits::MAX_QUERY_CACHE_SIZE;

#[derive(Debug, Clone, Copy, Default)]
pub struct CacheStatistics {
    pub hits: u64,
    pub misses: u64,
    pub count: usize,
}

impl CacheStatistics {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// Bounded FIFO-evicted cache keyed by canonical query text. `bound` is
/// clamped to `MAX_QUERY_CACHE_SIZE` regardless of what's configured.
pub struct PlanCache<T> {
    bound: usize,
    order: RwLock<VecDeque<String>>,
    entries: RwLock<std::collections::HashMap<String, Arc<T>>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl<T> PlanCache<T> {
    pub fn new(bound: usize) -> Self {
        Self {
            bound: bound.min(MAX_QUERY_CACHE_SIZE).max(1),
            order: RwLock::new(VecDeque::new()),
            entries: RwLock::new(std::collections::HashMap::new()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn get(&self, key: &str) -> Option<Arc<T>> {
        let found = self.entries.read().get(key).cloned();
        if found.is_some() {
            self.hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
        }
        found
    }

    pub fn get_or_insert_with(&self, key: &str, build: impl FnOnce() -> T) -> Arc<T> {
        if let Some(existing) = self.get(key) {
            return existing;
        }
        let value = Arc::new(build());
        self.insert(key.to_string(), value.clone());
        value
    }

    fn insert(&self, key: String, value: Arc<T>) {
        let mut entries = self.entries.write();
        let mut order = self.order.write();
        if !entries.contains_key(&key) {
            order.push_back(key.clone());
            while order.len() > self.bound {
                if let Some(evicted) = order.pop_front() {
                    entries.remove(&evicted);
                }
            }
        }
        entries.insert(key, value);
    }

    /// Drops every cached entry keyed under `table`'s name prefix (callers
    /// key subquery/plan entries so a mutated table's entries share a
    /// recognizable prefix); see `crate::executor::subquery` for the
    /// table-mutation invalidation this backs.
    pub fn invalidate(&self, key: &str) {
        self.entries.write().remove(key);
        self.order.write().retain(|k| k != key);
    }

    pub fn statistics(&self) -> CacheStatistics {
        CacheStatistics {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            count: self.entries.read().len(),
        }
    }
}
