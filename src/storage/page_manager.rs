//! Page Manager: a bounded LRU cache over the container's numbered data
//! pages, coordinating dirty flushing and observable hit/miss metrics
//! (spec.md §4.2).

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::common::PageId;
use crate::container::Container;
use crate::error::DbError;
use crate::storage::page::Page;
use crate::Result;

#[derive(Debug, Default, Clone, Copy)]
pub struct CacheMetrics {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
}

impl CacheMetrics {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// Recency queue plus a membership index; `touch` moves a page to the
/// back (most-recently-used), `evict` pops from the front.
struct LruQueue {
    order: VecDeque<PageId>,
}

impl LruQueue {
    fn new() -> Self {
        Self {
            order: VecDeque::new(),
        }
    }

    fn touch(&mut self, page_id: PageId) {
        if let Some(pos) = self.order.iter().position(|&p| p == page_id) {
            self.order.remove(pos);
        }
        self.order.push_back(page_id);
    }

    fn remove(&mut self, page_id: PageId) {
        if let Some(pos) = self.order.iter().position(|&p| p == page_id) {
            self.order.remove(pos);
        }
    }

    fn evict_candidate(&self, frames: &HashMap<PageId, Page>) -> Option<PageId> {
        self.order
            .iter()
            .find(|&&id| frames.get(&id).map(|p| p.pin_count == 0).unwrap_or(false))
            .copied()
    }
}

/// Bounded LRU cache of `Page`s backed by a `Container`'s page-addressed
/// data region. On a miss, evicts the least-recently-used unpinned page
/// (flushing it first if dirty), reads the requested page, and inserts it.
pub struct PageManager {
    container: Arc<Container>,
    capacity: usize,
    frames: RwLock<HashMap<PageId, Page>>,
    lru: RwLock<LruQueue>,
    metrics: RwLock<CacheMetrics>,
    free_list: RwLock<Vec<PageId>>,
}

impl PageManager {
    pub fn new(container: Arc<Container>, capacity_pages: usize) -> Self {
        Self {
            container,
            capacity: capacity_pages.max(1),
            frames: RwLock::new(HashMap::new()),
            lru: RwLock::new(LruQueue::new()),
            metrics: RwLock::new(CacheMetrics::default()),
            free_list: RwLock::new(Vec::new()),
        }
    }

    /// Allocates and caches a brand-new page.
    pub fn new_page(&self) -> Result<PageId> {
        let page_id = if let Some(id) = self.free_list.write().pop() {
            id
        } else {
            self.container.allocate_pages(1)?
        };
        let page = Page::new(page_id, self.container.page_size() as usize);
        self.insert_frame(page);
        Ok(page_id)
    }

    /// Returns a clone of the page, loading it from the container on a
    /// cache miss. Mutating it through `update_page` sets the dirty flag.
    pub fn fetch_page(&self, page_id: PageId) -> Result<Page> {
        if let Some(page) = self.frames.read().get(&page_id) {
            self.metrics.write().hits += 1;
            self.lru.write().touch(page_id);
            return Ok(page.clone());
        }

        self.metrics.write().misses += 1;
        let bytes = self.container.read_raw_page(page_id)?;
        let page = Page::from_bytes(page_id, bytes);
        self.insert_frame(page.clone());
        Ok(page)
    }

    /// Replaces the cached copy of `page` (already mutated by the caller)
    /// and marks it dirty.
    pub fn update_page(&self, mut page: Page) {
        page.mark_dirty();
        self.lru.write().touch(page.id);
        self.frames.write().insert(page.id, page);
    }

    fn insert_frame(&self, page: Page) {
        let page_id = page.id;
        if self.frames.read().len() >= self.capacity && !self.frames.read().contains_key(&page_id) {
            self.evict_one();
        }
        self.frames.write().insert(page_id, page);
        self.lru.write().touch(page_id);
    }

    fn evict_one(&self) {
        let victim = {
            let lru = self.lru.read();
            let frames = self.frames.read();
            lru.evict_candidate(&frames)
        };
        if let Some(victim) = victim {
            self.flush_page(victim).ok();
            self.frames.write().remove(&victim);
            self.lru.write().remove(victim);
            self.metrics.write().evictions += 1;
        }
    }

    pub fn flush_page(&self, page_id: PageId) -> Result<()> {
        let dirty_bytes = {
            let mut frames = self.frames.write();
            match frames.get_mut(&page_id) {
                Some(page) if page.is_dirty => {
                    page.is_dirty = false;
                    Some(page.data.clone())
                }
                _ => None,
            }
        };
        if let Some(bytes) = dirty_bytes {
            self.container.write_raw_page(page_id, &bytes)?;
        }
        Ok(())
    }

    pub fn flush_all(&self) -> Result<()> {
        let ids: Vec<PageId> = self.frames.read().keys().copied().collect();
        for id in ids {
            self.flush_page(id)?;
        }
        Ok(())
    }

    /// Releases a page back to the allocator; the manager's free list
    /// lets the next `new_page` reuse it in O(1) without a fresh extent
    /// allocation.
    pub fn free_page(&self, page_id: PageId) {
        self.frames.write().remove(&page_id);
        self.lru.write().remove(page_id);
        self.free_list.write().push(page_id);
        self.container.free_pages(page_id, 1);
    }

    pub fn pin(&self, page_id: PageId) -> Result<()> {
        self.frames
            .write()
            .get_mut(&page_id)
            .map(|p| p.pin_count += 1)
            .ok_or_else(|| DbError::NotFound(format!("page {page_id} not cached")))
    }

    pub fn unpin(&self, page_id: PageId) {
        if let Some(page) = self.frames.write().get_mut(&page_id) {
            page.pin_count = page.pin_count.saturating_sub(1);
        }
    }

    pub fn metrics(&self) -> CacheMetrics {
        *self.metrics.read()
    }

    pub fn cached_count(&self) -> usize {
        self.frames.read().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use tempfile::tempdir;

    fn manager(capacity: usize) -> (PageManager, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let config = EngineConfig {
            data_dir: dir.path().to_string_lossy().to_string(),
            page_size: 256,
            min_extension_pages: 64,
            ..EngineConfig::default()
        };
        let container = Arc::new(Container::open(dir.path().join("data.scdb"), &config).unwrap());
        (PageManager::new(container, capacity), dir)
    }

    #[test]
    fn new_page_round_trips_through_fetch() {
        let (pm, _dir) = manager(8);
        let id = pm.new_page().unwrap();
        let mut page = pm.fetch_page(id).unwrap();
        page.insert_record(b"row").unwrap();
        pm.update_page(page);
        let reloaded = pm.fetch_page(id).unwrap();
        assert_eq!(reloaded.get_record(0).unwrap(), b"row");
    }

    #[test]
    fn eviction_flushes_dirty_pages_before_dropping_them() {
        let (pm, _dir) = manager(1);
        let a = pm.new_page().unwrap();
        let mut page = pm.fetch_page(a).unwrap();
        page.insert_record(b"dirty").unwrap();
        pm.update_page(page);

        let b = pm.new_page().unwrap(); // forces eviction of `a`
        assert_eq!(pm.cached_count(), 1);

        let reloaded = pm.fetch_page(a).unwrap();
        assert_eq!(reloaded.get_record(0).unwrap(), b"dirty");
        let _ = b;
    }

    #[test]
    fn repeated_fetch_of_cached_page_counts_as_hits() {
        let (pm, _dir) = manager(8);
        let id = pm.new_page().unwrap();
        pm.fetch_page(id).unwrap();
        pm.fetch_page(id).unwrap();
        let metrics = pm.metrics();
        assert!(metrics.hits >= 1);
    }
}
