//! Block registry: the name → location directory for every block stored in
//! an SCDB container, with the batched-flush policy spec.md §4.1 calls out
//! as throughput-critical.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::container::allocator::Extent;
use crate::error::DbError;
use crate::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BlockKind {
    Table,
    Index,
    Metadata,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryEntry {
    pub kind: BlockKind,
    pub offset: u64,
    pub length: u64,
    /// Pages reserved for this block at the time it was (re)allocated. Always
    /// `>= length.div_ceil(page_size)`, but may exceed it for a block that
    /// has since shrunk in place — `length` alone cannot be used to recover
    /// how much space is actually reserved at `offset`.
    pub allocated_pages: u64,
    pub checksum: [u8; 32],
}

/// In-memory registry plus the {dirtyEntryCount, lastFlushTime} bookkeeping
/// that decides when to persist it (spec.md §4.1).
pub struct BlockRegistry {
    entries: HashMap<String, RegistryEntry>,
    dirty_entry_count: usize,
    last_flush_time: Instant,
    flush_threshold: usize,
    flush_interval: Duration,
}

impl BlockRegistry {
    pub fn new(flush_threshold: usize, flush_interval_ms: u64) -> Self {
        Self {
            entries: HashMap::new(),
            dirty_entry_count: 0,
            last_flush_time: Instant::now(),
            flush_threshold,
            flush_interval: Duration::from_millis(flush_interval_ms),
        }
    }

    pub fn load(
        entries: HashMap<String, RegistryEntry>,
        flush_threshold: usize,
        flush_interval_ms: u64,
    ) -> Self {
        Self {
            entries,
            dirty_entry_count: 0,
            last_flush_time: Instant::now(),
            flush_threshold,
            flush_interval: Duration::from_millis(flush_interval_ms),
        }
    }

    pub fn entries(&self) -> &HashMap<String, RegistryEntry> {
        &self.entries
    }

    pub fn get(&self, name: &str) -> Option<&RegistryEntry> {
        self.entries.get(name)
    }

    /// Inserts/replaces an entry and marks the registry dirty. Does not
    /// flush — callers check `should_flush` to decide whether to persist.
    pub fn put(&mut self, name: impl Into<String>, entry: RegistryEntry) {
        self.entries.insert(name.into(), entry);
        self.dirty_entry_count += 1;
    }

    /// Removes an entry, returning the extent it occupied so the caller can
    /// return it to the allocator.
    pub fn remove(&mut self, name: &str, page_size: u64) -> Result<Extent> {
        let entry = self
            .entries
            .remove(name)
            .ok_or_else(|| DbError::NotFound(format!("block '{name}'")))?;
        self.dirty_entry_count += 1;
        Ok(Extent {
            start_page: entry.offset / page_size,
            length_pages: entry.allocated_pages,
        })
    }

    pub fn names(&self) -> impl Iterator<Item = &String> {
        self.entries.keys()
    }

    /// True when dirty count or elapsed time has crossed the configured
    /// threshold; an explicit `flush()` call bypasses this and flushes
    /// unconditionally.
    pub fn should_flush(&self) -> bool {
        self.dirty_entry_count >= self.flush_threshold
            || self.last_flush_time.elapsed() >= self.flush_interval
    }

    pub fn mark_flushed(&mut self) {
        self.dirty_entry_count = 0;
        self.last_flush_time = Instant::now();
    }

    pub fn dirty_entry_count(&self) -> usize {
        self.dirty_entry_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(offset: u64) -> RegistryEntry {
        RegistryEntry {
            kind: BlockKind::Table,
            offset,
            length: 4096,
            allocated_pages: 1,
            checksum: [0u8; 32],
        }
    }

    #[test]
    fn should_flush_once_dirty_count_crosses_threshold() {
        let mut reg = BlockRegistry::new(2, 60_000);
        assert!(!reg.should_flush());
        reg.put("a", entry(0));
        assert!(!reg.should_flush());
        reg.put("b", entry(4096));
        assert!(reg.should_flush());
    }

    #[test]
    fn mark_flushed_resets_dirty_count() {
        let mut reg = BlockRegistry::new(1, 60_000);
        reg.put("a", entry(0));
        assert!(reg.should_flush());
        reg.mark_flushed();
        assert_eq!(reg.dirty_entry_count(), 0);
        assert!(!reg.should_flush());
    }

    #[test]
    fn remove_returns_the_freed_extent_in_pages() {
        let mut reg = BlockRegistry::new(200, 60_000);
        reg.put("a", entry(4096));
        let extent = reg.remove("a", 4096).unwrap();
        assert_eq!(extent.start_page, 1);
        assert_eq!(extent.length_pages, 1);
    }

    #[test]
    fn remove_unknown_block_fails_with_not_found() {
        let mut reg = BlockRegistry::new(200, 60_000);
        assert!(matches!(reg.remove("missing", 4096), Err(DbError::NotFound(_))));
    }
}
