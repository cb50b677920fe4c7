//! Append-Only Engine: rows are appended to a log-structured sequence of
//! pages; tombstones mark deletions; record ids are monotonic and survive
//! relocation on update (spec.md §4.3).

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::RwLock;

use crate::common::{PageId, StorageRef, TableId, TransactionId};
use crate::error::DbError;
use crate::storage::page_manager::PageManager;
use crate::storage::{EngineMetrics, StorageEngine};
use crate::wal::Wal;
use crate::Result;

pub struct AppendOnlyEngine {
    page_manager: Arc<PageManager>,
    wal: Arc<Wal>,
    next_record_id: AtomicU64,
    /// Current location of each live record, keyed by its permanent id.
    location: RwLock<HashMap<u64, (PageId, u16)>>,
    tombstoned: RwLock<HashSet<u64>>,
    tail_page: RwLock<Option<PageId>>,
    metrics: RwLock<EngineMetrics>,
}

impl AppendOnlyEngine {
    pub fn new(page_manager: Arc<PageManager>, wal: Arc<Wal>) -> Self {
        Self {
            page_manager,
            wal,
            next_record_id: AtomicU64::new(1),
            location: RwLock::new(HashMap::new()),
            tombstoned: RwLock::new(HashSet::new()),
            tail_page: RwLock::new(None),
            metrics: RwLock::new(EngineMetrics::default()),
        }
    }

    fn tail_page(&self) -> Result<PageId> {
        if let Some(page_id) = *self.tail_page.read() {
            return Ok(page_id);
        }
        let page_id = self.page_manager.new_page()?;
        *self.tail_page.write() = Some(page_id);
        tracing::debug!(page_id, "allocated append-only page");
        Ok(page_id)
    }

    fn append_bytes(
        &self,
        txn_id: TransactionId,
        bytes: &[u8],
    ) -> Result<(PageId, u16)> {
        let page_id = self.tail_page()?;
        let mut page = self.page_manager.fetch_page(page_id)?;
        let before = page.data.clone();

        let slot_id = match page.insert_record(bytes) {
            Ok(slot) => slot,
            Err(DbError::CapacityExceeded(_)) => {
                let new_page_id = self.page_manager.new_page()?;
                *self.tail_page.write() = Some(new_page_id);
                let mut fresh = self.page_manager.fetch_page(new_page_id)?;
                let fresh_before = fresh.data.clone();
                let slot = fresh.insert_record(bytes)?;
                let fresh_after = fresh.data.clone();
                self.page_manager.update_page(fresh);
                self.wal
                    .append_write(txn_id, new_page_id, Some(fresh_before), fresh_after)?;
                return Ok((new_page_id, slot));
            }
            Err(e) => return Err(e),
        };

        let after = page.data.clone();
        self.page_manager.update_page(page);
        self.wal.append_write(txn_id, page_id, Some(before), after)?;
        Ok((page_id, slot_id))
    }
}

#[async_trait::async_trait]
impl StorageEngine for AppendOnlyEngine {
    fn begin(&self) -> Result<TransactionId> {
        self.wal.begin()
    }

    async fn commit_async(&self, txn_id: TransactionId) -> Result<()> {
        self.wal.commit_async(txn_id).await
    }

    fn rollback(&self, txn_id: TransactionId) -> Result<()> {
        self.wal.rollback(txn_id)
    }

    fn insert(&self, _table_id: TableId, txn_id: TransactionId, bytes: &[u8]) -> Result<StorageRef> {
        let start = Instant::now();
        let record_id = self.next_record_id.fetch_add(1, Ordering::SeqCst);
        let location = self.append_bytes(txn_id, bytes)?;
        self.location.write().insert(record_id, location);

        let mut metrics = self.metrics.write();
        metrics.record_insert_latency(start.elapsed().as_micros() as f64);
        metrics.bytes_written += bytes.len() as u64;
        Ok(StorageRef::AppendOnly { record_id })
    }

    fn read(&self, _table_id: TableId, storage_ref: StorageRef) -> Result<Option<Vec<u8>>> {
        let StorageRef::AppendOnly { record_id } = storage_ref else {
            return Err(DbError::InvariantViolation(
                "append-only engine given a non-append-only storage ref".to_string(),
            ));
        };
        self.metrics.write().total_reads += 1;
        if self.tombstoned.read().contains(&record_id) {
            return Ok(None);
        }
        let Some(&(page_id, slot_id)) = self.location.read().get(&record_id) else {
            return Ok(None);
        };
        let page = self.page_manager.fetch_page(page_id)?;
        Ok(page.get_record(slot_id))
    }

    /// Appends the new bytes as a fresh record and repoints `record_id` at
    /// it, tombstoning the previous slot. External compaction later
    /// reclaims the orphaned page space (spec.md §4.3).
    fn update(
        &self,
        _table_id: TableId,
        txn_id: TransactionId,
        storage_ref: StorageRef,
        bytes: &[u8],
    ) -> Result<StorageRef> {
        let StorageRef::AppendOnly { record_id } = storage_ref else {
            return Err(DbError::InvariantViolation(
                "append-only engine given a non-append-only storage ref".to_string(),
            ));
        };
        if self.tombstoned.read().contains(&record_id) {
            return Err(DbError::NotFound(format!("record {record_id} is deleted")));
        }

        let old_location = self.location.read().get(&record_id).copied();
        let new_location = self.append_bytes(txn_id, bytes)?;
        self.location.write().insert(record_id, new_location);

        if let Some((old_page_id, old_slot_id)) = old_location {
            let mut old_page = self.page_manager.fetch_page(old_page_id)?;
            let before = old_page.data.clone();
            old_page.delete_record(old_slot_id)?;
            let after = old_page.data.clone();
            self.page_manager.update_page(old_page);
            self.wal.append_write(txn_id, old_page_id, Some(before), after)?;
        }

        self.metrics.write().total_updates += 1;
        Ok(StorageRef::AppendOnly { record_id })
    }

    fn delete(&self, _table_id: TableId, txn_id: TransactionId, storage_ref: StorageRef) -> Result<()> {
        let StorageRef::AppendOnly { record_id } = storage_ref else {
            return Err(DbError::InvariantViolation(
                "append-only engine given a non-append-only storage ref".to_string(),
            ));
        };
        if let Some(&(page_id, slot_id)) = self.location.read().get(&record_id) {
            let mut page = self.page_manager.fetch_page(page_id)?;
            let before = page.data.clone();
            page.delete_record(slot_id)?;
            let after = page.data.clone();
            self.page_manager.update_page(page);
            self.wal.append_write(txn_id, page_id, Some(before), after)?;
        }
        self.tombstoned.write().insert(record_id);
        self.metrics.write().total_deletes += 1;
        Ok(())
    }

    fn metrics(&self) -> EngineMetrics {
        self.metrics.read().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use tempfile::tempdir;

    fn test_engine() -> (AppendOnlyEngine, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let config = EngineConfig {
            data_dir: dir.path().to_string_lossy().to_string(),
            page_size: 512,
            min_extension_pages: 64,
            durability: crate::config::Durability::FullSync,
            ..EngineConfig::default()
        };
        let container = Arc::new(crate::container::Container::open(dir.path().join("data.scdb"), &config).unwrap());
        let page_manager = Arc::new(PageManager::new(container, 16));
        let wal = Arc::new(Wal::open(dir.path(), &config).unwrap());
        (AppendOnlyEngine::new(page_manager, wal), dir)
    }

    #[tokio::test]
    async fn record_ids_are_monotonic() {
        let (engine, _dir) = test_engine();
        let txn = engine.begin().unwrap();
        let StorageRef::AppendOnly { record_id: a } = engine.insert(1, txn, b"a").unwrap() else {
            unreachable!()
        };
        let StorageRef::AppendOnly { record_id: b } = engine.insert(1, txn, b"b").unwrap() else {
            unreachable!()
        };
        assert!(b > a);
        engine.commit_async(txn).await.unwrap();
    }

    #[tokio::test]
    async fn update_preserves_record_id_and_tombstones_the_old_slot() {
        let (engine, _dir) = test_engine();
        let txn = engine.begin().unwrap();
        let r = engine.insert(1, txn, b"v1").unwrap();
        let r2 = engine.update(1, txn, r, b"v2").unwrap();
        assert_eq!(r, r2);
        assert_eq!(engine.read(1, r2).unwrap().unwrap(), b"v2");
        engine.commit_async(txn).await.unwrap();
    }

    #[tokio::test]
    async fn delete_then_read_returns_none() {
        let (engine, _dir) = test_engine();
        let txn = engine.begin().unwrap();
        let r = engine.insert(1, txn, b"gone").unwrap();
        engine.delete(1, txn, r).unwrap();
        assert!(engine.read(1, r).unwrap().is_none());
        engine.commit_async(txn).await.unwrap();
    }
}
