//! Page-Heap Engine: rows live in slotted pages; updates grow in place
//! when they fit, otherwise relocate and leave a forwarding stub
//! (spec.md §4.3).

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use parking_lot::RwLock;

use crate::common::{PageId, StorageRef, TableId, TransactionId};
use crate::error::DbError;
use crate::storage::page_manager::PageManager;
use crate::storage::{EngineMetrics, StorageEngine};
use crate::wal::Wal;
use crate::Result;

pub struct HeapEngine {
    page_manager: Arc<PageManager>,
    wal: Arc<Wal>,
    /// Pages known to belong to each table, in allocation order; the tail
    /// is tried first on insert.
    table_pages: RwLock<HashMap<TableId, Vec<PageId>>>,
    metrics: RwLock<EngineMetrics>,
}

impl HeapEngine {
    pub fn new(page_manager: Arc<PageManager>, wal: Arc<Wal>) -> Self {
        Self {
            page_manager,
            wal,
            table_pages: RwLock::new(HashMap::new()),
            metrics: RwLock::new(EngineMetrics::default()),
        }
    }

    fn tail_page_for(&self, table_id: TableId) -> Result<PageId> {
        let existing_tail = self
            .table_pages
            .read()
            .get(&table_id)
            .and_then(|pages| pages.last().copied());
        if let Some(page_id) = existing_tail {
            return Ok(page_id);
        }
        let page_id = self.page_manager.new_page()?;
        self.table_pages
            .write()
            .entry(table_id)
            .or_default()
            .push(page_id);
        tracing::debug!(table_id, page_id, "allocated heap page");
        Ok(page_id)
    }

    fn log_page_write(
        &self,
        txn_id: TransactionId,
        page_id: PageId,
        before: Vec<u8>,
        after: Vec<u8>,
    ) -> Result<()> {
        self.wal.append_write(txn_id, page_id, Some(before), after)?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl StorageEngine for HeapEngine {
    fn begin(&self) -> Result<TransactionId> {
        self.wal.begin()
    }

    async fn commit_async(&self, txn_id: TransactionId) -> Result<()> {
        self.wal.commit_async(txn_id).await
    }

    fn rollback(&self, txn_id: TransactionId) -> Result<()> {
        self.wal.rollback(txn_id)
    }

    fn insert(&self, table_id: TableId, txn_id: TransactionId, bytes: &[u8]) -> Result<StorageRef> {
        let start = Instant::now();
        let mut page_id = self.tail_page_for(table_id)?;
        let mut page = self.page_manager.fetch_page(page_id)?;
        let before = page.data.clone();

        let slot_id = match page.insert_record(bytes) {
            Ok(slot) => slot,
            Err(DbError::CapacityExceeded(_)) => {
                page_id = self.page_manager.new_page()?;
                self.table_pages
                    .write()
                    .entry(table_id)
                    .or_default()
                    .push(page_id);
                page = self.page_manager.fetch_page(page_id)?;
                page.insert_record(bytes)?
            }
            Err(e) => return Err(e),
        };

        let after = page.data.clone();
        self.page_manager.update_page(page);
        self.log_page_write(txn_id, page_id, before, after)?;

        let mut metrics = self.metrics.write();
        metrics.record_insert_latency(start.elapsed().as_micros() as f64);
        metrics.bytes_written += bytes.len() as u64;
        Ok(StorageRef::PageHeap { page_id, slot_id })
    }

    fn read(&self, _table_id: TableId, storage_ref: StorageRef) -> Result<Option<Vec<u8>>> {
        let StorageRef::PageHeap { page_id, slot_id } = storage_ref else {
            return Err(DbError::InvariantViolation(
                "heap engine given a non-heap storage ref".to_string(),
            ));
        };
        self.metrics.write().total_reads += 1;
        let page = self.page_manager.fetch_page(page_id)?;
        Ok(page.get_record(slot_id))
    }

    fn update(
        &self,
        _table_id: TableId,
        txn_id: TransactionId,
        storage_ref: StorageRef,
        bytes: &[u8],
    ) -> Result<StorageRef> {
        let StorageRef::PageHeap { page_id, slot_id } = storage_ref else {
            return Err(DbError::InvariantViolation(
                "heap engine given a non-heap storage ref".to_string(),
            ));
        };
        let mut page = self.page_manager.fetch_page(page_id)?;
        let before = page.data.clone();
        page.update_record(slot_id, bytes)?;
        let after = page.data.clone();
        self.page_manager.update_page(page);
        self.log_page_write(txn_id, page_id, before, after)?;
        self.metrics.write().total_updates += 1;
        Ok(StorageRef::PageHeap { page_id, slot_id })
    }

    fn delete(&self, _table_id: TableId, txn_id: TransactionId, storage_ref: StorageRef) -> Result<()> {
        let StorageRef::PageHeap { page_id, slot_id } = storage_ref else {
            return Err(DbError::InvariantViolation(
                "heap engine given a non-heap storage ref".to_string(),
            ));
        };
        let mut page = self.page_manager.fetch_page(page_id)?;
        let before = page.data.clone();
        page.delete_record(slot_id)?;
        let after = page.data.clone();
        self.page_manager.update_page(page);
        self.log_page_write(txn_id, page_id, before, after)?;
        self.metrics.write().total_deletes += 1;
        Ok(())
    }

    fn metrics(&self) -> EngineMetrics {
        self.metrics.read().clone()
    }
}
