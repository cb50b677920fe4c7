//! Storage layer: the slotted page format, the LRU page cache, and the two
//! interchangeable row-storage engines (spec.md §4.2, §4.3).

pub mod append_only;
pub mod checksum;
pub mod heap;
pub mod page;
pub mod page_manager;

use serde::{Deserialize, Serialize};

use crate::common::{StorageRef, TableId, TransactionId};
use crate::Result;

/// Metrics every storage engine publishes identically (spec.md §4.3).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineMetrics {
    pub total_inserts: u64,
    pub total_updates: u64,
    pub total_deletes: u64,
    pub total_reads: u64,
    pub bytes_written: u64,
    avg_insert_latency_micros_sum: f64,
    avg_insert_latency_samples: u64,
}

impl EngineMetrics {
    pub fn record_insert_latency(&mut self, micros: f64) {
        self.total_inserts += 1;
        self.avg_insert_latency_samples += 1;
        self.avg_insert_latency_micros_sum += micros;
    }

    pub fn average_insert_latency_micros(&self) -> f64 {
        if self.avg_insert_latency_samples == 0 {
            0.0
        } else {
            self.avg_insert_latency_micros_sum / self.avg_insert_latency_samples as f64
        }
    }
}

/// Common contract both the page-heap and append-only engines implement
/// (spec.md §4.3). Mutating calls take the caller's transaction id so the
/// engine can log before/after images to the WAL ahead of applying them.
#[async_trait::async_trait]
pub trait StorageEngine: Send + Sync {
    fn begin(&self) -> Result<TransactionId>;
    async fn commit_async(&self, txn_id: TransactionId) -> Result<()>;
    fn rollback(&self, txn_id: TransactionId) -> Result<()>;

    fn insert(&self, table_id: TableId, txn_id: TransactionId, bytes: &[u8]) -> Result<StorageRef>;
    fn read(&self, table_id: TableId, storage_ref: StorageRef) -> Result<Option<Vec<u8>>>;
    fn update(
        &self,
        table_id: TableId,
        txn_id: TransactionId,
        storage_ref: StorageRef,
        bytes: &[u8],
    ) -> Result<StorageRef>;
    fn delete(&self, table_id: TableId, txn_id: TransactionId, storage_ref: StorageRef) -> Result<()>;

    fn insert_batch(
        &self,
        table_id: TableId,
        txn_id: TransactionId,
        items: &[Vec<u8>],
    ) -> Result<Vec<StorageRef>> {
        items
            .iter()
            .map(|bytes| self.insert(table_id, txn_id, bytes))
            .collect()
    }

    fn metrics(&self) -> EngineMetrics;
}
