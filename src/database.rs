//! The top-level engine handle: wires the Container, Page Manager, the two
//! storage engines, the catalog, the WAL, and the transaction pipeline into
//! one thing an embedder opens once (not named by spec.md's distillation;
//! see SPEC_FULL.md's "SUPPLEMENTED FEATURES").

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::catalog::Catalog;
use crate::common::{
    Component, ComponentStatistics, HealthStatus, MetricValue, Row, StorageRef, TableId,
    TransactionId,
};
use crate::config::EngineConfig;
use crate::container::Container;
use crate::error::DbError;
use crate::index::{encode_key, Index};
use crate::storage::append_only::AppendOnlyEngine;
use crate::storage::heap::HeapEngine;
use crate::storage::page_manager::PageManager;
use crate::storage::StorageEngine;
use crate::transaction::{TransactionManager, WriteBehindQueue};
use crate::wal::Wal;
use crate::Result;

/// Aggregated snapshot across every subsystem, assembled fresh on each call
/// rather than kept as a running total anywhere (spec.md's ambient
/// observability, grounded in `common::Component`).
#[derive(Debug, Clone)]
pub struct EngineMetrics {
    pub components: Vec<ComponentStatistics>,
}

pub struct Database {
    container: Arc<Container>,
    page_manager: Arc<PageManager>,
    wal: Arc<Wal>,
    catalog: Catalog,
    heap: Arc<HeapEngine>,
    append_only: Arc<AppendOnlyEngine>,
    transactions: TransactionManager,
    write_behind: WriteBehindQueue,
    indexes: RwLock<HashMap<String, Arc<dyn Index>>>,
    /// Index names (by the `"<table>.<column>"` convention) that enforce
    /// uniqueness: the primary key plus any index registered via
    /// `register_unique_index` (spec.md invariant I5).
    unique_index_names: RwLock<HashSet<String>>,
    /// Encoded primary-key bytes currently live per table, so PK uniqueness
    /// is enforced even before a PK index has ever been registered or
    /// probed (spec.md invariant I5, "inserting two rows whose PK values
    /// are K-equal fails with AlreadyExists").
    pk_keys: RwLock<HashMap<TableId, HashSet<Vec<u8>>>>,
}

impl Database {
    /// Opens (or creates) the container at `path`, replays the WAL's redo
    /// set into the page cache, and returns a handle ready to serve
    /// queries. No component above the Container is usable until this
    /// returns (spec.md §2's recovery-before-use ordering).
    pub fn open(path: impl AsRef<Path>, config: &EngineConfig) -> Result<Self> {
        config.validate()?;
        let container = Arc::new(Container::open(path, config)?);
        let page_manager = Arc::new(PageManager::new(container.clone(), config.cache_size_pages));
        let wal = Arc::new(Wal::open(&config.data_dir, config)?);

        let redo_writes = wal.take_recovered_writes();
        let redo_count = redo_writes.len();
        for (page_id, bytes) in redo_writes {
            container.write_raw_page(page_id, &bytes)?;
        }

        let heap = Arc::new(HeapEngine::new(page_manager.clone(), wal.clone()));
        let append_only = Arc::new(AppendOnlyEngine::new(page_manager.clone(), wal.clone()));
        let transactions = TransactionManager::new(wal.clone());
        let write_behind = WriteBehindQueue::new(page_manager.clone());

        tracing::info!(redo_count, "database opened");
        Ok(Self {
            container,
            page_manager,
            wal,
            catalog: Catalog::default(),
            heap,
            append_only,
            transactions,
            write_behind,
            indexes: RwLock::new(HashMap::new()),
            unique_index_names: RwLock::new(HashSet::new()),
            pk_keys: RwLock::new(HashMap::new()),
        })
    }

    pub fn container(&self) -> &Arc<Container> {
        &self.container
    }

    pub fn page_manager(&self) -> &Arc<PageManager> {
        &self.page_manager
    }

    pub fn wal(&self) -> &Arc<Wal> {
        &self.wal
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn heap_engine(&self) -> &Arc<HeapEngine> {
        &self.heap
    }

    pub fn append_only_engine(&self) -> &Arc<AppendOnlyEngine> {
        &self.append_only
    }

    pub fn transactions(&self) -> &TransactionManager {
        &self.transactions
    }

    pub fn write_behind(&self) -> &WriteBehindQueue {
        &self.write_behind
    }

    /// Registers a secondary index under `name` (conventionally
    /// `"<table>.<column>"`), so executor code can look it up by name when
    /// routing a recognized range predicate.
    pub fn register_index(&self, name: impl Into<String>, index: Arc<dyn Index>) {
        self.indexes.write().insert(name.into(), index);
    }

    pub fn index(&self, name: &str) -> Option<Arc<dyn Index>> {
        self.indexes.read().get(name).cloned()
    }

    /// Registers a secondary index and marks it as enforcing uniqueness:
    /// `insert_row` rejects any non-null value the index already has an
    /// entry for with `DbError::AlreadyExists` (spec.md invariant I5).
    pub fn register_unique_index(&self, name: impl Into<String>, index: Arc<dyn Index>) {
        let name = name.into();
        self.unique_index_names.write().insert(name.clone());
        self.register_index(name, index);
    }

    /// Row-level write path above the raw heap engine: encodes `row`,
    /// rejects it with `AlreadyExists` if it collides with the table's
    /// primary key or any registered unique index, inserts it, then keeps
    /// every registered index for the table in sync (spec.md §4.3's
    /// `insert`, generalized to enforce §3's PK-uniqueness invariant that
    /// `HeapEngine::insert` itself has no schema knowledge to check).
    pub fn insert_row(&self, table: &str, txn_id: TransactionId, row: Row) -> Result<StorageRef> {
        let schema = self.catalog.get_table(table)?;
        if row.len() != schema.columns.len() {
            return Err(DbError::InvariantViolation(format!(
                "row has {} values, table '{table}' has {} columns",
                row.len(),
                schema.columns.len()
            )));
        }

        let pk_entry = match schema.primary_key_index() {
            Some(ord) if !row[ord as usize].is_null() => {
                let column = &schema.columns[ord as usize];
                let key = encode_key(&row[ord as usize], &column.collation)?;
                let mut pk_keys = self.pk_keys.write();
                let table_keys = pk_keys.entry(schema.table_id).or_default();
                if table_keys.contains(&key) {
                    return Err(DbError::AlreadyExists(format!(
                        "row with primary key '{}' already exists in table '{table}'",
                        row[ord as usize]
                    )));
                }
                Some(key)
            }
            _ => None,
        };

        for (ordinal, column) in schema.columns.iter().enumerate() {
            let index_name = format!("{table}.{}", column.name);
            if !self.unique_index_names.read().contains(&index_name) {
                continue;
            }
            let value = &row[ordinal];
            if value.is_null() {
                continue;
            }
            if let Some(index) = self.index(&index_name) {
                if !index.find(value)?.is_empty() {
                    return Err(DbError::AlreadyExists(format!(
                        "duplicate value for unique column '{}' on table '{table}'",
                        column.name
                    )));
                }
            }
        }

        let bytes = bincode::serialize(&row)
            .map_err(|e| DbError::Internal(format!("row encode failed: {e}")))?;
        let storage_ref = self.heap.insert(schema.table_id, txn_id, &bytes)?;

        if let Some(key) = pk_entry {
            self.pk_keys
                .write()
                .entry(schema.table_id)
                .or_default()
                .insert(key);
        }
        for (ordinal, column) in schema.columns.iter().enumerate() {
            let index_name = format!("{table}.{}", column.name);
            if let Some(index) = self.index(&index_name) {
                index.add(&row[ordinal], storage_ref)?;
            }
        }

        Ok(storage_ref)
    }

    /// Deletes a row, removing it from the PK-uniqueness set and every
    /// registered index for its table so the same key can be reinserted
    /// afterward — the counterpart `insert_row` needs to avoid a one-way
    /// uniqueness ratchet.
    pub fn delete_row(&self, table: &str, txn_id: TransactionId, storage_ref: StorageRef) -> Result<()> {
        let schema = self.catalog.get_table(table)?;
        if let Some(bytes) = self.heap.read(schema.table_id, storage_ref)? {
            let row: Row = bincode::deserialize(&bytes)
                .map_err(|e| DbError::Internal(format!("row decode failed: {e}")))?;

            if let Some(ord) = schema.primary_key_index() {
                let value = &row[ord as usize];
                if !value.is_null() {
                    let column = &schema.columns[ord as usize];
                    let key = encode_key(value, &column.collation)?;
                    if let Some(keys) = self.pk_keys.write().get_mut(&schema.table_id) {
                        keys.remove(&key);
                    }
                }
            }
            for (ordinal, column) in schema.columns.iter().enumerate() {
                let index_name = format!("{table}.{}", column.name);
                if let Some(index) = self.index(&index_name) {
                    index.remove(&row[ordinal], storage_ref)?;
                }
            }
        }
        self.heap.delete(schema.table_id, txn_id, storage_ref)
    }

    /// Drains the write-behind queue and every dirty page-cache frame into
    /// the data region, durably flushes the container, writes a WAL
    /// checkpoint record, and only then truncates the WAL segment — in
    /// that order, so a crash mid-checkpoint always leaves a redo record
    /// for any page not yet durable (spec.md §4.5).
    pub fn checkpoint(&self) -> Result<()> {
        self.write_behind.flush()?;
        self.page_manager.flush_all()?;
        self.container.flush()?;
        self.wal.checkpoint()?;
        self.wal.truncate_after_checkpoint()?;
        tracing::info!("database checkpoint complete");
        Ok(())
    }

    /// Clean shutdown: drains the write-behind queue, flushes every dirty
    /// page, flushes the container, and removes the WAL segment since
    /// nothing is left to recover (spec.md §4.5 step 5).
    pub fn shutdown(&self) -> Result<()> {
        self.write_behind.flush()?;
        self.page_manager.flush_all()?;
        self.container.flush()?;
        let result = self.wal.remove_segment();
        tracing::info!("database shutdown complete");
        result
    }

    pub fn metrics(&self) -> EngineMetrics {
        let cache = self.page_manager.metrics();
        let mut cache_stats = ComponentStatistics::new("page_manager");
        cache_stats
            .custom
            .insert("hits".to_string(), MetricValue::Counter(cache.hits));
        cache_stats
            .custom
            .insert("misses".to_string(), MetricValue::Counter(cache.misses));
        cache_stats.custom.insert(
            "hit_rate".to_string(),
            MetricValue::Gauge(cache.hit_rate()),
        );

        let heap_metrics = self.heap.metrics();
        let mut heap_stats = ComponentStatistics::new("heap_engine");
        heap_stats.total_operations = heap_metrics.total_inserts
            + heap_metrics.total_updates
            + heap_metrics.total_deletes
            + heap_metrics.total_reads;
        heap_stats.avg_latency_micros = heap_metrics.average_insert_latency_micros();

        let append_metrics = self.append_only.metrics();
        let mut append_stats = ComponentStatistics::new("append_only_engine");
        append_stats.total_operations = append_metrics.total_inserts
            + append_metrics.total_updates
            + append_metrics.total_deletes
            + append_metrics.total_reads;
        append_stats.avg_latency_micros = append_metrics.average_insert_latency_micros();

        EngineMetrics {
            components: vec![cache_stats, heap_stats, append_stats],
        }
    }

    pub fn health_check(&self) -> HealthStatus {
        if self.container.total_free_pages() == 0 && self.page_manager.cached_count() == 0 {
            HealthStatus::Degraded
        } else {
            HealthStatus::Healthy
        }
    }
}

impl Component for Database {
    fn shutdown(&mut self) -> Result<()> {
        Database::shutdown(self)
    }

    fn health_check(&self) -> HealthStatus {
        Database::health_check(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn config(dir: &Path) -> EngineConfig {
        EngineConfig {
            data_dir: dir.to_string_lossy().to_string(),
            page_size: 256,
            min_extension_pages: 8,
            ..EngineConfig::default()
        }
    }

    #[test]
    fn open_creates_a_fresh_container_and_wal() {
        let dir = tempdir().unwrap();
        let db = Database::open(dir.path().join("data.scdb"), &config(dir.path())).unwrap();
        assert_eq!(db.health_check(), HealthStatus::Healthy);
    }

    #[test]
    fn checkpoint_and_shutdown_do_not_error_on_an_empty_database() {
        let dir = tempdir().unwrap();
        let db = Database::open(dir.path().join("data.scdb"), &config(dir.path())).unwrap();
        db.checkpoint().unwrap();
        db.shutdown().unwrap();
    }

    #[test]
    fn registered_index_is_retrievable_by_name() {
        use crate::collation::Collation;
        use crate::index::{BTreeIndex, BuildMode};
        use std::sync::Arc;

        let dir = tempdir().unwrap();
        let db = Database::open(dir.path().join("data.scdb"), &config(dir.path())).unwrap();
        let index = Arc::new(BTreeIndex::new(
            Collation::Binary,
            BuildMode::Eager,
            Arc::new(|| Ok(Vec::new())),
        ));
        db.register_index("users.id", index);
        assert!(db.index("users.id").is_some());
        assert!(db.index("users.name").is_none());
    }

    fn users_schema(db: &Database) {
        use crate::catalog::{Column, LogicalType};
        db.catalog()
            .create_table(
                "users",
                vec![
                    Column::new("id", LogicalType::Integer).primary_key(),
                    Column::new("name", LogicalType::Text),
                ],
            )
            .unwrap();
    }

    #[tokio::test]
    async fn duplicate_primary_key_value_is_rejected() {
        use crate::common::Value;

        let dir = tempdir().unwrap();
        let db = Database::open(dir.path().join("data.scdb"), &config(dir.path())).unwrap();
        users_schema(&db);

        let txn = db.heap_engine().begin().unwrap();
        db.insert_row("users", txn, vec![Value::Integer(1), Value::Text("Alice".into())])
            .unwrap();
        let err = db
            .insert_row("users", txn, vec![Value::Integer(1), Value::Text("Bob".into())])
            .unwrap_err();
        assert!(matches!(err, DbError::AlreadyExists(_)));
        db.heap_engine().commit_async(txn).await.unwrap();
    }

    #[tokio::test]
    async fn deleting_a_row_frees_its_primary_key_for_reuse() {
        use crate::common::Value;

        let dir = tempdir().unwrap();
        let db = Database::open(dir.path().join("data.scdb"), &config(dir.path())).unwrap();
        users_schema(&db);

        let txn = db.heap_engine().begin().unwrap();
        let storage_ref = db
            .insert_row("users", txn, vec![Value::Integer(1), Value::Text("Alice".into())])
            .unwrap();
        db.delete_row("users", txn, storage_ref).unwrap();
        db.insert_row("users", txn, vec![Value::Integer(1), Value::Text("Bob".into())])
            .unwrap();
        db.heap_engine().commit_async(txn).await.unwrap();
    }

    #[tokio::test]
    async fn duplicate_value_on_a_registered_unique_index_is_rejected() {
        use crate::collation::Collation;
        use crate::common::Value;
        use crate::index::{BTreeIndex, BuildMode};

        let dir = tempdir().unwrap();
        let db = Database::open(dir.path().join("data.scdb"), &config(dir.path())).unwrap();
        use crate::catalog::{Column, LogicalType};
        db.catalog()
            .create_table(
                "users",
                vec![
                    Column::new("id", LogicalType::Integer),
                    Column::new("email", LogicalType::Text),
                ],
            )
            .unwrap();
        let index = Arc::new(BTreeIndex::new(
            Collation::Binary,
            BuildMode::Eager,
            Arc::new(|| Ok(Vec::new())),
        ));
        db.register_unique_index("users.email", index);

        let txn = db.heap_engine().begin().unwrap();
        db.insert_row(
            "users",
            txn,
            vec![Value::Integer(1), Value::Text("a@example.com".into())],
        )
        .unwrap();
        let err = db
            .insert_row(
                "users",
                txn,
                vec![Value::Integer(2), Value::Text("a@example.com".into())],
            )
            .unwrap_err();
        assert!(matches!(err, DbError::AlreadyExists(_)));
        db.heap_engine().commit_async(txn).await.unwrap();
    }

    #[test]
    fn checkpoint_truncates_the_wal_segment() {
        let dir = tempdir().unwrap();
        let db = Database::open(dir.path().join("data.scdb"), &config(dir.path())).unwrap();
        let txn = db.heap_engine().begin().unwrap();
        db.heap_engine().insert(1, txn, b"row").unwrap();

        let segment = db.wal().segment_path().to_path_buf();
        assert!(std::fs::metadata(&segment).unwrap().len() > 0);

        db.checkpoint().unwrap();
        assert_eq!(std::fs::metadata(&segment).unwrap().len(), 0);
    }
}
