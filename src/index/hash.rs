//! Hash secondary index: equality-only lookup keyed by the column's
//! collation hash (spec.md §4.4). Chained via `std::collections::HashMap`
//! bucketed by the collation-normalized encoded key, so NoCase/RTrim/Locale
//! rules fold into the bucket key the same way they fold into `BTreeIndex`'s
//! ordering.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::{Mutex, RwLock};

use crate::collation::Collation;
use crate::common::{StorageRef, Value};
use crate::index::{encode_key, range_unsupported, BuildMode, Index, IndexLoader, IndexStatistics};
use crate::Result;

struct TableState {
    buckets: HashMap<Vec<u8>, Vec<(StorageRef, u64)>>,
    loaded: bool,
    stale: bool,
}

pub struct HashIndex {
    collation: Collation,
    state: RwLock<TableState>,
    build_mode: BuildMode,
    build_guard: Mutex<()>,
    next_seq: AtomicU64,
    loader: IndexLoader,
}

impl HashIndex {
    pub fn new(collation: Collation, build_mode: BuildMode, loader: IndexLoader) -> Self {
        let index = Self {
            collation,
            state: RwLock::new(TableState {
                buckets: HashMap::new(),
                loaded: false,
                stale: false,
            }),
            build_mode,
            build_guard: Mutex::new(()),
            next_seq: AtomicU64::new(0),
            loader,
        };
        if build_mode == BuildMode::Eager {
            let _ = index.ensure_built();
        }
        index
    }

    fn encode(&self, value: &Value) -> Result<Vec<u8>> {
        encode_key(value, &self.collation)
    }

    fn ensure_built(&self) -> Result<()> {
        if self.state.read().loaded && !self.state.read().stale {
            return Ok(());
        }
        let _guard = self.build_guard.lock();
        if self.state.read().loaded && !self.state.read().stale {
            return Ok(());
        }

        let rebuild = self.state.read().loaded;
        let rows = (self.loader)()?;
        let mut buckets: HashMap<Vec<u8>, Vec<(StorageRef, u64)>> = HashMap::new();
        for (value, storage_ref) in rows {
            let key = self.encode(&value)?;
            let seq = self.next_seq.fetch_add(1, Ordering::SeqCst);
            buckets.entry(key).or_default().push((storage_ref, seq));
        }

        tracing::debug!(
            buckets = buckets.len(),
            rebuild,
            "hash index build complete"
        );
        let mut state = self.state.write();
        state.buckets = buckets;
        state.loaded = true;
        state.stale = false;
        Ok(())
    }
}

impl Index for HashIndex {
    fn add(&self, key: &Value, storage_ref: StorageRef) -> Result<()> {
        let mut state = self.state.write();
        if !state.loaded {
            state.stale = true;
            return Ok(());
        }
        drop(state);
        let encoded = self.encode(key)?;
        let seq = self.next_seq.fetch_add(1, Ordering::SeqCst);
        self.state
            .write()
            .buckets
            .entry(encoded)
            .or_default()
            .push((storage_ref, seq));
        Ok(())
    }

    fn remove(&self, key: &Value, storage_ref: StorageRef) -> Result<bool> {
        let mut state = self.state.write();
        if !state.loaded {
            state.stale = true;
            return Ok(false);
        }
        let encoded = self.encode(key)?;
        let Some(bucket) = state.buckets.get_mut(&encoded) else {
            return Ok(false);
        };
        let before = bucket.len();
        bucket.retain(|(r, _)| *r != storage_ref);
        let removed = bucket.len() < before;
        if bucket.is_empty() {
            state.buckets.remove(&encoded);
        }
        Ok(removed)
    }

    fn find(&self, key: &Value) -> Result<Vec<StorageRef>> {
        self.ensure_built()?;
        let encoded = self.encode(key)?;
        let state = self.state.read();
        Ok(match state.buckets.get(&encoded) {
            Some(bucket) => {
                let mut sorted = bucket.clone();
                sorted.sort_by_key(|(_, seq)| *seq);
                sorted.into_iter().map(|(r, _)| r).collect()
            }
            None => Vec::new(),
        })
    }

    /// Hash indexes answer equality only; range probes are rejected so a
    /// caller can fall back to a scan or a B-tree index rather than
    /// silently getting an unordered partial answer (spec.md §4.4).
    fn find_range(&self, _start: Option<&Value>, _end: Option<&Value>) -> Result<Vec<StorageRef>> {
        Err(range_unsupported())
    }

    fn statistics(&self) -> IndexStatistics {
        let state = self.state.read();
        let entry_count = state.buckets.values().map(|b| b.len()).sum();
        IndexStatistics {
            entry_count,
            distinct_keys: state.buckets.len(),
            is_stale: state.stale,
            height: None,
        }
    }

    fn clear(&self) -> Result<()> {
        let mut state = self.state.write();
        state.buckets.clear();
        state.loaded = true;
        state.stale = false;
        Ok(())
    }

    fn mark_stale(&self) {
        self.state.write().stale = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn empty_loader() -> IndexLoader {
        Arc::new(|| Ok(Vec::new()))
    }

    fn eager(collation: Collation) -> HashIndex {
        HashIndex::new(collation, BuildMode::Eager, empty_loader())
    }

    fn page_ref(id: u32) -> StorageRef {
        StorageRef::PageHeap {
            page_id: id,
            slot_id: 0,
        }
    }

    #[test]
    fn equality_lookup_finds_all_duplicates() {
        let idx = eager(Collation::Binary);
        idx.add(&Value::Text("alice".into()), page_ref(1)).unwrap();
        idx.add(&Value::Text("alice".into()), page_ref(2)).unwrap();
        assert_eq!(
            idx.find(&Value::Text("alice".into())).unwrap(),
            vec![page_ref(1), page_ref(2)]
        );
    }

    #[test]
    fn nocase_collation_matches_regardless_of_case() {
        let idx = eager(Collation::NoCase);
        idx.add(&Value::Text("Alice".into()), page_ref(1)).unwrap();
        assert_eq!(
            idx.find(&Value::Text("ALICE".into())).unwrap(),
            vec![page_ref(1)]
        );
    }

    #[test]
    fn range_probe_is_rejected() {
        let idx = eager(Collation::Binary);
        let err = idx
            .find_range(Some(&Value::Integer(1)), Some(&Value::Integer(2)))
            .unwrap_err();
        assert!(matches!(err, crate::error::DbError::InvariantViolation(_)));
    }

    #[test]
    fn remove_reports_whether_an_entry_existed() {
        let idx = eager(Collation::Binary);
        idx.add(&Value::Integer(1), page_ref(1)).unwrap();
        assert!(idx.remove(&Value::Integer(1), page_ref(1)).unwrap());
        assert!(!idx.remove(&Value::Integer(1), page_ref(1)).unwrap());
    }
}
