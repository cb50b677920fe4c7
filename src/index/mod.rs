//! Secondary index layer: an ordered B-tree index and an equality-only hash
//! index, both keyed by collation-aware encoded bytes so comparisons never
//! need to know the underlying column type at lookup time (spec.md §4.4).

pub mod btree;
pub mod hash;

pub use btree::BTreeIndex;
pub use hash::HashIndex;

use serde::{Deserialize, Serialize};

use crate::collation::Collation;
use crate::common::{StorageRef, Value};
use crate::error::DbError;
use crate::Result;

/// Whether an index populates itself at construction (`Eager`) or the first
/// time it's probed (`Lazy`), per spec.md §3's index lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildMode {
    Lazy,
    Eager,
}

/// A full table scan the index calls to (re)build itself. Supplied by
/// whoever owns both the index and the storage engine it indexes, since an
/// index borrows the engine only for this purpose (spec.md §3).
pub type IndexLoader = std::sync::Arc<dyn Fn() -> Result<Vec<(Value, StorageRef)>> + Send + Sync>;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IndexStatistics {
    pub entry_count: usize,
    pub distinct_keys: usize,
    pub is_stale: bool,
    pub height: Option<usize>,
}

/// Common contract for both index kinds (spec.md §4.4).
pub trait Index: Send + Sync {
    fn add(&self, key: &Value, storage_ref: StorageRef) -> Result<()>;
    /// Exact removal of one `(key, storageReference)` pair; returns whether
    /// a matching entry was found (spec.md §4.4).
    fn remove(&self, key: &Value, storage_ref: StorageRef) -> Result<bool>;
    fn find(&self, key: &Value) -> Result<Vec<StorageRef>>;

    /// Ordered indexes return matches in key order; unordered ones (hash)
    /// reject range probes outright rather than silently scanning.
    fn find_range(&self, start: Option<&Value>, end: Option<&Value>) -> Result<Vec<StorageRef>>;

    fn statistics(&self) -> IndexStatistics;
    fn clear(&self) -> Result<()>;

    /// Marks the index for rebuild on next probe, without touching it now.
    fn mark_stale(&self);
}

/// Encodes a `Value` into bytes that sort and hash the way the column's
/// collation demands. Non-text types ignore the collation and use a
/// type-tagged, order-preserving encoding; `Text` routes through
/// `Collation::sort_key_bytes` so NoCase/RTrim/Locale rules apply to both
/// the B-tree's ordering and the hash index's equality.
pub fn encode_key(value: &Value, collation: &Collation) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(9);
    match value {
        Value::Null => out.push(0),
        Value::Boolean(b) => {
            out.push(1);
            out.push(*b as u8);
        }
        Value::Integer(i) => {
            out.push(2);
            out.extend_from_slice(&order_preserving_i64(*i));
        }
        Value::Real(r) => {
            out.push(3);
            out.extend_from_slice(&order_preserving_f64(*r));
        }
        Value::Decimal(unscaled, scale) => {
            out.push(4);
            out.push(*scale);
            out.extend_from_slice(&order_preserving_i64(*unscaled));
        }
        Value::Text(s) => {
            out.push(5);
            out.extend(collation.sort_key_bytes(s)?);
        }
        Value::Blob(b) => {
            out.push(6);
            out.extend_from_slice(b);
        }
        Value::DateTime(t) => {
            out.push(7);
            out.extend_from_slice(&order_preserving_i64(*t));
        }
    }
    Ok(out)
}

/// Flips the sign bit so two's-complement `i64`s compare correctly as
/// unsigned big-endian byte strings.
fn order_preserving_i64(i: i64) -> [u8; 8] {
    ((i as u64) ^ (1u64 << 63)).to_be_bytes()
}

/// Standard IEEE-754 order-preserving transform: flip all bits for
/// negatives, flip only the sign bit for non-negatives.
fn order_preserving_f64(f: f64) -> [u8; 8] {
    let bits = f.to_bits();
    let flipped = if bits & (1u64 << 63) != 0 {
        !bits
    } else {
        bits | (1u64 << 63)
    };
    flipped.to_be_bytes()
}

pub(crate) fn range_unsupported() -> DbError {
    DbError::InvariantViolation("range probes are not supported by this index kind".to_string())
}
