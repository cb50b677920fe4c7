// # Common Types and Traits
//
// Shared types and lifecycle traits used across the container, storage,
// index, WAL, and executor layers. Keeps inter-module contracts in one
// place instead of scattering identical type aliases per module.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::Result;

pub mod limits {
    //! Collection size limits that bound in-memory structures derived from
    //! on-disk or caller-supplied data, so a corrupt file or a pathological
    //! query can't grow a `Vec`/`HashMap` without bound.

    /// Maximum number of columns per table (prevents schema bloat).
    pub const MAX_COLUMNS_PER_TABLE: usize = 1024;

    /// Maximum number of values in a row (mirrors column count).
    pub const MAX_ROW_VALUES: usize = MAX_COLUMNS_PER_TABLE;

    /// Maximum number of entries the query-text cache may hold regardless
    /// of configured size (hard ceiling under `queryCacheSize`).
    pub const MAX_QUERY_CACHE_SIZE: usize = 1_000_000;

    /// Maximum length of an error message string.
    pub const MAX_ERROR_MESSAGE_LENGTH: usize = 4096;
}

/// Current wall-clock time as Unix seconds, used only for header/metadata
/// timestamps (never for ordering — `Lsn`/`TransactionId` own that).
pub fn unix_time_now() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

// ============================================================================
// Identifiers
// ============================================================================

/// Log Sequence Number: strictly increasing per WAL instance.
pub type Lsn = u64;

/// Transaction identifier, unique within one engine instance's lifetime.
pub type TransactionId = u64;

/// Page number within a container's data region.
pub type PageId = u32;

/// Stable identifier for a table in the catalog.
pub type TableId = u32;

/// Stable identifier for an index in the catalog.
pub type IndexId = u32;

/// Column ordinal within a table; stable for the table's lifetime.
pub type ColumnOrdinal = u16;

// ============================================================================
// Values
// ============================================================================

/// A single column value. `Null` sorts before every other variant and two
/// `Null`s compare equal, matching the collation rules in `crate::collation`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Value {
    Null,
    Boolean(bool),
    Integer(i64),
    Real(f64),
    Decimal(i64, u8),
    Text(String),
    Blob(Vec<u8>),
    DateTime(i64),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "NULL",
            Value::Boolean(_) => "BOOLEAN",
            Value::Integer(_) => "INTEGER",
            Value::Real(_) => "REAL",
            Value::Decimal(..) => "DECIMAL",
            Value::Text(_) => "TEXT",
            Value::Blob(_) => "BLOB",
            Value::DateTime(_) => "DATETIME",
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s.as_str()),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Boolean(b) => write!(f, "{b}"),
            Value::Integer(i) => write!(f, "{i}"),
            Value::Real(r) => write!(f, "{r}"),
            Value::Decimal(unscaled, scale) => write!(f, "{unscaled}e-{scale}"),
            Value::Text(s) => write!(f, "{s}"),
            Value::Blob(b) => write!(f, "<{} bytes>", b.len()),
            Value::DateTime(t) => write!(f, "@{t}"),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Boolean(a), Value::Boolean(b)) => a == b,
            (Value::Integer(a), Value::Integer(b)) => a == b,
            (Value::Real(a), Value::Real(b)) => a.to_bits() == b.to_bits(),
            (Value::Decimal(a, sa), Value::Decimal(b, sb)) => a == b && sa == sb,
            (Value::Text(a), Value::Text(b)) => a == b,
            (Value::Blob(a), Value::Blob(b)) => a == b,
            (Value::DateTime(a), Value::DateTime(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Value {}

/// Binary ordering used as the default / fallback comparator where no
/// column collation applies (e.g. comparing non-text values). Text-to-text
/// comparison under a specific collation goes through `crate::collation`
/// instead of this impl.
impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Value::Null, Value::Null) => Some(Ordering::Equal),
            (Value::Null, _) => Some(Ordering::Less),
            (_, Value::Null) => Some(Ordering::Greater),
            (Value::Boolean(a), Value::Boolean(b)) => a.partial_cmp(b),
            (Value::Integer(a), Value::Integer(b)) => a.partial_cmp(b),
            (Value::Real(a), Value::Real(b)) => a.partial_cmp(b),
            (Value::Decimal(a, sa), Value::Decimal(b, sb)) if sa == sb => a.partial_cmp(b),
            (Value::Text(a), Value::Text(b)) => a.partial_cmp(b),
            (Value::Blob(a), Value::Blob(b)) => a.partial_cmp(b),
            (Value::DateTime(a), Value::DateTime(b)) => a.partial_cmp(b),
            _ => None,
        }
    }
}

// ============================================================================
// Rows
// ============================================================================

/// Canonical row form: values addressed by column ordinal.
pub type Row = Vec<Value>;

/// A row paired with a shared name→ordinal map, so by-name access (used by
/// the compiled WHERE-filter closures in `crate::executor`) costs a hash
/// lookup rather than a schema walk per access.
#[derive(Debug, Clone)]
pub struct IndexedRow {
    values: Row,
    ordinals: Arc<HashMap<String, usize>>,
}

impl IndexedRow {
    pub fn new(values: Row, ordinals: Arc<HashMap<String, usize>>) -> Self {
        Self { values, ordinals }
    }

    pub fn get(&self, ordinal: usize) -> Option<&Value> {
        self.values.get(ordinal)
    }

    pub fn get_by_name(&self, name: &str) -> Option<&Value> {
        self.ordinals.get(name).and_then(|&i| self.values.get(i))
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn into_row(self) -> Row {
        self.values
    }
}

/// Builds the name→ordinal map once per table; callers share the `Arc`
/// across every row produced for a scan instead of rebuilding it per row.
pub fn build_ordinal_map(column_names: &[String]) -> Arc<HashMap<String, usize>> {
    Arc::new(
        column_names
            .iter()
            .enumerate()
            .map(|(i, name)| (name.clone(), i))
            .collect(),
    )
}

// ============================================================================
// Storage references
// ============================================================================

/// Opaque handle returned by a storage engine identifying one row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StorageRef {
    /// (pageId, slotId) pair in a page-heap table.
    PageHeap { page_id: PageId, slot_id: u16 },
    /// Monotonic record id in an append-only table.
    AppendOnly { record_id: u64 },
}

// ============================================================================
// Component lifecycle
// ============================================================================

/// Health status surfaced by `Database::health_check` for observability;
/// aggregates the Container/Page Manager/Storage Engine/WAL snapshots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

/// Base lifecycle trait implemented by every major subsystem (Container,
/// PageManager, storage engines, Wal) so `Database` can drive bootstrap and
/// shutdown uniformly instead of hand-sequencing each one.
pub trait Component: Send + Sync {
    fn shutdown(&mut self) -> Result<()>;
    fn health_check(&self) -> HealthStatus;
}

/// Components that participate in crash recovery.
pub trait Recoverable: Component {
    fn checkpoint(&self) -> Result<()>;
    fn recover(&mut self, since_lsn: Lsn) -> Result<()>;
}

/// A single named metric sample, collected into `ComponentStatistics`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum MetricValue {
    Counter(u64),
    Gauge(f64),
}

/// Per-component metrics snapshot, assembled by `Database::metrics()`.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ComponentStatistics {
    pub component_name: String,
    pub total_operations: u64,
    pub failed_operations: u64,
    pub avg_latency_micros: f64,
    pub custom: HashMap<String, MetricValue>,
}

impl ComponentStatistics {
    pub fn new(component_name: impl Into<String>) -> Self {
        Self {
            component_name: component_name.into(),
            ..Default::default()
        }
    }
}

/// Moving average helper shared by every component's latency metric, so
/// each doesn't hand-roll the same `(count, sum)` bookkeeping.
#[derive(Debug, Clone, Copy, Default)]
pub struct LatencyAverage {
    count: u64,
    total: Duration,
}

impl LatencyAverage {
    pub fn record(&mut self, sample: Duration) {
        self.count += 1;
        self.total += sample;
    }

    pub fn average_micros(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.total.as_secs_f64() * 1_000_000.0 / self.count as f64
        }
    }

    pub fn count(&self) -> u64 {
        self.count
    }
}
