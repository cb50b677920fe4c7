//! Subquery classification and caching (spec.md §4.8).
//!
//! Correlated subqueries reference an outer table alias and are
//! re-executed per outer row; they are never cached. Non-correlated
//! subqueries run once per outer query and are memoized by their canonical
//! SQL fingerprint until a table they reference mutates.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::common::Row;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubqueryKind {
    Scalar,
    InList,
    Exists,
    FromSubquery,
}

/// A recognized subquery shape plus the outer-table references used to
/// decide correlation and to drive cache invalidation.
#[derive(Debug, Clone)]
pub struct Subquery {
    pub kind: SubqueryKind,
    pub fingerprint: String,
    pub referenced_tables: Vec<String>,
    pub outer_aliases_referenced: Vec<String>,
}

impl Subquery {
    /// Correlated iff it references at least one alias from the enclosing
    /// query rather than only its own FROM clause.
    pub fn is_correlated(&self) -> bool {
        !self.outer_aliases_referenced.is_empty()
    }
}

struct CacheEntry {
    result: Arc<Vec<Row>>,
    referenced_tables: Vec<String>,
}

/// Caches non-correlated subquery results by fingerprint; correlated
/// subqueries bypass this entirely and are executed directly by the
/// caller every time.
#[derive(Default)]
pub struct SubqueryCache {
    entries: RwLock<HashMap<String, CacheEntry>>,
}

impl SubqueryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs `execute` and caches the result under `subquery`'s fingerprint,
    /// unless `subquery` is correlated, in which case it always executes
    /// and never reads or writes the cache.
    pub fn get_or_execute(
        &self,
        subquery: &Subquery,
        execute: impl FnOnce() -> crate::Result<Vec<Row>>,
    ) -> crate::Result<Arc<Vec<Row>>> {
        if subquery.is_correlated() {
            return Ok(Arc::new(execute()?));
        }
        if let Some(entry) = self.entries.read().get(&subquery.fingerprint) {
            return Ok(entry.result.clone());
        }
        let result = Arc::new(execute()?);
        self.entries.write().insert(
            subquery.fingerprint.clone(),
            CacheEntry {
                result: result.clone(),
                referenced_tables: subquery.referenced_tables.clone(),
            },
        );
        Ok(result)
    }

    /// Purges every cached entry whose subquery referenced `table`, called
    /// whenever that table is mutated.
    pub fn invalidate_table(&self, table: &str) {
        self.entries
            .write()
            .retain(|_, entry| !entry.referenced_tables.iter().any(|t| t == table));
    }

    pub fn cached_count(&self) -> usize {
        self.entries.read().len()
    }
}

/// Orders non-correlated subqueries before correlated ones, as spec.md
/// §4.8 requires ("A plan orders non-correlated subqueries first").
pub fn order_for_execution(mut subqueries: Vec<Subquery>) -> Vec<Subquery> {
    subqueries.sort_by_key(|s| s.is_correlated());
    subqueries
}
