//! Table schema registry. Not a source of DDL (the SQL parser producing
//! `CREATE TABLE` calls against this API is a collaborator out of scope for
//! this crate) but the storage/index/executor layers all bind against the
//! `Schema` it hands back, so it has to exist as a concrete in-memory
//! registry rather than be assumed away.

use crate::collation::Collation;
use crate::common::{ColumnOrdinal, TableId};
use crate::error::DbError;
use crate::Result;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogicalType {
    Integer,
    Real,
    Decimal,
    Text,
    Blob,
    DateTime,
    Boolean,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    pub logical_type: LogicalType,
    pub nullable: bool,
    pub auto_increment: bool,
    pub collation: Collation,
    pub is_primary_key: bool,
}

impl Column {
    pub fn new(name: impl Into<String>, logical_type: LogicalType) -> Self {
        Self {
            name: name.into(),
            logical_type,
            nullable: true,
            auto_increment: false,
            collation: Collation::Binary,
            is_primary_key: false,
        }
    }

    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    pub fn primary_key(mut self) -> Self {
        self.is_primary_key = true;
        self.nullable = false;
        self
    }

    pub fn auto_increment(mut self) -> Self {
        self.auto_increment = true;
        self
    }

    pub fn with_collation(mut self, collation: Collation) -> Self {
        self.collation = collation;
        self
    }
}

/// Ordered column sequence plus the PK position, with a stable `TableId`.
/// Column ordinals never change for the life of the table (spec.md §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Schema {
    pub table_id: TableId,
    pub name: String,
    pub columns: Vec<Column>,
}

impl Schema {
    pub fn column_index(&self, name: &str) -> Option<ColumnOrdinal> {
        self.columns
            .iter()
            .position(|c| c.name == name)
            .map(|i| i as ColumnOrdinal)
    }

    pub fn primary_key_index(&self) -> Option<ColumnOrdinal> {
        self.columns
            .iter()
            .position(|c| c.is_primary_key)
            .map(|i| i as ColumnOrdinal)
    }

    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }
}

/// In-memory table registry. Exactly zero or one PK column per table is
/// enforced at `create_table` time, not left to the caller to uphold.
#[derive(Clone)]
pub struct Catalog {
    next_table_id: Arc<AtomicU32>,
    tables: Arc<RwLock<HashMap<String, Schema>>>,
}

impl Catalog {
    pub fn new() -> Self {
        Self {
            next_table_id: Arc::new(AtomicU32::new(1)),
            tables: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn create_table(&self, name: impl Into<String>, columns: Vec<Column>) -> Result<Schema> {
        let name = name.into();
        let mut tables = self.tables.write();
        if tables.contains_key(&name) {
            return Err(DbError::AlreadyExists(format!("table '{name}'")));
        }

        let pk_count = columns.iter().filter(|c| c.is_primary_key).count();
        if pk_count > 1 {
            return Err(DbError::InvariantViolation(format!(
                "table '{name}' declares {pk_count} primary key columns, at most one is allowed"
            )));
        }

        let schema = Schema {
            table_id: self.next_table_id.fetch_add(1, Ordering::SeqCst),
            name: name.clone(),
            columns,
        };
        tables.insert(name, schema.clone());
        Ok(schema)
    }

    pub fn get_table(&self, name: &str) -> Result<Schema> {
        self.tables
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| DbError::NotFound(format!("table '{name}'")))
    }

    /// Removes the table from the registry. Retiring its pages to the
    /// free-extent allocator and dropping its indexes is the caller's
    /// (the owning `Database`'s) responsibility, since the catalog doesn't
    /// hold a reference to the storage engine (spec.md §3 ownership rules).
    pub fn drop_table(&self, name: &str, if_exists: bool) -> Result<Option<Schema>> {
        let removed = self.tables.write().remove(name);
        if removed.is_none() && !if_exists {
            return Err(DbError::NotFound(format!("table '{name}'")));
        }
        Ok(removed)
    }

    pub fn add_column(&self, table: &str, column: Column) -> Result<Schema> {
        let mut tables = self.tables.write();
        let schema = tables
            .get_mut(table)
            .ok_or_else(|| DbError::NotFound(format!("table '{table}'")))?;
        if schema.columns.iter().any(|c| c.name == column.name) {
            return Err(DbError::AlreadyExists(format!(
                "column '{}' on table '{table}'",
                column.name
            )));
        }
        schema.columns.push(column);
        Ok(schema.clone())
    }

    pub fn list_tables(&self) -> Vec<String> {
        self.tables.read().keys().cloned().collect()
    }
}

impl Default for Catalog {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn users_columns() -> Vec<Column> {
        vec![
            Column::new("id", LogicalType::Integer).primary_key().auto_increment(),
            Column::new("name", LogicalType::Text).with_collation(Collation::NoCase),
        ]
    }

    #[test]
    fn create_then_get_round_trips_schema() -> Result<()> {
        let catalog = Catalog::new();
        let created = catalog.create_table("users", users_columns())?;
        let loaded = catalog.get_table("users")?;
        assert_eq!(loaded.table_id, created.table_id);
        assert_eq!(loaded.columns.len(), 2);
        assert_eq!(loaded.primary_key_index(), Some(0));
        Ok(())
    }

    #[test]
    fn duplicate_table_name_fails() {
        let catalog = Catalog::new();
        catalog.create_table("users", users_columns()).unwrap();
        let err = catalog.create_table("users", users_columns()).unwrap_err();
        assert!(matches!(err, DbError::AlreadyExists(_)));
    }

    #[test]
    fn more_than_one_primary_key_is_rejected() {
        let catalog = Catalog::new();
        let columns = vec![
            Column::new("a", LogicalType::Integer).primary_key(),
            Column::new("b", LogicalType::Integer).primary_key(),
        ];
        let err = catalog.create_table("t", columns).unwrap_err();
        assert!(matches!(err, DbError::InvariantViolation(_)));
    }

    #[test]
    fn drop_table_if_exists_is_idempotent() -> Result<()> {
        let catalog = Catalog::new();
        catalog.create_table("users", users_columns())?;
        catalog.drop_table("users", false)?;
        assert!(catalog.drop_table("users", true)?.is_none());
        assert!(catalog.drop_table("users", false).is_err());
        Ok(())
    }
}
