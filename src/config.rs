//! Engine-wide configuration surface: exactly the options spec'd for the
//! storage layer (no SQL-surface options — those belong to the parser
//! layer this crate is consumed by).

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Durability {
    /// Every commit flushes file contents and metadata before returning.
    FullSync,
    /// Commits batch up to `group_commit_batch_size` or a deadline.
    GroupCommit,
    /// Flush runs out-of-band; commit returns once the record is appended.
    Async,
}

impl Default for Durability {
    fn default() -> Self {
        Durability::FullSync
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AllocationStrategy {
    FirstFit,
    BestFit,
    WorstFit,
}

impl Default for AllocationStrategy {
    fn default() -> Self {
        AllocationStrategy::BestFit
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StorageMode {
    SingleFile,
    Directory,
}

impl Default for StorageMode {
    fn default() -> Self {
        StorageMode::SingleFile
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SqlValidation {
    Disabled,
    Lenient,
    Strict,
}

impl Default for SqlValidation {
    fn default() -> Self {
        SqlValidation::Lenient
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    pub data_dir: String,
    pub page_size: usize,
    pub cache_size_pages: usize,
    pub durability: Durability,
    pub group_commit_batch_size: usize,
    /// Deadline for a parked group-commit caller. Not named by the source
    /// system (see DESIGN.md, Open Questions); exposed explicitly here
    /// alongside the batch size rather than left implicit.
    pub group_commit_timeout_ms: u64,
    pub allocation_strategy: AllocationStrategy,
    pub enable_encryption: bool,
    pub enable_query_cache: bool,
    pub query_cache_size: usize,
    pub storage_mode: StorageMode,
    pub strict_parameter_validation: bool,
    pub sql_validation: SqlValidation,
    /// File growth floor in pages when no free extent fits a request.
    pub min_extension_pages: u64,
    /// Registry dirty-entry count that triggers a batched flush.
    pub registry_flush_threshold: usize,
    /// Registry periodic flush interval.
    pub registry_flush_interval_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            data_dir: "./data".to_string(),
            page_size: 4096,
            cache_size_pages: 1024,
            durability: Durability::default(),
            group_commit_batch_size: 10,
            group_commit_timeout_ms: 5,
            allocation_strategy: AllocationStrategy::default(),
            enable_encryption: false,
            enable_query_cache: true,
            query_cache_size: 1024,
            storage_mode: StorageMode::default(),
            strict_parameter_validation: false,
            sql_validation: SqlValidation::default(),
            min_extension_pages: 2560,
            registry_flush_threshold: 200,
            registry_flush_interval_ms: 500,
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> crate::Result<()> {
        if !self.page_size.is_power_of_two() || self.page_size < 512 || self.page_size > 65536 {
            return Err(crate::DbError::InvariantViolation(format!(
                "page_size must be a power of two in [512, 65536], got {}",
                self.page_size
            )));
        }
        Ok(())
    }
}
