//! Error taxonomy for the engine. Every public API returns `crate::Result<T>`;
//! nothing in the storage/index/WAL/executor layers swallows an error.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Wrong magic, wrong version, or a malformed super-header.
    #[error("format mismatch: {0}")]
    FormatMismatch(String),

    /// Checksum mismatch, or a torn WAL record past the durable head.
    #[error("corruption detected: {0}")]
    Corruption(String),

    /// Registry full, page full, or the allocator couldn't extend the file.
    #[error("capacity exceeded: {0}")]
    CapacityExceeded(String),

    /// Unknown block, table, index, or column.
    #[error("not found: {0}")]
    NotFound(String),

    /// Duplicate PK, duplicate unique-index key, or duplicate table/index
    /// without `IF NOT EXISTS`.
    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// Wrong logical type probed against an index, type-incompatible
    /// update, or a NOT NULL breach.
    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    /// A deadline elapsed (e.g. group-commit flush). The operation's
    /// durability is undefined — callers must treat it as unknown outcome.
    #[error("timeout: {0}")]
    Timeout(String),

    /// A cancellation token fired before the operation completed.
    #[error("cancelled: {0}")]
    Cancelled(String),

    /// Another process already holds the container file open.
    #[error("exclusive lock failed: {0}")]
    ExclusiveLockFailed(String),

    /// Locale tag is well-formed but the engine has no culture table for it.
    #[error("unknown locale: {0}")]
    UnknownLocale(String),

    /// SQL validator rejected a dangerous pattern in Strict mode, a
    /// required parameter was missing in Strict mode, or parameter styles
    /// were mixed within one statement.
    #[error("security: {0}")]
    Security(String),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, DbError>;
