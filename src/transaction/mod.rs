//! Transaction lifecycle and the write-behind queue (spec.md §4.6).
//!
//! Single-writer, read-committed. There is no lock manager, no MVCC
//! version store, and no distributed coordinator: one transaction runs at
//! a time against the WAL, and concurrent writers serialize on the
//! write-behind queue's lock instead of acquiring per-row locks.

pub mod cancellation;
pub mod manager;
pub mod types;
pub mod write_behind;

pub use cancellation::CancellationToken;
pub use manager::TransactionManager;
pub use types::{Transaction, TransactionState};
pub use write_behind::WriteBehindQueue;
