//! Transaction state: single-writer, read-committed only. No isolation
//! levels, locking, or versioning beyond what `crate::wal::Wal` already
//! provides (spec.md §4.6's explicit non-goals: no MVCC, no snapshot
//! isolation, no distributed coordinator).

use crate::common::{unix_time_now, TransactionId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    Active,
    Committed,
    Aborted,
}

/// A live or finished transaction handle. `Transaction` itself carries no
/// lock set or version chain; the WAL is the only source of truth for what
/// it wrote (spec.md §4.5, §4.6).
#[derive(Debug, Clone)]
pub struct Transaction {
    pub id: TransactionId,
    pub state: TransactionState,
    pub started_at: i64,
}

impl Transaction {
    pub fn new(id: TransactionId) -> Self {
        Self {
            id,
            state: TransactionState::Active,
            started_at: unix_time_now(),
        }
    }

    pub fn is_active(&self) -> bool {
        self.state == TransactionState::Active
    }
}
