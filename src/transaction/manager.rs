//! Transaction lifecycle: a thin layer over `crate::wal::Wal` tracking
//! which transactions are currently active, with no lock manager or
//! version store behind it (spec.md §4.6).

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::common::TransactionId;
use crate::error::DbError;
use crate::transaction::cancellation::{run_cancellable, CancellationToken};
use crate::transaction::types::{Transaction, TransactionState};
use crate::wal::Wal;
use crate::Result;

pub struct TransactionManager {
    wal: Arc<Wal>,
    active: RwLock<HashMap<TransactionId, Transaction>>,
}

impl TransactionManager {
    pub fn new(wal: Arc<Wal>) -> Self {
        Self {
            wal,
            active: RwLock::new(HashMap::new()),
        }
    }

    pub fn begin(&self) -> Result<TransactionId> {
        let txn_id = self.wal.begin()?;
        self.active.write().insert(txn_id, Transaction::new(txn_id));
        Ok(txn_id)
    }

    pub async fn commit(&self, txn_id: TransactionId) -> Result<()> {
        self.require_active(txn_id)?;
        self.wal.commit_async(txn_id).await?;
        if let Some(txn) = self.active.write().get_mut(&txn_id) {
            txn.state = TransactionState::Committed;
        }
        self.active.write().remove(&txn_id);
        Ok(())
    }

    /// As `commit`, but races the WAL flush against `token`. If the token
    /// fires first, the flush keeps running in the background (it is never
    /// aborted mid-write) and the caller gets `Cancelled` rather than
    /// waiting for it (spec.md §5).
    pub async fn commit_cancellable(
        &self,
        txn_id: TransactionId,
        token: &CancellationToken,
    ) -> Result<()> {
        self.require_active(txn_id)?;
        let wal = self.wal.clone();
        run_cancellable(token, async move { wal.commit_async(txn_id).await }).await?;
        if let Some(txn) = self.active.write().get_mut(&txn_id) {
            txn.state = TransactionState::Committed;
        }
        self.active.write().remove(&txn_id);
        Ok(())
    }

    pub fn rollback(&self, txn_id: TransactionId) -> Result<()> {
        self.require_active(txn_id)?;
        self.wal.rollback(txn_id)?;
        self.active.write().remove(&txn_id);
        Ok(())
    }

    pub fn is_active(&self, txn_id: TransactionId) -> bool {
        self.active
            .read()
            .get(&txn_id)
            .map(Transaction::is_active)
            .unwrap_or(false)
    }

    pub fn active_count(&self) -> usize {
        self.active.read().len()
    }

    fn require_active(&self, txn_id: TransactionId) -> Result<()> {
        if self.is_active(txn_id) {
            Ok(())
        } else {
            Err(DbError::NotFound(format!(
                "transaction {txn_id} is not active"
            )))
        }
    }
}
