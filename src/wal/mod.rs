//! Write-ahead log: ARIES-style physiological records, the three durability
//! modes, group commit, checkpointing, and crash recovery (spec.md §4.5).

pub mod group_commit;
pub mod recovery;

use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crc32fast::Hasher as Crc32;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::common::{Lsn, PageId, TransactionId};
use crate::config::{Durability, EngineConfig};
use crate::error::DbError;
use crate::Result;

use group_commit::GroupCommitWriter;

/// ARIES-style physiological log record. `Write` carries the before-image
/// (for rollback) and the after-image (for redo) of one page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum LogRecord {
    Begin {
        txn_id: TransactionId,
    },
    Write {
        txn_id: TransactionId,
        page_id: PageId,
        before_image: Option<Vec<u8>>,
        after_image: Vec<u8>,
        undo_next_lsn: Option<Lsn>,
    },
    Commit {
        txn_id: TransactionId,
    },
    Abort {
        txn_id: TransactionId,
    },
    Checkpoint {
        up_to_lsn: Lsn,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct FramedRecord {
    lsn: Lsn,
    record: LogRecord,
}

/// One append-only segment file per engine instance, identified by a UUID
/// so multiple in-process handles never collide on the same segment name
/// (spec.md §4.5, §5).
pub struct Wal {
    segment_path: PathBuf,
    instance_id: Uuid,
    file: Arc<Mutex<File>>,
    next_lsn: AtomicU64,
    durability: Durability,
    group_commit: GroupCommitWriter,
    active_txns: RwLock<HashMap<TransactionId, Vec<Lsn>>>,
    next_txn_id: AtomicU64,
    recovered_writes: Mutex<Vec<(PageId, Vec<u8>)>>,
}

impl Wal {
    /// Opens this instance's own fresh segment after first recovering and
    /// retiring any segment an earlier, uncleanly-terminated instance left
    /// behind in `data_dir` (spec.md §4.5 step 1, I3). A segment still held
    /// by a live instance fails `lock_exclusive` and is left untouched.
    pub fn open(data_dir: impl AsRef<Path>, config: &EngineConfig) -> Result<Self> {
        std::fs::create_dir_all(&data_dir)?;

        let mut recovered_writes = Vec::new();
        let mut max_lsn: Lsn = 0;
        for abandoned in Self::abandoned_segments(data_dir.as_ref())? {
            let mut file = match OpenOptions::new().read(true).write(true).open(&abandoned) {
                Ok(file) => file,
                Err(_) => continue,
            };
            if crate::platform::lock_exclusive(&file).is_err() {
                continue; // still owned by a live instance
            }
            tracing::info!(segment = %abandoned.display(), "recovering orphaned WAL segment");
            let recovery = recovery::recover(&mut file)?;
            max_lsn = max_lsn.max(recovery.max_lsn);
            recovered_writes.extend(recovery.committed_writes);
            drop(file);
            let _ = std::fs::remove_file(&abandoned);
        }

        let instance_id = Uuid::new_v4();
        let segment_path = data_dir
            .as_ref()
            .join(format!("wal-{instance_id}.log"));
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(&segment_path)?;
        crate::platform::lock_exclusive(&file)?;

        let own_recovery = recovery::recover(&mut file)?;
        max_lsn = max_lsn.max(own_recovery.max_lsn);
        recovered_writes.extend(own_recovery.committed_writes);
        file.set_len(own_recovery.valid_length)?;
        file.seek(SeekFrom::Start(own_recovery.valid_length))?;

        tracing::info!(
            instance_id = %instance_id,
            durability = ?config.durability,
            redo_set_size = recovered_writes.len(),
            "WAL segment opened"
        );

        Ok(Self {
            segment_path,
            instance_id,
            file: Arc::new(Mutex::new(file)),
            next_lsn: AtomicU64::new(max_lsn + 1),
            durability: config.durability,
            group_commit: GroupCommitWriter::new(
                config.group_commit_batch_size,
                config.group_commit_timeout_ms,
            ),
            active_txns: RwLock::new(HashMap::new()),
            next_txn_id: AtomicU64::new(1),
            recovered_writes: Mutex::new(recovered_writes),
        })
    }

    /// Drains the redo set discovered at startup; the owning `Database`
    /// applies these page images to the storage layer once, before serving
    /// any query.
    pub fn take_recovered_writes(&self) -> Vec<(PageId, Vec<u8>)> {
        std::mem::take(&mut self.recovered_writes.lock())
    }

    pub fn begin(&self) -> Result<TransactionId> {
        let txn_id = self.next_txn_id.fetch_add(1, Ordering::SeqCst);
        self.append(LogRecord::Begin { txn_id })?;
        self.active_txns.write().insert(txn_id, Vec::new());
        Ok(txn_id)
    }

    /// Logs one page's before/after images under `txn_id`. The write is
    /// durable only once `commit_async` returns per the engine's
    /// durability mode.
    pub fn append_write(
        &self,
        txn_id: TransactionId,
        page_id: PageId,
        before_image: Option<Vec<u8>>,
        after_image: Vec<u8>,
    ) -> Result<Lsn> {
        let lsn = self.append(LogRecord::Write {
            txn_id,
            page_id,
            before_image,
            after_image,
            undo_next_lsn: None,
        })?;
        if let Some(lsns) = self.active_txns.write().get_mut(&txn_id) {
            lsns.push(lsn);
        }
        Ok(lsn)
    }

    fn append(&self, record: LogRecord) -> Result<Lsn> {
        let lsn = self.next_lsn.fetch_add(1, Ordering::SeqCst);
        let framed = FramedRecord { lsn, record };
        let payload = bincode::serialize(&framed)
            .map_err(|e| DbError::Internal(format!("wal record encode failed: {e}")))?;
        let mut hasher = Crc32::new();
        hasher.update(&payload);
        let checksum = hasher.finalize();

        let mut file = self.file.lock();
        file.seek(SeekFrom::End(0))?;
        file.write_all(&(payload.len() as u32).to_le_bytes())?;
        file.write_all(&checksum.to_le_bytes())?;
        file.write_all(&payload)?;
        Ok(lsn)
    }

    /// Flushes per the configured durability mode and returns once the
    /// commit record (and, for `FullSync`/`GroupCommit`, the backing file)
    /// is durable.
    pub async fn commit_async(&self, txn_id: TransactionId) -> Result<()> {
        self.append(LogRecord::Commit { txn_id })?;
        self.active_txns.write().remove(&txn_id);
        match self.durability {
            Durability::FullSync => self.sync()?,
            Durability::GroupCommit => {
                let file = self.file.clone();
                self.group_commit
                    .join_batch(move || {
                        file.lock().sync_data()?;
                        Ok(())
                    })
                    .await?
            }
            Durability::Async => {}
        }
        Ok(())
    }

    /// Logs an `Abort` record; the caller is responsible for reverting its
    /// own in-memory dirty pages from the before-images it holds.
    pub fn rollback(&self, txn_id: TransactionId) -> Result<()> {
        self.append(LogRecord::Abort { txn_id })?;
        self.active_txns.write().remove(&txn_id);
        Ok(())
    }

    fn sync(&self) -> Result<()> {
        self.file.lock().sync_data()?;
        Ok(())
    }

    /// Writes a `Checkpoint` record covering every LSN so far and syncs it.
    /// Draining dirty pages into the data region is the caller's
    /// responsibility (the owning `Database`), since the WAL itself doesn't
    /// hold a reference to the data region; the caller must complete that
    /// drain (and durably flush it) before calling `truncate_after_checkpoint`,
    /// or a crash between the two would lose pages this segment no longer
    /// has a redo record for.
    pub fn checkpoint(&self) -> Result<()> {
        let up_to_lsn = self.next_lsn.load(Ordering::SeqCst).saturating_sub(1);
        self.append(LogRecord::Checkpoint { up_to_lsn })?;
        tracing::info!(up_to_lsn, "WAL checkpoint written");
        self.sync()
    }

    /// Truncates the segment to empty. Only safe once every write covered
    /// by the just-written checkpoint is durably reflected in the data
    /// region (spec.md §4.5's "the WAL is drained into the data region and
    /// truncated"). `next_lsn` keeps counting from its in-memory value, so
    /// LSNs assigned after truncation are never reused.
    pub fn truncate_after_checkpoint(&self) -> Result<()> {
        let mut file = self.file.lock();
        file.set_len(0)?;
        file.seek(SeekFrom::Start(0))?;
        tracing::info!("WAL segment truncated after checkpoint");
        Ok(())
    }

    pub fn instance_id(&self) -> Uuid {
        self.instance_id
    }

    pub fn segment_path(&self) -> &Path {
        &self.segment_path
    }

    /// Deletes the segment file on clean shutdown (spec.md §4.5 step 5).
    pub fn remove_segment(&self) -> Result<()> {
        match std::fs::remove_file(&self.segment_path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
