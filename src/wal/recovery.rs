//! Crash recovery: read the segment from its durable head, discard a torn
//! tail, and replay committed writes in LSN order (spec.md §4.5 steps 1-4).

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};

use crc32fast::Hasher as Crc32;
use std::collections::{HashMap, HashSet};

use crate::common::{Lsn, PageId};

use super::{FramedRecord, LogRecord};

pub struct RecoveryResult {
    /// Byte length of the valid (non-torn) prefix of the segment; the
    /// caller truncates the file to this length.
    pub valid_length: u64,
    /// Highest LSN observed in the valid prefix, so the WAL can resume
    /// numbering without reusing an LSN.
    pub max_lsn: Lsn,
    /// Redo set: the latest after-image per page from every committed
    /// transaction, in LSN order.
    pub committed_writes: Vec<(PageId, Vec<u8>)>,
}

/// Scans every frame from the start of the file, verifying each frame's
/// checksum and length, and stops at the first inconsistency (a torn
/// write). Committed transactions are those with a matching `Commit` not
/// followed by an `Abort`; their `Write` records are replayed, last image
/// per page wins.
pub fn recover(file: &mut File) -> std::io::Result<RecoveryResult> {
    file.seek(SeekFrom::Start(0))?;
    let mut cursor: u64 = 0;
    let mut max_lsn: Lsn = 0;
    let mut frames: Vec<FramedRecord> = Vec::new();

    loop {
        let mut len_buf = [0u8; 4];
        if file.read_exact(&mut len_buf).is_err() {
            break;
        }
        let mut checksum_buf = [0u8; 4];
        if file.read_exact(&mut checksum_buf).is_err() {
            tracing::warn!(offset = cursor, "truncating torn WAL tail (missing checksum)");
            break;
        }
        let len = u32::from_le_bytes(len_buf) as usize;
        let mut payload = vec![0u8; len];
        if file.read_exact(&mut payload).is_err() {
            tracing::warn!(offset = cursor, "truncating torn WAL tail (short payload)");
            break;
        }

        let mut hasher = Crc32::new();
        hasher.update(&payload);
        let expected = u32::from_le_bytes(checksum_buf);
        if hasher.finalize() != expected {
            tracing::warn!(offset = cursor, "truncating torn WAL tail (checksum mismatch)");
            break;
        }

        let framed: FramedRecord = match bincode::deserialize(&payload) {
            Ok(f) => f,
            Err(_) => {
                tracing::warn!(offset = cursor, "truncating torn WAL tail (undecodable record)");
                break;
            }
        };

        cursor += 4 + 4 + len as u64;
        max_lsn = max_lsn.max(framed.lsn);
        frames.push(framed);
    }

    tracing::debug!(
        frames = frames.len(),
        valid_length = cursor,
        "WAL recovery scan complete"
    );

    let mut committed = HashSet::new();
    let mut aborted = HashSet::new();
    for frame in &frames {
        match &frame.record {
            LogRecord::Commit { txn_id } => {
                committed.insert(*txn_id);
            }
            LogRecord::Abort { txn_id } => {
                aborted.insert(*txn_id);
            }
            _ => {}
        }
    }
    for txn_id in &aborted {
        committed.remove(txn_id);
    }

    let mut latest_by_page: HashMap<PageId, (Lsn, Vec<u8>)> = HashMap::new();
    for frame in &frames {
        if let LogRecord::Write {
            txn_id,
            page_id,
            after_image,
            ..
        } = &frame.record
        {
            if committed.contains(txn_id) {
                let entry = latest_by_page.entry(*page_id).or_insert((0, Vec::new()));
                if frame.lsn >= entry.0 {
                    *entry = (frame.lsn, after_image.clone());
                }
            }
        }
    }

    let mut committed_writes: Vec<(PageId, Vec<u8>)> = latest_by_page
        .into_iter()
        .map(|(page_id, (_, bytes))| (page_id, bytes))
        .collect();
    committed_writes.sort_by_key(|(page_id, _)| *page_id);

    Ok(RecoveryResult {
        valid_length: cursor,
        max_lsn,
        committed_writes,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::TransactionId;
    use std::io::Write;
    use tempfile::tempfile;

    fn append_frame(file: &mut File, lsn: Lsn, record: LogRecord) {
        let framed = FramedRecord { lsn, record };
        let payload = bincode::serialize(&framed).unwrap();
        let mut hasher = Crc32::new();
        hasher.update(&payload);
        let checksum = hasher.finalize();
        file.write_all(&(payload.len() as u32).to_le_bytes()).unwrap();
        file.write_all(&checksum.to_le_bytes()).unwrap();
        file.write_all(&payload).unwrap();
    }

    #[test]
    fn replays_only_committed_writes() {
        let mut file = tempfile().unwrap();
        let txn: TransactionId = 1;
        append_frame(&mut file, 1, LogRecord::Begin { txn_id: txn });
        append_frame(
            &mut file,
            2,
            LogRecord::Write {
                txn_id: txn,
                page_id: 7,
                before_image: None,
                after_image: vec![1, 2, 3],
                undo_next_lsn: None,
            },
        );
        append_frame(&mut file, 3, LogRecord::Commit { txn_id: txn });

        let result = recover(&mut file).unwrap();
        assert_eq!(result.committed_writes, vec![(7, vec![1, 2, 3])]);
        assert_eq!(result.max_lsn, 3);
    }

    #[test]
    fn uncommitted_transaction_writes_are_discarded() {
        let mut file = tempfile().unwrap();
        let txn: TransactionId = 1;
        append_frame(&mut file, 1, LogRecord::Begin { txn_id: txn });
        append_frame(
            &mut file,
            2,
            LogRecord::Write {
                txn_id: txn,
                page_id: 7,
                before_image: None,
                after_image: vec![9],
                undo_next_lsn: None,
            },
        );

        let result = recover(&mut file).unwrap();
        assert!(result.committed_writes.is_empty());
    }

    #[test]
    fn torn_tail_is_truncated_and_prior_records_survive() {
        let mut file = tempfile().unwrap();
        let txn: TransactionId = 1;
        append_frame(&mut file, 1, LogRecord::Begin { txn_id: txn });
        append_frame(&mut file, 2, LogRecord::Commit { txn_id: txn });
        let valid_len = file.stream_position().unwrap();

        file.write_all(&[0xAB; 3]).unwrap();

        let result = recover(&mut file).unwrap();
        assert_eq!(result.valid_length, valid_len);
    }
}
