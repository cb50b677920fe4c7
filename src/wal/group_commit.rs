//! Group-commit batching: callers park on a completion handle, one elected
//! writer drains the queue and issues a single flush, then wakes every
//! parked caller in insertion order (spec.md §4.5).

use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::{oneshot, Notify};

use crate::error::DbError;
use crate::Result;

#[derive(Default)]
struct BatchState {
    waiters: Vec<oneshot::Sender<std::result::Result<(), String>>>,
}

pub struct GroupCommitWriter {
    batch_size: usize,
    timeout: Duration,
    state: Mutex<BatchState>,
    notify: Notify,
}

impl GroupCommitWriter {
    pub fn new(batch_size: usize, timeout_ms: u64) -> Self {
        Self {
            batch_size: batch_size.max(1),
            timeout: Duration::from_millis(timeout_ms.max(1)),
            state: Mutex::new(BatchState::default()),
            notify: Notify::new(),
        }
    }

    /// Joins the current batch. The first caller to join an empty batch is
    /// elected the serializing writer for that batch: it waits for either
    /// `batch_size` joiners or the collection deadline, then runs `flush`
    /// exactly once and wakes every parked caller (including itself) in
    /// insertion order.
    ///
    /// The configured timeout serves two distinct purposes (spec.md §4.5
    /// and §5): it bounds how long the elected writer waits to collect more
    /// joiners before flushing whatever it has (never an error — a lone
    /// caller still gets flushed), and separately it bounds how long *any*
    /// caller, elected or not, will wait for its own flush to actually
    /// complete. If that second deadline elapses before the flush returns,
    /// the call fails with `DbError::Timeout` and the record's durability
    /// is undefined, per spec.md §5.
    pub async fn join_batch<F>(&self, flush: F) -> Result<()>
    where
        F: FnOnce() -> Result<()> + Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let elected = {
            let mut state = self.state.lock();
            state.waiters.push(tx);
            state.waiters.len() == 1
        };

        if !elected {
            self.notify.notify_waiters();
            return match tokio::time::timeout(self.timeout, rx).await {
                Ok(Ok(Ok(()))) => Ok(()),
                Ok(Ok(Err(msg))) => Err(DbError::Internal(msg)),
                Ok(Err(_)) => Err(DbError::Internal("group commit channel closed".to_string())),
                Err(_) => Err(DbError::Timeout(
                    "group commit deadline elapsed before this caller's batch flushed".to_string(),
                )),
            };
        }

        let collect_deadline = tokio::time::sleep(self.timeout);
        tokio::pin!(collect_deadline);
        loop {
            if self.state.lock().waiters.len() >= self.batch_size {
                break;
            }
            tokio::select! {
                _ = &mut collect_deadline => break,
                _ = self.notify.notified() => continue,
            }
        }

        let waiters = std::mem::take(&mut self.state.lock().waiters);

        // The loop above only bounds how long the elected writer waits to
        // collect more joiners; the flush itself runs on a blocking task so
        // a stalled disk sync can be raced against its own deadline instead
        // of hanging every parked caller indefinitely.
        match tokio::time::timeout(self.timeout, tokio::task::spawn_blocking(flush)).await {
            Ok(Ok(result)) => {
                let outcome: std::result::Result<(), String> =
                    result.as_ref().map(|_| ()).map_err(|e| e.to_string());
                for waiter in waiters {
                    let _ = waiter.send(outcome.clone());
                }
                result
            }
            Ok(Err(join_err)) => {
                let msg = format!("group commit flush task failed: {join_err}");
                for waiter in waiters {
                    let _ = waiter.send(Err(msg.clone()));
                }
                Err(DbError::Internal(msg))
            }
            Err(_elapsed) => {
                let msg = "group commit deadline elapsed before flush completed".to_string();
                for waiter in waiters {
                    let _ = waiter.send(Err(msg.clone()));
                }
                Err(DbError::Timeout(msg))
            }
        }
    }
}
