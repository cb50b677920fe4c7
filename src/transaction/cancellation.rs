//! Cooperative cancellation for `*Async` suspension points (spec.md §5).
//!
//! Every `*Async` operation may suspend on I/O completion, a queue wait, or
//! lock acquisition. A caller that holds a `CancellationToken` can signal
//! cancellation from another task; the in-flight operation finishes
//! whatever I/O is already underway but starts no further work, and returns
//! `DbError::Cancelled` rather than leaving partial state behind.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::Notify;

use crate::error::DbError;
use crate::Result;

#[derive(Clone, Default)]
pub struct CancellationToken {
    inner: Arc<Inner>,
}

#[derive(Default)]
struct Inner {
    cancelled: AtomicBool,
    notify: Notify,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Signals cancellation. Idempotent; wakes every task parked on
    /// `cancelled()`.
    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::SeqCst);
        self.inner.notify.notify_waiters();
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// Resolves once `cancel()` has been called. Polling this after
    /// cancellation resolves immediately.
    pub async fn cancelled(&self) {
        if self.is_cancelled() {
            return;
        }
        self.inner.notify.notified().await;
    }
}

/// Races `future` against `token`. If the token fires first, the future is
/// left running to completion in the background (its I/O is not aborted —
/// spec.md §5: "in-flight I/O runs to completion but no further work is
/// started") and the caller gets `Cancelled` without waiting for it.
pub async fn run_cancellable<F, T>(token: &CancellationToken, future: F) -> Result<T>
where
    F: std::future::Future<Output = Result<T>> + Send + 'static,
    T: Send + 'static,
{
    if token.is_cancelled() {
        return Err(DbError::Cancelled(
            "cancellation token fired before the operation started".to_string(),
        ));
    }
    let handle = tokio::spawn(future);
    tokio::select! {
        result = handle => result.map_err(|e| DbError::Internal(format!("task join failed: {e}")))?,
        _ = token.cancelled() => Err(DbError::Cancelled(
            "cancellation token fired while the operation was in flight".to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn uncancelled_token_lets_the_future_complete() {
        let token = CancellationToken::new();
        let result = run_cancellable(&token, async { Ok::<_, DbError>(42) }).await;
        assert_eq!(result.unwrap(), 42);
    }

    #[tokio::test]
    async fn cancelling_before_start_fails_immediately() {
        let token = CancellationToken::new();
        token.cancel();
        let result = run_cancellable(&token, async { Ok::<_, DbError>(1) }).await;
        assert!(matches!(result, Err(DbError::Cancelled(_))));
    }

    #[tokio::test]
    async fn cancelling_mid_flight_returns_cancelled_without_waiting() {
        let token = CancellationToken::new();
        let inner = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(5)).await;
            inner.cancel();
        });
        let result = run_cancellable(&token, async {
            tokio::time::sleep(Duration::from_secs(10)).await;
            Ok::<_, DbError>(())
        })
        .await;
        assert!(matches!(result, Err(DbError::Cancelled(_))));
    }
}
