/**
 * Cancellation Token
 *
 * DESIGN DECISION: A shared flag plus a `tokio::sync::Notify` so every waiter on
 * `cancelled()` wakes exactly once per cancellation, not polled
 * WHY: cancellation propagates through Runner -> model client -> pending sleeps -> pending
 * approvals, and must be idempotent and observable (`isCancelled()`)
 *
 * PATTERN: grounded on a cancellation-aware sleep idiom: `tokio::select!` over a sleep
 * future and a cancellation signal
 */

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::Notify;

#[derive(Clone)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self { cancelled: Arc::new(AtomicBool::new(false)), notify: Arc::new(Notify::new()) }
    }

    /// Idempotent: cancelling an already-cancelled token is a no-op beyond waking waiters
    /// again (harmless).
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Resolves immediately if already cancelled; otherwise resolves on the next `cancel()`.
    pub async fn cancelled(&self) {
        if self.is_cancelled() {
            return;
        }
        self.notify.notified().await;
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_cancelled_resolves_immediately_when_already_cancelled() {
        let token = CancellationToken::new();
        token.cancel();
        assert!(token.is_cancelled());
        tokio::time::timeout(std::time::Duration::from_millis(50), token.cancelled()).await.unwrap();
    }

    #[tokio::test]
    async fn test_cancelled_resolves_after_mid_wait_cancel() {
        let token = CancellationToken::new();
        let waiter = token.clone();
        let handle = tokio::spawn(async move {
            waiter.cancelled().await;
        });
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        token.cancel();
        tokio::time::timeout(std::time::Duration::from_millis(200), handle).await.unwrap().unwrap();
    }

    #[test]
    fn test_cancel_is_idempotent() {
        let token = CancellationToken::new();
        token.cancel();
        token.cancel();
        assert!(token.is_cancelled());
    }
}
