//! Cooperative run cancellation.

use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Notify;

/// An awaitable cancellation token for one pipeline run.
///
/// Cancellation is idempotent and first-reason-wins. The orchestrator
/// races in-flight remote calls against [`cancelled`], so an abandoned
/// call's eventual result is dropped rather than merged. Cancelling
/// after a run is already terminal has no effect on it.
///
/// [`cancelled`]: RunCancellation::cancelled
#[derive(Debug, Default)]
pub struct RunCancellation {
    cancelled: AtomicBool,
    reason: RwLock<Option<String>>,
    notify: Notify,
}

impl RunCancellation {
    /// Creates a fresh token.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation. Only the first reason is kept.
    pub fn cancel(&self, reason: impl Into<String>) {
        if self
            .cancelled
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            *self.reason.write() = Some(reason.into());
            self.notify.notify_waiters();
        }
    }

    /// Returns whether cancellation has been requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Returns the cancellation reason, if any.
    #[must_use]
    pub fn reason(&self) -> Option<String> {
        self.reason.read().clone()
    }

    /// Resolves once cancellation is requested.
    pub async fn cancelled(&self) {
        loop {
            if self.is_cancelled() {
                return;
            }
            let notified = self.notify.notified();
            // Re-check after registering so a cancel between the check
            // and the await is not missed.
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn test_token_default_not_cancelled() {
        let token = RunCancellation::new();
        assert!(!token.is_cancelled());
        assert!(token.reason().is_none());
    }

    #[test]
    fn test_cancel_records_reason() {
        let token = RunCancellation::new();
        token.cancel("caller requested");

        assert!(token.is_cancelled());
        assert_eq!(token.reason(), Some("caller requested".to_string()));
    }

    #[test]
    fn test_cancel_is_idempotent_first_reason_wins() {
        let token = RunCancellation::new();
        token.cancel("first");
        token.cancel("second");

        assert_eq!(token.reason(), Some("first".to_string()));
    }

    #[tokio::test]
    async fn test_cancelled_resolves_immediately_when_already_cancelled() {
        let token = RunCancellation::new();
        token.cancel("early");
        token.cancelled().await;
    }

    #[tokio::test]
    async fn test_cancelled_wakes_waiter() {
        let token = Arc::new(RunCancellation::new());
        let waiter = {
            let token = Arc::clone(&token);
            tokio::spawn(async move {
                token.cancelled().await;
            })
        };

        tokio::time::sleep(Duration::from_millis(10)).await;
        token.cancel("wake up");

        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_select_abandons_slow_work() {
        let token = RunCancellation::new();
        token.cancel("too slow");

        let raced = tokio::select! {
            () = token.cancelled() => "cancelled",
            () = tokio::time::sleep(Duration::from_secs(30)) => "slept",
        };
        assert_eq!(raced, "cancelled");
    }
}
