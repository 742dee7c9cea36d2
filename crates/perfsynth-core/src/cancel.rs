//! Request-scoped cancellation.
//!
//! A [`CancellationScope`] is a cloneable handle over a `watch` channel.
//! Every clone observes the same flag; once cancelled it stays cancelled.

use std::sync::Arc;

use tokio::sync::watch;

/// Shared cancellation flag for one synthesis request.
#[derive(Debug, Clone)]
pub struct CancellationScope {
    tx: Arc<watch::Sender<bool>>,
}

impl Default for CancellationScope {
    fn default() -> Self {
        Self::new()
    }
}

impl CancellationScope {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// Cancel the scope. Idempotent.
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }

    /// Resolves once the scope is cancelled (immediately if it already is).
    pub async fn cancelled(&self) {
        let mut rx = self.tx.subscribe();
        // The sender lives as long as `self`, so `wait_for` only returns once
        // the flag flips.
        let _ = rx.wait_for(|cancelled| *cancelled).await;
    }
}
