// Copyright (c) The tessera Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Cancelling a test run.

use std::sync::Arc;
use tokio::sync::watch;

/// A run-level cancellation token.
///
/// Once cancelled, the pool stops dispatching new files and kills in-flight workers. Cloning the
/// token shares its state.
#[derive(Clone, Debug)]
pub struct RunCancellation {
    sender: Arc<watch::Sender<bool>>,
}

impl RunCancellation {
    /// Creates a new token that has not been cancelled.
    pub fn new() -> Self {
        let (sender, _) = watch::channel(false);
        Self {
            sender: Arc::new(sender),
        }
    }

    /// Cancels the run. Cancelling more than once has no further effect.
    pub fn cancel(&self) {
        self.sender.send_if_modified(|cancelled| {
            let changed = !*cancelled;
            *cancelled = true;
            changed
        });
    }

    /// Returns true if the run has been cancelled.
    pub fn is_cancelled(&self) -> bool {
        *self.sender.borrow()
    }

    /// Waits until the run is cancelled.
    pub async fn cancelled(&self) {
        let mut receiver = self.sender.subscribe();
        // The sender lives as long as `self`, so this only returns once cancelled.
        let _ = receiver.wait_for(|cancelled| *cancelled).await;
    }
}

impl Default for RunCancellation {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn cancelled_wakes_waiters() {
        let cancel = RunCancellation::new();
        let waiter = tokio::spawn({
            let cancel = cancel.clone();
            async move { cancel.cancelled().await }
        });

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!cancel.is_cancelled());
        cancel.cancel();
        cancel.cancel();

        waiter.await.unwrap();
        assert!(cancel.is_cancelled());
        // Already cancelled: returns immediately.
        cancel.cancelled().await;
    }
}
