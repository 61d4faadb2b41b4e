use crate::core::error::{BotError, Result};
use std::sync::Arc;
use tokio::sync::watch;

/// Cooperative cancellation shared by every long-running loop of a run.
///
/// Cloning shares the flag. Once triggered it never resets.
#[derive(Clone, Debug)]
pub struct StopSignal {
    tx: Arc<watch::Sender<bool>>,
}

impl Default for StopSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl StopSignal {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    pub fn trigger(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_stopped(&self) -> bool {
        *self.tx.borrow()
    }

    /// `Err(Stopped)` once the run has been asked to stop.
    pub fn check(&self) -> Result<()> {
        if self.is_stopped() {
            return Err(BotError::Stopped);
        }
        Ok(())
    }

    /// Resolves when the signal is triggered (immediately if it already was).
    pub async fn cancelled(&self) {
        let mut rx = self.tx.subscribe();
        // The sender lives in `self`, so `wait_for` cannot observe a closed channel.
        let _ = rx.wait_for(|stopped| *stopped).await;
    }
}
