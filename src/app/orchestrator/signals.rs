//! Batch cancellation token and signal wiring
//!
//! Cancellation is cooperative: the orchestrator checks the token between
//! components and groups and lets in-flight downloads and installs finish,
//! so no partial writes are produced by a cancel. Not-yet-started
//! components end in a terminal cancelled state.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::info;

/// Shared batch-level cancellation flag
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    flag: Arc<AtomicBool>,
}

impl CancellationToken {
    /// Create a fresh, uncancelled token
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation at the next safe checkpoint
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation has been requested
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// Wire CTRL-C to a cancellation token
///
/// Returns the handle of the background task so callers can abort it once
/// the batch finishes.
pub fn spawn_ctrl_c_handler(token: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupt received; finishing in-flight work, then stopping");
            token.cancel();
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_starts_uncancelled() {
        let token = CancellationToken::new();
        assert!(!token.is_cancelled());
    }

    #[test]
    fn test_cancel_is_visible_to_clones() {
        let token = CancellationToken::new();
        let observer = token.clone();

        token.cancel();
        assert!(observer.is_cancelled());
    }
}
