//! A cloneable handle for cancelling a turn from external code.

use parking_lot::Mutex;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// A cloneable handle for cancelling the dispatcher's running turn.
///
/// Arc-wrapped, so cloning is cheap and a clone can live on another task
/// (e.g. a Ctrl-C watcher) while the dispatcher drives the turn.
#[derive(Clone)]
pub struct TurnHandle {
    pub(crate) token: Arc<Mutex<CancellationToken>>,
}

impl TurnHandle {
    pub(crate) fn new() -> Self {
        Self {
            token: Arc::new(Mutex::new(CancellationToken::new())),
        }
    }

    /// Request cancellation of the current turn. Idempotent: repeated calls
    /// have no further effect.
    pub fn cancel(&self) {
        self.token.lock().cancel();
    }

    /// Whether cancellation has been requested for the current turn
    pub fn is_cancelled(&self) -> bool {
        self.token.lock().is_cancelled()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancel_is_idempotent() {
        let handle = TurnHandle::new();
        assert!(!handle.is_cancelled());
        handle.cancel();
        handle.cancel();
        assert!(handle.is_cancelled());
    }

    #[test]
    fn test_clones_share_the_token() {
        let handle = TurnHandle::new();
        let clone = handle.clone();
        clone.cancel();
        assert!(handle.is_cancelled());
    }
}
