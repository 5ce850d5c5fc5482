//! Cooperative cancellation for an extraction run.
//!
//! Cancellation is a shared atomic flag, not task abortion: each worker
//! checks the token once, immediately before dispatching its field to the
//! engine. Work already in flight is allowed to finish; fields whose
//! dispatch was skipped are reported as `NoAnswer` and the run ends in the
//! `Cancelled` state with whatever subset resolved.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// A cloneable cancellation signal shared between the caller and the
/// extraction workers.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Signal cancellation. Idempotent; never un-cancels.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_the_signal() {
        let token = CancelToken::new();
        let observer = token.clone();
        assert!(!observer.is_cancelled());

        token.cancel();
        assert!(observer.is_cancelled());

        // Idempotent
        token.cancel();
        assert!(observer.is_cancelled());
    }
}
