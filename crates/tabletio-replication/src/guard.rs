//! Ownership-transfer guard for borrowed request memory
//!
//! Edits handed to the sink may reference buffers owned by the inbound RPC
//! framework (possibly off heap). The producer retains those buffers and
//! wraps the matching release in an [`RpcGuard`]; from then on the guard is
//! owned by whoever holds the entry, and dropping it hands the memory back.
//! Move semantics rule out a double release, `Drop` rules out a forgotten
//! one.

use std::fmt;

/// Release hook for memory borrowed from the inbound RPC framework
///
/// Runs exactly once, when the guard is dropped.
pub struct RpcGuard {
    release: Option<Box<dyn FnOnce() + Send + 'static>>,
}

impl RpcGuard {
    /// Wrap a release hook; the caller must already hold the retain
    pub fn new(release: impl FnOnce() + Send + 'static) -> Self {
        Self {
            release: Some(Box::new(release)),
        }
    }
}

impl Drop for RpcGuard {
    fn drop(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

impl fmt::Debug for RpcGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("RpcGuard")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_release_runs_exactly_once_on_drop() {
        let released = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&released);
        let guard = RpcGuard::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        assert_eq!(released.load(Ordering::SeqCst), 0);
        drop(guard);
        assert_eq!(released.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_held_guard_does_not_release() {
        let released = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&released);
        let _guard = RpcGuard::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(released.load(Ordering::SeqCst), 0);
    }
}
