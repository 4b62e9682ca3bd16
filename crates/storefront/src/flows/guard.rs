//! Reentrancy guard for confirmation submissions.
//!
//! Confirmation calls spend one-time codes, so a double-tap or a slow
//! network must not duplicate them. [`StepGuard::try_enter`] hands out at
//! most one [`StepPermit`] at a time; the permit releases the guard when
//! dropped, so every exit path — success, error propagation via `?`, or a
//! panic unwinding — releases it and the flow cannot deadlock.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// A reentrancy lock for one confirmable action.
///
/// Cloning shares the underlying flag, which is what lets a second
/// controller handle observe a submission already in flight.
#[derive(Debug, Clone, Default)]
pub struct StepGuard {
    held: Arc<AtomicBool>,
}

impl StepGuard {
    /// Create a released guard.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Try to acquire the guard.
    ///
    /// Returns `None` when a permit is already outstanding, without
    /// blocking. Holders keep the returned permit alive for the duration of
    /// the guarded call.
    #[must_use]
    pub fn try_enter(&self) -> Option<StepPermit> {
        self.held
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .ok()?;
        Some(StepPermit {
            held: Arc::clone(&self.held),
        })
    }

    /// Whether a permit is currently outstanding.
    #[must_use]
    pub fn is_held(&self) -> bool {
        self.held.load(Ordering::Acquire)
    }
}

/// Release handle for an acquired [`StepGuard`].
#[derive(Debug)]
pub struct StepPermit {
    held: Arc<AtomicBool>,
}

impl Drop for StepPermit {
    fn drop(&mut self) {
        self.held.store(false, Ordering::Release);
    }
}
