//! Cooperative cancellation.
//!
//! The host owns the flag and raises it from wherever it likes; the
//! extraction loop polls it between segments. Installing a signal on a
//! [`Vfs`](crate::Vfs) is scoped, see [`Vfs::with_abort_signal`](crate::Vfs::with_abort_signal).

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Shared abort flag. Clones observe the same flag.
#[derive(Debug, Clone, Default)]
pub struct AbortSignal(Arc<AtomicBool>);

impl AbortSignal {
    /// Create a lowered signal.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation.
    pub fn trigger(&self) {
        self.0.store(true, Ordering::Release);
    }

    /// Lower the flag again.
    pub fn reset(&self) {
        self.0.store(false, Ordering::Release);
    }

    /// Whether cancellation was requested.
    pub fn is_triggered(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// `true` when a signal is installed and raised.
pub fn should_abort(signal: Option<&AbortSignal>) -> bool {
    signal.is_some_and(AbortSignal::is_triggered)
}
