//! Cancellation shared between the coordinator and its caller.

use std::sync::{Arc, Mutex, MutexGuard};
use supaforge_core::ForgeError;

#[derive(Debug, Default)]
struct Control {
    cancelled: bool,
    dispatched: bool,
}

/// Cloneable handle for cancelling a running session.
///
/// Cancelling succeeds until provisioning statements are dispatched to
/// the executor; after that it is refused and the in-flight work is
/// reported, never rolled back.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle {
    inner: Arc<Mutex<Control>>,
}

impl CancelHandle {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Control> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn cancel(&self) -> Result<(), ForgeError> {
        let mut control = self.lock();
        if control.dispatched {
            return Err(ForgeError::CancellationRefused(
                "provisioning statements were already dispatched; the run continues to completion"
                    .to_string(),
            ));
        }
        control.cancelled = true;
        Ok(())
    }

    pub fn is_cancelled(&self) -> bool {
        self.lock().cancelled
    }

    pub fn is_dispatched(&self) -> bool {
        self.lock().dispatched
    }

    /// Clear both flags once a session has ended, so the next session on
    /// the same coordinator starts cancellable.
    pub(crate) fn reset(&self) {
        *self.lock() = Control::default();
    }

    /// Mark provisioning as dispatched unless a cancel got there first.
    /// Returns `false` when the session was cancelled.
    pub(crate) fn dispatch(&self) -> bool {
        let mut control = self.lock();
        if control.cancelled {
            return false;
        }
        control.dispatched = true;
        true
    }
}
