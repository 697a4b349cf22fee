//! A one-holder async lock whose acquisition honours cancellation.

use crate::cancel::LinkedCancellation;
use crate::error::{Error, Result};
use tokio::sync::{Mutex, MutexGuard};

/// Binary mutex without fairness guarantees beyond what `tokio::sync::Mutex`
/// provides. The lock is released when the guard goes out of scope.
#[derive(Debug)]
pub(crate) struct BinaryMutex<T> {
    inner: Mutex<T>,
}

impl<T> BinaryMutex<T> {
    pub(crate) fn new(value: T) -> Self {
        Self {
            inner: Mutex::new(value),
        }
    }

    /// Waits for the lock, giving up with `Cancelled` if `signal` fires first.
    pub(crate) async fn lock(&self, signal: &LinkedCancellation) -> Result<MutexGuard<'_, T>> {
        if signal.is_cancelled() {
            return Err(Error::Cancelled);
        }

        tokio::select! {
            biased;
            _ = signal.cancelled() => Err(Error::Cancelled),
            guard = self.inner.lock() => Ok(guard),
        }
    }

    /// Waits for the lock without any cancellation. Used by teardown.
    pub(crate) async fn lock_uncancellable(&self) -> MutexGuard<'_, T> {
        self.inner.lock().await
    }

    /// Takes the lock only if nobody holds it.
    pub(crate) fn try_lock(&self) -> Option<MutexGuard<'_, T>> {
        self.inner.try_lock().ok()
    }
}
