//! Cancellation and backoff primitives shared by the follower and the
//! synchronized decorator.

use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Which of the two linked signals fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelCause {
    /// The caller cancelled its own token.
    Caller,
    /// The stream (or decorator) owning the shutdown token was closed.
    Shutdown,
}

/// A caller's cancellation token joined with an instance's shutdown token.
///
/// Both tokens are cheap `Arc` clones, so a linked signal can be moved into
/// a `'static` future.
#[derive(Debug, Clone)]
pub struct LinkedCancellation {
    caller: CancellationToken,
    shutdown: CancellationToken,
}

impl LinkedCancellation {
    pub fn new(caller: CancellationToken, shutdown: CancellationToken) -> Self {
        Self { caller, shutdown }
    }

    /// The cause if either signal already fired. The caller token is checked
    /// first.
    pub fn cause(&self) -> Option<CancelCause> {
        if self.caller.is_cancelled() {
            Some(CancelCause::Caller)
        } else if self.shutdown.is_cancelled() {
            Some(CancelCause::Shutdown)
        } else {
            None
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cause().is_some()
    }

    /// Resolves once either signal fires.
    pub async fn cancelled(&self) -> CancelCause {
        tokio::select! {
            biased;
            _ = self.caller.cancelled() => CancelCause::Caller,
            _ = self.shutdown.cancelled() => CancelCause::Shutdown,
        }
    }
}

/// Sleeps for `duration` unless the linked signal fires first.
pub async fn delay(duration: Duration, signal: &LinkedCancellation) -> Result<(), CancelCause> {
    if let Some(cause) = signal.cause() {
        return Err(cause);
    }

    tokio::select! {
        biased;
        cause = signal.cancelled() => Err(cause),
        _ = tokio::time::sleep(duration) => Ok(()),
    }
}

/// Closes a stream from another task or thread.
///
/// Firing the handle wakes any read sleeping in its backoff; that read
/// returns 0 bytes and later operations fail with `StreamClosed`.
#[derive(Debug, Clone)]
pub struct CloseHandle {
    signals: Vec<CancellationToken>,
}

impl CloseHandle {
    pub(crate) fn new(signal: CancellationToken) -> Self {
        Self {
            signals: vec![signal],
        }
    }

    /// Fires `other` together with this handle.
    pub(crate) fn chain(mut self, other: CloseHandle) -> Self {
        self.signals.extend(other.signals);
        self
    }

    pub fn close(&self) {
        for signal in &self.signals {
            signal.cancel();
        }
    }

    pub fn is_closed(&self) -> bool {
        self.signals.first().is_some_and(CancellationToken::is_cancelled)
    }
}
