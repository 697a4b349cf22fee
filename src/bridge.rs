//! Begin/end style interop for callers that cannot await futures.
//!
//! `begin` starts an operation on the runtime and hands back a
//! [`PendingOperation`] right away. When the operation settles, the optional
//! callback runs exactly once; `end` then blocks on the token and returns
//! the operation's result or error.

use crate::error::{Error, Result};
use crate::stream::block_on;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

/// Invoked once when a pending operation settles.
pub type Callback = Box<dyn FnOnce(Outcome) + Send + 'static>;

/// How a pending operation settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Completed,
    Failed,
    Cancelled,
}

impl Outcome {
    fn of<T>(result: &Result<T>) -> Self {
        match result {
            Ok(_) => Outcome::Completed,
            Err(e) if e.is_cancelled() => Outcome::Cancelled,
            Err(_) => Outcome::Failed,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum OperationKind {
    Read,
    Write,
}

/// Token for an operation started with a `begin_*` call.
pub struct PendingOperation<T> {
    owner: u64,
    kind: OperationKind,
    receiver: oneshot::Receiver<Result<T>>,
    cancel: CancellationToken,
    completed: Arc<AtomicBool>,
    runtime: Handle,
}

impl<T: Send + 'static> PendingOperation<T> {
    pub(crate) fn begin<F>(
        runtime: &Handle,
        owner: u64,
        kind: OperationKind,
        cancel: CancellationToken,
        operation: F,
        callback: Option<Callback>,
    ) -> Self
    where
        F: Future<Output = Result<T>> + Send + 'static,
    {
        let (sender, receiver) = oneshot::channel();
        let completed = Arc::new(AtomicBool::new(false));

        let settled = completed.clone();
        runtime.spawn(async move {
            let result = operation.await;
            let outcome = Outcome::of(&result);
            settled.store(true, Ordering::Release);
            // The token may already be gone; the callback still runs.
            let _ = sender.send(result);
            if let Some(callback) = callback {
                callback(outcome);
            }
        });

        Self {
            owner,
            kind,
            receiver,
            cancel,
            completed,
            runtime: runtime.clone(),
        }
    }
}

impl<T> PendingOperation<T> {
    pub fn is_completed(&self) -> bool {
        self.completed.load(Ordering::Acquire)
    }

    /// Asks the operation to stop; `end` then reports `Cancelled` unless it
    /// already finished.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Blocks until the operation settles and unwraps its result.
    pub(crate) fn end(self, owner: u64, kind: OperationKind) -> Result<T> {
        if self.owner != owner || self.kind != kind {
            return Err(Error::invalid_argument(format!(
                "{:?} operation was not started by this stream",
                self.kind
            )));
        }

        let receiver = self.receiver;
        block_on(&self.runtime, async move {
            // A closed channel means the task was dropped with its runtime.
            receiver.await.unwrap_or(Err(Error::Cancelled))
        })
    }
}

impl<T> fmt::Debug for PendingOperation<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingOperation")
            .field("kind", &self.kind)
            .field("completed", &self.is_completed())
            .finish()
    }
}
