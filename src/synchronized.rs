//! A stream decorator that lets several tasks share one stream.
//!
//! Every operation takes a binary async lock before delegating, so at most
//! one primitive runs against the inner stream at a time. Closing the
//! decorator wakes any task still queued for the lock.

use crate::bridge::{Callback, OperationKind, PendingOperation};
use crate::cancel::{CloseHandle, LinkedCancellation};
use crate::error::{Error, Result};
use crate::mutex::BinaryMutex;
use crate::stream::{ByteStream, Capabilities, Invocation};
use crate::tailing::TailingFile;
use futures::future::BoxFuture;
use std::fmt;
use std::io::SeekFrom;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::MutexGuard;
use tokio_util::sync::CancellationToken;

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

/// Shared, lock-guarded view of a stream. Clones refer to the same stream.
pub struct Synchronized<S> {
    shared: Arc<Shared<S>>,
}

struct Shared<S> {
    id: u64,
    stream: BinaryMutex<S>,
    shutdown: CancellationToken,
    stream_close: CloseHandle,
    capabilities: Capabilities,
    runtime: Handle,
    closed: AtomicBool,
}

impl<S> Clone for Synchronized<S> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
        }
    }
}

impl<S: ByteStream> Synchronized<S> {
    pub fn new(stream: S) -> Self {
        let id = NEXT_ID.fetch_add(1, Ordering::Relaxed);
        log::debug!("Synchronizing stream #{}", id);

        Self {
            shared: Arc::new(Shared {
                id,
                capabilities: stream.capabilities(),
                runtime: stream.runtime().clone(),
                stream_close: stream.close_handle(),
                stream: BinaryMutex::new(stream),
                shutdown: CancellationToken::new(),
                closed: AtomicBool::new(false),
            }),
        }
    }

    /// Whether both handles share the same underlying stream.
    pub fn ptr_eq(a: &Self, b: &Self) -> bool {
        Arc::ptr_eq(&a.shared, &b.shared)
    }

    async fn acquire(&self, cancel: &CancellationToken) -> Result<MutexGuard<'_, S>> {
        if self.shared.shutdown.is_cancelled() {
            return Err(Error::StreamClosed);
        }
        let signal = LinkedCancellation::new(cancel.clone(), self.shared.shutdown.clone());
        self.shared.stream.lock(&signal).await
    }

    /// Reports an operation cut short by this decorator's shutdown as
    /// `Cancelled`. The shutdown reaches the inner stream through its close
    /// handle, which ends a pending read softly or closes the stream.
    fn aborted_by_shutdown<T>(&self, result: Result<T>, soft_end: fn(&T) -> bool) -> Result<T> {
        if !self.shared.shutdown.is_cancelled() {
            return result;
        }
        match result {
            Ok(value) if soft_end(&value) => Err(Error::Cancelled),
            Err(Error::StreamClosed) => Err(Error::Cancelled),
            other => other,
        }
    }
}

impl<S: ByteStream + 'static> Synchronized<S> {
    /// Starts reading up to `count` bytes in the background.
    pub fn begin_read(&self, count: usize, callback: Option<Callback>) -> PendingOperation<Vec<u8>> {
        let mut stream = self.clone();
        let cancel = CancellationToken::new();
        let token = cancel.clone();

        PendingOperation::begin(
            &self.shared.runtime,
            self.shared.id,
            OperationKind::Read,
            cancel,
            async move {
                let mut buf = vec![0u8; count];
                let read = stream.read_core(&mut buf, &token, Invocation::Async).await?;
                buf.truncate(read);
                Ok(buf)
            },
            callback,
        )
    }

    /// Waits for a read started by [`begin_read`](Self::begin_read) on this
    /// stream and returns the bytes it produced.
    pub fn end_read(&self, operation: PendingOperation<Vec<u8>>) -> Result<Vec<u8>> {
        operation.end(self.shared.id, OperationKind::Read)
    }

    pub fn begin_write(&self, data: Vec<u8>, callback: Option<Callback>) -> PendingOperation<()> {
        let mut stream = self.clone();
        let cancel = CancellationToken::new();
        let token = cancel.clone();

        PendingOperation::begin(
            &self.shared.runtime,
            self.shared.id,
            OperationKind::Write,
            cancel,
            async move { stream.write_core(&data, &token, Invocation::Async).await },
            callback,
        )
    }

    pub fn end_write(&self, operation: PendingOperation<()>) -> Result<()> {
        operation.end(self.shared.id, OperationKind::Write)
    }
}

impl<S: ByteStream> ByteStream for Synchronized<S> {
    fn capabilities(&self) -> Capabilities {
        self.shared.capabilities
    }

    fn runtime(&self) -> &Handle {
        &self.shared.runtime
    }

    fn close_handle(&self) -> CloseHandle {
        CloseHandle::new(self.shared.shutdown.clone()).chain(self.shared.stream_close.clone())
    }

    fn read_core<'a>(
        &'a mut self,
        buf: &'a mut [u8],
        cancel: &'a CancellationToken,
        invocation: Invocation,
    ) -> BoxFuture<'a, Result<usize>> {
        Box::pin(async move {
            let mut stream = self.acquire(cancel).await?;
            let result = stream.read_core(buf, cancel, invocation).await;
            self.aborted_by_shutdown(result, |read| *read == 0)
        })
    }

    fn write_core<'a>(
        &'a mut self,
        buf: &'a [u8],
        cancel: &'a CancellationToken,
        invocation: Invocation,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let mut stream = self.acquire(cancel).await?;
            let result = stream.write_core(buf, cancel, invocation).await;
            self.aborted_by_shutdown(result, |_| false)
        })
    }

    fn flush_core<'a>(
        &'a mut self,
        cancel: &'a CancellationToken,
        invocation: Invocation,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let mut stream = self.acquire(cancel).await?;
            let result = stream.flush_core(cancel, invocation).await;
            self.aborted_by_shutdown(result, |_| false)
        })
    }

    fn seek_core<'a>(
        &'a mut self,
        pos: SeekFrom,
        cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, Result<u64>> {
        Box::pin(async move {
            let mut stream = self.acquire(cancel).await?;
            let result = stream.seek_core(pos, cancel).await;
            self.aborted_by_shutdown(result, |_| false)
        })
    }

    fn set_len_core<'a>(
        &'a mut self,
        len: u64,
        cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let mut stream = self.acquire(cancel).await?;
            let result = stream.set_len_core(len, cancel).await;
            self.aborted_by_shutdown(result, |_| false)
        })
    }

    fn len_core<'a>(&'a mut self, cancel: &'a CancellationToken) -> BoxFuture<'a, Result<u64>> {
        Box::pin(async move {
            let mut stream = self.acquire(cancel).await?;
            let result = stream.len_core(cancel).await;
            self.aborted_by_shutdown(result, |_| false)
        })
    }

    fn position_core<'a>(
        &'a mut self,
        cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, Result<u64>> {
        Box::pin(async move {
            let mut stream = self.acquire(cancel).await?;
            let result = stream.position_core(cancel).await;
            self.aborted_by_shutdown(result, |_| false)
        })
    }

    fn read_timeout_core<'a>(
        &'a mut self,
        cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, Result<Option<Duration>>> {
        Box::pin(async move {
            let mut stream = self.acquire(cancel).await?;
            let result = stream.read_timeout_core(cancel).await;
            self.aborted_by_shutdown(result, |_| false)
        })
    }

    fn set_read_timeout_core<'a>(
        &'a mut self,
        timeout: Option<Duration>,
        cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let mut stream = self.acquire(cancel).await?;
            let result = stream.set_read_timeout_core(timeout, cancel).await;
            self.aborted_by_shutdown(result, |_| false)
        })
    }

    /// Wakes queued operations, stops the inner stream's pending read, then
    /// closes the inner stream once the lock is free.
    fn close_core(&mut self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            if self.shared.closed.swap(true, Ordering::AcqRel) {
                return Ok(());
            }
            log::debug!("Closing synchronized stream #{}", self.shared.id);

            self.shared.shutdown.cancel();
            self.shared.stream_close.close();
            let mut stream = self.shared.stream.lock_uncancellable().await;
            stream.close_core().await
        })
    }
}

impl<S> fmt::Debug for Synchronized<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Synchronized")
            .field("id", &self.shared.id)
            .field("locked", &self.shared.stream.try_lock().is_none())
            .field("closed", &self.shared.shutdown.is_cancelled())
            .finish()
    }
}

/// Conversion into a synchronized stream.
///
/// Already synchronized streams convert to themselves.
pub trait IntoSynchronized {
    type Output;

    fn into_synchronized(self) -> Self::Output;
}

impl IntoSynchronized for TailingFile {
    type Output = Synchronized<TailingFile>;

    fn into_synchronized(self) -> Self::Output {
        Synchronized::new(self)
    }
}

impl<S: ByteStream> IntoSynchronized for Synchronized<S> {
    type Output = Self;

    fn into_synchronized(self) -> Self {
        self
    }
}

/// Wraps `stream` so it can be shared between tasks.
///
/// ```no_run
/// use tail_reader::{ByteStream, Synchronized, TailingFile, synchronized};
///
/// # async fn demo() -> tail_reader::Result<()> {
/// let shared = synchronized(TailingFile::open("app.log").await?);
/// let again = synchronized(shared.clone());
/// assert!(Synchronized::ptr_eq(&shared, &again));
/// # Ok(())
/// # }
/// ```
pub fn synchronized<S: IntoSynchronized>(stream: S) -> S::Output {
    stream.into_synchronized()
}
