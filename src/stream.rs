//! The stream contract shared by the tailing file and the synchronized
//! decorator.
//!
//! Concrete streams implement the `*_core` primitives once. The provided
//! methods expose each primitive twice: a blocking call that joins the
//! primitive on the stream's runtime, and an `*_async` call that returns the
//! primitive's future.

use crate::cancel::CloseHandle;
use crate::error::{Error, Result};
use futures::future::{self, BoxFuture};
use std::io::SeekFrom;
use std::time::Duration;
use tokio::runtime::{Handle, RuntimeFlavor};
use tokio_util::sync::CancellationToken;

/// How a primitive is being driven.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Invocation {
    /// A caller thread is blocked on the result.
    Blocking,
    /// The future is polled by an async task.
    Async,
}

/// What a stream can do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    pub read: bool,
    pub write: bool,
    pub seek: bool,
    pub timeout: bool,
}

/// A seekable byte stream with blocking and async entry points.
pub trait ByteStream: Send {
    fn capabilities(&self) -> Capabilities;

    /// Runtime used to drive the blocking entry points.
    fn runtime(&self) -> &Handle;

    /// A handle that closes this stream from another task or thread.
    fn close_handle(&self) -> CloseHandle;

    fn read_core<'a>(
        &'a mut self,
        buf: &'a mut [u8],
        cancel: &'a CancellationToken,
        invocation: Invocation,
    ) -> BoxFuture<'a, Result<usize>>;

    fn write_core<'a>(
        &'a mut self,
        buf: &'a [u8],
        cancel: &'a CancellationToken,
        invocation: Invocation,
    ) -> BoxFuture<'a, Result<()>>;

    fn flush_core<'a>(
        &'a mut self,
        cancel: &'a CancellationToken,
        invocation: Invocation,
    ) -> BoxFuture<'a, Result<()>>;

    fn seek_core<'a>(
        &'a mut self,
        pos: SeekFrom,
        cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, Result<u64>>;

    fn set_len_core<'a>(
        &'a mut self,
        len: u64,
        cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, Result<()>>;

    fn len_core<'a>(&'a mut self, cancel: &'a CancellationToken) -> BoxFuture<'a, Result<u64>>;

    fn position_core<'a>(
        &'a mut self,
        cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, Result<u64>>;

    /// Streams that cannot time out keep the default.
    fn read_timeout_core<'a>(
        &'a mut self,
        _cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, Result<Option<Duration>>> {
        Box::pin(future::ready(Err(Error::not_supported("read timeout"))))
    }

    fn set_read_timeout_core<'a>(
        &'a mut self,
        _timeout: Option<Duration>,
        _cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(future::ready(Err(Error::not_supported("read timeout"))))
    }

    /// Fires the shutdown signal and releases the underlying resource.
    /// Calling it again is a no-op.
    fn close_core(&mut self) -> BoxFuture<'_, Result<()>>;

    fn can_read(&self) -> bool {
        self.capabilities().read
    }

    fn can_write(&self) -> bool {
        self.capabilities().write
    }

    fn can_seek(&self) -> bool {
        self.capabilities().seek
    }

    fn can_timeout(&self) -> bool {
        self.capabilities().timeout
    }

    /// Reads into `buffer[offset..offset + count]`, blocking the calling
    /// thread. Named apart from `AsyncReadExt::read` so both can be in scope.
    ///
    /// # Errors
    ///
    /// Besides the read's own failures, returns [`Error::NotSupported`] when
    /// called from within a current-thread runtime, which cannot be blocked.
    fn read_blocking(&mut self, buffer: &mut [u8], offset: usize, count: usize) -> Result<usize> {
        let target = buffer_range_mut(buffer, offset, count)?;
        let runtime = self.runtime().clone();
        let cancel = CancellationToken::new();
        block_on(&runtime, self.read_core(target, &cancel, Invocation::Blocking))
    }

    fn read_async<'a>(
        &'a mut self,
        buffer: &'a mut [u8],
        offset: usize,
        count: usize,
        cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, Result<usize>> {
        match buffer_range_mut(buffer, offset, count) {
            Ok(target) => self.read_core(target, cancel, Invocation::Async),
            Err(e) => Box::pin(future::ready(Err(e))),
        }
    }

    fn write(&mut self, buffer: &[u8], offset: usize, count: usize) -> Result<()> {
        let source = buffer_range(buffer, offset, count)?;
        let runtime = self.runtime().clone();
        let cancel = CancellationToken::new();
        block_on(&runtime, self.write_core(source, &cancel, Invocation::Blocking))
    }

    fn write_async<'a>(
        &'a mut self,
        buffer: &'a [u8],
        offset: usize,
        count: usize,
        cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, Result<()>> {
        match buffer_range(buffer, offset, count) {
            Ok(source) => self.write_core(source, cancel, Invocation::Async),
            Err(e) => Box::pin(future::ready(Err(e))),
        }
    }

    fn flush(&mut self) -> Result<()> {
        let runtime = self.runtime().clone();
        let cancel = CancellationToken::new();
        block_on(&runtime, self.flush_core(&cancel, Invocation::Blocking))
    }

    fn flush_async<'a>(&'a mut self, cancel: &'a CancellationToken) -> BoxFuture<'a, Result<()>> {
        self.flush_core(cancel, Invocation::Async)
    }

    fn seek(&mut self, pos: SeekFrom) -> Result<u64> {
        let runtime = self.runtime().clone();
        let cancel = CancellationToken::new();
        block_on(&runtime, self.seek_core(pos, &cancel))
    }

    fn seek_async<'a>(
        &'a mut self,
        pos: SeekFrom,
        cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, Result<u64>> {
        self.seek_core(pos, cancel)
    }

    fn position(&mut self) -> Result<u64> {
        let runtime = self.runtime().clone();
        let cancel = CancellationToken::new();
        block_on(&runtime, self.position_core(&cancel))
    }

    fn position_async<'a>(
        &'a mut self,
        cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, Result<u64>> {
        self.position_core(cancel)
    }

    fn set_position(&mut self, position: u64) -> Result<()> {
        self.seek(SeekFrom::Start(position)).map(|_| ())
    }

    fn set_position_async<'a>(
        &'a mut self,
        position: u64,
        cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, Result<()>> {
        let seek = self.seek_core(SeekFrom::Start(position), cancel);
        Box::pin(async move { seek.await.map(|_| ()) })
    }

    fn len(&mut self) -> Result<u64> {
        let runtime = self.runtime().clone();
        let cancel = CancellationToken::new();
        block_on(&runtime, self.len_core(&cancel))
    }

    fn len_async<'a>(&'a mut self, cancel: &'a CancellationToken) -> BoxFuture<'a, Result<u64>> {
        self.len_core(cancel)
    }

    fn is_empty(&mut self) -> Result<bool> {
        self.len().map(|len| len == 0)
    }

    fn set_len(&mut self, len: u64) -> Result<()> {
        let runtime = self.runtime().clone();
        let cancel = CancellationToken::new();
        block_on(&runtime, self.set_len_core(len, &cancel))
    }

    fn set_len_async<'a>(
        &'a mut self,
        len: u64,
        cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, Result<()>> {
        self.set_len_core(len, cancel)
    }

    fn read_timeout(&mut self) -> Result<Option<Duration>> {
        let runtime = self.runtime().clone();
        let cancel = CancellationToken::new();
        block_on(&runtime, self.read_timeout_core(&cancel))
    }

    fn read_timeout_async<'a>(
        &'a mut self,
        cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, Result<Option<Duration>>> {
        self.read_timeout_core(cancel)
    }

    fn set_read_timeout(&mut self, timeout: Option<Duration>) -> Result<()> {
        let runtime = self.runtime().clone();
        let cancel = CancellationToken::new();
        block_on(&runtime, self.set_read_timeout_core(timeout, &cancel))
    }

    fn set_read_timeout_async<'a>(
        &'a mut self,
        timeout: Option<Duration>,
        cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, Result<()>> {
        self.set_read_timeout_core(timeout, cancel)
    }

    fn close(&mut self) -> Result<()> {
        let runtime = self.runtime().clone();
        block_on(&runtime, self.close_core())
    }

    fn close_async(&mut self) -> BoxFuture<'_, Result<()>> {
        self.close_core()
    }
}

/// Drives `future` to completion on `runtime`, blocking the current thread.
///
/// Inside a multi-thread runtime worker the worker is first handed off with
/// `block_in_place`. A current-thread runtime has no worker to hand off.
pub(crate) fn block_on<F, T>(runtime: &Handle, future: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match Handle::try_current() {
        Ok(current) if current.runtime_flavor() == RuntimeFlavor::CurrentThread => Err(
            Error::not_supported("blocking call inside a current-thread runtime"),
        ),
        Ok(_) => tokio::task::block_in_place(|| runtime.block_on(future)),
        Err(_) => runtime.block_on(future),
    }
}

fn checked_range(len: usize, offset: usize, count: usize) -> Result<std::ops::Range<usize>> {
    match offset.checked_add(count) {
        Some(end) if end <= len => Ok(offset..end),
        _ => Err(Error::invalid_argument(format!(
            "range {}+{} exceeds buffer of {} bytes",
            offset, count, len
        ))),
    }
}

pub(crate) fn buffer_range_mut(buffer: &mut [u8], offset: usize, count: usize) -> Result<&mut [u8]> {
    let range = checked_range(buffer.len(), offset, count)?;
    Ok(&mut buffer[range])
}

pub(crate) fn buffer_range(buffer: &[u8], offset: usize, count: usize) -> Result<&[u8]> {
    let range = checked_range(buffer.len(), offset, count)?;
    Ok(&buffer[range])
}
