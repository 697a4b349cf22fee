//! The tailing file: a read-only, seekable stream over a file that another
//! process may still be appending to.

use crate::cancel::{CloseHandle, LinkedCancellation};
use crate::error::{Error, Result};
use crate::follower::{Follower, RetryPolicy};
use crate::options::TailOptions;
use crate::stream::{ByteStream, Capabilities, Invocation};
use futures::future::{self, BoxFuture};
use std::fmt;
use std::io::{self, SeekFrom};
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncRead, ReadBuf};
use tokio::runtime::Handle;
use tokio_stream::Stream;
use tokio_util::sync::CancellationToken;

type PendingRead = BoxFuture<'static, (Box<Follower>, Result<Vec<u8>>)>;

enum ReadState {
    Idle(Box<Follower>),
    /// An `AsyncRead` poll moved the follower into this future. The token
    /// aborts the future once its poller is gone.
    Busy(PendingRead, CancellationToken),
    Closed,
}

/// Follows a file like `tail -f`.
///
/// Reads return 0 bytes only once no writer holds the file open, or when
/// the read timeout is used up. Writing, flushing and resizing always fail
/// with [`Error::NotSupported`].
///
/// The stream is meant for one reader at a time; wrap it with
/// [`synchronized`](crate::synchronized) to share it.
pub struct TailingFile {
    name: PathBuf,
    state: ReadState,
    /// Bytes produced by an `AsyncRead` future that was not polled to the end.
    unread: Vec<u8>,
    policy: RetryPolicy,
    shutdown: CancellationToken,
    capabilities: Capabilities,
    is_async: bool,
    runtime: Handle,
}

impl TailingFile {
    /// Opens `path` for following with default options.
    pub async fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::open_with(path, TailOptions::default()).await
    }

    pub async fn open_with<P: AsRef<Path>>(path: P, options: TailOptions) -> Result<Self> {
        let path = path.as_ref();
        if path.as_os_str().is_empty() {
            return Err(Error::InvalidPath {
                message: "path is empty".to_string(),
            });
        }
        let not_found = || Error::FileNotFound {
            path: path.display().to_string(),
        };

        let mut file = match open_shared(path).await {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Err(not_found()),
            Err(e) => return Err(e.into()),
        };
        let metadata = file.metadata().await?;
        if metadata.is_dir() {
            return Err(not_found());
        }
        if let Some(size) = options.buffer_size {
            file.set_max_buf_size(size.max(1));
        }

        log::debug!("following {}", path.display());

        Ok(Self {
            name: path.to_path_buf(),
            state: ReadState::Idle(Box::new(Follower::new(
                path.to_path_buf(),
                file,
                options.probe,
            ))),
            unread: Vec::new(),
            policy: RetryPolicy {
                interval: options.retry_interval,
                read_timeout: options.read_timeout,
            },
            shutdown: CancellationToken::new(),
            capabilities: Capabilities {
                read: true,
                write: false,
                seek: metadata.is_file(),
                timeout: true,
            },
            is_async: options.use_async,
            runtime: Handle::current(),
        })
    }

    /// The path this stream was opened with.
    pub fn name(&self) -> &Path {
        &self.name
    }

    pub fn is_async(&self) -> bool {
        self.is_async
    }

    /// Turns the follower into a stream of chunks of at most `chunk_size`
    /// bytes, ending at end-of-stream. An error ends the stream after being
    /// yielded.
    pub fn into_chunks(self, chunk_size: usize) -> impl Stream<Item = Result<Vec<u8>>> + Send {
        let chunk_size = chunk_size.max(1);
        futures::stream::unfold(Some(self), move |state| async move {
            let mut file = state?;
            let mut chunk = vec![0u8; chunk_size];
            let cancel = CancellationToken::new();
            let result = file.read_core(&mut chunk, &cancel, Invocation::Async).await;
            match result {
                Ok(0) => None,
                Ok(read) => {
                    chunk.truncate(read);
                    Some((Ok(chunk), Some(file)))
                }
                Err(e) => Some((Err(e), None)),
            }
        })
    }

    /// Recovers the follower from an abandoned `AsyncRead` future and keeps
    /// the bytes it already produced.
    async fn settle(&mut self, cancel: &CancellationToken) -> Result<()> {
        let ReadState::Busy(pending, abandon) = &mut self.state else {
            return Ok(());
        };
        // Stops a backoff wait that nobody is polling for anymore.
        abandon.cancel();
        let (follower, outcome) = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(Error::Cancelled),
            settled = pending => settled,
        };
        self.state = ReadState::Idle(follower);
        match outcome {
            Ok(bytes) => self.unread.extend(bytes),
            Err(e) if e.is_cancelled() => {}
            Err(e) => return Err(e),
        }
        Ok(())
    }

    /// The idle follower. A fired close handle releases it first.
    fn follower_mut(&mut self) -> Result<&mut Follower> {
        let closed = self.shutdown.is_cancelled();
        match &mut self.state {
            ReadState::Idle(follower) if closed => {
                follower.release();
                Err(Error::StreamClosed)
            }
            ReadState::Idle(follower) => Ok(follower),
            ReadState::Busy(..) | ReadState::Closed => Err(Error::StreamClosed),
        }
    }

    fn is_closed(&self) -> bool {
        match &self.state {
            ReadState::Idle(follower) => self.shutdown.is_cancelled() || follower.is_released(),
            ReadState::Busy(..) => self.shutdown.is_cancelled(),
            ReadState::Closed => true,
        }
    }

    fn logical_position(&mut self) -> Result<u64> {
        let unread = self.unread.len() as u64;
        Ok(self.follower_mut()?.position() - unread)
    }

    fn drain_unread(&mut self, buf: &mut [u8]) -> usize {
        let count = buf.len().min(self.unread.len());
        buf[..count].copy_from_slice(&self.unread[..count]);
        self.unread.drain(..count);
        count
    }
}

async fn open_shared(path: &Path) -> io::Result<File> {
    let mut options = OpenOptions::new();
    options.read(true);
    #[cfg(windows)]
    {
        // FILE_SHARE_READ | FILE_SHARE_WRITE | FILE_SHARE_DELETE
        options.share_mode(0x1 | 0x2 | 0x4);
    }
    options.open(path).await
}

impl ByteStream for TailingFile {
    fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    fn runtime(&self) -> &Handle {
        &self.runtime
    }

    fn close_handle(&self) -> CloseHandle {
        CloseHandle::new(self.shutdown.clone())
    }

    fn read_core<'a>(
        &'a mut self,
        buf: &'a mut [u8],
        cancel: &'a CancellationToken,
        invocation: Invocation,
    ) -> BoxFuture<'a, Result<usize>> {
        Box::pin(async move {
            self.settle(cancel).await?;
            if !self.unread.is_empty() {
                return Ok(self.drain_unread(buf));
            }

            let signal = LinkedCancellation::new(cancel.clone(), self.shutdown.clone());
            let policy = self.policy;
            self.follower_mut()?
                .read(buf, &signal, invocation, policy)
                .await
        })
    }

    fn write_core<'a>(
        &'a mut self,
        _buf: &'a [u8],
        _cancel: &'a CancellationToken,
        _invocation: Invocation,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(future::ready(Err(Error::not_supported("write"))))
    }

    fn flush_core<'a>(
        &'a mut self,
        _cancel: &'a CancellationToken,
        _invocation: Invocation,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(future::ready(Err(Error::not_supported("flush"))))
    }

    fn seek_core<'a>(
        &'a mut self,
        pos: SeekFrom,
        cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, Result<u64>> {
        Box::pin(async move {
            self.settle(cancel).await?;
            // The handle is ahead of the caller by the unread bytes.
            let pos = match pos {
                SeekFrom::Current(delta) => SeekFrom::Start(
                    self.logical_position()?
                        .checked_add_signed(delta)
                        .ok_or_else(|| Error::invalid_argument("seek before start of file"))?,
                ),
                other => other,
            };
            let position = self.follower_mut()?.seek(pos).await?;
            self.unread.clear();
            Ok(position)
        })
    }

    fn set_len_core<'a>(
        &'a mut self,
        _len: u64,
        _cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(future::ready(Err(Error::not_supported("set_len"))))
    }

    fn len_core<'a>(&'a mut self, cancel: &'a CancellationToken) -> BoxFuture<'a, Result<u64>> {
        Box::pin(async move {
            self.settle(cancel).await?;
            self.follower_mut()?.len().await
        })
    }

    fn position_core<'a>(
        &'a mut self,
        cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, Result<u64>> {
        Box::pin(async move {
            self.settle(cancel).await?;
            self.logical_position()
        })
    }

    fn read_timeout_core<'a>(
        &'a mut self,
        _cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, Result<Option<Duration>>> {
        Box::pin(future::ready(Ok(self.policy.read_timeout)))
    }

    fn set_read_timeout_core<'a>(
        &'a mut self,
        timeout: Option<Duration>,
        _cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, Result<()>> {
        self.policy.read_timeout = timeout;
        Box::pin(future::ready(Ok(())))
    }

    fn close_core(&mut self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            // Wakes a read sleeping in its backoff before we wait for it.
            self.shutdown.cancel();
            match std::mem::replace(&mut self.state, ReadState::Closed) {
                ReadState::Busy(pending, _) => {
                    let (mut follower, _) = pending.await;
                    follower.release();
                }
                ReadState::Idle(mut follower) => follower.release(),
                ReadState::Closed => return Ok(()),
            }
            self.unread.clear();
            log::debug!("closed {}", self.name.display());
            Ok(())
        })
    }
}

impl AsyncRead for TailingFile {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        loop {
            if !this.unread.is_empty() {
                let count = buf.remaining().min(this.unread.len());
                buf.put_slice(&this.unread[..count]);
                this.unread.drain(..count);
                return Poll::Ready(Ok(()));
            }

            match std::mem::replace(&mut this.state, ReadState::Closed) {
                ReadState::Closed => return Poll::Ready(Err(Error::StreamClosed.into())),
                ReadState::Idle(mut follower) => {
                    if buf.remaining() == 0 {
                        this.state = ReadState::Idle(follower);
                        return Poll::Ready(Ok(()));
                    }
                    let len = buf.remaining();
                    let abandon = CancellationToken::new();
                    let signal = LinkedCancellation::new(abandon.clone(), this.shutdown.clone());
                    let policy = this.policy;
                    let pending: PendingRead = Box::pin(async move {
                        let mut scratch = vec![0u8; len];
                        let outcome = follower
                            .read(&mut scratch, &signal, Invocation::Async, policy)
                            .await
                            .map(|read| {
                                scratch.truncate(read);
                                scratch
                            });
                        (follower, outcome)
                    });
                    this.state = ReadState::Busy(pending, abandon);
                }
                ReadState::Busy(mut pending, abandon) => match pending.as_mut().poll(cx) {
                    Poll::Pending => {
                        this.state = ReadState::Busy(pending, abandon);
                        return Poll::Pending;
                    }
                    Poll::Ready((follower, outcome)) => {
                        this.state = ReadState::Idle(follower);
                        let bytes = match outcome {
                            // Aborted as abandoned while we were away; read again.
                            Err(e) if e.is_cancelled() && abandon.is_cancelled() => continue,
                            outcome => outcome?,
                        };
                        if bytes.is_empty() {
                            return Poll::Ready(Ok(()));
                        }
                        this.unread = bytes;
                    }
                },
            }
        }
    }
}

impl Drop for TailingFile {
    fn drop(&mut self) {
        // Lets a future still owning the follower finish promptly.
        self.shutdown.cancel();
    }
}

impl fmt::Debug for TailingFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TailingFile")
            .field("name", &self.name)
            .field("read_timeout", &self.policy.read_timeout)
            .field("closed", &self.is_closed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::{AssumeWriter, WriteLockProbe};
    use crate::test_helpers::TempTailFile;
    use std::sync::Arc;
    use std::time::Instant;
    use tokio_stream::StreamExt;
    use tokio_test::{assert_err, assert_ok};

    fn quick_options() -> TailOptions {
        TailOptions::default().with_retry_interval(Duration::from_millis(20))
    }

    #[tokio::test]
    async fn test_open_missing_file() {
        let result = TailingFile::open("definitely_nonexistent_file_12345.log").await;

        match result {
            Err(Error::FileNotFound { path }) => assert!(path.contains("12345")),
            other => panic!("Expected FileNotFound, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_open_empty_path() {
        let result = TailingFile::open("").await;
        assert!(matches!(result, Err(Error::InvalidPath { .. })));
    }

    #[tokio::test]
    async fn test_open_directory_is_not_a_file() {
        let dir = tempfile::tempdir().unwrap();
        let result = TailingFile::open(dir.path()).await;
        assert!(matches!(result, Err(Error::FileNotFound { .. })));
    }

    #[tokio::test]
    async fn test_capabilities_and_metadata() {
        let file = TempTailFile::with_content(b"abc").unwrap();
        let options = quick_options().with_use_async(false);
        let follower = assert_ok!(TailingFile::open_with(file.path(), options).await);

        assert!(follower.can_read());
        assert!(!follower.can_write());
        assert!(follower.can_seek());
        assert!(follower.can_timeout());
        assert!(!follower.is_async());
        assert_eq!(follower.name(), file.path());
    }

    #[tokio::test]
    async fn test_read_then_seek_back() {
        let file = TempTailFile::with_content(b"coucou").unwrap();
        let mut follower = assert_ok!(TailingFile::open(file.path()).await);
        let cancel = CancellationToken::new();
        let mut buf = [0u8; 6];

        let read = assert_ok!(follower.read_async(&mut buf, 0, 6, &cancel).await);
        assert_eq!(read, 6);
        assert_eq!(&buf, b"coucou");
        assert_eq!(assert_ok!(follower.position_async(&cancel).await), 6);

        assert_eq!(assert_ok!(follower.seek_async(SeekFrom::Start(0), &cancel).await), 0);
        let mut again = [0u8; 6];
        let read = assert_ok!(follower.read_async(&mut again, 0, 6, &cancel).await);
        assert_eq!(read, 6);
        assert_eq!(&again, b"coucou");
    }

    #[tokio::test]
    async fn test_read_into_buffer_window() {
        let file = TempTailFile::with_content(b"xyz").unwrap();
        let mut follower = assert_ok!(TailingFile::open(file.path()).await);
        let cancel = CancellationToken::new();
        let mut buf = [b'.'; 6];

        let read = assert_ok!(follower.read_async(&mut buf, 2, 3, &cancel).await);
        assert_eq!(read, 3);
        assert_eq!(&buf, b"..xyz.");

        let invalid = follower.read_async(&mut buf, 4, 3, &cancel).await;
        assert!(matches!(invalid, Err(Error::InvalidArgument { .. })));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_blocking_read_from_spawned_thread() {
        let file = TempTailFile::with_content(b"blocking").unwrap();
        let mut follower = assert_ok!(TailingFile::open(file.path()).await);

        let (buf, read) = tokio::task::spawn_blocking(move || {
            let mut buf = [0u8; 8];
            let read = follower.read_blocking(&mut buf, 0, 8);
            (buf, read)
        })
        .await
        .unwrap();

        assert_eq!(assert_ok!(read), 8);
        assert_eq!(&buf, b"blocking");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_blocking_entry_points_on_worker_thread() {
        let file = TempTailFile::with_content(b"0123456789").unwrap();
        let mut follower = assert_ok!(TailingFile::open(file.path()).await);

        assert_eq!(assert_ok!(follower.len()), 10);
        assert_ok!(follower.set_position(4));
        assert_eq!(assert_ok!(follower.position()), 4);
        assert_eq!(assert_ok!(follower.seek(SeekFrom::Current(2))), 6);
        assert!(!assert_ok!(follower.is_empty()));
    }

    #[tokio::test]
    async fn test_unsupported_operations() {
        let file = TempTailFile::with_content(b"abc").unwrap();
        let mut follower = assert_ok!(TailingFile::open(file.path()).await);
        let cancel = CancellationToken::new();

        let write = follower.write_async(b"no", 0, 2, &cancel).await;
        assert!(matches!(write, Err(Error::NotSupported { operation: "write" })));

        let flush = follower.flush_async(&cancel).await;
        assert!(matches!(flush, Err(Error::NotSupported { operation: "flush" })));

        let resize = follower.set_len_async(0, &cancel).await;
        assert!(matches!(resize, Err(Error::NotSupported { operation: "set_len" })));

        assert_ok!(follower.close_async().await);
        let write = follower.write_async(b"no", 0, 2, &cancel).await;
        assert!(matches!(write, Err(Error::NotSupported { .. })));
    }

    #[tokio::test]
    async fn test_write_fails_while_read_in_flight() {
        let file = TempTailFile::new().unwrap();
        let options = quick_options().with_probe(Arc::new(AssumeWriter));
        let mut follower = assert_ok!(TailingFile::open_with(file.path(), options).await);

        // Start an `AsyncRead` read and leave it pending.
        let mut storage = [0u8; 4];
        let mut buf = ReadBuf::new(&mut storage);
        let first =
            std::future::poll_fn(|cx| Poll::Ready(Pin::new(&mut follower).poll_read(cx, &mut buf)))
                .await;
        assert!(first.is_pending());

        let cancel = CancellationToken::new();
        let write = follower.write_async(b"no", 0, 2, &cancel).await;
        assert!(matches!(write, Err(Error::NotSupported { .. })));

        assert_ok!(follower.close_async().await);
    }

    #[tokio::test]
    async fn test_read_timeout_round_trip() {
        let file = TempTailFile::new().unwrap();
        let options = quick_options().with_probe(Arc::new(AssumeWriter));
        let mut follower = assert_ok!(TailingFile::open_with(file.path(), options).await);
        let cancel = CancellationToken::new();

        assert_eq!(assert_ok!(follower.read_timeout_async(&cancel).await), None);

        let timeout = Duration::from_millis(80);
        assert_ok!(follower.set_read_timeout_async(Some(timeout), &cancel).await);
        assert_eq!(
            assert_ok!(follower.read_timeout_async(&cancel).await),
            Some(timeout)
        );

        let start = Instant::now();
        let mut buf = [0u8; 4];
        assert_eq!(assert_ok!(follower.read_async(&mut buf, 0, 4, &cancel).await), 0);
        assert!(start.elapsed() >= timeout);
    }

    #[tokio::test]
    async fn test_cancelled_read_surfaces_as_error() {
        let file = TempTailFile::new().unwrap();
        let options = quick_options().with_probe(Arc::new(AssumeWriter));
        let mut follower = assert_ok!(TailingFile::open_with(file.path(), options).await);

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(60)).await;
            trigger.cancel();
        });

        let mut buf = [0u8; 4];
        let result = follower.read_async(&mut buf, 0, 4, &cancel).await;
        assert!(matches!(result, Err(Error::Cancelled)));

        // The stream itself is still usable.
        file.append(b"ok").unwrap();
        let fresh = CancellationToken::new();
        let read = assert_ok!(follower.read_async(&mut buf, 0, 4, &fresh).await);
        assert_eq!(&buf[..read], b"ok");
    }

    #[tokio::test]
    async fn test_async_read_to_end_after_writer_closed() {
        use tokio::io::AsyncReadExt;

        let file = TempTailFile::with_content(b"first line\nsecond line\n").unwrap();
        let mut follower = assert_ok!(TailingFile::open(file.path()).await);

        let mut content = Vec::new();
        assert_ok!(follower.read_to_end(&mut content).await);
        assert_eq!(content, b"first line\nsecond line\n");
    }

    #[tokio::test]
    async fn test_close_handle_wakes_async_read() {
        use tokio::io::AsyncReadExt;

        let file = TempTailFile::new().unwrap();
        let options = quick_options().with_probe(Arc::new(AssumeWriter));
        let mut follower = assert_ok!(TailingFile::open_with(file.path(), options).await);
        let handle = follower.close_handle();

        let reader = tokio::spawn(async move {
            let mut buf = [0u8; 4];
            let read = AsyncReadExt::read(&mut follower, &mut buf).await;
            (follower, read)
        });

        tokio::time::sleep(Duration::from_millis(60)).await;
        handle.close();

        let (mut follower, read) = tokio::time::timeout(Duration::from_secs(1), reader)
            .await
            .expect("read should finish after close")
            .unwrap();
        assert_eq!(assert_ok!(read), 0);

        let cancel = CancellationToken::new();
        let mut buf = [0u8; 4];
        let after = follower.read_async(&mut buf, 0, 4, &cancel).await;
        assert!(matches!(after, Err(Error::StreamClosed)));
    }

    #[tokio::test]
    async fn test_operations_recover_after_abandoned_async_read() {
        use tokio::io::AsyncReadExt;

        let file = TempTailFile::new().unwrap();
        let options = quick_options().with_probe(Arc::new(AssumeWriter));
        let mut follower = assert_ok!(TailingFile::open_with(file.path(), options).await);

        let mut buf = [0u8; 4];
        let abandoned =
            tokio::time::timeout(Duration::from_millis(100), follower.read(&mut buf)).await;
        assert!(abandoned.is_err());

        let cancel = CancellationToken::new();
        let position =
            tokio::time::timeout(Duration::from_secs(1), follower.position_async(&cancel))
                .await
                .expect("position should not wait on the abandoned read");
        assert_eq!(assert_ok!(position), 0);
        assert_eq!(assert_ok!(follower.len_async(&cancel).await), 0);

        file.append(b"new").unwrap();
        let read = assert_ok!(follower.read_async(&mut buf, 0, 4, &cancel).await);
        assert_eq!(&buf[..read], b"new");
    }

    #[derive(Debug)]
    struct SlowProbe;

    impl WriteLockProbe for SlowProbe {
        fn is_write_locked(&self, _path: &Path) -> io::Result<bool> {
            std::thread::sleep(Duration::from_millis(300));
            Ok(true)
        }
    }

    #[tokio::test]
    async fn test_recovering_abandoned_read_honours_cancellation() {
        use tokio::io::AsyncReadExt;

        let file = TempTailFile::new().unwrap();
        let options = quick_options().with_probe(Arc::new(SlowProbe));
        let mut follower = assert_ok!(TailingFile::open_with(file.path(), options).await);

        let mut buf = [0u8; 4];
        let abandoned =
            tokio::time::timeout(Duration::from_millis(50), follower.read(&mut buf)).await;
        assert!(abandoned.is_err());

        let cancelled = CancellationToken::new();
        cancelled.cancel();
        let result = follower.position_async(&cancelled).await;
        assert!(matches!(result, Err(Error::Cancelled)));

        let cancel = CancellationToken::new();
        assert_eq!(assert_ok!(follower.position_async(&cancel).await), 0);
    }

    #[tokio::test]
    async fn test_close_handle_releases_file_for_every_operation() {
        let file = TempTailFile::with_content(b"0123456789").unwrap();
        let mut follower = assert_ok!(TailingFile::open(file.path()).await);
        let handle = follower.close_handle();

        handle.close();
        assert!(format!("{:?}", follower).contains("closed: true"));

        let cancel = CancellationToken::new();
        let seek = follower.seek_async(SeekFrom::Start(3), &cancel).await;
        assert!(matches!(seek, Err(Error::StreamClosed)));
        assert!(matches!(follower.len_async(&cancel).await, Err(Error::StreamClosed)));
        assert!(matches!(
            follower.position_async(&cancel).await,
            Err(Error::StreamClosed)
        ));
        assert_ok!(follower.close_async().await);
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let file = TempTailFile::with_content(b"abc").unwrap();
        let mut follower = assert_ok!(TailingFile::open(file.path()).await);
        let handle = follower.close_handle();

        assert_ok!(follower.close_async().await);
        assert_ok!(follower.close_async().await);
        assert!(handle.is_closed());

        let cancel = CancellationToken::new();
        assert_err!(follower.len_async(&cancel).await);
        assert!(format!("{:?}", follower).contains("closed: true"));
    }

    #[tokio::test]
    async fn test_abandoned_async_read_keeps_bytes() {
        let file = TempTailFile::with_content(b"abc").unwrap();
        let mut follower = assert_ok!(TailingFile::open(file.path()).await);

        let mut storage = [0u8; 8];
        let mut buf = ReadBuf::new(&mut storage);
        let _ =
            std::future::poll_fn(|cx| Poll::Ready(Pin::new(&mut follower).poll_read(cx, &mut buf)))
                .await;
        let already = buf.filled().to_vec();

        let cancel = CancellationToken::new();
        let mut rest = [0u8; 8];
        let read = assert_ok!(follower.read_async(&mut rest, 0, 8, &cancel).await);

        let mut seen = already;
        seen.extend_from_slice(&rest[..read]);
        assert_eq!(seen, b"abc");
        assert_eq!(assert_ok!(follower.position_async(&cancel).await), 3);
    }

    #[tokio::test]
    async fn test_into_chunks_until_end_of_stream() {
        let file = TempTailFile::with_content(b"abcdefgh").unwrap();
        let follower = assert_ok!(TailingFile::open(file.path()).await);

        let chunks: Vec<_> = follower.into_chunks(3).collect().await;
        let bytes: Vec<u8> = chunks
            .into_iter()
            .map(|chunk| chunk.unwrap())
            .inspect(|chunk| assert!(chunk.len() <= 3))
            .flatten()
            .collect();

        assert_eq!(bytes, b"abcdefgh");
    }
}
