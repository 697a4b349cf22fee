//! The tailing read algorithm.
//!
//! A zero-byte read only ends the stream once no writer holds the file open
//! (or the read timeout is used up). Until then the follower probes, sleeps
//! one backoff step and reads again.

use crate::cancel::{CancelCause, LinkedCancellation, delay};
use crate::error::{Error, Result};
use crate::probe::WriteLockProbe;
use crate::stream::Invocation;
use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};

/// Backoff configuration applied to one logical read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct RetryPolicy {
    pub(crate) interval: Duration,
    pub(crate) read_timeout: Option<Duration>,
}

impl RetryPolicy {
    /// Length of the next sleep, clipped so the elapsed wait never passes the
    /// read timeout.
    fn next_step(&self, elapsed: Duration) -> Duration {
        match self.read_timeout {
            Some(limit) => self.interval.min(limit.saturating_sub(elapsed)),
            None => self.interval,
        }
    }

    fn exhausted(&self, elapsed: Duration) -> bool {
        self.read_timeout.is_some_and(|limit| elapsed >= limit)
    }
}

/// Owns the file handle and the per-read wait accounting.
#[derive(Debug)]
pub(crate) struct Follower {
    path: PathBuf,
    file: Option<File>,
    position: u64,
    elapsed: Duration,
    probe: Arc<dyn WriteLockProbe>,
}

impl Follower {
    pub(crate) fn new(path: PathBuf, file: File, probe: Arc<dyn WriteLockProbe>) -> Self {
        Self {
            path,
            file: Some(file),
            position: 0,
            elapsed: Duration::ZERO,
            probe,
        }
    }

    pub(crate) fn position(&self) -> u64 {
        self.position
    }

    pub(crate) fn is_released(&self) -> bool {
        self.file.is_none()
    }

    /// Reads at least one byte, or returns 0 once the file is finished or
    /// the policy's read timeout is exhausted.
    pub(crate) async fn read(
        &mut self,
        buf: &mut [u8],
        signal: &LinkedCancellation,
        invocation: Invocation,
        policy: RetryPolicy,
    ) -> Result<usize> {
        match signal.cause() {
            Some(CancelCause::Caller) => return Err(Error::Cancelled),
            Some(CancelCause::Shutdown) => {
                self.release();
                return Err(Error::StreamClosed);
            }
            None => {}
        }
        if buf.is_empty() {
            return Ok(0);
        }

        self.elapsed = Duration::ZERO;
        let result = self.read_tailing(buf, signal, invocation, policy).await;
        self.elapsed = Duration::ZERO;
        result
    }

    async fn read_tailing(
        &mut self,
        buf: &mut [u8],
        signal: &LinkedCancellation,
        invocation: Invocation,
        policy: RetryPolicy,
    ) -> Result<usize> {
        loop {
            let read = self.raw_read(buf).await?;
            if read > 0 {
                return Ok(read);
            }

            if !self.writer_active(invocation).await? {
                log::debug!("{}: no writer left, finishing read", self.path.display());
                break;
            }

            let step = policy.next_step(self.elapsed);
            match delay(step, signal).await {
                Ok(()) => {}
                Err(CancelCause::Caller) => return Err(Error::Cancelled),
                Err(CancelCause::Shutdown) => {
                    log::debug!("{}: closed while waiting for data", self.path.display());
                    self.release();
                    return Ok(0);
                }
            }
            self.elapsed += step;
            log::trace!(
                "{}: waited {:?} for new data",
                self.path.display(),
                self.elapsed
            );

            if policy.exhausted(self.elapsed) {
                log::debug!(
                    "{}: read timeout of {:?} reached",
                    self.path.display(),
                    self.elapsed
                );
                break;
            }
        }

        // A writer may have appended and closed between the last read and
        // the decision to stop.
        self.raw_read(buf).await
    }

    async fn raw_read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let file = self.file.as_mut().ok_or(Error::StreamClosed)?;
        let read = file.read(buf).await?;
        self.position += read as u64;
        Ok(read)
    }

    async fn writer_active(&self, invocation: Invocation) -> Result<bool> {
        let locked = match invocation {
            Invocation::Blocking => self.probe.is_write_locked(&self.path),
            Invocation::Async => {
                let probe = self.probe.clone();
                let path = self.path.clone();
                tokio::task::spawn_blocking(move || probe.is_write_locked(&path))
                    .await
                    .map_err(std::io::Error::other)?
            }
        };

        locked.map_err(|e| {
            log::warn!("{}: write-lock probe failed: {}", self.path.display(), e);
            Error::Io(e)
        })
    }

    pub(crate) async fn seek(&mut self, pos: SeekFrom) -> Result<u64> {
        let file = self.file.as_mut().ok_or(Error::StreamClosed)?;
        self.position = file.seek(pos).await?;
        Ok(self.position)
    }

    pub(crate) async fn len(&self) -> Result<u64> {
        let file = self.file.as_ref().ok_or(Error::StreamClosed)?;
        Ok(file.metadata().await?.len())
    }

    /// Drops the file handle. Idempotent.
    pub(crate) fn release(&mut self) {
        if self.file.take().is_some() {
            log::debug!("{}: file handle released", self.path.display());
        }
    }
}
