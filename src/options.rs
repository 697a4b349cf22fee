//! Construction options for a tailing file.

use crate::probe::{WriteLockProbe, default_probe};
use std::sync::Arc;
use std::time::Duration;

/// Backoff step between two attempts to read past the current end of file.
pub const RETRY_INTERVAL: Duration = Duration::from_millis(100);

/// Options for [`TailingFile::open_with`](crate::TailingFile::open_with).
#[derive(Debug, Clone)]
pub struct TailOptions {
    /// Total wait allowed per read before it returns 0 bytes. `None` waits
    /// as long as a writer holds the file.
    pub read_timeout: Option<Duration>,
    pub retry_interval: Duration,
    /// Largest chunk moved by a single raw read.
    pub buffer_size: Option<usize>,
    /// Recorded hint, reported back by `is_async`.
    pub use_async: bool,
    pub probe: Arc<dyn WriteLockProbe>,
}

impl Default for TailOptions {
    fn default() -> Self {
        Self {
            read_timeout: None,
            retry_interval: RETRY_INTERVAL,
            buffer_size: None,
            use_async: true,
            probe: default_probe(),
        }
    }
}

impl TailOptions {
    pub fn with_read_timeout(mut self, read_timeout: Option<Duration>) -> Self {
        self.read_timeout = read_timeout;
        self
    }

    pub fn with_retry_interval(mut self, retry_interval: Duration) -> Self {
        self.retry_interval = retry_interval;
        self
    }

    pub fn with_buffer_size(mut self, buffer_size: usize) -> Self {
        self.buffer_size = Some(buffer_size);
        self
    }

    pub fn with_use_async(mut self, use_async: bool) -> Self {
        self.use_async = use_async;
        self
    }

    pub fn with_probe(mut self, probe: Arc<dyn WriteLockProbe>) -> Self {
        self.probe = probe;
        self
    }
}
