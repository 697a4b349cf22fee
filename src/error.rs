//! Error types for the tail reader library.

use std::io::ErrorKind;
use thiserror::Error;

/// The main error type for tail reader operations.
#[derive(Error, Debug)]
pub enum Error {
    /// I/O errors from the underlying file handle or the write-lock probe.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// File path errors.
    #[error("Invalid file path: {message}")]
    InvalidPath { message: String },

    /// A caller-supplied argument was out of range or did not belong to this stream.
    #[error("Invalid argument: {message}")]
    InvalidArgument { message: String },

    /// The file did not exist when the stream was opened.
    #[error("File not found: {path}")]
    FileNotFound { path: String },

    /// The stream is read-only; writing, flushing and resizing always fail.
    #[error("Operation not supported: {operation}")]
    NotSupported { operation: &'static str },

    /// Stream has been closed.
    #[error("Stream closed")]
    StreamClosed,

    /// The operation was cancelled before it produced a result.
    #[error("Operation cancelled")]
    Cancelled,
}

impl Error {
    pub(crate) fn not_supported(operation: &'static str) -> Self {
        Error::NotSupported { operation }
    }

    pub(crate) fn invalid_argument(message: impl Into<String>) -> Self {
        Error::InvalidArgument {
            message: message.into(),
        }
    }

    /// Returns true if this error, or the typed error wrapped inside an
    /// `std::io::Error`, is a cancellation.
    pub fn is_cancelled(&self) -> bool {
        match self {
            Error::Cancelled => true,
            Error::Io(inner) => inner
                .get_ref()
                .and_then(|source| source.downcast_ref::<Error>())
                .is_some_and(Error::is_cancelled),
            _ => false,
        }
    }

    fn io_kind(&self) -> ErrorKind {
        match self {
            Error::Io(inner) => inner.kind(),
            Error::InvalidPath { .. } | Error::InvalidArgument { .. } => ErrorKind::InvalidInput,
            Error::FileNotFound { .. } => ErrorKind::NotFound,
            Error::NotSupported { .. } => ErrorKind::Unsupported,
            Error::StreamClosed | Error::Cancelled => ErrorKind::Other,
        }
    }
}

impl From<Error> for std::io::Error {
    fn from(error: Error) -> Self {
        match error {
            Error::Io(inner) => inner,
            other => std::io::Error::new(other.io_kind(), other),
        }
    }
}

/// A convenient Result type for tail reader operations.
pub type Result<T> = std::result::Result<T, Error>;
