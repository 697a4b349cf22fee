//! A read-only, seekable byte stream that follows a file while another
//! process is still writing it.
//!
//! Reading past the current end of file does not report end-of-stream as
//! long as a writer holds the file open. The reader backs off and retries
//! until new bytes show up, the writer goes away, or the read timeout runs
//! out.
//!
//! # Example
//!
//! ```rust,no_run
//! use tail_reader::follow;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut file = follow("app.log").await?;
//!     let mut stdout = tokio::io::stdout();
//!
//!     // Returns once the writer closes the file.
//!     tokio::io::copy(&mut file, &mut stdout).await?;
//!
//!     Ok(())
//! }
//! ```

pub mod bridge;
pub mod cancel;
mod error;
mod follower;
mod mutex;
pub mod options;
pub mod probe;
mod stream;
mod synchronized;
mod tailing;

#[cfg(test)]
mod test_helpers;

pub use cancel::CloseHandle;
pub use error::{Error, Result};
pub use options::{RETRY_INTERVAL, TailOptions};
pub use stream::{ByteStream, Capabilities, Invocation};
pub use synchronized::{IntoSynchronized, Synchronized, synchronized};
pub use tailing::TailingFile;

use std::path::Path;
use tokio_stream::Stream;

/// Opens `path` for following with default options.
pub async fn follow<P: AsRef<Path>>(path: P) -> Result<TailingFile> {
    TailingFile::open(path).await
}

/// Follows `path` and emits its bytes as chunks of at most `chunk_size`.
///
/// The stream ends when a read reports end-of-stream.
///
/// ```rust,no_run
/// use tail_reader::{TailOptions, follow_chunks};
/// use tokio_stream::StreamExt;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let chunks = follow_chunks("app.log", 4096, TailOptions::default()).await?;
///     tokio::pin!(chunks);
///
///     while let Some(chunk) = chunks.next().await {
///         print!("{}", String::from_utf8_lossy(&chunk?));
///     }
///
///     Ok(())
/// }
/// ```
pub async fn follow_chunks<P: AsRef<Path>>(
    path: P,
    chunk_size: usize,
    options: TailOptions,
) -> Result<impl Stream<Item = Result<Vec<u8>>>> {
    let file = TailingFile::open_with(path, options).await?;
    Ok(file.into_chunks(chunk_size))
}
