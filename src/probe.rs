//! Write-lock probes: decide whether another handle still holds a file open
//! for writing.
//!
//! The follower asks its probe after every zero-byte read. A probe that says
//! "locked" keeps the follower waiting; one that says "free" lets it finish
//! with a final read.

use std::fmt::Debug;
use std::io;
use std::path::Path;
use std::sync::Arc;

/// A pluggable answer to "is this path currently open for writing by
/// someone else?".
pub trait WriteLockProbe: Debug + Send + Sync {
    /// Returns `Ok(true)` while a writer holds the file open.
    ///
    /// Errors other than the platform's sharing violation are returned
    /// unchanged and abort the read that asked.
    fn is_write_locked(&self, path: &Path) -> io::Result<bool>;
}

/// Fallback for platforms without reliable probing: a zero-byte read always
/// means "more may be coming". Only the read timeout or closing the stream
/// ends such a follower.
#[derive(Debug, Default, Clone, Copy)]
pub struct AssumeWriter;

impl WriteLockProbe for AssumeWriter {
    fn is_write_locked(&self, _path: &Path) -> io::Result<bool> {
        Ok(true)
    }
}

/// Picks the most reliable probe for the current platform.
pub fn default_probe() -> Arc<dyn WriteLockProbe> {
    #[cfg(target_os = "linux")]
    {
        if Path::new(linux::PROC_SELF_FDINFO).is_dir() {
            return Arc::new(ProcFdProbe);
        }
        Arc::new(AssumeWriter)
    }

    #[cfg(windows)]
    {
        Arc::new(ShareModeProbe)
    }

    #[cfg(not(any(target_os = "linux", windows)))]
    {
        Arc::new(AssumeWriter)
    }
}

#[cfg(target_os = "linux")]
pub use linux::ProcFdProbe;

#[cfg(windows)]
pub use windows::ShareModeProbe;

#[cfg(target_os = "linux")]
mod linux {
    use super::WriteLockProbe;
    use std::fs;
    use std::io;
    use std::os::unix::fs::MetadataExt;
    use std::path::Path;

    pub(super) const PROC_SELF_FDINFO: &str = "/proc/self/fdinfo";

    const O_ACCMODE: u32 = 0o3;
    const O_RDONLY: u32 = 0o0;

    /// Scans `/proc/<pid>/fd` for descriptors referring to the same inode and
    /// reads their access mode from `/proc/<pid>/fdinfo`.
    ///
    /// Processes we are not allowed to inspect are skipped, so writers owned
    /// by other users are invisible without the matching privileges.
    #[derive(Debug, Default, Clone, Copy)]
    pub struct ProcFdProbe;

    impl WriteLockProbe for ProcFdProbe {
        fn is_write_locked(&self, path: &Path) -> io::Result<bool> {
            let target = fs::metadata(path)?;
            let (dev, ino) = (target.dev(), target.ino());

            for process in fs::read_dir("/proc")?.flatten() {
                let is_pid = process
                    .file_name()
                    .to_str()
                    .is_some_and(|name| name.bytes().all(|b| b.is_ascii_digit()));
                if !is_pid {
                    continue;
                }

                let Ok(descriptors) = fs::read_dir(process.path().join("fd")) else {
                    continue;
                };

                for descriptor in descriptors.flatten() {
                    // Follows the fd symlink to the opened file.
                    let Ok(opened) = fs::metadata(descriptor.path()) else {
                        continue;
                    };
                    if opened.dev() != dev || opened.ino() != ino {
                        continue;
                    }

                    let fdinfo = process.path().join("fdinfo").join(descriptor.file_name());
                    let Ok(info) = fs::read_to_string(fdinfo) else {
                        continue;
                    };
                    if parse_flags(&info).is_some_and(opened_for_write) {
                        return Ok(true);
                    }
                }
            }

            Ok(false)
        }
    }

    /// Extracts the octal `flags:` field of an fdinfo file.
    pub(super) fn parse_flags(fdinfo: &str) -> Option<u32> {
        fdinfo
            .lines()
            .find_map(|line| line.strip_prefix("flags:"))
            .and_then(|flags| u32::from_str_radix(flags.trim(), 8).ok())
    }

    pub(super) fn opened_for_write(flags: u32) -> bool {
        flags & O_ACCMODE != O_RDONLY
    }
}

#[cfg(windows)]
mod windows {
    use super::WriteLockProbe;
    use std::fs::OpenOptions;
    use std::io;
    use std::os::windows::fs::OpenOptionsExt;
    use std::path::Path;

    const FILE_SHARE_READ: u32 = 0x0000_0001;
    const ERROR_SHARING_VIOLATION: i32 = 32;

    /// Opens the path for writing while only sharing reads. The open fails
    /// with a sharing violation exactly when another handle has write access.
    #[derive(Debug, Default, Clone, Copy)]
    pub struct ShareModeProbe;

    impl WriteLockProbe for ShareModeProbe {
        fn is_write_locked(&self, path: &Path) -> io::Result<bool> {
            match OpenOptions::new()
                .write(true)
                .share_mode(FILE_SHARE_READ)
                .open(path)
            {
                Ok(probe) => {
                    drop(probe);
                    Ok(false)
                }
                Err(e) if e.raw_os_error() == Some(ERROR_SHARING_VIOLATION) => Ok(true),
                Err(e) => Err(e),
            }
        }
    }
}
