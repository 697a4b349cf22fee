//! Test utilities for creating temporary files that a writer appends to.

#[cfg(test)]
use std::fs::{File, OpenOptions};
#[cfg(test)]
use std::io::Write;
#[cfg(test)]
use std::path::{Path, PathBuf};

#[cfg(test)]
pub struct TempTailFile {
    pub path: PathBuf,
    _temp_dir: tempfile::TempDir,
}

#[cfg(test)]
impl TempTailFile {
    /// Create a new, empty temporary file for testing
    pub fn new() -> std::io::Result<Self> {
        let temp_dir = tempfile::tempdir()?;
        let path = temp_dir.path().join("tailed.log");

        // Create the file
        File::create(&path)?;

        Ok(Self {
            path,
            _temp_dir: temp_dir,
        })
    }

    /// Create a temporary file with initial content and no writer left open
    pub fn with_content(content: &[u8]) -> std::io::Result<Self> {
        let temp_file = Self::new()?;
        temp_file.append(content)?;
        Ok(temp_file)
    }

    /// Append bytes verbatim, closing the handle afterwards
    pub fn append(&self, content: &[u8]) -> std::io::Result<()> {
        let mut file = self.writer()?;
        file.write_all(content)?;
        file.flush()?;
        Ok(())
    }

    /// Open an append handle that stays open until dropped
    pub fn writer(&self) -> std::io::Result<File> {
        OpenOptions::new().append(true).open(&self.path)
    }

    /// Get the path to the temporary file
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_temp_tail_file_creation() {
        let temp_file = TempTailFile::new().unwrap();
        assert!(temp_file.path().exists());
    }

    #[test]
    fn test_with_content_has_no_trailing_newline() {
        let temp_file = TempTailFile::with_content(b"coucou").unwrap();

        let file_content = std::fs::read(temp_file.path()).unwrap();
        assert_eq!(file_content, b"coucou");
    }

    #[test]
    fn test_writer_appends() {
        let temp_file = TempTailFile::with_content(b"one ").unwrap();
        let mut writer = temp_file.writer().unwrap();
        writer.write_all(b"two").unwrap();
        drop(writer);

        let content = std::fs::read_to_string(temp_file.path()).unwrap();
        assert_eq!(content, "one two");
    }
}
