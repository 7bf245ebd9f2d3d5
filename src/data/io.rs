//! Raw file I/O
//!
//! The byte-level file handle underneath a data file.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;

use crate::error::Result;

/// Byte-level file primitive: positional reads, appends, sync
pub trait IoManager: Send + Sync {
    /// Fill `buf` from `offset`; fails if the file ends first
    fn read_at(&self, buf: &mut [u8], offset: u64) -> Result<()>;

    /// Append `buf` at the end of the file
    fn write(&self, buf: &[u8]) -> Result<usize>;

    /// Force written data to stable storage
    fn sync(&self) -> Result<()>;

    /// Current file length in bytes
    fn size(&self) -> Result<u64>;

    /// Cut the file down to `len` bytes
    fn truncate(&self, len: u64) -> Result<()>;
}

/// Standard file I/O backed by `std::fs::File` opened in append mode
pub struct FileIo {
    file: File,
}

impl FileIo {
    /// Open or create the file at `path`
    pub fn open(path: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(path)?;

        Ok(Self { file })
    }
}

impl IoManager for FileIo {
    fn read_at(&self, buf: &mut [u8], offset: u64) -> Result<()> {
        read_exact_at(&self.file, buf, offset)?;
        Ok(())
    }

    fn write(&self, buf: &[u8]) -> Result<usize> {
        // Append mode: every write lands at the current end of file
        (&self.file).write_all(buf)?;
        Ok(buf.len())
    }

    fn sync(&self) -> Result<()> {
        self.file.sync_all()?;
        Ok(())
    }

    fn size(&self) -> Result<u64> {
        Ok(self.file.metadata()?.len())
    }

    fn truncate(&self, len: u64) -> Result<()> {
        self.file.set_len(len)?;
        Ok(())
    }
}

#[cfg(unix)]
fn read_exact_at(file: &File, buf: &mut [u8], offset: u64) -> std::io::Result<()> {
    use std::os::unix::fs::FileExt;
    file.read_exact_at(buf, offset)
}

#[cfg(windows)]
fn read_exact_at(file: &File, mut buf: &mut [u8], mut offset: u64) -> std::io::Result<()> {
    use std::os::windows::fs::FileExt;
    while !buf.is_empty() {
        match file.seek_read(buf, offset) {
            Ok(0) => {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    "failed to fill whole buffer",
                ))
            }
            Ok(n) => {
                let rest = buf;
                buf = &mut rest[n..];
                offset += n as u64;
            }
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(())
}
