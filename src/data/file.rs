//! Data file
//!
//! Append-only sequential file of log records.

use std::path::{Path, PathBuf};

use crate::error::{CaskError, Result};

use super::io::{FileIo, IoManager};
use super::record::{decode_header, LogRecord, LogRecordPos, MAX_HEADER_SIZE};

/// Extension of numbered data files: `000000042.scl`
pub const DATA_FILE_SUFFIX: &str = "scl";

/// Key → position pairs written by merge
pub const HINT_FILE_NAME: &str = "hint-index";

/// Present once a merge finished; holds the merge boundary file id
pub const MERGE_FINISHED_FILE_NAME: &str = "merge-finished";

/// Sequence counter persisted on close
pub const SEQ_NO_FILE_NAME: &str = "seq-no";

/// An append-only file of log records
///
/// Writes always land at the end of the file and advance the write cursor.
/// Reads are positional and never touch the cursor.
pub struct DataFile {
    file_id: u32,
    write_off: u64,
    io: Box<dyn IoManager>,
}

impl DataFile {
    /// Open or create the data file `file_id` in `dir`
    pub fn open(dir: &Path, file_id: u32) -> Result<Self> {
        Self::open_path(&data_file_path(dir, file_id), file_id)
    }

    /// Open or create the hint file in `dir`
    pub fn open_hint_file(dir: &Path) -> Result<Self> {
        Self::open_path(&dir.join(HINT_FILE_NAME), 0)
    }

    /// Open or create the merge marker file in `dir`
    pub fn open_merge_finished_file(dir: &Path) -> Result<Self> {
        Self::open_path(&dir.join(MERGE_FINISHED_FILE_NAME), 0)
    }

    /// Open or create the sequence number file in `dir`
    pub fn open_seq_no_file(dir: &Path) -> Result<Self> {
        Self::open_path(&dir.join(SEQ_NO_FILE_NAME), 0)
    }

    /// Wrap an already opened I/O handle; the cursor starts at its end
    pub fn with_io(file_id: u32, io: Box<dyn IoManager>) -> Result<Self> {
        let write_off = io.size()?;
        Ok(Self {
            file_id,
            write_off,
            io,
        })
    }

    fn open_path(path: &Path, file_id: u32) -> Result<Self> {
        Self::with_io(file_id, Box::new(FileIo::open(path)?))
    }

    pub fn file_id(&self) -> u32 {
        self.file_id
    }

    /// Offset the next append will land at
    pub fn write_offset(&self) -> u64 {
        self.write_off
    }

    /// Append raw bytes, advancing the write cursor
    pub fn write(&mut self, buf: &[u8]) -> Result<usize> {
        let written = self.io.write(buf)?;
        self.write_off += written as u64;
        Ok(written)
    }

    /// Append one encoded record, returning the offset it starts at
    pub fn write_record(&mut self, record: &LogRecord) -> Result<u64> {
        let offset = self.write_off;
        self.write(&record.encode())?;
        Ok(offset)
    }

    /// Append a hint record: user key → encoded position
    pub fn write_hint_record(&mut self, key: &[u8], pos: LogRecordPos) -> Result<()> {
        let record = LogRecord::normal(key.to_vec(), pos.encode().to_vec());
        self.write_record(&record)?;
        Ok(())
    }

    /// Read the record starting at `offset`
    ///
    /// Returns the record and its encoded size. `UnexpectedEof` means there
    /// is no complete record at `offset` (end of file, zeroed or torn tail);
    /// `DataCorrupted` means the bytes are there but fail the CRC check, and
    /// `MalformedRecord` that the header itself can't be decoded.
    pub fn read_record(&self, offset: u64) -> Result<(LogRecord, u64)> {
        let file_size = self.io.size()?;
        if offset >= file_size {
            return Err(CaskError::UnexpectedEof);
        }

        // Clamp so a short record at the tail doesn't over-read
        let available = (file_size - offset).min(MAX_HEADER_SIZE as u64) as usize;
        let mut header_buf = [0u8; MAX_HEADER_SIZE];
        self.io.read_at(&mut header_buf[..available], offset)?;

        let (header, header_len) =
            decode_header(&header_buf[..available])?.ok_or(CaskError::UnexpectedEof)?;

        let payload_len = header.key_size as u64 + header.value_size as u64;
        let total = header_len as u64 + payload_len;
        if offset + total > file_size {
            return Err(CaskError::UnexpectedEof);
        }

        let mut payload = vec![0u8; payload_len as usize];
        if payload_len > 0 {
            self.io.read_at(&mut payload, offset + header_len as u64)?;
        }

        let record = LogRecord::decode_payload(&header, &header_buf[..header_len], &payload)
            .map_err(|e| {
                if let CaskError::DataCorrupted { stored, computed } = &e {
                    tracing::error!(
                        file_id = self.file_id,
                        offset,
                        stored = *stored,
                        computed = *computed,
                        "CRC mismatch while reading record"
                    );
                }
                e
            })?;

        Ok((record, total))
    }

    /// Force all writes so far to stable storage
    pub fn sync(&self) -> Result<()> {
        self.io.sync()
    }

    /// Physical file length
    pub fn size(&self) -> Result<u64> {
        self.io.size()
    }

    /// Drop everything past `len` and move the write cursor there
    pub fn truncate(&mut self, len: u64) -> Result<()> {
        self.io.truncate(len)?;
        self.write_off = len;
        Ok(())
    }
}

/// Path of data file `file_id` inside `dir`
pub fn data_file_path(dir: &Path, file_id: u32) -> PathBuf {
    dir.join(format!("{:09}.{}", file_id, DATA_FILE_SUFFIX))
}

/// Parse the id out of a data file path
///
/// "000000042.scl" → Ok(Some(42)); other extensions → Ok(None);
/// a `.scl` file with a non-numeric stem is an error.
pub fn parse_data_file_id(path: &Path) -> Result<Option<u32>> {
    if path.extension().and_then(|ext| ext.to_str()) != Some(DATA_FILE_SUFFIX) {
        return Ok(None);
    }

    let stem = path
        .file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or_default();

    stem.parse()
        .map(Some)
        .map_err(|_| CaskError::InvalidDataFileName(path.display().to_string()))
}
