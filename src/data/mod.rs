//! Data Module
//!
//! On-disk representation: log records and the append-only files holding them.
//!
//! ## Responsibilities
//! - Encode/decode log records with CRC32 checksums
//! - Append records to sequential data files, read them back by offset
//! - Hint, merge marker and sequence files (same record format)
//!
//! ## Record Format
//! ```text
//! ┌─────────┬──────────┬──────────────┬──────────────┬───────┬─────────┐
//! │ CRC (4) │ Type (1) │ KeySize (≤5) │ ValSize (≤5) │  Key  │  Value  │
//! └─────────┴──────────┴──────────────┴──────────────┴───────┴─────────┘
//!   CRC covers everything after itself. Sizes are unsigned varints.
//! ```
//!
//! ## Record Key Format
//! ```text
//! ┌──────────────────┬──────────────┐
//! │ Seq (varint ≤10) │   User Key   │
//! └──────────────────┴──────────────┘
//!   Seq 0 marks a write outside any transaction.
//! ```

mod file;
mod io;
mod record;

pub use file::{
    data_file_path, parse_data_file_id, DataFile, DATA_FILE_SUFFIX, HINT_FILE_NAME,
    MERGE_FINISHED_FILE_NAME, SEQ_NO_FILE_NAME,
};
pub use io::{FileIo, IoManager};
pub use record::{
    decode_header, encode_key_with_seq, parse_key_with_seq, LogRecord, LogRecordHeader,
    LogRecordPos, LogRecordType, MAX_HEADER_SIZE, NON_TXN_SEQ, TXN_FIN_KEY,
};
