//! Error types for caskkv
//!
//! Provides a unified error type for all operations.

use thiserror::Error;

use crate::config::IndexKind;

/// Result type alias using CaskError
pub type Result<T> = std::result::Result<T, CaskError>;

/// Unified error type for caskkv operations
#[derive(Debug, Error)]
pub enum CaskError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // -------------------------------------------------------------------------
    // Key Errors
    // -------------------------------------------------------------------------
    #[error("Key is empty")]
    KeyEmpty,

    #[error("Key not found")]
    KeyNotFound,

    // -------------------------------------------------------------------------
    // Data File Errors
    // -------------------------------------------------------------------------
    #[error("Data file {0} not found")]
    DataFileNotFound(u32),

    #[error("Data already deleted")]
    DataDeleted,

    #[error("Data corrupted: CRC mismatch (stored {stored:#010x}, computed {computed:#010x})")]
    DataCorrupted { stored: u32, computed: u32 },

    /// End of readable data; replay and merge stop scanning on this.
    #[error("Unexpected end of file")]
    UnexpectedEof,

    #[error("Malformed record: {0}")]
    MalformedRecord(String),

    #[error("Invalid data file name: {0}")]
    InvalidDataFileName(String),

    // -------------------------------------------------------------------------
    // Index Errors
    // -------------------------------------------------------------------------
    #[error("Index update failed after the record was appended")]
    IndexUpdateFailed,

    #[error("Unsupported index kind: {0:?}")]
    UnsupportedIndexKind(IndexKind),

    // -------------------------------------------------------------------------
    // Batch / Merge Errors
    // -------------------------------------------------------------------------
    #[error("Too many pending writes in batch (limit {0})")]
    TooManyPendingWrites(usize),

    #[error("Merge already in progress, try again later")]
    MergeInProgress,

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    InvalidConfig(String),
}
