//! Index Module
//!
//! In-memory map from user key to the position of its live record.
//!
//! ## Responsibilities
//! - One entry per live key; deleted keys have no entry
//! - Ordered iteration (forward and reverse) with seek
//! - Backend chosen at open time via `IndexKind`
//!
//! ## Data Structure Choice
//! BTreeMap wrapped in RwLock:
//! - Ordered keys (byte-lexicographic) for range scans
//! - Iterators work on a sorted snapshot, never on the live map

mod btree;

pub use btree::{BTreeIndex, BTreeIterator};

use crate::config::IndexKind;
use crate::data::LogRecordPos;
use crate::error::{CaskError, Result};

/// Key → position index contract
pub trait Indexer: Send + Sync {
    /// Insert or replace; returns the previous position
    fn put(&self, key: Vec<u8>, pos: LogRecordPos) -> Option<LogRecordPos>;

    fn get(&self, key: &[u8]) -> Option<LogRecordPos>;

    /// Remove; returns the previous position and whether the key existed
    fn delete(&self, key: &[u8]) -> (Option<LogRecordPos>, bool);

    /// Number of indexed keys
    fn size(&self) -> usize;

    /// Point-in-time iterator over all entries
    fn iterator(&self, reverse: bool) -> Box<dyn IndexIterator>;

    fn close(&self) -> Result<()>;
}

/// Cursor over a sorted snapshot of index entries
pub trait IndexIterator: Send {
    /// Back to the first entry
    fn rewind(&mut self);

    /// Forward: first key > `key`. Reverse: first key <= `key`.
    fn seek(&mut self, key: &[u8]);

    fn next(&mut self);

    fn valid(&self) -> bool;

    /// Current key; only meaningful while `valid()`
    fn key(&self) -> &[u8];

    /// Current position; only meaningful while `valid()`
    fn value(&self) -> LogRecordPos;

    /// Release the snapshot
    fn close(&mut self);
}

/// Build the index backend selected by `kind`
pub fn new_indexer(kind: IndexKind) -> Result<Box<dyn Indexer>> {
    match kind {
        IndexKind::BTree => Ok(Box::new(BTreeIndex::new())),
        IndexKind::AdaptiveRadixTree | IndexKind::SkipList | IndexKind::BPlusTree => {
            Err(CaskError::UnsupportedIndexKind(kind))
        }
    }
}
