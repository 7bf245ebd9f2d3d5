//! BTree index
//!
//! BTreeMap-based index with RwLock for concurrency.

use std::collections::BTreeMap;

use parking_lot::RwLock;

use crate::data::LogRecordPos;
use crate::error::Result;

use super::{IndexIterator, Indexer};

/// Ordered in-memory index
///
/// ## Concurrency:
/// - `tree`: RwLock (many concurrent lookups, exclusive mutation)
/// - Iterators copy the entries out under the read lock
pub struct BTreeIndex {
    tree: RwLock<BTreeMap<Vec<u8>, LogRecordPos>>,
}

impl BTreeIndex {
    pub fn new() -> Self {
        Self {
            tree: RwLock::new(BTreeMap::new()),
        }
    }
}

impl Default for BTreeIndex {
    fn default() -> Self {
        Self::new()
    }
}

impl Indexer for BTreeIndex {
    fn put(&self, key: Vec<u8>, pos: LogRecordPos) -> Option<LogRecordPos> {
        self.tree.write().insert(key, pos)
    }

    fn get(&self, key: &[u8]) -> Option<LogRecordPos> {
        self.tree.read().get(key).copied()
    }

    fn delete(&self, key: &[u8]) -> (Option<LogRecordPos>, bool) {
        let old = self.tree.write().remove(key);
        let existed = old.is_some();
        (old, existed)
    }

    fn size(&self) -> usize {
        self.tree.read().len()
    }

    fn iterator(&self, reverse: bool) -> Box<dyn IndexIterator> {
        let tree = self.tree.read();
        Box::new(BTreeIterator::new(&tree, reverse))
    }

    fn close(&self) -> Result<()> {
        Ok(())
    }
}

/// Iterator over a sorted copy of the index taken at creation time
pub struct BTreeIterator {
    /// Current position in `entries`
    curr: usize,
    reverse: bool,
    /// Snapshot, ascending or descending depending on `reverse`
    entries: Vec<(Vec<u8>, LogRecordPos)>,
}

impl BTreeIterator {
    fn new(tree: &BTreeMap<Vec<u8>, LogRecordPos>, reverse: bool) -> Self {
        let entries: Vec<_> = if reverse {
            tree.iter().rev().map(|(k, v)| (k.clone(), *v)).collect()
        } else {
            tree.iter().map(|(k, v)| (k.clone(), *v)).collect()
        };

        Self {
            curr: 0,
            reverse,
            entries,
        }
    }
}

impl IndexIterator for BTreeIterator {
    fn rewind(&mut self) {
        self.curr = 0;
    }

    fn seek(&mut self, key: &[u8]) {
        self.curr = if self.reverse {
            self.entries.partition_point(|(k, _)| k.as_slice() > key)
        } else {
            self.entries.partition_point(|(k, _)| k.as_slice() <= key)
        };
    }

    fn next(&mut self) {
        self.curr += 1;
    }

    fn valid(&self) -> bool {
        self.curr < self.entries.len()
    }

    fn key(&self) -> &[u8] {
        &self.entries[self.curr].0
    }

    fn value(&self) -> LogRecordPos {
        self.entries[self.curr].1
    }

    fn close(&mut self) {
        self.entries.clear();
        self.curr = 0;
    }
}
