//! Engine iterator
//!
//! Key-range iteration over a snapshot of the index, resolving values
//! from the data files on demand.

use crate::config::IteratorOptions;
use crate::engine::Engine;
use crate::error::Result;
use crate::index::IndexIterator;

/// Iterator over live keys, optionally restricted to a prefix
///
/// The key set is fixed when the iterator is created; `value()` reads the
/// record the snapshot points at.
pub struct EngineIterator<'a> {
    engine: &'a Engine,
    inner: Box<dyn IndexIterator>,
    options: IteratorOptions,
}

impl Engine {
    /// Create an iterator over the current key set
    pub fn iter(&self, options: IteratorOptions) -> EngineIterator<'_> {
        let inner = {
            let _files = self.files.read();
            self.index.iterator(options.reverse)
        };

        let mut iter = EngineIterator {
            engine: self,
            inner,
            options,
        };
        iter.skip_to_prefix();
        iter
    }
}

impl<'a> EngineIterator<'a> {
    /// Back to the first matching key
    pub fn rewind(&mut self) {
        self.inner.rewind();
        self.skip_to_prefix();
    }

    /// Forward: first key > `key`. Reverse: first key <= `key`.
    pub fn seek(&mut self, key: &[u8]) {
        self.inner.seek(key);
        self.skip_to_prefix();
    }

    pub fn next(&mut self) {
        self.inner.next();
        self.skip_to_prefix();
    }

    pub fn valid(&self) -> bool {
        self.inner.valid()
    }

    pub fn key(&self) -> &[u8] {
        self.inner.key()
    }

    /// Read the value for the current key
    pub fn value(&self) -> Result<Vec<u8>> {
        let files = self.engine.files.read();
        Engine::read_value(&files, self.inner.value())
    }

    pub fn close(&mut self) {
        self.inner.close();
    }

    fn skip_to_prefix(&mut self) {
        if self.options.prefix.is_empty() {
            return;
        }

        while self.inner.valid() && !self.inner.key().starts_with(&self.options.prefix) {
            self.inner.next();
        }
    }
}
