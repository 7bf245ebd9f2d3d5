//! Write Batch Module
//!
//! Groups writes and commits them as one atomically visible unit.
//!
//! ## Commit Protocol
//! 1. Take the engine's exclusive lock
//! 2. Draw a fresh sequence number
//! 3. Append every pending record with its key prefixed by the sequence
//! 4. Append a finish marker tagged with the same sequence
//! 5. Optionally sync, then apply all index updates
//!
//! Replay only applies a sequence's records once its finish marker is
//! found, so a crash anywhere before step 4 leaves no trace in the index.

use std::collections::HashMap;
use std::sync::atomic::Ordering;

use parking_lot::Mutex;

use crate::config::BatchConfig;
use crate::data::{encode_key_with_seq, LogRecord, LogRecordType};
use crate::engine::Engine;
use crate::error::{CaskError, Result};

/// Pending writes against one engine
///
/// Nothing reaches disk or the index before `commit()`.
pub struct WriteBatch<'a> {
    engine: &'a Engine,
    config: BatchConfig,
    /// User key → record to write (last write per key wins)
    pending: Mutex<HashMap<Vec<u8>, LogRecord>>,
}

impl Engine {
    /// Start a new write batch
    pub fn new_batch(&self, config: BatchConfig) -> WriteBatch<'_> {
        WriteBatch {
            engine: self,
            config,
            pending: Mutex::new(HashMap::new()),
        }
    }
}

impl<'a> WriteBatch<'a> {
    /// Stage a key-value pair
    pub fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        if key.is_empty() {
            return Err(CaskError::KeyEmpty);
        }

        let mut pending = self.pending.lock();
        self.check_capacity(&pending, key)?;
        pending.insert(key.to_vec(), LogRecord::normal(key.to_vec(), value.to_vec()));

        Ok(())
    }

    /// Stage a deletion
    ///
    /// Replaces any pending write for `key`. Whether the key exists is
    /// decided at commit time.
    pub fn delete(&self, key: &[u8]) -> Result<()> {
        if key.is_empty() {
            return Err(CaskError::KeyEmpty);
        }

        let mut pending = self.pending.lock();
        self.check_capacity(&pending, key)?;
        pending.insert(key.to_vec(), LogRecord::deleted(key.to_vec()));

        Ok(())
    }

    /// Number of distinct keys staged
    pub fn len(&self) -> usize {
        self.pending.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.lock().is_empty()
    }

    /// Write all staged records and make them visible at once
    pub fn commit(&self) -> Result<()> {
        let mut pending = self.pending.lock();
        if pending.is_empty() {
            return Ok(());
        }

        let mut files = self.engine.files.write();

        // A tombstone for a key nobody holds has nothing to remove
        let to_write: Vec<(&Vec<u8>, &LogRecord)> = pending
            .iter()
            .filter(|(key, record)| {
                record.rec_type != LogRecordType::Deleted || self.engine.index.get(key).is_some()
            })
            .collect();
        if to_write.is_empty() {
            pending.clear();
            return Ok(());
        }

        let seq = self.engine.seq_no.fetch_add(1, Ordering::SeqCst) + 1;

        let mut positions = Vec::with_capacity(to_write.len());
        for (key, record) in to_write {
            let tagged = LogRecord {
                key: encode_key_with_seq(seq, key),
                value: record.value.clone(),
                rec_type: record.rec_type,
            };
            let pos = self.engine.append_log_record(&mut files, &tagged)?;
            positions.push((key, record.rec_type, pos));
        }

        self.engine
            .append_log_record(&mut files, &LogRecord::txn_finished(seq))?;

        if self.config.sync_on_commit {
            files.sync_active()?;
        }

        // Everything is on disk; only now does the batch become visible
        let records = positions.len();
        for (key, rec_type, pos) in positions {
            match rec_type {
                LogRecordType::Normal => {
                    self.engine.index.put(key.clone(), pos);
                }
                LogRecordType::Deleted => {
                    self.engine.index.delete(key);
                }
                LogRecordType::TxnFinished => {}
            }
        }

        tracing::debug!(seq, records, "committed batch");
        pending.clear();

        Ok(())
    }

    fn check_capacity(&self, pending: &HashMap<Vec<u8>, LogRecord>, key: &[u8]) -> Result<()> {
        if pending.len() >= self.config.max_batch_num && !pending.contains_key(key) {
            return Err(CaskError::TooManyPendingWrites(self.config.max_batch_num));
        }
        Ok(())
    }
}
