//! Engine Module
//!
//! The core storage engine that coordinates all components.
//!
//! ## Responsibilities
//! - Own the active data file, the sealed data files and the index
//! - Append records and rotate the active file when it fills up
//! - Serve reads through index → data file → record
//! - Rebuild the index on startup (hint file, then data file replay)

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::config::{Config, SyncStrategy};
use crate::data::{
    encode_key_with_seq, parse_data_file_id, parse_key_with_seq, DataFile, LogRecord,
    LogRecordPos, LogRecordType, HINT_FILE_NAME, NON_TXN_SEQ, SEQ_NO_FILE_NAME,
};
use crate::error::{CaskError, Result};
use crate::index::{self, Indexer};
use crate::merge;

/// Id given to the very first data file of a directory
const INITIAL_FILE_ID: u32 = 0;

/// Key of the single record in the sequence number file
const SEQ_NO_KEY: &[u8] = b"seq.no";

/// The main storage engine
///
/// ## Concurrency Model: Single-Writer / Multiple-Reader (SWMR)
///
/// - **Writes** (put/delete/commit): exclusive `files` lock
///   - Append + rotation + index update happen as one unit
///
/// - **Reads** (get/iterator creation): shared `files` lock
///   - Sealed file handles stay open for the engine's lifetime
///
/// - **Merge**: exclusive lock only to seal the active file and snapshot
///   the sealed set; the rewrite itself reads sealed files unlocked
pub struct Engine {
    /// Engine configuration
    config: Config,

    /// Active + sealed data files
    pub(crate) files: RwLock<FileSet>,

    /// Key → position of the live record
    pub(crate) index: Box<dyn Indexer>,

    /// Last sequence number handed to a batch
    pub(crate) seq_no: AtomicU64,

    /// Set while a merge runs
    pub(crate) merging: AtomicBool,
}

/// Engine statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stat {
    /// Number of live keys
    pub key_count: usize,

    /// Number of data files (sealed + active)
    pub data_file_count: usize,

    /// Bytes occupied by data files
    pub disk_size: u64,
}

/// Data files of one engine: exactly one writable, the rest sealed
pub(crate) struct FileSet {
    pub(crate) active: Option<DataFile>,

    /// Shared so merge can read them without holding the engine lock
    pub(crate) sealed: HashMap<u32, Arc<DataFile>>,

    /// Bytes appended since the active file was last synced
    unsynced_bytes: u64,
}

impl FileSet {
    /// Resolve a file id to the active or a sealed file
    pub(crate) fn get(&self, file_id: u32) -> Option<&DataFile> {
        match &self.active {
            Some(active) if active.file_id() == file_id => Some(active),
            _ => self.sealed.get(&file_id).map(|file| file.as_ref()),
        }
    }

    /// Active file, opening the first one lazily
    fn active_file(&mut self, dir: &Path) -> Result<&mut DataFile> {
        let active = match self.active.take() {
            Some(active) => active,
            None => DataFile::open(dir, INITIAL_FILE_ID)?,
        };
        Ok(self.active.insert(active))
    }

    /// Seal the active file and open its successor
    pub(crate) fn rotate(&mut self, dir: &Path) -> Result<()> {
        let next_id = match &self.active {
            Some(active) => {
                active.sync()?;
                active.file_id() + 1
            }
            None => INITIAL_FILE_ID,
        };

        let next = DataFile::open(dir, next_id)?;
        if let Some(old) = self.active.replace(next) {
            tracing::debug!(sealed = old.file_id(), active = next_id, "rotated data file");
            self.sealed.insert(old.file_id(), Arc::new(old));
        }
        self.unsynced_bytes = 0;

        Ok(())
    }

    /// Append an encoded record, rotating first if it would overflow
    fn append(&mut self, config: &Config, encoded: &[u8]) -> Result<LogRecordPos> {
        let len = encoded.len() as u64;

        let needs_rotation = {
            let active = self.active_file(&config.dir_path)?;
            // An empty file always takes the record, however large
            active.write_offset() > 0 && active.write_offset() + len > config.max_file_size
        };
        if needs_rotation {
            self.rotate(&config.dir_path)?;
        }

        self.unsynced_bytes += len;
        let needs_sync = match config.sync_strategy {
            SyncStrategy::OsBuffered => false,
            SyncStrategy::EveryWrite => true,
            SyncStrategy::EveryNBytes { bytes } => self.unsynced_bytes >= bytes,
        };

        let active = self.active_file(&config.dir_path)?;
        let pos = LogRecordPos {
            file_id: active.file_id(),
            offset: active.write_offset(),
        };
        active.write(encoded)?;

        if needs_sync {
            active.sync()?;
            self.unsynced_bytes = 0;
        }

        Ok(pos)
    }

    pub(crate) fn sync_active(&mut self) -> Result<()> {
        if let Some(active) = &self.active {
            active.sync()?;
        }
        self.unsynced_bytes = 0;
        Ok(())
    }

    fn len(&self) -> usize {
        self.sealed.len() + usize::from(self.active.is_some())
    }
}

impl Engine {
    /// Open or create an engine with the given config
    ///
    /// On startup:
    /// 1. Validate config, create the data directory
    /// 2. Adopt (or discard) the output of a previous merge
    /// 3. Open every data file, highest id becomes active
    /// 4. Load the hint file, then replay data files not covered by it
    pub fn open(config: Config) -> Result<Self> {
        // Step 1: Validate and create data directory
        config.validate()?;
        fs::create_dir_all(&config.dir_path)?;

        let index = index::new_indexer(config.index_kind)?;

        // Step 2: Finish a merge that completed before the last shutdown
        merge::adopt_merge_output(&config.dir_path)?;

        // Step 3: Open data files
        let (files, file_ids) = Self::load_data_files(&config.dir_path)?;

        let engine = Self {
            config,
            files: RwLock::new(files),
            index,
            seq_no: AtomicU64::new(NON_TXN_SEQ),
            merging: AtomicBool::new(false),
        };

        // Step 4: Rebuild the index
        let boundary = if engine.load_index_from_hint_file()? {
            merge::read_merge_boundary(&engine.config.dir_path)?.unwrap_or(INITIAL_FILE_ID)
        } else {
            INITIAL_FILE_ID
        };
        let max_seq = engine.load_index_from_data_files(&file_ids, boundary)?;

        let seq_no = max_seq.max(Self::load_seq_no(&engine.config.dir_path)?);
        engine.seq_no.store(seq_no, Ordering::SeqCst);

        tracing::info!(
            dir = %engine.config.dir_path.display(),
            files = file_ids.len(),
            keys = engine.index.size(),
            seq_no,
            "engine opened"
        );

        Ok(engine)
    }

    /// Open with a path (convenience method)
    ///
    /// Uses default config with the specified data directory
    pub fn open_path(path: &Path) -> Result<Self> {
        Self::open(Config::builder().dir_path(path).build())
    }

    /// Store a key-value pair
    pub fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        if key.is_empty() {
            return Err(CaskError::KeyEmpty);
        }

        let record = LogRecord::normal(encode_key_with_seq(NON_TXN_SEQ, key), value.to_vec());

        let mut files = self.files.write();
        let pos = self.append_log_record(&mut files, &record)?;
        self.index.put(key.to_vec(), pos);

        Ok(())
    }

    /// Get the current value of a key
    pub fn get(&self, key: &[u8]) -> Result<Vec<u8>> {
        if key.is_empty() {
            return Err(CaskError::KeyEmpty);
        }

        let files = self.files.read();
        let pos = self.index.get(key).ok_or(CaskError::KeyNotFound)?;
        Self::read_value(&files, pos)
    }

    /// Delete a key
    ///
    /// Appends a tombstone so a replay of older files cannot revive the key.
    pub fn delete(&self, key: &[u8]) -> Result<()> {
        if key.is_empty() {
            return Err(CaskError::KeyEmpty);
        }

        let mut files = self.files.write();
        if self.index.get(key).is_none() {
            return Err(CaskError::KeyNotFound);
        }

        let record = LogRecord::deleted(encode_key_with_seq(NON_TXN_SEQ, key));
        self.append_log_record(&mut files, &record)?;

        let (_, existed) = self.index.delete(key);
        if !existed {
            return Err(CaskError::IndexUpdateFailed);
        }

        Ok(())
    }

    /// All live keys in ascending order
    pub fn list_keys(&self) -> Vec<Vec<u8>> {
        let _files = self.files.read();
        let mut iter = self.index.iterator(false);

        let mut keys = Vec::with_capacity(self.index.size());
        while iter.valid() {
            keys.push(iter.key().to_vec());
            iter.next();
        }
        iter.close();

        keys
    }

    /// Visit every live key-value pair in ascending key order
    ///
    /// Stops early once `f` returns `false`. The key set is fixed when the
    /// fold starts, and no lock is held while `f` runs, so `f` may write.
    pub fn fold<F>(&self, mut f: F) -> Result<()>
    where
        F: FnMut(&[u8], &[u8]) -> bool,
    {
        let mut iter = {
            let _files = self.files.read();
            self.index.iterator(false)
        };

        while iter.valid() {
            let value = {
                let files = self.files.read();
                Self::read_value(&files, iter.value())?
            };
            if !f(iter.key(), &value) {
                break;
            }
            iter.next();
        }
        iter.close();

        Ok(())
    }

    /// Engine statistics
    pub fn stat(&self) -> Result<Stat> {
        let files = self.files.read();

        let mut disk_size = 0;
        if let Some(active) = &files.active {
            disk_size += active.size()?;
        }
        for file in files.sealed.values() {
            disk_size += file.size()?;
        }

        Ok(Stat {
            key_count: self.index.size(),
            data_file_count: files.len(),
            disk_size,
        })
    }

    /// Force the active file to stable storage
    pub fn sync(&self) -> Result<()> {
        self.files.write().sync_active()
    }

    /// Close the engine gracefully
    ///
    /// Syncs the active file and persists the sequence counter.
    pub fn close(self) -> Result<()> {
        self.files.write().sync_active()?;

        let seq_no = self.seq_no.load(Ordering::SeqCst);
        Self::save_seq_no(&self.config.dir_path, seq_no)?;

        self.index.close()?;

        tracing::info!(dir = %self.config.dir_path.display(), seq_no, "engine closed");
        Ok(())
    }

    // =========================================================================
    // Accessors (for testing and debugging)
    // =========================================================================

    /// Get the data directory path
    pub fn dir_path(&self) -> &Path {
        &self.config.dir_path
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Id of the active data file, if one was opened
    pub fn active_file_id(&self) -> Option<u32> {
        self.files.read().active.as_ref().map(DataFile::file_id)
    }

    /// Ids of the sealed data files, ascending
    pub fn sealed_file_ids(&self) -> Vec<u32> {
        let mut ids: Vec<u32> = self.files.read().sealed.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    // =========================================================================
    // Write / Read Path
    // =========================================================================

    /// Append a record; the caller holds the exclusive `files` lock
    pub(crate) fn append_log_record(
        &self,
        files: &mut FileSet,
        record: &LogRecord,
    ) -> Result<LogRecordPos> {
        files.append(&self.config, &record.encode())
    }

    /// Append a record, taking the `files` lock
    pub(crate) fn append_record(&self, record: &LogRecord) -> Result<LogRecordPos> {
        let mut files = self.files.write();
        self.append_log_record(&mut files, record)
    }

    /// Resolve a position to the value stored there
    pub(crate) fn read_value(files: &FileSet, pos: LogRecordPos) -> Result<Vec<u8>> {
        let file = files
            .get(pos.file_id)
            .ok_or(CaskError::DataFileNotFound(pos.file_id))?;

        let (record, _) = file.read_record(pos.offset)?;
        if record.rec_type == LogRecordType::Deleted {
            return Err(CaskError::DataDeleted);
        }

        Ok(record.value)
    }

    // =========================================================================
    // Startup
    // =========================================================================

    /// Open every data file in `dir`, highest id as the active file
    fn load_data_files(dir: &Path) -> Result<(FileSet, Vec<u32>)> {
        let mut file_ids = Vec::new();
        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            if path.is_file() {
                if let Some(id) = parse_data_file_id(&path)? {
                    file_ids.push(id);
                }
            }
        }
        file_ids.sort_unstable();

        let mut files = FileSet {
            active: None,
            sealed: HashMap::with_capacity(file_ids.len()),
            unsynced_bytes: 0,
        };

        if let Some((&last, rest)) = file_ids.split_last() {
            for &id in rest {
                files.sealed.insert(id, Arc::new(DataFile::open(dir, id)?));
            }
            files.active = Some(DataFile::open(dir, last)?);
        }

        Ok((files, file_ids))
    }

    /// Load key → position pairs from the hint file
    ///
    /// Returns whether a hint file was present.
    fn load_index_from_hint_file(&self) -> Result<bool> {
        let hint_path = self.config.dir_path.join(HINT_FILE_NAME);
        if !hint_path.is_file() {
            return Ok(false);
        }

        let hint_file = DataFile::open_hint_file(&self.config.dir_path)?;
        let mut offset = 0;
        let mut loaded = 0usize;

        loop {
            let (record, size) = match hint_file.read_record(offset) {
                Ok(r) => r,
                Err(CaskError::UnexpectedEof) => break,
                Err(e) => return Err(e),
            };

            let pos = LogRecordPos::decode(&record.value).ok_or_else(|| {
                CaskError::MalformedRecord(format!("bad hint position at offset {}", offset))
            })?;
            self.index.put(record.key, pos);

            loaded += 1;
            offset += size;
        }

        tracing::debug!(entries = loaded, "loaded hint file");
        Ok(true)
    }

    /// Replay data files with id >= `boundary` into the index
    ///
    /// Batch records are held back until their finish marker shows up;
    /// batches without one are dropped. Returns the highest sequence seen.
    fn load_index_from_data_files(&self, file_ids: &[u32], boundary: u32) -> Result<u64> {
        let mut files = self.files.write();

        let mut pending_txns: HashMap<u64, Vec<(Vec<u8>, LogRecordType, LogRecordPos)>> =
            HashMap::new();
        let mut max_seq = NON_TXN_SEQ;
        let mut active_end = None;

        for &file_id in file_ids.iter().filter(|&&id| id >= boundary) {
            let file = files
                .get(file_id)
                .ok_or(CaskError::DataFileNotFound(file_id))?;

            let mut offset = 0;
            loop {
                let (record, size) = match file.read_record(offset) {
                    Ok(r) => r,
                    Err(CaskError::UnexpectedEof) => break,
                    Err(e) => return Err(e),
                };

                let pos = LogRecordPos { file_id, offset };
                let (seq, key) = parse_key_with_seq(&record.key).ok_or_else(|| {
                    CaskError::MalformedRecord(format!(
                        "bad sequence prefix in file {} at offset {}",
                        file_id, offset
                    ))
                })?;

                if seq == NON_TXN_SEQ {
                    self.apply_replayed(key.to_vec(), record.rec_type, pos);
                } else {
                    max_seq = max_seq.max(seq);
                    if record.rec_type == LogRecordType::TxnFinished {
                        for (key, rec_type, pos) in pending_txns.remove(&seq).unwrap_or_default() {
                            self.apply_replayed(key, rec_type, pos);
                        }
                    } else {
                        pending_txns
                            .entry(seq)
                            .or_default()
                            .push((key.to_vec(), record.rec_type, pos));
                    }
                }

                offset += size;
            }

            tracing::debug!(file_id, end = offset, "replayed data file");

            if files.active.as_ref().map(DataFile::file_id) == Some(file_id) {
                active_end = Some(offset);
            }
        }

        if !pending_txns.is_empty() {
            tracing::warn!(
                transactions = pending_txns.len(),
                "discarding transactions without a finish marker"
            );
        }

        // Resume appends where the last valid record ended
        if let (Some(end), Some(active)) = (active_end, files.active.as_mut()) {
            let size = active.size()?;
            if end < size {
                tracing::warn!(
                    file_id = active.file_id(),
                    valid = end,
                    size,
                    "truncating torn tail of active file"
                );
                active.truncate(end)?;
            }
        }

        Ok(max_seq)
    }

    fn apply_replayed(&self, key: Vec<u8>, rec_type: LogRecordType, pos: LogRecordPos) {
        match rec_type {
            LogRecordType::Normal => {
                self.index.put(key, pos);
            }
            LogRecordType::Deleted => {
                self.index.delete(&key);
            }
            LogRecordType::TxnFinished => {}
        }
    }

    // =========================================================================
    // Sequence Number File
    // =========================================================================

    fn load_seq_no(dir: &Path) -> Result<u64> {
        if !dir.join(SEQ_NO_FILE_NAME).is_file() {
            return Ok(NON_TXN_SEQ);
        }

        let file = DataFile::open_seq_no_file(dir)?;
        let (record, _) = match file.read_record(0) {
            Ok(r) => r,
            Err(CaskError::UnexpectedEof) => return Ok(NON_TXN_SEQ),
            Err(e) => return Err(e),
        };

        std::str::from_utf8(&record.value)
            .ok()
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| CaskError::MalformedRecord("bad sequence number file".to_string()))
    }

    fn save_seq_no(dir: &Path, seq_no: u64) -> Result<()> {
        let path: PathBuf = dir.join(SEQ_NO_FILE_NAME);
        if path.exists() {
            fs::remove_file(&path)?;
        }

        let mut file = DataFile::open_seq_no_file(dir)?;
        file.write_record(&LogRecord::normal(
            SEQ_NO_KEY.to_vec(),
            seq_no.to_string().into_bytes(),
        ))?;
        file.sync()
    }
}
