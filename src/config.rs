//! Configuration for caskkv
//!
//! Centralized configuration with sensible defaults.

use std::path::PathBuf;

use crate::error::{CaskError, Result};

/// Main configuration for a caskkv engine instance
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Storage Configuration
    // -------------------------------------------------------------------------
    /// Root directory for all data files
    /// Internal structure:
    ///   {dir_path}/
    ///     ├── 000000000.scl    (data files, highest id is active)
    ///     ├── hint-index       (written by merge)
    ///     ├── merge-finished   (merge boundary marker)
    ///     └── seq-no           (sequence counter, written on close)
    pub dir_path: PathBuf,

    /// Max size of a single data file before rotation (in bytes)
    pub max_file_size: u64,

    /// Sync strategy: how often to fsync the active file
    pub sync_strategy: SyncStrategy,

    // -------------------------------------------------------------------------
    // Index Configuration
    // -------------------------------------------------------------------------
    /// In-memory index backend
    pub index_kind: IndexKind,
}

/// Data file sync strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStrategy {
    /// Leave flushing to the OS page cache (fastest, least durable)
    OsBuffered,

    /// fsync after every write (safest, slowest)
    EveryWrite,

    /// fsync once this many bytes were appended since the last sync
    EveryNBytes { bytes: u64 },
}

/// Index backend selector
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexKind {
    /// Ordered balanced tree (the only implemented backend)
    BTree,

    /// Adaptive radix tree
    AdaptiveRadixTree,

    /// Skip list
    SkipList,

    /// On-disk B+ tree
    BPlusTree,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            dir_path: PathBuf::from("./caskkv_data"),
            max_file_size: 256 * 1024 * 1024, // 256 MB
            sync_strategy: SyncStrategy::OsBuffered,
            index_kind: IndexKind::BTree,
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Check option values before the engine touches the directory
    pub fn validate(&self) -> Result<()> {
        if self.dir_path.as_os_str().is_empty() {
            return Err(CaskError::InvalidConfig(
                "data directory path is empty".to_string(),
            ));
        }

        if self.max_file_size == 0 {
            return Err(CaskError::InvalidConfig(
                "max file size must be greater than 0".to_string(),
            ));
        }

        if let SyncStrategy::EveryNBytes { bytes: 0 } = self.sync_strategy {
            return Err(CaskError::InvalidConfig(
                "bytes per sync must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the data directory
    pub fn dir_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.dir_path = path.into();
        self
    }

    /// Set the max data file size (in bytes)
    pub fn max_file_size(mut self, size: u64) -> Self {
        self.config.max_file_size = size;
        self
    }

    /// Set the sync strategy
    pub fn sync_strategy(mut self, strategy: SyncStrategy) -> Self {
        self.config.sync_strategy = strategy;
        self
    }

    /// Sync after every write (`true`) or leave it to the OS (`false`)
    pub fn sync_writes(mut self, sync: bool) -> Self {
        self.config.sync_strategy = if sync {
            SyncStrategy::EveryWrite
        } else {
            SyncStrategy::OsBuffered
        };
        self
    }

    /// Set the index backend
    pub fn index_kind(mut self, kind: IndexKind) -> Self {
        self.config.index_kind = kind;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}

/// Options for a write batch
#[derive(Debug, Clone, Copy)]
pub struct BatchConfig {
    /// Max number of distinct keys pending in one batch
    pub max_batch_num: usize,

    /// fsync the active file when the batch commits
    pub sync_on_commit: bool,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            max_batch_num: 10_000,
            sync_on_commit: true,
        }
    }
}

/// Options for an engine iterator
#[derive(Debug, Clone, Default)]
pub struct IteratorOptions {
    /// Only yield keys starting with this prefix (empty = all keys)
    pub prefix: Vec<u8>,

    /// Iterate in descending key order
    pub reverse: bool,
}
