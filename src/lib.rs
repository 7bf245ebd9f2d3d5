//! # caskkv
//!
//! An embedded log-structured key-value storage engine (Bitcask model):
//! - Append-only data files with CRC32-checked records
//! - Fully in-memory index from key to on-disk position
//! - Atomic multi-key write batches
//! - Explicit merge (compaction) with hint files for fast restarts
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                 Engine (put / get / delete)                  │
//! │            (Single Writer / Multi Reader, RwLock)            │
//! └──────┬──────────────────────┬──────────────────────┬────────┘
//!        │                      │                      │
//!        ▼                      ▼                      ▼
//!  ┌───────────┐         ┌─────────────┐        ┌─────────────┐
//!  │WriteBatch │         │    Index    │        │    Merge    │
//!  │ (seq tag) │         │  (BTreeMap) │        │ (hint file) │
//!  └─────┬─────┘         └─────────────┘        └──────┬──────┘
//!        │                                             │
//!        ▼                                             ▼
//!  ┌─────────────────────────────────────────────────────────────┐
//!  │        Data Files: 000000000.scl ... (active = highest)      │
//!  └─────────────────────────────────────────────────────────────┘
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod config;
pub mod error;

pub mod batch;
pub mod data;
pub mod engine;
pub mod index;
pub mod iterator;
mod merge;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use batch::WriteBatch;
pub use config::{BatchConfig, Config, IndexKind, IteratorOptions, SyncStrategy};
pub use engine::{Engine, Stat};
pub use error::{CaskError, Result};
pub use iterator::EngineIterator;

// =============================================================================
// Version Info
// =============================================================================

/// Current version of caskkv
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
