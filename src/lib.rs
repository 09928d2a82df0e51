//! # mvcckv
//!
//! A multi-version key/value storage engine with:
//! - Versioned keys ordered newest-first by a custom comparator
//! - A merge operator over metadata records
//! - Version-skipping and time-bound iteration
//! - Space-bounded manual compaction
//! - An embedded LSM store (WAL, memtable, leveled SSTables)
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                         Engine                              │
//! │     Snapshot / Batch / WriteOnlyBatch / SstFileWriter       │
//! └──────┬──────────────────┬──────────────────┬────────────────┘
//!        │ encode           │ wrap             │ plan
//!        ▼                  ▼                  ▼
//!  ┌───────────┐     ┌─────────────┐    ┌─────────────┐
//!  │    Key    │     │  Iterator   │    │ Compaction  │
//!  │  (codec)  │     │(skip, time) │    │  (batcher)  │
//!  └───────────┘     └──────┬──────┘    └──────┬──────┘
//!                           │                  │
//! ┌─────────────────────────▼──────────────────▼────────────────┐
//! │                 KvStore (LsmStore)  ◄── Merge operator      │
//! │        WAL ──► MemTable ──► SSTables (levels)               │
//! └─────────────────────────────┬───────────────────────────────┘
//!                               ▼
//!                     Env (DiskEnv / MemEnv)
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod key;
pub mod env;
pub mod wal;
pub mod memtable;
pub mod storage;
pub mod merge;
pub mod iterator;
pub mod compaction;
pub mod engine;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{DecodeError, MergeError, MvccError, Result};
pub use config::{Config, OpenHook, WalSyncStrategy};
pub use key::{decode_key, encode_key, split_key, Timestamp, VersionedKey, VersionedKeyRef};
pub use merge::{merge_one, partial_merge_one, MetadataRecord};
pub use iterator::{IterState, IteratorStats, MvccIterator};
pub use compaction::{batch_tables_for_compaction, CompactionRange};
pub use engine::{Batch, Engine, IterOptions, Reader, Snapshot, SstFileWriter, WriteOnlyBatch, Writer};

// =============================================================================
// Version Info
// =============================================================================

/// Current version of mvcckv
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
