//! Storage Module
//!
//! The ordered key/value store the MVCC layer runs on, and the narrow
//! interface it is consumed through.
//!
//! ## Responsibilities
//! - Define the `KvStore` / `StoreIterator` interface and its plug-in seams
//! - Provide `LsmStore`, a log-structured merge store built from the WAL,
//!   memtable, SSTable and storage-manager layers
//! - Versioned entries, snapshots, merge resolution and compaction
//!
//! ## Layout
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                        LsmStore                          │
//! │  write_lock ─► WAL ─► MemTable ──flush──► level 0        │
//! │                                             │            │
//! │                          compaction ◄───────┘            │
//! │                              │                           │
//! │                              ▼                           │
//! │                       bottom level (num_levels - 1)      │
//! └──────────────────────────────────────────────────────────┘
//! ```
//! Every write carries a sequence number. A read at sequence `s` sees, for
//! each key, the newest version with sequence `<= s`, with merge operands
//! folded onto it.

mod cache;
mod entry;
mod lsm;
mod manager;
mod manifest;
mod merging;
mod options;
mod plugin;
mod resolve;
mod snapshot;
mod sstable;
mod write_batch;

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use crate::error::Result;

pub use cache::BlockCache;
pub use entry::{compare_entries, group_by_key, sort_entries, ValueKind, VersionedEntry};
pub use lsm::{LsmStore, StoreOptions};
pub use manager::{StorageManager, TableHandle, Version};
pub use manifest::{Manifest, ManifestFile, MANIFEST_FILENAME};
pub use merging::{IteratorTracker, MergingIterator, PrefixBound};
pub use options::{
    CompactRangeOptions, IngestOptions, LiveFileMetadata, ReadOptions, StoreStats, TableProperties,
};
pub use plugin::{
    BytewiseComparator, KeyComparator, MergeOperator, PrefixExtractor, TableFilter,
    TablePropertiesCollector, TablePropertiesCollectorFactory,
};
pub use resolve::{collapse_versions, resolve_versions};
pub use snapshot::{SnapshotList, StoreSnapshot};
pub use sstable::{SSTableBuilder, SSTableIterator, SSTableReader, TableInfo};
pub use write_batch::{BatchOp, WriteBatch};

/// Cursor over the resolved contents of a store.
///
/// Owned and driven by a single caller. `key`/`value` borrow from the
/// iterator and are only meaningful while `valid()` holds.
pub trait StoreIterator: Send {
    fn valid(&self) -> bool;

    /// Position at the first key `>= target`
    fn seek(&mut self, target: &[u8]);

    fn seek_to_first(&mut self);

    fn seek_to_last(&mut self);

    fn next(&mut self);

    fn prev(&mut self);

    fn key(&self) -> &[u8];

    fn value(&self) -> &[u8];

    fn status(&self) -> Result<()>;

    /// Deleted versions passed over so far
    fn deleted_entries_skipped(&self) -> u64 {
        0
    }
}

/// Ordered byte-string key/value store.
///
/// Shared by any number of concurrent readers and writers; the store does
/// its own locking.
pub trait KvStore: Send + Sync + fmt::Debug {
    /// Apply a batch atomically
    fn write(&self, batch: &WriteBatch, sync: bool) -> Result<()>;

    fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        let mut batch = WriteBatch::new();
        batch.put(key, value);
        self.write(&batch, false)
    }

    fn merge(&self, key: &[u8], value: &[u8]) -> Result<()> {
        let mut batch = WriteBatch::new();
        batch.merge(key, value);
        self.write(&batch, false)
    }

    fn delete(&self, key: &[u8]) -> Result<()> {
        let mut batch = WriteBatch::new();
        batch.delete(key);
        self.write(&batch, false)
    }

    /// Delete every key in `[start, end)`
    fn delete_range(&self, start: &[u8], end: &[u8]) -> Result<()> {
        let mut batch = WriteBatch::new();
        batch.delete_range(start, end);
        self.write(&batch, false)
    }

    fn get(&self, options: &ReadOptions, key: &[u8]) -> Result<Option<Vec<u8>>>;

    fn new_iterator(&self, options: ReadOptions) -> Result<Box<dyn StoreIterator>>;

    /// Pin the current state for later reads
    fn snapshot(&self) -> StoreSnapshot;

    /// Compact the tables overlapping `[start, end)`; `None` is unbounded
    fn compact_range(
        &self,
        options: &CompactRangeOptions,
        start: Option<&[u8]>,
        end: Option<&[u8]>,
    ) -> Result<()>;

    fn flush(&self) -> Result<()>;

    fn sync_wal(&self) -> Result<()>;

    fn live_files_metadata(&self) -> Vec<LiveFileMetadata>;

    fn num_levels(&self) -> usize;

    /// Bytes of table data overlapping `[start, end)`
    fn approximate_size(&self, start: &[u8], end: &[u8]) -> u64;

    fn ingest_external_files(&self, paths: &[PathBuf], options: &IngestOptions) -> Result<()>;

    /// Properties of every live table, keyed by file name
    fn table_properties(&self) -> Result<Vec<(String, TableProperties)>>;

    fn stats(&self) -> StoreStats;

    fn comparator(&self) -> Arc<dyn KeyComparator>;

    fn merge_operator(&self) -> Option<Arc<dyn MergeOperator>>;

    /// Flush, sync and release the store. Reports leaked iterators.
    fn close(&self) -> Result<()>;
}
