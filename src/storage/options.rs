//! Store options and metadata types

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::{StoreSnapshot, TableFilter};

/// Options for point reads and iterators
#[derive(Clone, Default)]
pub struct ReadOptions {
    /// Read view; `None` reads the latest committed state
    pub snapshot: Option<StoreSnapshot>,

    /// Ignore prefix hints and seek in total key order
    pub total_order_seek: bool,

    /// Stop iteration once the key prefix differs from the seek target's
    pub prefix_same_as_start: bool,

    /// Tables rejected by this filter are never read by the iterator
    pub table_filter: Option<Arc<dyn TableFilter>>,
}

impl fmt::Debug for ReadOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReadOptions")
            .field("snapshot", &self.snapshot.as_ref().map(|s| s.sequence()))
            .field("total_order_seek", &self.total_order_seek)
            .field("prefix_same_as_start", &self.prefix_same_as_start)
            .field("table_filter", &self.table_filter.is_some())
            .finish()
    }
}

/// Options for a manual range compaction
#[derive(Debug, Clone, Copy, Default)]
pub struct CompactRangeOptions {
    /// Block writers for the duration of the compaction
    pub exclusive: bool,

    /// Rewrite bottom-level tables even when nothing sits above them
    pub force_bottommost: bool,
}

/// Options for ingesting externally built tables
#[derive(Debug, Clone, Copy)]
pub struct IngestOptions {
    /// Rename the files into the store instead of copying them
    pub move_files: bool,

    /// Treat live snapshots as requiring a fresh global sequence number
    pub snapshot_consistency: bool,

    /// Permit assigning a global sequence number when one is required
    pub allow_global_seqno: bool,

    /// Flush an overlapping memtable instead of failing
    pub allow_blocking_flush: bool,
}

impl Default for IngestOptions {
    fn default() -> Self {
        Self {
            move_files: false,
            snapshot_consistency: true,
            allow_global_seqno: true,
            allow_blocking_flush: true,
        }
    }
}

/// Metadata about one live table file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiveFileMetadata {
    /// File name relative to the store directory
    pub name: String,
    pub level: usize,
    pub smallest_key: Vec<u8>,
    pub largest_key: Vec<u8>,
    /// File size in bytes
    pub size: u64,
    pub smallest_seqno: u64,
    pub largest_seqno: u64,
}

/// Properties recorded in a table when it is written
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableProperties {
    pub entry_count: u64,
    pub tombstone_count: u64,
    pub merge_count: u64,
    pub smallest_seqno: u64,
    pub largest_seqno: u64,
    /// Properties produced by the registered collectors
    pub user_properties: BTreeMap<String, Vec<u8>>,
}

/// Operational counters for a store
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreStats {
    pub block_cache_hits: u64,
    pub block_cache_misses: u64,
    pub block_cache_usage: u64,
    pub flushes: u64,
    pub compactions: u64,
    pub memtable_total_size: u64,
    pub live_files: u64,
    pub live_bytes: u64,
    /// Bytes sitting in level 0 waiting to be compacted
    pub pending_compaction_bytes: u64,
    pub last_sequence: u64,
}
