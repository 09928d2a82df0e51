//! MemTable Module
//!
//! In-memory data structure for recent writes.
//!
//! ## Responsibilities
//! - Fast versioned reads and writes in memory
//! - Single-writer/multi-reader access pattern
//! - Track size for flush triggers
//! - Hand every version to the flush path
//!
//! ## Data Structure Choice
//! Using BTreeMap wrapped in RwLock, keyed by `(key, Reverse(sequence))`:
//! - All versions of a key are adjacent, newest first
//! - Exact-key lookups are a single range scan
//! - Comparator order is applied when entries leave the memtable

mod table;

use bytes::Bytes;

pub use table::MemTable;

/// Entry stored in the MemTable
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MemTableEntry {
    /// A live value
    Value(Bytes),

    /// A merge operand
    Merge(Bytes),

    /// A tombstone (deleted key)
    Tombstone,
}
