//! MemTable implementation
//!
//! BTreeMap-based versioned memtable with RwLock for concurrency.

use std::cmp::{Ordering as CmpOrdering, Reverse};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use bytes::Bytes;
use parking_lot::RwLock;

use crate::storage::{KeyComparator, ValueKind, VersionedEntry};

use super::MemTableEntry;

/// Per-entry bookkeeping charged on top of key and value bytes
const ENTRY_OVERHEAD: usize = 16;

type VersionKey = (Bytes, Reverse<u64>);

/// In-memory table for recent writes
#[derive(Debug, Default)]
pub struct MemTable {
    data: RwLock<BTreeMap<VersionKey, MemTableEntry>>,
    /// Approximate size in bytes
    size: AtomicUsize,
}

impl MemTable {
    /// Create a new empty MemTable
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a value version. Returns the new approximate size.
    pub fn put(&self, key: &[u8], sequence: u64, value: &[u8]) -> usize {
        self.insert(key, sequence, MemTableEntry::Value(Bytes::copy_from_slice(value)))
    }

    /// Insert a merge operand. Returns the new approximate size.
    pub fn merge(&self, key: &[u8], sequence: u64, operand: &[u8]) -> usize {
        self.insert(key, sequence, MemTableEntry::Merge(Bytes::copy_from_slice(operand)))
    }

    /// Insert a tombstone. Returns the new approximate size.
    pub fn delete(&self, key: &[u8], sequence: u64) -> usize {
        self.insert(key, sequence, MemTableEntry::Tombstone)
    }

    fn insert(&self, key: &[u8], sequence: u64, entry: MemTableEntry) -> usize {
        let charge = key.len()
            + ENTRY_OVERHEAD
            + match &entry {
                MemTableEntry::Value(v) | MemTableEntry::Merge(v) => v.len(),
                MemTableEntry::Tombstone => 0,
            };

        let previous = self
            .data
            .write()
            .insert((Bytes::copy_from_slice(key), Reverse(sequence)), entry);
        if previous.is_some() {
            // Same sequence rewritten during replay; size is already counted
            return self.size();
        }
        self.size.fetch_add(charge, Ordering::SeqCst) + charge
    }

    /// Versions of `key` with sequence `<= max_sequence`, newest first
    pub fn get_versions(&self, key: &[u8], max_sequence: u64) -> Vec<VersionedEntry> {
        let key = Bytes::copy_from_slice(key);
        let from = (key.clone(), Reverse(max_sequence));
        let to = (key, Reverse(0));
        self.data
            .read()
            .range(from..=to)
            .map(|((k, Reverse(seq)), entry)| to_versioned(k, *seq, entry))
            .collect()
    }

    /// Every version with sequence `<= max_sequence`, in bytewise key order
    pub fn entries(&self, max_sequence: u64) -> Vec<VersionedEntry> {
        self.data
            .read()
            .iter()
            .filter(|((_, Reverse(seq)), _)| *seq <= max_sequence)
            .map(|((k, Reverse(seq)), entry)| to_versioned(k, *seq, entry))
            .collect()
    }

    /// Whether any key lies in `[start, end]` under `comparator`
    pub fn overlaps(&self, comparator: &dyn KeyComparator, start: &[u8], end: &[u8]) -> bool {
        self.data.read().keys().any(|(k, _)| {
            comparator.compare(k, start) != CmpOrdering::Less
                && comparator.compare(k, end) != CmpOrdering::Greater
        })
    }

    /// Get approximate size in bytes
    pub fn size(&self) -> usize {
        self.size.load(Ordering::SeqCst)
    }

    /// Number of versions held
    pub fn entry_count(&self) -> usize {
        self.data.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.read().is_empty()
    }

    /// Check if should flush (size >= limit)
    pub fn should_flush(&self, size_limit: usize) -> bool {
        self.size() >= size_limit
    }

    /// Clear all entries (after successful flush)
    pub fn clear(&self) {
        self.data.write().clear();
        self.size.store(0, Ordering::SeqCst);
    }
}

fn to_versioned(key: &Bytes, sequence: u64, entry: &MemTableEntry) -> VersionedEntry {
    match entry {
        MemTableEntry::Value(v) => VersionedEntry::new(key.clone(), sequence, ValueKind::Put, v.clone()),
        MemTableEntry::Merge(v) => VersionedEntry::new(key.clone(), sequence, ValueKind::Merge, v.clone()),
        MemTableEntry::Tombstone => VersionedEntry::delete(key.clone(), sequence),
    }
}
