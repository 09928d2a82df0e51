//! Versioned store entries
//!
//! Every write the store accepts becomes one entry tagged with a sequence
//! number. Memtables and tables hold entries; reads resolve them.

use std::cmp::Ordering;

use bytes::Bytes;

use crate::error::{MvccError, Result};

use super::KeyComparator;

/// What an entry does to its key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ValueKind {
    Put = 1,
    Merge = 2,
    Delete = 3,
}

impl ValueKind {
    pub fn from_u8(tag: u8) -> Result<Self> {
        match tag {
            1 => Ok(ValueKind::Put),
            2 => Ok(ValueKind::Merge),
            3 => Ok(ValueKind::Delete),
            other => Err(MvccError::Corruption(format!("unknown value kind {}", other))),
        }
    }
}

/// One version of one key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionedEntry {
    pub key: Bytes,
    pub sequence: u64,
    pub kind: ValueKind,
    /// Empty for deletes
    pub value: Bytes,
}

impl VersionedEntry {
    pub fn new(key: impl Into<Bytes>, sequence: u64, kind: ValueKind, value: impl Into<Bytes>) -> Self {
        Self {
            key: key.into(),
            sequence,
            kind,
            value: value.into(),
        }
    }

    pub fn put(key: impl Into<Bytes>, sequence: u64, value: impl Into<Bytes>) -> Self {
        Self::new(key, sequence, ValueKind::Put, value)
    }

    pub fn merge(key: impl Into<Bytes>, sequence: u64, value: impl Into<Bytes>) -> Self {
        Self::new(key, sequence, ValueKind::Merge, value)
    }

    pub fn delete(key: impl Into<Bytes>, sequence: u64) -> Self {
        Self::new(key, sequence, ValueKind::Delete, Bytes::new())
    }
}

/// Internal ordering: key ascending by comparator, then newest first.
pub fn compare_entries(comparator: &dyn KeyComparator, a: &VersionedEntry, b: &VersionedEntry) -> Ordering {
    comparator
        .compare(&a.key, &b.key)
        .then_with(|| b.sequence.cmp(&a.sequence))
}

/// Sort entries into internal order and drop duplicate versions.
pub fn sort_entries(comparator: &dyn KeyComparator, entries: &mut Vec<VersionedEntry>) {
    entries.sort_by(|a, b| compare_entries(comparator, a, b));
    entries.dedup_by(|a, b| a.sequence == b.sequence && a.key == b.key);
}

/// Split internally ordered entries into runs sharing one key.
pub fn group_by_key<'a>(
    comparator: &'a dyn KeyComparator,
    entries: &'a [VersionedEntry],
) -> impl Iterator<Item = &'a [VersionedEntry]> + 'a {
    let mut rest = entries;
    std::iter::from_fn(move || {
        let first = rest.first()?;
        let len = rest
            .iter()
            .position(|e| comparator.compare(&e.key, &first.key) != Ordering::Equal)
            .unwrap_or(rest.len());
        let (group, tail) = rest.split_at(len);
        rest = tail;
        Some(group)
    })
}
