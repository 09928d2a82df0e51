//! Compaction range batching
//!
//! Compacting a large span in one call needs temporary space for the whole
//! span. Instead the bottom-level tables of the span are walked in key
//! order and cut into sub-ranges of roughly `target_size` bytes, which are
//! compacted one after another.
//!
//! ```text
//! tables:  [ 50M ][ 50M ][ 50M ][ 10M ][ 5M ]     target 128M
//! ranges:  start ─────────────────┐
//!                       largest(3)└──────────── end
//! ```

use std::cmp::Ordering;

use crate::storage::{KeyComparator, LiveFileMetadata};

/// Default bytes of bottom-level data per compaction range
pub const DEFAULT_COMPACTION_TARGET_SIZE: u64 = 128 << 20;

/// A span of keys `[start, end)` to compact. An empty bound is unbounded.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompactionRange {
    pub start: Vec<u8>,
    pub end: Vec<u8>,
}

impl CompactionRange {
    pub fn new(start: impl Into<Vec<u8>>, end: impl Into<Vec<u8>>) -> Self {
        Self {
            start: start.into(),
            end: end.into(),
        }
    }

    pub fn start_bound(&self) -> Option<&[u8]> {
        (!self.start.is_empty()).then_some(self.start.as_slice())
    }

    pub fn end_bound(&self) -> Option<&[u8]> {
        (!self.end.is_empty()).then_some(self.end.as_slice())
    }
}

/// How a requested span will be compacted
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompactionPlan {
    /// No table of the span sits at the bottom level; compact it in one go
    Whole(CompactionRange),
    /// Compact these ranges in order
    Batched(Vec<CompactionRange>),
}

impl CompactionPlan {
    pub fn ranges(&self) -> &[CompactionRange] {
        match self {
            CompactionPlan::Whole(range) => std::slice::from_ref(range),
            CompactionPlan::Batched(ranges) => ranges,
        }
    }
}

/// Cut `tables` (sorted by smallest key) into contiguous ranges holding
/// about `target_size` bytes each.
///
/// The first range starts at `start_key` and the last ends at `end_key`;
/// every other boundary is the largest key of the table closing a range.
pub fn batch_tables_for_compaction(
    tables: &[LiveFileMetadata],
    start_key: &[u8],
    end_key: &[u8],
    target_size: u64,
) -> Vec<CompactionRange> {
    let mut ranges = Vec::new();
    // Index of the table that closed the previous range
    let mut prev: Option<usize> = None;
    let mut size = 0u64;

    for (i, table) in tables.iter().enumerate() {
        size += table.size;
        let last = i + 1 == tables.len();
        if size < target_size && !last {
            continue;
        }

        let start = match prev {
            None => start_key,
            Some(p) => tables[p].largest_key.as_slice(),
        };
        let end = if last {
            end_key
        } else {
            table.largest_key.as_slice()
        };
        ranges.push(CompactionRange::new(start, end));

        prev = Some(i);
        size = 0;
    }

    ranges
}

/// Decide how to compact `[start_key, end_key)` given every live table.
///
/// Tables entirely outside the span are ignored. When the deepest level
/// among the remaining tables is not the bottom level, the span is compacted
/// whole; otherwise the bottom-level tables are batched.
pub fn plan_compaction(
    comparator: &dyn KeyComparator,
    files: Vec<LiveFileMetadata>,
    start_key: &[u8],
    end_key: &[u8],
    num_levels: usize,
    target_size: u64,
) -> CompactionPlan {
    let in_span: Vec<LiveFileMetadata> = files
        .into_iter()
        .filter(|f| {
            let before = !start_key.is_empty()
                && comparator.compare(&f.largest_key, start_key) == Ordering::Less;
            let after = !end_key.is_empty()
                && comparator.compare(&f.smallest_key, end_key) != Ordering::Less;
            !before && !after
        })
        .collect();

    let max_level = in_span.iter().map(|f| f.level).max().unwrap_or(0);
    if max_level + 1 != num_levels {
        return CompactionPlan::Whole(CompactionRange::new(start_key, end_key));
    }

    let mut bottom: Vec<LiveFileMetadata> = in_span.into_iter().filter(|f| f.level == max_level).collect();
    bottom.sort_by(|a, b| comparator.compare(&a.smallest_key, &b.smallest_key));

    CompactionPlan::Batched(batch_tables_for_compaction(&bottom, start_key, end_key, target_size))
}
