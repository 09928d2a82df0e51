//! Merging iterator
//!
//! The store's iterator. The memtable and every table are cursors in
//! internal order (key ascending, newest version first); the iterator steps
//! across all of them one user key at a time and folds the versions visible
//! at its read sequence. Only the versions of the current key are held.
//!
//! ```text
//!   memtable  a@9  c@7
//!   table 1   a@4  b@3  c@2     next() ─► gather every cursor's `b`
//!   table 2   b@1  d@1                    versions, resolve, stop if live
//! ```

use std::cmp::Ordering;
use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};
use std::sync::Arc;

use bytes::Bytes;

use crate::error::{MvccError, Result};

use super::{
    resolve_versions, KeyComparator, MergeOperator, PrefixExtractor, SSTableReader, StoreIterator,
    StoreSnapshot, ValueKind, Version, VersionedEntry,
};

// =============================================================================
// Iterator Tracking
// =============================================================================

/// Counts iterators that have not been dropped yet
#[derive(Debug, Default)]
pub struct IteratorTracker {
    live: AtomicUsize,
}

impl IteratorTracker {
    pub fn live(&self) -> usize {
        self.live.load(AtomicOrdering::SeqCst)
    }

    fn register(self: &Arc<Self>) -> TrackerGuard {
        self.live.fetch_add(1, AtomicOrdering::SeqCst);
        TrackerGuard {
            tracker: Arc::clone(self),
        }
    }
}

struct TrackerGuard {
    tracker: Arc<IteratorTracker>,
}

impl Drop for TrackerGuard {
    fn drop(&mut self) {
        self.tracker.live.fetch_sub(1, AtomicOrdering::SeqCst);
    }
}

// =============================================================================
// Prefix Bound
// =============================================================================

/// Confines iteration after a seek to keys sharing the target's prefix
#[derive(Clone, Default)]
pub struct PrefixBound {
    extractor: Option<Arc<dyn PrefixExtractor>>,
    active: Option<Vec<u8>>,
}

impl PrefixBound {
    pub fn new(extractor: Arc<dyn PrefixExtractor>) -> Self {
        Self {
            extractor: Some(extractor),
            active: None,
        }
    }

    /// Start a bound at `target`; `None` lifts it
    pub fn reset(&mut self, target: Option<&[u8]>) {
        self.active = match (&self.extractor, target) {
            (Some(extractor), Some(target)) => Some(extractor.transform(target).to_vec()),
            _ => None,
        };
    }

    pub fn admits(&self, key: &[u8]) -> bool {
        match (&self.extractor, &self.active) {
            (Some(extractor), Some(prefix)) => extractor.transform(key) == prefix.as_slice(),
            _ => true,
        }
    }
}

// =============================================================================
// Cursors
// =============================================================================

enum Source {
    /// Versions captured from the memtable, in internal order
    Entries(Vec<VersionedEntry>),
    Table(SSTableReader),
}

impl Source {
    fn len(&self) -> usize {
        match self {
            Source::Entries(entries) => entries.len(),
            Source::Table(reader) => reader.entry_count() as usize,
        }
    }

    fn entry_at(&self, i: usize) -> Result<VersionedEntry> {
        match self {
            Source::Entries(entries) => entries
                .get(i)
                .cloned()
                .ok_or_else(|| MvccError::InvalidArgument(format!("entry {} out of range", i))),
            Source::Table(reader) => reader.entry_at(i),
        }
    }

    /// Position of the first entry whose key is `>= target`
    fn lower_bound(&self, comparator: &dyn KeyComparator, target: &[u8]) -> Result<usize> {
        match self {
            Source::Entries(entries) => {
                Ok(entries.partition_point(|e| comparator.compare(&e.key, target) == Ordering::Less))
            }
            Source::Table(reader) => reader.lower_bound(comparator, target, u64::MAX),
        }
    }
}

/// A position in one source; `None` once it runs off either end
struct Cursor {
    source: Source,
    current: Option<(usize, VersionedEntry)>,
}

impl Cursor {
    fn new(source: Source) -> Self {
        Self { source, current: None }
    }

    fn entry(&self) -> Option<&VersionedEntry> {
        self.current.as_ref().map(|(_, entry)| entry)
    }

    fn load(&mut self, position: Option<usize>) -> Result<()> {
        self.current = None;
        if let Some(i) = position.filter(|i| *i < self.source.len()) {
            self.current = Some((i, self.source.entry_at(i)?));
        }
        Ok(())
    }

    fn seek_to_first(&mut self) -> Result<()> {
        self.load(Some(0))
    }

    fn seek_to_last(&mut self) -> Result<()> {
        self.load(self.source.len().checked_sub(1))
    }

    /// First entry with key `>= target`
    fn seek(&mut self, comparator: &dyn KeyComparator, target: &[u8]) -> Result<()> {
        let position = self.source.lower_bound(comparator, target)?;
        self.load(Some(position))
    }

    /// First entry with key `> target`
    fn seek_after(&mut self, comparator: &dyn KeyComparator, target: &[u8]) -> Result<()> {
        self.seek(comparator, target)?;
        while self
            .entry()
            .is_some_and(|e| comparator.compare(&e.key, target) == Ordering::Equal)
        {
            self.next()?;
        }
        Ok(())
    }

    /// Last entry with key `< target`
    fn seek_before(&mut self, comparator: &dyn KeyComparator, target: &[u8]) -> Result<()> {
        let position = self.source.lower_bound(comparator, target)?;
        self.load(position.checked_sub(1))
    }

    fn next(&mut self) -> Result<()> {
        let next = self.current.as_ref().map(|(i, _)| i + 1);
        self.load(next)
    }

    fn prev(&mut self) -> Result<()> {
        let prev = self.current.as_ref().and_then(|(i, _)| i.checked_sub(1));
        self.load(prev)
    }
}

// =============================================================================
// Merging Iterator
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Forward,
    Backward,
}

/// Streaming iterator over the resolved view of a store at one sequence.
///
/// Holds the table set it was created over, so tables compacted away in
/// the meantime stay readable until it is dropped.
pub struct MergingIterator {
    cursors: Vec<Cursor>,
    comparator: Arc<dyn KeyComparator>,
    merge_operator: Option<Arc<dyn MergeOperator>>,
    sequence: u64,
    direction: Direction,
    current: Option<(Bytes, Bytes)>,
    error: Option<MvccError>,
    prefix: PrefixBound,
    deleted_skipped: u64,
    _version: Option<Arc<Version>>,
    _snapshot: Option<StoreSnapshot>,
    _guard: Option<TrackerGuard>,
}

impl MergingIterator {
    /// `memtable` must already be in internal order under `comparator`
    pub fn new(
        comparator: Arc<dyn KeyComparator>,
        merge_operator: Option<Arc<dyn MergeOperator>>,
        sequence: u64,
        memtable: Vec<VersionedEntry>,
        tables: Vec<SSTableReader>,
    ) -> Self {
        let mut cursors = Vec::with_capacity(tables.len() + 1);
        cursors.push(Cursor::new(Source::Entries(memtable)));
        cursors.extend(tables.into_iter().map(|t| Cursor::new(Source::Table(t))));
        Self {
            cursors,
            comparator,
            merge_operator,
            sequence,
            direction: Direction::Forward,
            current: None,
            error: None,
            prefix: PrefixBound::default(),
            deleted_skipped: 0,
            _version: None,
            _snapshot: None,
            _guard: None,
        }
    }

    pub fn with_prefix_extractor(mut self, extractor: Arc<dyn PrefixExtractor>) -> Self {
        self.prefix = PrefixBound::new(extractor);
        self
    }

    /// Keep the table set alive for as long as the iterator lives
    pub fn pin_version(mut self, version: Arc<Version>) -> Self {
        self._version = Some(version);
        self
    }

    pub fn pin_snapshot(mut self, snapshot: StoreSnapshot) -> Self {
        self._snapshot = Some(snapshot);
        self
    }

    pub fn track(mut self, tracker: &Arc<IteratorTracker>) -> Self {
        self._guard = Some(tracker.register());
        self
    }

    fn each_cursor(
        &mut self,
        mut f: impl FnMut(&mut Cursor, &dyn KeyComparator) -> Result<()>,
    ) -> Result<()> {
        let comparator = Arc::clone(&self.comparator);
        for cursor in &mut self.cursors {
            f(cursor, comparator.as_ref())?;
        }
        Ok(())
    }

    /// The key every cursor agrees comes next in `direction`
    fn frontier(&self, direction: Direction) -> Option<Bytes> {
        let comparator = self.comparator.as_ref();
        let wanted = match direction {
            Direction::Forward => Ordering::Less,
            Direction::Backward => Ordering::Greater,
        };
        let mut best: Option<&Bytes> = None;
        for entry in self.cursors.iter().filter_map(Cursor::entry) {
            if best.map_or(true, |b| comparator.compare(&entry.key, b) == wanted) {
                best = Some(&entry.key);
            }
        }
        best.cloned()
    }

    /// Consume every version of `key`, moving each cursor past it
    fn take_versions(&mut self, key: &[u8], direction: Direction) -> Result<Vec<VersionedEntry>> {
        let comparator = Arc::clone(&self.comparator);
        let mut versions = Vec::new();
        for cursor in &mut self.cursors {
            while let Some(entry) = cursor.entry() {
                if comparator.compare(&entry.key, key) != Ordering::Equal {
                    break;
                }
                if entry.sequence <= self.sequence {
                    versions.push(entry.clone());
                }
                match direction {
                    Direction::Forward => cursor.next()?,
                    Direction::Backward => cursor.prev()?,
                }
            }
        }
        versions.sort_by(|a, b| b.sequence.cmp(&a.sequence));
        versions.dedup_by(|a, b| a.sequence == b.sequence);
        Ok(versions)
    }

    /// Move to the nearest live key in `direction`
    fn find(&mut self, direction: Direction) -> Result<()> {
        self.direction = direction;
        self.current = None;
        while let Some(key) = self.frontier(direction) {
            let versions = self.take_versions(&key, direction)?;
            self.deleted_skipped += versions.iter().filter(|v| v.kind == ValueKind::Delete).count() as u64;
            if let Some(value) = resolve_versions(&versions, self.merge_operator.as_deref())? {
                self.current = Some((key, Bytes::from(value)));
                break;
            }
        }
        Ok(())
    }

    fn finish(&mut self, result: Result<()>) {
        if let Err(e) = result {
            self.current = None;
            self.error = Some(e);
            return;
        }
        if let Some((key, _)) = &self.current {
            if !self.prefix.admits(key) {
                self.current = None;
            }
        }
    }
}

impl StoreIterator for MergingIterator {
    fn valid(&self) -> bool {
        self.current.is_some()
    }

    fn seek(&mut self, target: &[u8]) {
        self.error = None;
        self.prefix.reset(Some(target));
        let result = self
            .each_cursor(|cursor, comparator| cursor.seek(comparator, target))
            .and_then(|()| self.find(Direction::Forward));
        self.finish(result);
    }

    fn seek_to_first(&mut self) {
        self.error = None;
        self.prefix.reset(None);
        let result = self
            .each_cursor(|cursor, _| cursor.seek_to_first())
            .and_then(|()| self.find(Direction::Forward));
        self.finish(result);
    }

    fn seek_to_last(&mut self) {
        self.error = None;
        self.prefix.reset(None);
        let result = self
            .each_cursor(|cursor, _| cursor.seek_to_last())
            .and_then(|()| self.find(Direction::Backward));
        self.finish(result);
    }

    fn next(&mut self) {
        let Some((key, _)) = self.current.clone() else {
            return;
        };
        let mut result = Ok(());
        if self.direction == Direction::Backward {
            // Cursors sit before `key`
            result = self.each_cursor(|cursor, comparator| cursor.seek_after(comparator, &key));
        }
        let result = result.and_then(|()| self.find(Direction::Forward));
        self.finish(result);
    }

    fn prev(&mut self) {
        let Some((key, _)) = self.current.clone() else {
            return;
        };
        let mut result = Ok(());
        if self.direction == Direction::Forward {
            // Cursors sit after `key`
            result = self.each_cursor(|cursor, comparator| cursor.seek_before(comparator, &key));
        }
        let result = result.and_then(|()| self.find(Direction::Backward));
        self.finish(result);
    }

    fn key(&self) -> &[u8] {
        self.current.as_ref().map_or(&[][..], |(key, _)| key.as_ref())
    }

    fn value(&self) -> &[u8] {
        self.current.as_ref().map_or(&[][..], |(_, value)| value.as_ref())
    }

    fn status(&self) -> Result<()> {
        match &self.error {
            Some(e) => Err(e.clone()),
            None => Ok(()),
        }
    }

    fn deleted_entries_skipped(&self) -> u64 {
        self.deleted_skipped
    }
}
