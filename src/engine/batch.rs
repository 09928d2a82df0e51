//! Write batches
//!
//! Writes buffered in a batch reach the store atomically on `commit`, or
//! not at all when the batch is dropped.

use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::{MvccError, Result};
use crate::iterator::MvccIterator;
use crate::key::{MvccPrefixExtractor, VersionedKey};
use crate::storage::{BatchOp, KeyComparator, KvStore, MergeOperator, PrefixBound, ReadOptions, WriteBatch};

use super::batch_iter::BatchIterator;
use super::{read_options, IterOptions, Reader, Writer};

/// State shared by both batch flavours
struct BatchCore {
    store: Arc<dyn KvStore>,
    ops: Mutex<WriteBatch>,
}

impl BatchCore {
    fn new(store: Arc<dyn KvStore>) -> Self {
        Self {
            store,
            ops: Mutex::new(WriteBatch::new()),
        }
    }

    fn count(&self) -> usize {
        self.ops.lock().len()
    }

    fn repr(&self) -> Result<Vec<u8>> {
        self.ops.lock().encode()
    }

    fn apply_repr(&self, repr: &[u8]) -> Result<()> {
        let other = WriteBatch::decode(repr)?;
        let mut ops = self.ops.lock();
        for op in other.ops() {
            ops.push(op.clone());
        }
        Ok(())
    }

    fn commit(&self, sync: bool) -> Result<()> {
        let mut ops = self.ops.lock();
        if ops.is_empty() {
            return Ok(());
        }
        self.store.write(&ops, sync)?;
        ops.clear();
        Ok(())
    }

    fn put(&self, key: &VersionedKey, value: &[u8]) {
        self.ops.lock().put(&key.encode(), value);
    }

    fn merge(&self, key: &VersionedKey, value: &[u8]) {
        self.ops.lock().merge(&key.encode(), value);
    }

    fn delete(&self, key: &VersionedKey) {
        self.ops.lock().delete(&key.encode());
    }

    fn delete_range(&self, start: &VersionedKey, end: &VersionedKey) {
        self.ops.lock().delete_range(&start.encode(), &end.encode());
    }
}

fn merge_operator(store: &dyn KvStore) -> Result<Arc<dyn MergeOperator>> {
    store
        .merge_operator()
        .ok_or_else(|| MvccError::NotSupported("merge requires a merge operator".to_string()))
}

pub(super) fn in_range(comparator: &dyn KeyComparator, key: &[u8], start: &[u8], end: &[u8]) -> bool {
    comparator.compare(key, start) != Ordering::Less && comparator.compare(key, end) == Ordering::Less
}

// =============================================================================
// Batch
// =============================================================================

/// A batch whose reads observe its own uncommitted writes.
///
/// Owned by one caller; not meant to be shared across threads.
pub struct Batch {
    core: BatchCore,
}

impl Batch {
    pub(crate) fn new(store: Arc<dyn KvStore>) -> Self {
        Self {
            core: BatchCore::new(store),
        }
    }

    /// Number of buffered operations
    pub fn count(&self) -> usize {
        self.core.count()
    }

    pub fn is_empty(&self) -> bool {
        self.count() == 0
    }

    /// Serialized operations, replayable with `Engine::apply_batch_repr`
    pub fn repr(&self) -> Result<Vec<u8>> {
        self.core.repr()
    }

    /// Append the operations of another batch's representation
    pub fn apply_batch_repr(&self, repr: &[u8]) -> Result<()> {
        self.core.apply_repr(repr)
    }

    /// Apply every buffered operation atomically
    pub fn commit(self, sync: bool) -> Result<()> {
        self.core.commit(sync)
    }
}

impl Reader for Batch {
    fn get(&self, key: &VersionedKey) -> Result<Option<Vec<u8>>> {
        let store = self.core.store.as_ref();
        let comparator = store.comparator();
        let encoded = key.encode();
        let ops = self.core.ops.lock();

        // Newest first; stop at the first operation that settles the key
        let mut operands: Vec<&[u8]> = Vec::new();
        let mut base: Option<Option<Vec<u8>>> = None;
        for op in ops.ops().iter().rev() {
            match op {
                BatchOp::Put { key, value } if *key == encoded => {
                    base = Some(Some(value.clone()));
                    break;
                }
                BatchOp::Delete { key } if *key == encoded => {
                    base = Some(None);
                    break;
                }
                BatchOp::DeleteRange { start, end } if in_range(comparator.as_ref(), &encoded, start, end) => {
                    base = Some(None);
                    break;
                }
                BatchOp::Merge { key, value } if *key == encoded => operands.push(value),
                _ => {}
            }
        }

        let base = match base {
            Some(base) => base,
            None => store.get(&ReadOptions::default(), &encoded)?,
        };
        if operands.is_empty() {
            return Ok(base);
        }
        operands.reverse();
        merge_operator(store)?
            .full_merge(&encoded, base.as_deref(), &operands)
            .map(Some)
    }

    fn new_iterator(&self, options: IterOptions) -> Result<MvccIterator> {
        let store = self.core.store.as_ref();
        let (mut read, stats) = read_options(&options, None);

        // Committed state streams underneath; the prefix bound applies to
        // the combined view
        let prefix = read.prefix_same_as_start;
        read.prefix_same_as_start = false;
        read.total_order_seek = true;
        let base = store.new_iterator(read)?;

        let ops = self.core.ops.lock();
        let mut iter = BatchIterator::new(base, ops.ops(), store.comparator(), store.merge_operator())?;
        if prefix {
            iter = iter.with_prefix_bound(PrefixBound::new(Arc::new(MvccPrefixExtractor)));
        }
        Ok(MvccIterator::new(Box::new(iter), stats))
    }
}

impl Writer for Batch {
    fn put(&self, key: &VersionedKey, value: &[u8]) -> Result<()> {
        self.core.put(key, value);
        Ok(())
    }

    fn merge(&self, key: &VersionedKey, value: &[u8]) -> Result<()> {
        self.core.merge(key, value);
        Ok(())
    }

    fn delete(&self, key: &VersionedKey) -> Result<()> {
        self.core.delete(key);
        Ok(())
    }

    fn delete_range(&self, start: &VersionedKey, end: &VersionedKey) -> Result<()> {
        self.core.delete_range(start, end);
        Ok(())
    }
}

impl fmt::Debug for Batch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Batch").field("count", &self.count()).finish()
    }
}

// =============================================================================
// Write-only Batch
// =============================================================================

/// A batch that only buffers writes; it cannot be read.
pub struct WriteOnlyBatch {
    core: BatchCore,
}

impl WriteOnlyBatch {
    pub(crate) fn new(store: Arc<dyn KvStore>) -> Self {
        Self {
            core: BatchCore::new(store),
        }
    }

    pub fn count(&self) -> usize {
        self.core.count()
    }

    pub fn is_empty(&self) -> bool {
        self.count() == 0
    }

    pub fn repr(&self) -> Result<Vec<u8>> {
        self.core.repr()
    }

    pub fn apply_batch_repr(&self, repr: &[u8]) -> Result<()> {
        self.core.apply_repr(repr)
    }

    pub fn commit(self, sync: bool) -> Result<()> {
        self.core.commit(sync)
    }
}

impl Writer for WriteOnlyBatch {
    fn put(&self, key: &VersionedKey, value: &[u8]) -> Result<()> {
        self.core.put(key, value);
        Ok(())
    }

    fn merge(&self, key: &VersionedKey, value: &[u8]) -> Result<()> {
        self.core.merge(key, value);
        Ok(())
    }

    fn delete(&self, key: &VersionedKey) -> Result<()> {
        self.core.delete(key);
        Ok(())
    }

    fn delete_range(&self, start: &VersionedKey, end: &VersionedKey) -> Result<()> {
        self.core.delete_range(start, end);
        Ok(())
    }
}

impl fmt::Debug for WriteOnlyBatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WriteOnlyBatch")
            .field("count", &self.count())
            .finish()
    }
}
