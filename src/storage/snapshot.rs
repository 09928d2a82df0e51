//! Store snapshots
//!
//! A snapshot pins a sequence number: reads through it ignore every later
//! write, and compactions keep the versions it can see.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

/// Registry of pinned sequence numbers
#[derive(Debug, Default)]
pub struct SnapshotList {
    /// sequence → number of live handles
    pins: Mutex<BTreeMap<u64, usize>>,
}

impl SnapshotList {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Pin `sequence` and hand out a handle that releases it on drop
    pub fn acquire(self: &Arc<Self>, sequence: u64) -> StoreSnapshot {
        *self.pins.lock().entry(sequence).or_insert(0) += 1;
        StoreSnapshot {
            inner: Arc::new(SnapshotInner {
                sequence,
                list: Arc::clone(self),
            }),
        }
    }

    fn release(&self, sequence: u64) {
        let mut pins = self.pins.lock();
        if let Some(count) = pins.get_mut(&sequence) {
            *count -= 1;
            if *count == 0 {
                pins.remove(&sequence);
            }
        }
    }

    /// Pinned sequences in ascending order
    pub fn sequences(&self) -> Vec<u64> {
        self.pins.lock().keys().copied().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.pins.lock().is_empty()
    }
}

/// Handle to a pinned read view. Cheap to clone; immutable once created.
#[derive(Clone)]
pub struct StoreSnapshot {
    inner: Arc<SnapshotInner>,
}

struct SnapshotInner {
    sequence: u64,
    list: Arc<SnapshotList>,
}

impl Drop for SnapshotInner {
    fn drop(&mut self) {
        self.list.release(self.sequence);
    }
}

impl StoreSnapshot {
    /// The last sequence number visible through this snapshot
    pub fn sequence(&self) -> u64 {
        self.inner.sequence
    }
}

impl fmt::Debug for StoreSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreSnapshot")
            .field("sequence", &self.inner.sequence)
            .finish()
    }
}
