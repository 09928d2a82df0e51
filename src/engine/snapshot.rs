//! Read-only snapshots

use std::fmt;
use std::sync::Arc;

use crate::error::Result;
use crate::iterator::MvccIterator;
use crate::key::VersionedKey;
use crate::storage::{KvStore, ReadOptions, StoreSnapshot};

use super::{read_options, IterOptions, Reader};

/// A pinned, immutable read view of an engine.
///
/// Cheap to clone; every clone reads the same state. The view is released
/// when the last clone and every iterator created from it are dropped.
#[derive(Clone)]
pub struct Snapshot {
    store: Arc<dyn KvStore>,
    snapshot: StoreSnapshot,
}

impl Snapshot {
    pub(crate) fn new(store: Arc<dyn KvStore>) -> Self {
        let snapshot = store.snapshot();
        Self { store, snapshot }
    }

    /// Last sequence number visible through this snapshot
    pub fn sequence(&self) -> u64 {
        self.snapshot.sequence()
    }
}

impl Reader for Snapshot {
    fn get(&self, key: &VersionedKey) -> Result<Option<Vec<u8>>> {
        let options = ReadOptions {
            snapshot: Some(self.snapshot.clone()),
            ..ReadOptions::default()
        };
        self.store.get(&options, &key.encode())
    }

    fn new_iterator(&self, options: IterOptions) -> Result<MvccIterator> {
        let (read, stats) = read_options(&options, Some(self.snapshot.clone()));
        Ok(MvccIterator::new(self.store.new_iterator(read)?, stats))
    }
}

impl fmt::Debug for Snapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Snapshot")
            .field("sequence", &self.snapshot.sequence())
            .finish()
    }
}
