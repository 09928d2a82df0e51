//! LSM store
//!
//! The reference `KvStore`: WAL + memtable + leveled SSTables.
//!
//! ## Concurrency Model: Single-Writer / Multiple-Reader (SWMR)
//!
//! - **Writes** (write/flush/ingest): serialized by `write_lock`
//!   - Must acquire: write_lock → WAL → memtable → storage
//!   - A batch becomes visible when `last_sequence` is published
//! - **Reads** (get/iterators): never take `write_lock`
//!   - `view_lock` (read) captures the read sequence, memtable contents
//!     and the table set together; flush takes it exclusively to swap both
//!     at once, so a sequence is never paired with tables built after it
//! - **Compaction**: `compaction_lock`, always taken after `write_lock`.
//!   Flush-triggered compactions only `try_lock` it.

use std::cmp::Ordering as CmpOrdering;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, TryLockError};

use bytes::Bytes;
use parking_lot::RwLock;
use tracing::{debug, info, warn};

use crate::config::WalSyncStrategy;
use crate::env::{Env, FileLock};
use crate::error::{MvccError, Result};
use crate::memtable::MemTable;
use crate::wal::{Operation, WalRecovery, WalWriter};

use super::{
    collapse_versions, group_by_key, resolve_versions, sort_entries, BatchOp, BlockCache,
    BytewiseComparator, CompactRangeOptions, IngestOptions, IteratorTracker, KeyComparator, KvStore,
    LiveFileMetadata, MergeOperator, MergingIterator, PrefixExtractor, ReadOptions,
    SSTableReader, SnapshotList, StorageManager, StoreIterator, StoreSnapshot, StoreStats,
    TableProperties, TablePropertiesCollectorFactory, ValueKind, WriteBatch,
};

// =============================================================================
// Store Options
// =============================================================================

/// Everything an `LsmStore` is parameterised by
#[derive(Clone)]
pub struct StoreOptions {
    pub comparator: Arc<dyn KeyComparator>,
    pub merge_operator: Option<Arc<dyn MergeOperator>>,
    pub prefix_extractor: Option<Arc<dyn PrefixExtractor>>,
    pub collector_factories: Vec<Arc<dyn TablePropertiesCollectorFactory>>,
    /// Shared table cache; without one table contents stay resident
    pub block_cache: Option<Arc<BlockCache>>,
    pub wal_sync_strategy: WalSyncStrategy,
    /// Flush once the memtable reaches this many bytes
    pub memtable_size_limit: usize,
    pub num_levels: usize,
    /// Compact level 0 once it holds this many tables
    pub l0_compaction_trigger: usize,
    /// Compaction output is split into tables of about this size
    pub target_file_size: u64,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            comparator: Arc::new(BytewiseComparator),
            merge_operator: None,
            prefix_extractor: None,
            collector_factories: Vec::new(),
            block_cache: None,
            wal_sync_strategy: WalSyncStrategy::EveryNEntries { count: 100 },
            memtable_size_limit: 64 * 1024 * 1024,
            num_levels: 7,
            l0_compaction_trigger: 4,
            target_file_size: 64 * 1024 * 1024,
        }
    }
}

impl fmt::Debug for StoreOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreOptions")
            .field("comparator", &self.comparator.name())
            .field("merge_operator", &self.merge_operator.as_ref().map(|m| m.name()))
            .field("prefix_extractor", &self.prefix_extractor.as_ref().map(|p| p.name()))
            .field("collectors", &self.collector_factories.len())
            .field("block_cache", &self.block_cache.as_ref().map(|c| c.capacity()))
            .field("wal_sync_strategy", &self.wal_sync_strategy)
            .field("memtable_size_limit", &self.memtable_size_limit)
            .field("num_levels", &self.num_levels)
            .field("l0_compaction_trigger", &self.l0_compaction_trigger)
            .field("target_file_size", &self.target_file_size)
            .finish()
    }
}

// =============================================================================
// LSM Store
// =============================================================================

/// Log-structured merge store
pub struct LsmStore {
    env: Arc<dyn Env>,
    dir: PathBuf,
    options: StoreOptions,
    read_only: bool,

    /// Write-ahead log; absent in read-only mode
    wal: Mutex<Option<WalWriter>>,
    memtable: MemTable,
    storage: StorageManager,

    snapshots: Arc<SnapshotList>,
    iterators: Arc<IteratorTracker>,
    /// Highest sequence number visible to new reads
    last_sequence: AtomicU64,

    write_lock: Mutex<()>,
    compaction_lock: Mutex<()>,
    view_lock: RwLock<()>,

    dir_lock: Mutex<Option<FileLock>>,
    flushes: AtomicU64,
    closed: AtomicBool,
}

impl fmt::Debug for LsmStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LsmStore")
            .field("dir", &self.dir)
            .field("read_only", &self.read_only)
            .field("last_sequence", &self.last_sequence.load(Ordering::SeqCst))
            .field("storage", &self.storage)
            .finish()
    }
}

impl LsmStore {
    // =========================================================================
    // Internal Path Constants
    // =========================================================================
    pub const WAL_FILENAME: &'static str = "wal.log";
    pub const LOCK_FILENAME: &'static str = "LOCK";

    /// Open or create a store in `dir`
    ///
    /// On startup:
    /// 1. Lock the directory (unless read-only)
    /// 2. Load live tables from the manifest
    /// 3. Replay the WAL into the memtable
    /// 4. Flush recovered data and truncate the WAL (unless read-only)
    pub fn open(env: Arc<dyn Env>, dir: &Path, options: StoreOptions, read_only: bool) -> Result<Self> {
        if options.num_levels < 2 {
            return Err(MvccError::InvalidArgument(format!(
                "num_levels must be at least 2, got {}",
                options.num_levels
            )));
        }

        // Step 1: Lock the directory
        let dir_lock = if read_only {
            None
        } else {
            env.create_dir_all(dir)?;
            Some(env.lock_file(&dir.join(Self::LOCK_FILENAME))?)
        };

        match Self::open_locked(Arc::clone(&env), dir, options, read_only) {
            Ok(mut store) => {
                match store.dir_lock.get_mut() {
                    Ok(slot) => *slot = dir_lock,
                    Err(poisoned) => *poisoned.into_inner() = dir_lock,
                }
                Ok(store)
            }
            Err(e) => {
                if let Some(lock) = dir_lock {
                    env.unlock_file(lock)?;
                }
                Err(e)
            }
        }
    }

    fn open_locked(env: Arc<dyn Env>, dir: &Path, options: StoreOptions, read_only: bool) -> Result<Self> {
        // Step 2: Open the table layer
        let opened = StorageManager::open(Arc::clone(&env), dir, options.clone(), read_only)?;

        // Step 3: Replay the WAL
        let wal_path = dir.join(Self::WAL_FILENAME);
        let (entries, recovery) = WalRecovery::recover(env.as_ref(), &wal_path, !read_only)?;
        let memtable = MemTable::new();
        for entry in &entries {
            for (i, op) in entry.operations.iter().enumerate() {
                let seq = entry.lsn + i as u64;
                if seq <= opened.last_sequence {
                    continue;
                }
                match op {
                    Operation::Put { key, value } => memtable.put(key, seq, value),
                    Operation::Merge { key, value } => memtable.merge(key, seq, value),
                    Operation::Delete { key } => memtable.delete(key, seq),
                };
            }
        }
        let last_sequence = opened.last_sequence.max(recovery.last_lsn);

        let store = Self {
            env: Arc::clone(&env),
            dir: dir.to_path_buf(),
            read_only,
            wal: Mutex::new(None),
            memtable,
            storage: opened.manager,
            snapshots: SnapshotList::new(),
            iterators: Arc::new(IteratorTracker::default()),
            last_sequence: AtomicU64::new(last_sequence),
            write_lock: Mutex::new(()),
            compaction_lock: Mutex::new(()),
            view_lock: RwLock::new(()),
            dir_lock: Mutex::new(None),
            flushes: AtomicU64::new(0),
            closed: AtomicBool::new(false),
            options,
        };

        // Step 4: Make recovered data durable in a table, then start a fresh WAL
        if !read_only {
            let mut wal = WalWriter::open(
                Arc::clone(&env),
                &wal_path,
                store.options.wal_sync_strategy,
                last_sequence,
            )?;
            if !store.memtable.is_empty() {
                info!(entries = store.memtable.entry_count(), "Flushing recovered WAL entries");
                store.write_memtable(last_sequence)?;
                wal.truncate()?;
            }
            *store.lock_wal()? = Some(wal);
        }

        info!(
            dir = %dir.display(),
            read_only,
            last_sequence,
            tables = store.storage.current().table_count(),
            "Store opened"
        );
        Ok(store)
    }

    /// Live iterator count
    pub fn live_iterators(&self) -> usize {
        self.iterators.live()
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    pub fn last_sequence(&self) -> u64 {
        self.last_sequence.load(Ordering::SeqCst)
    }

    // =========================================================================
    // Locking Helpers
    // =========================================================================

    fn lock_writes(&self) -> Result<MutexGuard<'_, ()>> {
        self.write_lock
            .lock()
            .map_err(|e| MvccError::LockPoisoned(format!("Write lock poisoned: {}", e)))
    }

    fn lock_wal(&self) -> Result<MutexGuard<'_, Option<WalWriter>>> {
        self.wal
            .lock()
            .map_err(|e| MvccError::LockPoisoned(format!("WAL lock poisoned: {}", e)))
    }

    fn lock_compaction(&self) -> Result<MutexGuard<'_, ()>> {
        self.compaction_lock
            .lock()
            .map_err(|e| MvccError::LockPoisoned(format!("Compaction lock poisoned: {}", e)))
    }

    fn check_writable(&self) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(MvccError::Storage("store is closed".to_string()));
        }
        if self.read_only {
            return Err(MvccError::NotSupported("store is read-only".to_string()));
        }
        Ok(())
    }

    fn merge_op(&self) -> Option<&dyn MergeOperator> {
        self.options.merge_operator.as_deref()
    }

    fn read_sequence(&self, options: &ReadOptions) -> u64 {
        options
            .snapshot
            .as_ref()
            .map_or_else(|| self.last_sequence.load(Ordering::SeqCst), StoreSnapshot::sequence)
    }

    // =========================================================================
    // Write Path
    // =========================================================================

    /// Turn a batch into logged operations. Range deletions become point
    /// deletes of every live key in the range, including keys written
    /// earlier in the same batch. Called with the write lock held.
    fn expand_batch(&self, batch: &WriteBatch) -> Result<Vec<Operation>> {
        let comparator = self.options.comparator.as_ref();
        let mut operations = Vec::with_capacity(batch.len());

        for op in batch.ops() {
            match op {
                BatchOp::Put { key, value } => operations.push(Operation::Put {
                    key: key.clone(),
                    value: value.clone(),
                }),
                BatchOp::Merge { key, value } => operations.push(Operation::Merge {
                    key: key.clone(),
                    value: value.clone(),
                }),
                BatchOp::Delete { key } => operations.push(Operation::Delete { key: key.clone() }),
                BatchOp::DeleteRange { start, end } => {
                    let in_range = |k: &[u8]| {
                        comparator.compare(k, start) != CmpOrdering::Less
                            && comparator.compare(k, end) == CmpOrdering::Less
                    };
                    let mut keys: Vec<Vec<u8>> = self
                        .live_keys_in_range(start, end)?
                        .into_iter()
                        .map(|k| k.to_vec())
                        .collect();
                    for earlier in &operations {
                        if let Operation::Put { key, .. } | Operation::Merge { key, .. } = earlier {
                            if in_range(key) {
                                keys.push(key.clone());
                            }
                        }
                    }
                    keys.sort_by(|a, b| comparator.compare(a, b));
                    keys.dedup();
                    operations.extend(keys.into_iter().map(|key| Operation::Delete { key }));
                }
            }
        }
        Ok(operations)
    }

    /// Keys in `[start, end)` whose newest version is not a deletion
    fn live_keys_in_range(&self, start: &[u8], end: &[u8]) -> Result<Vec<Bytes>> {
        let comparator = self.options.comparator.as_ref();
        let (seq, mut entries, version) = {
            let _view = self.view_lock.read();
            let seq = self.last_sequence.load(Ordering::SeqCst);
            (seq, self.memtable.entries(seq), self.storage.current())
        };
        entries.retain(|e| {
            comparator.compare(&e.key, start) != CmpOrdering::Less
                && comparator.compare(&e.key, end) == CmpOrdering::Less
        });
        let table_entries = version.collect_entries(comparator, Some(start), Some(end), seq)?;
        entries.extend(table_entries);
        sort_entries(comparator, &mut entries);

        Ok(group_by_key(comparator, &entries)
            .filter(|group| group[0].kind != ValueKind::Delete)
            .map(|group| group[0].key.clone())
            .collect())
    }

    // =========================================================================
    // Flush
    // =========================================================================

    /// Flush implementation (called with write lock held)
    fn flush_locked(&self) -> Result<()> {
        // Skip if memtable is empty
        if self.memtable.is_empty() {
            return Ok(());
        }

        // Step 1: Write the memtable to a level-0 table and install it
        let last_sequence = self.last_sequence.load(Ordering::SeqCst);
        self.write_memtable(last_sequence)?;

        // Step 2: Truncate WAL (entries are now durable in a table)
        if let Some(wal) = self.lock_wal()?.as_mut() {
            wal.truncate()?;
        }

        // Step 3: Compact level 0 if it has grown too large
        self.maybe_compact_level0()
    }

    /// Write the memtable out as a level-0 table, install it and clear the
    /// memtable in one step as far as readers can tell.
    fn write_memtable(&self, last_sequence: u64) -> Result<()> {
        let comparator = self.options.comparator.as_ref();
        let mut entries = self.memtable.entries(u64::MAX);
        sort_entries(comparator, &mut entries);

        let snapshots = self.snapshots.sequences();
        let mut output = Vec::with_capacity(entries.len());
        for group in group_by_key(comparator, &entries) {
            output.extend(collapse_versions(group, &snapshots, false, self.merge_op())?);
        }

        let tables = self.storage.build_tables(&output, false)?;
        let bytes: u64 = tables.iter().map(|t| t.file_size()).sum();
        {
            let _view = self.view_lock.write();
            self.storage
                .apply_edit(tables.into_iter().map(|t| (0, t)).collect(), &[], last_sequence)?;
            self.memtable.clear();
        }
        self.flushes.fetch_add(1, Ordering::Relaxed);

        info!(
            entries_in = entries.len(),
            entries_out = output.len(),
            bytes,
            last_sequence,
            "Flushed memtable"
        );
        Ok(())
    }

    fn maybe_compact_level0(&self) -> Result<()> {
        let version = self.storage.current();
        if version.level(0).len() < self.options.l0_compaction_trigger {
            return Ok(());
        }

        let _compaction = match self.compaction_lock.try_lock() {
            Ok(guard) => guard,
            Err(TryLockError::WouldBlock) => {
                debug!("Compaction already running, skipping level-0 compaction");
                return Ok(());
            }
            Err(TryLockError::Poisoned(e)) => {
                return Err(MvccError::LockPoisoned(format!("Compaction lock poisoned: {}", e)))
            }
        };

        let version = self.storage.current();
        let inputs = self.storage.pick_level0_inputs(&version);
        debug!(inputs = inputs.len(), "Level-0 compaction triggered");
        self.storage.compact(
            &inputs,
            &self.snapshots.sequences(),
            self.merge_op(),
            true,
            self.last_sequence.load(Ordering::SeqCst),
        )?;
        Ok(())
    }
}

impl KvStore for LsmStore {
    /// Apply a batch
    ///
    /// Steps:
    /// 1. Acquire write lock
    /// 2. Write to WAL (durability)
    /// 3. Write to MemTable
    /// 4. Publish the batch's sequence numbers
    /// 5. Check if flush needed
    fn write(&self, batch: &WriteBatch, sync: bool) -> Result<()> {
        self.check_writable()?;
        if batch.is_empty() {
            return Ok(());
        }

        let _write_guard = self.lock_writes()?;

        let operations = self.expand_batch(batch)?;
        if operations.is_empty() {
            return Ok(());
        }
        let first = self.last_sequence.load(Ordering::SeqCst) + 1;

        // Step 1: Write to WAL first (durability guarantee)
        {
            let mut wal = self.lock_wal()?;
            if let Some(wal) = wal.as_mut() {
                wal.append(first, operations.clone(), sync)?;
            }
        }

        // Step 2: Write to MemTable
        let mut size = 0;
        for (i, op) in operations.iter().enumerate() {
            let seq = first + i as u64;
            size = match op {
                Operation::Put { key, value } => self.memtable.put(key, seq, value),
                Operation::Merge { key, value } => self.memtable.merge(key, seq, value),
                Operation::Delete { key } => self.memtable.delete(key, seq),
            };
        }

        // Step 3: Publish
        self.last_sequence
            .store(first + operations.len() as u64 - 1, Ordering::SeqCst);

        // Step 4: Check if flush is needed
        if size >= self.options.memtable_size_limit {
            self.flush_locked()?;
        }
        Ok(())
    }

    /// Get a value by key
    ///
    /// Search order:
    /// 1. MemTable (most recent writes)
    /// 2. Tables, when the memtable holds no put or delete for the key
    fn get(&self, options: &ReadOptions, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let (seq, mut versions, version) = {
            let _view = self.view_lock.read();
            let seq = self.read_sequence(options);
            (seq, self.memtable.get_versions(key, seq), self.storage.current())
        };

        let settled = matches!(
            versions.first().map(|v| v.kind),
            Some(ValueKind::Put) | Some(ValueKind::Delete)
        );
        if !settled {
            versions.extend(version.get_versions(self.options.comparator.as_ref(), key, seq)?);
            versions.sort_by(|a, b| b.sequence.cmp(&a.sequence));
        }

        resolve_versions(&versions, self.merge_op())
    }

    fn new_iterator(&self, options: ReadOptions) -> Result<Box<dyn StoreIterator>> {
        let comparator = Arc::clone(&self.options.comparator);
        let (seq, mut memtable, version) = {
            let _view = self.view_lock.read();
            let seq = self.read_sequence(&options);
            (seq, self.memtable.entries(seq), self.storage.current())
        };
        // The memtable is bytewise ordered; tables are in comparator order
        sort_entries(comparator.as_ref(), &mut memtable);

        let (tables, skipped_tables) = version.table_readers(options.table_filter.as_deref())?;
        debug!(
            memtable_entries = memtable.len(),
            tables = tables.len(),
            skipped_tables,
            sequence = seq,
            "Created iterator"
        );

        let mut iter = MergingIterator::new(comparator, self.merge_operator(), seq, memtable, tables)
            .pin_version(version)
            .track(&self.iterators);
        if options.prefix_same_as_start && !options.total_order_seek {
            if let Some(extractor) = &self.options.prefix_extractor {
                iter = iter.with_prefix_extractor(Arc::clone(extractor));
            }
        }
        if let Some(snapshot) = options.snapshot {
            iter = iter.pin_snapshot(snapshot);
        }
        Ok(Box::new(iter))
    }

    fn snapshot(&self) -> StoreSnapshot {
        self.snapshots
            .acquire(self.last_sequence.load(Ordering::SeqCst))
    }

    fn compact_range(
        &self,
        options: &CompactRangeOptions,
        start: Option<&[u8]>,
        end: Option<&[u8]>,
    ) -> Result<()> {
        self.check_writable()?;
        self.flush()?;

        let _writes = if options.exclusive {
            Some(self.lock_writes()?)
        } else {
            None
        };
        let _compaction = self.lock_compaction()?;

        let version = self.storage.current();
        let inputs = self.storage.pick_range_inputs(&version, start, end);
        debug!(
            inputs = inputs.len(),
            exclusive = options.exclusive,
            force_bottommost = options.force_bottommost,
            "Manual compaction"
        );
        self.storage.compact(
            &inputs,
            &self.snapshots.sequences(),
            self.merge_op(),
            options.force_bottommost,
            self.last_sequence.load(Ordering::SeqCst),
        )?;
        Ok(())
    }

    /// Flush memtable to disk
    ///
    /// Forces a flush regardless of memtable size
    fn flush(&self) -> Result<()> {
        self.check_writable()?;
        let _write_guard = self.lock_writes()?;
        self.flush_locked()
    }

    fn sync_wal(&self) -> Result<()> {
        if let Some(wal) = self.lock_wal()?.as_mut() {
            wal.sync()?;
        }
        Ok(())
    }

    fn live_files_metadata(&self) -> Vec<LiveFileMetadata> {
        self.storage.live_files_metadata()
    }

    fn num_levels(&self) -> usize {
        self.storage.num_levels()
    }

    fn approximate_size(&self, start: &[u8], end: &[u8]) -> u64 {
        self.storage.approximate_size(start, end)
    }

    /// Ingest externally built tables
    ///
    /// Steps:
    /// 1. Validate every file and check they do not overlap each other
    /// 2. Flush the memtable if it overlaps (when allowed)
    /// 3. Decide whether a global sequence number is required
    /// 4. Copy or move the files in and install them
    fn ingest_external_files(&self, paths: &[PathBuf], options: &IngestOptions) -> Result<()> {
        self.check_writable()?;
        let comparator = self.options.comparator.as_ref();

        // Step 1: Validate
        let mut files = Vec::with_capacity(paths.len());
        for path in paths {
            let data = self.env.read_file(path)?;
            let reader = SSTableReader::open(data.clone(), true)?;
            let (Some(smallest), Some(largest)) = (reader.smallest_key()?, reader.largest_key()?) else {
                return Err(MvccError::InvalidArgument(format!(
                    "external file {} is empty",
                    path.display()
                )));
            };
            if reader.properties().largest_seqno != 0 {
                return Err(MvccError::InvalidArgument(format!(
                    "external file {} contains sequence numbers",
                    path.display()
                )));
            }
            files.push((path, data, smallest, largest));
        }
        files.sort_by(|a, b| comparator.compare(&a.2, &b.2));
        for pair in files.windows(2) {
            if comparator.compare(&pair[0].3, &pair[1].2) != CmpOrdering::Less {
                return Err(MvccError::InvalidArgument(format!(
                    "external files {} and {} overlap",
                    pair[0].0.display(),
                    pair[1].0.display()
                )));
            }
        }

        let _write_guard = self.lock_writes()?;
        let _compaction = self.lock_compaction()?;

        // Step 2: Memtable overlap
        let memtable_overlap = files
            .iter()
            .any(|(_, _, smallest, largest)| self.memtable.overlaps(comparator, smallest, largest));
        if memtable_overlap {
            if !options.allow_blocking_flush {
                return Err(MvccError::InvalidArgument(
                    "external files overlap the memtable and blocking flush is disabled".to_string(),
                ));
            }
            self.flush_locked()?;
        }

        // Step 3: Global sequence number
        let table_overlap = files
            .iter()
            .any(|(_, _, smallest, largest)| self.storage.overlaps(smallest, largest));
        let overlaps = memtable_overlap || table_overlap;
        let needs_seqno = overlaps || (options.snapshot_consistency && !self.snapshots.is_empty());
        if needs_seqno && !options.allow_global_seqno {
            return Err(MvccError::InvalidArgument(
                "ingestion requires a global sequence number but file modification is not allowed"
                    .to_string(),
            ));
        }
        let seqno = self.last_sequence.load(Ordering::SeqCst) + 1;
        let level = if overlaps { 0 } else { self.storage.bottom_level() };

        // Step 4: Bring the files in
        let mut added = Vec::with_capacity(files.len());
        for (path, data, _, _) in &files {
            let (number, dest) = self.storage.new_table_path();
            let moved = options.move_files && self.env.rename_file(path, &dest).is_ok();
            if !moved {
                self.env.write_file(&dest, data)?;
            }
            let table = self.storage.open_table(number, Some(seqno))?;
            added.push((level, Arc::new(table)));
        }

        self.storage.apply_edit(added, &[], seqno)?;
        self.last_sequence.store(seqno, Ordering::SeqCst);

        info!(files = files.len(), level, global_seqno = seqno, "Ingested external files");
        Ok(())
    }

    fn table_properties(&self) -> Result<Vec<(String, TableProperties)>> {
        Ok(self
            .storage
            .current()
            .tables()
            .map(|(_, t)| (t.name().to_string(), t.properties().clone()))
            .collect())
    }

    fn stats(&self) -> StoreStats {
        let version = self.storage.current();
        let cache = self.options.block_cache.as_ref();
        StoreStats {
            block_cache_hits: cache.map_or(0, |c| c.hits()),
            block_cache_misses: cache.map_or(0, |c| c.misses()),
            block_cache_usage: cache.map_or(0, |c| c.usage() as u64),
            flushes: self.flushes.load(Ordering::Relaxed),
            compactions: self.storage.compaction_count(),
            memtable_total_size: self.memtable.size() as u64,
            live_files: version.table_count() as u64,
            live_bytes: version.tables().map(|(_, t)| t.file_size()).sum(),
            pending_compaction_bytes: version.level(0).iter().map(|t| t.file_size()).sum(),
            last_sequence: self.last_sequence.load(Ordering::SeqCst),
        }
    }

    fn comparator(&self) -> Arc<dyn KeyComparator> {
        Arc::clone(&self.options.comparator)
    }

    fn merge_operator(&self) -> Option<Arc<dyn MergeOperator>> {
        self.options.merge_operator.clone()
    }

    /// Close the store gracefully
    ///
    /// Flushes any pending data, syncs the WAL and releases the directory
    /// lock. Fails if iterators are still alive.
    fn close(&self) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Ok(());
        }

        if !self.read_only {
            self.flush()?;
            self.sync_wal()?;
        }
        self.closed.store(true, Ordering::SeqCst);

        let lock = self
            .dir_lock
            .lock()
            .map_err(|e| MvccError::LockPoisoned(format!("Directory lock poisoned: {}", e)))?
            .take();
        if let Some(lock) = lock {
            self.env.unlock_file(lock)?;
        }

        let leaked = self.iterators.live();
        if leaked > 0 {
            warn!(leaked, "Store closed with live iterators");
            return Err(MvccError::Storage(format!("leaked {} iterators", leaked)));
        }

        info!(dir = %self.dir.display(), "Store closed");
        Ok(())
    }
}

impl Drop for LsmStore {
    fn drop(&mut self) {
        let lock = match self.dir_lock.get_mut() {
            Ok(lock) => lock.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(lock) = lock {
            if let Err(e) = self.env.unlock_file(lock) {
                warn!(error = %e, "Failed to release directory lock");
            }
        }
    }
}
