//! Engine Module
//!
//! The facade callers use: versioned keys in, versioned keys out.
//!
//! ## Responsibilities
//! - Open the store with the MVCC comparator, prefix extractor, merge
//!   operator and time-bound property collector installed
//! - Encode keys for point operations and wrap store iterators
//! - Snapshots, batches and external file ingestion
//! - Space-bounded manual compaction
//!
//! ## Handles
//! ```text
//!             ┌──────────── Engine ────────────┐
//!             │ Reader + Writer                │
//!             └──┬──────────────┬───────────┬──┘
//!                │              │           │
//!            Snapshot         Batch    WriteOnlyBatch
//!            (Reader)   (Reader + Writer)  (Writer)
//! ```
//! Every handle shares the engine's store; snapshots pin a read view and
//! batches buffer writes until committed.

mod batch;
mod batch_iter;
mod snapshot;
mod sst_writer;
mod stats;

use std::cmp::Ordering;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use bytes::Bytes;
use tracing::{debug, info};

use crate::compaction::{plan_compaction, CompactionPlan};
use crate::config::{Config, DefaultOpenHook, OpenHook};
use crate::env::{DiskEnv, Env, EnvManager, FileEntry, FileLock, WritableFile};
use crate::error::{MvccError, Result};
use crate::iterator::{IteratorStats, MvccIterator, TimeBoundCollectorFactory, TimeBoundFilter};
use crate::key::{MvccComparator, MvccPrefixExtractor, Timestamp, VersionedKey};
use crate::merge::MvccMergeOperator;
use crate::storage::{
    CompactRangeOptions, IngestOptions, KeyComparator, KvStore, LsmStore, ReadOptions, StoreOptions,
    StoreSnapshot, StoreStats, TableFilter, WriteBatch,
};

pub use batch::{Batch, WriteOnlyBatch};
pub use snapshot::Snapshot;
pub use sst_writer::SstFileWriter;
pub use stats::{SSTableInfo, UserProperties};

// =============================================================================
// Reader / Writer
// =============================================================================

/// How an iterator should be built
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IterOptions {
    /// Only iterate keys sharing the seek target's user key
    pub prefix: bool,
    /// Skip tables holding no version in `[min, max]`
    pub time_bounds: Option<(Timestamp, Timestamp)>,
    /// Collect [`IteratorStats`]
    pub with_stats: bool,
}

impl IterOptions {
    pub fn prefix() -> Self {
        Self {
            prefix: true,
            ..Self::default()
        }
    }

    pub fn time_bound(min: Timestamp, max: Timestamp) -> Self {
        Self {
            time_bounds: Some((min, max)),
            ..Self::default()
        }
    }

    pub fn with_stats(mut self) -> Self {
        self.with_stats = true;
        self
    }
}

/// Point reads and iteration over versioned keys
pub trait Reader {
    fn get(&self, key: &VersionedKey) -> Result<Option<Vec<u8>>>;

    fn new_iterator(&self, options: IterOptions) -> Result<MvccIterator>;
}

/// Mutations of versioned keys
pub trait Writer {
    fn put(&self, key: &VersionedKey, value: &[u8]) -> Result<()>;

    fn merge(&self, key: &VersionedKey, value: &[u8]) -> Result<()>;

    fn delete(&self, key: &VersionedKey) -> Result<()>;

    /// Delete every key in `[start, end)`
    fn delete_range(&self, start: &VersionedKey, end: &VersionedKey) -> Result<()>;

    /// Walk `iter` from `start` up to (excluding) `end`, deleting each key
    /// it lands on. Stops at the first failure; earlier deletes stay.
    fn delete_iter_range(&self, iter: &mut MvccIterator, start: &VersionedKey, end: &VersionedKey) -> Result<()> {
        let comparator = MvccComparator;
        let end_key = end.encode();

        iter.seek(start);
        loop {
            let key = {
                let state = iter.state();
                state.status?;
                match state.key {
                    Some(key) if state.valid => key.to_owned_key(),
                    _ => return Ok(()),
                }
            };
            if comparator.compare(&key.encode(), &end_key) != Ordering::Less {
                return Ok(());
            }
            self.delete(&key)?;
            iter.next(false);
        }
    }
}

/// Translate iterator options into store read options
pub(crate) fn read_options(
    options: &IterOptions,
    snapshot: Option<StoreSnapshot>,
) -> (ReadOptions, Option<Arc<IteratorStats>>) {
    let stats = options.with_stats.then(IteratorStats::new);
    let mut read = ReadOptions {
        snapshot,
        ..ReadOptions::default()
    };
    match options.time_bounds {
        Some((min, max)) => {
            let filter: Arc<dyn TableFilter> = Arc::new(TimeBoundFilter::new(min, max, stats.clone()));
            read.total_order_seek = true;
            read.table_filter = Some(filter);
        }
        None if options.prefix => read.prefix_same_as_start = true,
        None => read.total_order_seek = true,
    }
    (read, stats)
}

// =============================================================================
// Engine
// =============================================================================

/// An open MVCC engine
///
/// Shared by any number of readers and writers; the store does the
/// locking. Iterators and batches are owned by a single caller each.
#[derive(Debug)]
pub struct Engine {
    store: Arc<dyn KvStore>,
    env: EnvManager,
    config: Config,
}

impl Engine {
    /// Open or create an engine with the given config
    ///
    /// On startup:
    /// 1. Apply `store_options` overrides
    /// 2. Choose the environment and check the file registry
    /// 3. Run the open hook
    /// 4. Open the store with the MVCC plug-ins installed
    pub fn open(config: Config) -> Result<Self> {
        // Step 1: Overrides
        let config = config.with_store_options_applied()?;

        // Step 2: Environment
        let mut env = EnvManager::open(&config.data_dir, config.read_only);
        env.init_registry(config.use_file_registry)?;

        // Step 3: Hook
        let hook: Arc<dyn OpenHook> = config
            .open_hook
            .clone()
            .unwrap_or_else(|| Arc::new(DefaultOpenHook));
        hook.on_open(&config.data_dir, &config.extra_options, &env)?;

        // Step 4: Store
        let options = StoreOptions {
            comparator: Arc::new(MvccComparator),
            merge_operator: Some(Arc::new(MvccMergeOperator)),
            prefix_extractor: Some(Arc::new(MvccPrefixExtractor)),
            collector_factories: vec![Arc::new(TimeBoundCollectorFactory)],
            block_cache: config.block_cache.clone(),
            wal_sync_strategy: config.wal_sync_strategy,
            memtable_size_limit: config.memtable_size_limit,
            num_levels: config.num_levels,
            l0_compaction_trigger: config.l0_compaction_trigger,
            target_file_size: config.target_file_size,
        };
        let store = LsmStore::open(Arc::clone(&env.env), &config.data_dir, options, config.read_only)?;

        info!(
            data_dir = %config.data_dir.display(),
            in_memory = config.is_in_memory(),
            read_only = config.read_only,
            file_registry = config.use_file_registry,
            "Engine opened"
        );

        Ok(Self {
            store: Arc::new(store),
            env,
            config,
        })
    }

    /// Remove the store in `dir` and everything directly inside it.
    ///
    /// Fails while an engine in this process holds the directory.
    pub fn destroy(dir: &Path) -> Result<()> {
        let env = DiskEnv::new();
        if !env.file_exists(dir) {
            return Ok(());
        }
        let lock = env.lock_file(&dir.join(LsmStore::LOCK_FILENAME))?;
        env.unlock_file(lock)?;
        env.delete_dir_and_files(dir)?;
        info!(dir = %dir.display(), "Engine destroyed");
        Ok(())
    }

    /// Flush, sync and release the store. Reports leaked iterators.
    pub fn close(&self) -> Result<()> {
        self.store.close()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn KvStore> {
        &self.store
    }

    pub fn env(&self) -> &EnvManager {
        &self.env
    }

    pub fn flush(&self) -> Result<()> {
        self.store.flush()
    }

    pub fn sync_wal(&self) -> Result<()> {
        self.store.sync_wal()
    }

    // =========================================================================
    // Compaction
    // =========================================================================

    /// Compact everything, rewriting the bottom level too
    pub fn compact(&self) -> Result<()> {
        self.compact_range(None, None, true)
    }

    /// Compact `[start, end)`; `None` is unbounded.
    ///
    /// Spans already settled at the bottom level are compacted in
    /// sub-ranges of `compaction_target_size` bytes, one at a time. The
    /// first failing sub-range stops the compaction; finished ones stay.
    pub fn compact_range(
        &self,
        start: Option<&VersionedKey>,
        end: Option<&VersionedKey>,
        force_bottommost: bool,
    ) -> Result<()> {
        let start_key = start.map(VersionedKey::encode).unwrap_or_default();
        let end_key = end.map(VersionedKey::encode).unwrap_or_default();
        let options = CompactRangeOptions {
            exclusive: false,
            force_bottommost,
        };

        let comparator = self.store.comparator();
        let plan = plan_compaction(
            comparator.as_ref(),
            self.store.live_files_metadata(),
            &start_key,
            &end_key,
            self.store.num_levels(),
            self.config.compaction_target_size,
        );
        match &plan {
            CompactionPlan::Whole(_) => info!(force_bottommost, "Compacting span in one step"),
            CompactionPlan::Batched(ranges) => {
                info!(ranges = ranges.len(), force_bottommost, "Compacting span in batches")
            }
        }

        for (i, range) in plan.ranges().iter().enumerate() {
            debug!(range = i, start_len = range.start.len(), end_len = range.end.len(), "Compacting range");
            self.store.compact_range(&options, range.start_bound(), range.end_bound())?;
        }
        Ok(())
    }

    /// Table bytes overlapping `[start, end)`, from file metadata only
    pub fn approximate_disk_bytes(&self, start: &VersionedKey, end: &VersionedKey) -> Result<u64> {
        let (start, end) = (start.encode(), end.encode());
        if self.store.comparator().compare(&start, &end) == Ordering::Greater {
            return Err(MvccError::InvalidArgument(
                "approximate size range starts after it ends".to_string(),
            ));
        }
        Ok(self.store.approximate_size(&start, &end))
    }

    // =========================================================================
    // Handles
    // =========================================================================

    /// Pin the current state for consistent reads
    pub fn new_snapshot(&self) -> Snapshot {
        Snapshot::new(Arc::clone(&self.store))
    }

    /// A batch whose reads see its own pending writes
    pub fn new_batch(&self) -> Batch {
        Batch::new(Arc::clone(&self.store))
    }

    pub fn new_write_only_batch(&self) -> WriteOnlyBatch {
        WriteOnlyBatch::new(Arc::clone(&self.store))
    }

    /// Apply a batch produced by `Batch::repr`
    pub fn apply_batch_repr(&self, repr: &[u8], sync: bool) -> Result<()> {
        let batch = WriteBatch::decode(repr)?;
        self.store.write(&batch, sync)
    }

    // =========================================================================
    // External Files
    // =========================================================================

    /// A writer for tables in this engine's key encoding, ready to `open`
    pub fn new_sst_file_writer(&self) -> SstFileWriter {
        SstFileWriter::new()
    }

    /// Ingest tables built with [`SstFileWriter`].
    ///
    /// With `allow_file_modifications` unset, ingestion fails whenever the
    /// files would need a fresh sequence number (they overlap existing data
    /// or a snapshot is live).
    pub fn ingest_external_files(
        &self,
        paths: &[PathBuf],
        move_files: bool,
        allow_file_modifications: bool,
    ) -> Result<()> {
        let options = IngestOptions {
            move_files,
            snapshot_consistency: true,
            allow_global_seqno: allow_file_modifications,
            allow_blocking_flush: true,
        };
        self.store.ingest_external_files(paths, &options)
    }

    // =========================================================================
    // Observability
    // =========================================================================

    pub fn get_stats(&self) -> StoreStats {
        self.store.stats()
    }

    pub fn get_sstables(&self) -> Vec<SSTableInfo> {
        stats::sstables(&self.store.live_files_metadata())
    }

    /// Per-level table counts and sizes as a printable table
    pub fn get_compaction_stats(&self) -> String {
        stats::compaction_summary(&self.store.live_files_metadata(), self.store.num_levels())
    }

    /// Timestamp bounds recorded in every live table
    pub fn get_user_properties(&self) -> Result<Vec<UserProperties>> {
        Ok(self
            .store
            .table_properties()?
            .into_iter()
            .map(|(name, props)| UserProperties::from_table(name, &props))
            .collect())
    }

    // =========================================================================
    // Environment Passthrough
    // =========================================================================

    /// Replace a file's contents through the engine's environment
    pub fn env_write_file(&self, path: &Path, contents: &[u8]) -> Result<()> {
        self.check_env_writable(path)?;
        self.env.env.write_file(path, contents)?;
        self.register_file(path)
    }

    /// Create a file for appending through the engine's environment
    pub fn env_open_file(&self, path: &Path) -> Result<Box<dyn WritableFile>> {
        self.check_env_writable(path)?;
        let file = self.env.env.new_writable_file(path)?;
        self.register_file(path)?;
        Ok(file)
    }

    pub fn env_append_file(&self, file: &mut dyn WritableFile, contents: &[u8]) -> Result<()> {
        file.append(contents)?;
        file.flush()
    }

    pub fn env_sync_file(&self, file: &mut dyn WritableFile) -> Result<()> {
        file.sync()
    }

    pub fn env_read_file(&self, path: &Path) -> Result<Bytes> {
        self.env.env.read_file(path)
    }

    pub fn env_delete_file(&self, path: &Path) -> Result<()> {
        self.check_env_writable(path)?;
        self.env.env.delete_file(path)?;
        if let (Some(registry), Some(name)) = (&self.env.file_registry, self.registry_name(path)) {
            registry.maybe_delete_entry(&name)?;
        }
        Ok(())
    }

    pub fn env_delete_dir_and_files(&self, dir: &Path) -> Result<()> {
        self.check_env_writable(dir)?;
        self.env.env.delete_dir_and_files(dir)
    }

    fn check_env_writable(&self, path: &Path) -> Result<()> {
        if self.env.read_only {
            return Err(MvccError::NotSupported(format!(
                "cannot modify {} in read-only mode",
                path.display()
            )));
        }
        Ok(())
    }

    fn registry_name(&self, path: &Path) -> Option<String> {
        let relative = path.strip_prefix(&self.env.data_dir).unwrap_or(path);
        relative.to_str().map(str::to_string)
    }

    fn register_file(&self, path: &Path) -> Result<()> {
        if let (Some(registry), Some(name)) = (&self.env.file_registry, self.registry_name(path)) {
            registry.set_file_entry(&name, FileEntry::default())?;
        }
        Ok(())
    }

    // =========================================================================
    // Process-wide File Locks
    // =========================================================================

    /// Take the process-wide lock on `path`, creating the file if needed
    pub fn lock_file(path: &Path) -> Result<FileLock> {
        DiskEnv::new().lock_file(path)
    }

    pub fn unlock_file(lock: FileLock) -> Result<()> {
        DiskEnv::new().unlock_file(lock)
    }
}

impl Reader for Engine {
    fn get(&self, key: &VersionedKey) -> Result<Option<Vec<u8>>> {
        self.store.get(&ReadOptions::default(), &key.encode())
    }

    fn new_iterator(&self, options: IterOptions) -> Result<MvccIterator> {
        let (read, stats) = read_options(&options, None);
        Ok(MvccIterator::new(self.store.new_iterator(read)?, stats))
    }
}

impl Writer for Engine {
    fn put(&self, key: &VersionedKey, value: &[u8]) -> Result<()> {
        self.store.put(&key.encode(), value)
    }

    fn merge(&self, key: &VersionedKey, value: &[u8]) -> Result<()> {
        self.store.merge(&key.encode(), value)
    }

    fn delete(&self, key: &VersionedKey) -> Result<()> {
        self.store.delete(&key.encode())
    }

    fn delete_range(&self, start: &VersionedKey, end: &VersionedKey) -> Result<()> {
        self.store.delete_range(&start.encode(), &end.encode())
    }
}
