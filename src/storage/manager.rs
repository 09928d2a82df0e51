//! Storage Manager
//!
//! Manages the leveled set of SSTables and coordinates table reads, flush
//! installation and compaction.
//!
//! ## Responsibilities
//! - Load live tables from the manifest on startup, remove orphans
//! - Search tables for the versions of a key
//! - Build tables from flushed or compacted entries
//! - Install table changes atomically and persist them to the manifest
//! - Delete tables once no reader can reach them
//!
//! ## Levels
//! ```text
//! level 0        newest first, ranges may overlap (flushes, overlapping ingests)
//! level 1..n-2   unused
//! level n-1      sorted by smallest key, non-overlapping (compaction output)
//! ```

use std::cmp::Ordering as CmpOrdering;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::env::Env;
use crate::error::Result;

use super::{
    collapse_versions, group_by_key, sort_entries, BlockCache, KeyComparator, LiveFileMetadata,
    Manifest, ManifestFile, MergeOperator, SSTableBuilder, SSTableReader, StoreOptions, TableFilter,
    TableProperties, VersionedEntry,
};

/// Distinguishes the cache entries of stores sharing one block cache
static NEXT_STORE_ID: AtomicU64 = AtomicU64::new(1);

// =============================================================================
// Table Handle
// =============================================================================

/// Where a table's bytes are read from
#[derive(Debug)]
enum TableSource {
    /// Contents held in memory for the table's lifetime
    Resident(SSTableReader),
    /// Contents fetched through the shared block cache
    Cached { cache: Arc<BlockCache>, cache_key: String },
}

/// A live table file
#[derive(Debug)]
pub struct TableHandle {
    number: u64,
    name: String,
    path: PathBuf,
    smallest_key: Bytes,
    largest_key: Bytes,
    file_size: u64,
    properties: TableProperties,
    global_seqno: Option<u64>,
    source: TableSource,
    env: Arc<dyn Env>,
    /// Set once the table has been replaced; the file is deleted when the
    /// last version referencing it is dropped
    obsolete: AtomicBool,
}

impl TableHandle {
    pub fn number(&self) -> u64 {
        self.number
    }

    /// File name relative to the store directory
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn smallest_key(&self) -> &[u8] {
        &self.smallest_key
    }

    pub fn largest_key(&self) -> &[u8] {
        &self.largest_key
    }

    pub fn file_size(&self) -> u64 {
        self.file_size
    }

    pub fn properties(&self) -> &TableProperties {
        &self.properties
    }

    pub fn global_seqno(&self) -> Option<u64> {
        self.global_seqno
    }

    pub fn smallest_seqno(&self) -> u64 {
        self.global_seqno.unwrap_or(self.properties.smallest_seqno)
    }

    pub fn largest_seqno(&self) -> u64 {
        self.global_seqno.unwrap_or(self.properties.largest_seqno)
    }

    /// A reader over the table contents
    pub fn reader(&self) -> Result<SSTableReader> {
        match &self.source {
            TableSource::Resident(reader) => Ok(reader.clone()),
            TableSource::Cached { cache, cache_key } => {
                let (data, verify) = match cache.get(cache_key) {
                    Some(data) => (data, false),
                    None => {
                        let data = self.env.read_file(&self.path)?;
                        cache.insert(cache_key, data.clone());
                        (data, true)
                    }
                };
                Ok(SSTableReader::open(data, verify)?.with_global_seqno(self.global_seqno))
            }
        }
    }

    /// Whether the table's key range intersects `[start, end]`, both
    /// inclusive; `None` is unbounded.
    fn overlaps(&self, comparator: &dyn KeyComparator, start: Option<&[u8]>, end: Option<&[u8]>) -> bool {
        let after_start = start.map_or(true, |s| comparator.compare(&self.largest_key, s) != CmpOrdering::Less);
        let before_end = end.map_or(true, |e| comparator.compare(&self.smallest_key, e) != CmpOrdering::Greater);
        after_start && before_end
    }

    /// Whether the table's key range intersects `[start, end)`
    fn overlaps_span(&self, comparator: &dyn KeyComparator, start: Option<&[u8]>, end: Option<&[u8]>) -> bool {
        let after_start = start.map_or(true, |s| comparator.compare(&self.largest_key, s) != CmpOrdering::Less);
        let before_end = end.map_or(true, |e| comparator.compare(&self.smallest_key, e) == CmpOrdering::Less);
        after_start && before_end
    }

    fn contains(&self, comparator: &dyn KeyComparator, key: &[u8]) -> bool {
        self.overlaps(comparator, Some(key), Some(key))
    }

    fn mark_obsolete(&self) {
        self.obsolete.store(true, Ordering::SeqCst);
    }
}

impl Drop for TableHandle {
    fn drop(&mut self) {
        if !self.obsolete.load(Ordering::SeqCst) {
            return;
        }
        if let TableSource::Cached { cache, cache_key } = &self.source {
            cache.erase(cache_key);
        }
        match self.env.delete_file(&self.path) {
            Ok(()) => debug!(table = %self.name, "Deleted obsolete table"),
            Err(e) => warn!(table = %self.name, error = %e, "Failed to delete obsolete table"),
        }
    }
}

// =============================================================================
// Version
// =============================================================================

/// An immutable view of the live tables
#[derive(Debug, Clone, Default)]
pub struct Version {
    levels: Vec<Vec<Arc<TableHandle>>>,
}

impl Version {
    fn new(num_levels: usize) -> Self {
        Self {
            levels: vec![Vec::new(); num_levels],
        }
    }

    pub fn num_levels(&self) -> usize {
        self.levels.len()
    }

    pub fn level(&self, level: usize) -> &[Arc<TableHandle>] {
        self.levels.get(level).map_or(&[], |tables| tables.as_slice())
    }

    /// Every table with its level, level 0 first
    pub fn tables(&self) -> impl Iterator<Item = (usize, &Arc<TableHandle>)> {
        self.levels
            .iter()
            .enumerate()
            .flat_map(|(level, tables)| tables.iter().map(move |t| (level, t)))
    }

    pub fn table_count(&self) -> usize {
        self.levels.iter().map(Vec::len).sum()
    }

    /// Versions of `key` visible at `max_sequence`, newest first
    pub fn get_versions(
        &self,
        comparator: &dyn KeyComparator,
        key: &[u8],
        max_sequence: u64,
    ) -> Result<Vec<VersionedEntry>> {
        let mut versions = Vec::new();
        for (_, table) in self.tables() {
            if !table.contains(comparator, key) {
                continue;
            }
            versions.extend(table.reader()?.get_versions(comparator, key, max_sequence)?);
        }
        versions.sort_by(|a, b| b.sequence.cmp(&a.sequence));
        Ok(versions)
    }

    /// Readers for every table `filter` accepts, plus how many it rejected
    pub fn table_readers(&self, filter: Option<&dyn TableFilter>) -> Result<(Vec<SSTableReader>, u64)> {
        let mut readers = Vec::with_capacity(self.table_count());
        let mut skipped = 0u64;
        for (_, table) in self.tables() {
            if let Some(filter) = filter {
                if !filter.accept(table.properties()) {
                    debug!(table = %table.name(), "Table filter skipped table");
                    skipped += 1;
                    continue;
                }
            }
            readers.push(table.reader()?);
        }
        Ok((readers, skipped))
    }

    /// Versions in `[start, end)` with sequence `<= max_sequence`, table by
    /// table; `None` is unbounded.
    pub fn collect_entries(
        &self,
        comparator: &dyn KeyComparator,
        start: Option<&[u8]>,
        end: Option<&[u8]>,
        max_sequence: u64,
    ) -> Result<Vec<VersionedEntry>> {
        let mut entries = Vec::new();
        for (_, table) in self.tables() {
            if !table.overlaps_span(comparator, start, end) {
                continue;
            }
            let reader = table.reader()?;
            let first = match start {
                Some(s) => reader.lower_bound(comparator, s, u64::MAX)?,
                None => 0,
            };
            for entry in reader.iter_from(first) {
                let entry = entry?;
                if let Some(e) = end {
                    if comparator.compare(&entry.key, e) != CmpOrdering::Less {
                        break;
                    }
                }
                if entry.sequence <= max_sequence {
                    entries.push(entry);
                }
            }
        }
        Ok(entries)
    }
}

// =============================================================================
// Storage Manager
// =============================================================================

/// Manages the table layer
///
/// ## Concurrency:
/// - `version`: copy-on-write; readers clone the `Arc` and never block edits
/// - `edit_lock`: serializes version edits and manifest writes
/// - `next_file_number`: Atomic counter (lock-free)
pub struct StorageManager {
    env: Arc<dyn Env>,
    dir: PathBuf,
    options: StoreOptions,
    store_id: u64,
    version: RwLock<Arc<Version>>,
    edit_lock: Mutex<()>,
    next_file_number: AtomicU64,
    compactions: AtomicU64,
}

impl std::fmt::Debug for StorageManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageManager")
            .field("dir", &self.dir)
            .field("tables", &self.version.read().table_count())
            .finish()
    }
}

/// Result of opening the table layer
pub(crate) struct OpenedStorage {
    pub manager: StorageManager,
    /// Last sequence recorded in the manifest
    pub last_sequence: u64,
}

impl StorageManager {
    /// Open or create the table layer in `dir`
    ///
    /// On startup:
    /// 1. Create directory if it doesn't exist
    /// 2. Load the manifest
    /// 3. Open every live table (validates checksums)
    /// 4. Delete table files the manifest does not reference
    pub(crate) fn open(env: Arc<dyn Env>, dir: &Path, options: StoreOptions, read_only: bool) -> Result<OpenedStorage> {
        if !read_only {
            env.create_dir_all(dir)?;
        }

        let manifest = Manifest::load(env.as_ref(), dir)?.unwrap_or_default();

        let manager = Self {
            env,
            dir: dir.to_path_buf(),
            store_id: NEXT_STORE_ID.fetch_add(1, Ordering::SeqCst),
            version: RwLock::new(Arc::new(Version::new(options.num_levels))),
            edit_lock: Mutex::new(()),
            next_file_number: AtomicU64::new(manifest.next_file_number.max(1)),
            compactions: AtomicU64::new(0),
            options,
        };

        let mut version = Version::new(manager.options.num_levels);
        for file in &manifest.files {
            let level = file.level.min(manager.options.num_levels - 1);
            let table = manager.open_table(file.number, file.global_seqno)?;
            version.levels[level].push(Arc::new(table));
        }
        manager.sort_levels(&mut version);
        *manager.version.write() = Arc::new(version);

        if !read_only {
            manager.remove_orphans(&manifest)?;
        }

        info!(
            tables = manifest.files.len(),
            last_sequence = manifest.last_sequence,
            "Opened table layer"
        );

        Ok(OpenedStorage {
            manager,
            last_sequence: manifest.last_sequence,
        })
    }

    /// The current set of live tables
    pub fn current(&self) -> Arc<Version> {
        Arc::clone(&self.version.read())
    }

    pub fn num_levels(&self) -> usize {
        self.options.num_levels
    }

    pub fn bottom_level(&self) -> usize {
        self.options.num_levels - 1
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn compaction_count(&self) -> u64 {
        self.compactions.load(Ordering::Relaxed)
    }

    // =========================================================================
    // Table Creation
    // =========================================================================

    /// Reserve a file number and path for a new table
    pub(crate) fn new_table_path(&self) -> (u64, PathBuf) {
        let number = self.next_file_number.fetch_add(1, Ordering::SeqCst);
        (number, self.table_path(number))
    }

    /// Write internally ordered entries to new tables.
    ///
    /// With `split` the output is cut at `target_file_size`, always between
    /// two different keys.
    pub(crate) fn build_tables(&self, entries: &[VersionedEntry], split: bool) -> Result<Vec<Arc<TableHandle>>> {
        let comparator = self.options.comparator.as_ref();
        let mut tables = Vec::new();
        let mut builder: Option<(u64, SSTableBuilder)> = None;

        for group in group_by_key(comparator, entries) {
            if let Some((number, current)) = builder.take() {
                if split && current.estimated_size() >= self.options.target_file_size {
                    current.finish()?;
                    tables.push(Arc::new(self.open_table(number, None)?));
                } else {
                    builder = Some((number, current));
                }
            }

            if builder.is_none() {
                builder = Some(self.new_builder()?);
            }
            if let Some((_, current)) = builder.as_mut() {
                for entry in group {
                    current.add(entry)?;
                }
            }
        }

        if let Some((number, current)) = builder {
            current.finish()?;
            tables.push(Arc::new(self.open_table(number, None)?));
        }
        Ok(tables)
    }

    fn new_builder(&self) -> Result<(u64, SSTableBuilder)> {
        let (number, path) = self.new_table_path();
        let file = self.env.new_writable_file(&path)?;
        let collectors = self
            .options
            .collector_factories
            .iter()
            .map(|factory| factory.create())
            .collect();
        let builder = SSTableBuilder::new(file, Arc::clone(&self.options.comparator), collectors)?;
        Ok((number, builder))
    }

    /// Open table `number` from disk
    pub(crate) fn open_table(&self, number: u64, global_seqno: Option<u64>) -> Result<TableHandle> {
        let path = self.table_path(number);
        let name = Self::table_name(number);
        let data = self.env.read_file(&path)?;
        let file_size = data.len() as u64;
        let reader = SSTableReader::open(data.clone(), true)?.with_global_seqno(global_seqno);

        let smallest_key = reader.smallest_key()?.unwrap_or_default();
        let largest_key = reader.largest_key()?.unwrap_or_default();
        let properties = reader.properties().clone();

        let source = match &self.options.block_cache {
            Some(cache) => {
                let cache_key = format!("{}/{}", self.store_id, name);
                cache.insert(&cache_key, data);
                TableSource::Cached {
                    cache: Arc::clone(cache),
                    cache_key,
                }
            }
            None => TableSource::Resident(reader),
        };

        Ok(TableHandle {
            number,
            name,
            path,
            smallest_key,
            largest_key,
            file_size,
            properties,
            global_seqno,
            source,
            env: Arc::clone(&self.env),
            obsolete: AtomicBool::new(false),
        })
    }

    // =========================================================================
    // Version Edits
    // =========================================================================

    /// Atomically add and remove tables, then persist the new table set.
    /// Removed tables are deleted once no reader references them.
    pub(crate) fn apply_edit(
        &self,
        added: Vec<(usize, Arc<TableHandle>)>,
        removed: &[u64],
        last_sequence: u64,
    ) -> Result<()> {
        let _edit = self.edit_lock.lock();

        let mut version = (*self.current()).clone();
        let mut obsolete = Vec::new();
        for tables in &mut version.levels {
            tables.retain(|t| {
                let keep = !removed.contains(&t.number);
                if !keep {
                    obsolete.push(Arc::clone(t));
                }
                keep
            });
        }
        for (level, table) in added {
            if level == 0 {
                version.levels[0].insert(0, table);
            } else {
                version.levels[level].push(table);
            }
        }
        self.sort_levels(&mut version);

        self.manifest_for(&version, last_sequence)
            .save(self.env.as_ref(), &self.dir)?;
        *self.version.write() = Arc::new(version);

        for table in obsolete {
            table.mark_obsolete();
        }
        Ok(())
    }

    fn manifest_for(&self, version: &Version, last_sequence: u64) -> Manifest {
        Manifest {
            next_file_number: self.next_file_number.load(Ordering::SeqCst),
            last_sequence,
            files: version
                .tables()
                .map(|(level, t)| ManifestFile {
                    number: t.number,
                    level,
                    global_seqno: t.global_seqno,
                })
                .collect(),
        }
    }

    // =========================================================================
    // Compaction
    // =========================================================================

    /// Tables overlapping `[start, end)`, expanded until every table holding
    /// any key inside the inputs' combined range is included.
    pub(crate) fn pick_range_inputs(
        &self,
        version: &Version,
        start: Option<&[u8]>,
        end: Option<&[u8]>,
    ) -> Vec<(usize, Arc<TableHandle>)> {
        let comparator = self.options.comparator.as_ref();
        let seeds = version
            .tables()
            .filter(|(_, t)| t.overlaps_span(comparator, start, end))
            .map(|(level, t)| (level, Arc::clone(t)))
            .collect();
        self.expand_inputs(version, seeds)
    }

    /// Every level-0 table plus whatever overlaps them
    pub(crate) fn pick_level0_inputs(&self, version: &Version) -> Vec<(usize, Arc<TableHandle>)> {
        let seeds = version.level(0).iter().map(|t| (0, Arc::clone(t))).collect();
        self.expand_inputs(version, seeds)
    }

    fn expand_inputs(
        &self,
        version: &Version,
        mut inputs: Vec<(usize, Arc<TableHandle>)>,
    ) -> Vec<(usize, Arc<TableHandle>)> {
        let comparator = self.options.comparator.as_ref();
        loop {
            let Some((lo, hi)) = key_span(comparator, &inputs) else {
                return inputs;
            };
            let before = inputs.len();
            for (level, table) in version.tables() {
                let picked = inputs.iter().any(|(_, t)| t.number == table.number);
                if !picked && table.overlaps(comparator, Some(&lo), Some(&hi)) {
                    inputs.push((level, Arc::clone(table)));
                }
            }
            if inputs.len() == before {
                return inputs;
            }
        }
    }

    /// Rewrite `inputs` into the bottom level.
    ///
    /// Versions no snapshot can observe are dropped, merge chains are
    /// collapsed and tombstones with nothing beneath them removed. Returns
    /// false when there was nothing to do.
    pub(crate) fn compact(
        &self,
        inputs: &[(usize, Arc<TableHandle>)],
        snapshots: &[u64],
        merge_operator: Option<&dyn MergeOperator>,
        force_bottommost: bool,
        last_sequence: u64,
    ) -> Result<bool> {
        let bottom = self.bottom_level();
        if inputs.is_empty() || (!force_bottommost && inputs.iter().all(|(level, _)| *level == bottom)) {
            return Ok(false);
        }

        let input_bytes: u64 = inputs.iter().map(|(_, t)| t.file_size).sum();
        info!(
            inputs = inputs.len(),
            input_bytes,
            snapshots = snapshots.len(),
            "Compaction started"
        );

        let comparator = self.options.comparator.as_ref();
        let mut entries = Vec::new();
        for (_, table) in inputs {
            for entry in table.reader()?.iter() {
                entries.push(entry?);
            }
        }
        sort_entries(comparator, &mut entries);

        let mut output = Vec::with_capacity(entries.len());
        for group in group_by_key(comparator, &entries) {
            output.extend(collapse_versions(group, snapshots, true, merge_operator)?);
        }

        let tables = self.build_tables(&output, true)?;
        let output_bytes: u64 = tables.iter().map(|t| t.file_size).sum();
        let output_count = tables.len();
        let removed: Vec<u64> = inputs.iter().map(|(_, t)| t.number).collect();
        self.apply_edit(
            tables.into_iter().map(|t| (bottom, t)).collect(),
            &removed,
            last_sequence,
        )?;
        self.compactions.fetch_add(1, Ordering::Relaxed);

        info!(
            outputs = output_count,
            output_bytes,
            entries_in = entries.len(),
            entries_out = output.len(),
            "Compaction finished"
        );
        Ok(true)
    }

    // =========================================================================
    // Metadata
    // =========================================================================

    pub fn live_files_metadata(&self) -> Vec<LiveFileMetadata> {
        self.current()
            .tables()
            .map(|(level, t)| LiveFileMetadata {
                name: t.name.clone(),
                level,
                smallest_key: t.smallest_key.to_vec(),
                largest_key: t.largest_key.to_vec(),
                size: t.file_size,
                smallest_seqno: t.smallest_seqno(),
                largest_seqno: t.largest_seqno(),
            })
            .collect()
    }

    /// Bytes of tables overlapping `[start, end)`
    pub fn approximate_size(&self, start: &[u8], end: &[u8]) -> u64 {
        let comparator = self.options.comparator.as_ref();
        self.current()
            .tables()
            .filter(|(_, t)| t.overlaps_span(comparator, Some(start), Some(end)))
            .map(|(_, t)| t.file_size)
            .sum()
    }

    /// Whether any table overlaps `[start, end]` (inclusive)
    pub(crate) fn overlaps(&self, start: &[u8], end: &[u8]) -> bool {
        let comparator = self.options.comparator.as_ref();
        self.current()
            .tables()
            .any(|(_, t)| t.overlaps(comparator, Some(start), Some(end)))
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    fn table_name(number: u64) -> String {
        format!("{:06}.sst", number)
    }

    fn table_path(&self, number: u64) -> PathBuf {
        self.dir.join(Self::table_name(number))
    }

    /// Parse a table number from its file name
    /// "000042.sst" → Some(42)
    fn parse_table_number(name: &str) -> Option<u64> {
        name.strip_suffix(".sst")?.parse().ok()
    }

    fn sort_levels(&self, version: &mut Version) {
        let comparator = Arc::clone(&self.options.comparator);
        for tables in version.levels.iter_mut().skip(1) {
            tables.sort_by(|a, b| comparator.compare(&a.smallest_key, &b.smallest_key));
        }
    }

    fn remove_orphans(&self, manifest: &Manifest) -> Result<()> {
        for name in self.env.list_dir(&self.dir)? {
            let Some(number) = Self::parse_table_number(&name) else {
                continue;
            };
            if manifest.files.iter().all(|f| f.number != number) {
                warn!(table = %name, "Removing table not referenced by the manifest");
                self.env.delete_file(&self.dir.join(&name))?;
            }
        }
        Ok(())
    }
}

/// Smallest and largest key over a set of tables
fn key_span(comparator: &dyn KeyComparator, tables: &[(usize, Arc<TableHandle>)]) -> Option<(Bytes, Bytes)> {
    let mut iter = tables.iter();
    let (_, first) = iter.next()?;
    let mut lo = first.smallest_key.clone();
    let mut hi = first.largest_key.clone();
    for (_, t) in iter {
        if comparator.compare(&t.smallest_key, &lo) == CmpOrdering::Less {
            lo = t.smallest_key.clone();
        }
        if comparator.compare(&t.largest_key, &hi) == CmpOrdering::Greater {
            hi = t.largest_key.clone();
        }
    }
    Some((lo, hi))
}
