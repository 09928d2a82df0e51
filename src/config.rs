//! Configuration for mvcckv
//!
//! Centralized configuration with sensible defaults.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::compaction::DEFAULT_COMPACTION_TARGET_SIZE;
use crate::env::EnvManager;
use crate::error::{MvccError, Result};
use crate::storage::BlockCache;

/// Main configuration for an engine instance
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Storage Configuration
    // -------------------------------------------------------------------------
    /// Root directory for all data files. An empty path opens an in-memory
    /// engine.
    /// Internal structure:
    ///   {data_dir}/
    ///     ├── LOCK             (directory lock)
    ///     ├── MANIFEST         (live table set)
    ///     ├── MVCC_REGISTRY    (file registry, when enabled)
    ///     ├── wal.log          (write-ahead log)
    ///     └── 000001.sst ...   (table files)
    pub data_dir: PathBuf,

    /// Open without writing anything to the directory
    pub read_only: bool,

    /// Keep a file registry alongside the data
    pub use_file_registry: bool,

    // -------------------------------------------------------------------------
    // WAL Configuration
    // -------------------------------------------------------------------------
    /// Sync strategy: how often to fsync WAL
    pub wal_sync_strategy: WalSyncStrategy,

    // -------------------------------------------------------------------------
    // MemTable Configuration
    // -------------------------------------------------------------------------
    /// Max size of memtable before flush (in bytes)
    pub memtable_size_limit: usize,

    // -------------------------------------------------------------------------
    // Compaction Configuration
    // -------------------------------------------------------------------------
    /// Number of table levels; the last one is the bottom level
    pub num_levels: usize,

    /// Level 0 table count that triggers a compaction into the bottom level
    pub l0_compaction_trigger: usize,

    /// Output table size for flushes and compactions (in bytes)
    pub target_file_size: u64,

    /// Bytes of bottom-level data compacted per step of a range compaction
    pub compaction_target_size: u64,

    // -------------------------------------------------------------------------
    // Extension Configuration
    // -------------------------------------------------------------------------
    /// Table cache shared with other engines
    pub block_cache: Option<Arc<BlockCache>>,

    /// Opaque options handed to the open hook
    pub extra_options: Vec<u8>,

    /// `name=value;name=value` overrides applied at open
    pub store_options: String,

    /// Validation run before the store is opened; the default hook rejects
    /// any extra options
    pub open_hook: Option<Arc<dyn OpenHook>>,
}

/// WAL sync strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalSyncStrategy {
    /// fsync after every write (safest, slowest)
    EveryWrite,

    /// fsync after N uncommitted entries (balanced durability/performance)
    EveryNEntries { count: usize },
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::new(),
            read_only: false,
            use_file_registry: false,
            wal_sync_strategy: WalSyncStrategy::EveryNEntries { count: 100 },
            memtable_size_limit: 64 * 1024 * 1024, // 64 MB
            num_levels: 7,
            l0_compaction_trigger: 4,
            target_file_size: 64 * 1024 * 1024, // 64 MB
            compaction_target_size: DEFAULT_COMPACTION_TARGET_SIZE,
            block_cache: None,
            extra_options: Vec::new(),
            store_options: String::new(),
            open_hook: None,
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    pub fn is_in_memory(&self) -> bool {
        self.data_dir.as_os_str().is_empty()
    }

    /// Return a copy with `store_options` applied.
    ///
    /// Recognised names: `memtable_size_limit`, `num_levels`,
    /// `l0_compaction_trigger`, `target_file_size`,
    /// `compaction_target_size` and `wal_sync_every` (0 syncs every write).
    pub fn with_store_options_applied(&self) -> Result<Config> {
        let mut config = self.clone();
        for pair in self.store_options.split(';') {
            let pair = pair.trim();
            if pair.is_empty() {
                continue;
            }
            let (name, value) = pair
                .split_once('=')
                .ok_or_else(|| MvccError::InvalidArgument(format!("malformed store option '{}'", pair)))?;
            let name = name.trim();
            let value = value.trim();
            match name {
                "memtable_size_limit" => config.memtable_size_limit = parse_number(name, value)?,
                "num_levels" => config.num_levels = parse_number(name, value)?,
                "l0_compaction_trigger" => config.l0_compaction_trigger = parse_number(name, value)?,
                "target_file_size" => config.target_file_size = parse_number(name, value)?,
                "compaction_target_size" => config.compaction_target_size = parse_number(name, value)?,
                "wal_sync_every" => {
                    config.wal_sync_strategy = match parse_number::<usize>(name, value)? {
                        0 => WalSyncStrategy::EveryWrite,
                        count => WalSyncStrategy::EveryNEntries { count },
                    }
                }
                _ => {
                    return Err(MvccError::InvalidArgument(format!(
                        "unknown store option '{}'",
                        name
                    )))
                }
            }
        }
        config.store_options.clear();
        Ok(config)
    }
}

fn parse_number<T: std::str::FromStr>(name: &str, value: &str) -> Result<T> {
    value.parse().map_err(|_| {
        MvccError::InvalidArgument(format!("invalid value '{}' for store option '{}'", value, name))
    })
}

/// Validation step run while an engine opens, after the environment is
/// ready and before the store is opened.
pub trait OpenHook: Send + Sync + fmt::Debug {
    fn on_open(&self, data_dir: &Path, extra_options: &[u8], env: &EnvManager) -> Result<()>;
}

/// Accepts the open only when no extra options are given.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultOpenHook;

impl OpenHook for DefaultOpenHook {
    fn on_open(&self, _data_dir: &Path, extra_options: &[u8], _env: &EnvManager) -> Result<()> {
        if !extra_options.is_empty() {
            return Err(MvccError::InvalidArgument(
                "extra options were given but no open hook handles them".to_string(),
            ));
        }
        Ok(())
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the data directory (root for all storage); empty for in-memory
    pub fn data_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.data_dir = path.into();
        self
    }

    pub fn read_only(mut self, read_only: bool) -> Self {
        self.config.read_only = read_only;
        self
    }

    pub fn use_file_registry(mut self, enabled: bool) -> Self {
        self.config.use_file_registry = enabled;
        self
    }

    /// Set the WAL sync strategy
    pub fn wal_sync_strategy(mut self, strategy: WalSyncStrategy) -> Self {
        self.config.wal_sync_strategy = strategy;
        self
    }

    /// Set the memtable size limit (in bytes)
    pub fn memtable_size_limit(mut self, size: usize) -> Self {
        self.config.memtable_size_limit = size;
        self
    }

    pub fn num_levels(mut self, levels: usize) -> Self {
        self.config.num_levels = levels;
        self
    }

    pub fn l0_compaction_trigger(mut self, count: usize) -> Self {
        self.config.l0_compaction_trigger = count;
        self
    }

    /// Set the output table size (in bytes)
    pub fn target_file_size(mut self, size: u64) -> Self {
        self.config.target_file_size = size;
        self
    }

    /// Set the bytes compacted per range compaction step
    pub fn compaction_target_size(mut self, size: u64) -> Self {
        self.config.compaction_target_size = size;
        self
    }

    pub fn block_cache(mut self, cache: Arc<BlockCache>) -> Self {
        self.config.block_cache = Some(cache);
        self
    }

    pub fn extra_options(mut self, options: impl Into<Vec<u8>>) -> Self {
        self.config.extra_options = options.into();
        self
    }

    pub fn store_options(mut self, options: impl Into<String>) -> Self {
        self.config.store_options = options.into();
        self
    }

    pub fn open_hook(mut self, hook: Arc<dyn OpenHook>) -> Self {
        self.config.open_hook = Some(hook);
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
