//! Environment Module
//!
//! File-level primitives the store performs all of its I/O through.
//!
//! ## Responsibilities
//! - Uniform open/read/append/sync/delete/lock operations
//! - On-disk (`DiskEnv`) and in-process (`MemEnv`) implementations
//! - File registry bookkeeping for the data directory
//!
//! The engine never touches `std::fs` directly; an empty data directory
//! selects the in-memory environment.

mod disk;
mod mem;
mod registry;

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use bytes::Bytes;

use crate::error::Result;

pub use disk::DiskEnv;
pub use mem::MemEnv;
pub use registry::{FileEntry, FileRegistry, REGISTRY_FILENAME};

/// A file opened for appending
pub trait WritableFile: Send {
    fn append(&mut self, data: &[u8]) -> Result<()>;

    /// Push buffered data to the environment
    fn flush(&mut self) -> Result<()>;

    /// Make appended data durable
    fn sync(&mut self) -> Result<()>;
}

/// An exclusive lock on a path, released with [`Env::unlock_file`]
#[derive(Debug, PartialEq, Eq)]
pub struct FileLock {
    path: PathBuf,
}

impl FileLock {
    pub(crate) fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Storage environment
pub trait Env: Send + Sync + fmt::Debug {
    /// Create (or truncate) a file for writing
    fn new_writable_file(&self, path: &Path) -> Result<Box<dyn WritableFile>>;

    /// Open a file for appending, creating it if missing
    fn reopen_writable_file(&self, path: &Path) -> Result<Box<dyn WritableFile>>;

    fn read_file(&self, path: &Path) -> Result<Bytes>;

    /// Replace a file's contents
    fn write_file(&self, path: &Path, contents: &[u8]) -> Result<()>;

    fn file_exists(&self, path: &Path) -> bool;

    fn file_size(&self, path: &Path) -> Result<u64>;

    fn delete_file(&self, path: &Path) -> Result<()>;

    fn rename_file(&self, from: &Path, to: &Path) -> Result<()>;

    fn create_dir_all(&self, path: &Path) -> Result<()>;

    /// Names of the entries directly inside `path`
    fn list_dir(&self, path: &Path) -> Result<Vec<String>>;

    /// Delete a directory and the files directly inside it
    fn delete_dir_and_files(&self, path: &Path) -> Result<()>;

    fn lock_file(&self, path: &Path) -> Result<FileLock>;

    fn unlock_file(&self, lock: FileLock) -> Result<()>;
}

/// The environment chosen for one data directory
#[derive(Debug, Clone)]
pub struct EnvManager {
    pub env: Arc<dyn Env>,
    pub data_dir: PathBuf,
    pub read_only: bool,
    /// Loaded registry, present only when the registry is in use
    pub file_registry: Option<Arc<FileRegistry>>,
}

impl EnvManager {
    /// Pick the environment for `data_dir`: in-memory when it is empty,
    /// the local filesystem otherwise.
    pub fn open(data_dir: &Path, read_only: bool) -> Self {
        let env: Arc<dyn Env> = if data_dir.as_os_str().is_empty() {
            Arc::new(MemEnv::new())
        } else {
            Arc::new(DiskEnv::new())
        };
        Self {
            env,
            data_dir: data_dir.to_path_buf(),
            read_only,
            file_registry: None,
        }
    }

    /// Load the file registry, or verify that none exists when it is not
    /// in use.
    pub fn init_registry(&mut self, use_file_registry: bool) -> Result<()> {
        let registry = FileRegistry::new(Arc::clone(&self.env), &self.data_dir, self.read_only);
        if use_file_registry {
            registry.load()?;
            self.file_registry = Some(Arc::new(registry));
        } else {
            registry.check_no_registry_file()?;
        }
        Ok(())
    }
}
