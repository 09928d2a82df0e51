//! File registry
//!
//! Records per-file environment settings for a data directory. The registry
//! is a single bincode file rewritten atomically on every change.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{MvccError, Result};

use super::Env;

/// Name of the registry file inside the data directory
pub const REGISTRY_FILENAME: &str = "MVCC_REGISTRY";

/// Settings recorded for one file
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEntry {
    /// Environment type the file was written with
    pub env_type: u32,
    /// Opaque settings owned by that environment
    pub settings: Vec<u8>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct RegistryContents {
    files: BTreeMap<String, FileEntry>,
}

/// Registry of the files in one data directory
#[derive(Debug)]
pub struct FileRegistry {
    env: Arc<dyn Env>,
    data_dir: PathBuf,
    read_only: bool,
    contents: Mutex<RegistryContents>,
}

impl FileRegistry {
    pub fn new(env: Arc<dyn Env>, data_dir: &Path, read_only: bool) -> Self {
        Self {
            env,
            data_dir: data_dir.to_path_buf(),
            read_only,
            contents: Mutex::new(RegistryContents::default()),
        }
    }

    fn registry_path(&self) -> PathBuf {
        self.data_dir.join(REGISTRY_FILENAME)
    }

    /// Load the registry from disk; a missing file is an empty registry.
    pub fn load(&self) -> Result<()> {
        let path = self.registry_path();
        if !self.env.file_exists(&path) {
            return Ok(());
        }
        let data = self.env.read_file(&path)?;
        let contents: RegistryContents = bincode::deserialize(&data)
            .map_err(|e| MvccError::Corruption(format!("file registry: {}", e)))?;
        debug!(files = contents.files.len(), "Loaded file registry");
        *self.contents.lock() = contents;
        Ok(())
    }

    /// Fail if a registry file exists while the registry is not in use.
    pub fn check_no_registry_file(&self) -> Result<()> {
        if self.env.file_exists(&self.registry_path()) {
            return Err(MvccError::InvalidArgument(format!(
                "registry file {} exists but the file registry is disabled",
                self.registry_path().display()
            )));
        }
        Ok(())
    }

    pub fn get_file_entry(&self, filename: &str) -> Option<FileEntry> {
        self.contents.lock().files.get(filename).cloned()
    }

    pub fn set_file_entry(&self, filename: &str, entry: FileEntry) -> Result<()> {
        let mut contents = self.contents.lock();
        contents.files.insert(filename.to_string(), entry);
        self.persist(&contents)
    }

    /// Remove an entry if present
    pub fn maybe_delete_entry(&self, filename: &str) -> Result<()> {
        let mut contents = self.contents.lock();
        if contents.files.remove(filename).is_none() {
            return Ok(());
        }
        self.persist(&contents)
    }

    /// Move an entry to a new name if present
    pub fn maybe_rename_entry(&self, from: &str, to: &str) -> Result<()> {
        let mut contents = self.contents.lock();
        let Some(entry) = contents.files.remove(from) else {
            return Ok(());
        };
        contents.files.insert(to.to_string(), entry);
        self.persist(&contents)
    }

    pub fn len(&self) -> usize {
        self.contents.lock().files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contents.lock().files.is_empty()
    }

    fn persist(&self, contents: &RegistryContents) -> Result<()> {
        if self.read_only {
            return Err(MvccError::NotSupported(
                "file registry is read-only".to_string(),
            ));
        }
        let data = bincode::serialize(contents)?;
        let tmp = self.data_dir.join(format!("{}.tmp", REGISTRY_FILENAME));
        self.env.write_file(&tmp, &data)?;
        self.env.rename_file(&tmp, &self.registry_path())
    }
}
