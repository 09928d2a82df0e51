//! In-process environment
//!
//! Files live in a shared map; nothing survives the process. Used for
//! in-memory engines and for building tables entirely in memory.

use std::collections::{BTreeMap, HashSet};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;

use crate::error::{MvccError, Result};

use super::{Env, FileLock, WritableFile};

type FileData = Arc<Mutex<Vec<u8>>>;

/// Environment whose files are byte vectors
#[derive(Debug, Default)]
pub struct MemEnv {
    files: Mutex<BTreeMap<PathBuf, FileData>>,
    dirs: Mutex<HashSet<PathBuf>>,
    locks: Mutex<HashSet<PathBuf>>,
}

impl MemEnv {
    pub fn new() -> Self {
        Self::default()
    }

    fn not_found(path: &Path) -> MvccError {
        MvccError::Io(io::Error::new(
            io::ErrorKind::NotFound,
            format!("{}: no such file", path.display()),
        ))
    }
}

struct MemFile {
    data: FileData,
}

impl WritableFile for MemFile {
    fn append(&mut self, data: &[u8]) -> Result<()> {
        self.data.lock().extend_from_slice(data);
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        Ok(())
    }

    fn sync(&mut self) -> Result<()> {
        Ok(())
    }
}

impl Env for MemEnv {
    fn new_writable_file(&self, path: &Path) -> Result<Box<dyn WritableFile>> {
        let data: FileData = Arc::new(Mutex::new(Vec::new()));
        self.files.lock().insert(path.to_path_buf(), Arc::clone(&data));
        Ok(Box::new(MemFile { data }))
    }

    fn reopen_writable_file(&self, path: &Path) -> Result<Box<dyn WritableFile>> {
        let data = Arc::clone(self.files.lock().entry(path.to_path_buf()).or_default());
        Ok(Box::new(MemFile { data }))
    }

    fn read_file(&self, path: &Path) -> Result<Bytes> {
        let files = self.files.lock();
        let data = files.get(path).ok_or_else(|| Self::not_found(path))?;
        let contents = data.lock().clone();
        Ok(Bytes::from(contents))
    }

    fn write_file(&self, path: &Path, contents: &[u8]) -> Result<()> {
        self.files
            .lock()
            .insert(path.to_path_buf(), Arc::new(Mutex::new(contents.to_vec())));
        Ok(())
    }

    fn file_exists(&self, path: &Path) -> bool {
        self.files.lock().contains_key(path) || self.dirs.lock().contains(path)
    }

    fn file_size(&self, path: &Path) -> Result<u64> {
        let files = self.files.lock();
        let data = files.get(path).ok_or_else(|| Self::not_found(path))?;
        let len = data.lock().len() as u64;
        Ok(len)
    }

    fn delete_file(&self, path: &Path) -> Result<()> {
        self.files
            .lock()
            .remove(path)
            .map(|_| ())
            .ok_or_else(|| Self::not_found(path))
    }

    fn rename_file(&self, from: &Path, to: &Path) -> Result<()> {
        let mut files = self.files.lock();
        let data = files.remove(from).ok_or_else(|| Self::not_found(from))?;
        files.insert(to.to_path_buf(), data);
        Ok(())
    }

    fn create_dir_all(&self, path: &Path) -> Result<()> {
        self.dirs.lock().insert(path.to_path_buf());
        Ok(())
    }

    fn list_dir(&self, path: &Path) -> Result<Vec<String>> {
        let files = self.files.lock();
        Ok(files
            .keys()
            .filter(|p| p.parent().unwrap_or_else(|| Path::new("")) == path)
            .filter_map(|p| p.file_name())
            .map(|n| n.to_string_lossy().into_owned())
            .collect())
    }

    fn delete_dir_and_files(&self, path: &Path) -> Result<()> {
        self.files
            .lock()
            .retain(|p, _| p.parent().unwrap_or_else(|| Path::new("")) != path);
        self.dirs.lock().remove(path);
        Ok(())
    }

    fn lock_file(&self, path: &Path) -> Result<FileLock> {
        if !self.locks.lock().insert(path.to_path_buf()) {
            return Err(MvccError::Storage(format!(
                "lock {}: already held by process",
                path.display()
            )));
        }
        Ok(FileLock::new(path.to_path_buf()))
    }

    fn unlock_file(&self, lock: FileLock) -> Result<()> {
        if !self.locks.lock().remove(lock.path()) {
            return Err(MvccError::Storage(format!(
                "unlock {}: not locked",
                lock.path().display()
            )));
        }
        Ok(())
    }
}
