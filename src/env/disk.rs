//! Local filesystem environment

use std::collections::HashSet;
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use bytes::Bytes;
use parking_lot::Mutex;

use crate::error::{MvccError, Result};

use super::{Env, FileLock, WritableFile};

/// Paths locked by any `DiskEnv` in this process
fn locked_paths() -> &'static Mutex<HashSet<PathBuf>> {
    static LOCKED: OnceLock<Mutex<HashSet<PathBuf>>> = OnceLock::new();
    LOCKED.get_or_init(|| Mutex::new(HashSet::new()))
}

/// Environment backed by `std::fs`
#[derive(Debug, Default, Clone, Copy)]
pub struct DiskEnv;

impl DiskEnv {
    pub fn new() -> Self {
        Self
    }
}

struct DiskFile {
    writer: BufWriter<File>,
}

impl WritableFile for DiskFile {
    fn append(&mut self, data: &[u8]) -> Result<()> {
        self.writer.write_all(data)?;
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }

    fn sync(&mut self) -> Result<()> {
        self.writer.flush()?;
        self.writer.get_ref().sync_data()?;
        Ok(())
    }
}

impl Env for DiskEnv {
    fn new_writable_file(&self, path: &Path) -> Result<Box<dyn WritableFile>> {
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)?;
        Ok(Box::new(DiskFile {
            writer: BufWriter::new(file),
        }))
    }

    fn reopen_writable_file(&self, path: &Path) -> Result<Box<dyn WritableFile>> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Box::new(DiskFile {
            writer: BufWriter::new(file),
        }))
    }

    fn read_file(&self, path: &Path) -> Result<Bytes> {
        Ok(Bytes::from(fs::read(path)?))
    }

    fn write_file(&self, path: &Path, contents: &[u8]) -> Result<()> {
        let mut file = File::create(path)?;
        file.write_all(contents)?;
        file.sync_all()?;
        Ok(())
    }

    fn file_exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn file_size(&self, path: &Path) -> Result<u64> {
        Ok(fs::metadata(path)?.len())
    }

    fn delete_file(&self, path: &Path) -> Result<()> {
        fs::remove_file(path)?;
        Ok(())
    }

    fn rename_file(&self, from: &Path, to: &Path) -> Result<()> {
        fs::rename(from, to)?;
        Ok(())
    }

    fn create_dir_all(&self, path: &Path) -> Result<()> {
        fs::create_dir_all(path)?;
        Ok(())
    }

    fn list_dir(&self, path: &Path) -> Result<Vec<String>> {
        let mut names = Vec::new();
        for entry in fs::read_dir(path)? {
            names.push(entry?.file_name().to_string_lossy().into_owned());
        }
        names.sort();
        Ok(names)
    }

    fn delete_dir_and_files(&self, path: &Path) -> Result<()> {
        for entry in fs::read_dir(path)? {
            let entry = entry?;
            if entry.file_type()?.is_file() {
                fs::remove_file(entry.path())?;
            }
        }
        fs::remove_dir(path)?;
        Ok(())
    }

    fn lock_file(&self, path: &Path) -> Result<FileLock> {
        let mut locked = locked_paths().lock();
        if !locked.insert(path.to_path_buf()) {
            return Err(MvccError::Storage(format!(
                "lock {}: already held by process",
                path.display()
            )));
        }
        if let Err(e) = OpenOptions::new().create(true).write(true).open(path) {
            locked.remove(path);
            return Err(e.into());
        }
        Ok(FileLock::new(path.to_path_buf()))
    }

    fn unlock_file(&self, lock: FileLock) -> Result<()> {
        if !locked_paths().lock().remove(lock.path()) {
            return Err(MvccError::Storage(format!(
                "unlock {}: not locked",
                lock.path().display()
            )));
        }
        Ok(())
    }
}
