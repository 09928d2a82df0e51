//! WAL Writer
//!
//! Handles appending entries to the WAL file.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::WalSyncStrategy;
use crate::env::{Env, WritableFile};
use crate::error::Result;

use super::{Operation, WalEntry};

/// Writes entries to the WAL file
pub struct WalWriter {
    env: Arc<dyn Env>,
    path: PathBuf,
    file: Box<dyn WritableFile>,
    /// Last sequence number written
    current_lsn: u64,
    sync_strategy: WalSyncStrategy,
    /// Entries appended since the last sync
    unsynced: usize,
}

impl WalWriter {
    /// Open or create a WAL file, appending after any existing entries.
    /// `last_lsn` is the last sequence number already logged.
    pub fn open(env: Arc<dyn Env>, path: &Path, sync_strategy: WalSyncStrategy, last_lsn: u64) -> Result<Self> {
        let file = env.reopen_writable_file(path)?;
        Ok(Self {
            env,
            path: path.to_path_buf(),
            file,
            current_lsn: last_lsn,
            sync_strategy,
            unsynced: 0,
        })
    }

    /// Append one atomic batch whose first operation has sequence `first_lsn`.
    /// Returns the sequence of the last operation. With `force_sync` the
    /// entry is synced regardless of the sync strategy.
    pub fn append(&mut self, first_lsn: u64, operations: Vec<Operation>, force_sync: bool) -> Result<u64> {
        let entry = WalEntry::new(first_lsn, operations);
        self.file.append(&entry.serialize()?)?;
        self.unsynced += 1;

        let sync_due = match self.sync_strategy {
            WalSyncStrategy::EveryWrite => true,
            WalSyncStrategy::EveryNEntries { count } => self.unsynced >= count,
        };
        if force_sync || sync_due {
            self.sync()?;
        } else {
            self.file.flush()?;
        }

        self.current_lsn = entry.last_lsn();
        Ok(self.current_lsn)
    }

    /// Force sync to disk
    pub fn sync(&mut self) -> Result<()> {
        self.file.sync()?;
        self.unsynced = 0;
        Ok(())
    }

    /// Discard all entries (after their contents are durable elsewhere)
    pub fn truncate(&mut self) -> Result<()> {
        self.file = self.env.new_writable_file(&self.path)?;
        self.file.sync()?;
        self.unsynced = 0;
        Ok(())
    }

    /// Get the current LSN
    pub fn current_lsn(&self) -> u64 {
        self.current_lsn
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
