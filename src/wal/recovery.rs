//! WAL Recovery
//!
//! Handles crash recovery by replaying the WAL.

use std::path::Path;

use tracing::{info, warn};

use crate::env::Env;
use crate::error::Result;

use super::{WalEntry, WalReader};

/// Handles WAL recovery after crash
pub struct WalRecovery;

/// Result of a recovery operation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecoveryResult {
    /// Number of entries successfully recovered
    pub entries_recovered: u64,

    /// Number of corrupted entries skipped (everything after the first bad
    /// record counts as one)
    pub entries_corrupted: u64,

    /// Last valid LSN
    pub last_lsn: u64,

    /// Whether the WAL was truncated (partial writes removed)
    pub was_truncated: bool,
}

impl WalRecovery {
    /// Recover entries from a WAL file
    ///
    /// This will:
    /// 1. Read all valid entries
    /// 2. Stop at the first torn or corrupted record
    /// 3. With `truncate`, cut the file back to the last valid record
    /// 4. Return all valid entries in order
    pub fn recover(env: &dyn Env, path: &Path, truncate: bool) -> Result<(Vec<WalEntry>, RecoveryResult)> {
        let mut result = RecoveryResult::default();
        if !env.file_exists(path) {
            return Ok((Vec::new(), result));
        }

        let data = env.read_file(path)?;
        let total_len = data.len();
        let mut reader = WalReader::from_bytes(data.clone());
        let mut entries = Vec::new();

        loop {
            match reader.next_entry() {
                Ok(Some(entry)) => {
                    result.entries_recovered += 1;
                    result.last_lsn = entry.last_lsn();
                    entries.push(entry);
                }
                Ok(None) => break,
                Err(e) => {
                    warn!(
                        offset = reader.position(),
                        error = %e,
                        "WAL corruption detected, discarding tail"
                    );
                    result.entries_corrupted = 1;
                    break;
                }
            }
        }

        let valid_len = reader.position();
        if truncate && valid_len < total_len {
            env.write_file(path, &data[..valid_len])?;
            result.was_truncated = true;
        }

        info!(
            recovered = result.entries_recovered,
            corrupted = result.entries_corrupted,
            last_lsn = result.last_lsn,
            truncated = result.was_truncated,
            "WAL recovery complete"
        );

        Ok((entries, result))
    }

    /// Verify integrity of a WAL file without modifying it
    pub fn verify(env: &dyn Env, path: &Path) -> Result<RecoveryResult> {
        let mut result = RecoveryResult::default();
        if !env.file_exists(path) {
            return Ok(result);
        }
        for entry in WalReader::open(env, path)?.entries() {
            match entry {
                Ok(entry) => {
                    result.entries_recovered += 1;
                    result.last_lsn = entry.last_lsn();
                }
                Err(_) => result.entries_corrupted = 1,
            }
        }
        Ok(result)
    }
}
