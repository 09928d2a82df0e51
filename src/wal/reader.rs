//! WAL Reader
//!
//! Handles reading entries from the WAL file.

use std::path::Path;

use bytes::Bytes;

use crate::env::Env;
use crate::error::{MvccError, Result};

use super::{WalEntry, HEADER_SIZE};

/// Reads entries from the WAL file
pub struct WalReader {
    data: Bytes,
    /// Offset of the next record
    position: usize,
}

impl WalReader {
    /// Open a WAL file for reading
    pub fn open(env: &dyn Env, path: &Path) -> Result<Self> {
        Ok(Self::from_bytes(env.read_file(path)?))
    }

    pub fn from_bytes(data: Bytes) -> Self {
        Self { data, position: 0 }
    }

    /// Offset just past the last record returned
    pub fn position(&self) -> usize {
        self.position
    }

    /// Read the next entry from the WAL
    ///
    /// Returns `Ok(None)` at a clean end of file and `WalCorruption` for a
    /// torn or damaged record; the position is not advanced past a bad record.
    pub fn next_entry(&mut self) -> Result<Option<WalEntry>> {
        let rest = &self.data[self.position..];
        if rest.is_empty() {
            return Ok(None);
        }
        if rest.len() < HEADER_SIZE {
            return Err(MvccError::WalCorruption(format!(
                "torn header at offset {}",
                self.position
            )));
        }

        let mut lsn = [0u8; 8];
        lsn.copy_from_slice(&rest[0..8]);
        let lsn = u64::from_le_bytes(lsn);
        let mut crc = [0u8; 4];
        crc.copy_from_slice(&rest[8..12]);
        let crc = u32::from_le_bytes(crc);
        let mut len = [0u8; 4];
        len.copy_from_slice(&rest[12..16]);
        let len = u32::from_le_bytes(len) as usize;

        let Some(payload) = rest.get(HEADER_SIZE..HEADER_SIZE + len) else {
            return Err(MvccError::WalCorruption(format!(
                "torn record at offset {}: need {} bytes, have {}",
                self.position,
                len,
                rest.len() - HEADER_SIZE
            )));
        };

        if WalEntry::compute_crc(payload) != crc {
            return Err(MvccError::WalCorruption(format!(
                "checksum mismatch at offset {}",
                self.position
            )));
        }

        let entry = WalEntry::deserialize(payload)?;
        if entry.lsn != lsn {
            return Err(MvccError::WalCorruption(format!(
                "header lsn {} does not match entry lsn {}",
                lsn, entry.lsn
            )));
        }

        self.position += HEADER_SIZE + len;
        Ok(Some(entry))
    }

    /// Iterate over entries until end of file or the first bad record
    pub fn entries(self) -> WalIterator {
        WalIterator {
            reader: self,
            done: false,
        }
    }
}

/// Iterator over WAL entries
pub struct WalIterator {
    reader: WalReader,
    done: bool,
}

impl Iterator for WalIterator {
    type Item = Result<WalEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.reader.next_entry() {
            Ok(Some(entry)) => Some(Ok(entry)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}
