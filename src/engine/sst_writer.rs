//! External table writer
//!
//! Builds a table in memory using the engine's key encoding, ready to be
//! written out and handed to `Engine::ingest_external_files`.

use std::path::Path;
use std::sync::Arc;

use crate::env::{Env, MemEnv};
use crate::error::{MvccError, Result};
use crate::iterator::TimeBoundCollectorFactory;
use crate::key::{MvccComparator, VersionedKey};
use crate::storage::{SSTableBuilder, TablePropertiesCollectorFactory, ValueKind};

const TABLE_NAME: &str = "sst";

/// Writes one table of versioned keys into memory.
///
/// Keys must be added in strictly increasing order. Entries carry no
/// sequence number; the store assigns one at ingestion.
pub struct SstFileWriter {
    env: MemEnv,
    builder: Option<SSTableBuilder>,
    data_size: u64,
}

impl SstFileWriter {
    pub fn new() -> Self {
        Self {
            env: MemEnv::new(),
            builder: None,
            data_size: 0,
        }
    }

    /// Start a fresh table, discarding anything added before
    pub fn open(&mut self) -> Result<()> {
        let file = self.env.new_writable_file(Path::new(TABLE_NAME))?;
        let builder = SSTableBuilder::new(
            file,
            Arc::new(MvccComparator),
            vec![TimeBoundCollectorFactory.create()],
        )?;
        self.builder = Some(builder);
        self.data_size = 0;
        Ok(())
    }

    pub fn add(&mut self, key: &VersionedKey, value: &[u8]) -> Result<()> {
        let builder = self.builder_mut()?;
        let encoded = key.encode();
        builder.add_raw(&encoded, 0, ValueKind::Put, value)?;
        self.data_size += (encoded.len() + value.len()) as u64;
        Ok(())
    }

    /// Finish the table and return its bytes
    pub fn finish(&mut self) -> Result<Vec<u8>> {
        let builder = self
            .builder
            .take()
            .ok_or_else(|| MvccError::InvalidArgument("sst writer is not open".to_string()))?;
        let info = builder.finish()?;
        if info.entry_count == 0 {
            return Err(MvccError::InvalidArgument(
                "cannot finish an sst with no entries".to_string(),
            ));
        }
        Ok(self.env.read_file(Path::new(TABLE_NAME))?.to_vec())
    }

    /// Bytes of keys and values added so far
    pub fn data_size(&self) -> u64 {
        self.data_size
    }

    fn builder_mut(&mut self) -> Result<&mut SSTableBuilder> {
        self.builder
            .as_mut()
            .ok_or_else(|| MvccError::InvalidArgument("sst writer is not open".to_string()))
    }
}

impl Default for SstFileWriter {
    fn default() -> Self {
        Self::new()
    }
}
