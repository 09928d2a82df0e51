//! Manifest
//!
//! The persisted set of live tables. Rewritten in full on every change:
//! written to a temporary file, then renamed over the previous manifest.
//!
//! ## Format
//! ```text
//! [CRC: u32][bincode Manifest]
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::env::Env;
use crate::error::{MvccError, Result};

pub const MANIFEST_FILENAME: &str = "MANIFEST";

/// One live table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestFile {
    pub number: u64,
    pub level: usize,
    /// Sequence number assigned to every entry of an ingested table
    pub global_seqno: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    pub next_file_number: u64,
    /// Highest sequence number contained in the live tables
    pub last_sequence: u64,
    pub files: Vec<ManifestFile>,
}

impl Manifest {
    /// Load the manifest in `dir`; a missing manifest is an empty store.
    pub fn load(env: &dyn Env, dir: &Path) -> Result<Option<Self>> {
        let path = dir.join(MANIFEST_FILENAME);
        if !env.file_exists(&path) {
            return Ok(None);
        }

        let data = env.read_file(&path)?;
        if data.len() < 4 {
            return Err(MvccError::Corruption("manifest too short".to_string()));
        }
        let expected = u32::from_le_bytes([data[0], data[1], data[2], data[3]]);
        let actual = crc32fast::hash(&data[4..]);
        if expected != actual {
            return Err(MvccError::Corruption(format!(
                "manifest checksum mismatch: expected {:08x}, got {:08x}",
                expected, actual
            )));
        }

        let manifest: Manifest = bincode::deserialize(&data[4..])
            .map_err(|e| MvccError::Corruption(format!("manifest: {}", e)))?;
        Ok(Some(manifest))
    }

    /// Persist atomically: temp file + rename
    pub fn save(&self, env: &dyn Env, dir: &Path) -> Result<()> {
        let body = bincode::serialize(self)?;
        let mut data = Vec::with_capacity(body.len() + 4);
        data.extend_from_slice(&crc32fast::hash(&body).to_le_bytes());
        data.extend_from_slice(&body);

        let tmp = dir.join(format!("{}.tmp", MANIFEST_FILENAME));
        env.write_file(&tmp, &data)?;
        env.rename_file(&tmp, &dir.join(MANIFEST_FILENAME))?;

        debug!(
            files = self.files.len(),
            next_file_number = self.next_file_number,
            last_sequence = self.last_sequence,
            "Saved manifest"
        );
        Ok(())
    }
}
