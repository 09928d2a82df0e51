//! Table listings and summaries for observability

use std::fmt::Write as _;

use crate::iterator::{TS_MAX_PROPERTY, TS_MIN_PROPERTY};
use crate::key::{decode_key, decode_timestamp, Timestamp, VersionedKey};
use crate::storage::{LiveFileMetadata, TableProperties};

/// One live table, with its bounds decoded
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SSTableInfo {
    pub level: usize,
    pub size: u64,
    /// Empty when the stored key does not decode
    pub start_key: VersionedKey,
    pub end_key: VersionedKey,
}

/// Timestamp bounds recorded in one table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserProperties {
    pub path: String,
    pub ts_min: Option<Timestamp>,
    pub ts_max: Option<Timestamp>,
    /// Set when the recorded bounds could not be decoded
    pub error: Option<String>,
}

impl UserProperties {
    pub(crate) fn from_table(path: String, properties: &TableProperties) -> Self {
        let decode = |name: &str| -> Result<Option<Timestamp>, String> {
            match properties.user_properties.get(name) {
                None => Ok(None),
                Some(encoded) if encoded.is_empty() => Ok(None),
                Some(encoded) => decode_timestamp(encoded)
                    .map(Some)
                    .map_err(|e| format!("{}: {}", name, e)),
            }
        };

        match (decode(TS_MIN_PROPERTY), decode(TS_MAX_PROPERTY)) {
            (Ok(ts_min), Ok(ts_max)) => Self {
                path,
                ts_min,
                ts_max,
                error: None,
            },
            (Err(e), _) | (_, Err(e)) => Self {
                path,
                ts_min: None,
                ts_max: None,
                error: Some(e),
            },
        }
    }
}

pub(crate) fn sstables(files: &[LiveFileMetadata]) -> Vec<SSTableInfo> {
    files
        .iter()
        .map(|f| SSTableInfo {
            level: f.level,
            size: f.size,
            start_key: decode_key(&f.smallest_key).unwrap_or_default(),
            end_key: decode_key(&f.largest_key).unwrap_or_default(),
        })
        .collect()
}

/// Render per-level file counts and sizes
pub(crate) fn compaction_summary(files: &[LiveFileMetadata], num_levels: usize) -> String {
    let mut counts = vec![0usize; num_levels];
    let mut sizes = vec![0u64; num_levels];
    for f in files {
        if let (Some(count), Some(size)) = (counts.get_mut(f.level), sizes.get_mut(f.level)) {
            *count += 1;
            *size += f.size;
        }
    }

    let mut out = String::new();
    let _ = writeln!(out, "Level  Files   Size(MB)");
    let _ = writeln!(out, "-----------------------");
    for level in 0..num_levels {
        let _ = writeln!(
            out,
            "  L{:<3} {:>5} {:>10.2}",
            level,
            counts[level],
            sizes[level] as f64 / (1024.0 * 1024.0)
        );
    }
    let _ = writeln!(
        out,
        "  Sum  {:>5} {:>10.2}",
        files.len(),
        sizes.iter().sum::<u64>() as f64 / (1024.0 * 1024.0)
    );
    out
}
