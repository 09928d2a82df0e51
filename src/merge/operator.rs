//! Store merge operator over encoded metadata records

use tracing::debug;

use crate::error::{MergeError, MvccError, Result};
use crate::storage::MergeOperator;

use super::{full_merge, partial_merge, MetadataRecord};

/// Merge operator installed into the store by the engine.
#[derive(Debug, Default, Clone, Copy)]
pub struct MvccMergeOperator;

impl MergeOperator for MvccMergeOperator {
    fn name(&self) -> &'static str {
        "mvcckv_merge_operator"
    }

    fn full_merge(&self, _key: &[u8], existing: Option<&[u8]>, operands: &[&[u8]]) -> Result<Vec<u8>> {
        let mut record = match existing {
            Some(data) => decode(data, "corrupted existing value")?,
            None => MetadataRecord::default(),
        };
        for operand in operands {
            let update = decode(operand, "corrupted update value")?;
            record = full_merge(record, update)?;
        }
        encode(&record).map_err(MvccError::from)
    }

    fn partial_merge(&self, key: &[u8], left: &[u8], right: &[u8]) -> Result<Option<Vec<u8>>> {
        match partial_merge_one(left, right) {
            Ok(merged) => Ok(Some(merged)),
            Err(MergeError::NeedsBase) => {
                debug!(key_len = key.len(), "partial merge deferred until base is known");
                Ok(None)
            }
            // Left for the read that resolves this key to report
            Err(MergeError::Incompatible(reason)) => {
                debug!(key_len = key.len(), %reason, "conflicting merge operands kept apart");
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }
}

/// Fully merge one encoded update onto an encoded base.
///
/// An empty `existing` is a missing base.
pub fn merge_one(existing: &[u8], update: &[u8]) -> std::result::Result<Vec<u8>, MergeError> {
    let base = if existing.is_empty() {
        MetadataRecord::default()
    } else {
        decode(existing, "corrupted existing value")?
    };
    let update = decode(update, "corrupted update value")?;
    encode(&full_merge(base, update)?)
}

/// Combine two encoded updates without a base.
pub fn partial_merge_one(existing: &[u8], update: &[u8]) -> std::result::Result<Vec<u8>, MergeError> {
    let older = decode(existing, "corrupted existing value")?;
    let newer = decode(update, "corrupted update value")?;
    encode(&partial_merge(older, newer)?)
}

fn decode(data: &[u8], what: &str) -> std::result::Result<MetadataRecord, MergeError> {
    MetadataRecord::decode(data).map_err(|e| MergeError::Corrupt(format!("{}: {}", what, e)))
}

fn encode(record: &MetadataRecord) -> std::result::Result<Vec<u8>, MergeError> {
    record
        .encode()
        .map_err(|e| MergeError::Corrupt(format!("failed to encode merged value: {}", e)))
}
