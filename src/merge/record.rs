//! Metadata records and their merge algebra

use serde::{Deserialize, Serialize};

use crate::error::MergeError;
use crate::key::Timestamp;

use super::TimeSeries;

/// A transactional write intent attached to a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Intent {
    pub txn_id: u64,
    pub epoch: u32,
}

/// The payload of a metadata record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RawValue {
    /// Opaque bytes; merging appends
    Bytes(Vec<u8>),
    /// Time series samples; merging concatenates samples
    TimeSeries(TimeSeries),
    /// Deletion marker; as an update it replaces the whole record
    Tombstone,
}

impl RawValue {
    fn kind(&self) -> &'static str {
        match self {
            RawValue::Bytes(_) => "bytes",
            RawValue::TimeSeries(_) => "time series",
            RawValue::Tombstone => "tombstone",
        }
    }
}

/// The unit of combination for merge writes.
///
/// The default record is empty and is the identity of both merges.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetadataRecord {
    pub value: Option<RawValue>,
    /// Earliest timestamp at which any merged update was written
    pub merge_timestamp: Option<Timestamp>,
    pub intent: Option<Intent>,
}

impl MetadataRecord {
    pub fn from_bytes(value: impl Into<Vec<u8>>) -> Self {
        Self {
            value: Some(RawValue::Bytes(value.into())),
            ..Self::default()
        }
    }

    pub fn from_time_series(series: TimeSeries) -> Self {
        Self {
            value: Some(RawValue::TimeSeries(series)),
            ..Self::default()
        }
    }

    pub fn tombstone() -> Self {
        Self {
            value: Some(RawValue::Tombstone),
            ..Self::default()
        }
    }

    pub fn with_merge_timestamp(mut self, timestamp: Timestamp) -> Self {
        self.merge_timestamp = Some(timestamp);
        self
    }

    pub fn with_intent(mut self, intent: Intent) -> Self {
        self.intent = Some(intent);
        self
    }

    pub fn is_tombstone(&self) -> bool {
        matches!(self.value, Some(RawValue::Tombstone))
    }

    pub fn is_empty(&self) -> bool {
        self.value.is_none() && self.merge_timestamp.is_none() && self.intent.is_none()
    }

    pub fn encode(&self) -> Result<Vec<u8>, bincode::Error> {
        bincode::serialize(self)
    }

    pub fn decode(data: &[u8]) -> Result<Self, bincode::Error> {
        bincode::deserialize(data)
    }
}

/// Apply `update` onto `existing`, producing the record readers observe.
///
/// A tombstone base is treated as empty. Time series samples in the result
/// are consolidated.
pub fn full_merge(existing: MetadataRecord, update: MetadataRecord) -> Result<MetadataRecord, MergeError> {
    let existing = if existing.is_tombstone() {
        MetadataRecord::default()
    } else {
        existing
    };

    let mut merged = combine(existing, update)?;
    if let Some(RawValue::TimeSeries(series)) = merged.value.as_mut() {
        series.consolidate();
    }
    Ok(merged)
}

/// Combine two pending updates, `older` written before `newer`.
///
/// Returns [`MergeError::NeedsBase`] when the pair cannot be resolved
/// without the base:
/// - `older` is a tombstone and `newer` is not, so the result depends on
///   whether the tombstone hides a base value
/// - `newer` is a tombstone over a non-empty `older`, which may still
///   conflict with the base before the tombstone replaces it
pub fn partial_merge(older: MetadataRecord, newer: MetadataRecord) -> Result<MetadataRecord, MergeError> {
    match (older.is_tombstone(), newer.is_tombstone()) {
        (true, false) => return Err(MergeError::NeedsBase),
        (false, true) if !older.is_empty() => return Err(MergeError::NeedsBase),
        _ => {}
    }
    combine(older, newer)
}

fn combine(existing: MetadataRecord, update: MetadataRecord) -> Result<MetadataRecord, MergeError> {
    if update.is_tombstone() {
        return Ok(update);
    }

    let intent = match (existing.intent, update.intent) {
        (Some(a), Some(b)) if a.txn_id != b.txn_id => {
            return Err(MergeError::Incompatible(format!(
                "conflicting intents from transactions {} and {}",
                a.txn_id, b.txn_id
            )))
        }
        (a, b) => b.or(a),
    };

    let merge_timestamp = match (existing.merge_timestamp, update.merge_timestamp) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (a, b) => a.or(b),
    };

    let value = match (existing.value, update.value) {
        (None, v) | (v, None) => v,
        (Some(RawValue::Bytes(mut a)), Some(RawValue::Bytes(b))) => {
            a.extend_from_slice(&b);
            Some(RawValue::Bytes(a))
        }
        (Some(RawValue::TimeSeries(mut a)), Some(RawValue::TimeSeries(b))) => {
            a.append(b)?;
            Some(RawValue::TimeSeries(a))
        }
        (Some(a), Some(b)) => {
            return Err(MergeError::Incompatible(format!(
                "cannot merge {} into {}",
                b.kind(),
                a.kind()
            )))
        }
    };

    Ok(MetadataRecord {
        value,
        merge_timestamp,
        intent,
    })
}
