//! Atomic write batches

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// A single buffered mutation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum BatchOp {
    Put { key: Vec<u8>, value: Vec<u8> },
    Merge { key: Vec<u8>, value: Vec<u8> },
    Delete { key: Vec<u8> },
    /// Deletes every key in `[start, end)`
    DeleteRange { start: Vec<u8>, end: Vec<u8> },
}

/// An ordered set of mutations applied atomically by `KvStore::write`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteBatch {
    ops: Vec<BatchOp>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&mut self, key: &[u8], value: &[u8]) {
        self.ops.push(BatchOp::Put {
            key: key.to_vec(),
            value: value.to_vec(),
        });
    }

    pub fn merge(&mut self, key: &[u8], value: &[u8]) {
        self.ops.push(BatchOp::Merge {
            key: key.to_vec(),
            value: value.to_vec(),
        });
    }

    pub fn delete(&mut self, key: &[u8]) {
        self.ops.push(BatchOp::Delete { key: key.to_vec() });
    }

    pub fn delete_range(&mut self, start: &[u8], end: &[u8]) {
        self.ops.push(BatchOp::DeleteRange {
            start: start.to_vec(),
            end: end.to_vec(),
        });
    }

    pub fn push(&mut self, op: BatchOp) {
        self.ops.push(op);
    }

    pub fn ops(&self) -> &[BatchOp] {
        &self.ops
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn clear(&mut self) {
        self.ops.clear();
    }

    /// Serialized representation, replayable with [`WriteBatch::decode`]
    pub fn encode(&self) -> Result<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }

    pub fn decode(repr: &[u8]) -> Result<Self> {
        Ok(bincode::deserialize(repr)?)
    }
}
