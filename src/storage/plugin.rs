//! Store plug-in seams
//!
//! Behaviour the store delegates to its owner: key ordering, prefix
//! extraction, value merging, per-table properties and table filtering.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

use crate::error::Result;

use super::TableProperties;

/// Total order over store keys.
pub trait KeyComparator: Send + Sync + fmt::Debug {
    fn name(&self) -> &'static str;

    fn compare(&self, a: &[u8], b: &[u8]) -> Ordering;
}

/// Plain lexicographic byte ordering.
#[derive(Debug, Default, Clone, Copy)]
pub struct BytewiseComparator;

impl KeyComparator for BytewiseComparator {
    fn name(&self) -> &'static str {
        "bytewise"
    }

    fn compare(&self, a: &[u8], b: &[u8]) -> Ordering {
        a.cmp(b)
    }
}

/// Maps a key to the prefix used by same-prefix iteration.
pub trait PrefixExtractor: Send + Sync + fmt::Debug {
    fn name(&self) -> &'static str;

    fn transform<'a>(&self, key: &'a [u8]) -> &'a [u8];
}

/// Combines merge operands written with `merge`.
///
/// Invoked inline by reads, flushes and compactions; must be deterministic.
pub trait MergeOperator: Send + Sync + fmt::Debug {
    fn name(&self) -> &'static str;

    /// Fold `operands` (oldest first) onto `existing`.
    fn full_merge(&self, key: &[u8], existing: Option<&[u8]>, operands: &[&[u8]]) -> Result<Vec<u8>>;

    /// Combine two adjacent operands. `Ok(None)` means they can only be
    /// resolved against a base value and must both be kept.
    fn partial_merge(&self, key: &[u8], left: &[u8], right: &[u8]) -> Result<Option<Vec<u8>>>;
}

/// Decides whether a table may be read by an iterator.
pub trait TableFilter: Send + Sync + fmt::Debug {
    fn accept(&self, properties: &TableProperties) -> bool;
}

/// Observes every entry written to a table and produces user properties.
pub trait TablePropertiesCollector: Send {
    fn add(&mut self, key: &[u8], value: &[u8]);

    fn finish(&mut self) -> BTreeMap<String, Vec<u8>>;
}

/// Creates a fresh collector for each table written.
pub trait TablePropertiesCollectorFactory: Send + Sync + fmt::Debug {
    fn name(&self) -> &'static str;

    fn create(&self) -> Box<dyn TablePropertiesCollector>;
}
