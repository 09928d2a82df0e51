//! Time-bound table pruning
//!
//! Every table records the smallest and largest version timestamp it holds.
//! A time-bound iterator installs a [`TimeBoundFilter`] so the store never
//! reads tables whose recorded range misses the requested one.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tracing::debug;

use crate::key::{encode_timestamp, split_key, Timestamp};
use crate::storage::{
    TableFilter, TableProperties, TablePropertiesCollector, TablePropertiesCollectorFactory,
};

/// User property holding the smallest encoded timestamp in a table
pub const TS_MIN_PROPERTY: &str = "mvcc.ts.min";

/// User property holding the largest encoded timestamp in a table
pub const TS_MAX_PROPERTY: &str = "mvcc.ts.max";

/// Counters describing the work done by one iterator.
///
/// Observability only; nothing reads these to make decisions.
#[derive(Debug, Default)]
pub struct IteratorStats {
    tables_examined: AtomicU64,
    tables_skipped: AtomicU64,
    timebound_num_ssts: AtomicU64,
    internal_delete_skipped_count: AtomicU64,
}

impl IteratorStats {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Tables offered to the time-bound filter
    pub fn tables_examined(&self) -> u64 {
        self.tables_examined.load(Ordering::Relaxed)
    }

    /// Tables the time-bound filter rejected
    pub fn tables_skipped(&self) -> u64 {
        self.tables_skipped.load(Ordering::Relaxed)
    }

    /// Tables the time-bound filter let through
    pub fn timebound_num_ssts(&self) -> u64 {
        self.timebound_num_ssts.load(Ordering::Relaxed)
    }

    /// Deleted versions the store passed over for this iterator
    pub fn internal_delete_skipped_count(&self) -> u64 {
        self.internal_delete_skipped_count.load(Ordering::Relaxed)
    }

    pub(crate) fn record_deletes_skipped(&self, count: u64) {
        self.internal_delete_skipped_count.fetch_add(count, Ordering::Relaxed);
    }

    fn record_table(&self, used: bool) {
        self.tables_examined.fetch_add(1, Ordering::Relaxed);
        if used {
            self.timebound_num_ssts.fetch_add(1, Ordering::Relaxed);
        } else {
            self.tables_skipped.fetch_add(1, Ordering::Relaxed);
        }
    }
}

/// Accepts tables whose recorded timestamp range intersects `[min, max]`.
///
/// Tables without recorded bounds are always accepted.
#[derive(Debug)]
pub struct TimeBoundFilter {
    min: Vec<u8>,
    max: Vec<u8>,
    stats: Option<Arc<IteratorStats>>,
}

impl TimeBoundFilter {
    pub fn new(min: Timestamp, max: Timestamp, stats: Option<Arc<IteratorStats>>) -> Self {
        Self {
            min: encode_timestamp(min),
            max: encode_timestamp(max),
            stats,
        }
    }

    fn bounds(properties: &TableProperties) -> Option<(&[u8], &[u8])> {
        let min = properties.user_properties.get(TS_MIN_PROPERTY)?;
        let max = properties.user_properties.get(TS_MAX_PROPERTY)?;
        if min.is_empty() || max.is_empty() {
            return None;
        }
        Some((min.as_slice(), max.as_slice()))
    }
}

impl TableFilter for TimeBoundFilter {
    fn accept(&self, properties: &TableProperties) -> bool {
        let used = match Self::bounds(properties) {
            None => true,
            // Encoded timestamps order bytewise
            Some((tbl_min, tbl_max)) => self.max.as_slice() >= tbl_min && self.min.as_slice() <= tbl_max,
        };
        if !used {
            debug!(entries = properties.entry_count, "time-bound filter skipped table");
        }
        if let Some(stats) = &self.stats {
            stats.record_table(used);
        }
        used
    }
}

/// Records the timestamp range of the versioned keys written to a table.
#[derive(Debug, Default)]
pub struct TimeBoundCollector {
    min: Option<Vec<u8>>,
    max: Option<Vec<u8>>,
}

impl TablePropertiesCollector for TimeBoundCollector {
    fn add(&mut self, key: &[u8], _value: &[u8]) {
        let Ok((_, ts)) = split_key(key) else {
            return;
        };
        // Skip the NUL separator; bare keys carry no timestamp
        let Some((_, ts)) = ts.split_first() else {
            return;
        };

        if self.min.as_deref().map_or(true, |min| ts < min) {
            self.min = Some(ts.to_vec());
        }
        if self.max.as_deref().map_or(true, |max| ts > max) {
            self.max = Some(ts.to_vec());
        }
    }

    fn finish(&mut self) -> BTreeMap<String, Vec<u8>> {
        let mut props = BTreeMap::new();
        if let (Some(min), Some(max)) = (self.min.take(), self.max.take()) {
            props.insert(TS_MIN_PROPERTY.to_string(), min);
            props.insert(TS_MAX_PROPERTY.to_string(), max);
        }
        props
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct TimeBoundCollectorFactory;

impl TablePropertiesCollectorFactory for TimeBoundCollectorFactory {
    fn name(&self) -> &'static str {
        "mvcckv_time_bound_collector"
    }

    fn create(&self) -> Box<dyn TablePropertiesCollector> {
        Box::new(TimeBoundCollector::default())
    }
}
