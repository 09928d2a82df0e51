//! MVCC key ordering
//!
//! Comparator and prefix extractor installed into the store.

use std::cmp::Ordering;

use crate::storage::{KeyComparator, PrefixExtractor};

use super::codec::split_key;

/// Orders encoded keys by user key ascending, then bare key first, then
/// timestamps descending (newest version first).
#[derive(Debug, Default, Clone, Copy)]
pub struct MvccComparator;

impl KeyComparator for MvccComparator {
    fn name(&self) -> &'static str {
        "mvcckv_comparator"
    }

    fn compare(&self, a: &[u8], b: &[u8]) -> Ordering {
        let (Ok((key_a, ts_a)), Ok((key_b, ts_b))) = (split_key(a), split_key(b)) else {
            // Only reachable with corrupted keys
            return a.cmp(b);
        };

        key_a.cmp(key_b).then_with(|| match (ts_a.is_empty(), ts_b.is_empty()) {
            (true, true) => Ordering::Equal,
            (true, false) => Ordering::Less,
            (false, true) => Ordering::Greater,
            (false, false) => ts_b.cmp(ts_a),
        })
    }
}

/// Extracts the user key portion of an encoded key.
///
/// Keys that cannot be split are their own prefix.
#[derive(Debug, Default, Clone, Copy)]
pub struct MvccPrefixExtractor;

impl PrefixExtractor for MvccPrefixExtractor {
    fn name(&self) -> &'static str {
        "mvcckv_prefix_extractor"
    }

    fn transform<'a>(&self, key: &'a [u8]) -> &'a [u8] {
        match split_key(key) {
            Ok((user_key, _)) => user_key,
            Err(_) => key,
        }
    }
}
