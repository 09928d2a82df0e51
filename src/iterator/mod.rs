//! Iterator Module
//!
//! Version-aware iteration over the encoded keys of a store.
//!
//! ## Responsibilities
//! - Decode store keys back into versioned keys on every move
//! - Optionally skip the remaining versions of the current user key
//! - Prune whole tables outside a requested time range
//!
//! ## Skipping versions
//! ```text
//! forward:   a@100  a@50  │ b@70        next(skip) from a@100 seeks to
//!            ─────────────┘             bare("a\0") and lands on b@70
//!
//! backward:  a@100  a@50 │ b@70  b@10   prev(skip) from b@10 seeks to
//!                        └─────         bare("b"), then steps back to a@50
//! ```
//! Store iterators only seek forward to a lower bound, so the two
//! directions re-seek differently.

mod time_bound;

use std::sync::Arc;

use crate::error::{DecodeError, MvccError, Result};
use crate::key::{decode_key_ref, encode_key, split_key, Timestamp, VersionedKey, VersionedKeyRef};
use crate::storage::StoreIterator;

pub use time_bound::{
    IteratorStats, TimeBoundCollector, TimeBoundCollectorFactory, TimeBoundFilter, TS_MAX_PROPERTY,
    TS_MIN_PROPERTY,
};

/// Position of an iterator after a move.
///
/// `key` and `value` borrow from the iterator and are only valid until it
/// moves again. `valid == false` with an `Ok` status is the end of the
/// range, not a failure.
#[derive(Debug)]
pub struct IterState<'a> {
    pub valid: bool,
    pub key: Option<VersionedKeyRef<'a>>,
    pub value: Option<&'a [u8]>,
    pub status: Result<()>,
}

impl IterState<'_> {
    fn end() -> Self {
        Self {
            valid: false,
            key: None,
            value: None,
            status: Ok(()),
        }
    }

    fn failed(error: MvccError) -> Self {
        Self {
            valid: false,
            key: None,
            value: None,
            status: Err(error),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Phase {
    Unpositioned,
    Positioned,
    Exhausted,
    /// The current store key could not be split
    SplitFailed(String),
    /// The store iterator reported an error
    StoreFailed,
}

/// Iterator over versioned keys.
///
/// Owned and driven by a single caller. Dropping it releases the store
/// iterator along with any snapshot the store iterator pins.
pub struct MvccIterator {
    inner: Box<dyn StoreIterator>,
    phase: Phase,
    stats: Option<Arc<IteratorStats>>,
    /// Deleted versions already added to `stats`
    deletes_recorded: u64,
}

impl MvccIterator {
    pub fn new(inner: Box<dyn StoreIterator>, stats: Option<Arc<IteratorStats>>) -> Self {
        Self {
            inner,
            phase: Phase::Unpositioned,
            stats,
            deletes_recorded: 0,
        }
    }

    /// Counters shared with the time-bound filter, when requested
    pub fn stats(&self) -> Option<&Arc<IteratorStats>> {
        self.stats.as_ref()
    }

    /// Position at the first entry `>= key`
    pub fn seek(&mut self, key: &VersionedKey) -> IterState<'_> {
        self.inner.seek(&key.encode());
        self.settle()
    }

    pub fn seek_to_first(&mut self) -> IterState<'_> {
        self.inner.seek_to_first();
        self.settle()
    }

    pub fn seek_to_last(&mut self) -> IterState<'_> {
        self.inner.seek_to_last();
        self.settle()
    }

    /// Advance one entry. With `skip_current_key_versions`, never stop on
    /// another version of the current user key.
    pub fn next(&mut self, skip_current_key_versions: bool) -> IterState<'_> {
        if self.phase != Phase::Positioned {
            return self.state();
        }

        let old_key = if skip_current_key_versions {
            match split_key(self.inner.key()) {
                Ok((user_key, _)) => Some(user_key.to_vec()),
                Err(e) => return self.fail_split(e.to_string()),
            }
        } else {
            None
        };

        self.inner.next();

        if let Some(mut old_key) = old_key {
            if self.inner.valid() {
                let same_key = match split_key(self.inner.key()) {
                    Ok((user_key, _)) => user_key == old_key.as_slice(),
                    Err(e) => return self.fail_split(e.to_string()),
                };
                if same_key {
                    // Nothing sorts between the versions of `k` and the
                    // bare form of `k\0`
                    old_key.push(0);
                    self.inner.seek(&encode_key(&old_key, Timestamp::ZERO));
                }
            }
        }

        self.settle()
    }

    /// Step back one entry. With `skip_current_key_versions`, never stop on
    /// another version of the current user key.
    pub fn prev(&mut self, skip_current_key_versions: bool) -> IterState<'_> {
        if self.phase != Phase::Positioned {
            return self.state();
        }

        let old_key = if skip_current_key_versions {
            match split_key(self.inner.key()) {
                Ok((user_key, _)) => Some(user_key.to_vec()),
                Err(e) => return self.fail_split(e.to_string()),
            }
        } else {
            None
        };

        self.inner.prev();

        if let Some(old_key) = old_key {
            if self.inner.valid() {
                let same_key = match split_key(self.inner.key()) {
                    Ok((user_key, _)) => user_key == old_key.as_slice(),
                    Err(e) => return self.fail_split(e.to_string()),
                };
                if same_key {
                    // The bare key starts the run of versions; the entry
                    // before it belongs to the previous user key
                    self.inner.seek(&encode_key(&old_key, Timestamp::ZERO));
                    if self.inner.valid() {
                        self.inner.prev();
                    }
                }
            }
        }

        self.settle()
    }

    /// The current position, without moving
    pub fn state(&self) -> IterState<'_> {
        match &self.phase {
            Phase::Unpositioned | Phase::Exhausted => IterState::end(),
            Phase::SplitFailed(reason) => IterState::failed(split_error(reason)),
            Phase::StoreFailed => match self.inner.status() {
                Ok(()) => IterState::end(),
                Err(e) => IterState::failed(e),
            },
            Phase::Positioned => match decode_key_ref(self.inner.key()) {
                Ok(key) => IterState {
                    valid: true,
                    key: Some(key),
                    value: Some(self.inner.value()),
                    status: Ok(()),
                },
                Err(e) => IterState::failed(split_error(&e.to_string())),
            },
        }
    }

    /// Whether the last move left the iterator on an entry
    pub fn valid(&self) -> bool {
        self.phase == Phase::Positioned
    }

    fn settle(&mut self) -> IterState<'_> {
        if let Some(stats) = &self.stats {
            let skipped = self.inner.deleted_entries_skipped();
            stats.record_deletes_skipped(skipped.saturating_sub(self.deletes_recorded));
            self.deletes_recorded = skipped;
        }
        self.phase = if self.inner.valid() {
            match decode_key_ref(self.inner.key()) {
                Ok(_) => Phase::Positioned,
                Err(e) => Phase::SplitFailed(e.to_string()),
            }
        } else if self.inner.status().is_err() {
            Phase::StoreFailed
        } else {
            Phase::Exhausted
        };
        self.state()
    }

    fn fail_split(&mut self, reason: String) -> IterState<'_> {
        self.phase = Phase::SplitFailed(reason);
        self.state()
    }
}

fn split_error(reason: &str) -> MvccError {
    DecodeError::Malformed(format!("failed to split key: {}", reason)).into()
}
