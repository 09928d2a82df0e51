//! Key Module
//!
//! Versioned keys and their store-native byte encoding.
//!
//! ## Responsibilities
//! - Define the `(user key, wall time, logical)` key model
//! - Encode keys so the store's comparator orders them correctly
//! - Decode and split encoded keys for iteration
//!
//! ## Encoded Layout
//! ```text
//! bare key:       [user key][0x00]
//! versioned key:  [user key][0x00][wall: u64 BE][logical: u32 BE]?[len]
//! ```
//! The final byte is the length of the timestamp suffix that precedes it
//! (0, 9 or 13), so a key can always be split from the right without
//! escaping bytes inside the user key. The logical component is omitted
//! when it is zero.

mod codec;
mod comparator;

use std::fmt;

use serde::{Deserialize, Serialize};

pub use codec::{
    decode_key, decode_key_ref, decode_timestamp, encode_key, encode_timestamp, split_key,
    MVCC_VERSION_TIMESTAMP_SIZE,
};
pub use comparator::{MvccComparator, MvccPrefixExtractor};

/// A hybrid logical clock timestamp.
///
/// Ordered by `(wall_time, logical)`. The zero timestamp marks the bare
/// (metadata) form of a key.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp {
    pub wall_time: i64,
    pub logical: i32,
}

impl Timestamp {
    /// The zero timestamp
    pub const ZERO: Timestamp = Timestamp {
        wall_time: 0,
        logical: 0,
    };

    /// The largest representable timestamp
    pub const MAX: Timestamp = Timestamp {
        wall_time: i64::MAX,
        logical: i32::MAX,
    };

    pub fn new(wall_time: i64, logical: i32) -> Self {
        Self { wall_time, logical }
    }

    pub fn is_zero(&self) -> bool {
        self.wall_time == 0 && self.logical == 0
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:09},{}", self.wall_time / 1_000_000_000, self.wall_time % 1_000_000_000, self.logical)
    }
}

/// An owned versioned key.
///
/// Created fresh on every encode/decode; never aliases store buffers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct VersionedKey {
    pub user_key: Vec<u8>,
    pub timestamp: Timestamp,
}

impl VersionedKey {
    pub fn new(user_key: impl Into<Vec<u8>>, timestamp: Timestamp) -> Self {
        Self {
            user_key: user_key.into(),
            timestamp,
        }
    }

    /// The bare (metadata) form of a key
    pub fn bare(user_key: impl Into<Vec<u8>>) -> Self {
        Self::new(user_key, Timestamp::ZERO)
    }

    pub fn is_bare(&self) -> bool {
        self.timestamp.is_zero()
    }

    /// Encode into the store-native representation
    pub fn encode(&self) -> Vec<u8> {
        encode_key(&self.user_key, self.timestamp)
    }

    pub fn borrowed(&self) -> VersionedKeyRef<'_> {
        VersionedKeyRef {
            user_key: &self.user_key,
            timestamp: self.timestamp,
        }
    }
}

/// A versioned key borrowing its user key from someone else's buffer.
///
/// When produced by an iterator it is only valid until the iterator moves;
/// use [`VersionedKeyRef::to_owned_key`] to keep it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VersionedKeyRef<'a> {
    pub user_key: &'a [u8],
    pub timestamp: Timestamp,
}

impl<'a> VersionedKeyRef<'a> {
    pub fn to_owned_key(&self) -> VersionedKey {
        VersionedKey {
            user_key: self.user_key.to_vec(),
            timestamp: self.timestamp,
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        encode_key(self.user_key, self.timestamp)
    }
}
