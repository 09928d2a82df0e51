//! Key codec
//!
//! Encoding, decoding and splitting of store-native MVCC keys.

use crate::error::DecodeError;

use super::{Timestamp, VersionedKey, VersionedKeyRef};

/// Size of a fully populated timestamp (wall + logical)
pub const MVCC_VERSION_TIMESTAMP_SIZE: usize = 12;

const WALL_TIME_SIZE: usize = 8;

/// Encode a user key and timestamp.
///
/// The result is ordered by [`super::MvccComparator`]: the bare key first,
/// then versions from newest to oldest.
pub fn encode_key(user_key: &[u8], timestamp: Timestamp) -> Vec<u8> {
    let has_timestamp = !timestamp.is_zero();
    let suffix = if has_timestamp {
        1 + MVCC_VERSION_TIMESTAMP_SIZE
    } else {
        0
    };

    let mut buf = Vec::with_capacity(user_key.len() + suffix + 1);
    buf.extend_from_slice(user_key);
    if has_timestamp {
        // NUL separator keeps the prefix extractor's view of the key intact
        buf.push(0);
        buf.extend_from_slice(&(timestamp.wall_time as u64).to_be_bytes());
        if timestamp.logical != 0 {
            buf.extend_from_slice(&(timestamp.logical as u32).to_be_bytes());
        }
    }
    let ts_len = buf.len() - user_key.len();
    buf.push(ts_len as u8);
    buf
}

/// Encode a timestamp on its own, as recorded in table properties.
pub fn encode_timestamp(timestamp: Timestamp) -> Vec<u8> {
    let mut buf = Vec::with_capacity(MVCC_VERSION_TIMESTAMP_SIZE);
    buf.extend_from_slice(&(timestamp.wall_time as u64).to_be_bytes());
    if timestamp.logical != 0 {
        buf.extend_from_slice(&(timestamp.logical as u32).to_be_bytes());
    }
    buf
}

/// Decode a timestamp produced by [`encode_timestamp`].
pub fn decode_timestamp(buf: &[u8]) -> Result<Timestamp, DecodeError> {
    match buf.len() {
        WALL_TIME_SIZE => Ok(Timestamp::new(read_u64(&buf[..8]) as i64, 0)),
        MVCC_VERSION_TIMESTAMP_SIZE => Ok(Timestamp::new(
            read_u64(&buf[..8]) as i64,
            read_u32(&buf[8..12]) as i32,
        )),
        n => Err(DecodeError::Malformed(format!(
            "invalid encoded timestamp length {}",
            n
        ))),
    }
}

/// Split an encoded key into its user key and timestamp suffix.
///
/// The suffix includes the NUL separator and is empty for a bare key.
/// Splitting never parses the timestamp itself.
pub fn split_key(buf: &[u8]) -> Result<(&[u8], &[u8]), DecodeError> {
    let (&ts_len, rest) = buf
        .split_last()
        .ok_or_else(|| DecodeError::Malformed("empty key".to_string()))?;

    let ts_len = ts_len as usize;
    if ts_len > rest.len() {
        return Err(DecodeError::Malformed(format!(
            "timestamp length {} exceeds key length {}",
            ts_len,
            rest.len()
        )));
    }

    Ok(rest.split_at(rest.len() - ts_len))
}

/// Decode an encoded key without copying the user key.
pub fn decode_key_ref(buf: &[u8]) -> Result<VersionedKeyRef<'_>, DecodeError> {
    let (user_key, ts) = split_key(buf)?;

    let timestamp = match ts.split_first() {
        None => Timestamp::ZERO,
        Some((0, encoded)) => decode_timestamp(encoded)?,
        Some((b, _)) => {
            return Err(DecodeError::Malformed(format!(
                "expected NUL timestamp separator, found {:#04x}",
                b
            )))
        }
    };

    Ok(VersionedKeyRef {
        user_key,
        timestamp,
    })
}

/// Decode an encoded key into an owned [`VersionedKey`].
pub fn decode_key(buf: &[u8]) -> Result<VersionedKey, DecodeError> {
    decode_key_ref(buf).map(|k| k.to_owned_key())
}

fn read_u64(buf: &[u8]) -> u64 {
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(buf);
    u64::from_be_bytes(bytes)
}

fn read_u32(buf: &[u8]) -> u32 {
    let mut bytes = [0u8; 4];
    bytes.copy_from_slice(buf);
    u32::from_be_bytes(bytes)
}
