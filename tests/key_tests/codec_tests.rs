//! Tests for the key codec
//!
//! These tests verify:
//! - Byte layout of bare and versioned keys
//! - Decoding and splitting, including malformed input
//! - Standalone timestamp encoding used by table properties

use mvcckv::key::{decode_key, decode_key_ref, decode_timestamp, encode_key, encode_timestamp, split_key};
use mvcckv::{DecodeError, Timestamp, VersionedKey};

// =============================================================================
// Encoding Layout Tests
// =============================================================================

#[test]
fn test_encode_bare_key() {
    let encoded = encode_key(b"abc", Timestamp::ZERO);
    assert_eq!(encoded, b"abc\x00".to_vec());
}

#[test]
fn test_encode_wall_time_only() {
    let encoded = encode_key(b"a", Timestamp::new(1, 0));

    let mut expected = b"a\x00".to_vec();
    expected.extend_from_slice(&1u64.to_be_bytes());
    expected.push(9);
    assert_eq!(encoded, expected);
}

#[test]
fn test_encode_with_logical() {
    let encoded = encode_key(b"a", Timestamp::new(1, 2));

    let mut expected = b"a\x00".to_vec();
    expected.extend_from_slice(&1u64.to_be_bytes());
    expected.extend_from_slice(&2u32.to_be_bytes());
    expected.push(13);
    assert_eq!(encoded, expected);
}

#[test]
fn test_encode_empty_user_key() {
    assert_eq!(encode_key(b"", Timestamp::ZERO), vec![0]);
    assert_eq!(encode_key(b"", Timestamp::new(5, 0)).len(), 10);
}

#[test]
fn test_user_key_may_contain_nul() {
    let key = VersionedKey::new(b"a\x00b".to_vec(), Timestamp::new(7, 3));
    let decoded = decode_key(&key.encode()).unwrap();
    assert_eq!(decoded, key);
}

// =============================================================================
// Decode Tests
// =============================================================================

#[test]
fn test_decode_bare_key() {
    let decoded = decode_key(b"abc\x00").unwrap();
    assert_eq!(decoded.user_key, b"abc".to_vec());
    assert_eq!(decoded.timestamp, Timestamp::ZERO);
    assert!(decoded.is_bare());
}

#[test]
fn test_decode_recovers_versioned_key() {
    for ts in [Timestamp::new(1, 0), Timestamp::new(100, 7), Timestamp::new(i64::MAX, 1)] {
        let key = VersionedKey::new("user", ts);
        assert_eq!(decode_key(&key.encode()).unwrap(), key);
    }
}

#[test]
fn test_decode_ref_borrows_user_key() {
    let encoded = encode_key(b"borrowed", Timestamp::new(3, 0));
    let decoded = decode_key_ref(&encoded).unwrap();
    assert_eq!(decoded.user_key, b"borrowed");
    assert_eq!(decoded.timestamp, Timestamp::new(3, 0));
    assert_eq!(decoded.encode(), encoded);
}

#[test]
fn test_decode_empty_buffer_fails() {
    assert!(matches!(decode_key(b""), Err(DecodeError::Malformed(_))));
}

#[test]
fn test_decode_length_past_start_fails() {
    // Claims a 13-byte suffix in a 3-byte key
    assert!(decode_key(&[b'a', b'b', 13]).is_err());
}

#[test]
fn test_decode_missing_separator_fails() {
    let mut encoded = encode_key(b"a", Timestamp::new(1, 0));
    encoded[1] = 0xff;
    assert!(decode_key(&encoded).is_err());
}

#[test]
fn test_decode_bad_suffix_length_fails() {
    // NUL plus five timestamp bytes is neither 8 nor 12
    let encoded = [b'a', 0, 1, 2, 3, 4, 5, 6];
    assert!(decode_key(&encoded).is_err());
}

// =============================================================================
// Split Tests
// =============================================================================

#[test]
fn test_split_bare_key() {
    let (user, ts) = split_key(b"abc\x00").unwrap();
    assert_eq!(user, b"abc");
    assert!(ts.is_empty());
}

#[test]
fn test_split_versioned_key_keeps_separator() {
    let encoded = encode_key(b"abc", Timestamp::new(9, 0));
    let (user, ts) = split_key(&encoded).unwrap();
    assert_eq!(user, b"abc");
    assert_eq!(ts.len(), 9);
    assert_eq!(ts[0], 0);
}

#[test]
fn test_split_does_not_parse_timestamp() {
    // Garbage timestamp bytes still split as long as the length fits
    let (user, ts) = split_key(&[b'k', 0xaa, 0xbb, 2]).unwrap();
    assert_eq!(user, b"k");
    assert_eq!(ts, &[0xaa, 0xbb]);
}

#[test]
fn test_split_empty_fails() {
    assert!(split_key(b"").is_err());
}

// =============================================================================
// Timestamp Encoding Tests
// =============================================================================

#[test]
fn test_timestamp_encoding_lengths() {
    assert_eq!(encode_timestamp(Timestamp::new(1, 0)).len(), 8);
    assert_eq!(encode_timestamp(Timestamp::new(1, 1)).len(), 12);
}

#[test]
fn test_timestamp_decode_recovers() {
    for ts in [Timestamp::new(42, 0), Timestamp::new(42, 9)] {
        assert_eq!(decode_timestamp(&encode_timestamp(ts)).unwrap(), ts);
    }
}

#[test]
fn test_timestamp_decode_bad_length() {
    assert!(decode_timestamp(&[1, 2, 3]).is_err());
}

#[test]
fn test_encoded_timestamps_order_bytewise() {
    let older = encode_timestamp(Timestamp::new(5, 0));
    let newer = encode_timestamp(Timestamp::new(5, 1));
    let newest = encode_timestamp(Timestamp::new(6, 0));
    assert!(older < newer);
    assert!(newer < newest);
}

#[test]
fn test_timestamp_ordering() {
    assert!(Timestamp::new(1, 5) < Timestamp::new(2, 0));
    assert!(Timestamp::new(2, 0) < Timestamp::new(2, 1));
    assert!(Timestamp::ZERO.is_zero());
    assert!(Timestamp::MAX > Timestamp::new(i64::MAX, 0));
}
