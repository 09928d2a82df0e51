//! Tests for MVCC key ordering
//!
//! These tests verify:
//! - User keys ascend, bare key first, then versions newest first
//! - Keys that are prefixes of other keys sort before them
//! - The prefix extractor returns the user key

use std::cmp::Ordering;

use mvcckv::key::{MvccComparator, MvccPrefixExtractor};
use mvcckv::storage::{KeyComparator, PrefixExtractor};
use mvcckv::{encode_key, Timestamp};

fn cmp(a: &[u8], b: &[u8]) -> Ordering {
    MvccComparator.compare(a, b)
}

fn key(user: &str, wall: i64, logical: i32) -> Vec<u8> {
    encode_key(user.as_bytes(), Timestamp::new(wall, logical))
}

// =============================================================================
// Ordering Tests
// =============================================================================

#[test]
fn test_comparator_name() {
    assert_eq!(MvccComparator.name(), "mvcckv_comparator");
}

#[test]
fn test_user_keys_ascend() {
    assert_eq!(cmp(&key("a", 5, 0), &key("b", 5, 0)), Ordering::Less);
    assert_eq!(cmp(&key("b", 1, 0), &key("a", 9, 0)), Ordering::Greater);
}

#[test]
fn test_bare_key_sorts_first() {
    assert_eq!(cmp(&key("a", 0, 0), &key("a", 1, 0)), Ordering::Less);
    assert_eq!(cmp(&key("a", i64::MAX, 0), &key("a", 0, 0)), Ordering::Greater);
}

#[test]
fn test_newer_versions_sort_first() {
    assert_eq!(cmp(&key("a", 100, 0), &key("a", 50, 0)), Ordering::Less);
    assert_eq!(cmp(&key("a", 5, 2), &key("a", 5, 1)), Ordering::Less);
    assert_eq!(cmp(&key("a", 5, 1), &key("a", 5, 0)), Ordering::Less);
}

#[test]
fn test_equal_keys() {
    assert_eq!(cmp(&key("a", 7, 3), &key("a", 7, 3)), Ordering::Equal);
    assert_eq!(cmp(&key("a", 0, 0), &key("a", 0, 0)), Ordering::Equal);
}

#[test]
fn test_prefix_user_key_sorts_before_all_versions_of_longer_key() {
    assert_eq!(cmp(&key("a", 1, 0), &key("ab", 0, 0)), Ordering::Less);
    assert_eq!(cmp(&key("a", 1, 0), &key("a\0", 0, 0)), Ordering::Less);
}

#[test]
fn test_sorted_sequence() {
    let mut keys = vec![
        key("b", 10, 0),
        key("a", 50, 0),
        key("b", 0, 0),
        key("a", 100, 0),
        key("a", 0, 0),
        key("a", 100, 1),
    ];
    keys.sort_by(|x, y| cmp(x, y));

    let expected = vec![
        key("a", 0, 0),
        key("a", 100, 1),
        key("a", 100, 0),
        key("a", 50, 0),
        key("b", 0, 0),
        key("b", 10, 0),
    ];
    assert_eq!(keys, expected);
}

#[test]
fn test_unsplittable_keys_fall_back_to_bytes() {
    assert_eq!(cmp(b"", b"x"), Ordering::Less);
}

// =============================================================================
// Prefix Extractor Tests
// =============================================================================

#[test]
fn test_prefix_extractor_returns_user_key() {
    let encoded = key("user", 9, 1);
    assert_eq!(MvccPrefixExtractor.transform(&encoded), b"user");

    let bare = key("user", 0, 0);
    assert_eq!(MvccPrefixExtractor.transform(&bare), b"user");
}

#[test]
fn test_prefix_extractor_keeps_unsplittable_key() {
    let garbage = [b'x', 50];
    assert_eq!(MvccPrefixExtractor.transform(&garbage), &garbage);
}
