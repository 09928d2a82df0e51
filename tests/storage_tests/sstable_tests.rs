//! Tests for SSTable implementation
//!
//! These tests verify:
//! - SSTable creation and ordering enforcement
//! - O(log n) version lookups via the index block
//! - Tombstones and merge operands
//! - Table properties and user property collectors
//! - Global sequence numbers for ingested tables
//! - File format validation

use std::path::Path;
use std::sync::Arc;

use bytes::Bytes;
use mvcckv::env::{DiskEnv, Env, MemEnv};
use mvcckv::iterator::{TimeBoundCollectorFactory, TS_MAX_PROPERTY, TS_MIN_PROPERTY};
use mvcckv::key::{encode_timestamp, MvccComparator};
use mvcckv::storage::{
    BytewiseComparator, KeyComparator, SSTableBuilder, SSTableReader, TableInfo,
    TablePropertiesCollectorFactory, ValueKind, VersionedEntry,
};
use mvcckv::{encode_key, MvccError, Timestamp};
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

const TABLE: &str = "test.sst";

fn bytewise() -> Arc<dyn KeyComparator> {
    Arc::new(BytewiseComparator)
}

/// Build a table in `env` from entries already in internal order
fn build(env: &MemEnv, entries: &[VersionedEntry]) -> TableInfo {
    let file = env.new_writable_file(Path::new(TABLE)).unwrap();
    let mut builder = SSTableBuilder::new(file, bytewise(), Vec::new()).unwrap();
    for entry in entries {
        builder.add(entry).unwrap();
    }
    builder.finish().unwrap()
}

fn open(env: &MemEnv) -> SSTableReader {
    SSTableReader::open(env.read_file(Path::new(TABLE)).unwrap(), true).unwrap()
}

/// Numbered entries with zero-padded keys
fn numbered(count: usize) -> Vec<VersionedEntry> {
    (0..count)
        .map(|i| {
            VersionedEntry::put(
                format!("key{:05}", i).into_bytes(),
                i as u64 + 1,
                format!("value{}", i).into_bytes(),
            )
        })
        .collect()
}

// =============================================================================
// SSTableBuilder Tests
// =============================================================================

#[test]
fn test_builder_empty_sstable() {
    let env = MemEnv::new();
    let info = build(&env, &[]);

    assert_eq!(info.entry_count, 0);
    assert!(info.smallest_key.is_empty());

    let reader = open(&env);
    assert_eq!(reader.entry_count(), 0);
    assert_eq!(reader.smallest_key().unwrap(), None);
    assert_eq!(reader.iter().count(), 0);
}

#[test]
fn test_builder_tracks_bounds_and_counts() {
    let env = MemEnv::new();
    let entries = vec![
        VersionedEntry::put(&b"a"[..], 3, &b"1"[..]),
        VersionedEntry::merge(&b"b"[..], 5, &b"2"[..]),
        VersionedEntry::delete(&b"c"[..], 4),
    ];

    let info = build(&env, &entries);

    assert_eq!(info.entry_count, 3);
    assert_eq!(info.smallest_key, b"a".to_vec());
    assert_eq!(info.largest_key, b"c".to_vec());
    assert_eq!(info.properties.tombstone_count, 1);
    assert_eq!(info.properties.merge_count, 1);
    assert_eq!(info.properties.smallest_seqno, 3);
    assert_eq!(info.properties.largest_seqno, 5);
    assert_eq!(info.file_size, env.file_size(Path::new(TABLE)).unwrap());
}

#[test]
fn test_builder_rejects_out_of_order_keys() {
    let env = MemEnv::new();
    let file = env.new_writable_file(Path::new(TABLE)).unwrap();
    let mut builder = SSTableBuilder::new(file, bytewise(), Vec::new()).unwrap();

    builder.add_raw(b"b", 1, ValueKind::Put, b"v").unwrap();
    let err = builder.add_raw(b"a", 1, ValueKind::Put, b"v").unwrap_err();
    assert!(matches!(err, MvccError::InvalidArgument(_)));
}

#[test]
fn test_builder_requires_descending_sequences_per_key() {
    let env = MemEnv::new();
    let file = env.new_writable_file(Path::new(TABLE)).unwrap();
    let mut builder = SSTableBuilder::new(file, bytewise(), Vec::new()).unwrap();

    builder.add_raw(b"k", 5, ValueKind::Put, b"new").unwrap();
    builder.add_raw(b"k", 2, ValueKind::Put, b"old").unwrap();
    assert!(builder.add_raw(b"k", 2, ValueKind::Put, b"dup").is_err());
    assert_eq!(builder.entry_count(), 2);
    assert_eq!(builder.last_key(), Some(&b"k"[..]));
}

#[test]
fn test_builder_follows_comparator_order() {
    // Newest-first timestamps are out of bytewise order but in MVCC order
    let env = MemEnv::new();
    let file = env.new_writable_file(Path::new(TABLE)).unwrap();
    let mut builder = SSTableBuilder::new(file, Arc::new(MvccComparator), Vec::new()).unwrap();

    builder
        .add_raw(&encode_key(b"a", Timestamp::new(100, 0)), 0, ValueKind::Put, b"new")
        .unwrap();
    builder
        .add_raw(&encode_key(b"a", Timestamp::new(50, 0)), 0, ValueKind::Put, b"old")
        .unwrap();
    assert_eq!(builder.finish().unwrap().entry_count, 2);
}

// =============================================================================
// Property Collector Tests
// =============================================================================

#[test]
fn test_collectors_write_user_properties() {
    let env = MemEnv::new();
    let file = env.new_writable_file(Path::new(TABLE)).unwrap();
    let mut builder = SSTableBuilder::new(
        file,
        Arc::new(MvccComparator),
        vec![TimeBoundCollectorFactory.create()],
    )
    .unwrap();
    builder
        .add_raw(&encode_key(b"a", Timestamp::new(20, 0)), 0, ValueKind::Put, b"v")
        .unwrap();
    builder
        .add_raw(&encode_key(b"b", Timestamp::new(10, 0)), 0, ValueKind::Put, b"v")
        .unwrap();
    builder.finish().unwrap();

    let reader = open(&env);
    let props = &reader.properties().user_properties;
    assert_eq!(props.get(TS_MIN_PROPERTY), Some(&encode_timestamp(Timestamp::new(10, 0))));
    assert_eq!(props.get(TS_MAX_PROPERTY), Some(&encode_timestamp(Timestamp::new(20, 0))));
}

// =============================================================================
// SSTableReader Tests
// =============================================================================

#[test]
fn test_reader_get_versions() {
    let env = MemEnv::new();
    let entries = vec![
        VersionedEntry::put(&b"a"[..], 1, &b"a1"[..]),
        VersionedEntry::put(&b"k"[..], 9, &b"k9"[..]),
        VersionedEntry::merge(&b"k"[..], 6, &b"k6"[..]),
        VersionedEntry::put(&b"k"[..], 2, &b"k2"[..]),
        VersionedEntry::put(&b"z"[..], 4, &b"z4"[..]),
    ];
    build(&env, &entries);
    let reader = open(&env);
    let cmp = BytewiseComparator;

    let all = reader.get_versions(&cmp, b"k", u64::MAX).unwrap();
    let seqs: Vec<u64> = all.iter().map(|e| e.sequence).collect();
    assert_eq!(seqs, vec![9, 6, 2]);

    let visible = reader.get_versions(&cmp, b"k", 7).unwrap();
    assert_eq!(visible.len(), 2);
    assert_eq!(visible[0].kind, ValueKind::Merge);

    assert!(reader.get_versions(&cmp, b"m", u64::MAX).unwrap().is_empty());
}

#[test]
fn test_reader_lower_bound() {
    let env = MemEnv::new();
    build(&env, &numbered(100));
    let reader = open(&env);
    let cmp = BytewiseComparator;

    assert_eq!(reader.lower_bound(&cmp, b"key00000", u64::MAX).unwrap(), 0);
    assert_eq!(reader.lower_bound(&cmp, b"key00050", u64::MAX).unwrap(), 50);
    assert_eq!(reader.lower_bound(&cmp, b"key000505", u64::MAX).unwrap(), 51);
    assert_eq!(reader.lower_bound(&cmp, b"zzz", u64::MAX).unwrap(), 100);
}

#[test]
fn test_reader_tombstone_entry() {
    let env = MemEnv::new();
    build(&env, &[VersionedEntry::delete(&b"gone"[..], 3)]);
    let reader = open(&env);

    let entry = reader.entry_at(0).unwrap();
    assert_eq!(entry.kind, ValueKind::Delete);
    assert!(entry.value.is_empty());
}

#[test]
fn test_reader_entry_out_of_range() {
    let env = MemEnv::new();
    build(&env, &numbered(2));
    assert!(open(&env).entry_at(2).is_err());
}

#[test]
fn test_iterator_returns_all_entries() {
    let env = MemEnv::new();
    let entries = numbered(50);
    build(&env, &entries);

    let read: Vec<VersionedEntry> = open(&env).iter().collect::<Result<_, _>>().unwrap();
    assert_eq!(read, entries);
}

#[test]
fn test_iterator_from_position() {
    let env = MemEnv::new();
    build(&env, &numbered(10));
    let reader = open(&env);

    let keys: Vec<Bytes> = reader.iter_from(8).map(|e| e.unwrap().key).collect();
    assert_eq!(keys, vec![Bytes::from("key00008"), Bytes::from("key00009")]);
}

#[test]
fn test_global_seqno_overrides_sequences() {
    let env = MemEnv::new();
    build(&env, &numbered(3));
    let reader = open(&env).with_global_seqno(Some(42));

    assert_eq!(reader.global_seqno(), Some(42));
    assert!(reader.iter().all(|e| e.unwrap().sequence == 42));
}

#[test]
fn test_large_values() {
    let env = MemEnv::new();
    let value = vec![0xabu8; 1 << 20];
    build(&env, &[VersionedEntry::put(&b"big"[..], 1, value.clone())]);

    let entry = open(&env).entry_at(0).unwrap();
    assert_eq!(entry.value.len(), value.len());
}

// =============================================================================
// Format Validation Tests
// =============================================================================

#[test]
fn test_open_too_short() {
    let err = SSTableReader::open(Bytes::from_static(b"MVKV"), true).unwrap_err();
    assert!(err.is_corruption());
}

#[test]
fn test_open_invalid_magic() {
    let env = MemEnv::new();
    build(&env, &numbered(3));
    let mut data = env.read_file(Path::new(TABLE)).unwrap().to_vec();
    data[0] = b'X';

    let err = SSTableReader::open(Bytes::from(data), true).unwrap_err();
    assert!(matches!(err, MvccError::Corruption(_)));
}

#[test]
fn test_open_detects_data_corruption() {
    let env = MemEnv::new();
    build(&env, &numbered(3));
    let mut data = env.read_file(Path::new(TABLE)).unwrap().to_vec();
    // Inside the first entry's key
    data[6 + 17] ^= 0xff;

    assert!(SSTableReader::open(Bytes::from(data.clone()), true).is_err());
    // Without checksum verification the table still opens
    assert!(SSTableReader::open(Bytes::from(data), false).is_ok());
}

#[test]
fn test_table_on_disk() {
    let temp_dir = TempDir::new().unwrap();
    let env = DiskEnv::new();
    let path = temp_dir.path().join(TABLE);

    let file = env.new_writable_file(&path).unwrap();
    let mut builder = SSTableBuilder::new(file, bytewise(), Vec::new()).unwrap();
    for entry in numbered(20) {
        builder.add(&entry).unwrap();
    }
    let info = builder.finish().unwrap();

    let reader = SSTableReader::open(env.read_file(&path).unwrap(), true).unwrap();
    assert_eq!(reader.entry_count(), 20);
    assert_eq!(reader.size(), info.file_size);
}
