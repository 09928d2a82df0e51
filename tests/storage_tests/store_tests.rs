//! Tests for the LSM store
//!
//! These tests verify:
//! - Point writes, merges, deletes and range deletes
//! - Snapshot isolation for reads and iterators
//! - Recovery from the WAL and from flushed tables
//! - Read-only mode and directory locking
//! - Flush, compaction and table metadata
//! - External file ingestion

use std::path::{Path, PathBuf};
use std::sync::Arc;

use mvcckv::env::{DiskEnv, Env, MemEnv};
use mvcckv::merge::{Intent, MetadataRecord, MvccMergeOperator, RawValue};
use mvcckv::storage::{
    BytewiseComparator, CompactRangeOptions, IngestOptions, KvStore, LsmStore, ReadOptions,
    SSTableBuilder, StoreIterator, StoreOptions, ValueKind, WriteBatch,
};
use mvcckv::{MergeError, MvccError};
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn dir() -> PathBuf {
    PathBuf::from("db")
}

fn mem_env() -> Arc<dyn Env> {
    Arc::new(MemEnv::new())
}

fn merge_options() -> StoreOptions {
    StoreOptions {
        merge_operator: Some(Arc::new(MvccMergeOperator)),
        ..StoreOptions::default()
    }
}

fn open(env: &Arc<dyn Env>) -> LsmStore {
    LsmStore::open(Arc::clone(env), &dir(), StoreOptions::default(), false).unwrap()
}

fn get(store: &LsmStore, key: &[u8]) -> Option<Vec<u8>> {
    store.get(&ReadOptions::default(), key).unwrap()
}

fn record(bytes: &[u8]) -> Vec<u8> {
    MetadataRecord::from_bytes(bytes).encode().unwrap()
}

fn decoded_bytes(value: &[u8]) -> Vec<u8> {
    match MetadataRecord::decode(value).unwrap().value {
        Some(RawValue::Bytes(bytes)) => bytes,
        other => panic!("expected bytes, got {:?}", other),
    }
}

/// Drain an iterator into `(key, value)` pairs
fn collect(mut iter: Box<dyn StoreIterator>) -> Vec<(Vec<u8>, Vec<u8>)> {
    let mut out = Vec::new();
    iter.seek_to_first();
    while iter.valid() {
        out.push((iter.key().to_vec(), iter.value().to_vec()));
        iter.next();
    }
    out
}

/// Write an external table whose entries carry sequence number `seq`
fn write_external(env: &Arc<dyn Env>, path: &Path, keys: &[&str], seq: u64) {
    let file = env.new_writable_file(path).unwrap();
    let mut builder = SSTableBuilder::new(file, Arc::new(BytewiseComparator), Vec::new()).unwrap();
    for key in keys {
        builder
            .add_raw(key.as_bytes(), seq, ValueKind::Put, format!("ext-{}", key).as_bytes())
            .unwrap();
    }
    builder.finish().unwrap();
}

// =============================================================================
// Basic Operation Tests
// =============================================================================

#[test]
fn test_put_get_delete() {
    let env = mem_env();
    let store = open(&env);

    store.put(b"key1", b"value1").unwrap();
    assert_eq!(get(&store, b"key1"), Some(b"value1".to_vec()));

    store.put(b"key1", b"value2").unwrap();
    assert_eq!(get(&store, b"key1"), Some(b"value2".to_vec()));

    store.delete(b"key1").unwrap();
    assert_eq!(get(&store, b"key1"), None);
    assert_eq!(get(&store, b"missing"), None);
}

#[test]
fn test_batch_assigns_consecutive_sequences() {
    let env = mem_env();
    let store = open(&env);

    let mut batch = WriteBatch::new();
    batch.put(b"a", b"1");
    batch.put(b"b", b"2");
    batch.delete(b"c");
    store.write(&batch, true).unwrap();

    assert_eq!(store.last_sequence(), 3);
    assert_eq!(store.stats().last_sequence, 3);
}

#[test]
fn test_empty_batch_is_noop() {
    let env = mem_env();
    let store = open(&env);
    store.write(&WriteBatch::new(), false).unwrap();
    assert_eq!(store.last_sequence(), 0);
}

#[test]
fn test_merge_folds_operands() {
    let env = mem_env();
    let store = LsmStore::open(Arc::clone(&env), &dir(), merge_options(), false).unwrap();

    store.merge(b"k", &record(b"ab")).unwrap();
    store.merge(b"k", &record(b"cd")).unwrap();
    assert_eq!(decoded_bytes(&get(&store, b"k").unwrap()), b"abcd");

    // Operands split between a table and the memtable
    store.flush().unwrap();
    store.merge(b"k", &record(b"ef")).unwrap();
    assert_eq!(decoded_bytes(&get(&store, b"k").unwrap()), b"abcdef");
}

#[test]
fn test_merge_onto_put() {
    let env = mem_env();
    let store = LsmStore::open(Arc::clone(&env), &dir(), merge_options(), false).unwrap();

    store.put(b"k", &record(b"base")).unwrap();
    store.merge(b"k", &record(b"+1")).unwrap();

    assert_eq!(decoded_bytes(&get(&store, b"k").unwrap()), b"base+1");
}

#[test]
fn test_merge_without_operator_fails_on_read() {
    let env = mem_env();
    let store = open(&env);

    store.merge(b"k", b"operand").unwrap();

    let err = store.get(&ReadOptions::default(), b"k").unwrap_err();
    assert!(matches!(err, MvccError::NotSupported(_)));
}

fn intent_record(bytes: &[u8], txn_id: u64) -> Vec<u8> {
    MetadataRecord::from_bytes(bytes)
        .with_intent(Intent { txn_id, epoch: 0 })
        .encode()
        .unwrap()
}

#[test]
fn test_conflicting_merges_fail_reads_not_flush() {
    let env = mem_env();
    let store = LsmStore::open(Arc::clone(&env), &dir(), merge_options(), false).unwrap();

    store.put(b"k", &record(b"base")).unwrap();
    store.merge(b"k", &intent_record(b"a", 1)).unwrap();
    store.merge(b"k", &intent_record(b"b", 2)).unwrap();
    store.put(b"other", b"v").unwrap();

    store.flush().unwrap();
    store
        .compact_range(&CompactRangeOptions::default(), None, None)
        .unwrap();
    store.close().unwrap();

    let store = LsmStore::open(Arc::clone(&env), &dir(), merge_options(), false).unwrap();
    let err = store.get(&ReadOptions::default(), b"k").unwrap_err();
    assert!(matches!(err, MvccError::Merge(MergeError::Incompatible(_))));
    assert!(!err.is_corruption());
    assert_eq!(get(&store, b"other"), Some(b"v".to_vec()));
}

#[test]
fn test_tombstone_merge_reports_conflict_before_and_after_flush() {
    let env = mem_env();
    let store = LsmStore::open(Arc::clone(&env), &dir(), merge_options(), false).unwrap();

    store.put(b"k", &intent_record(b"base", 3)).unwrap();
    store.flush().unwrap();
    store.merge(b"k", &intent_record(b"a", 1)).unwrap();
    store
        .merge(b"k", &MetadataRecord::tombstone().encode().unwrap())
        .unwrap();

    let before = store.get(&ReadOptions::default(), b"k").unwrap_err();
    assert!(matches!(before, MvccError::Merge(MergeError::Incompatible(_))));

    store.flush().unwrap();
    let after = store.get(&ReadOptions::default(), b"k").unwrap_err();
    assert!(matches!(after, MvccError::Merge(MergeError::Incompatible(_))));
}

#[test]
fn test_delete_range() {
    let env = mem_env();
    let store = open(&env);
    for key in ["a", "b", "c", "d"] {
        store.put(key.as_bytes(), b"v").unwrap();
    }
    store.flush().unwrap();

    store.delete_range(b"b", b"d").unwrap();

    assert_eq!(get(&store, b"a"), Some(b"v".to_vec()));
    assert_eq!(get(&store, b"b"), None);
    assert_eq!(get(&store, b"c"), None);
    assert_eq!(get(&store, b"d"), Some(b"v".to_vec()));
}

#[test]
fn test_delete_range_covers_earlier_batch_writes() {
    let env = mem_env();
    let store = open(&env);

    let mut batch = WriteBatch::new();
    batch.put(b"b", b"1");
    batch.delete_range(b"a", b"z");
    batch.put(b"c", b"2");
    store.write(&batch, false).unwrap();

    assert_eq!(get(&store, b"b"), None);
    assert_eq!(get(&store, b"c"), Some(b"2".to_vec()));
}

// =============================================================================
// Iterator and Snapshot Tests
// =============================================================================

#[test]
fn test_iterator_merges_memtable_and_tables() {
    let env = mem_env();
    let store = open(&env);
    store.put(b"b", b"table").unwrap();
    store.put(b"d", b"gone").unwrap();
    store.flush().unwrap();
    store.put(b"a", b"mem").unwrap();
    store.put(b"b", b"mem").unwrap();
    store.delete(b"d").unwrap();

    let mut iter = store.new_iterator(ReadOptions::default()).unwrap();
    assert_eq!(iter.deleted_entries_skipped(), 0);
    iter.seek_to_first();
    while iter.valid() {
        iter.next();
    }
    assert_eq!(iter.deleted_entries_skipped(), 1);

    assert_eq!(
        collect(iter),
        vec![
            (b"a".to_vec(), b"mem".to_vec()),
            (b"b".to_vec(), b"mem".to_vec()),
        ]
    );
}

#[test]
fn test_iterator_seek_and_reverse() {
    let env = mem_env();
    let store = open(&env);
    for key in ["a", "c", "e"] {
        store.put(key.as_bytes(), b"v").unwrap();
    }

    let mut iter = store.new_iterator(ReadOptions::default()).unwrap();
    iter.seek(b"b");
    assert_eq!(iter.key(), b"c");
    iter.seek_to_last();
    assert_eq!(iter.key(), b"e");
    iter.prev();
    assert_eq!(iter.key(), b"c");
    iter.seek(b"f");
    assert!(!iter.valid());
    assert!(iter.status().is_ok());
}

#[test]
fn test_iterator_switches_direction_across_sources() {
    let env = mem_env();
    let store = open(&env);
    store.put(b"a", b"1").unwrap();
    store.put(b"c", b"1").unwrap();
    store.flush().unwrap();
    store.put(b"b", b"2").unwrap();
    store.put(b"c", b"2").unwrap();
    store.flush().unwrap();
    store.put(b"d", b"3").unwrap();
    store.delete(b"a").unwrap();

    let mut iter = store.new_iterator(ReadOptions::default()).unwrap();
    iter.seek_to_first();
    assert_eq!((iter.key(), iter.value()), (&b"b"[..], &b"2"[..]));
    iter.next();
    assert_eq!((iter.key(), iter.value()), (&b"c"[..], &b"2"[..]));
    iter.prev();
    assert_eq!(iter.key(), b"b");
    iter.prev();
    assert!(!iter.valid());

    iter.seek_to_last();
    assert_eq!(iter.key(), b"d");
    iter.prev();
    assert_eq!(iter.key(), b"c");
    iter.next();
    assert_eq!(iter.key(), b"d");
    iter.next();
    assert!(!iter.valid());
    assert!(iter.status().is_ok());
}

#[test]
fn test_iterator_keeps_tables_compacted_after_creation() {
    let env = mem_env();
    let store = open(&env);
    for key in [b"a", b"b", b"c"] {
        store.put(key, b"old").unwrap();
        store.flush().unwrap();
    }

    let iter = store.new_iterator(ReadOptions::default()).unwrap();
    store.put(b"b", b"new").unwrap();
    store.delete(b"c").unwrap();
    store
        .compact_range(&CompactRangeOptions::default(), None, None)
        .unwrap();

    assert_eq!(
        collect(iter),
        vec![
            (b"a".to_vec(), b"old".to_vec()),
            (b"b".to_vec(), b"old".to_vec()),
            (b"c".to_vec(), b"old".to_vec()),
        ]
    );
}

#[test]
fn test_iterator_folds_operands_across_table_and_memtable() {
    let env = mem_env();
    let store = LsmStore::open(Arc::clone(&env), &dir(), merge_options(), false).unwrap();
    store.put(b"k", &record(b"base")).unwrap();
    store.merge(b"k", &record(b"+1")).unwrap();
    store.flush().unwrap();
    store.merge(b"k", &record(b"+2")).unwrap();

    let entries = collect(store.new_iterator(ReadOptions::default()).unwrap());
    assert_eq!(entries.len(), 1);
    assert_eq!(decoded_bytes(&entries[0].1), b"base+1+2");
}

#[test]
fn test_iterator_reports_merge_conflict_in_status() {
    let env = mem_env();
    let store = LsmStore::open(Arc::clone(&env), &dir(), merge_options(), false).unwrap();
    store.put(b"a", &record(b"v")).unwrap();
    store.merge(b"k", &intent_record(b"x", 1)).unwrap();
    store.merge(b"k", &intent_record(b"y", 2)).unwrap();

    let mut iter = store.new_iterator(ReadOptions::default()).unwrap();
    iter.seek_to_first();
    assert_eq!(iter.key(), b"a");
    iter.next();
    assert!(!iter.valid());
    assert!(matches!(iter.status(), Err(MvccError::Merge(MergeError::Incompatible(_)))));

    // Repositioning clears the failure
    iter.seek(b"a");
    assert!(iter.valid());
    assert!(iter.status().is_ok());
}

#[test]
fn test_snapshot_isolation() {
    let env = mem_env();
    let store = open(&env);
    store.put(b"k", b"old").unwrap();

    let snapshot = store.snapshot();
    store.put(b"k", b"new").unwrap();
    store.put(b"other", b"x").unwrap();

    let at_snapshot = ReadOptions {
        snapshot: Some(snapshot.clone()),
        ..ReadOptions::default()
    };
    assert_eq!(store.get(&at_snapshot, b"k").unwrap(), Some(b"old".to_vec()));
    assert_eq!(store.get(&at_snapshot, b"other").unwrap(), None);
    assert_eq!(get(&store, b"k"), Some(b"new".to_vec()));

    let iter = store.new_iterator(at_snapshot).unwrap();
    assert_eq!(collect(iter), vec![(b"k".to_vec(), b"old".to_vec())]);
}

#[test]
fn test_snapshot_survives_flush_and_compaction() {
    let env = mem_env();
    let store = open(&env);
    store.put(b"k", b"old").unwrap();
    let snapshot = store.snapshot();
    store.put(b"k", b"new").unwrap();

    store.flush().unwrap();
    store
        .compact_range(&CompactRangeOptions::default(), None, None)
        .unwrap();

    let at_snapshot = ReadOptions {
        snapshot: Some(snapshot),
        ..ReadOptions::default()
    };
    assert_eq!(store.get(&at_snapshot, b"k").unwrap(), Some(b"old".to_vec()));
    assert_eq!(get(&store, b"k"), Some(b"new".to_vec()));
}

// =============================================================================
// Recovery Tests
// =============================================================================

#[test]
fn test_recover_unflushed_writes_from_wal() {
    let env = mem_env();
    {
        let store = open(&env);
        store.put(b"a", b"1").unwrap();
        store.put(b"b", b"2").unwrap();
        store.sync_wal().unwrap();
    }

    let store = open(&env);
    assert_eq!(get(&store, b"a"), Some(b"1".to_vec()));
    assert_eq!(get(&store, b"b"), Some(b"2".to_vec()));
    assert_eq!(store.last_sequence(), 2);
}

#[test]
fn test_recover_flushed_tables() {
    let env = mem_env();
    {
        let store = open(&env);
        store.put(b"a", b"1").unwrap();
        store.flush().unwrap();
        store.put(b"b", b"2").unwrap();
        store.close().unwrap();
    }

    let store = open(&env);
    assert_eq!(get(&store, b"a"), Some(b"1".to_vec()));
    assert_eq!(get(&store, b"b"), Some(b"2".to_vec()));
    assert_eq!(store.last_sequence(), 2);

    // New writes continue the sequence
    store.put(b"c", b"3").unwrap();
    assert_eq!(store.last_sequence(), 3);
}

#[test]
fn test_recover_on_disk() {
    let temp_dir = TempDir::new().unwrap();
    let env: Arc<dyn Env> = Arc::new(DiskEnv::new());
    let path = temp_dir.path().join("db");
    {
        let store = LsmStore::open(Arc::clone(&env), &path, StoreOptions::default(), false).unwrap();
        for i in 0..100 {
            store
                .put(format!("key{:03}", i).as_bytes(), format!("value{}", i).as_bytes())
                .unwrap();
        }
        store.flush().unwrap();
        store.delete(b"key050").unwrap();
        store.close().unwrap();
    }

    let store = LsmStore::open(Arc::clone(&env), &path, StoreOptions::default(), false).unwrap();
    assert_eq!(get(&store, b"key000"), Some(b"value0".to_vec()));
    assert_eq!(get(&store, b"key050"), None);
    assert_eq!(collect(store.new_iterator(ReadOptions::default()).unwrap()).len(), 99);
}

// =============================================================================
// Read-only and Locking Tests
// =============================================================================

#[test]
fn test_read_only_rejects_writes() {
    let env = mem_env();
    {
        let store = open(&env);
        store.put(b"k", b"v").unwrap();
        store.close().unwrap();
    }

    let store = LsmStore::open(Arc::clone(&env), &dir(), StoreOptions::default(), true).unwrap();
    assert!(store.is_read_only());
    assert_eq!(get(&store, b"k"), Some(b"v".to_vec()));

    assert!(matches!(store.put(b"k", b"x"), Err(MvccError::NotSupported(_))));
    assert!(matches!(store.flush(), Err(MvccError::NotSupported(_))));
    store.close().unwrap();
}

#[test]
fn test_directory_lock_is_exclusive() {
    let env = mem_env();
    let first = open(&env);

    let err = LsmStore::open(Arc::clone(&env), &dir(), StoreOptions::default(), false).unwrap_err();
    assert!(matches!(err, MvccError::Storage(_)));

    // Read-only opens take no lock
    LsmStore::open(Arc::clone(&env), &dir(), StoreOptions::default(), true).unwrap();

    first.close().unwrap();
    open(&env);
}

#[test]
fn test_drop_releases_lock() {
    let env = mem_env();
    drop(open(&env));
    open(&env);
}

#[test]
fn test_rejects_too_few_levels() {
    let options = StoreOptions {
        num_levels: 1,
        ..StoreOptions::default()
    };
    let err = LsmStore::open(mem_env(), &dir(), options, false).unwrap_err();
    assert!(matches!(err, MvccError::InvalidArgument(_)));
}

#[test]
fn test_writes_after_close_fail() {
    let env = mem_env();
    let store = open(&env);
    store.close().unwrap();

    match store.put(b"k", b"v") {
        Err(MvccError::Storage(msg)) => assert!(msg.contains("closed")),
        other => panic!("expected closed store error, got {:?}", other),
    }
    // Closing twice is harmless
    store.close().unwrap();
}

#[test]
fn test_close_reports_leaked_iterators() {
    let env = mem_env();
    let store = open(&env);
    store.put(b"k", b"v").unwrap();

    let iter = store.new_iterator(ReadOptions::default()).unwrap();
    assert_eq!(store.live_iterators(), 1);

    match store.close() {
        Err(MvccError::Storage(msg)) => assert!(msg.contains("leaked 1 iterators")),
        other => panic!("expected leak error, got {:?}", other),
    }
    drop(iter);
    assert_eq!(store.live_iterators(), 0);
}

// =============================================================================
// Flush and Compaction Tests
// =============================================================================

#[test]
fn test_flush_creates_level0_table() {
    let env = mem_env();
    let store = open(&env);
    store.put(b"a", b"1").unwrap();
    store.put(b"b", b"2").unwrap();

    store.flush().unwrap();

    let files = store.live_files_metadata();
    assert_eq!(files.len(), 1);
    assert_eq!(files[0].level, 0);
    assert_eq!(files[0].smallest_key, b"a".to_vec());
    assert_eq!(files[0].largest_key, b"b".to_vec());
    assert_eq!(store.stats().flushes, 1);
    assert_eq!(store.stats().memtable_total_size, 0);

    // Flushing an empty memtable does nothing
    store.flush().unwrap();
    assert_eq!(store.stats().flushes, 1);
}

#[test]
fn test_memtable_limit_triggers_flush() {
    let options = StoreOptions {
        memtable_size_limit: 256,
        ..StoreOptions::default()
    };
    let store = LsmStore::open(mem_env(), &dir(), options, false).unwrap();

    for i in 0..20 {
        store.put(format!("key{:02}", i).as_bytes(), &[0u8; 32]).unwrap();
    }

    assert!(store.stats().flushes > 0);
    assert_eq!(get(&store, b"key00"), Some(vec![0u8; 32]));
}

#[test]
fn test_level0_trigger_compacts_to_bottom() {
    let env = mem_env();
    let store = open(&env);

    for i in 0..4 {
        store.put(format!("key{}", i).as_bytes(), b"v").unwrap();
        store.flush().unwrap();
    }

    let files = store.live_files_metadata();
    assert!(!files.is_empty());
    assert!(files.iter().all(|f| f.level == store.num_levels() - 1));
    assert_eq!(store.stats().compactions, 1);
    assert_eq!(get(&store, b"key3"), Some(b"v".to_vec()));
}

#[test]
fn test_compact_range_drops_deleted_keys() {
    let env = mem_env();
    let store = open(&env);
    store.put(b"a", b"1").unwrap();
    store.put(b"b", b"2").unwrap();
    store.flush().unwrap();
    store.delete(b"a").unwrap();

    store
        .compact_range(&CompactRangeOptions::default(), None, None)
        .unwrap();

    let props = store.table_properties().unwrap();
    assert_eq!(props.len(), 1);
    assert_eq!(props[0].1.tombstone_count, 0);
    assert_eq!(props[0].1.entry_count, 1);
    assert_eq!(get(&store, b"a"), None);
}

#[test]
fn test_compact_range_collapses_merges() {
    let env = mem_env();
    let store = LsmStore::open(Arc::clone(&env), &dir(), merge_options(), false).unwrap();
    for part in [&b"x"[..], b"y", b"z"] {
        store.merge(b"k", &record(part)).unwrap();
        store.flush().unwrap();
    }

    store
        .compact_range(&CompactRangeOptions { exclusive: true, force_bottommost: true }, None, None)
        .unwrap();

    let props = store.table_properties().unwrap();
    assert_eq!(props.iter().map(|(_, p)| p.merge_count).sum::<u64>(), 0);
    assert_eq!(decoded_bytes(&get(&store, b"k").unwrap()), b"xyz");
}

#[test]
fn test_approximate_size() {
    let env = mem_env();
    let store = open(&env);
    store.put(b"b", &[1u8; 100]).unwrap();
    store.flush().unwrap();

    assert!(store.approximate_size(b"a", b"c") > 100);
    assert_eq!(store.approximate_size(b"x", b"z"), 0);
}

// =============================================================================
// Ingestion Tests
// =============================================================================

#[test]
fn test_ingest_into_empty_store() {
    let env = mem_env();
    let store = open(&env);
    let path = PathBuf::from("ext/1.sst");
    write_external(&env, &path, &["x", "y"], 0);

    store
        .ingest_external_files(&[path.clone()], &IngestOptions::default())
        .unwrap();

    assert_eq!(get(&store, b"x"), Some(b"ext-x".to_vec()));
    let files = store.live_files_metadata();
    assert_eq!(files.len(), 1);
    assert_eq!(files[0].level, store.num_levels() - 1);
    // Copied, not moved
    assert!(env.file_exists(&path));
}

#[test]
fn test_ingest_move_files() {
    let env = mem_env();
    let store = open(&env);
    let path = PathBuf::from("ext/1.sst");
    write_external(&env, &path, &["x"], 0);

    let options = IngestOptions {
        move_files: true,
        ..IngestOptions::default()
    };
    store.ingest_external_files(&[path.clone()], &options).unwrap();

    assert!(!env.file_exists(&path));
    assert_eq!(get(&store, b"x"), Some(b"ext-x".to_vec()));
}

#[test]
fn test_ingest_overlapping_memtable_shadows_older_writes() {
    let env = mem_env();
    let store = open(&env);
    store.put(b"x", b"old").unwrap();
    let path = PathBuf::from("ext/1.sst");
    write_external(&env, &path, &["x"], 0);

    store
        .ingest_external_files(&[path], &IngestOptions::default())
        .unwrap();

    assert_eq!(get(&store, b"x"), Some(b"ext-x".to_vec()));
    assert_eq!(store.last_sequence(), 2);
}

#[test]
fn test_ingest_requires_global_seqno_permission() {
    let env = mem_env();
    let store = open(&env);
    store.put(b"x", b"old").unwrap();
    store.flush().unwrap();
    let path = PathBuf::from("ext/1.sst");
    write_external(&env, &path, &["x"], 0);

    let options = IngestOptions {
        allow_global_seqno: false,
        ..IngestOptions::default()
    };
    let err = store.ingest_external_files(&[path], &options).unwrap_err();
    assert!(matches!(err, MvccError::InvalidArgument(_)));
    assert_eq!(get(&store, b"x"), Some(b"old".to_vec()));
}

#[test]
fn test_ingest_rejects_invalid_files() {
    let env = mem_env();
    let store = open(&env);

    let sequenced = PathBuf::from("ext/seq.sst");
    write_external(&env, &sequenced, &["x"], 7);
    match store.ingest_external_files(&[sequenced], &IngestOptions::default()) {
        Err(MvccError::InvalidArgument(msg)) => assert!(msg.contains("sequence numbers")),
        other => panic!("expected invalid argument, got {:?}", other),
    }

    let empty = PathBuf::from("ext/empty.sst");
    write_external(&env, &empty, &[], 0);
    assert!(store
        .ingest_external_files(&[empty], &IngestOptions::default())
        .is_err());

    let first = PathBuf::from("ext/1.sst");
    let second = PathBuf::from("ext/2.sst");
    write_external(&env, &first, &["a", "m"], 0);
    write_external(&env, &second, &["k", "z"], 0);
    match store.ingest_external_files(&[first, second], &IngestOptions::default()) {
        Err(MvccError::InvalidArgument(msg)) => assert!(msg.contains("overlap")),
        other => panic!("expected overlap error, got {:?}", other),
    }
    assert!(store.live_files_metadata().is_empty());
}
