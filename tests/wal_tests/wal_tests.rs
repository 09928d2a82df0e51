//! Tests for the write-ahead log
//!
//! These tests verify:
//! - Record layout and checksums
//! - Writer sequence numbering and truncation
//! - Reading entries back in order
//! - Recovery from torn and corrupted tails
//! - Verify mode (stats only, nothing modified)

use std::path::{Path, PathBuf};
use std::sync::Arc;

use mvcckv::config::WalSyncStrategy;
use mvcckv::env::{DiskEnv, Env, MemEnv};
use mvcckv::wal::{Operation, WalEntry, WalReader, WalRecovery, WalWriter, HEADER_SIZE};
use mvcckv::MvccError;
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn wal_path() -> PathBuf {
    PathBuf::from("test.wal")
}

fn put(i: usize) -> Operation {
    Operation::Put {
        key: format!("key{}", i).into_bytes(),
        value: format!("value{}", i).into_bytes(),
    }
}

/// Write `count` single-operation entries with sequences 1..=count
fn write_entries(env: &Arc<dyn Env>, path: &Path, count: usize) {
    let mut writer = WalWriter::open(Arc::clone(env), path, WalSyncStrategy::EveryWrite, 0).unwrap();
    for i in 0..count {
        writer.append(i as u64 + 1, vec![put(i)], false).unwrap();
    }
}

fn mem_env() -> Arc<dyn Env> {
    Arc::new(MemEnv::new())
}

// =============================================================================
// Entry Tests
// =============================================================================

#[test]
fn test_entry_record_layout() {
    let entry = WalEntry::new(7, vec![put(0)]);
    let record = entry.serialize().unwrap();

    assert_eq!(&record[0..8], &7u64.to_le_bytes());
    let len = u32::from_le_bytes([record[12], record[13], record[14], record[15]]) as usize;
    assert_eq!(record.len(), HEADER_SIZE + len);

    let crc = u32::from_le_bytes([record[8], record[9], record[10], record[11]]);
    assert_eq!(crc, WalEntry::compute_crc(&record[HEADER_SIZE..]));
}

#[test]
fn test_entry_last_lsn() {
    let entry = WalEntry::new(10, vec![put(0), put(1), put(2)]);
    assert_eq!(entry.last_lsn(), 12);

    let empty = WalEntry::new(10, Vec::new());
    assert_eq!(empty.last_lsn(), 10);
}

#[test]
fn test_entry_deserialize_garbage_is_corruption() {
    let err = WalEntry::deserialize(&[0xff; 3]).unwrap_err();
    assert!(matches!(err, MvccError::WalCorruption(_)));
}

// =============================================================================
// Writer Tests
// =============================================================================

#[test]
fn test_writer_tracks_lsn() {
    let env = mem_env();
    let mut writer = WalWriter::open(Arc::clone(&env), &wal_path(), WalSyncStrategy::EveryWrite, 4).unwrap();
    assert_eq!(writer.current_lsn(), 4);

    let last = writer
        .append(5, vec![put(0), Operation::Delete { key: b"key0".to_vec() }], false)
        .unwrap();
    assert_eq!(last, 6);
    assert_eq!(writer.current_lsn(), 6);
}

#[test]
fn test_writer_appends_after_existing_entries() {
    let env = mem_env();
    write_entries(&env, &wal_path(), 2);

    let mut writer = WalWriter::open(Arc::clone(&env), &wal_path(), WalSyncStrategy::EveryWrite, 2).unwrap();
    writer.append(3, vec![put(2)], false).unwrap();

    let entries: Vec<WalEntry> = WalReader::open(env.as_ref(), &wal_path())
        .unwrap()
        .entries()
        .collect::<Result<_, _>>()
        .unwrap();
    let lsns: Vec<u64> = entries.iter().map(|e| e.lsn).collect();
    assert_eq!(lsns, vec![1, 2, 3]);
}

#[test]
fn test_writer_truncate_discards_entries() {
    let env = mem_env();
    let mut writer = WalWriter::open(Arc::clone(&env), &wal_path(), WalSyncStrategy::EveryWrite, 0).unwrap();
    writer.append(1, vec![put(0)], false).unwrap();

    writer.truncate().unwrap();

    assert_eq!(env.file_size(&wal_path()).unwrap(), 0);
    assert_eq!(writer.current_lsn(), 1);
}

#[test]
fn test_writer_batched_sync_strategy() {
    let env = mem_env();
    let strategy = WalSyncStrategy::EveryNEntries { count: 3 };
    let mut writer = WalWriter::open(Arc::clone(&env), &wal_path(), strategy, 0).unwrap();
    for i in 0..5 {
        writer.append(i as u64 + 1, vec![put(i)], false).unwrap();
    }
    writer.sync().unwrap();

    let result = WalRecovery::verify(env.as_ref(), &wal_path()).unwrap();
    assert_eq!(result.entries_recovered, 5);
}

// =============================================================================
// Reader Tests
// =============================================================================

#[test]
fn test_reader_returns_entries_in_order() {
    let env = mem_env();
    write_entries(&env, &wal_path(), 3);

    let mut reader = WalReader::open(env.as_ref(), &wal_path()).unwrap();
    for i in 0..3 {
        let entry = reader.next_entry().unwrap().unwrap();
        assert_eq!(entry.lsn, i as u64 + 1);
        assert_eq!(entry.operations, vec![put(i)]);
    }
    assert!(reader.next_entry().unwrap().is_none());
}

#[test]
fn test_reader_detects_torn_header() {
    let env = mem_env();
    write_entries(&env, &wal_path(), 1);
    let mut data = env.read_file(&wal_path()).unwrap().to_vec();
    data.extend_from_slice(&[1, 2, 3]);
    env.write_file(&wal_path(), &data).unwrap();

    let mut reader = WalReader::open(env.as_ref(), &wal_path()).unwrap();
    assert!(reader.next_entry().unwrap().is_some());
    assert!(matches!(reader.next_entry(), Err(MvccError::WalCorruption(_))));
}

#[test]
fn test_reader_detects_checksum_mismatch() {
    let env = mem_env();
    write_entries(&env, &wal_path(), 1);
    let mut data = env.read_file(&wal_path()).unwrap().to_vec();
    let last = data.len() - 1;
    data[last] ^= 0xff;
    env.write_file(&wal_path(), &data).unwrap();

    let mut reader = WalReader::open(env.as_ref(), &wal_path()).unwrap();
    match reader.next_entry() {
        Err(MvccError::WalCorruption(msg)) => assert!(msg.contains("checksum")),
        other => panic!("expected checksum error, got {:?}", other),
    }
    assert_eq!(reader.position(), 0);
}

// =============================================================================
// Recovery Tests
// =============================================================================

#[test]
fn test_recover_missing_file() {
    let env = mem_env();
    let (entries, result) = WalRecovery::recover(env.as_ref(), &wal_path(), true).unwrap();
    assert!(entries.is_empty());
    assert_eq!(result.entries_recovered, 0);
    assert!(!result.was_truncated);
}

#[test]
fn test_recover_clean_wal() {
    let env = mem_env();
    write_entries(&env, &wal_path(), 5);

    let (entries, result) = WalRecovery::recover(env.as_ref(), &wal_path(), true).unwrap();

    assert_eq!(entries.len(), 5);
    assert_eq!(result.entries_recovered, 5);
    assert_eq!(result.entries_corrupted, 0);
    assert_eq!(result.last_lsn, 5);
    assert!(!result.was_truncated);
}

#[test]
fn test_recover_truncates_partial_write() {
    let env = mem_env();
    write_entries(&env, &wal_path(), 3);
    let clean_len = env.file_size(&wal_path()).unwrap();

    // Half of a fourth record
    let record = WalEntry::new(4, vec![put(3)]).serialize().unwrap();
    let mut data = env.read_file(&wal_path()).unwrap().to_vec();
    data.extend_from_slice(&record[..record.len() / 2]);
    env.write_file(&wal_path(), &data).unwrap();

    let (entries, result) = WalRecovery::recover(env.as_ref(), &wal_path(), true).unwrap();

    assert_eq!(entries.len(), 3);
    assert_eq!(result.entries_corrupted, 1);
    assert_eq!(result.last_lsn, 3);
    assert!(result.was_truncated);
    assert_eq!(env.file_size(&wal_path()).unwrap(), clean_len);
}

#[test]
fn test_recover_without_truncate_leaves_file() {
    let env = mem_env();
    write_entries(&env, &wal_path(), 2);
    let mut data = env.read_file(&wal_path()).unwrap().to_vec();
    data.extend_from_slice(&[0u8; 5]);
    env.write_file(&wal_path(), &data).unwrap();
    let len = data.len() as u64;

    let (entries, result) = WalRecovery::recover(env.as_ref(), &wal_path(), false).unwrap();

    assert_eq!(entries.len(), 2);
    assert!(!result.was_truncated);
    assert_eq!(env.file_size(&wal_path()).unwrap(), len);
}

#[test]
fn test_recover_stops_at_corrupted_middle_entry() {
    let env = mem_env();
    let first = WalEntry::new(1, vec![put(0)]).serialize().unwrap();
    let mut second = WalEntry::new(2, vec![put(1)]).serialize().unwrap();
    let third = WalEntry::new(3, vec![put(2)]).serialize().unwrap();
    let last = second.len() - 1;
    second[last] ^= 0x01;

    let mut data = first.clone();
    data.extend_from_slice(&second);
    data.extend_from_slice(&third);
    env.write_file(&wal_path(), &data).unwrap();

    let (entries, result) = WalRecovery::recover(env.as_ref(), &wal_path(), true).unwrap();

    assert_eq!(entries.len(), 1);
    assert_eq!(result.last_lsn, 1);
    assert_eq!(env.file_size(&wal_path()).unwrap(), first.len() as u64);
}

#[test]
fn test_verify_does_not_modify() {
    let env = mem_env();
    write_entries(&env, &wal_path(), 2);
    let mut data = env.read_file(&wal_path()).unwrap().to_vec();
    data.extend_from_slice(&[9u8; 4]);
    env.write_file(&wal_path(), &data).unwrap();

    let result = WalRecovery::verify(env.as_ref(), &wal_path()).unwrap();

    assert_eq!(result.entries_recovered, 2);
    assert_eq!(result.entries_corrupted, 1);
    assert_eq!(env.file_size(&wal_path()).unwrap(), data.len() as u64);
}

#[test]
fn test_recover_on_disk() {
    let temp_dir = TempDir::new().unwrap();
    let env: Arc<dyn Env> = Arc::new(DiskEnv::new());
    let path = temp_dir.path().join("wal.log");
    write_entries(&env, &path, 4);

    let (entries, result) = WalRecovery::recover(env.as_ref(), &path, true).unwrap();

    assert_eq!(entries.len(), 4);
    assert_eq!(result.last_lsn, 4);
}
