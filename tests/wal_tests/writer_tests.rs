//! Tests for WAL Writer
//!
//! These tests verify:
//! - Appending records and the positions returned
//! - Reopening an existing file continues at its end
//! - Integration with reader

use std::path::PathBuf;

use lineradb::record::Record;
use lineradb::wal::{LogFrame, LogPosition, WalReader, WalWriter};
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn setup_temp_wal() -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().unwrap();
    let wal_path = temp_dir.path().join("test.log");
    (temp_dir, wal_path)
}

fn read_all(path: &PathBuf) -> Vec<Record> {
    WalReader::open(path)
        .unwrap()
        .records()
        .collect::<lineradb::Result<Vec<_>>>()
        .unwrap()
}

// =============================================================================
// Basic Writing Tests
// =============================================================================

#[test]
fn test_write_single_record() {
    let (_temp, wal_path) = setup_temp_wal();

    let mut writer = WalWriter::open(&wal_path, 1).unwrap();
    let position = writer.append(&Record::put("key1", "value1", 1)).unwrap();

    assert_eq!(position, LogPosition::new(1, 0));
    let frame_len = LogFrame::new(Record::put("key1", "value1", 1)).frame_len() as u64;
    assert_eq!(writer.position(), LogPosition::new(1, frame_len));
}

#[test]
fn test_positions_advance_by_frame_length() {
    let (_temp, wal_path) = setup_temp_wal();
    let mut writer = WalWriter::open(&wal_path, 7).unwrap();

    let records = vec![
        Record::put("a", "1", 1),
        Record::put("bb", "22", 2),
        Record::tombstone("a", 3),
    ];

    let mut expected = 0u64;
    for record in &records {
        let position = writer.append(record).unwrap();
        assert_eq!(position, LogPosition::new(7, expected));
        expected += LogFrame::new(record.clone()).frame_len() as u64;
    }

    assert_eq!(std::fs::metadata(&wal_path).unwrap().len(), expected);
}

#[test]
fn test_write_and_read_back() {
    let (_temp, wal_path) = setup_temp_wal();

    {
        let mut writer = WalWriter::open(&wal_path, 1).unwrap();
        for i in 0..100u64 {
            writer
                .append(&Record::put(format!("key{}", i), format!("val{}", i), i + 1))
                .unwrap();
        }
    }

    let records = read_all(&wal_path);
    assert_eq!(records.len(), 100);
    for (i, record) in records.iter().enumerate() {
        assert_eq!(record.key, format!("key{}", i).into_bytes());
        assert_eq!(record.seq, i as u64 + 1);
    }
}

// =============================================================================
// Reopen Tests
// =============================================================================

#[test]
fn test_reopen_appends_at_end() {
    let (_temp, wal_path) = setup_temp_wal();

    {
        let mut writer = WalWriter::open(&wal_path, 1).unwrap();
        writer.append(&Record::put("a", "1", 1)).unwrap();
    }

    let end = std::fs::metadata(&wal_path).unwrap().len();
    {
        let mut writer = WalWriter::open(&wal_path, 1).unwrap();
        assert_eq!(writer.position().offset, end);
        writer.append(&Record::put("b", "2", 2)).unwrap();
    }

    let keys: Vec<Vec<u8>> = read_all(&wal_path).into_iter().map(|r| r.key).collect();
    assert_eq!(keys, vec![b"a".to_vec(), b"b".to_vec()]);
}

#[test]
fn test_sync_and_accessors() {
    let (_temp, wal_path) = setup_temp_wal();
    let mut writer = WalWriter::open(&wal_path, 3).unwrap();

    writer.append(&Record::tombstone("k", 9)).unwrap();
    writer.sync().unwrap();

    assert_eq!(writer.file_id(), 3);
    assert_eq!(writer.path(), wal_path.as_path());
}
