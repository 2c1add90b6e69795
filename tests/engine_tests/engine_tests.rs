//! Tests for Engine
//!
//! These tests verify:
//! - Basic get/put/delete operations and write batches
//! - Ordered scans and snapshot isolation
//! - Flush to segments (manual and size-triggered)
//! - Crash recovery from the WAL
//! - Orphan cleanup and engine lifecycle (open/close)
//! - Concurrent access patterns

use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use lineradb::config::Config;
use lineradb::engine::{Engine, WriteBatch};
use lineradb::error::LineraError;
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

/// Config with maintenance inline, so flushes happen deterministically
fn test_config(dir: &Path) -> Config {
    Config::builder()
        .data_dir(dir)
        .background_maintenance(false)
        .memtable_size_limit(1024 * 1024) // 1 MB
        .build()
}

fn setup_temp_engine() -> (TempDir, Engine) {
    let temp_dir = TempDir::new().unwrap();
    let engine = Engine::open(test_config(temp_dir.path())).unwrap();
    (temp_dir, engine)
}

fn setup_temp_engine_with_small_memtable() -> (TempDir, Engine) {
    let temp_dir = TempDir::new().unwrap();
    let config = Config::builder()
        .data_dir(temp_dir.path())
        .background_maintenance(false)
        .memtable_size_limit(200) // Very small to trigger flushes
        .build();
    let engine = Engine::open(config).unwrap();
    (temp_dir, engine)
}

fn scan_all(engine: &Engine) -> Vec<(Vec<u8>, Vec<u8>)> {
    engine
        .scan(..)
        .collect::<lineradb::Result<Vec<_>>>()
        .unwrap()
}

fn pair(key: &str, value: &str) -> (Vec<u8>, Vec<u8>) {
    (key.as_bytes().to_vec(), value.as_bytes().to_vec())
}

fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(10));
    }
    condition()
}

// =============================================================================
// Basic Operations Tests
// =============================================================================

#[test]
fn test_engine_open_creates_directories() {
    let temp_dir = TempDir::new().unwrap();
    let data_dir = temp_dir.path().join("mydb");

    let _engine = Engine::open(test_config(&data_dir)).unwrap();

    assert!(data_dir.exists());
    assert!(data_dir.join("segments").is_dir());
    assert!(data_dir.join("wal").is_dir());
    assert!(data_dir.join("MANIFEST").is_file());
}

#[test]
fn test_engine_put_get() {
    let (_temp, engine) = setup_temp_engine();

    engine.put(b"hello", b"world").unwrap();
    let result = engine.get(b"hello").unwrap();

    assert_eq!(result, Some(b"world".to_vec()));
}

#[test]
fn test_engine_get_nonexistent_key() {
    let (_temp, engine) = setup_temp_engine();

    assert_eq!(engine.get(b"nonexistent").unwrap(), None);
}

#[test]
fn test_engine_put_overwrite() {
    let (_temp, engine) = setup_temp_engine();

    engine.put(b"key", b"value1").unwrap();
    engine.put(b"key", b"value2").unwrap();

    assert_eq!(engine.get(b"key").unwrap(), Some(b"value2".to_vec()));
}

#[test]
fn test_engine_delete() {
    let (_temp, engine) = setup_temp_engine();

    engine.put(b"key", b"value").unwrap();
    assert_eq!(engine.get(b"key").unwrap(), Some(b"value".to_vec()));

    engine.delete(b"key").unwrap();
    assert_eq!(engine.get(b"key").unwrap(), None);
}

#[test]
fn test_engine_delete_nonexistent_key() {
    let (_temp, engine) = setup_temp_engine();

    // Should not error
    engine.delete(b"nonexistent").unwrap();
    assert_eq!(engine.get(b"nonexistent").unwrap(), None);
}

#[test]
fn test_engine_empty_key_and_value() {
    let (_temp, engine) = setup_temp_engine();

    engine.put(b"", b"").unwrap();
    assert_eq!(engine.get(b"").unwrap(), Some(Vec::new()));
}

#[test]
fn test_engine_rejects_oversize_key_and_value() {
    let temp_dir = TempDir::new().unwrap();
    let config = Config::builder()
        .data_dir(temp_dir.path())
        .background_maintenance(false)
        .max_key_size(8)
        .max_value_size(16)
        .build();
    let engine = Engine::open(config).unwrap();

    let err = engine.put(b"way-too-long-key", b"v").unwrap_err();
    assert!(matches!(err, LineraError::InvalidArgument(_)));

    let err = engine.put(b"k", &[0u8; 17]).unwrap_err();
    assert!(matches!(err, LineraError::InvalidArgument(_)));

    // Nothing was written
    assert_eq!(engine.stats().last_seq, 0);
}

#[test]
fn test_engine_open_rejects_invalid_config() {
    let temp_dir = TempDir::new().unwrap();
    let config = Config::builder()
        .data_dir(temp_dir.path())
        .segment_index_interval(0)
        .build();

    assert!(matches!(Engine::open(config), Err(LineraError::Config(_))));
}

#[test]
fn test_engine_write_batch() {
    let (_temp, engine) = setup_temp_engine();
    engine.put(b"old", b"x").unwrap();

    let mut batch = WriteBatch::new();
    batch.put("a", "1").put("b", "2").delete("old").put("a", "3");
    assert_eq!(batch.len(), 4);
    engine.write_batch(batch).unwrap();

    assert_eq!(engine.get(b"a").unwrap(), Some(b"3".to_vec()));
    assert_eq!(engine.get(b"b").unwrap(), Some(b"2".to_vec()));
    assert_eq!(engine.get(b"old").unwrap(), None);
    assert_eq!(engine.stats().last_seq, 5);
}

#[test]
fn test_engine_write_batch_validates_before_writing() {
    let temp_dir = TempDir::new().unwrap();
    let config = Config::builder()
        .data_dir(temp_dir.path())
        .background_maintenance(false)
        .max_value_size(4)
        .build();
    let engine = Engine::open(config).unwrap();

    let mut batch = WriteBatch::new();
    batch.put("a", "1").put("b", "too large");
    assert!(engine.write_batch(batch).is_err());

    assert_eq!(engine.get(b"a").unwrap(), None);
}

// =============================================================================
// Scan Tests
// =============================================================================

#[test]
fn test_engine_scan_delete_flush_scenario() {
    let (_temp, engine) = setup_temp_engine();

    engine.put(b"a", b"1").unwrap();
    engine.put(b"b", b"2").unwrap();
    engine.delete(b"a").unwrap();
    engine.flush().unwrap();

    assert_eq!(engine.get(b"a").unwrap(), None);
    let results: Vec<_> = engine
        .scan(b"a".to_vec()..=b"z".to_vec())
        .collect::<lineradb::Result<Vec<_>>>()
        .unwrap();
    assert_eq!(results, vec![pair("b", "2")]);
}

#[test]
fn test_engine_scan_merges_memtable_and_segments() {
    let (_temp, engine) = setup_temp_engine();

    engine.put(b"a", b"seg").unwrap();
    engine.put(b"c", b"seg").unwrap();
    engine.flush().unwrap();
    engine.put(b"b", b"mem").unwrap();
    engine.put(b"c", b"mem").unwrap();

    assert_eq!(
        scan_all(&engine),
        vec![pair("a", "seg"), pair("b", "mem"), pair("c", "mem")]
    );
}

#[test]
fn test_engine_scan_bounds() {
    let (_temp, engine) = setup_temp_engine();
    for key in ["a", "b", "c", "d", "e"] {
        engine.put(key.as_bytes(), b"v").unwrap();
    }

    let keys = |results: Vec<(Vec<u8>, Vec<u8>)>| -> Vec<Vec<u8>> {
        results.into_iter().map(|(k, _)| k).collect()
    };

    let half_open: Vec<_> = engine
        .scan(b"b".to_vec()..b"d".to_vec())
        .map(|r| r.unwrap())
        .collect();
    assert_eq!(keys(half_open), vec![b"b".to_vec(), b"c".to_vec()]);

    let from: Vec<_> = engine.scan(b"d".to_vec()..).map(|r| r.unwrap()).collect();
    assert_eq!(keys(from), vec![b"d".to_vec(), b"e".to_vec()]);

    let empty: Vec<_> = engine
        .scan(b"x".to_vec()..=b"z".to_vec())
        .map(|r| r.unwrap())
        .collect();
    assert!(empty.is_empty());
}

#[test]
fn test_engine_scan_snapshot_isolation() {
    let (_temp, engine) = setup_temp_engine();
    engine.put(b"a", b"1").unwrap();
    engine.put(b"c", b"3").unwrap();

    let mut iter = engine.scan(..);
    assert_eq!(iter.next().unwrap().unwrap(), pair("a", "1"));

    // Writes and a flush after the scan started are invisible to it
    engine.put(b"b", b"2").unwrap();
    engine.put(b"c", b"changed").unwrap();
    engine.flush().unwrap();

    assert_eq!(iter.next().unwrap().unwrap(), pair("c", "3"));
    assert!(iter.next().is_none());

    // A new scan sees everything
    assert_eq!(
        scan_all(&engine),
        vec![pair("a", "1"), pair("b", "2"), pair("c", "changed")]
    );
}

#[test]
fn test_engine_snapshot_get_is_stable() {
    let (_temp, engine) = setup_temp_engine();
    engine.put(b"key", b"before").unwrap();

    let snapshot = engine.snapshot();
    engine.put(b"key", b"after").unwrap();
    engine.delete(b"other").unwrap();

    assert_eq!(snapshot.get(b"key").unwrap(), Some(b"before".to_vec()));
    assert_eq!(engine.get(b"key").unwrap(), Some(b"after".to_vec()));
}

// =============================================================================
// Flush Tests
// =============================================================================

#[test]
fn test_engine_manual_flush() {
    let (_temp, engine) = setup_temp_engine();

    engine.put(b"key", b"value").unwrap();
    assert_eq!(engine.stats().memtable_entries, 1);
    assert_eq!(engine.stats().segment_count, 0);

    engine.flush().unwrap();

    let stats = engine.stats();
    assert_eq!(stats.memtable_entries, 0);
    assert_eq!(stats.segment_count, 1);
    assert_eq!(stats.flushes, 1);

    // Data should still be accessible from the segment
    assert_eq!(engine.get(b"key").unwrap(), Some(b"value".to_vec()));
}

#[test]
fn test_engine_flush_writes_newest_version_only() {
    let (_temp, engine) = setup_temp_engine();

    engine.put(b"key", b"v1").unwrap();
    engine.put(b"key", b"v2").unwrap();
    engine.put(b"key", b"v3").unwrap();
    engine.flush().unwrap();

    let segments = engine.segments();
    assert_eq!(segments.len(), 1);
    assert_eq!(segments[0].record_count, 1);
    assert_eq!(segments[0].max_seq, 3);
    assert_eq!(engine.get(b"key").unwrap(), Some(b"v3".to_vec()));
}

#[test]
fn test_engine_flush_empty_memtable() {
    let (_temp, engine) = setup_temp_engine();

    // Flushing empty memtable should be a no-op
    engine.flush().unwrap();
    assert_eq!(engine.stats().segment_count, 0);
}

#[test]
fn test_engine_flush_removes_old_wal_files() {
    let (_temp, engine) = setup_temp_engine();

    engine.put(b"a", b"1").unwrap();
    engine.flush().unwrap();
    engine.put(b"b", b"2").unwrap();
    engine.flush().unwrap();

    let wal_files = std::fs::read_dir(engine.wal_dir()).unwrap().count();
    assert_eq!(wal_files, 1);
}

#[test]
fn test_engine_auto_flush_on_size_limit() {
    let (_temp, engine) = setup_temp_engine_with_small_memtable();

    // Each put charges well over 50 bytes; the limit is 200
    for i in 0..10 {
        let key = format!("key{:02}", i);
        let value = format!("value_that_is_definitely_long_enough_{:02}", i);
        engine.put(key.as_bytes(), value.as_bytes()).unwrap();
    }

    let stats = engine.stats();
    assert!(
        stats.segment_count >= 1,
        "Expected at least 1 segment after exceeding memtable limit, got {}",
        stats.segment_count
    );
    assert_eq!(stats.frozen_memtables, 0);

    for i in 0..10 {
        let key = format!("key{:02}", i);
        assert!(
            engine.get(key.as_bytes()).unwrap().is_some(),
            "Key {} should exist",
            key
        );
    }
}

#[test]
fn test_engine_delete_shadows_flushed_value() {
    let (_temp, engine) = setup_temp_engine();

    engine.put(b"key", b"value").unwrap();
    engine.flush().unwrap();
    engine.delete(b"key").unwrap();

    assert_eq!(engine.get(b"key").unwrap(), None);
    engine.flush().unwrap();
    assert_eq!(engine.get(b"key").unwrap(), None);
    assert!(scan_all(&engine).is_empty());
}

#[test]
fn test_engine_background_flush() {
    let temp_dir = TempDir::new().unwrap();
    let config = Config::builder()
        .data_dir(temp_dir.path())
        .memtable_size_limit(512)
        .compaction_trigger(1000)
        .build();
    let engine = Engine::open(config).unwrap();

    for i in 0..100 {
        engine
            .put(format!("key{:03}", i).as_bytes(), &[b'x'; 64])
            .unwrap();
    }

    assert!(wait_until(Duration::from_secs(10), || {
        let stats = engine.stats();
        stats.flushes > 0 && stats.frozen_memtables == 0
    }));
    for i in 0..100 {
        assert!(engine.get(format!("key{:03}", i).as_bytes()).unwrap().is_some());
    }
}

// =============================================================================
// Crash Recovery Tests
// =============================================================================

#[test]
fn test_engine_recovery_from_wal() {
    let temp_dir = TempDir::new().unwrap();
    let data_dir = temp_dir.path().to_path_buf();

    // First engine - write data, don't flush (simulating crash)
    {
        let engine = Engine::open(test_config(&data_dir)).unwrap();

        engine.put(b"key1", b"value1").unwrap();
        engine.put(b"key2", b"value2").unwrap();
        engine.delete(b"key1").unwrap();
        engine.put(b"key3", b"value3").unwrap();

        // Don't call close() - data is only in the WAL
        drop(engine);
    }

    // Second engine - should recover from WAL
    let engine = Engine::open(test_config(&data_dir)).unwrap();

    assert_eq!(engine.stats().segment_count, 0);
    assert_eq!(engine.get(b"key1").unwrap(), None); // Was deleted
    assert_eq!(engine.get(b"key2").unwrap(), Some(b"value2".to_vec()));
    assert_eq!(engine.get(b"key3").unwrap(), Some(b"value3".to_vec()));
    assert_eq!(engine.stats().last_seq, 4);
}

#[test]
fn test_engine_recovery_after_flush() {
    let temp_dir = TempDir::new().unwrap();
    let data_dir = temp_dir.path().to_path_buf();

    {
        let engine = Engine::open(test_config(&data_dir)).unwrap();
        engine.put(b"flushed", b"1").unwrap();
        engine.put(b"both", b"old").unwrap();
        engine.flush().unwrap();
        engine.put(b"unflushed", b"2").unwrap();
        engine.put(b"both", b"new").unwrap();
        drop(engine);
    }

    let engine = Engine::open(test_config(&data_dir)).unwrap();

    assert_eq!(engine.stats().segment_count, 1);
    assert_eq!(engine.stats().memtable_entries, 2);
    assert_eq!(engine.get(b"flushed").unwrap(), Some(b"1".to_vec()));
    assert_eq!(engine.get(b"unflushed").unwrap(), Some(b"2".to_vec()));
    assert_eq!(engine.get(b"both").unwrap(), Some(b"new".to_vec()));
}

#[test]
fn test_engine_sequence_continues_after_reopen() {
    let temp_dir = TempDir::new().unwrap();
    let data_dir = temp_dir.path().to_path_buf();

    {
        let engine = Engine::open(test_config(&data_dir)).unwrap();
        engine.put(b"k", b"v1").unwrap();
        engine.put(b"k", b"v2").unwrap();
        engine.flush().unwrap();
    }

    let engine = Engine::open(test_config(&data_dir)).unwrap();
    assert_eq!(engine.stats().last_seq, 2);

    // A newer write must win over the flushed version
    engine.put(b"k", b"v3").unwrap();
    assert_eq!(engine.stats().last_seq, 3);
    engine.flush().unwrap();
    assert_eq!(engine.get(b"k").unwrap(), Some(b"v3".to_vec()));
}

#[test]
fn test_engine_no_data_loss_after_repeated_crashes() {
    let temp_dir = TempDir::new().unwrap();
    let data_dir = temp_dir.path().to_path_buf();

    for round in 0..3 {
        let engine = Engine::open(test_config(&data_dir)).unwrap();
        for previous in 0..round {
            let key = format!("key{}", previous);
            assert_eq!(
                engine.get(key.as_bytes()).unwrap(),
                Some(format!("value{}", previous).into_bytes())
            );
        }
        engine
            .put(format!("key{}", round).as_bytes(), format!("value{}", round).as_bytes())
            .unwrap();
        drop(engine); // Crash
    }
}

#[test]
fn test_engine_recovery_ignores_torn_wal_tail() {
    let temp_dir = TempDir::new().unwrap();
    let data_dir = temp_dir.path().to_path_buf();

    let wal_dir = {
        let engine = Engine::open(test_config(&data_dir)).unwrap();
        engine.put(b"a", b"1").unwrap();
        engine.put(b"b", b"2").unwrap();
        engine.put(b"c", b"3").unwrap();
        engine.wal_dir()
    };

    // Simulate a crash mid-append: half a frame at the end of the log
    let newest = std::fs::read_dir(&wal_dir)
        .unwrap()
        .map(|e| e.unwrap().path())
        .max()
        .unwrap();
    let mut file = OpenOptions::new().append(true).open(&newest).unwrap();
    file.write_all(&[0x10, 0x20, 0x30, 0x40, 0x30, 0x00, 0x00, 0x00, 0x01])
        .unwrap();
    drop(file);

    let engine = Engine::open(test_config(&data_dir)).unwrap();
    assert_eq!(
        scan_all(&engine),
        vec![pair("a", "1"), pair("b", "2"), pair("c", "3")]
    );
}

#[test]
fn test_engine_removes_orphan_segments_on_open() {
    let temp_dir = TempDir::new().unwrap();
    let data_dir = temp_dir.path().to_path_buf();

    {
        let engine = Engine::open(test_config(&data_dir)).unwrap();
        engine.put(b"key", b"value").unwrap();
        engine.flush().unwrap();
    }

    // A segment that was written but never committed
    let orphan = data_dir.join("segments").join("00000000000000000999.seg");
    std::fs::write(&orphan, b"never committed").unwrap();
    let partial = data_dir.join("segments").join("00000000000000001000.seg.tmp");
    std::fs::write(&partial, b"interrupted").unwrap();

    let engine = Engine::open(test_config(&data_dir)).unwrap();

    assert!(!orphan.exists());
    assert!(!partial.exists());
    assert_eq!(engine.stats().segment_count, 1);
    assert_eq!(engine.get(b"key").unwrap(), Some(b"value".to_vec()));
}

// =============================================================================
// Close/Lifecycle Tests
// =============================================================================

#[test]
fn test_engine_close_flushes_data() {
    let temp_dir = TempDir::new().unwrap();
    let data_dir = temp_dir.path().to_path_buf();

    // Write data and close gracefully
    {
        let engine = Engine::open(test_config(&data_dir)).unwrap();
        engine.put(b"key", b"value").unwrap();
        engine.close().unwrap();
    }

    // Reopen - data should be in a segment, nothing left to replay
    let engine = Engine::open(test_config(&data_dir)).unwrap();

    assert_eq!(engine.get(b"key").unwrap(), Some(b"value".to_vec()));
    assert_eq!(engine.stats().segment_count, 1);
    assert_eq!(engine.stats().memtable_entries, 0);
}

#[test]
fn test_engine_close_with_background_worker() {
    let temp_dir = TempDir::new().unwrap();
    let data_dir = temp_dir.path().to_path_buf();

    {
        let engine = Engine::open_path(&data_dir).unwrap();
        engine.put(b"key", b"value").unwrap();
        engine.close().unwrap();
    }

    let engine = Engine::open_path(&data_dir).unwrap();
    assert_eq!(engine.get(b"key").unwrap(), Some(b"value".to_vec()));
}

#[test]
fn test_engine_open_path_convenience() {
    let temp_dir = TempDir::new().unwrap();

    let engine = Engine::open_path(temp_dir.path()).unwrap();

    engine.put(b"key", b"value").unwrap();
    assert_eq!(engine.get(b"key").unwrap(), Some(b"value".to_vec()));
}

// =============================================================================
// Accessor Tests
// =============================================================================

#[test]
fn test_engine_accessors() {
    let temp_dir = TempDir::new().unwrap();
    let data_dir = temp_dir.path().to_path_buf();

    let config = Config::builder()
        .data_dir(&data_dir)
        .background_maintenance(false)
        .memtable_size_limit(1024)
        .build();
    let engine = Engine::open(config).unwrap();

    assert_eq!(engine.data_dir(), data_dir.as_path());
    assert_eq!(engine.segment_dir(), data_dir.join("segments").as_path());
    assert_eq!(engine.wal_dir(), data_dir.join("wal"));
    assert_eq!(engine.config().memtable_size_limit, 1024);
    assert!(!engine.is_read_only());

    let stats = engine.stats();
    assert_eq!(stats.memtable_bytes, 0);
    assert_eq!(stats.memtable_entries, 0);
    assert_eq!(stats.segment_count, 0);
}

#[test]
fn test_engine_stats_track_writes() {
    let (_temp, engine) = setup_temp_engine();

    engine.put(b"a", b"1").unwrap();
    engine.delete(b"a").unwrap();

    let stats = engine.stats();
    assert_eq!(stats.writes, 2);
    assert_eq!(stats.last_seq, 2);
    assert_eq!(stats.visible_seq, 2);
    assert!(stats.memtable_bytes > 0);
}

#[test]
fn test_engine_wal_position_advances() {
    let (_temp, engine) = setup_temp_engine();
    let before = engine.wal_position();

    engine.put(b"key", b"value").unwrap();

    assert!(engine.wal_position() > before);
}

// =============================================================================
// Concurrent Access Tests
// =============================================================================

#[test]
fn test_engine_concurrent_reads() {
    let (_temp, engine) = setup_temp_engine();
    let engine = Arc::new(engine);

    // Pre-populate data
    for i in 0..100 {
        engine
            .put(format!("key{}", i).as_bytes(), format!("value{}", i).as_bytes())
            .unwrap();
    }

    let mut handles = vec![];
    for _ in 0..4 {
        let engine = Arc::clone(&engine);
        handles.push(thread::spawn(move || {
            for i in 0..100 {
                let value = engine.get(format!("key{}", i).as_bytes()).unwrap();
                assert_eq!(value, Some(format!("value{}", i).into_bytes()));
            }
        }));
    }

    for handle in handles {
        handle.join().unwrap();
    }
}

#[test]
fn test_engine_concurrent_writers_and_readers() {
    let temp_dir = TempDir::new().unwrap();
    let config = Config::builder()
        .data_dir(temp_dir.path())
        .memtable_size_limit(4 * 1024)
        .build();
    let engine = Arc::new(Engine::open(config).unwrap());

    let writers: Vec<_> = (0..4)
        .map(|w| {
            let engine = Arc::clone(&engine);
            thread::spawn(move || {
                for i in 0..100 {
                    let key = format!("w{}-key{:03}", w, i);
                    engine.put(key.as_bytes(), key.as_bytes()).unwrap();
                }
            })
        })
        .collect();

    let readers: Vec<_> = (0..2)
        .map(|_| {
            let engine = Arc::clone(&engine);
            thread::spawn(move || {
                for _ in 0..20 {
                    // Every visible key carries its own name as value
                    for item in engine.scan(..) {
                        let (key, value) = item.unwrap();
                        assert_eq!(key, value);
                    }
                }
            })
        })
        .collect();

    for handle in writers.into_iter().chain(readers) {
        handle.join().unwrap();
    }

    assert_eq!(scan_all(&engine).len(), 400);
    assert_eq!(engine.stats().last_seq, 400);
}
