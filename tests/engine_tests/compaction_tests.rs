//! Tests for segment compaction
//!
//! These tests verify:
//! - Merging keeps the newest version of each key
//! - Tombstones are dropped only when nothing older can be resurrected
//! - Invalid inputs and cancellation leave the segment set untouched
//! - Obsolete input files outlive the snapshots that still read them
//! - Background compaction once the trigger is reached

use std::path::Path;
use std::thread;
use std::time::{Duration, Instant};

use lineradb::config::Config;
use lineradb::engine::{CancellationToken, Engine};
use lineradb::error::LineraError;
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn test_config(dir: &Path) -> Config {
    Config::builder()
        .data_dir(dir)
        .background_maintenance(false)
        .build()
}

fn setup_temp_engine() -> (TempDir, Engine) {
    let temp_dir = TempDir::new().unwrap();
    let engine = Engine::open(test_config(temp_dir.path())).unwrap();
    (temp_dir, engine)
}

fn scan_all(engine: &Engine) -> Vec<(Vec<u8>, Vec<u8>)> {
    engine
        .scan(..)
        .collect::<lineradb::Result<Vec<_>>>()
        .unwrap()
}

fn segment_file(engine: &Engine, id: u64) -> std::path::PathBuf {
    engine.segment_dir().join(format!("{:020}.seg", id))
}

fn segment_file_count(engine: &Engine) -> usize {
    std::fs::read_dir(engine.segment_dir()).unwrap().count()
}

/// Put each pair, then flush them into one segment
fn flush_segment(engine: &Engine, pairs: &[(&str, Option<&str>)]) {
    for (key, value) in pairs {
        match value {
            Some(value) => engine.put(key.as_bytes(), value.as_bytes()).unwrap(),
            None => engine.delete(key.as_bytes()).unwrap(),
        }
    }
    engine.flush().unwrap();
}

// =============================================================================
// Merge Tests
// =============================================================================

#[test]
fn test_compaction_keeps_newest_version() {
    let (_temp, engine) = setup_temp_engine();

    flush_segment(&engine, &[("a", Some("1")), ("b", Some("old"))]);
    flush_segment(&engine, &[("b", Some("new")), ("c", Some("3"))]);
    assert_eq!(engine.stats().segment_count, 2);

    let output = engine.compact_all().unwrap().unwrap();

    assert_eq!(output.record_count, 3);
    assert_eq!(output.max_seq, 4);
    assert_eq!(engine.segment_ids(), vec![output.id]);
    assert_eq!(engine.get(b"b").unwrap(), Some(b"new".to_vec()));
    assert_eq!(
        scan_all(&engine),
        vec![
            (b"a".to_vec(), b"1".to_vec()),
            (b"b".to_vec(), b"new".to_vec()),
            (b"c".to_vec(), b"3".to_vec()),
        ]
    );
}

#[test]
fn test_compaction_output_level() {
    let (_temp, engine) = setup_temp_engine();

    flush_segment(&engine, &[("a", Some("1"))]);
    flush_segment(&engine, &[("b", Some("2"))]);
    let first = engine.compact_all().unwrap().unwrap();
    assert_eq!(first.level, 1);

    flush_segment(&engine, &[("c", Some("3"))]);
    assert_eq!(engine.stats().segments_per_level.get(&0), Some(&1));

    // Recompacting compacted output does not climb further
    let second = engine.compact_all().unwrap().unwrap();
    assert_eq!(second.level, 1);
    for _ in 0..3 {
        flush_segment(&engine, &[("d", Some("4"))]);
        assert_eq!(engine.compact_all().unwrap().unwrap().level, 1);
    }
    assert_eq!(engine.stats().segments_per_level.get(&1), Some(&1));
    assert_eq!(engine.stats().segments_per_level.get(&0), None);
}

#[test]
fn test_compaction_is_idempotent() {
    let (_temp, engine) = setup_temp_engine();

    flush_segment(&engine, &[("a", Some("1")), ("b", Some("2"))]);
    flush_segment(&engine, &[("a", None), ("c", Some("3"))]);

    engine.compact_all().unwrap();
    let after_first = scan_all(&engine);
    engine.compact_all().unwrap();
    let after_second = scan_all(&engine);

    assert_eq!(after_first, after_second);
    assert_eq!(engine.stats().segment_count, 1);
}

#[test]
fn test_compaction_of_subset_leaves_other_segments() {
    let (_temp, engine) = setup_temp_engine();

    flush_segment(&engine, &[("a", Some("1"))]);
    flush_segment(&engine, &[("b", Some("2"))]);
    flush_segment(&engine, &[("c", Some("3"))]);
    let ids = engine.segment_ids();
    assert_eq!(ids.len(), 3);

    // Newest two
    let output = engine.compact(&ids[..2]).unwrap().unwrap();

    let live = engine.segment_ids();
    assert_eq!(live.len(), 2);
    assert!(live.contains(&output.id));
    assert!(live.contains(&ids[2]));
    assert_eq!(scan_all(&engine).len(), 3);
}

// =============================================================================
// Tombstone Tests
// =============================================================================

#[test]
fn test_compaction_drops_tombstone_and_shadowed_value() {
    let (_temp, engine) = setup_temp_engine();

    flush_segment(&engine, &[("k", Some("old"))]);
    flush_segment(&engine, &[("k", None)]);

    // Nothing survives
    let output = engine.compact_all().unwrap();

    assert!(output.is_none());
    assert_eq!(engine.stats().segment_count, 0);
    assert_eq!(engine.get(b"k").unwrap(), None);
    assert_eq!(segment_file_count(&engine), 0);
}

#[test]
fn test_compaction_output_omits_deleted_key() {
    let (_temp, engine) = setup_temp_engine();

    flush_segment(&engine, &[("k", Some("old")), ("other", Some("v"))]);
    flush_segment(&engine, &[("k", None)]);

    let output = engine.compact_all().unwrap().unwrap();

    assert_eq!(output.record_count, 1);
    assert_eq!(engine.get(b"k").unwrap(), None);
    assert_eq!(scan_all(&engine), vec![(b"other".to_vec(), b"v".to_vec())]);
}

#[test]
fn test_compaction_keeps_tombstone_over_older_outside_segment() {
    let (_temp, engine) = setup_temp_engine();

    flush_segment(&engine, &[("a", Some("1")), ("k", Some("old"))]);
    flush_segment(&engine, &[("k", None)]);
    flush_segment(&engine, &[("z", Some("26"))]);

    let ids = engine.segment_ids(); // newest first
    let oldest = ids[2];

    // The oldest segment still holds "k" and stays out of the merge
    let output = engine.compact(&ids[..2]).unwrap().unwrap();

    assert_eq!(output.record_count, 2); // tombstone for k, plus z
    assert!(engine.segment_ids().contains(&oldest));
    assert_eq!(engine.get(b"k").unwrap(), None);

    // With every segment in the merge the tombstone can go
    let output = engine.compact_all().unwrap().unwrap();
    assert_eq!(output.record_count, 2); // a and z
    assert_eq!(engine.get(b"k").unwrap(), None);
}

#[test]
fn test_compaction_drops_tombstone_older_outside_cannot_contain() {
    let (_temp, engine) = setup_temp_engine();

    flush_segment(&engine, &[("a", Some("1")), ("b", Some("2"))]);
    flush_segment(&engine, &[("x", Some("old"))]);
    flush_segment(&engine, &[("x", None), ("y", Some("25"))]);

    let ids = engine.segment_ids();

    // The oldest segment's key range [a, b] excludes "x"
    let output = engine.compact(&ids[..2]).unwrap().unwrap();

    assert_eq!(output.record_count, 1);
    assert_eq!(engine.get(b"x").unwrap(), None);
    assert_eq!(engine.get(b"y").unwrap(), Some(b"25".to_vec()));
}

// =============================================================================
// Validation and Cancellation Tests
// =============================================================================

#[test]
fn test_compaction_rejects_unknown_segment() {
    let (_temp, engine) = setup_temp_engine();
    flush_segment(&engine, &[("a", Some("1"))]);
    let ids = engine.segment_ids();

    let err = engine.compact(&[ids[0], 999]).unwrap_err();

    assert!(matches!(err, LineraError::InvalidArgument(_)));
    assert_eq!(engine.segment_ids(), ids);
}

#[test]
fn test_compaction_rejects_empty_and_duplicate_input() {
    let (_temp, engine) = setup_temp_engine();
    flush_segment(&engine, &[("a", Some("1"))]);
    let id = engine.segment_ids()[0];

    assert!(matches!(
        engine.compact(&[]),
        Err(LineraError::InvalidArgument(_))
    ));
    assert!(matches!(
        engine.compact(&[id, id]),
        Err(LineraError::InvalidArgument(_))
    ));
}

#[test]
fn test_compact_all_with_no_segments() {
    let (_temp, engine) = setup_temp_engine();

    assert!(engine.compact_all().unwrap().is_none());
    assert_eq!(engine.stats().compactions, 0);
}

#[test]
fn test_compaction_cancelled_leaves_state_unchanged() {
    let (_temp, engine) = setup_temp_engine();

    flush_segment(&engine, &[("a", Some("1"))]);
    flush_segment(&engine, &[("b", Some("2"))]);
    let ids = engine.segment_ids();
    let files = segment_file_count(&engine);

    let token = CancellationToken::new();
    token.cancel();
    let err = engine.compact_with(&ids, &token).unwrap_err();

    assert!(matches!(err, LineraError::Cancelled));
    assert_eq!(engine.segment_ids(), ids);
    assert_eq!(segment_file_count(&engine), files);
    assert_eq!(engine.stats().compactions, 0);
    assert_eq!(engine.get(b"a").unwrap(), Some(b"1".to_vec()));
}

// =============================================================================
// Obsolete File Tests
// =============================================================================

#[test]
fn test_compaction_removes_input_files() {
    let (_temp, engine) = setup_temp_engine();

    flush_segment(&engine, &[("a", Some("1"))]);
    flush_segment(&engine, &[("b", Some("2"))]);
    let ids = engine.segment_ids();

    let output = engine.compact_all().unwrap().unwrap();

    for id in ids {
        assert!(!segment_file(&engine, id).exists());
    }
    assert!(segment_file(&engine, output.id).exists());
}

#[test]
fn test_compaction_inputs_outlive_open_scan() {
    let (_temp, engine) = setup_temp_engine();

    flush_segment(&engine, &[("a", Some("1")), ("b", Some("2"))]);
    flush_segment(&engine, &[("c", Some("3"))]);
    let ids = engine.segment_ids();

    let mut iter = engine.scan(..);
    assert_eq!(iter.next().unwrap().unwrap().0, b"a".to_vec());

    engine.compact_all().unwrap();

    // The scan still reads the old files
    for &id in &ids {
        assert!(segment_file(&engine, id).exists());
    }
    let rest: Vec<_> = iter.map(|r| r.unwrap().0).collect();
    assert_eq!(rest, vec![b"b".to_vec(), b"c".to_vec()]);

    // Iterator consumed and dropped above
    for &id in &ids {
        assert!(!segment_file(&engine, id).exists());
    }
}

// =============================================================================
// Persistence Tests
// =============================================================================

#[test]
fn test_compaction_survives_reopen() {
    let temp_dir = TempDir::new().unwrap();
    let data_dir = temp_dir.path().to_path_buf();

    let output_id = {
        let engine = Engine::open(test_config(&data_dir)).unwrap();
        flush_segment(&engine, &[("a", Some("1")), ("b", Some("old"))]);
        flush_segment(&engine, &[("b", Some("new")), ("a", None)]);
        let output = engine.compact_all().unwrap().unwrap();
        drop(engine); // No close: the manifest alone must carry the result
        output.id
    };

    let engine = Engine::open(test_config(&data_dir)).unwrap();

    assert_eq!(engine.segment_ids(), vec![output_id]);
    assert_eq!(engine.get(b"a").unwrap(), None);
    assert_eq!(engine.get(b"b").unwrap(), Some(b"new".to_vec()));

    // Fresh ids never collide with the compacted output
    flush_segment(&engine, &[("c", Some("3"))]);
    assert!(engine.segment_ids()[0] > output_id);
}

#[test]
fn test_background_compaction_on_trigger() {
    let temp_dir = TempDir::new().unwrap();
    let config = Config::builder()
        .data_dir(temp_dir.path())
        .compaction_trigger(2)
        .build();
    let engine = Engine::open(config).unwrap();

    flush_segment(&engine, &[("a", Some("1"))]);
    flush_segment(&engine, &[("b", Some("2"))]);

    let deadline = Instant::now() + Duration::from_secs(10);
    while engine.stats().compactions == 0 && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(10));
    }

    let stats = engine.stats();
    assert_eq!(stats.compactions, 1);
    assert_eq!(stats.segment_count, 1);
    assert_eq!(engine.get(b"a").unwrap(), Some(b"1".to_vec()));
    assert_eq!(engine.get(b"b").unwrap(), Some(b"2".to_vec()));
}
