//! Manifest
//!
//! Durable record of which segments make up the database and where WAL
//! replay starts.
//!
//! ## File Format
//! ```text
//! {data_dir}/MANIFEST
//! ┌─────────┬─────────┬──────────────────────────────────┐
//! │ Len (4) │ CRC (4) │ bincode(Vec<ManifestEdit>)       │  record 1
//! ├─────────┼─────────┼──────────────────────────────────┤
//! │ Len (4) │ CRC (4) │ bincode(Vec<ManifestEdit>)       │  record 2
//! └─────────┴─────────┴──────────────────────────────────┘
//! ```
//! Each record is one atomic batch of edits. A rewrite replaces the file
//! (via `MANIFEST.tmp` + rename) with a single `Snapshot` record.
//!
//! ## Recovery Protocol
//! 1. Replay records in order onto an empty state
//! 2. A torn or corrupt final record is ignored (its commit never returned)
//! 3. Damage before the final record is fatal corruption

use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};

use super::SegmentMeta;
use crate::error::{LineraError, Result};
use crate::record::SeqNo;
use crate::util;
use crate::wal::LogPosition;

const MANIFEST_FILENAME: &str = "MANIFEST";
const MANIFEST_TMP_FILENAME: &str = "MANIFEST.tmp";

/// Record header: Len (4) + CRC (4)
const RECORD_HEADER_SIZE: usize = 8;

// =============================================================================
// State
// =============================================================================

/// Versioned snapshot of the manifest
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestState {
    /// Incremented by every committed batch
    pub version: u64,

    /// Live segments by id
    pub segments: BTreeMap<u64, SegmentMeta>,

    /// WAL replay starts here
    pub wal_checkpoint: LogPosition,

    /// Every record with seq ≤ this is durable in a segment
    pub last_flushed_seq: SeqNo,

    /// Lowest segment id never handed out
    pub next_segment_id: u64,
}

impl ManifestState {
    fn new() -> Self {
        Self {
            next_segment_id: 1,
            ..Self::default()
        }
    }

    /// Apply one edit, rejecting edits that contradict the current state
    pub fn apply(&mut self, edit: ManifestEdit) -> Result<()> {
        match edit {
            ManifestEdit::AddSegment(meta) => {
                if self.segments.contains_key(&meta.id) {
                    return Err(LineraError::ManifestConflict(format!(
                        "segment {} is already live",
                        meta.id
                    )));
                }
                self.next_segment_id = self.next_segment_id.max(meta.id + 1);
                self.segments.insert(meta.id, meta);
            }
            ManifestEdit::RemoveSegment { id } => {
                if self.segments.remove(&id).is_none() {
                    return Err(LineraError::ManifestConflict(format!(
                        "segment {} is not live",
                        id
                    )));
                }
            }
            ManifestEdit::SetWalCheckpoint {
                position,
                last_flushed_seq,
            } => {
                if position < self.wal_checkpoint {
                    return Err(LineraError::ManifestConflict(format!(
                        "WAL checkpoint would move backwards from {} to {}",
                        self.wal_checkpoint, position
                    )));
                }
                self.wal_checkpoint = position;
                self.last_flushed_seq = self.last_flushed_seq.max(last_flushed_seq);
            }
            ManifestEdit::Snapshot(state) => {
                *self = state;
            }
        }
        Ok(())
    }

    /// Live segments ordered newest first (max seq descending)
    pub fn segments_newest_first(&self) -> Vec<SegmentMeta> {
        let mut segments: Vec<SegmentMeta> = self.segments.values().cloned().collect();
        segments.sort_by(|a, b| b.max_seq.cmp(&a.max_seq).then(b.id.cmp(&a.id)));
        segments
    }
}

/// Incremental edit to the manifest
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ManifestEdit {
    /// A new segment became live (flush or compaction output)
    AddSegment(SegmentMeta),

    /// A segment was superseded by compaction
    RemoveSegment { id: u64 },

    /// Advance the WAL replay checkpoint
    SetWalCheckpoint {
        position: LogPosition,
        last_flushed_seq: SeqNo,
    },

    /// Complete state (replaces everything before it)
    Snapshot(ManifestState),
}

// =============================================================================
// Manifest
// =============================================================================

struct ManifestLog {
    file: File,
    /// Byte length of the committed log
    len: u64,
    /// Records since the last rewrite
    records: u64,
}

/// The manifest of one engine
///
/// ## Concurrency:
/// - `log`: Mutex, every commit and rewrite is serialized
/// - `current`: readers clone the `Arc` and never wait on a commit's I/O
pub struct Manifest {
    dir: PathBuf,
    log: Mutex<ManifestLog>,
    current: RwLock<Arc<ManifestState>>,
    next_segment_id: AtomicU64,
    rewrite_threshold: u64,
    /// Fail the next commit's sync, after its record was written
    #[cfg(test)]
    fail_next_commit: std::sync::atomic::AtomicBool,
}

impl Manifest {
    /// Load the manifest in `dir`, creating an empty one if absent
    pub fn open(dir: &Path, rewrite_threshold: u64) -> Result<Self> {
        fs::create_dir_all(dir)?;
        let path = dir.join(MANIFEST_FILENAME);

        let _ = fs::remove_file(dir.join(MANIFEST_TMP_FILENAME));

        let (state, len, records) = if path.exists() {
            Self::replay(&path)?
        } else {
            let state = ManifestState::new();
            let (_, len) = Self::write_snapshot_file(dir, &state)?;
            util::sync_dir(dir)?;
            (state, len, 1)
        };

        let file = OpenOptions::new().write(true).open(&path)?;
        // Drop a torn tail so new records follow the last good one
        if file.metadata()?.len() != len {
            file.set_len(len)?;
            file.sync_all()?;
        }
        let file = OpenOptions::new().append(true).open(&path)?;

        tracing::info!(
            version = state.version,
            segments = state.segments.len(),
            wal_checkpoint = %state.wal_checkpoint,
            last_flushed_seq = state.last_flushed_seq,
            "manifest loaded"
        );

        Ok(Self {
            dir: dir.to_path_buf(),
            log: Mutex::new(ManifestLog { file, len, records }),
            next_segment_id: AtomicU64::new(state.next_segment_id),
            current: RwLock::new(Arc::new(state)),
            rewrite_threshold,
            #[cfg(test)]
            fail_next_commit: std::sync::atomic::AtomicBool::new(false),
        })
    }

    /// Lock-free snapshot of the current state
    pub fn current(&self) -> Arc<ManifestState> {
        Arc::clone(&self.current.read())
    }

    /// Hand out a segment id that no committed or in-flight segment uses
    pub fn allocate_segment_id(&self) -> u64 {
        self.next_segment_id.fetch_add(1, Ordering::SeqCst)
    }

    /// Atomically apply a batch of edits
    ///
    /// The batch is validated against the current state, appended and
    /// fsynced, and only then published. On any failure the published state
    /// is unchanged and the batch can be retried.
    pub fn commit(&self, edits: Vec<ManifestEdit>) -> Result<Arc<ManifestState>> {
        let mut log = self.log.lock();

        let mut next = (**self.current.read()).clone();
        for edit in edits.iter().cloned() {
            next.apply(edit)?;
        }
        next.version += 1;
        next.next_segment_id = next
            .next_segment_id
            .max(self.next_segment_id.load(Ordering::SeqCst));

        let record = encode_record(&edits)?;
        let written = {
            let file = &mut log.file;
            file.write_all(&record).and_then(|_| self.sync_log(file))
        };
        if let Err(e) = written {
            if let Err(truncate_err) = log.file.set_len(log.len) {
                tracing::warn!(error = %truncate_err, "failed to cut back partial manifest record");
            }
            return Err(e.into());
        }
        log.len += record.len() as u64;
        log.records += 1;

        self.next_segment_id
            .fetch_max(next.next_segment_id, Ordering::SeqCst);
        let next = Arc::new(next);
        *self.current.write() = Arc::clone(&next);

        if log.records >= self.rewrite_threshold {
            if let Err(e) = self.rewrite_locked(&mut log, &next) {
                // The appended log is still valid; rewrite again next time
                tracing::warn!(error = %e, "manifest rewrite failed");
            }
        }

        Ok(next)
    }

    /// Replace the log with a single snapshot of the current state
    pub fn rewrite(&self) -> Result<()> {
        let mut log = self.log.lock();
        let state = self.current();
        self.rewrite_locked(&mut log, &state)
    }

    /// Records in the log since the last rewrite
    pub fn log_records(&self) -> u64 {
        self.log.lock().records
    }

    pub fn path(&self) -> PathBuf {
        self.dir.join(MANIFEST_FILENAME)
    }

    fn rewrite_locked(&self, log: &mut ManifestLog, state: &ManifestState) -> Result<()> {
        let (file, len) = Self::write_snapshot_file(&self.dir, state)?;

        // The renamed file is the live manifest from here on, even if the
        // directory sync below fails
        log.file = file;
        log.len = len;
        log.records = 1;
        util::sync_dir(&self.dir)?;

        tracing::debug!(version = state.version, "manifest rewritten");
        Ok(())
    }

    /// Write `state` as the sole record of a new manifest file and rename
    /// it into place
    ///
    /// Returns an append handle to the new file and its length. The caller
    /// syncs the directory.
    fn write_snapshot_file(dir: &Path, state: &ManifestState) -> Result<(File, u64)> {
        let tmp_path = dir.join(MANIFEST_TMP_FILENAME);
        let record = encode_record(&[ManifestEdit::Snapshot(state.clone())])?;

        match fs::remove_file(&tmp_path) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        let mut tmp = OpenOptions::new()
            .create_new(true)
            .append(true)
            .open(&tmp_path)?;

        let written = tmp
            .write_all(&record)
            .and_then(|_| tmp.sync_all())
            .and_then(|_| fs::rename(&tmp_path, dir.join(MANIFEST_FILENAME)));
        if let Err(e) = written {
            drop(tmp);
            if let Err(remove_err) = fs::remove_file(&tmp_path) {
                tracing::warn!(error = %remove_err, "failed to remove manifest temp file");
            }
            return Err(e.into());
        }

        Ok((tmp, record.len() as u64))
    }

    fn sync_log(&self, file: &File) -> std::io::Result<()> {
        #[cfg(test)]
        if self.fail_next_commit.swap(false, Ordering::SeqCst) {
            return Err(std::io::Error::new(
                std::io::ErrorKind::Other,
                "injected manifest sync failure",
            ));
        }
        file.sync_data()
    }

    /// Make the next commit fail after writing its record
    #[cfg(test)]
    pub(crate) fn fail_next_commit(&self) {
        self.fail_next_commit.store(true, Ordering::SeqCst);
    }

    /// Rebuild state from the log; returns (state, valid length, record count)
    fn replay(path: &Path) -> Result<(ManifestState, u64, u64)> {
        let mut bytes = Vec::new();
        File::open(path)?.read_to_end(&mut bytes)?;

        let mut state = ManifestState::new();
        let mut pos = 0;
        let mut records = 0;

        while pos < bytes.len() {
            let edits = match decode_record(&bytes[pos..]) {
                RecordParse::Complete { edits, len } => {
                    pos += len;
                    edits
                }
                RecordParse::Incomplete => {
                    tracing::warn!(offset = pos, "ignoring torn manifest tail");
                    break;
                }
                RecordParse::Corrupt { len } => {
                    if pos + len == bytes.len() {
                        tracing::warn!(offset = pos, "ignoring corrupt final manifest record");
                        break;
                    }
                    return Err(LineraError::Corruption(format!(
                        "manifest record at offset {} is corrupt",
                        pos
                    )));
                }
            };

            let mut next = state.clone();
            for edit in edits {
                next.apply(edit).map_err(|e| {
                    LineraError::Corruption(format!("manifest replay failed: {}", e))
                })?;
            }
            next.version += 1;
            state = next;
            records += 1;
        }

        Ok((state, pos as u64, records))
    }
}

// =============================================================================
// Record Encoding
// =============================================================================

enum RecordParse {
    Complete { edits: Vec<ManifestEdit>, len: usize },
    Incomplete,
    Corrupt { len: usize },
}

fn encode_record(edits: &[ManifestEdit]) -> Result<Vec<u8>> {
    let payload = bincode::serialize(edits)?;
    let mut record = Vec::with_capacity(RECORD_HEADER_SIZE + payload.len());
    record.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    record.extend_from_slice(&crc32fast::hash(&payload).to_le_bytes());
    record.extend_from_slice(&payload);
    Ok(record)
}

fn decode_record(bytes: &[u8]) -> RecordParse {
    if bytes.len() < RECORD_HEADER_SIZE {
        return RecordParse::Incomplete;
    }
    let payload_len = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as usize;
    let stored_crc = u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
    let len = RECORD_HEADER_SIZE + payload_len;
    if bytes.len() < len {
        return RecordParse::Incomplete;
    }

    let payload = &bytes[RECORD_HEADER_SIZE..len];
    if crc32fast::hash(payload) != stored_crc {
        return RecordParse::Corrupt { len };
    }
    match bincode::deserialize::<Vec<ManifestEdit>>(payload) {
        Ok(edits) => RecordParse::Complete { edits, len },
        Err(_) => RecordParse::Corrupt { len },
    }
}
