//! Engine Module
//!
//! The storage engine that coordinates the WAL, memtables, segments and
//! manifest.
//!
//! ## Responsibilities
//! - Assign sequence numbers and make writes durable before acknowledging
//! - Serve point reads and scans from consistent snapshots
//! - Freeze full memtables and flush them into segments
//! - Compact segments and drop obsolete versions
//! - Recover from the manifest and WAL on startup
//!
//! ## Write Path
//! ```text
//! put/delete ──► write_lock ──► seq = last + 1 ──► WAL append + fsync
//!                                                       │
//!                    publish visible seq ◄── memtable insert
//!                           │
//!                  size ≥ limit? ──► rotate WAL, freeze, notify worker
//! ```
//!
//! ## Flush
//! ```text
//! oldest frozen ──► segment (fsync + rename) ──► manifest commit
//!   [AddSegment, SetWalCheckpoint] ──► swap read state ──► drop old WAL files
//! ```

mod batch;
mod compaction;
mod maintenance;
mod merge;
mod state;


use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::ops::RangeBounds;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use crossbeam::channel::{self, Sender};
use parking_lot::{Mutex, RwLock};

use crate::config::Config;
use crate::error::{LineraError, Result};
use crate::memtable::MemTable;
use crate::record::{KeyRange, Record, SeqNo};
use crate::storage::{
    Manifest, ManifestEdit, SegmentMeta, SegmentReader, SegmentStore, COMPACTED_LEVEL,
    FLUSHED_LEVEL,
};
use crate::wal::{LogPosition, Wal};

pub use batch::WriteBatch;
pub use compaction::CancellationToken;
pub use merge::{MergeIterator, RecordSource, ScanIter};
pub use state::{ReadState, Snapshot};

use maintenance::{MaintenanceWorker, Task};

// =============================================================================
// Stats
// =============================================================================

/// Point-in-time engine statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EngineStats {
    /// Highest sequence number assigned
    pub last_seq: SeqNo,
    /// Highest sequence number visible to readers
    pub visible_seq: SeqNo,
    /// Approximate bytes in the active memtable
    pub memtable_bytes: u64,
    /// Versions in the active memtable
    pub memtable_entries: usize,
    /// Frozen memtables waiting for flush
    pub frozen_memtables: usize,
    /// Live segments
    pub segment_count: usize,
    /// Live segments per level
    pub segments_per_level: BTreeMap<u32, usize>,
    /// Manifest version
    pub manifest_version: u64,
    /// Writes acknowledged since open
    pub writes: u64,
    /// Flushes completed since open
    pub flushes: u64,
    /// Compactions completed since open
    pub compactions: u64,
    /// Whether the write path is disabled
    pub read_only: bool,
}

// =============================================================================
// Engine
// =============================================================================

/// Shared engine internals (used by the handle and the maintenance thread)
///
/// ## Lock Order
/// `write_lock` → `flush_lock` → `state`, and `compaction_lock` → `state`.
/// Flush and compaction never wait on each other: a segment flushed during
/// a merge is newer than every input, so it neither changes which
/// tombstones may be dropped nor conflicts with the compaction's commit.
/// The `state` lock is only ever held for a clone or a swap, never across
/// I/O.
pub(crate) struct EngineInner {
    pub(crate) config: Config,

    wal: Wal,
    manifest: Manifest,
    store: SegmentStore,

    /// Current read state (copy-on-write)
    state: RwLock<Arc<ReadState>>,

    /// Last sequence number assigned (written under `write_lock`)
    last_seq: AtomicU64,
    /// Highest sequence number readers may see
    visible_seq: AtomicU64,

    /// Serializes WAL append + memtable insert
    write_lock: Mutex<()>,
    /// Serializes flushes (oldest frozen table first)
    flush_lock: Mutex<()>,
    /// Serializes compactions
    compaction_lock: Mutex<()>,

    /// Set after a WAL write failure
    read_only: AtomicBool,

    /// Cancelled when the engine shuts down
    pub(crate) shutdown: CancellationToken,

    /// Wakes the maintenance worker (None when it is disabled)
    tasks: Option<Sender<Task>>,

    writes: AtomicU64,
    flushes: AtomicU64,
    compactions: AtomicU64,

    /// Parks a compaction between its merge and its commit
    #[cfg(test)]
    merge_gate: Mutex<()>,
}

/// The main storage engine
///
/// ## Concurrency Model: Single Writer / Multiple Readers
///
/// - **Writes** (put/delete/write_batch): serialized by a write mutex that
///   covers WAL append and memtable insert only
/// - **Reads** (get/scan): take a snapshot (visible seq + read state) and
///   never wait for writers
/// - **Maintenance** (flush/compact): on a background thread, blocking
///   foreground work only for the read-state swap
pub struct Engine {
    inner: Arc<EngineInner>,
    worker: Option<MaintenanceWorker>,
}

impl Engine {
    // =========================================================================
    // Internal Path Constants
    // =========================================================================
    const WAL_DIR: &'static str = "wal";
    const SEGMENT_DIR: &'static str = "segments";

    /// Open or create an engine with the given config
    ///
    /// On startup:
    /// 1. Load the manifest and open every live segment
    /// 2. Remove segment files the manifest does not reference
    /// 3. Replay the WAL from the checkpoint into a fresh memtable
    /// 4. Restore the sequence counter and start the maintenance worker
    pub fn open(config: Config) -> Result<Self> {
        config.validate()?;
        fs::create_dir_all(&config.data_dir)?;

        // Step 1: Manifest and segments
        let manifest = Manifest::open(&config.data_dir, config.manifest_rewrite_threshold)?;
        let store = SegmentStore::open(
            &config.data_dir.join(Self::SEGMENT_DIR),
            config.segment_index_interval,
            config.bloom_bits_per_key,
        )?;
        let manifest_state = manifest.current();

        // Step 2: Orphans from flushes/compactions that never committed
        let live: HashSet<u64> = manifest_state.segments.keys().copied().collect();
        let orphans = store.remove_orphans(&live)?;

        let mut segments = Vec::with_capacity(live.len());
        for meta in manifest_state.segments_newest_first() {
            segments.push(store.open_segment(&meta)?);
        }

        // Step 3: WAL replay
        let checkpoint = manifest_state.wal_checkpoint;
        let last_flushed_seq = manifest_state.last_flushed_seq;
        let wal = Wal::open_after(&config.data_dir.join(Self::WAL_DIR), checkpoint)?;
        if let Err(e) = wal.truncate_before(checkpoint) {
            tracing::warn!(error = %e, "failed to remove flushed WAL files");
        }

        let memtable = Arc::new(MemTable::new());
        let mut replay = wal.replay(checkpoint)?;
        let mut replayed = 0u64;
        let mut replay_max_seq = 0;
        for record in &mut replay {
            let record = record?;
            if record.seq <= last_flushed_seq {
                continue;
            }
            replay_max_seq = replay_max_seq.max(record.seq);
            memtable.put(record);
            replayed += 1;
        }

        // Step 4: Sequence counter
        let segment_max_seq = segments.iter().map(|s| s.meta().max_seq).max().unwrap_or(0);
        let last_seq = last_flushed_seq.max(segment_max_seq).max(replay_max_seq);

        tracing::info!(
            data_dir = %config.data_dir.display(),
            segments = segments.len(),
            orphans_removed = orphans.len(),
            wal_records_replayed = replayed,
            wal_frames_corrupted = replay.frames_corrupted(),
            last_seq,
            "engine opened"
        );

        let (sender, receiver) = channel::unbounded();
        let background = config.background_maintenance;
        let compaction_due = segments.len() >= config.compaction_trigger;

        let inner = Arc::new(EngineInner {
            wal,
            manifest,
            store,
            state: RwLock::new(Arc::new(ReadState::new(memtable, segments))),
            last_seq: AtomicU64::new(last_seq),
            visible_seq: AtomicU64::new(last_seq),
            write_lock: Mutex::new(()),
            flush_lock: Mutex::new(()),
            compaction_lock: Mutex::new(()),
            read_only: AtomicBool::new(false),
            shutdown: CancellationToken::new(),
            tasks: background.then(|| sender.clone()),
            writes: AtomicU64::new(0),
            flushes: AtomicU64::new(0),
            compactions: AtomicU64::new(0),
            #[cfg(test)]
            merge_gate: Mutex::new(()),
            config,
        });

        let worker = if background {
            Some(MaintenanceWorker::spawn(Arc::clone(&inner), sender, receiver)?)
        } else {
            None
        };

        if compaction_due {
            inner.schedule(Task::Compact);
        }

        Ok(Self { inner, worker })
    }

    /// Open with a path (convenience method)
    ///
    /// Uses default config with the specified data directory
    pub fn open_path(path: &Path) -> Result<Self> {
        Self::open(Config::builder().data_dir(path).build())
    }

    // =========================================================================
    // Writes
    // =========================================================================

    /// Put a key-value pair
    ///
    /// Returns once the write is durable in the WAL.
    pub fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        self.inner
            .apply(vec![(key.to_vec(), Some(value.to_vec()))])
    }

    /// Delete a key (writes a tombstone)
    pub fn delete(&self, key: &[u8]) -> Result<()> {
        self.inner.apply(vec![(key.to_vec(), None)])
    }

    /// Apply a batch of puts and deletes in order
    pub fn write_batch(&self, batch: WriteBatch) -> Result<()> {
        if batch.is_empty() {
            return Ok(());
        }
        self.inner.apply(batch.into_ops())
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Get a value by key
    ///
    /// Search order:
    /// 1. Active memtable
    /// 2. Frozen memtables (newest to oldest)
    /// 3. Segments (newest to oldest, skipped via key range and bloom filter)
    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        self.inner.snapshot().get(key)
    }

    /// Lazy ordered scan over `range`
    ///
    /// The iterator sees the database as of this call; later writes,
    /// flushes and compactions do not affect it.
    pub fn scan<R: RangeBounds<Vec<u8>>>(&self, range: R) -> ScanIter {
        self.inner.snapshot().scan(KeyRange::from_bounds(range))
    }

    /// Consistent view for repeated reads
    pub fn snapshot(&self) -> Snapshot {
        self.inner.snapshot()
    }

    // =========================================================================
    // Maintenance
    // =========================================================================

    /// Flush the active memtable and everything frozen to segments
    ///
    /// Runs on the calling thread regardless of background maintenance.
    pub fn flush(&self) -> Result<()> {
        {
            let _write_guard = self.inner.write_lock.lock();
            self.inner.freeze_locked()?;
        }
        self.inner.flush_frozen_all()?;
        self.inner.schedule(Task::Compact);
        Ok(())
    }

    /// Merge the given segments into one
    ///
    /// Returns the output segment, or `None` when every record was
    /// dropped (all tombstones with nothing older left to shadow).
    pub fn compact(&self, segment_ids: &[u64]) -> Result<Option<SegmentMeta>> {
        self.compact_with(segment_ids, &CancellationToken::new())
    }

    /// `compact` with a caller-held cancellation token
    pub fn compact_with(
        &self,
        segment_ids: &[u64],
        token: &CancellationToken,
    ) -> Result<Option<SegmentMeta>> {
        self.inner.compact(segment_ids, token)
    }

    /// Compact every live segment into one
    pub fn compact_all(&self) -> Result<Option<SegmentMeta>> {
        self.inner.compact_all(&CancellationToken::new())
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Close the engine gracefully
    ///
    /// Stops the maintenance worker, flushes pending data and syncs the WAL.
    pub fn close(mut self) -> Result<()> {
        self.stop_worker()?;

        if !self.inner.read_only.load(Ordering::Acquire) {
            self.flush()?;
        }
        self.inner.wal.sync()?;

        tracing::info!(
            data_dir = %self.inner.config.data_dir.display(),
            last_seq = self.inner.last_seq.load(Ordering::Acquire),
            "engine closed"
        );
        Ok(())
    }

    fn stop_worker(&mut self) -> Result<()> {
        if let Some(mut worker) = self.worker.take() {
            self.inner.shutdown.cancel();
            worker.stop()?;
        }
        Ok(())
    }

    // =========================================================================
    // Accessors (for testing and debugging)
    // =========================================================================

    pub fn stats(&self) -> EngineStats {
        self.inner.stats()
    }

    /// Ids of the live segments, newest first
    pub fn segment_ids(&self) -> Vec<u64> {
        self.inner
            .state
            .read()
            .segments
            .iter()
            .map(|segment| segment.id())
            .collect()
    }

    /// Metadata of the live segments, newest first
    pub fn segments(&self) -> Vec<SegmentMeta> {
        self.inner
            .state
            .read()
            .segments
            .iter()
            .map(|segment| segment.meta().clone())
            .collect()
    }

    /// Whether a WAL failure disabled the write path
    pub fn is_read_only(&self) -> bool {
        self.inner.read_only.load(Ordering::Acquire)
    }

    /// WAL position the next write will land at
    pub fn wal_position(&self) -> LogPosition {
        self.inner.wal.position()
    }

    /// Get the data directory path
    pub fn data_dir(&self) -> &Path {
        &self.inner.config.data_dir
    }

    /// Directory holding segment files
    pub fn segment_dir(&self) -> &Path {
        self.inner.store.dir()
    }

    /// Directory holding WAL files
    pub fn wal_dir(&self) -> PathBuf {
        self.inner.wal.dir().to_path_buf()
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.inner.config
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        if let Err(e) = self.stop_worker() {
            tracing::error!(error = %e, "failed to stop maintenance worker");
        }
    }
}

// =============================================================================
// Internals
// =============================================================================

impl EngineInner {
    /// Visible seq and read state, captured together
    fn snapshot(&self) -> Snapshot {
        let state = self.state.read();
        Snapshot {
            seq: self.visible_seq.load(Ordering::Acquire),
            state: Arc::clone(&state),
        }
    }

    fn schedule(&self, task: Task) {
        if let Some(tasks) = &self.tasks {
            let _ = tasks.send(task);
        }
    }

    fn validate(&self, key: &[u8], value: Option<&[u8]>) -> Result<()> {
        if key.len() > self.config.max_key_size {
            return Err(LineraError::InvalidArgument(format!(
                "key is {} bytes, limit is {}",
                key.len(),
                self.config.max_key_size
            )));
        }
        if let Some(value) = value {
            if value.len() > self.config.max_value_size {
                return Err(LineraError::InvalidArgument(format!(
                    "value is {} bytes, limit is {}",
                    value.len(),
                    self.config.max_value_size
                )));
            }
        }
        Ok(())
    }

    /// The write path shared by put, delete and write_batch
    fn apply(&self, ops: Vec<(Vec<u8>, Option<Vec<u8>>)>) -> Result<()> {
        for (key, value) in &ops {
            self.validate(key, value.as_deref())?;
        }

        let froze = {
            let _write_guard = self.write_lock.lock();
            if self.read_only.load(Ordering::Acquire) {
                return Err(LineraError::ReadOnly);
            }

            let active = Arc::clone(&self.state.read().active);
            let mut last_seq = self.last_seq.load(Ordering::Acquire);
            let mut result = Ok(());

            for (key, value) in ops {
                let record = Record {
                    key,
                    value,
                    seq: last_seq + 1,
                };
                if let Err(e) = self.wal.append(&record) {
                    tracing::error!(seq = record.seq, error = %e, "WAL append failed, engine is now read-only");
                    self.read_only.store(true, Ordering::Release);
                    result = Err(e);
                    break;
                }
                last_seq = record.seq;
                self.last_seq.store(last_seq, Ordering::Release);
                active.put(record);
                self.writes.fetch_add(1, Ordering::Relaxed);
            }

            // Durable records become visible even if a later one failed
            self.visible_seq.store(last_seq, Ordering::Release);
            result?;

            // The write is durable at this point: maintenance failures
            // below are logged, not returned
            if active.size_bytes() >= self.config.memtable_size_limit {
                self.freeze_locked().unwrap_or_else(|e| {
                    tracing::warn!(error = %e, "memtable freeze failed");
                    false
                })
            } else {
                false
            }
        };

        if froze {
            if let Err(e) = self.after_freeze() {
                tracing::warn!(error = %e, "inline flush failed, frozen memtable kept");
            }
        }
        Ok(())
    }

    /// Swap in a fresh memtable; the caller holds `write_lock`
    ///
    /// Returns false when the active table is empty.
    fn freeze_locked(&self) -> Result<bool> {
        let active = Arc::clone(&self.state.read().active);
        if active.is_empty() {
            return Ok(false);
        }

        let checkpoint = self.wal.rotate()?;
        let frozen = active.freeze(checkpoint);

        let frozen_count = {
            let mut state = self.state.write();
            let next = state.with_frozen(frozen, Arc::new(MemTable::new()));
            let count = next.frozen.len();
            *state = Arc::new(next);
            count
        };

        tracing::debug!(
            bytes = active.size_bytes(),
            entries = active.entry_count(),
            frozen = frozen_count,
            %checkpoint,
            "memtable frozen"
        );
        Ok(true)
    }

    /// Hand a freshly frozen table to the worker, or flush inline
    fn after_freeze(&self) -> Result<()> {
        if self.tasks.is_none() {
            self.flush_frozen_all()?;
            return Ok(());
        }

        self.schedule(Task::Flush);

        // Write stall: the worker is not keeping up
        while self.state.read().frozen.len() > self.config.max_frozen_memtables {
            tracing::warn!(
                limit = self.config.max_frozen_memtables,
                "too many frozen memtables, flushing inline"
            );
            if !self.flush_oldest()? {
                break;
            }
        }
        Ok(())
    }

    /// Flush frozen tables oldest first until none are left
    ///
    /// Returns the number flushed.
    pub(crate) fn flush_frozen_all(&self) -> Result<usize> {
        let mut flushed = 0;
        while self.flush_oldest()? {
            flushed += 1;
        }
        Ok(flushed)
    }

    /// Write the oldest frozen table to a segment
    ///
    /// Returns false when there was nothing to flush.
    fn flush_oldest(&self) -> Result<bool> {
        let _flush_guard = self.flush_lock.lock();

        let frozen = match self.state.read().oldest_frozen() {
            Some(frozen) => frozen.clone(),
            None => return Ok(false),
        };

        let segment_id = self.manifest.allocate_segment_id();
        let meta = self.store.write(segment_id, FLUSHED_LEVEL, frozen.iter().map(Ok))?;
        let reader = match self.store.open_segment(&meta) {
            Ok(reader) => reader,
            Err(e) => {
                self.discard_output(segment_id);
                return Err(e);
            }
        };

        let edits = vec![
            ManifestEdit::AddSegment(meta.clone()),
            ManifestEdit::SetWalCheckpoint {
                position: frozen.wal_checkpoint(),
                last_flushed_seq: frozen.max_seq(),
            },
        ];
        if let Err(e) = self.manifest.commit(edits) {
            drop(reader);
            self.discard_output(segment_id);
            return Err(e);
        }

        {
            let mut state = self.state.write();
            let next = state.with_flushed(&frozen, reader);
            *state = Arc::new(next);
        }

        if let Err(e) = self.wal.truncate_before(frozen.wal_checkpoint()) {
            tracing::warn!(error = %e, "failed to remove flushed WAL files");
        }
        self.flushes.fetch_add(1, Ordering::Relaxed);

        tracing::info!(
            segment_id,
            records = meta.record_count,
            bytes = meta.file_size,
            max_seq = meta.max_seq,
            "memtable flushed"
        );
        Ok(true)
    }

    /// Compact once the live segment count reaches the trigger
    pub(crate) fn compact_if_needed(&self) -> Result<()> {
        let _compaction_guard = self.compaction_lock.lock();
        if self.state.read().segments.len() < self.config.compaction_trigger {
            return Ok(());
        }
        self.compact_live(&self.shutdown)?;
        Ok(())
    }

    fn compact_all(&self, token: &CancellationToken) -> Result<Option<SegmentMeta>> {
        let _compaction_guard = self.compaction_lock.lock();
        self.compact_live(token)
    }

    /// Compact every live segment; the caller holds `compaction_lock`
    fn compact_live(&self, token: &CancellationToken) -> Result<Option<SegmentMeta>> {
        let ids: Vec<u64> = self
            .state
            .read()
            .segments
            .iter()
            .map(|segment| segment.id())
            .collect();
        if ids.is_empty() {
            return Ok(None);
        }
        self.compact_locked(&ids, token)
    }

    fn compact(&self, ids: &[u64], token: &CancellationToken) -> Result<Option<SegmentMeta>> {
        let _compaction_guard = self.compaction_lock.lock();
        self.compact_locked(ids, token)
    }

    /// Merge `ids` into one segment; the caller holds `compaction_lock`
    fn compact_locked(
        &self,
        ids: &[u64],
        token: &CancellationToken,
    ) -> Result<Option<SegmentMeta>> {
        let state = Arc::clone(&self.state.read());

        // Validate the input set against the live segments
        if ids.is_empty() {
            return Err(LineraError::InvalidArgument(
                "compaction needs at least one segment".to_string(),
            ));
        }
        let requested: HashSet<u64> = ids.iter().copied().collect();
        if requested.len() != ids.len() {
            return Err(LineraError::InvalidArgument(
                "duplicate segment id in compaction input".to_string(),
            ));
        }
        let (inputs, outside): (Vec<Arc<SegmentReader>>, Vec<Arc<SegmentReader>>) = state
            .segments
            .iter()
            .cloned()
            .partition(|segment| requested.contains(&segment.id()));
        if inputs.len() != ids.len() {
            let live: HashSet<u64> = inputs.iter().map(|segment| segment.id()).collect();
            let missing: Vec<u64> = ids.iter().copied().filter(|id| !live.contains(id)).collect();
            return Err(LineraError::InvalidArgument(format!(
                "segments {:?} are not live",
                missing
            )));
        }
        token.check()?;

        let segment_id = self.manifest.allocate_segment_id();

        // Merge into a new segment
        let mut builder = self.store.builder(segment_id)?;
        let stats = match compaction::merge_segments(&mut builder, &inputs, &outside, token) {
            Ok(stats) => stats,
            Err(e) => {
                builder.abandon();
                return Err(e);
            }
        };

        let output = if builder.is_empty() {
            builder.abandon();
            None
        } else {
            let meta = builder.finish(segment_id, COMPACTED_LEVEL)?;
            match self.store.open_segment(&meta) {
                Ok(reader) => Some(reader),
                Err(e) => {
                    self.discard_output(segment_id);
                    return Err(e);
                }
            }
        };

        #[cfg(test)]
        drop(self.merge_gate.lock());

        if let Err(e) = token.check() {
            drop(output);
            self.discard_output(segment_id);
            return Err(e);
        }

        // Commit
        let mut edits: Vec<ManifestEdit> = output
            .iter()
            .map(|reader| ManifestEdit::AddSegment(reader.meta().clone()))
            .collect();
        edits.extend(ids.iter().map(|&id| ManifestEdit::RemoveSegment { id }));

        if let Err(e) = self.manifest.commit(edits) {
            drop(output);
            self.discard_output(segment_id);
            return Err(e);
        }

        let output_meta = output.as_ref().map(|reader| reader.meta().clone());
        {
            let mut current = self.state.write();
            let next = current.with_compacted(ids, output);
            *current = Arc::new(next);
        }

        // Files go away when the last snapshot holding them is dropped
        for input in &inputs {
            input.mark_obsolete();
        }
        if let Err(e) = self.manifest.rewrite() {
            tracing::warn!(error = %e, "manifest rewrite after compaction failed");
        }
        self.compactions.fetch_add(1, Ordering::Relaxed);

        tracing::info!(
            inputs = ?ids,
            output = ?output_meta.as_ref().map(|meta| meta.id),
            level = COMPACTED_LEVEL,
            records_read = stats.records_read,
            records_written = stats.records_written,
            tombstones_dropped = stats.tombstones_dropped,
            "compaction finished"
        );
        Ok(output_meta)
    }

    /// Remove an output file that never made it into the manifest
    fn discard_output(&self, segment_id: u64) {
        if let Err(e) = self.store.delete(segment_id) {
            tracing::warn!(segment_id, error = %e, "failed to remove uncommitted segment");
        }
    }

    fn stats(&self) -> EngineStats {
        let state = Arc::clone(&self.state.read());
        let mut segments_per_level = BTreeMap::new();
        for segment in &state.segments {
            *segments_per_level.entry(segment.meta().level).or_insert(0) += 1;
        }

        EngineStats {
            last_seq: self.last_seq.load(Ordering::Acquire),
            visible_seq: self.visible_seq.load(Ordering::Acquire),
            memtable_bytes: state.active.size_bytes(),
            memtable_entries: state.active.entry_count(),
            frozen_memtables: state.frozen.len(),
            segment_count: state.segments.len(),
            segments_per_level,
            manifest_version: self.manifest.current().version,
            writes: self.writes.load(Ordering::Relaxed),
            flushes: self.flushes.load(Ordering::Relaxed),
            compactions: self.compactions.load(Ordering::Relaxed),
            read_only: self.read_only.load(Ordering::Acquire),
        }
    }
}
