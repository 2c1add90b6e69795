//! Read State
//!
//! The set of sources a reader consults, replaced wholesale on every
//! freeze, flush and compaction.

use std::sync::Arc;

use super::merge::{MergeIterator, RecordSource, ScanIter};
use crate::error::Result;
use crate::memtable::{ImmutableMemTable, MemTable};
use crate::record::{KeyRange, Record, SeqNo};
use crate::storage::SegmentReader;

/// Immutable view of the engine's tables
///
/// Never mutated in place: writers build a new state and swap the `Arc`,
/// so a reader holding an old one keeps every table and segment it
/// references alive.
#[derive(Clone)]
pub struct ReadState {
    /// Receives new writes
    pub active: Arc<MemTable>,

    /// Frozen tables waiting for flush, newest first
    pub frozen: Vec<ImmutableMemTable>,

    /// Live segments ordered by max seq descending
    pub segments: Vec<Arc<SegmentReader>>,
}

impl ReadState {
    pub fn new(active: Arc<MemTable>, segments: Vec<Arc<SegmentReader>>) -> Self {
        let mut state = Self {
            active,
            frozen: Vec::new(),
            segments,
        };
        state.sort_segments();
        state
    }

    /// Active table frozen; `next` takes over
    pub fn with_frozen(&self, frozen: ImmutableMemTable, next: Arc<MemTable>) -> Self {
        let mut state = self.clone();
        state.frozen.insert(0, frozen);
        state.active = next;
        state
    }

    /// `flushed` replaced by the segment it was written to
    pub fn with_flushed(&self, flushed: &ImmutableMemTable, segment: Arc<SegmentReader>) -> Self {
        let mut state = self.clone();
        state.frozen.retain(|table| !table.same_table(flushed));
        state.segments.push(segment);
        state.sort_segments();
        state
    }

    /// `inputs` replaced by the compaction output (if any)
    pub fn with_compacted(&self, inputs: &[u64], output: Option<Arc<SegmentReader>>) -> Self {
        let mut state = self.clone();
        state.segments.retain(|segment| !inputs.contains(&segment.id()));
        state.segments.extend(output);
        state.sort_segments();
        state
    }

    /// Oldest frozen table (next to flush)
    pub fn oldest_frozen(&self) -> Option<&ImmutableMemTable> {
        self.frozen.last()
    }

    fn sort_segments(&mut self) {
        self.segments.sort_by(|a, b| {
            b.meta()
                .max_seq
                .cmp(&a.meta().max_seq)
                .then(b.id().cmp(&a.id()))
        });
    }
}

// =============================================================================
// Snapshot
// =============================================================================

/// A consistent point-in-time view: a read state plus the highest sequence
/// number visible in it
#[derive(Clone)]
pub struct Snapshot {
    pub(crate) seq: SeqNo,
    pub(crate) state: Arc<ReadState>,
}

impl Snapshot {
    pub fn seq(&self) -> SeqNo {
        self.seq
    }

    /// Newest visible version of `key`, tombstones included
    ///
    /// Memtables are checked first; every version in them is newer than
    /// any segment. Segments are checked newest first, and the search stops
    /// once no remaining segment can hold a newer version than the best one
    /// found.
    pub fn get_record(&self, key: &[u8]) -> Result<Option<Record>> {
        if let Some(record) = self.state.active.get_at(key, self.seq) {
            return Ok(Some(record));
        }
        for table in &self.state.frozen {
            if let Some(record) = table.get_at(key, self.seq) {
                return Ok(Some(record));
            }
        }

        let mut best: Option<Record> = None;
        for segment in &self.state.segments {
            let meta = segment.meta();
            if let Some(found) = &best {
                if found.seq >= meta.max_seq {
                    break;
                }
            }
            if meta.min_seq > self.seq || !segment.may_contain(key) {
                continue;
            }
            if let Some(record) = segment.get(key, self.seq)? {
                if best.as_ref().map_or(true, |found| record.seq > found.seq) {
                    best = Some(record);
                }
            }
        }
        Ok(best)
    }

    /// Value of `key`, or `None` if absent or deleted
    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        Ok(self.get_record(key)?.and_then(|record| record.value))
    }

    /// Lazy scan over `range` as of this snapshot
    pub fn scan(&self, range: KeyRange) -> ScanIter {
        let mut sources: Vec<RecordSource> = Vec::new();

        sources.push(Box::new(
            self.state.active.scan(range.clone(), self.seq).map(Ok),
        ));
        for table in &self.state.frozen {
            sources.push(Box::new(table.scan(range.clone(), self.seq).map(Ok)));
        }
        for segment in &self.state.segments {
            if segment.meta().min_seq > self.seq || !segment.meta().overlaps(&range) {
                continue;
            }
            sources.push(Box::new(segment.iter(range.clone(), self.seq)));
        }

        ScanIter::new(MergeIterator::new(sources), Arc::clone(&self.state))
    }
}
