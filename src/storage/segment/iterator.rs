//! Segment Iterator
//!
//! Sequential, block-at-a-time iteration over a key range of a segment.

use std::ops::Bound;
use std::sync::Arc;

use super::SegmentReader;
use crate::error::Result;
use crate::record::{KeyRange, Record, SeqNo};

/// Iterator over segment records in (key asc, seq desc) order
///
/// Owns a reference to its reader, so it stays valid while compaction
/// swaps the segment out of the live set.
pub struct SegmentIter {
    reader: Arc<SegmentReader>,
    range: KeyRange,
    snapshot: SeqNo,
    /// Next block to load
    next_block: usize,
    /// Records of the current block not yet returned
    buffer: std::vec::IntoIter<Record>,
    done: bool,
}

impl SegmentIter {
    pub(super) fn new(reader: Arc<SegmentReader>, range: KeyRange, snapshot: SeqNo) -> Self {
        let next_block = match &range.start {
            Bound::Included(key) | Bound::Excluded(key) => reader.start_block(key),
            Bound::Unbounded => 0,
        };
        let done = !reader.meta().overlaps(&range);

        Self {
            reader,
            range,
            snapshot,
            next_block,
            buffer: Vec::new().into_iter(),
            done,
        }
    }

    /// Id of the segment being read
    pub fn segment_id(&self) -> u64 {
        self.reader.id()
    }
}

impl Iterator for SegmentIter {
    /// Visible record versions; an error ends iteration
    type Item = Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        while !self.done {
            if let Some(record) = self.buffer.next() {
                if self.range.past_end(&record.key) {
                    self.done = true;
                    return None;
                }
                if self.range.before_start(&record.key) || record.seq > self.snapshot {
                    continue;
                }
                return Some(Ok(record));
            }

            if self.next_block >= self.reader.block_count() {
                self.done = true;
                return None;
            }

            match self.reader.read_block(self.next_block) {
                Ok(records) => {
                    self.buffer = records.into_iter();
                    self.next_block += 1;
                }
                Err(e) => {
                    self.done = true;
                    return Some(Err(e));
                }
            }
        }
        None
    }
}
