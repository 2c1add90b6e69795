//! Compaction
//!
//! Merges a set of segments into one, keeping only the newest version of
//! each key.
//!
//! ## Tombstone Rule
//! A tombstone for key `k` at seq `t` can be dropped only when no live
//! segment outside the compacted set could still hold an older version of
//! `k`: every such segment either starts after `t` (`min_seq > t`) or
//! cannot contain `k` (key range or bloom filter). Memtables never matter,
//! since everything in them is newer than every segment.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use super::merge::{MergeIterator, RecordSource};
use crate::error::{LineraError, Result};
use crate::record::{KeyRange, Record, SeqNo};
use crate::storage::{SegmentBuilder, SegmentReader};

/// Records merged between cancellation checks
const CANCEL_CHECK_INTERVAL: u64 = 1024;

/// Cooperative cancellation flag for long-running maintenance work
///
/// Cloning shares the flag.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// `Err(Cancelled)` once cancelled
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(LineraError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Counters from one merge
#[derive(Debug, Default, Clone, Copy)]
pub(crate) struct MergeStats {
    pub records_read: u64,
    pub records_written: u64,
    pub tombstones_dropped: u64,
}

/// Whether a tombstone may be left out of the compaction output
pub(crate) fn can_drop_tombstone(key: &[u8], seq: SeqNo, outside: &[Arc<SegmentReader>]) -> bool {
    outside
        .iter()
        .all(|segment| segment.meta().min_seq > seq || !segment.may_contain(key))
}

/// Merge `inputs` into `builder`
///
/// `inputs` must be ordered newest first. The caller owns the builder and
/// abandons it if this returns an error.
pub(crate) fn merge_segments(
    builder: &mut SegmentBuilder,
    inputs: &[Arc<SegmentReader>],
    outside: &[Arc<SegmentReader>],
    token: &CancellationToken,
) -> Result<MergeStats> {
    let mut sources: Vec<RecordSource> = Vec::with_capacity(inputs.len());
    for segment in inputs {
        token.check()?;
        sources.push(Box::new(segment.iter(KeyRange::all(), SeqNo::MAX)));
    }

    let mut stats = MergeStats::default();
    let mut last_key: Option<Vec<u8>> = None;

    for record in MergeIterator::new(sources) {
        if stats.records_read % CANCEL_CHECK_INTERVAL == 0 {
            token.check()?;
        }
        let record: Record = record?;
        stats.records_read += 1;

        if last_key.as_deref() == Some(record.key.as_slice()) {
            continue;
        }
        last_key = Some(record.key.clone());

        if record.is_tombstone() && can_drop_tombstone(&record.key, record.seq, outside) {
            stats.tombstones_dropped += 1;
            continue;
        }

        builder.add(&record)?;
        stats.records_written += 1;
    }

    token.check()?;
    Ok(stats)
}
