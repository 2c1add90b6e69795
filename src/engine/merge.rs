//! K-way merge of sorted record sources.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::Arc;

use super::state::ReadState;
use crate::error::Result;
use crate::record::{self, Record};

/// A sorted stream of records: key ascending, then seq descending
pub type RecordSource = Box<dyn Iterator<Item = Result<Record>> + Send>;

/// Heap entry; `source` is the index of the iterator it came from
struct HeapItem {
    record: Record,
    source: usize,
}

impl PartialEq for HeapItem {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for HeapItem {}

impl PartialOrd for HeapItem {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for HeapItem {
    // BinaryHeap is a max-heap: reverse so the smallest record pops first.
    // Equal records resolve to the lower source index (the newer source).
    fn cmp(&self, other: &Self) -> Ordering {
        record::merge_order(&other.record, &self.record)
            .then_with(|| other.source.cmp(&self.source))
    }
}

/// Merges sources into one stream in (key asc, seq desc) order
///
/// Every version is passed through; deduplication is up to the consumer.
/// Sources must be given newest first. The first source error is returned
/// and ends the merge.
pub struct MergeIterator {
    sources: Vec<RecordSource>,
    heap: BinaryHeap<HeapItem>,
    error: Option<crate::error::LineraError>,
    done: bool,
}

impl MergeIterator {
    pub fn new(mut sources: Vec<RecordSource>) -> Self {
        let mut heap = BinaryHeap::with_capacity(sources.len());
        let mut error = None;

        for (source, iter) in sources.iter_mut().enumerate() {
            match iter.next() {
                Some(Ok(record)) => heap.push(HeapItem { record, source }),
                Some(Err(e)) => {
                    error = Some(e);
                    break;
                }
                None => {}
            }
        }

        Self {
            sources,
            heap,
            error,
            done: false,
        }
    }
}

impl Iterator for MergeIterator {
    type Item = Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        if let Some(e) = self.error.take() {
            self.done = true;
            return Some(Err(e));
        }

        let HeapItem { record, source } = match self.heap.pop() {
            Some(item) => item,
            None => {
                self.done = true;
                return None;
            }
        };

        match self.sources[source].next() {
            Some(Ok(next)) => self.heap.push(HeapItem {
                record: next,
                source,
            }),
            Some(Err(e)) => self.error = Some(e),
            None => {}
        }

        Some(Ok(record))
    }
}

// =============================================================================
// Scan Iterator
// =============================================================================

/// Lazy `(key, value)` iterator returned by `Engine::scan`
///
/// Yields the newest visible version of each key and hides deleted keys.
/// Holds the read state it was opened on, so concurrent flushes and
/// compactions do not affect it. Dropping it early is always safe.
pub struct ScanIter {
    merged: MergeIterator,
    last_key: Option<Vec<u8>>,
    _state: Arc<ReadState>,
}

impl ScanIter {
    pub(crate) fn new(merged: MergeIterator, state: Arc<ReadState>) -> Self {
        Self {
            merged,
            last_key: None,
            _state: state,
        }
    }
}

impl Iterator for ScanIter {
    type Item = Result<(Vec<u8>, Vec<u8>)>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let record = match self.merged.next()? {
                Ok(record) => record,
                Err(e) => return Some(Err(e)),
            };

            if self.last_key.as_deref() == Some(record.key.as_slice()) {
                continue;
            }
            self.last_key = Some(record.key.clone());

            if let Some(value) = record.value {
                return Some(Ok((record.key, value)));
            }
        }
    }
}
