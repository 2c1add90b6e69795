//! MemTable implementation
//!
//! Skip-list memtable holding every version written since the last flush.

use std::cmp::Reverse;
use std::ops::Bound;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use crossbeam_skiplist::SkipMap;

use crate::record::{KeyRange, Record, SeqNo};
use crate::wal::LogPosition;

/// Bookkeeping bytes charged per version on top of key and value
const ENTRY_OVERHEAD: u64 = 32;

/// Skip-list key: user key ascending, then sequence number descending
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct InternalKey {
    user_key: Vec<u8>,
    seq: Reverse<SeqNo>,
}

impl InternalKey {
    fn new(user_key: Vec<u8>, seq: SeqNo) -> Self {
        Self {
            user_key,
            seq: Reverse(seq),
        }
    }
}

/// In-memory table for recent writes
pub struct MemTable {
    /// (key, seq) → value; `None` is a tombstone
    map: SkipMap<InternalKey, Option<Vec<u8>>>,

    /// Approximate size in bytes
    size: AtomicU64,

    /// Number of versions stored
    entry_count: AtomicUsize,

    /// Highest sequence number inserted
    max_seq: AtomicU64,

    /// Set once the table stops accepting writes
    frozen: AtomicBool,
}

impl MemTable {
    /// Create a new empty MemTable
    pub fn new() -> Self {
        Self {
            map: SkipMap::new(),
            size: AtomicU64::new(0),
            entry_count: AtomicUsize::new(0),
            max_seq: AtomicU64::new(0),
            frozen: AtomicBool::new(false),
        }
    }

    /// Insert a record version
    ///
    /// Returns the new approximate size of the table.
    pub fn put(&self, record: Record) -> u64 {
        debug_assert!(!self.is_frozen(), "put on a frozen memtable");

        let charge = ENTRY_OVERHEAD
            + record.key.len() as u64
            + record.value.as_ref().map_or(0, |v| v.len() as u64);

        self.max_seq.fetch_max(record.seq, Ordering::AcqRel);
        self.map
            .insert(InternalKey::new(record.key, record.seq), record.value);
        self.entry_count.fetch_add(1, Ordering::Relaxed);
        self.size.fetch_add(charge, Ordering::AcqRel) + charge
    }

    /// Latest version of `key`, tombstones included
    pub fn get(&self, key: &[u8]) -> Option<Record> {
        self.get_at(key, SeqNo::MAX)
    }

    /// Latest version of `key` with a sequence number ≤ `snapshot`
    pub fn get_at(&self, key: &[u8], snapshot: SeqNo) -> Option<Record> {
        let seek_key = InternalKey::new(key.to_vec(), snapshot);
        let entry = self.map.lower_bound(Bound::Included(&seek_key))?;
        if entry.key().user_key.as_slice() != key {
            return None;
        }
        Some(Record {
            key: key.to_vec(),
            value: entry.value().clone(),
            seq: entry.key().seq.0,
        })
    }

    /// Lazy ordered scan yielding the newest visible version of each key
    pub fn scan(self: &Arc<Self>, range: KeyRange, snapshot: SeqNo) -> MemTableIter {
        MemTableIter {
            table: Arc::clone(self),
            next_start: range.start.clone(),
            range,
            snapshot,
            done: false,
        }
    }

    /// Get approximate size in bytes
    pub fn size_bytes(&self) -> u64 {
        self.size.load(Ordering::Acquire)
    }

    /// Get the number of stored versions
    pub fn entry_count(&self) -> usize {
        self.entry_count.load(Ordering::Relaxed)
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Highest sequence number in the table (0 when empty)
    pub fn max_seq(&self) -> SeqNo {
        self.max_seq.load(Ordering::Acquire)
    }

    /// Mark read-only for flushing
    ///
    /// `wal_checkpoint` is the WAL position before which every record of
    /// this table lies; once the table is in a segment, replay can start
    /// there.
    pub fn freeze(self: &Arc<Self>, wal_checkpoint: LogPosition) -> ImmutableMemTable {
        self.frozen.store(true, Ordering::Release);
        ImmutableMemTable {
            table: Arc::clone(self),
            wal_checkpoint,
        }
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen.load(Ordering::Acquire)
    }
}

impl Default for MemTable {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Immutable MemTable
// =============================================================================

/// A frozen memtable waiting to be flushed
#[derive(Clone)]
pub struct ImmutableMemTable {
    table: Arc<MemTable>,
    wal_checkpoint: LogPosition,
}

impl ImmutableMemTable {
    pub fn get_at(&self, key: &[u8], snapshot: SeqNo) -> Option<Record> {
        self.table.get_at(key, snapshot)
    }

    pub fn scan(&self, range: KeyRange, snapshot: SeqNo) -> MemTableIter {
        self.table.scan(range, snapshot)
    }

    /// Newest version of every key, in key order (flush input)
    pub fn iter(&self) -> MemTableIter {
        self.table.scan(KeyRange::all(), SeqNo::MAX)
    }

    pub fn wal_checkpoint(&self) -> LogPosition {
        self.wal_checkpoint
    }

    pub fn max_seq(&self) -> SeqNo {
        self.table.max_seq()
    }

    pub fn size_bytes(&self) -> u64 {
        self.table.size_bytes()
    }

    pub fn entry_count(&self) -> usize {
        self.table.entry_count()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    /// Whether two handles refer to the same table
    pub fn same_table(&self, other: &ImmutableMemTable) -> bool {
        Arc::ptr_eq(&self.table, &other.table)
    }
}

// =============================================================================
// Iterator
// =============================================================================

/// Ordered iterator over a memtable
///
/// Holds its own reference to the table and re-seeks on every step, so it
/// borrows nothing and stays valid while the writer keeps inserting.
/// Versions newer than the snapshot are invisible.
pub struct MemTableIter {
    table: Arc<MemTable>,
    range: KeyRange,
    next_start: Bound<Vec<u8>>,
    snapshot: SeqNo,
    done: bool,
}

impl Iterator for MemTableIter {
    type Item = Record;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        loop {
            let entry = match &self.next_start {
                Bound::Included(key) => {
                    let seek_key = InternalKey::new(key.clone(), self.snapshot);
                    self.table.map.lower_bound(Bound::Included(&seek_key))
                }
                Bound::Excluded(key) => {
                    let seek_key = InternalKey::new(key.clone(), 0);
                    self.table.map.lower_bound(Bound::Excluded(&seek_key))
                }
                Bound::Unbounded => self.table.map.front(),
            };

            let entry = match entry {
                Some(entry) => entry,
                None => {
                    self.done = true;
                    return None;
                }
            };

            let key = &entry.key().user_key;
            if self.range.past_end(key) {
                self.done = true;
                return None;
            }

            let seq = entry.key().seq.0;
            if seq > self.snapshot {
                // Only newer versions found here; seek to this key's visible one
                self.next_start = Bound::Included(key.clone());
                continue;
            }

            self.next_start = Bound::Excluded(key.clone());
            return Some(Record {
                key: key.clone(),
                value: entry.value().clone(),
                seq,
            });
        }
    }
}
