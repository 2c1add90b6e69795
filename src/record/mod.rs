//! Record Module
//!
//! The unit of data stored by every layer of the engine.
//!
//! A record is a `(key, value | tombstone, sequence number)` triple. Several
//! versions of one key may coexist across the memtable and segments; the
//! version with the highest sequence number wins.

mod codec;
mod range;

use std::cmp::Ordering;

pub use codec::{decode, decode_prefix, encode, encode_into, MIN_RECORD_SIZE, TOMBSTONE_MARKER};
pub use range::KeyRange;

/// Monotonic write-order identifier assigned at WAL append
pub type SeqNo = u64;

/// A single versioned key-value record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    /// User key
    pub key: Vec<u8>,

    /// Value bytes, or `None` for a tombstone
    pub value: Option<Vec<u8>>,

    /// Sequence number of the write that produced this record
    pub seq: SeqNo,
}

impl Record {
    /// Create a live record
    pub fn put(key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>, seq: SeqNo) -> Self {
        Self {
            key: key.into(),
            value: Some(value.into()),
            seq,
        }
    }

    /// Create a tombstone record
    pub fn tombstone(key: impl Into<Vec<u8>>, seq: SeqNo) -> Self {
        Self {
            key: key.into(),
            value: None,
            seq,
        }
    }

    /// Whether this record marks a deletion
    pub fn is_tombstone(&self) -> bool {
        self.value.is_none()
    }

    /// Exact size of this record once encoded
    pub fn encoded_len(&self) -> usize {
        MIN_RECORD_SIZE + self.key.len() + self.value.as_ref().map_or(0, Vec::len)
    }
}

/// Merge order used everywhere records of several sources meet:
/// key ascending, then sequence number descending (newest version first).
pub fn merge_order(a: &Record, b: &Record) -> Ordering {
    a.key.cmp(&b.key).then_with(|| b.seq.cmp(&a.seq))
}
