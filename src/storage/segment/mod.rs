//! Segment Module
//!
//! Immutable, sorted on-disk runs of records.
//!
//! ## File Format
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │ Data Section (variable)                                 │
//! │   codec records, key ascending / seq descending         │
//! │   grouped into blocks of `index_interval` records       │
//! ├─────────────────────────────────────────────────────────┤
//! │ Index Section (variable)                                │
//! │   Count: u32                                            │
//! │   [KeyLen: u32][Key][BlockOffset: u64] per block        │
//! ├─────────────────────────────────────────────────────────┤
//! │ Bloom Section (variable)                                │
//! │   [NumHashes: u32][NumBits: u64][Bits]                  │
//! ├─────────────────────────────────────────────────────────┤
//! │ Footer (56 bytes)                                       │
//! │   Magic "LNRS" (4) | Version u16 (2) | Reserved (2)     │
//! │   IndexOffset u64 | IndexLen u64                        │
//! │   BloomOffset u64 | BloomLen u64                        │
//! │   RecordCount u64 | MetaCRC u32 | Reserved (4)          │
//! └─────────────────────────────────────────────────────────┘
//! ```
//! `MetaCRC` covers the index and bloom sections. Data records carry
//! their own checksums.

mod builder;
mod iterator;
mod reader;

use serde::{Deserialize, Serialize};

use crate::record::{KeyRange, SeqNo};

pub use builder::SegmentBuilder;
pub use iterator::SegmentIter;
pub use reader::SegmentReader;

// =============================================================================
// Shared Constants (used by builder, reader)
// =============================================================================

/// Magic bytes identifying a LineraDB segment file
pub(crate) const MAGIC: &[u8; 4] = b"LNRS";

/// Current segment format version
pub(crate) const VERSION: u16 = 1;

/// Footer size in bytes
pub(crate) const FOOTER_SIZE: u64 = 56;

// =============================================================================
// Segment Metadata
// =============================================================================

/// Level of segments written by a memtable flush
pub const FLUSHED_LEVEL: u32 = 0;
/// Level of segments written by compaction
pub const COMPACTED_LEVEL: u32 = 1;

/// Segment handle as recorded in the manifest
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentMeta {
    /// Unique segment id (file name)
    pub id: u64,
    /// `FLUSHED_LEVEL` or `COMPACTED_LEVEL`
    pub level: u32,
    /// Smallest key
    pub min_key: Vec<u8>,
    /// Largest key
    pub max_key: Vec<u8>,
    /// Smallest sequence number
    pub min_seq: SeqNo,
    /// Largest sequence number
    pub max_seq: SeqNo,
    /// Number of records (all versions, tombstones included)
    pub record_count: u64,
    /// File size in bytes
    pub file_size: u64,
}

impl SegmentMeta {
    /// Quick check if a key might be in this segment (range check)
    pub fn key_in_range(&self, key: &[u8]) -> bool {
        key >= self.min_key.as_slice() && key <= self.max_key.as_slice()
    }

    /// Whether the segment's key span intersects `range`
    pub fn overlaps(&self, range: &KeyRange) -> bool {
        range.overlaps(&self.min_key, &self.max_key)
    }
}

/// Decoded footer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Footer {
    pub index_offset: u64,
    pub index_len: u64,
    pub bloom_offset: u64,
    pub bloom_len: u64,
    pub record_count: u64,
    pub meta_crc: u32,
}

impl Footer {
    pub(crate) fn encode(&self) -> [u8; FOOTER_SIZE as usize] {
        let mut out = [0u8; FOOTER_SIZE as usize];
        out[0..4].copy_from_slice(MAGIC);
        out[4..6].copy_from_slice(&VERSION.to_le_bytes());
        out[8..16].copy_from_slice(&self.index_offset.to_le_bytes());
        out[16..24].copy_from_slice(&self.index_len.to_le_bytes());
        out[24..32].copy_from_slice(&self.bloom_offset.to_le_bytes());
        out[32..40].copy_from_slice(&self.bloom_len.to_le_bytes());
        out[40..48].copy_from_slice(&self.record_count.to_le_bytes());
        out[48..52].copy_from_slice(&self.meta_crc.to_le_bytes());
        out
    }

    pub(crate) fn decode(bytes: &[u8; FOOTER_SIZE as usize]) -> crate::Result<Self> {
        if &bytes[0..4] != MAGIC {
            return Err(crate::LineraError::Corruption(format!(
                "invalid segment magic: expected LNRS, got {:?}",
                &bytes[0..4]
            )));
        }
        let version = u16::from_le_bytes([bytes[4], bytes[5]]);
        if version != VERSION {
            return Err(crate::LineraError::Corruption(format!(
                "unsupported segment version: {}",
                version
            )));
        }

        let u64_at = |at: usize| {
            let mut buf = [0u8; 8];
            buf.copy_from_slice(&bytes[at..at + 8]);
            u64::from_le_bytes(buf)
        };

        Ok(Self {
            index_offset: u64_at(8),
            index_len: u64_at(16),
            bloom_offset: u64_at(24),
            bloom_len: u64_at(32),
            record_count: u64_at(40),
            meta_crc: u32::from_le_bytes([bytes[48], bytes[49], bytes[50], bytes[51]]),
        })
    }
}
