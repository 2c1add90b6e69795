//! Segment Reader
//!
//! Opens segment files and serves point lookups through the sparse index
//! and bloom filter. Only the footer, index and filter are loaded at open;
//! data blocks are read on demand.

use std::fs::{self, File};
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use super::iterator::SegmentIter;
use super::{Footer, SegmentMeta, FOOTER_SIZE};
use crate::error::{LineraError, Result};
use crate::record::{self, KeyRange, Record, SeqNo};
use crate::storage::bloom::BloomFilter;
use crate::util;

/// Reader for one segment file
///
/// Shared behind `Arc` by every read state that references the segment.
/// Once compaction supersedes it the segment is marked obsolete, and the
/// file is removed when the last reference is dropped.
pub struct SegmentReader {
    meta: SegmentMeta,
    path: PathBuf,
    /// Shared handle; blocks are read positionally so readers never queue
    file: File,
    /// Sparse index: first key of each block → block offset
    index: Vec<(Vec<u8>, u64)>,
    /// End of the data section
    data_end: u64,
    bloom: BloomFilter,
    obsolete: AtomicBool,
}

impl SegmentReader {
    /// Open a segment for reading
    pub fn open(path: &Path, meta: SegmentMeta) -> Result<Self> {
        let mut file = File::open(path)?;
        let file_size = file.metadata()?.len();

        if file_size < FOOTER_SIZE {
            return Err(LineraError::Corruption(format!(
                "segment {} is {} bytes, smaller than its footer",
                meta.id, file_size
            )));
        }

        file.seek(SeekFrom::End(-(FOOTER_SIZE as i64)))?;
        let mut footer_bytes = [0u8; FOOTER_SIZE as usize];
        file.read_exact(&mut footer_bytes)?;
        let footer = Footer::decode(&footer_bytes)?;

        let meta_end = footer.bloom_offset + footer.bloom_len;
        if footer.index_offset + footer.index_len != footer.bloom_offset
            || meta_end + FOOTER_SIZE != file_size
        {
            return Err(LineraError::Corruption(format!(
                "segment {} footer offsets do not match file size {}",
                meta.id, file_size
            )));
        }

        // Index and bloom are contiguous: read both with one call
        file.seek(SeekFrom::Start(footer.index_offset))?;
        let mut meta_bytes = vec![0u8; (footer.index_len + footer.bloom_len) as usize];
        file.read_exact(&mut meta_bytes)?;

        if crc32fast::hash(&meta_bytes) != footer.meta_crc {
            return Err(LineraError::Corruption(format!(
                "segment {} index/bloom checksum mismatch",
                meta.id
            )));
        }

        let (index_bytes, bloom_bytes) = meta_bytes.split_at(footer.index_len as usize);
        let index = parse_index(index_bytes, meta.id)?;
        let bloom = BloomFilter::decode(bloom_bytes)?;

        tracing::debug!(
            segment_id = meta.id,
            blocks = index.len(),
            records = footer.record_count,
            "segment opened"
        );

        Ok(Self {
            meta,
            path: path.to_path_buf(),
            file,
            index,
            data_end: footer.index_offset,
            bloom,
            obsolete: AtomicBool::new(false),
        })
    }

    pub fn meta(&self) -> &SegmentMeta {
        &self.meta
    }

    pub fn id(&self) -> u64 {
        self.meta.id
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Key range and bloom check; `false` means the key is definitely absent
    pub fn may_contain(&self, key: &[u8]) -> bool {
        self.meta.key_in_range(key) && self.bloom.may_contain(key)
    }

    /// Newest version of `key` with seq ≤ `snapshot`, tombstones included
    pub fn get(&self, key: &[u8], snapshot: SeqNo) -> Result<Option<Record>> {
        if !self.may_contain(key) {
            return Ok(None);
        }

        for block in self.start_block(key)..self.index.len() {
            for record in self.read_block(block)? {
                match record.key.as_slice().cmp(key) {
                    std::cmp::Ordering::Less => continue,
                    std::cmp::Ordering::Greater => return Ok(None),
                    std::cmp::Ordering::Equal if record.seq <= snapshot => {
                        return Ok(Some(record))
                    }
                    std::cmp::Ordering::Equal => continue,
                }
            }
        }

        Ok(None)
    }

    /// Lazy iterator over records in `range` with seq ≤ `snapshot`
    ///
    /// Yields every visible version in (key asc, seq desc) order.
    pub fn iter(self: &Arc<Self>, range: KeyRange, snapshot: SeqNo) -> SegmentIter {
        SegmentIter::new(Arc::clone(self), range, snapshot)
    }

    /// Flag the file for removal once the last reader lets go
    pub fn mark_obsolete(&self) {
        self.obsolete.store(true, Ordering::Release);
    }

    pub fn block_count(&self) -> usize {
        self.index.len()
    }

    /// First block that can hold `key`
    ///
    /// The block before the first index key ≥ `key`, since versions of one
    /// key may straddle a block boundary.
    pub(crate) fn start_block(&self, key: &[u8]) -> usize {
        let first_not_less = self
            .index
            .partition_point(|(first_key, _)| first_key.as_slice() < key);
        first_not_less.saturating_sub(1)
    }

    /// Read and decode every record of one block
    pub(crate) fn read_block(&self, block: usize) -> Result<Vec<Record>> {
        let start = self.index[block].1;
        let end = self
            .index
            .get(block + 1)
            .map(|(_, offset)| *offset)
            .unwrap_or(self.data_end);

        let mut buf = vec![0u8; (end - start) as usize];
        util::read_exact_at(&self.file, start, &mut buf)?;

        let mut records = Vec::new();
        let mut pos = 0;
        while pos < buf.len() {
            let (record, consumed) = record::decode_prefix(&buf[pos..]).map_err(|e| {
                LineraError::Corruption(format!(
                    "segment {} block {} at offset {}: {}",
                    self.meta.id,
                    block,
                    start + pos as u64,
                    e
                ))
            })?;
            records.push(record);
            pos += consumed;
        }
        Ok(records)
    }
}

impl Drop for SegmentReader {
    fn drop(&mut self) {
        if self.obsolete.load(Ordering::Acquire) {
            match fs::remove_file(&self.path) {
                Ok(()) => tracing::debug!(segment_id = self.meta.id, "obsolete segment removed"),
                Err(e) => tracing::warn!(
                    segment_id = self.meta.id,
                    error = %e,
                    "failed to remove obsolete segment"
                ),
            }
        }
    }
}

/// Parse the index section: [count u32] then [key_len u32][key][offset u64]
fn parse_index(bytes: &[u8], segment_id: u64) -> Result<Vec<(Vec<u8>, u64)>> {
    let corrupt = || LineraError::Corruption(format!("segment {} index is malformed", segment_id));

    if bytes.len() < 4 {
        return Err(corrupt());
    }
    let count = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as usize;
    let mut index = Vec::with_capacity(count);
    let mut pos = 4;

    for _ in 0..count {
        if pos + 4 > bytes.len() {
            return Err(corrupt());
        }
        let key_len =
            u32::from_le_bytes([bytes[pos], bytes[pos + 1], bytes[pos + 2], bytes[pos + 3]])
                as usize;
        pos += 4;

        if pos + key_len + 8 > bytes.len() {
            return Err(corrupt());
        }
        let key = bytes[pos..pos + key_len].to_vec();
        pos += key_len;

        let mut offset_bytes = [0u8; 8];
        offset_bytes.copy_from_slice(&bytes[pos..pos + 8]);
        pos += 8;

        index.push((key, u64::from_le_bytes(offset_bytes)));
    }

    if pos != bytes.len() || index.is_empty() {
        return Err(corrupt());
    }
    Ok(index)
}
