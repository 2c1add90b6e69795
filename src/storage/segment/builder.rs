//! Segment Builder
//!
//! Streams sorted records into a new segment file.

use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use super::{Footer, SegmentMeta};
use crate::error::{LineraError, Result};
use crate::record::{self, Record, SeqNo};
use crate::storage::bloom::{self, BloomFilter};
use crate::util;

/// Builder for creating new segments from sorted records
///
/// Records go to a temporary file; `finish()` appends index, bloom filter
/// and footer, fsyncs, and renames the file into place, so a segment is
/// never visible half-written.
pub struct SegmentBuilder {
    /// Final file path
    path: PathBuf,
    /// Temporary path written until `finish()`
    tmp_path: PathBuf,
    /// Buffered writer for performance
    writer: BufWriter<File>,
    /// Current write position
    offset: u64,
    /// One index entry every `index_interval` records
    index_interval: usize,
    /// Sparse index: first key of each block → block offset
    index: Vec<(Vec<u8>, u64)>,
    /// Bloom hashes of distinct keys, turned into a filter at finish
    key_hashes: Vec<(u32, u32)>,
    bloom_bits_per_key: usize,
    /// Number of records written
    record_count: u64,
    /// Key and seq of the previous record (ordering check)
    last: Option<(Vec<u8>, SeqNo)>,
    min_key: Vec<u8>,
    min_seq: SeqNo,
    max_seq: SeqNo,
}

impl SegmentBuilder {
    /// Create a new segment builder writing to `path`
    pub fn new(path: &Path, index_interval: usize, bloom_bits_per_key: usize) -> Result<Self> {
        let tmp_path = path.with_extension("seg.tmp");
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&tmp_path)?;

        Ok(Self {
            path: path.to_path_buf(),
            tmp_path,
            writer: BufWriter::new(file),
            offset: 0,
            index_interval: index_interval.max(1),
            index: Vec::new(),
            key_hashes: Vec::new(),
            bloom_bits_per_key,
            record_count: 0,
            last: None,
            min_key: Vec::new(),
            min_seq: SeqNo::MAX,
            max_seq: 0,
        })
    }

    /// Add a record (key ascending, then sequence descending)
    pub fn add(&mut self, record: &Record) -> Result<()> {
        let new_key = match &self.last {
            None => true,
            Some((last_key, last_seq)) => {
                match record.key.as_slice().cmp(last_key.as_slice()) {
                    std::cmp::Ordering::Greater => true,
                    std::cmp::Ordering::Equal if record.seq < *last_seq => false,
                    _ => {
                        return Err(LineraError::InvalidArgument(format!(
                            "segment input out of order at key {:?} seq {}",
                            String::from_utf8_lossy(&record.key),
                            record.seq
                        )))
                    }
                }
            }
        };

        if self.record_count % self.index_interval as u64 == 0 {
            self.index.push((record.key.clone(), self.offset));
        }
        if new_key {
            self.key_hashes.push(bloom::key_hash(&record.key));
        }
        if self.record_count == 0 {
            self.min_key = record.key.clone();
        }

        let bytes = record::encode(record)?;
        self.writer.write_all(&bytes)?;

        self.offset += bytes.len() as u64;
        self.record_count += 1;
        self.min_seq = self.min_seq.min(record.seq);
        self.max_seq = self.max_seq.max(record.seq);
        self.last = Some((record.key.clone(), record.seq));

        Ok(())
    }

    /// Number of records added so far
    pub fn record_count(&self) -> u64 {
        self.record_count
    }

    pub fn is_empty(&self) -> bool {
        self.record_count == 0
    }

    /// Finish building: write index, bloom and footer, fsync and publish
    pub fn finish(mut self, id: u64, level: u32) -> Result<SegmentMeta> {
        if self.record_count == 0 {
            self.abandon();
            return Err(LineraError::InvalidArgument(
                "cannot write an empty segment".to_string(),
            ));
        }

        match self.write_tail() {
            Ok(file_size) => {
                let max_key = self.last.take().map(|(key, _)| key).unwrap_or_default();
                Ok(SegmentMeta {
                    id,
                    level,
                    min_key: std::mem::take(&mut self.min_key),
                    max_key,
                    min_seq: self.min_seq,
                    max_seq: self.max_seq,
                    record_count: self.record_count,
                    file_size,
                })
            }
            Err(e) => {
                let _ = fs::remove_file(&self.tmp_path);
                Err(e)
            }
        }
    }

    /// Discard the partially written segment
    pub fn abandon(self) {
        drop(self.writer);
        if let Err(e) = fs::remove_file(&self.tmp_path) {
            tracing::warn!(path = %self.tmp_path.display(), error = %e, "failed to remove abandoned segment");
        }
    }

    fn write_tail(&mut self) -> Result<u64> {
        // Index section: [count u32] then [key_len u32][key][offset u64]
        let mut index_bytes = Vec::new();
        index_bytes.extend_from_slice(&(self.index.len() as u32).to_le_bytes());
        for (key, offset) in &self.index {
            index_bytes.extend_from_slice(&(key.len() as u32).to_le_bytes());
            index_bytes.extend_from_slice(key);
            index_bytes.extend_from_slice(&offset.to_le_bytes());
        }

        let mut bloom = BloomFilter::with_capacity(self.key_hashes.len(), self.bloom_bits_per_key);
        for &hash in &self.key_hashes {
            bloom.insert_hash(hash);
        }
        let bloom_bytes = bloom.encode();

        let mut hasher = crc32fast::Hasher::new();
        hasher.update(&index_bytes);
        hasher.update(&bloom_bytes);

        let footer = Footer {
            index_offset: self.offset,
            index_len: index_bytes.len() as u64,
            bloom_offset: self.offset + index_bytes.len() as u64,
            bloom_len: bloom_bytes.len() as u64,
            record_count: self.record_count,
            meta_crc: hasher.finalize(),
        };

        self.writer.write_all(&index_bytes)?;
        self.writer.write_all(&bloom_bytes)?;
        self.writer.write_all(&footer.encode())?;
        self.writer.flush()?;

        let file = self.writer.get_ref();
        file.sync_all()?;
        let file_size = file.metadata()?.len();

        fs::rename(&self.tmp_path, &self.path)?;
        if let Some(dir) = self.path.parent() {
            util::sync_dir(dir)?;
        }

        Ok(file_size)
    }
}
