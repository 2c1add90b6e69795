//! Segment Store
//!
//! Manages segment files in `{data_dir}/segments/`.
//!
//! ## Responsibilities
//! - Write sorted records into new, fully synced segments
//! - Open segments cheaply (footer, index and bloom filter only)
//! - Delete segment files
//! - Clean up temporary and orphaned files on startup
//!
//! The store does not decide which segments are live: the manifest does.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::{SegmentBuilder, SegmentMeta, SegmentReader};
use crate::error::Result;
use crate::record::Record;
use crate::util;

const SEGMENT_EXTENSION: &str = "seg";
const TEMP_EXTENSION: &str = "tmp";

/// Creates, opens and deletes segment files
pub struct SegmentStore {
    /// Directory where segments are stored
    dir: PathBuf,
    /// Records per sparse index entry
    index_interval: usize,
    /// Bloom filter sizing
    bloom_bits_per_key: usize,
}

impl SegmentStore {
    /// Open or create the segment directory
    ///
    /// Leftover temporary files from an interrupted write are removed.
    pub fn open(dir: &Path, index_interval: usize, bloom_bits_per_key: usize) -> Result<Self> {
        fs::create_dir_all(dir)?;

        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) == Some(TEMP_EXTENSION) {
                tracing::info!(path = %path.display(), "removing unfinished segment");
                fs::remove_file(&path)?;
            }
        }

        Ok(Self {
            dir: dir.to_path_buf(),
            index_interval,
            bloom_bits_per_key,
        })
    }

    /// Start a builder for segment `id`
    pub fn builder(&self, id: u64) -> Result<SegmentBuilder> {
        SegmentBuilder::new(&self.path(id), self.index_interval, self.bloom_bits_per_key)
    }

    /// Write sorted records into segment `id` and return its handle
    ///
    /// The file is fsynced and renamed into place before this returns.
    /// Fails on empty or out-of-order input, leaving no file behind.
    pub fn write<I>(&self, id: u64, level: u32, records: I) -> Result<SegmentMeta>
    where
        I: IntoIterator<Item = Result<Record>>,
    {
        let mut builder = self.builder(id)?;
        for record in records {
            let added = record.and_then(|r| builder.add(&r));
            if let Err(e) = added {
                builder.abandon();
                return Err(e);
            }
        }
        let meta = builder.finish(id, level)?;

        tracing::debug!(
            segment_id = id,
            level,
            records = meta.record_count,
            bytes = meta.file_size,
            "segment written"
        );
        Ok(meta)
    }

    /// Open a committed segment for reading
    pub fn open_segment(&self, meta: &SegmentMeta) -> Result<Arc<SegmentReader>> {
        Ok(Arc::new(SegmentReader::open(&self.path(meta.id), meta.clone())?))
    }

    /// Remove a segment file (missing files are not an error)
    pub fn delete(&self, id: u64) -> Result<()> {
        match fs::remove_file(self.path(id)) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e.into()),
        }
        util::sync_dir(&self.dir)?;
        Ok(())
    }

    /// Delete every segment file whose id is not in `live`, along with
    /// temporary files left by interrupted writes
    ///
    /// Returns the ids removed.
    pub fn remove_orphans(&self, live: &HashSet<u64>) -> Result<Vec<u64>> {
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            let is_tmp = path
                .file_name()
                .and_then(|name| name.to_str())
                .map_or(false, |name| name.ends_with(".seg.tmp"));
            if is_tmp {
                tracing::info!(path = %path.display(), "removing interrupted segment write");
                fs::remove_file(&path)?;
            }
        }

        let mut removed = Vec::new();
        for id in self.segment_ids()? {
            if !live.contains(&id) {
                tracing::info!(segment_id = id, "removing orphan segment");
                self.delete(id)?;
                removed.push(id);
            }
        }
        Ok(removed)
    }

    /// Ids of the segment files on disk, ascending
    pub fn segment_ids(&self) -> Result<Vec<u64>> {
        util::list_numbered(&self.dir, SEGMENT_EXTENSION)
    }

    /// Generate the file path for a segment with given ID
    pub fn path(&self, id: u64) -> PathBuf {
        util::numbered_path(&self.dir, id, SEGMENT_EXTENSION)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}
