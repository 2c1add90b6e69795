//! WAL directory management
//!
//! Owns the numbered log files under `{data_dir}/wal/`: the active file
//! that appends go to, rotation when a memtable is frozen, lazy replay from
//! a checkpoint, and removal of files already reflected in segments.

use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;

use super::{LogPosition, WalReader, WalRecovery, WalWriter};
use crate::error::Result;
use crate::record::Record;
use crate::util;

const WAL_EXTENSION: &str = "log";

/// The write-ahead log of one engine
///
/// ## Concurrency:
/// - `writer`: Mutex, appends and rotation are serialized
/// - `truncate_before` only removes files older than the active one, so it
///   can run while appends continue on the tail
pub struct Wal {
    dir: PathBuf,
    writer: Mutex<WalWriter>,
}

impl Wal {
    /// Open the WAL directory and start a fresh active file
    ///
    /// Existing files are never appended to again. The newest one gets its
    /// torn tail (if any) cut so it replays cleanly.
    pub fn open(dir: &Path) -> Result<Self> {
        Self::open_after(dir, LogPosition::default())
    }

    /// Like `open`, but the new active file is also numbered after
    /// `checkpoint`, so replay from that checkpoint always reaches it
    pub fn open_after(dir: &Path, checkpoint: LogPosition) -> Result<Self> {
        fs::create_dir_all(dir)?;

        let ids = util::list_numbered(dir, WAL_EXTENSION)?;
        if let Some(&newest) = ids.last() {
            let result = WalRecovery::repair(&Self::path_for(dir, newest))?;
            tracing::debug!(
                file_id = newest,
                frames = result.entries_recovered,
                corrupted = result.entries_corrupted,
                "checked newest WAL file"
            );
        }

        let next_id = ids
            .last()
            .map(|&id| id + 1)
            .unwrap_or(1)
            .max(checkpoint.file_id + 1);
        let writer = WalWriter::open(&Self::path_for(dir, next_id), next_id)?;
        util::sync_dir(dir)?;

        tracing::debug!(file_id = next_id, existing = ids.len(), "WAL opened");

        Ok(Self {
            dir: dir.to_path_buf(),
            writer: Mutex::new(writer),
        })
    }

    /// Durably append one record; returns its position
    pub fn append(&self, record: &Record) -> Result<LogPosition> {
        self.writer.lock().append(record)
    }

    /// Seal the active file and start a new one
    ///
    /// Returns the start of the new file: every frame appended before this
    /// call lies strictly before the returned position.
    pub fn rotate(&self) -> Result<LogPosition> {
        let mut writer = self.writer.lock();
        writer.sync()?;

        let next_id = writer.file_id() + 1;
        let next = WalWriter::open(&Self::path_for(&self.dir, next_id), next_id)?;
        util::sync_dir(&self.dir)?;
        *writer = next;

        tracing::debug!(file_id = next_id, "WAL rotated");
        Ok(LogPosition::start_of(next_id))
    }

    /// Lazily replay every frame at or after `from`, in append order
    pub fn replay(&self, from: LogPosition) -> Result<WalReplay> {
        let files = util::list_numbered(&self.dir, WAL_EXTENSION)?
            .into_iter()
            .filter(|&id| id >= from.file_id)
            .map(|id| {
                let offset = if id == from.file_id { from.offset } else { 0 };
                (id, offset)
            })
            .collect();

        Ok(WalReplay {
            dir: self.dir.clone(),
            files,
            current: None,
            frames_corrupted: 0,
        })
    }

    /// Delete whole log files that end before `position`
    ///
    /// The active file is never removed. Returns the number of files deleted.
    pub fn truncate_before(&self, position: LogPosition) -> Result<usize> {
        let active = self.writer.lock().file_id();
        let mut removed = 0;

        for id in util::list_numbered(&self.dir, WAL_EXTENSION)? {
            if id >= position.file_id || id >= active {
                break;
            }
            fs::remove_file(Self::path_for(&self.dir, id))?;
            removed += 1;
        }

        if removed > 0 {
            util::sync_dir(&self.dir)?;
            tracing::debug!(removed, before = %position, "WAL files truncated");
        }
        Ok(removed)
    }

    /// Make the next append fail after writing its bytes
    #[cfg(test)]
    pub(crate) fn fail_next_append(&self) {
        self.writer.lock().fail_next_sync();
    }

    /// Force sync of the active file
    pub fn sync(&self) -> Result<()> {
        self.writer.lock().sync()
    }

    /// Position the next append will land at
    pub fn position(&self) -> LogPosition {
        self.writer.lock().position()
    }

    /// Ids of the log files currently on disk
    pub fn file_ids(&self) -> Result<Vec<u64>> {
        util::list_numbered(&self.dir, WAL_EXTENSION)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(dir: &Path, id: u64) -> PathBuf {
        util::numbered_path(dir, id, WAL_EXTENSION)
    }
}

/// Lazy, single-pass replay across WAL files
///
/// Yields records in append order. A corrupt or torn region ends replay of
/// that file only; the next file is still read.
pub struct WalReplay {
    dir: PathBuf,
    files: VecDeque<(u64, u64)>,
    current: Option<WalReader>,
    frames_corrupted: u64,
}

impl WalReplay {
    /// Frames skipped so far because of checksum failures
    pub fn frames_corrupted(&self) -> u64 {
        self.frames_corrupted
            + self
                .current
                .as_ref()
                .map_or(0, |reader| reader.frames_corrupted())
    }

    fn finish_current(&mut self) {
        if let Some(reader) = self.current.take() {
            self.frames_corrupted += reader.frames_corrupted();
            if reader.frames_corrupted() > 0 || reader.torn_at().is_some() {
                tracing::warn!(
                    path = %reader.path().display(),
                    frames = reader.frames_read(),
                    corrupted = reader.frames_corrupted(),
                    torn_at = ?reader.torn_at(),
                    "WAL file replayed with damage"
                );
            }
        }
    }
}

impl Iterator for WalReplay {
    type Item = Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.current.is_none() {
                let (id, offset) = self.files.pop_front()?;
                let path = Wal::path_for(&self.dir, id);
                match WalReader::open_at(&path, offset) {
                    Ok(reader) => self.current = Some(reader),
                    Err(e) => {
                        self.files.clear();
                        return Some(Err(e));
                    }
                }
            }

            let reader = self.current.as_mut()?;
            match reader.next_record() {
                Ok(Some(record)) => return Some(Ok(record)),
                Ok(None) => self.finish_current(),
                Err(e) => {
                    self.current = None;
                    self.files.clear();
                    return Some(Err(e));
                }
            }
        }
    }
}
