//! WAL Reader
//!
//! Reads frames from a single WAL file.
//!
//! ## Damage Handling
//! - A frame whose header or payload runs past end of file is a torn write:
//!   reading stops there without error.
//! - A frame failing its checksum is counted as corrupt. It is skipped when
//!   the bytes after it are end of file or another valid frame; otherwise
//!   the rest of the file is treated as a torn tail.

use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use super::frame::{self, FrameParse, HEADER_SIZE};
use crate::error::Result;
use crate::record::Record;

/// Reads frames from one WAL file
pub struct WalReader {
    file: BufReader<File>,
    path: PathBuf,

    /// Offset of the next frame to read
    position: u64,

    /// File length when opened
    file_len: u64,

    /// Frames successfully returned
    frames_read: u64,

    /// Frames skipped or cut because of a checksum failure
    frames_corrupted: u64,

    /// Where the valid prefix of the file ends, if damage was found
    torn_at: Option<u64>,
}

impl WalReader {
    /// Open a WAL file for reading from the beginning
    pub fn open(path: &Path) -> Result<Self> {
        Self::open_at(path, 0)
    }

    /// Open a WAL file for reading from `offset`
    pub fn open_at(path: &Path, offset: u64) -> Result<Self> {
        let file = File::open(path)?;
        let file_len = file.metadata()?.len();

        Ok(Self {
            file: BufReader::new(file),
            path: path.to_path_buf(),
            position: offset.min(file_len),
            file_len,
            frames_read: 0,
            frames_corrupted: 0,
            torn_at: None,
        })
    }

    /// Read the next valid record, or `None` at end of the usable log
    pub fn next_record(&mut self) -> Result<Option<Record>> {
        loop {
            if self.position >= self.file_len {
                return Ok(None);
            }

            match self.parse_at(self.position)? {
                FrameParse::Complete { record, len } => {
                    self.position += len as u64;
                    self.frames_read += 1;
                    return Ok(Some(record));
                }
                FrameParse::Incomplete => {
                    tracing::debug!(
                        path = %self.path.display(),
                        offset = self.position,
                        "partial WAL frame at tail"
                    );
                    self.stop_at(self.position);
                    return Ok(None);
                }
                FrameParse::Corrupt { len } => {
                    self.frames_corrupted += 1;
                    let next = self.position + len as u64;

                    if next < self.file_len
                        && matches!(self.parse_at(next)?, FrameParse::Complete { .. })
                    {
                        tracing::warn!(
                            path = %self.path.display(),
                            offset = self.position,
                            "skipping corrupt WAL frame"
                        );
                        self.position = next;
                        continue;
                    }

                    tracing::warn!(
                        path = %self.path.display(),
                        offset = self.position,
                        "corrupt WAL frame at tail, ignoring rest of file"
                    );
                    self.stop_at(self.position);
                    return Ok(None);
                }
            }
        }
    }

    /// Iterate over all remaining valid records
    pub fn records(self) -> WalIterator {
        WalIterator {
            reader: self,
            done: false,
        }
    }

    /// Offset of the next frame to read
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Number of records returned so far
    pub fn frames_read(&self) -> u64 {
        self.frames_read
    }

    /// Number of frames that failed their checksum
    pub fn frames_corrupted(&self) -> u64 {
        self.frames_corrupted
    }

    /// End of the valid prefix, if a torn or corrupt tail was found
    pub fn torn_at(&self) -> Option<u64> {
        self.torn_at
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn stop_at(&mut self, offset: u64) {
        self.torn_at = Some(offset);
        self.position = self.file_len;
    }

    /// Parse the frame starting at `offset` without moving the read position
    fn parse_at(&mut self, offset: u64) -> Result<FrameParse> {
        let remaining = self.file_len - offset;
        if remaining < HEADER_SIZE as u64 {
            return Ok(FrameParse::Incomplete);
        }

        self.file.seek(SeekFrom::Start(offset))?;
        let mut header = [0u8; HEADER_SIZE];
        self.file.read_exact(&mut header)?;

        let total = HEADER_SIZE as u64 + frame::payload_len(&header) as u64;
        if total > remaining {
            return Ok(FrameParse::Incomplete);
        }

        let mut buf = vec![0u8; total as usize];
        buf[..HEADER_SIZE].copy_from_slice(&header);
        self.file.read_exact(&mut buf[HEADER_SIZE..])?;

        Ok(frame::parse_frame(&buf))
    }
}

/// Iterator over the records of one WAL file
pub struct WalIterator {
    reader: WalReader,
    done: bool,
}

impl WalIterator {
    /// Access the underlying reader (statistics)
    pub fn reader(&self) -> &WalReader {
        &self.reader
    }
}

impl Iterator for WalIterator {
    type Item = Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.reader.next_record() {
            Ok(Some(record)) => Some(Ok(record)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}
