//! WAL Writer
//!
//! Appends frames to a single WAL file. Every append is forced to stable
//! storage before it returns.

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use super::{LogFrame, LogPosition};
use crate::error::Result;
use crate::record::Record;

/// Writes frames to one WAL file
pub struct WalWriter {
    /// Open file handle (append mode)
    file: File,

    /// Path of the file, for logging
    path: PathBuf,

    /// Numeric id of this log file
    file_id: u64,

    /// Offset where the next frame will be written
    offset: u64,

    /// Fail the next append's sync, after its bytes were written
    #[cfg(test)]
    fail_next_sync: bool,
}

impl WalWriter {
    /// Open or create a WAL file, positioned at its end
    pub fn open(path: &Path, file_id: u64) -> Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        let offset = file.metadata()?.len();

        Ok(Self {
            file,
            path: path.to_path_buf(),
            file_id,
            offset,
            #[cfg(test)]
            fail_next_sync: false,
        })
    }

    /// Append a record and fsync it
    ///
    /// Returns the position of the frame. If the write or sync fails the
    /// file is cut back to the previous end so no partial frame lingers.
    pub fn append(&mut self, record: &Record) -> Result<LogPosition> {
        let bytes = LogFrame::new(record.clone()).serialize()?;
        let position = LogPosition::new(self.file_id, self.offset);

        let written = self.file.write_all(&bytes).and_then(|_| self.sync_append());

        if let Err(e) = written {
            tracing::error!(
                path = %self.path.display(),
                offset = self.offset,
                error = %e,
                "WAL append failed"
            );
            if let Err(truncate_err) = self.file.set_len(self.offset) {
                tracing::warn!(
                    path = %self.path.display(),
                    offset = self.offset,
                    error = %truncate_err,
                    "failed to cut back partial WAL frame"
                );
            }
            return Err(e.into());
        }

        self.offset += bytes.len() as u64;
        Ok(position)
    }

    fn sync_append(&mut self) -> io::Result<()> {
        #[cfg(test)]
        if std::mem::take(&mut self.fail_next_sync) {
            return Err(io::Error::new(io::ErrorKind::Other, "injected WAL sync failure"));
        }
        self.file.sync_data()
    }

    #[cfg(test)]
    pub(crate) fn fail_next_sync(&mut self) {
        self.fail_next_sync = true;
    }

    /// Force sync to disk
    pub fn sync(&mut self) -> Result<()> {
        self.file.sync_all()?;
        Ok(())
    }

    /// Id of the file this writer appends to
    pub fn file_id(&self) -> u64 {
        self.file_id
    }

    /// Position where the next frame will land
    pub fn position(&self) -> LogPosition {
        LogPosition::new(self.file_id, self.offset)
    }

    /// Path of the file
    pub fn path(&self) -> &Path {
        &self.path
    }
}
