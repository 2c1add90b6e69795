//! WAL Recovery
//!
//! Inspects and repairs a single WAL file after a crash.

use std::fs::OpenOptions;
use std::path::Path;

use super::WalReader;
use crate::error::Result;
use crate::record::Record;

/// Handles WAL recovery after crash
pub struct WalRecovery;

/// Result of a recovery operation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecoveryResult {
    /// Number of entries successfully recovered
    pub entries_recovered: u64,

    /// Number of corrupted entries skipped
    pub entries_corrupted: u64,

    /// Highest sequence number among recovered entries
    pub last_seq: u64,

    /// Whether the file has a damaged tail (cut by `recover`/`repair`)
    pub was_truncated: bool,
}

impl WalRecovery {
    /// Recover entries from a WAL file
    ///
    /// This will:
    /// 1. Read all valid entries
    /// 2. Skip corrupted entries that the log resynchronizes after
    /// 3. Truncate a torn or corrupt tail
    /// 4. Return all valid entries in order
    pub fn recover(path: &Path) -> Result<(Vec<Record>, RecoveryResult)> {
        let (entries, result, torn_at) = Self::scan(path, true)?;
        if let Some(offset) = torn_at {
            Self::truncate(path, offset)?;
        }
        Ok((entries, result))
    }

    /// Truncate a torn tail without collecting entries
    pub fn repair(path: &Path) -> Result<RecoveryResult> {
        let (_, result, torn_at) = Self::scan(path, false)?;
        if let Some(offset) = torn_at {
            Self::truncate(path, offset)?;
            tracing::info!(
                path = %path.display(),
                offset,
                corrupted = result.entries_corrupted,
                "cut damaged WAL tail"
            );
        }
        Ok(result)
    }

    /// Verify integrity of a WAL file without modifying it
    pub fn verify(path: &Path) -> Result<RecoveryResult> {
        let (_, result, _) = Self::scan(path, false)?;
        Ok(result)
    }

    fn scan(path: &Path, collect: bool) -> Result<(Vec<Record>, RecoveryResult, Option<u64>)> {
        let mut reader = WalReader::open(path)?;
        let mut entries = Vec::new();
        let mut last_seq = 0;

        while let Some(record) = reader.next_record()? {
            last_seq = last_seq.max(record.seq);
            if collect {
                entries.push(record);
            }
        }

        let result = RecoveryResult {
            entries_recovered: reader.frames_read(),
            entries_corrupted: reader.frames_corrupted(),
            last_seq,
            was_truncated: reader.torn_at().is_some(),
        };

        Ok((entries, result, reader.torn_at()))
    }

    fn truncate(path: &Path, offset: u64) -> Result<()> {
        let file = OpenOptions::new().write(true).open(path)?;
        file.set_len(offset)?;
        file.sync_all()?;
        Ok(())
    }
}
