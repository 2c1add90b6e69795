//! Write-Ahead Log (WAL) Module
//!
//! Provides durability guarantees through append-only logging.
//!
//! ## Responsibilities
//! - Append one frame per mutation and fsync it before acknowledging
//! - CRC32 checksums for corruption and torn-write detection
//! - Numbered log files so flushed prefixes can be dropped whole
//! - Lazy replay from the manifest checkpoint at startup
//!
//! ## File Format
//! ```text
//! {data_dir}/wal/00000000000000000001.log
//! ┌─────────────────────────────────────────┐
//! │ Frame 1                                 │
//! │ ┌─────────┬─────────┬─────────────────┐ │
//! │ │ CRC (4) │ Len (4) │ Encoded Record  │ │
//! │ └─────────┴─────────┴─────────────────┘ │
//! ├─────────────────────────────────────────┤
//! │ Frame 2                                 │
//! │ ┌─────────┬─────────┬─────────────────┐ │
//! │ │ CRC (4) │ Len (4) │ Encoded Record  │ │
//! │ └─────────┴─────────┴─────────────────┘ │
//! └─────────────────────────────────────────┘
//! ```
//! The frame CRC covers the length prefix and the payload.

mod frame;
mod manager;
mod reader;
mod recovery;
mod writer;

use serde::{Deserialize, Serialize};

pub use frame::{LogFrame, HEADER_SIZE};
pub use manager::{Wal, WalReplay};
pub use reader::{WalIterator, WalReader};
pub use recovery::{RecoveryResult, WalRecovery};
pub use writer::WalWriter;

/// Position of a frame in the WAL: file id, then byte offset in that file
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct LogPosition {
    pub file_id: u64,
    pub offset: u64,
}

impl LogPosition {
    pub fn new(file_id: u64, offset: u64) -> Self {
        Self { file_id, offset }
    }

    /// Position of the first frame of a log file
    pub fn start_of(file_id: u64) -> Self {
        Self { file_id, offset: 0 }
    }
}

impl std::fmt::Display for LogPosition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.file_id, self.offset)
    }
}
