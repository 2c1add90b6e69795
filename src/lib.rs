//! # LineraDB Storage Core
//!
//! The single-node storage engine underneath LineraDB:
//! - Write-Ahead Logging (WAL) for durability, with per-append fsync
//! - Multi-version memtable with snapshot reads
//! - Immutable sorted segments with sparse index and bloom filter
//! - Manifest edit log as the source of truth for the segment set
//! - Background flush and compaction
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                  Engine (put/get/delete/scan)                │
//! │            (Single Writer / Snapshot Readers)                │
//! └──────┬──────────────────────┬───────────────────────┬───────┘
//!        │                      │                       │
//!        ▼                      ▼                       ▼
//! ┌─────────────┐      ┌─────────────────┐     ┌─────────────────┐
//! │     WAL     │      │    MemTables    │     │   Maintenance   │
//! │  (Append)   │      │ active + frozen │     │ flush / compact │
//! └─────────────┘      └────────┬────────┘     └────────┬────────┘
//!                               │ flush                 │
//!                               ▼                       ▼
//!                      ┌─────────────────┐     ┌─────────────────┐
//!                      │    Segments     │◄────│    Manifest     │
//!                      │ (index, bloom)  │     │   (edit log)    │
//!                      └─────────────────┘     └─────────────────┘
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod config;
pub mod error;

pub mod engine;
pub mod memtable;
pub mod record;
pub mod storage;
pub mod wal;

mod util;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use config::{Config, ConfigBuilder};
pub use engine::{CancellationToken, Engine, EngineStats, ScanIter, Snapshot, WriteBatch};
pub use error::{LineraError, Result};
pub use record::{KeyRange, Record, SeqNo};
pub use storage::SegmentMeta;

// =============================================================================
// Version Info
// =============================================================================

/// Current version of LineraDB
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Startup banner, e.g. `LineraDB v0.1.0-dev`
pub fn banner() -> String {
    format!("LineraDB v{}", VERSION)
}
