//! MemTable Module
//!
//! In-memory data structure for recent writes.
//!
//! ## Responsibilities
//! - Fast reads and writes in memory
//! - Single-writer/multi-reader access without locks
//! - Track size for flush triggers
//! - Ordered iteration for segment creation and range scans
//!
//! ## Data Structure Choice
//! A lock-free skip list keyed by `(user key, sequence descending)`:
//! - Ordered keys (required for segment generation)
//! - Readers never block the single writer
//! - Older versions stay reachable for readers holding an older snapshot
//!
//! The table provides no write serialization of its own. The engine's
//! write path is the only caller of `put`.

mod table;

pub use table::{ImmutableMemTable, MemTable, MemTableIter};
