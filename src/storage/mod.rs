//! Storage Module
//!
//! Persistent, immutable on-disk state: segments and the manifest that
//! names the live ones.
//!
//! ## Responsibilities
//! - Write sorted record runs into segment files (sparse index + bloom)
//! - Point lookups and range iteration over segments
//! - Track the live segment set and WAL checkpoint durably
//! - Remove files that the manifest no longer references
//!
//! ## Directory Layout
//! ```text
//! {data_dir}/
//! ├── MANIFEST                      edit log (see `manifest`)
//! ├── wal/
//! │   └── 00000000000000000001.wal  numbered WAL files
//! └── segments/
//!     └── 00000000000000000007.seg  numbered segment files
//! ```

pub mod bloom;
pub mod manifest;
pub mod segment;
mod store;

pub use bloom::BloomFilter;
pub use manifest::{Manifest, ManifestEdit, ManifestState};
pub use segment::{
    SegmentBuilder, SegmentIter, SegmentMeta, SegmentReader, COMPACTED_LEVEL, FLUSHED_LEVEL,
};
pub use store::SegmentStore;
