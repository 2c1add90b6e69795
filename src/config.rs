//! Configuration for LineraDB
//!
//! Centralized configuration with sensible defaults.

use std::path::PathBuf;

use crate::error::{LineraError, Result};

/// Main configuration for a LineraDB storage engine
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Storage Configuration
    // -------------------------------------------------------------------------
    /// Root directory for all data files
    /// Internal structure:
    ///   {data_dir}/
    ///     ├── MANIFEST       (segment set + WAL checkpoint)
    ///     ├── wal/           (numbered write-ahead log files)
    ///     └── segments/      (immutable sorted segment files)
    pub data_dir: PathBuf,

    // -------------------------------------------------------------------------
    // MemTable Configuration
    // -------------------------------------------------------------------------
    /// Max size of the active memtable before it is frozen (in bytes)
    pub memtable_size_limit: u64,

    /// Frozen memtables allowed to wait for flush before writers stall
    pub max_frozen_memtables: usize,

    // -------------------------------------------------------------------------
    // Segment Configuration
    // -------------------------------------------------------------------------
    /// One sparse index entry is written every N records
    pub segment_index_interval: usize,

    /// Bloom filter bits per key (≈1% false positives at 10)
    pub bloom_bits_per_key: usize,

    /// Number of live segments that triggers a background compaction
    pub compaction_trigger: usize,

    // -------------------------------------------------------------------------
    // Limits
    // -------------------------------------------------------------------------
    /// Largest accepted key (in bytes)
    pub max_key_size: usize,

    /// Largest accepted value (in bytes)
    pub max_value_size: usize,

    // -------------------------------------------------------------------------
    // Manifest Configuration
    // -------------------------------------------------------------------------
    /// Manifest log records before it is rewritten as a single snapshot
    pub manifest_rewrite_threshold: u64,

    // -------------------------------------------------------------------------
    // Background Maintenance
    // -------------------------------------------------------------------------
    /// Run flush/compaction on a background thread. When false, flushes
    /// happen inline on the write path and compaction only runs on demand.
    pub background_maintenance: bool,

    /// Attempts per background operation before giving up
    pub maintenance_retry_limit: u32,

    /// Base delay between retries (milliseconds, doubled each attempt)
    pub maintenance_backoff_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./lineradb_data"),
            memtable_size_limit: 64 * 1024 * 1024, // 64 MB
            max_frozen_memtables: 4,
            segment_index_interval: 16,
            bloom_bits_per_key: 10,
            compaction_trigger: 4,
            max_key_size: 64 * 1024,          // 64 KB
            max_value_size: 16 * 1024 * 1024, // 16 MB
            manifest_rewrite_threshold: 64,
            background_maintenance: true,
            maintenance_retry_limit: 5,
            maintenance_backoff_ms: 50,
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Reject settings the engine cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.memtable_size_limit == 0 {
            return Err(LineraError::Config(
                "memtable_size_limit must be greater than zero".to_string(),
            ));
        }
        if self.max_frozen_memtables == 0 {
            return Err(LineraError::Config(
                "max_frozen_memtables must be at least 1".to_string(),
            ));
        }
        if self.segment_index_interval == 0 {
            return Err(LineraError::Config(
                "segment_index_interval must be at least 1".to_string(),
            ));
        }
        if self.bloom_bits_per_key == 0 {
            return Err(LineraError::Config(
                "bloom_bits_per_key must be at least 1".to_string(),
            ));
        }
        if self.compaction_trigger < 2 {
            return Err(LineraError::Config(
                "compaction_trigger must be at least 2".to_string(),
            ));
        }
        if self.max_key_size == 0 || self.max_value_size == 0 {
            return Err(LineraError::Config(
                "max_key_size and max_value_size must be greater than zero".to_string(),
            ));
        }
        if self.manifest_rewrite_threshold == 0 {
            return Err(LineraError::Config(
                "manifest_rewrite_threshold must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the data directory (root for all storage)
    pub fn data_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.data_dir = path.into();
        self
    }

    /// Set the memtable size limit (in bytes)
    pub fn memtable_size_limit(mut self, size: u64) -> Self {
        self.config.memtable_size_limit = size;
        self
    }

    /// Set how many frozen memtables may queue for flush
    pub fn max_frozen_memtables(mut self, count: usize) -> Self {
        self.config.max_frozen_memtables = count;
        self
    }

    /// Set the sparse index interval (in records)
    pub fn segment_index_interval(mut self, interval: usize) -> Self {
        self.config.segment_index_interval = interval;
        self
    }

    /// Set the bloom filter bits per key
    pub fn bloom_bits_per_key(mut self, bits: usize) -> Self {
        self.config.bloom_bits_per_key = bits;
        self
    }

    /// Set the segment count that triggers compaction
    pub fn compaction_trigger(mut self, count: usize) -> Self {
        self.config.compaction_trigger = count;
        self
    }

    /// Set the maximum key size (in bytes)
    pub fn max_key_size(mut self, size: usize) -> Self {
        self.config.max_key_size = size;
        self
    }

    /// Set the maximum value size (in bytes)
    pub fn max_value_size(mut self, size: usize) -> Self {
        self.config.max_value_size = size;
        self
    }

    /// Set the manifest rewrite threshold (in log records)
    pub fn manifest_rewrite_threshold(mut self, records: u64) -> Self {
        self.config.manifest_rewrite_threshold = records;
        self
    }

    /// Enable or disable the background maintenance thread
    pub fn background_maintenance(mut self, enabled: bool) -> Self {
        self.config.background_maintenance = enabled;
        self
    }

    /// Set the retry limit for background operations
    pub fn maintenance_retry_limit(mut self, attempts: u32) -> Self {
        self.config.maintenance_retry_limit = attempts;
        self
    }

    /// Set the base retry backoff (in milliseconds)
    pub fn maintenance_backoff_ms(mut self, ms: u64) -> Self {
        self.config.maintenance_backoff_ms = ms;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
