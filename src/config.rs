//! Configuration for mxfcap
//!
//! Centralized configuration with sensible defaults.

use std::path::{Path, PathBuf};

use crate::error::{MxfError, Result};

/// Main configuration for a capture session
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Commit Directories
    // -------------------------------------------------------------------------
    /// Where clip files live while they are being written
    pub creating_dir: PathBuf,

    /// Where successfully finalized clip files are moved
    pub destination_dir: PathBuf,

    /// Where clip files go when finalize or the move fails
    ///
    /// The three directories may sit on different filesystems. A move that
    /// cannot be a rename becomes copy, fsync, then remove.
    pub failures_dir: PathBuf,

    /// Whether closed clip files are fsynced before relocation
    pub sync_strategy: CommitSyncStrategy,

    // -------------------------------------------------------------------------
    // File Layout
    // -------------------------------------------------------------------------
    /// Key alignment grid recorded in partition packs
    pub kag_size: u32,

    /// Edit units per body partition (None = one body partition per file)
    pub body_partition_interval: Option<u64>,

    /// Stream ID of the index table
    pub index_sid: u32,

    /// Stream ID of the essence container
    pub body_sid: u32,

    // -------------------------------------------------------------------------
    // Index Configuration
    // -------------------------------------------------------------------------
    /// Above this many index entries, segments are emitted with the streaming writer
    pub streaming_index_threshold: usize,
}

/// Durability applied to a clip file before it is relocated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitSyncStrategy {
    /// fsync every clip file before moving it (safest)
    EveryFile,

    /// Leave flushing to the OS
    None,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            creating_dir: PathBuf::from("./capture/creating"),
            destination_dir: PathBuf::from("./capture/destination"),
            failures_dir: PathBuf::from("./capture/failures"),
            sync_strategy: CommitSyncStrategy::EveryFile,
            kag_size: 1,
            body_partition_interval: None,
            index_sid: 1,
            body_sid: 2,
            streaming_index_threshold: 1024,
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Check the configuration for values the commit protocol cannot work with
    pub fn validate(&self) -> Result<()> {
        if self.kag_size == 0 {
            return Err(MxfError::Config("kag_size must be at least 1".to_string()));
        }
        if self.body_partition_interval == Some(0) {
            return Err(MxfError::Config(
                "body_partition_interval must be positive".to_string(),
            ));
        }
        if self.index_sid == 0 || self.body_sid == 0 || self.index_sid == self.body_sid {
            return Err(MxfError::Config(format!(
                "index_sid ({}) and body_sid ({}) must be distinct and non-zero",
                self.index_sid, self.body_sid
            )));
        }

        let dirs: [&Path; 3] = [&self.creating_dir, &self.destination_dir, &self.failures_dir];
        for (i, a) in dirs.iter().enumerate() {
            for b in &dirs[i + 1..] {
                if a == b {
                    return Err(MxfError::Config(format!(
                        "commit directories must be distinct, {:?} is used twice",
                        a
                    )));
                }
            }
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
    /// Set all three commit directories under one root
    ///
    /// ```text
    ///   {root}/
    ///     ├── creating/
    ///     ├── destination/
    ///     └── failures/
    /// ```
    pub fn root_dir(mut self, root: impl AsRef<Path>) -> Self {
        let root = root.as_ref();
        self.config.creating_dir = root.join("creating");
        self.config.destination_dir = root.join("destination");
        self.config.failures_dir = root.join("failures");
        self
    }

    /// Set the creating directory
    pub fn creating_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.creating_dir = path.into();
        self
    }

    /// Set the destination directory
    pub fn destination_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.destination_dir = path.into();
        self
    }

    /// Set the failures directory
    pub fn failures_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.failures_dir = path.into();
        self
    }

    /// Set the sync strategy used before relocation
    pub fn sync_strategy(mut self, strategy: CommitSyncStrategy) -> Self {
        self.config.sync_strategy = strategy;
        self
    }

    /// Set the KAG size
    pub fn kag_size(mut self, size: u32) -> Self {
        self.config.kag_size = size;
        self
    }

    /// Start a new body partition every `edit_units` edit units
    pub fn body_partition_interval(mut self, edit_units: u64) -> Self {
        self.config.body_partition_interval = Some(edit_units);
        self
    }

    /// Set the index stream ID
    pub fn index_sid(mut self, sid: u32) -> Self {
        self.config.index_sid = sid;
        self
    }

    /// Set the essence stream ID
    pub fn body_sid(mut self, sid: u32) -> Self {
        self.config.body_sid = sid;
        self
    }

    /// Set the entry count above which index segments are streamed
    pub fn streaming_index_threshold(mut self, count: usize) -> Self {
        self.config.streaming_index_threshold = count;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
