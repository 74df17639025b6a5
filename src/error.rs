//! Error types for mxfcap
//!
//! Provides a unified error type for all codec, navigation and commit operations.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias using MxfError
pub type Result<T> = std::result::Result<T, MxfError>;

/// Unified error type for mxfcap operations
#[derive(Debug, Error)]
pub enum MxfError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // -------------------------------------------------------------------------
    // Codec Errors
    // -------------------------------------------------------------------------
    #[error("Malformed KLV: {0}")]
    MalformedKlv(String),

    #[error("Capacity exceeded: {item} would be {size} bytes (local item limit is 65535)")]
    CapacityExceeded { item: &'static str, size: usize },

    #[error("Shape mismatch: {0}")]
    ShapeMismatch(String),

    // -------------------------------------------------------------------------
    // Navigation Errors
    // -------------------------------------------------------------------------
    #[error("Corrupt partition chain: {0}")]
    CorruptPartitionChain(String),

    #[error("Position {0} is not covered by the index")]
    PositionNotIndexed(i64),

    // -------------------------------------------------------------------------
    // API Misuse
    // -------------------------------------------------------------------------
    #[error("Unknown track: {0}")]
    UnknownTrack(u32),

    #[error("Invalid sequencing: {0}")]
    InvalidSequencing(String),

    #[error("Invalid sample: {0}")]
    InvalidSample(String),

    // -------------------------------------------------------------------------
    // Commit Errors
    // -------------------------------------------------------------------------
    #[error("Filesystem error on {path:?}: {source}")]
    Filesystem {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Persistence error: {0}")]
    Persistence(String),

    // -------------------------------------------------------------------------
    // Serialization Errors
    // -------------------------------------------------------------------------
    #[error("Serialization error: {0}")]
    Serialization(String),

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),
}

impl MxfError {
    /// Wrap an I/O error with the path it happened on
    pub fn filesystem(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        MxfError::Filesystem {
            path: path.into(),
            source,
        }
    }

    /// Map a short read into `MalformedKlv`, leaving other I/O errors alone
    pub(crate) fn from_read(err: std::io::Error, what: &str) -> Self {
        if err.kind() == std::io::ErrorKind::UnexpectedEof {
            MxfError::MalformedKlv(format!("truncated input while reading {}", what))
        } else {
            MxfError::Io(err)
        }
    }
}
