//! # mxfcap
//!
//! Capture-side MXF codec and commit engine:
//! - KLV/BER primitive codec with reserve-then-patch lengths
//! - Index table segments mapping edit units to byte offsets
//! - Partition directory discovery via the RIP or the backward chain
//! - Per-track clip writing with a crash-safe three-directory commit
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     Capture Session                         │
//! │           (one track writer per capture input)              │
//! └─────────────────────┬──────────────────────┬────────────────┘
//!                       │                      │ once, after commit
//!                       ▼                      ▼
//!              ┌─────────────────┐     ┌─────────────────┐
//!              │   Clip Writer   │     │  Package Store  │
//!              │ (one MXF file)  │     │ (append-only)   │
//!              └───┬─────────┬───┘     └─────────────────┘
//!                  │         │
//!                  ▼         ▼
//!         ┌────────────┐ ┌────────────┐
//!         │ Partition  │ │   Index    │
//!         │ Directory  │ │  Segments  │
//!         └─────┬──────┘ └─────┬──────┘
//!               │              │
//!               ▼              ▼
//!         ┌───────────────────────────┐
//!         │     KLV / BER Codec       │
//!         └───────────────────────────┘
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod klv;
pub mod index;
pub mod partition;
pub mod clip;
pub mod capture;
pub mod persistence;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{MxfError, Result};
pub use config::{CommitSyncStrategy, Config};
pub use capture::{CaptureSession, CommitReport, EssenceKind, EssenceLayout, TrackConfig, WriteMode};
pub use clip::{ClipReader, ClipWriter, MxfClipWriter};
pub use partition::PartitionDirectory;
pub use persistence::{LogPackageStore, PackageStore};

// =============================================================================
// Version Info
// =============================================================================

/// Current version of mxfcap
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
