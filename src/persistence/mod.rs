//! Package Persistence
//!
//! The capture session hands its package records to a [`PackageStore`] once,
//! after every track has been committed. The store is the only state shared
//! between capture threads and does its own locking.
//!
//! ## Log File Format
//! ```text
//! ┌──────────────────────────────────────────────────┐
//! │ Frame 1                                          │
//! │ ┌─────────┬─────────┬─────────┬────────────────┐ │
//! │ │ Seq (8) │ CRC (4) │ Len (4) │ bincode record │ │
//! │ └─────────┴─────────┴─────────┴────────────────┘ │
//! ├──────────────────────────────────────────────────┤
//! │ Frame 2 ...                                      │
//! └──────────────────────────────────────────────────┘
//! ```
//! Integers are little-endian; the CRC covers the record bytes only.

mod record;
mod store;

pub use record::{FilePackageRecord, MaterialPackageRecord, SessionPackages};
pub use store::{LogPackageStore, PackageStore, StoreScan, StoredSession, FRAME_HEADER_SIZE};
