//! Partition Directory
//!
//! An MXF file is a chain of partitions. Each pack records its own offset, the
//! previous pack's offset and (once known) the footer's offset; the optional
//! RIP at the end of the file lists every partition directly.
//!
//! ## File Layout
//! ```text
//! ┌──────────────┬───────────────┬──────────────┬──────────────┬─────┐
//! │ Header Pack  │ Body Pack(s)  │  ...essence  │ Footer Pack  │ RIP │
//! │ this = 0     │ prev = header │              │ + index segs │     │
//! └──────────────┴───────────────┴──────────────┴──────────────┴─────┘
//!        ▲               │                              │
//!        └───────────────┴──────── previous ◄───────────┘
//!
//! RIP: Key | BER | [BodySID u32 | ThisPartition u64] × n | Overall Length u32
//! ```
//!
//! ## Partition Pack Value (88 bytes + 16 per essence container)
//! ```text
//! Major (2) | Minor (2) | KAG (4) | This (8) | Previous (8) | Footer (8)
//! HeaderByteCount (8) | IndexByteCount (8) | IndexSID (4) | BodyOffset (8)
//! BodySID (4) | OperationalPattern (16) | EssenceContainers batch
//! ```

mod directory;
mod pack;
mod rip;

pub use directory::{Discovery, PartitionDirectory};
pub use pack::{PartitionKind, PartitionPack, PartitionStatus, PARTITION_PACK_LLEN};
pub use rip::{RandomIndexPack, RipEntry, RIP_ENTRY_SIZE};
