//! Clip Files
//!
//! One capture track produces one OP-Atom style clip: a single frame-wrapped
//! essence container, indexed from the footer.
//!
//! ## Clip Layout
//! ```text
//! ┌─────────────────────────────┐
//! │ Header Partition (open)     │  primer pack, KAG fill
//! ├─────────────────────────────┤
//! │ Body Partition              │  BodySID, BodyOffset = stream offset
//! │   [Key | 83 LL LL LL | data]│  one element per edit unit
//! │   ...                       │
//! ├─────────────────────────────┤
//! │ Body Partition ...          │  every N edit units, if configured
//! ├─────────────────────────────┤
//! │ Footer Partition            │  IndexSID, index table segments
//! ├─────────────────────────────┤
//! │ Random Index Pack           │
//! └─────────────────────────────┘
//! ```
//!
//! Element lengths always use a 4-byte BER so a streamed element can be
//! opened before its size is known and patched when it ends.

mod reader;
mod writer;

pub use reader::{ClipReader, EditUnitLocation};
pub use writer::{ClipSettings, ClipWriter, MxfClipWriter};

/// BER width of every essence element length
pub const ELEMENT_LLEN: u8 = 4;

/// Key + length of an essence element
pub const ELEMENT_KL_SIZE: u64 = 16 + ELEMENT_LLEN as u64;

/// Largest element a 4-byte BER length can describe
pub const MAX_ELEMENT_SIZE: u64 = 0xFF_FFFF;
