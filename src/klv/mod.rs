//! KLV Primitive Codec
//!
//! Every structure in an MXF file is a Key-Length-Value triplet.
//!
//! ## Responsibilities
//! - 16-byte keys (Universal Labels)
//! - BER lengths, minimal or fixed-width (for patch-later headers)
//! - Big-endian fixed-width integers, ULs, UUIDs, rationals
//! - Batch/array headers and local set items
//! - Primer pack (local tag registry)
//!
//! ## Triplet Layout
//! ```text
//! ┌──────────────────┬───────────────────────┬──────────────────┐
//! │ Key (16)         │ BER Length (1..=9)    │ Value            │
//! └──────────────────┴───────────────────────┴──────────────────┘
//!
//! BER short form:  0LLLLLLL                      (length < 128)
//! BER long form:   1nnnnnnn  L1 L2 .. Ln         (n big-endian bytes)
//!
//! Local item:      Tag (2) | Length (2) | Value  (max 65535 bytes)
//! Batch header:    Count (4) | Element Size (4)
//! ```

mod ber;
mod key;
mod local;
mod reader;
mod types;
mod writer;

pub use ber::{ber_size, decode_ber, encode_ber, encode_ber_fixed, MAX_BER_WIDTH};
pub use key::{labels, Key};
pub use local::{PrimerPack, LOCAL_ITEM_HEADER_SIZE, MAX_LOCAL_ITEM_SIZE};
pub use reader::{Kl, KlvReader};
pub use types::{Rational, Umid};
pub use writer::{KlvWriter, Reservation};

/// Size of a batch/array header: count (4) + element size (4)
pub const BATCH_HEADER_SIZE: usize = 8;

/// Size of a key in bytes
pub const KEY_SIZE: usize = 16;
