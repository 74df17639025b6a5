//! Delta and Index entries

use crate::klv::Rational;

/// Encoded size of a DeltaEntry: PosTableIndex (1) + Slice (1) + ElementData (4)
pub const DELTA_ENTRY_SIZE: usize = 6;

/// Fixed part of an IndexEntry: offsets (2) + flags (1) + StreamOffset (8)
pub(crate) const INDEX_ENTRY_FIXED_SIZE: usize = 11;

/// IndexEntry flag bits
pub mod flags {
    /// Edit unit can be decoded without reference to others
    pub const RANDOM_ACCESS: u8 = 0x80;
    pub const SEQUENCE_HEADER: u8 = 0x40;
    pub const FORWARD_PREDICTION: u8 = 0x20;
    pub const BACKWARD_PREDICTION: u8 = 0x10;
}

/// Locates one element of an interleaved content package
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DeltaEntry {
    pub pos_table_index: i8,
    pub slice: u8,
    pub element_data: u32,
}

/// Offset record for one edit unit
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct IndexEntry {
    pub temporal_offset: i8,
    pub key_frame_offset: i8,
    pub flags: u8,
    pub stream_offset: u64,
    pub slice_offsets: Vec<u32>,
    pub pos_table: Vec<Rational>,
}

impl IndexEntry {
    /// Entry for an intra-coded edit unit with no slices or PosTable
    pub fn random_access(stream_offset: u64) -> Self {
        IndexEntry {
            flags: flags::RANDOM_ACCESS,
            stream_offset,
            ..Default::default()
        }
    }

    /// Encoded size of an entry with the given shape
    pub fn element_size(slice_count: u8, pos_table_count: u8) -> usize {
        INDEX_ENTRY_FIXED_SIZE + 4 * slice_count as usize + 8 * pos_table_count as usize
    }

    pub fn is_random_access(&self) -> bool {
        self.flags & flags::RANDOM_ACCESS != 0
    }
}
