//! Index Table Segment Codec
//!
//! Maps edit-unit positions to byte offsets within an essence container.
//!
//! ## Responsibilities
//! - Hold Delta and Index entry arrays under the 65535-byte local item ceiling
//! - Encode segments in one shot or streamed with counts known up front
//! - Decode segments, skipping unknown optional items
//! - Resolve positions for CBE (arithmetic) and VBE (stored entries) tables
//!
//! ## Segment Layout
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │ Key: Index Table Segment (16) | BER Length                   │
//! ├──────────────────────────────────────────────────────────────┤
//! │ 3C0A InstanceUID (16)      3F0B IndexEditRate (8)            │
//! │ 3F0C IndexStartPosition    3F0D IndexDuration                │
//! │ 3F05 EditUnitByteCount     3F06 IndexSID    3F07 BodySID     │
//! │ 3F08 SliceCount (1)        3F0E PosTableCount (1)            │
//! ├──────────────────────────────────────────────────────────────┤
//! │ 3F09 DeltaEntryArray: Count (4) | Size=6 (4) | entries       │
//! │   [PosTableIndex i8][Slice u8][ElementData u32]              │
//! ├──────────────────────────────────────────────────────────────┤
//! │ 3F0A IndexEntryArray: Count (4) | Size (4) | entries         │
//! │   [TemporalOffset i8][KeyFrameOffset i8][Flags u8]           │
//! │   [StreamOffset u64][SliceOffset u32 × n][PosTable 8 × m]    │
//! └──────────────────────────────────────────────────────────────┘
//! ```

mod codec;
mod entry;
mod essence;
mod segment;
mod table;

pub use codec::{read_segment, write_segment, IndexSegmentWriter, SegmentCounts};
pub use entry::{flags, DeltaEntry, IndexEntry, DELTA_ENTRY_SIZE};
pub use essence::{EntryLog, EssenceIndex, IndexPlacement};
pub use segment::{IndexLookup, IndexTableSegment};
pub use table::IndexTable;

/// Batch header preceding each entry array
pub(crate) const ARRAY_HEADER_SIZE: usize = crate::klv::BATCH_HEADER_SIZE;

/// Local tags of the index table segment items
pub mod tags {
    use crate::klv::Key;

    pub const INSTANCE_UID: u16 = 0x3C0A;
    pub const INDEX_EDIT_RATE: u16 = 0x3F0B;
    pub const INDEX_START_POSITION: u16 = 0x3F0C;
    pub const INDEX_DURATION: u16 = 0x3F0D;
    pub const EDIT_UNIT_BYTE_COUNT: u16 = 0x3F05;
    pub const INDEX_SID: u16 = 0x3F06;
    pub const BODY_SID: u16 = 0x3F07;
    pub const SLICE_COUNT: u16 = 0x3F08;
    pub const POS_TABLE_COUNT: u16 = 0x3F0E;
    pub const DELTA_ENTRY_ARRAY: u16 = 0x3F09;
    pub const INDEX_ENTRY_ARRAY: u16 = 0x3F0A;

    const fn item(bytes: [u8; 12]) -> Key {
        let mut ul = [0x06, 0x0E, 0x2B, 0x34, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0];
        let mut i = 0;
        while i < 12 {
            ul[4 + i] = bytes[i];
            i += 1;
        }
        Key(ul)
    }

    /// Static tags with their item labels, registered in every primer pack
    pub const STATIC_TAGS: [(u16, Key); 11] = [
        (INSTANCE_UID, item([0x01, 0x01, 0x01, 0x01, 0x01, 0x01, 0x15, 0x02, 0, 0, 0, 0])),
        (INDEX_EDIT_RATE, item([0x01, 0x01, 0x01, 0x05, 0x05, 0x30, 0x04, 0x06, 0, 0, 0, 0])),
        (INDEX_START_POSITION, item([0x01, 0x01, 0x01, 0x05, 0x07, 0x02, 0x01, 0x03, 0x01, 0x0A, 0, 0])),
        (INDEX_DURATION, item([0x01, 0x01, 0x01, 0x05, 0x07, 0x02, 0x02, 0x01, 0x01, 0x02, 0, 0])),
        (EDIT_UNIT_BYTE_COUNT, item([0x01, 0x01, 0x01, 0x04, 0x04, 0x06, 0x02, 0x01, 0, 0, 0, 0])),
        (INDEX_SID, item([0x01, 0x01, 0x01, 0x04, 0x01, 0x03, 0x04, 0x05, 0, 0, 0, 0])),
        (BODY_SID, item([0x01, 0x01, 0x01, 0x04, 0x01, 0x03, 0x04, 0x04, 0, 0, 0, 0])),
        (SLICE_COUNT, item([0x01, 0x01, 0x01, 0x04, 0x04, 0x04, 0x04, 0x01, 0x01, 0, 0, 0])),
        (POS_TABLE_COUNT, item([0x01, 0x01, 0x01, 0x05, 0x04, 0x04, 0x04, 0x01, 0x07, 0, 0, 0])),
        (DELTA_ENTRY_ARRAY, item([0x01, 0x01, 0x01, 0x05, 0x04, 0x04, 0x04, 0x01, 0x06, 0, 0, 0])),
        (INDEX_ENTRY_ARRAY, item([0x01, 0x01, 0x01, 0x05, 0x04, 0x04, 0x04, 0x02, 0x05, 0, 0, 0])),
    ];
}
