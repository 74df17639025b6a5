//! Keys (Universal Labels)
//!
//! Keys are 16-byte SMPTE labels. Only the handful this crate writes or
//! navigates by are named in [`labels`].

use std::fmt;

/// A 16-byte KLV key
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Key(pub [u8; 16]);

impl Key {
    pub const fn new(bytes: [u8; 16]) -> Self {
        Key(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }

    /// SMPTE-registered label (starts with 06 0E 2B 34)
    pub fn is_smpte(&self) -> bool {
        self.0[0..4] == labels::SMPTE_PREFIX
    }

    /// Header, body or footer partition pack, any status
    pub fn is_partition_pack(&self) -> bool {
        self.0[0..13] == labels::PARTITION_PACK_BASE[0..13] && (0x02..=0x04).contains(&self.0[13])
    }

    pub fn is_primer_pack(&self) -> bool {
        self.0[0..13] == labels::PRIMER_PACK[0..13] && self.0[13] == 0x05
    }

    pub fn is_rip(&self) -> bool {
        self.0[0..13] == labels::RANDOM_INDEX_PACK[0..13] && self.0[13] == 0x11
    }

    /// Index table segment; byte 5 (set coding) and byte 7 (version) vary in the wild
    pub fn is_index_segment(&self) -> bool {
        self.0[0..4] == labels::SMPTE_PREFIX
            && self.0[8..15] == labels::INDEX_TABLE_SEGMENT[8..15]
    }

    /// Fill item; the version byte differs between encoders
    pub fn is_fill(&self) -> bool {
        self.0[0..7] == labels::FILL_ITEM[0..7] && self.0[8..13] == labels::FILL_ITEM[8..13]
    }

    /// Generic container essence element
    pub fn is_essence(&self) -> bool {
        self.0[0..12] == labels::ESSENCE_ELEMENT_PREFIX[0..12]
    }
}

impl From<[u8; 16]> for Key {
    fn from(bytes: [u8; 16]) -> Self {
        Key(bytes)
    }
}

impl fmt::Debug for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Key({})", self)
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, byte) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ".")?;
            }
            write!(f, "{:02x}", byte)?;
        }
        Ok(())
    }
}

/// Well-known Universal Labels
pub mod labels {
    use super::Key;

    /// SMPTE Label prefix
    pub const SMPTE_PREFIX: [u8; 4] = [0x06, 0x0E, 0x2B, 0x34];

    /// Partition pack base (bytes 13 and 14 select kind and status)
    pub const PARTITION_PACK_BASE: [u8; 16] = [
        0x06, 0x0E, 0x2B, 0x34, 0x02, 0x05, 0x01, 0x01, 0x0D, 0x01, 0x02, 0x01, 0x01, 0x00, 0x00,
        0x00,
    ];

    /// Primer pack
    pub const PRIMER_PACK: [u8; 16] = [
        0x06, 0x0E, 0x2B, 0x34, 0x02, 0x05, 0x01, 0x01, 0x0D, 0x01, 0x02, 0x01, 0x01, 0x05, 0x01,
        0x00,
    ];

    /// Fill item
    pub const FILL_ITEM: [u8; 16] = [
        0x06, 0x0E, 0x2B, 0x34, 0x01, 0x01, 0x01, 0x02, 0x03, 0x01, 0x02, 0x10, 0x01, 0x00, 0x00,
        0x00,
    ];

    /// Index table segment
    pub const INDEX_TABLE_SEGMENT: [u8; 16] = [
        0x06, 0x0E, 0x2B, 0x34, 0x02, 0x53, 0x01, 0x01, 0x0D, 0x01, 0x02, 0x01, 0x01, 0x10, 0x01,
        0x00,
    ];

    /// Random index pack
    pub const RANDOM_INDEX_PACK: [u8; 16] = [
        0x06, 0x0E, 0x2B, 0x34, 0x02, 0x05, 0x01, 0x01, 0x0D, 0x01, 0x02, 0x01, 0x01, 0x11, 0x01,
        0x00,
    ];

    /// Generic container essence element prefix (bytes 12..16 = item type,
    /// element count, element type, element number)
    pub const ESSENCE_ELEMENT_PREFIX: [u8; 16] = [
        0x06, 0x0E, 0x2B, 0x34, 0x01, 0x02, 0x01, 0x01, 0x0D, 0x01, 0x03, 0x01, 0x00, 0x00, 0x00,
        0x00,
    ];

    /// Generic container, frame wrapped (essence container label)
    pub const GC_FRAME_WRAPPED: [u8; 16] = [
        0x06, 0x0E, 0x2B, 0x34, 0x04, 0x01, 0x01, 0x03, 0x0D, 0x01, 0x03, 0x01, 0x02, 0x7F, 0x01,
        0x00,
    ];

    /// OP-Atom operational pattern (one essence track per file)
    pub const OP_ATOM: [u8; 16] = [
        0x06, 0x0E, 0x2B, 0x34, 0x04, 0x01, 0x01, 0x02, 0x0D, 0x01, 0x02, 0x01, 0x10, 0x00, 0x00,
        0x00,
    ];

    pub const PRIMER: Key = Key(PRIMER_PACK);
    pub const FILL: Key = Key(FILL_ITEM);
    pub const INDEX_SEGMENT: Key = Key(INDEX_TABLE_SEGMENT);
    pub const RIP: Key = Key(RANDOM_INDEX_PACK);

    /// Partition pack key for a kind byte (2 header, 3 body, 4 footer) and status byte
    pub const fn partition_pack(kind: u8, status: u8) -> Key {
        let mut ul = PARTITION_PACK_BASE;
        ul[13] = kind;
        ul[14] = status;
        Key(ul)
    }

    /// Essence element key for an item type (0x15 picture, 0x16 sound, 0x17 data)
    pub const fn essence_element(item_type: u8, element_type: u8, track_number: u8) -> Key {
        let mut ul = ESSENCE_ELEMENT_PREFIX;
        ul[12] = item_type;
        ul[13] = 0x01;
        ul[14] = element_type;
        ul[15] = track_number;
        Key(ul)
    }
}
