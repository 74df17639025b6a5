//! Partition packs
//!
//! Packs are written with a fixed 4-byte BER length so a provisional pack can
//! be rewritten in place once the final offsets and byte counts are known.

use std::io::{Cursor, Read, Seek, Write};

use crate::error::{MxfError, Result};
use crate::klv::{labels, Key, Kl, KlvReader, KlvWriter};

/// Fixed BER width used for partition pack lengths
pub const PARTITION_PACK_LLEN: u8 = 4;

/// Fixed part of the pack value, before the essence container labels
const FIXED_VALUE_SIZE: u64 = 88;

/// Partition kind (byte 13 of the pack key)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartitionKind {
    Header,
    Body,
    Footer,
}

impl PartitionKind {
    fn key_byte(self) -> u8 {
        match self {
            PartitionKind::Header => 0x02,
            PartitionKind::Body => 0x03,
            PartitionKind::Footer => 0x04,
        }
    }

    fn from_key_byte(byte: u8) -> Option<Self> {
        match byte {
            0x02 => Some(PartitionKind::Header),
            0x03 => Some(PartitionKind::Body),
            0x04 => Some(PartitionKind::Footer),
            _ => None,
        }
    }
}

/// Partition status (byte 14 of the pack key)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartitionStatus {
    OpenIncomplete,
    ClosedIncomplete,
    OpenComplete,
    ClosedComplete,
}

impl PartitionStatus {
    fn key_byte(self) -> u8 {
        match self {
            PartitionStatus::OpenIncomplete => 0x01,
            PartitionStatus::ClosedIncomplete => 0x02,
            PartitionStatus::OpenComplete => 0x03,
            PartitionStatus::ClosedComplete => 0x04,
        }
    }

    fn from_key_byte(byte: u8) -> Option<Self> {
        match byte {
            0x01 => Some(PartitionStatus::OpenIncomplete),
            0x02 => Some(PartitionStatus::ClosedIncomplete),
            0x03 => Some(PartitionStatus::OpenComplete),
            0x04 => Some(PartitionStatus::ClosedComplete),
            _ => None,
        }
    }

    pub fn is_closed(self) -> bool {
        matches!(
            self,
            PartitionStatus::ClosedIncomplete | PartitionStatus::ClosedComplete
        )
    }
}

/// MXF partition pack
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionPack {
    pub kind: PartitionKind,
    pub status: PartitionStatus,
    pub major_version: u16,
    pub minor_version: u16,
    pub kag_size: u32,
    pub this_partition: u64,
    pub previous_partition: u64,
    pub footer_partition: u64,
    /// Bytes of header metadata following the pack
    pub header_byte_count: u64,
    /// Bytes of index table segments following the header metadata
    pub index_byte_count: u64,
    pub index_sid: u32,
    /// Stream offset of the first essence byte in this partition
    pub body_offset: u64,
    pub body_sid: u32,
    pub operational_pattern: Key,
    pub essence_containers: Vec<Key>,
}

impl PartitionPack {
    pub fn new(kind: PartitionKind) -> Self {
        let status = match kind {
            PartitionKind::Footer => PartitionStatus::ClosedComplete,
            _ => PartitionStatus::OpenIncomplete,
        };
        Self {
            kind,
            status,
            major_version: 1,
            minor_version: 3,
            kag_size: 1,
            this_partition: 0,
            previous_partition: 0,
            footer_partition: 0,
            header_byte_count: 0,
            index_byte_count: 0,
            index_sid: 0,
            body_offset: 0,
            body_sid: 0,
            operational_pattern: Key(labels::OP_ATOM),
            essence_containers: Vec::new(),
        }
    }

    pub fn header() -> Self {
        Self::new(PartitionKind::Header)
    }

    pub fn body() -> Self {
        Self::new(PartitionKind::Body)
    }

    pub fn footer() -> Self {
        Self::new(PartitionKind::Footer)
    }

    pub fn key(&self) -> Key {
        labels::partition_pack(self.kind.key_byte(), self.status.key_byte())
    }

    pub fn add_essence_container(&mut self, ul: Key) {
        if !self.essence_containers.contains(&ul) {
            self.essence_containers.push(ul);
        }
    }

    pub fn value_size(&self) -> u64 {
        FIXED_VALUE_SIZE + 16 * self.essence_containers.len() as u64
    }

    /// Size of key + length + value as written
    pub fn encoded_size(&self) -> u64 {
        16 + PARTITION_PACK_LLEN as u64 + self.value_size()
    }

    /// Offset of the first byte after the pack, header metadata and index segments
    pub fn essence_offset(&self) -> u64 {
        self.this_partition + self.encoded_size() + self.header_byte_count + self.index_byte_count
    }

    // =========================================================================
    // Encoding
    // =========================================================================

    pub fn write<W: Write + Seek>(&self, writer: &mut KlvWriter<W>) -> Result<u64> {
        writer.write_fixed_kl(&self.key(), self.value_size(), PARTITION_PACK_LLEN)?;
        writer.write_u16(self.major_version)?;
        writer.write_u16(self.minor_version)?;
        writer.write_u32(self.kag_size)?;
        writer.write_u64(self.this_partition)?;
        writer.write_u64(self.previous_partition)?;
        writer.write_u64(self.footer_partition)?;
        writer.write_u64(self.header_byte_count)?;
        writer.write_u64(self.index_byte_count)?;
        writer.write_u32(self.index_sid)?;
        writer.write_u64(self.body_offset)?;
        writer.write_u32(self.body_sid)?;
        writer.write_ul(&self.operational_pattern)?;
        writer.write_batch_header(self.essence_containers.len() as u32, 16)?;
        for ec in &self.essence_containers {
            writer.write_ul(ec)?;
        }
        Ok(self.encoded_size())
    }

    /// Encode into a standalone buffer (used when patching in place)
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut writer = KlvWriter::new(Cursor::new(Vec::with_capacity(self.encoded_size() as usize)));
        self.write(&mut writer)?;
        Ok(writer.into_inner().into_inner())
    }

    // =========================================================================
    // Decoding
    // =========================================================================

    /// Parse the pack value following `kl`
    pub fn read<R: Read + Seek>(reader: &mut KlvReader<R>, kl: &Kl) -> Result<Self> {
        if !kl.key.is_partition_pack() {
            return Err(MxfError::MalformedKlv(format!(
                "expected partition pack, found {}",
                kl.key
            )));
        }
        if kl.length < FIXED_VALUE_SIZE {
            return Err(MxfError::MalformedKlv(format!(
                "partition pack value of {} bytes (minimum {})",
                kl.length, FIXED_VALUE_SIZE
            )));
        }
        let bytes = kl.key.as_bytes();
        let kind = PartitionKind::from_key_byte(bytes[13]).ok_or_else(|| {
            MxfError::MalformedKlv(format!("unknown partition kind 0x{:02x}", bytes[13]))
        })?;
        let status = PartitionStatus::from_key_byte(bytes[14]).ok_or_else(|| {
            MxfError::MalformedKlv(format!("unknown partition status 0x{:02x}", bytes[14]))
        })?;

        reader.seek(kl.value_offset)?;
        let major_version = reader.read_u16()?;
        let minor_version = reader.read_u16()?;
        let kag_size = reader.read_u32()?;
        let this_partition = reader.read_u64()?;
        let previous_partition = reader.read_u64()?;
        let footer_partition = reader.read_u64()?;
        let header_byte_count = reader.read_u64()?;
        let index_byte_count = reader.read_u64()?;
        let index_sid = reader.read_u32()?;
        let body_offset = reader.read_u64()?;
        let body_sid = reader.read_u32()?;
        let operational_pattern = reader.read_ul()?;

        let (count, item_size) = reader.read_batch_header()?;
        if FIXED_VALUE_SIZE + count as u64 * item_size as u64 > kl.length {
            return Err(MxfError::MalformedKlv(format!(
                "essence container batch of {} x {} overruns partition pack",
                count, item_size
            )));
        }
        let mut essence_containers = Vec::with_capacity(count as usize);
        for _ in 0..count {
            if item_size == 16 {
                essence_containers.push(reader.read_ul()?);
            } else {
                reader.skip(item_size as u64)?;
            }
        }
        reader.seek(kl.end_offset())?;

        Ok(Self {
            kind,
            status,
            major_version,
            minor_version,
            kag_size,
            this_partition,
            previous_partition,
            footer_partition,
            header_byte_count,
            index_byte_count,
            index_sid,
            body_offset,
            body_sid,
            operational_pattern,
            essence_containers,
        })
    }

    /// Read the pack whose key starts at `offset`
    pub fn read_at<R: Read + Seek>(reader: &mut KlvReader<R>, offset: u64) -> Result<Self> {
        reader.seek(offset)?;
        let kl = reader.read_kl()?;
        Self::read(reader, &kl)
    }
}
