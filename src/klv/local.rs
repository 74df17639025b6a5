//! Local sets and the primer pack
//!
//! Inside a local set every item carries a 2-byte tag and a 2-byte length,
//! which caps a single item at 65535 bytes. The primer pack maps those tags
//! back to full 16-byte item labels for the file.

use std::collections::BTreeMap;
use std::io::{Read, Seek, Write};

use crate::error::{MxfError, Result};

use super::{labels, Key, KlvReader, KlvWriter, Kl, BATCH_HEADER_SIZE};

/// Local item header: tag (2) + length (2)
pub const LOCAL_ITEM_HEADER_SIZE: usize = 4;

/// Largest value a local item length can describe
pub const MAX_LOCAL_ITEM_SIZE: usize = 0xFFFF;

/// Primer entry: tag (2) + UL (16)
const PRIMER_ENTRY_SIZE: u32 = 18;

impl<W: Write + Seek> KlvWriter<W> {
    /// Write a local item header; fails if `length` does not fit 2 bytes
    pub fn write_local_tag(&mut self, tag: u16, length: usize) -> Result<()> {
        if length > MAX_LOCAL_ITEM_SIZE {
            return Err(MxfError::CapacityExceeded {
                item: "local item",
                size: length,
            });
        }
        self.write_u16(tag)?;
        self.write_u16(length as u16)
    }
}

impl<R: Read + Seek> KlvReader<R> {
    /// Read a local item header: `(tag, length)`
    pub fn read_local_tag(&mut self) -> Result<(u16, u16)> {
        let tag = self.read_u16()?;
        let length = self.read_u16()?;
        Ok((tag, length))
    }
}

/// Local tag registry for one file
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PrimerPack {
    entries: BTreeMap<u16, Key>,
}

impl PrimerPack {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `tag` to `ul`; rebinding a tag to a different label is an error
    pub fn register(&mut self, tag: u16, ul: Key) -> Result<()> {
        match self.entries.get(&tag) {
            Some(existing) if *existing != ul => Err(MxfError::MalformedKlv(format!(
                "local tag 0x{:04x} already bound to {}",
                tag, existing
            ))),
            _ => {
                self.entries.insert(tag, ul);
                Ok(())
            }
        }
    }

    pub fn lookup(&self, tag: u16) -> Option<&Key> {
        self.entries.get(&tag)
    }

    pub fn tag_for(&self, ul: &Key) -> Option<u16> {
        self.entries
            .iter()
            .find_map(|(tag, key)| (key == ul).then_some(*tag))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Encoded size of the whole pack (key + BER + value)
    pub fn encoded_size(&self) -> u64 {
        let value = self.value_size();
        16 + super::ber_size(value) as u64 + value
    }

    fn value_size(&self) -> u64 {
        BATCH_HEADER_SIZE as u64 + self.entries.len() as u64 * PRIMER_ENTRY_SIZE as u64
    }

    /// Write the pack; returns bytes written
    pub fn write<W: Write + Seek>(&self, writer: &mut KlvWriter<W>) -> Result<u64> {
        let value = self.value_size();
        let kl = writer.write_kl(&labels::PRIMER, value)?;
        writer.write_batch_header(self.entries.len() as u32, PRIMER_ENTRY_SIZE)?;
        for (tag, ul) in &self.entries {
            writer.write_u16(*tag)?;
            writer.write_ul(ul)?;
        }
        Ok(kl as u64 + value)
    }

    /// Read the pack value following `kl`
    pub fn read<R: Read + Seek>(reader: &mut KlvReader<R>, kl: &Kl) -> Result<Self> {
        if !kl.key.is_primer_pack() {
            return Err(MxfError::MalformedKlv(format!(
                "expected primer pack, found {}",
                kl.key
            )));
        }
        let (count, size) = reader.read_batch_header()?;
        if size != PRIMER_ENTRY_SIZE {
            return Err(MxfError::MalformedKlv(format!(
                "primer entry size {} (expected {})",
                size, PRIMER_ENTRY_SIZE
            )));
        }
        let needed = BATCH_HEADER_SIZE as u64 + count as u64 * size as u64;
        if needed > kl.length {
            return Err(MxfError::MalformedKlv(format!(
                "primer declares {} entries but value is {} bytes",
                count, kl.length
            )));
        }

        let mut primer = PrimerPack::new();
        for _ in 0..count {
            let tag = reader.read_u16()?;
            let ul = reader.read_ul()?;
            primer.register(tag, ul)?;
        }
        reader.seek(kl.end_offset())?;
        Ok(primer)
    }
}
