//! Partition Directory
//!
//! Ordered list of the partitions in one file, discovered either through the
//! RIP or by walking `previous_partition` back from the footer.
//!
//! ## Discovery
//! - RIP present: one direct seek per entry, file order
//! - No RIP: header → footer offset, then footer → ... → header via
//!   back-pointers, each step strictly before the last, reversed at the end

use std::io::{Read, Seek, Write};

use tracing::{debug, warn};

use crate::error::{MxfError, Result};
use crate::klv::{KlvReader, KlvWriter};

use super::pack::{PartitionKind, PartitionPack, PartitionStatus};
use super::rip::RandomIndexPack;

/// Offset of the header partition (no run-in)
const HEADER_OFFSET: u64 = 0;

/// Which structure a directory was discovered from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Discovery {
    RandomIndexPack,
    BackwardChain,
    /// Built by a writer, not read from a file
    Written,
}

/// Partitions of one file in file order
#[derive(Debug, Clone)]
pub struct PartitionDirectory {
    partitions: Vec<PartitionPack>,
    /// Encoded size of each pack as first written; patches must not change it
    written_sizes: Vec<u64>,
    discovery: Discovery,
}

impl Default for PartitionDirectory {
    fn default() -> Self {
        Self::new()
    }
}

impl PartitionDirectory {
    pub fn new() -> Self {
        Self {
            partitions: Vec::new(),
            written_sizes: Vec::new(),
            discovery: Discovery::Written,
        }
    }

    pub fn partitions(&self) -> &[PartitionPack] {
        &self.partitions
    }

    pub fn len(&self) -> usize {
        self.partitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.partitions.is_empty()
    }

    pub fn discovery(&self) -> Discovery {
        self.discovery
    }

    pub fn header(&self) -> Option<&PartitionPack> {
        self.partitions.first().filter(|p| p.kind == PartitionKind::Header)
    }

    pub fn footer(&self) -> Option<&PartitionPack> {
        self.partitions.last().filter(|p| p.kind == PartitionKind::Footer)
    }

    pub fn last_mut(&mut self) -> Option<&mut PartitionPack> {
        self.partitions.last_mut()
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut PartitionPack> {
        self.partitions.get_mut(index)
    }

    /// Offsets of every partition in file order
    pub fn offsets(&self) -> Vec<u64> {
        self.partitions.iter().map(|p| p.this_partition).collect()
    }

    /// Partitions carrying essence for `body_sid`, in file order
    pub fn essence_partitions(&self, body_sid: u32) -> impl Iterator<Item = &PartitionPack> {
        self.partitions
            .iter()
            .filter(move |p| body_sid != 0 && p.body_sid == body_sid)
    }

    // =========================================================================
    // Writing
    // =========================================================================

    /// Write `pack` at the writer's position as the next partition
    ///
    /// Sets `this_partition` and `previous_partition`; the pack is provisional
    /// until [`PartitionDirectory::update_partitions`] rewrites it.
    pub fn write_partition<W: Write + Seek>(
        &mut self,
        writer: &mut KlvWriter<W>,
        mut pack: PartitionPack,
    ) -> Result<u64> {
        let offset = writer.position()?;
        if let Some(last) = self.partitions.last() {
            if offset <= last.this_partition {
                return Err(MxfError::CorruptPartitionChain(format!(
                    "partition at {} does not follow partition at {}",
                    offset, last.this_partition
                )));
            }
            pack.previous_partition = last.this_partition;
        } else if pack.kind != PartitionKind::Header || offset != HEADER_OFFSET {
            return Err(MxfError::CorruptPartitionChain(
                "first partition must be a header at offset 0".into(),
            ));
        }
        pack.this_partition = offset;
        if pack.kind == PartitionKind::Footer {
            pack.footer_partition = offset;
        }

        let size = pack.write(writer)?;
        debug!(
            "wrote {:?} partition at {} (body_sid {}, index_sid {})",
            pack.kind, offset, pack.body_sid, pack.index_sid
        );
        self.partitions.push(pack);
        self.written_sizes.push(size);
        Ok(offset)
    }

    /// Append one RIP entry per partition, then the pack's overall length
    pub fn write_rip<W: Write + Seek>(&self, writer: &mut KlvWriter<W>) -> Result<u64> {
        if self.footer().is_none() {
            return Err(MxfError::CorruptPartitionChain(
                "RIP written before the footer partition".into(),
            ));
        }
        let mut rip = RandomIndexPack::new();
        for pack in &self.partitions {
            rip.add_entry(pack.body_sid, pack.this_partition);
        }
        rip.write(writer)
    }

    /// Second pass: rewrite every provisional pack in place
    ///
    /// Fills in the footer offset and closes header and body partitions. Byte
    /// counts set on the packs via [`PartitionDirectory::get_mut`] since they
    /// were first written are carried into the rewrite.
    pub fn update_partitions<W: Write + Seek>(&mut self, writer: &mut KlvWriter<W>) -> Result<()> {
        let footer_offset = self
            .footer()
            .map(|f| f.this_partition)
            .ok_or_else(|| {
                MxfError::CorruptPartitionChain("update before the footer was written".into())
            })?;

        for index in 0..self.partitions.len() {
            let pack = &mut self.partitions[index];
            pack.footer_partition = footer_offset;
            if pack.kind != PartitionKind::Footer {
                pack.status = PartitionStatus::ClosedComplete;
            }
            self.rewrite_partition(writer, index)?;
        }
        debug!(
            "closed {} partitions, footer at {}",
            self.partitions.len(),
            footer_offset
        );
        Ok(())
    }

    /// Rewrite one already-written pack in place with its current fields
    pub fn rewrite_partition<W: Write + Seek>(
        &mut self,
        writer: &mut KlvWriter<W>,
        index: usize,
    ) -> Result<()> {
        let (pack, written) = match (self.partitions.get(index), self.written_sizes.get(index)) {
            (Some(pack), Some(written)) => (pack, *written),
            _ => {
                return Err(MxfError::CorruptPartitionChain(format!(
                    "no partition {} to rewrite",
                    index
                )))
            }
        };
        let bytes = pack.to_bytes()?;
        if bytes.len() as u64 != written {
            return Err(MxfError::MalformedKlv(format!(
                "partition pack at {} changed size from {} to {}",
                pack.this_partition,
                written,
                bytes.len()
            )));
        }
        writer.overwrite_at(pack.this_partition, &bytes)
    }

    // =========================================================================
    // Reading
    // =========================================================================

    /// Discover all partitions, preferring the RIP when one is present
    pub fn read_partitions<R: Read + Seek>(reader: &mut KlvReader<R>) -> Result<Self> {
        match RandomIndexPack::locate(reader)? {
            Some(rip) => Self::read_via_rip(reader, &rip),
            None => Self::read_via_chain(reader),
        }
    }

    /// Read every partition the RIP names, in file order
    pub fn read_via_rip<R: Read + Seek>(
        reader: &mut KlvReader<R>,
        rip: &RandomIndexPack,
    ) -> Result<Self> {
        let mut partitions = Vec::with_capacity(rip.entries.len());
        let mut last: Option<u64> = None;

        for entry in &rip.entries {
            if let Some(prev) = last {
                if entry.this_partition <= prev {
                    return Err(MxfError::CorruptPartitionChain(format!(
                        "RIP offsets not increasing: {} after {}",
                        entry.this_partition, prev
                    )));
                }
            }
            let pack = read_pack_at(reader, entry.this_partition)?;
            if pack.body_sid != entry.body_sid {
                return Err(MxfError::CorruptPartitionChain(format!(
                    "RIP names body SID {} for partition at {}, pack says {}",
                    entry.body_sid, entry.this_partition, pack.body_sid
                )));
            }
            last = Some(entry.this_partition);
            partitions.push(pack);
        }

        match partitions.first() {
            Some(first) if first.kind == PartitionKind::Header => {}
            _ => {
                return Err(MxfError::CorruptPartitionChain(
                    "RIP does not start with the header partition".into(),
                ))
            }
        }

        Ok(Self::from_read(partitions, Discovery::RandomIndexPack))
    }

    /// Walk back from the footer using `previous_partition`
    pub fn read_via_chain<R: Read + Seek>(reader: &mut KlvReader<R>) -> Result<Self> {
        let header = read_pack_at(reader, HEADER_OFFSET)?;
        if header.kind != PartitionKind::Header {
            return Err(MxfError::CorruptPartitionChain(format!(
                "partition at offset 0 is a {:?} partition",
                header.kind
            )));
        }
        if header.footer_partition == 0 {
            return Err(MxfError::CorruptPartitionChain(
                "header partition does not record a footer offset".into(),
            ));
        }

        let mut chain = Vec::new();
        let mut current = header.footer_partition;
        let mut bound = u64::MAX;

        loop {
            if current >= bound {
                return Err(MxfError::CorruptPartitionChain(format!(
                    "previous partition {} is not before {}",
                    current, bound
                )));
            }
            let pack = read_pack_at(reader, current)?;
            if chain.is_empty() && pack.kind != PartitionKind::Footer {
                return Err(MxfError::CorruptPartitionChain(format!(
                    "header footer offset {} points at a {:?} partition",
                    current, pack.kind
                )));
            }
            let previous = pack.previous_partition;
            chain.push(pack);
            if current == HEADER_OFFSET {
                break;
            }
            bound = current;
            current = previous;
        }

        chain.reverse();
        Ok(Self::from_read(chain, Discovery::BackwardChain))
    }

    /// Discover through both structures and require them to agree
    pub fn verify<R: Read + Seek>(reader: &mut KlvReader<R>) -> Result<Self> {
        let chain = Self::read_via_chain(reader)?;
        let rip = match RandomIndexPack::locate(reader)? {
            Some(rip) => rip,
            None => {
                warn!("no RIP present; chain of {} partitions not cross-checked", chain.len());
                return Ok(chain);
            }
        };

        let via_rip = Self::read_via_rip(reader, &rip)?;
        if via_rip.offsets() != chain.offsets() {
            return Err(MxfError::CorruptPartitionChain(format!(
                "RIP lists partitions {:?}, chain walk found {:?}",
                via_rip.offsets(),
                chain.offsets()
            )));
        }
        Ok(via_rip)
    }

    fn from_read(partitions: Vec<PartitionPack>, discovery: Discovery) -> Self {
        let written_sizes = partitions.iter().map(|p| p.encoded_size()).collect();
        Self {
            partitions,
            written_sizes,
            discovery,
        }
    }
}

/// Read a pack at a pointer taken from another structure
fn read_pack_at<R: Read + Seek>(reader: &mut KlvReader<R>, offset: u64) -> Result<PartitionPack> {
    reader.seek(offset)?;
    let kl = reader.read_kl()?;
    if !kl.key.is_partition_pack() {
        return Err(MxfError::CorruptPartitionChain(format!(
            "no partition pack at offset {} (found {})",
            offset, kl.key
        )));
    }
    let pack = PartitionPack::read(reader, &kl)?;
    if pack.this_partition != offset {
        return Err(MxfError::CorruptPartitionChain(format!(
            "partition at {} claims to be at {}",
            offset, pack.this_partition
        )));
    }
    Ok(pack)
}
