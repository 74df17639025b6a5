//! Clip Reader
//!
//! Random access into a finished clip: partitions are discovered first, the
//! index is loaded from whichever partitions declare index bytes, and an
//! edit-unit position is then resolved to a file offset through the body
//! partition that holds its stream offset.

use std::fs::File;
use std::io::{BufReader, Read, Seek};
use std::path::Path;

use tracing::debug;

use crate::error::{MxfError, Result};
use crate::index::{read_segment, IndexTable, IndexTableSegment};
use crate::klv::{Kl, KlvReader, PrimerPack};
use crate::partition::{PartitionDirectory, PartitionPack};

/// Where one edit unit lives
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EditUnitLocation {
    pub position: i64,
    pub stream_offset: u64,
    /// Offset of the essence element's key
    pub file_offset: u64,
    pub flags: u8,
}

/// Reads edit units out of a clip file
pub struct ClipReader<R: Read + Seek> {
    reader: KlvReader<R>,
    directory: PartitionDirectory,
    primer: Option<PrimerPack>,
    index: Option<IndexTable>,
}

impl ClipReader<BufReader<File>> {
    pub fn open_file(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|e| MxfError::filesystem(path, e))?;
        Self::open(BufReader::new(file))
    }
}

impl<R: Read + Seek> ClipReader<R> {
    pub fn open(inner: R) -> Result<Self> {
        let mut reader = KlvReader::new(inner);
        let directory = PartitionDirectory::read_partitions(&mut reader)?;

        let primer = match directory.header() {
            Some(header) => read_primer(&mut reader, header)?,
            None => None,
        };

        let mut segments = Vec::new();
        for pack in directory.partitions() {
            if pack.index_byte_count > 0 {
                segments.extend(read_index_segments(&mut reader, pack)?);
            }
        }
        let index = if segments.is_empty() {
            None
        } else {
            Some(IndexTable::from_segments(segments)?)
        };

        debug!(
            "opened clip: {} partitions via {:?}, {} index segments",
            directory.len(),
            directory.discovery(),
            index.as_ref().map(|t| t.segments().len()).unwrap_or(0)
        );

        Ok(Self {
            reader,
            directory,
            primer,
            index,
        })
    }

    pub fn directory(&self) -> &PartitionDirectory {
        &self.directory
    }

    pub fn primer(&self) -> Option<&PrimerPack> {
        self.primer.as_ref()
    }

    pub fn index(&self) -> Option<&IndexTable> {
        self.index.as_ref()
    }

    /// Indexed edit units (0 for a clip without an index)
    pub fn duration(&self) -> i64 {
        self.index.as_ref().map(|t| t.duration()).unwrap_or(0)
    }

    /// Resolve an edit-unit position to its file offset
    pub fn locate(&mut self, position: i64) -> Result<EditUnitLocation> {
        let index = self.index.as_ref().ok_or(MxfError::PositionNotIndexed(position))?;
        let duration = index.duration();
        if position < 0 || (duration > 0 && position >= duration) {
            return Err(MxfError::PositionNotIndexed(position));
        }
        let lookup = index.lookup(position)?;

        let partition = self
            .directory
            .essence_partitions(index.body_sid())
            .filter(|p| p.body_offset <= lookup.stream_offset)
            .last()
            .cloned()
            .ok_or_else(|| {
                MxfError::MalformedKlv(format!(
                    "no body partition holds stream offset {}",
                    lookup.stream_offset
                ))
            })?;

        let essence_start = self.essence_start(&partition)?;
        Ok(EditUnitLocation {
            position,
            stream_offset: lookup.stream_offset,
            file_offset: offset_past(essence_start, &[lookup.stream_offset - partition.body_offset])?,
            flags: lookup.flags,
        })
    }

    /// Key and length of the essence element at `position`
    pub fn element_kl(&mut self, position: i64) -> Result<Kl> {
        let location = self.locate(position)?;
        self.reader.seek(location.file_offset)?;
        let kl = self.reader.read_kl()?;
        if !kl.key.is_essence() {
            return Err(MxfError::MalformedKlv(format!(
                "index points at {} for position {}, not an essence element",
                kl.key, position
            )));
        }
        Ok(kl)
    }

    /// Read the essence bytes of one edit unit
    pub fn read_edit_unit(&mut self, position: i64) -> Result<Vec<u8>> {
        let kl = self.element_kl(position)?;
        self.reader.read_value(kl.length)
    }

    /// First essence byte of a body partition, past its pack and any fill
    fn essence_start(&mut self, partition: &PartitionPack) -> Result<u64> {
        self.reader.seek(partition.this_partition)?;
        let pack_kl = self.reader.read_kl()?;
        let mut offset = offset_past(
            pack_kl.end_offset(),
            &[partition.header_byte_count, partition.index_byte_count],
        )?;
        loop {
            self.reader.seek(offset)?;
            let kl = self.reader.read_kl()?;
            if !kl.key.is_fill() {
                return Ok(offset);
            }
            offset = kl.end_offset();
        }
    }
}

/// `base` plus byte counts taken from the file, rejecting sums that overflow
fn offset_past(base: u64, sizes: &[u64]) -> Result<u64> {
    sizes
        .iter()
        .try_fold(base, |acc, &size| acc.checked_add(size))
        .ok_or_else(|| {
            MxfError::MalformedKlv(format!("byte counts {:?} overflow past offset {}", sizes, base))
        })
}

fn read_primer<R: Read + Seek>(
    reader: &mut KlvReader<R>,
    header: &PartitionPack,
) -> Result<Option<PrimerPack>> {
    if header.header_byte_count == 0 {
        return Ok(None);
    }
    reader.seek(header.this_partition)?;
    let pack_kl = reader.read_kl()?;
    reader.seek(pack_kl.end_offset())?;
    let kl = reader.read_next_non_fill_kl()?;
    if kl.key.is_primer_pack() {
        Ok(Some(PrimerPack::read(reader, &kl)?))
    } else {
        Ok(None)
    }
}

fn read_index_segments<R: Read + Seek>(
    reader: &mut KlvReader<R>,
    pack: &PartitionPack,
) -> Result<Vec<IndexTableSegment>> {
    reader.seek(pack.this_partition)?;
    let pack_kl = reader.read_kl()?;
    let start = offset_past(pack_kl.end_offset(), &[pack.header_byte_count])?;
    let end = offset_past(start, &[pack.index_byte_count])?;

    let mut segments = Vec::new();
    reader.seek(start)?;
    while reader.position()? < end {
        let kl = reader.read_kl()?;
        if kl.key.is_index_segment() {
            segments.push(read_segment(reader, &kl)?);
        }
        reader.seek(kl.end_offset())?;
    }
    Ok(segments)
}
