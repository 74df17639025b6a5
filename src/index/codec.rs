//! Index Table Segment encoding and decoding
//!
//! Two write strategies share one encoder:
//! - [`write_segment`] takes every count from the in-memory entry lists
//! - [`IndexSegmentWriter`] takes the final counts up front so the header
//!   lengths are exact while entries are streamed from elsewhere

use std::io::{Read, Seek, Write};

use tracing::warn;

use crate::error::{MxfError, Result};
use crate::klv::{labels, Kl, KlvReader, KlvWriter, LOCAL_ITEM_HEADER_SIZE, MAX_LOCAL_ITEM_SIZE};

use super::entry::{DeltaEntry, IndexEntry, DELTA_ENTRY_SIZE};
use super::segment::{array_item_size, IndexTableSegment};
use super::tags;

/// Entry counts a streamed segment will contain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SegmentCounts {
    pub delta_entries: usize,
    pub index_entries: usize,
}

/// Streams one index table segment whose entry counts are known in advance
pub struct IndexSegmentWriter<'w, W> {
    writer: &'w mut KlvWriter<W>,
    counts: SegmentCounts,
    slice_count: u8,
    pos_table_count: u8,
    index_entry_size: usize,
    deltas_written: usize,
    entries_written: usize,
    start_offset: u64,
    total_size: u64,
}

impl<'w, W: Write + Seek> IndexSegmentWriter<'w, W> {
    /// Write the segment key, exact length and fixed items
    ///
    /// Entry lists held by `header` are ignored; only its fields and shape are used.
    pub fn write_header(
        writer: &'w mut KlvWriter<W>,
        header: &IndexTableSegment,
        counts: SegmentCounts,
    ) -> Result<Self> {
        let index_entry_size = header.index_entry_size();
        check_array_capacity("delta entry array", counts.delta_entries, DELTA_ENTRY_SIZE)?;
        check_array_capacity("index entry array", counts.index_entries, index_entry_size)?;

        let value_size = IndexTableSegment::value_size_for(
            counts.delta_entries,
            counts.index_entries,
            index_entry_size,
        );

        let start_offset = writer.position()?;
        let kl_size = writer.write_kl(&labels::INDEX_SEGMENT, value_size)?;

        writer.write_local_tag(tags::INSTANCE_UID, 16)?;
        writer.write_uuid(&header.instance_uid)?;
        writer.write_local_tag(tags::INDEX_EDIT_RATE, 8)?;
        writer.write_rational(header.index_edit_rate)?;
        writer.write_local_tag(tags::INDEX_START_POSITION, 8)?;
        writer.write_i64(header.index_start_position)?;
        writer.write_local_tag(tags::INDEX_DURATION, 8)?;
        writer.write_i64(header.index_duration)?;
        writer.write_local_tag(tags::EDIT_UNIT_BYTE_COUNT, 4)?;
        writer.write_u32(header.edit_unit_byte_count)?;
        writer.write_local_tag(tags::INDEX_SID, 4)?;
        writer.write_u32(header.index_sid)?;
        writer.write_local_tag(tags::BODY_SID, 4)?;
        writer.write_u32(header.body_sid)?;
        writer.write_local_tag(tags::SLICE_COUNT, 1)?;
        writer.write_u8(header.slice_count())?;
        writer.write_local_tag(tags::POS_TABLE_COUNT, 1)?;
        writer.write_u8(header.pos_table_count())?;

        if counts.delta_entries > 0 {
            writer.write_local_tag(
                tags::DELTA_ENTRY_ARRAY,
                array_item_size(counts.delta_entries, DELTA_ENTRY_SIZE),
            )?;
            writer.write_batch_header(counts.delta_entries as u32, DELTA_ENTRY_SIZE as u32)?;
        }

        let mut seg_writer = Self {
            writer,
            counts,
            slice_count: header.slice_count(),
            pos_table_count: header.pos_table_count(),
            index_entry_size,
            deltas_written: 0,
            entries_written: 0,
            start_offset,
            total_size: kl_size as u64 + value_size,
        };
        if counts.delta_entries == 0 {
            seg_writer.open_index_array()?;
        }
        Ok(seg_writer)
    }

    pub fn write_delta_entry(&mut self, entry: &DeltaEntry) -> Result<()> {
        if self.deltas_written == self.counts.delta_entries {
            return Err(MxfError::ShapeMismatch(format!(
                "segment was declared with {} delta entries",
                self.counts.delta_entries
            )));
        }
        self.writer.write_i8(entry.pos_table_index)?;
        self.writer.write_u8(entry.slice)?;
        self.writer.write_u32(entry.element_data)?;
        self.deltas_written += 1;
        if self.deltas_written == self.counts.delta_entries {
            self.open_index_array()?;
        }
        Ok(())
    }

    pub fn write_index_entry(&mut self, entry: &IndexEntry) -> Result<()> {
        if self.deltas_written < self.counts.delta_entries {
            return Err(MxfError::ShapeMismatch(format!(
                "{} of {} delta entries still outstanding",
                self.counts.delta_entries - self.deltas_written,
                self.counts.delta_entries
            )));
        }
        if self.entries_written == self.counts.index_entries {
            return Err(MxfError::ShapeMismatch(format!(
                "segment was declared with {} index entries",
                self.counts.index_entries
            )));
        }
        if entry.slice_offsets.len() != self.slice_count as usize
            || entry.pos_table.len() != self.pos_table_count as usize
        {
            return Err(MxfError::ShapeMismatch(format!(
                "entry shaped ({}, {}) written to segment shaped ({}, {})",
                entry.slice_offsets.len(),
                entry.pos_table.len(),
                self.slice_count,
                self.pos_table_count
            )));
        }

        self.writer.write_i8(entry.temporal_offset)?;
        self.writer.write_i8(entry.key_frame_offset)?;
        self.writer.write_u8(entry.flags)?;
        self.writer.write_u64(entry.stream_offset)?;
        for offset in &entry.slice_offsets {
            self.writer.write_u32(*offset)?;
        }
        for pos in &entry.pos_table {
            self.writer.write_rational(*pos)?;
        }
        self.entries_written += 1;
        Ok(())
    }

    /// Verify every declared entry was written; returns total segment size
    pub fn finish(mut self) -> Result<u64> {
        if self.deltas_written != self.counts.delta_entries
            || self.entries_written != self.counts.index_entries
        {
            return Err(MxfError::ShapeMismatch(format!(
                "segment declared {}/{} delta/index entries but {}/{} were written",
                self.counts.delta_entries,
                self.counts.index_entries,
                self.deltas_written,
                self.entries_written
            )));
        }
        let written = self.writer.position()? - self.start_offset;
        debug_assert_eq!(written, self.total_size);
        Ok(written)
    }

    fn open_index_array(&mut self) -> Result<()> {
        if self.counts.index_entries == 0 {
            return Ok(());
        }
        self.writer.write_local_tag(
            tags::INDEX_ENTRY_ARRAY,
            array_item_size(self.counts.index_entries, self.index_entry_size),
        )?;
        self.writer
            .write_batch_header(self.counts.index_entries as u32, self.index_entry_size as u32)
    }
}

fn check_array_capacity(item: &'static str, count: usize, element_size: usize) -> Result<()> {
    let size = array_item_size(count, element_size);
    if size > MAX_LOCAL_ITEM_SIZE {
        return Err(MxfError::CapacityExceeded { item, size });
    }
    Ok(())
}

/// Write a whole segment from its in-memory lists; returns bytes written
pub fn write_segment<W: Write + Seek>(writer: &mut KlvWriter<W>, segment: &IndexTableSegment) -> Result<u64> {
    let counts = SegmentCounts {
        delta_entries: segment.delta_entries().len(),
        index_entries: segment.index_entries().len(),
    };
    let mut seg_writer = IndexSegmentWriter::write_header(writer, segment, counts)?;
    for delta in segment.delta_entries() {
        seg_writer.write_delta_entry(delta)?;
    }
    for entry in segment.index_entries() {
        seg_writer.write_index_entry(entry)?;
    }
    seg_writer.finish()
}

// =============================================================================
// Decoding
// =============================================================================

/// Read a segment whose key and length have already been read into `kl`
///
/// Unknown local tags are skipped with a warning. Entry arrays are decoded
/// after all items are seen, so their shape can come from items in any order.
pub fn read_segment<R: Read + Seek>(reader: &mut KlvReader<R>, kl: &Kl) -> Result<IndexTableSegment> {
    if !kl.key.is_index_segment() {
        return Err(MxfError::MalformedKlv(format!(
            "expected index table segment, found {}",
            kl.key
        )));
    }

    let end = kl.end_offset();
    reader.seek(kl.value_offset)?;

    let mut header = IndexTableSegment::new(Default::default(), 0, 0);
    let mut slice_count = 0u8;
    let mut pos_table_count = 0u8;
    let mut delta_array: Option<(u32, u32, u64)> = None;
    let mut index_array: Option<(u32, u32, u64)> = None;

    while reader.position()? < end {
        let item_offset = reader.position()?;
        if end - item_offset < LOCAL_ITEM_HEADER_SIZE as u64 {
            return Err(MxfError::MalformedKlv(format!(
                "{} trailing bytes in index segment at offset {}",
                end - item_offset,
                item_offset
            )));
        }
        let (tag, length) = reader.read_local_tag()?;
        let value_offset = item_offset + LOCAL_ITEM_HEADER_SIZE as u64;
        if value_offset + length as u64 > end {
            return Err(MxfError::MalformedKlv(format!(
                "local item 0x{:04x} of {} bytes overruns index segment",
                tag, length
            )));
        }

        match tag {
            tags::INSTANCE_UID => {
                expect_len(tag, length, 16)?;
                header.instance_uid = reader.read_uuid()?;
            }
            tags::INDEX_EDIT_RATE => {
                expect_len(tag, length, 8)?;
                header.index_edit_rate = reader.read_rational()?;
            }
            tags::INDEX_START_POSITION => {
                expect_len(tag, length, 8)?;
                header.index_start_position = reader.read_i64()?;
            }
            tags::INDEX_DURATION => {
                expect_len(tag, length, 8)?;
                header.index_duration = reader.read_i64()?;
            }
            tags::EDIT_UNIT_BYTE_COUNT => {
                expect_len(tag, length, 4)?;
                header.edit_unit_byte_count = reader.read_u32()?;
            }
            tags::INDEX_SID => {
                expect_len(tag, length, 4)?;
                header.index_sid = reader.read_u32()?;
            }
            tags::BODY_SID => {
                expect_len(tag, length, 4)?;
                header.body_sid = reader.read_u32()?;
            }
            tags::SLICE_COUNT => {
                expect_len(tag, length, 1)?;
                slice_count = reader.read_u8()?;
            }
            tags::POS_TABLE_COUNT => {
                expect_len(tag, length, 1)?;
                pos_table_count = reader.read_u8()?;
            }
            tags::DELTA_ENTRY_ARRAY | tags::INDEX_ENTRY_ARRAY => {
                let (count, size) = reader.read_batch_header()?;
                if 8 + count as u64 * size as u64 != length as u64 {
                    return Err(MxfError::MalformedKlv(format!(
                        "array 0x{:04x} declares {} x {} bytes in a {}-byte item",
                        tag, count, size, length
                    )));
                }
                let array = Some((count, size, value_offset + 8));
                if tag == tags::DELTA_ENTRY_ARRAY {
                    delta_array = array;
                } else {
                    index_array = array;
                }
            }
            _ => {
                warn!(
                    "skipping unknown index segment item 0x{:04x} ({} bytes)",
                    tag, length
                );
            }
        }
        reader.seek(value_offset + length as u64)?;
    }

    header.set_shape(slice_count, pos_table_count)?;

    let deltas = match delta_array {
        Some((count, size, offset)) => read_delta_array(reader, count, size, offset)?,
        None => Vec::new(),
    };
    let entries = match index_array {
        Some((count, size, offset)) => read_index_array(reader, &header, count, size, offset)?,
        None => Vec::new(),
    };

    reader.seek(end)?;
    Ok(IndexTableSegment::from_parts(header, deltas, entries))
}

fn expect_len(tag: u16, length: u16, expected: u16) -> Result<()> {
    if length != expected {
        return Err(MxfError::MalformedKlv(format!(
            "local item 0x{:04x} has length {} (expected {})",
            tag, length, expected
        )));
    }
    Ok(())
}

fn read_delta_array<R: Read + Seek>(
    reader: &mut KlvReader<R>,
    count: u32,
    size: u32,
    offset: u64,
) -> Result<Vec<DeltaEntry>> {
    if size as usize != DELTA_ENTRY_SIZE {
        return Err(MxfError::ShapeMismatch(format!(
            "delta entry size {} (expected {})",
            size, DELTA_ENTRY_SIZE
        )));
    }
    reader.seek(offset)?;
    let mut deltas = Vec::with_capacity(count as usize);
    for _ in 0..count {
        deltas.push(DeltaEntry {
            pos_table_index: reader.read_i8()?,
            slice: reader.read_u8()?,
            element_data: reader.read_u32()?,
        });
    }
    Ok(deltas)
}

fn read_index_array<R: Read + Seek>(
    reader: &mut KlvReader<R>,
    header: &IndexTableSegment,
    count: u32,
    size: u32,
    offset: u64,
) -> Result<Vec<IndexEntry>> {
    if size as usize != header.index_entry_size() {
        return Err(MxfError::ShapeMismatch(format!(
            "index entry size {} does not match slice count {} and PosTable count {}",
            size,
            header.slice_count(),
            header.pos_table_count()
        )));
    }
    reader.seek(offset)?;
    let mut entries = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let temporal_offset = reader.read_i8()?;
        let key_frame_offset = reader.read_i8()?;
        let flags = reader.read_u8()?;
        let stream_offset = reader.read_u64()?;
        let slice_offsets = (0..header.slice_count())
            .map(|_| reader.read_u32())
            .collect::<Result<Vec<_>>>()?;
        let pos_table = (0..header.pos_table_count())
            .map(|_| reader.read_rational())
            .collect::<Result<Vec<_>>>()?;
        entries.push(IndexEntry {
            temporal_offset,
            key_frame_offset,
            flags,
            stream_offset,
            slice_offsets,
            pos_table,
        });
    }
    Ok(entries)
}
