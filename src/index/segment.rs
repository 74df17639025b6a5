//! Index Table Segment
//!
//! In-memory segment: header fields plus owned, append-only entry arrays.

use uuid::Uuid;

use crate::error::{MxfError, Result};
use crate::klv::{Rational, LOCAL_ITEM_HEADER_SIZE, MAX_LOCAL_ITEM_SIZE};

use super::entry::{DeltaEntry, IndexEntry, DELTA_ENTRY_SIZE};
use super::ARRAY_HEADER_SIZE;

/// Size of the fixed items every segment carries (headers included):
/// InstanceUID, EditRate, StartPosition, Duration, EditUnitByteCount,
/// IndexSID, BodySID, SliceCount, PosTableCount
pub(crate) const FIXED_ITEMS_SIZE: u64 = (LOCAL_ITEM_HEADER_SIZE as u64) * 9 + 16 + 8 * 3 + 4 * 3 + 2;

/// Result of resolving an edit-unit position
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexLookup {
    /// Byte offset of the edit unit within the essence container
    pub stream_offset: u64,
    pub flags: u8,
    pub temporal_offset: i8,
    pub key_frame_offset: i8,
}

/// One index table segment
#[derive(Debug, Clone, PartialEq)]
pub struct IndexTableSegment {
    pub instance_uid: Uuid,
    pub index_edit_rate: Rational,
    pub index_start_position: i64,
    pub index_duration: i64,
    /// Non-zero means constant bytes per edit unit; no entries are stored
    pub edit_unit_byte_count: u32,
    pub index_sid: u32,
    pub body_sid: u32,
    slice_count: u8,
    pos_table_count: u8,
    delta_entries: Vec<DeltaEntry>,
    index_entries: Vec<IndexEntry>,
}

impl IndexTableSegment {
    pub fn new(index_edit_rate: Rational, index_sid: u32, body_sid: u32) -> Self {
        Self {
            instance_uid: Uuid::new_v4(),
            index_edit_rate,
            index_start_position: 0,
            index_duration: 0,
            edit_unit_byte_count: 0,
            index_sid,
            body_sid,
            slice_count: 0,
            pos_table_count: 0,
            delta_entries: Vec::new(),
            index_entries: Vec::new(),
        }
    }

    /// Constant-bytes-per-edit-unit segment
    pub fn constant(index_edit_rate: Rational, edit_unit_byte_count: u32, index_sid: u32, body_sid: u32) -> Self {
        let mut segment = Self::new(index_edit_rate, index_sid, body_sid);
        segment.edit_unit_byte_count = edit_unit_byte_count;
        segment
    }

    pub fn is_cbe(&self) -> bool {
        self.edit_unit_byte_count != 0
    }

    pub fn slice_count(&self) -> u8 {
        self.slice_count
    }

    pub fn pos_table_count(&self) -> u8 {
        self.pos_table_count
    }

    pub fn delta_entries(&self) -> &[DeltaEntry] {
        &self.delta_entries
    }

    pub fn index_entries(&self) -> &[IndexEntry] {
        &self.index_entries
    }

    /// Fix the slice/PosTable shape; frozen once an IndexEntry exists
    pub fn set_shape(&mut self, slice_count: u8, pos_table_count: u8) -> Result<()> {
        if !self.index_entries.is_empty()
            && (slice_count != self.slice_count || pos_table_count != self.pos_table_count)
        {
            return Err(MxfError::ShapeMismatch(format!(
                "segment holds {} entries shaped ({}, {}); cannot reshape to ({}, {})",
                self.index_entries.len(),
                self.slice_count,
                self.pos_table_count,
                slice_count,
                pos_table_count
            )));
        }
        self.slice_count = slice_count;
        self.pos_table_count = pos_table_count;
        Ok(())
    }

    /// Encoded size of one IndexEntry in this segment
    pub fn index_entry_size(&self) -> usize {
        IndexEntry::element_size(self.slice_count, self.pos_table_count)
    }

    // =========================================================================
    // Appending
    // =========================================================================

    pub fn add_delta_entry(&mut self, pos_table_index: i8, slice: u8, element_data: u32) -> Result<()> {
        let size = array_item_size(self.delta_entries.len() + 1, DELTA_ENTRY_SIZE);
        if size > MAX_LOCAL_ITEM_SIZE {
            return Err(MxfError::CapacityExceeded {
                item: "delta entry array",
                size,
            });
        }
        self.delta_entries.push(DeltaEntry {
            pos_table_index,
            slice,
            element_data,
        });
        Ok(())
    }

    pub fn add_index_entry(
        &mut self,
        temporal_offset: i8,
        key_frame_offset: i8,
        flags: u8,
        stream_offset: u64,
        slice_offsets: &[u32],
        pos_table: &[Rational],
    ) -> Result<()> {
        self.push_index_entry(IndexEntry {
            temporal_offset,
            key_frame_offset,
            flags,
            stream_offset,
            slice_offsets: slice_offsets.to_vec(),
            pos_table: pos_table.to_vec(),
        })
    }

    /// Append an owned entry, checking shape and the local item ceiling
    pub fn push_index_entry(&mut self, entry: IndexEntry) -> Result<()> {
        self.check_shape(&entry)?;
        let size = array_item_size(self.index_entries.len() + 1, self.index_entry_size());
        if size > MAX_LOCAL_ITEM_SIZE {
            return Err(MxfError::CapacityExceeded {
                item: "index entry array",
                size,
            });
        }
        self.index_entries.push(entry);
        Ok(())
    }

    pub(crate) fn check_shape(&self, entry: &IndexEntry) -> Result<()> {
        if entry.slice_offsets.len() != self.slice_count as usize
            || entry.pos_table.len() != self.pos_table_count as usize
        {
            return Err(MxfError::ShapeMismatch(format!(
                "entry has {} slice offsets and {} PosTable values; segment expects {} and {}",
                entry.slice_offsets.len(),
                entry.pos_table.len(),
                self.slice_count,
                self.pos_table_count
            )));
        }
        Ok(())
    }

    /// Largest number of IndexEntries this segment's shape can hold
    pub fn index_entry_capacity(&self) -> usize {
        (MAX_LOCAL_ITEM_SIZE - ARRAY_HEADER_SIZE) / self.index_entry_size()
    }

    /// Largest number of DeltaEntries a segment can hold
    pub fn delta_entry_capacity() -> usize {
        (MAX_LOCAL_ITEM_SIZE - ARRAY_HEADER_SIZE) / DELTA_ENTRY_SIZE
    }

    // =========================================================================
    // Resolving Positions
    // =========================================================================

    /// Whether `position` falls inside this segment
    pub fn covers(&self, position: i64) -> bool {
        if position < self.index_start_position {
            return false;
        }
        if self.is_cbe() && self.index_duration == 0 {
            // open-ended CBE segment
            return true;
        }
        position
            .checked_sub(self.index_start_position)
            .map_or(false, |relative| relative < self.index_duration)
    }

    /// Resolve `position` to a stream offset
    ///
    /// CBE: `edit_unit_byte_count * (position - index_start_position)`.
    /// VBE: the stored entry for that edit unit.
    pub fn lookup(&self, position: i64) -> Result<IndexLookup> {
        if !self.covers(position) {
            return Err(MxfError::PositionNotIndexed(position));
        }
        let relative = position
            .checked_sub(self.index_start_position)
            .ok_or(MxfError::PositionNotIndexed(position))? as u64;

        if self.is_cbe() {
            let stream_offset = (self.edit_unit_byte_count as u64)
                .checked_mul(relative)
                .ok_or(MxfError::PositionNotIndexed(position))?;
            return Ok(IndexLookup {
                stream_offset,
                flags: super::flags::RANDOM_ACCESS,
                temporal_offset: 0,
                key_frame_offset: 0,
            });
        }

        let entry = self
            .index_entries
            .get(relative as usize)
            .ok_or(MxfError::PositionNotIndexed(position))?;
        Ok(IndexLookup {
            stream_offset: entry.stream_offset,
            flags: entry.flags,
            temporal_offset: entry.temporal_offset,
            key_frame_offset: entry.key_frame_offset,
        })
    }

    // =========================================================================
    // Encoded Sizes
    // =========================================================================

    /// Value size of the whole segment (excluding key and BER length)
    pub fn value_size(&self) -> u64 {
        Self::value_size_for(
            self.delta_entries.len(),
            self.index_entries.len(),
            self.index_entry_size(),
        )
    }

    pub(crate) fn value_size_for(delta_count: usize, index_count: usize, index_entry_size: usize) -> u64 {
        let mut size = FIXED_ITEMS_SIZE;
        if delta_count > 0 {
            size += (LOCAL_ITEM_HEADER_SIZE + array_item_size(delta_count, DELTA_ENTRY_SIZE)) as u64;
        }
        if index_count > 0 {
            size += (LOCAL_ITEM_HEADER_SIZE + array_item_size(index_count, index_entry_size)) as u64;
        }
        size
    }

    pub(crate) fn from_parts(header: IndexTableSegment, deltas: Vec<DeltaEntry>, entries: Vec<IndexEntry>) -> Self {
        Self {
            delta_entries: deltas,
            index_entries: entries,
            ..header
        }
    }
}

/// Size of an array item value: batch header + elements
pub(crate) fn array_item_size(count: usize, element_size: usize) -> usize {
    ARRAY_HEADER_SIZE + count * element_size
}
