//! Index Table
//!
//! Ordered segments for one index SID. A VBE segment that reaches the local
//! item ceiling is closed and a new one starts at the next position.

use crate::error::{MxfError, Result};
use crate::klv::Rational;

use super::entry::IndexEntry;
use super::segment::{IndexLookup, IndexTableSegment};

/// All index segments of one essence container
#[derive(Debug, Clone, PartialEq)]
pub struct IndexTable {
    edit_rate: Rational,
    index_sid: u32,
    body_sid: u32,
    segments: Vec<IndexTableSegment>,
}

impl IndexTable {
    /// Table with one open-ended CBE segment
    pub fn constant(edit_rate: Rational, edit_unit_byte_count: u32, index_sid: u32, body_sid: u32) -> Self {
        Self {
            edit_rate,
            index_sid,
            body_sid,
            segments: vec![IndexTableSegment::constant(
                edit_rate,
                edit_unit_byte_count,
                index_sid,
                body_sid,
            )],
        }
    }

    /// Empty VBE table
    pub fn variable(edit_rate: Rational, index_sid: u32, body_sid: u32) -> Self {
        Self {
            edit_rate,
            index_sid,
            body_sid,
            segments: Vec::new(),
        }
    }

    /// Rebuild a table from decoded segments, ordered by start position
    pub fn from_segments(mut segments: Vec<IndexTableSegment>) -> Result<Self> {
        let first = segments
            .first()
            .ok_or_else(|| MxfError::MalformedKlv("index table has no segments".into()))?;
        let (edit_rate, index_sid, body_sid) = (first.index_edit_rate, first.index_sid, first.body_sid);
        if segments.iter().any(|s| s.index_sid != index_sid) {
            return Err(MxfError::MalformedKlv(
                "index segments from more than one index SID".into(),
            ));
        }
        segments.sort_by_key(|s| s.index_start_position);
        Ok(Self {
            edit_rate,
            index_sid,
            body_sid,
            segments,
        })
    }

    pub fn edit_rate(&self) -> Rational {
        self.edit_rate
    }

    pub fn index_sid(&self) -> u32 {
        self.index_sid
    }

    pub fn body_sid(&self) -> u32 {
        self.body_sid
    }

    pub fn segments(&self) -> &[IndexTableSegment] {
        &self.segments
    }

    pub fn is_cbe(&self) -> bool {
        self.segments.first().map(|s| s.is_cbe()).unwrap_or(false)
    }

    /// Number of indexed edit units
    pub fn duration(&self) -> i64 {
        self.segments.iter().map(|s| s.index_duration).sum()
    }

    /// Number of stored IndexEntries across all segments
    pub fn entry_count(&self) -> usize {
        self.segments.iter().map(|s| s.index_entries().len()).sum()
    }

    /// Extend a CBE run by `count` edit units
    pub fn extend_constant(&mut self, count: u64) -> Result<()> {
        match self.segments.last_mut() {
            Some(segment) if segment.is_cbe() => {
                segment.index_duration += count as i64;
                Ok(())
            }
            _ => Err(MxfError::InvalidSequencing(
                "cannot extend a constant run on a VBE index".into(),
            )),
        }
    }

    /// Append the entry for the next edit unit of a VBE table
    pub fn push_entry(&mut self, entry: IndexEntry) -> Result<()> {
        if self.is_cbe() {
            return Err(MxfError::InvalidSequencing(
                "CBE index tables store no entries".into(),
            ));
        }

        let next_position = self.duration();
        let needs_segment = match self.segments.last() {
            None => true,
            Some(last) => last.index_entries().len() >= last.index_entry_capacity(),
        };
        if needs_segment {
            let mut segment = IndexTableSegment::new(self.edit_rate, self.index_sid, self.body_sid);
            segment.index_start_position = next_position;
            segment.set_shape(entry.slice_offsets.len() as u8, entry.pos_table.len() as u8)?;
            self.segments.push(segment);
        }

        let segment = self
            .segments
            .last_mut()
            .ok_or_else(|| MxfError::InvalidSequencing("index table has no open segment".into()))?;
        segment.push_index_entry(entry)?;
        segment.index_duration += 1;
        Ok(())
    }

    /// Resolve a position against the covering segment
    pub fn lookup(&self, position: i64) -> Result<IndexLookup> {
        self.segments
            .iter()
            .find(|s| s.covers(position))
            .ok_or(MxfError::PositionNotIndexed(position))?
            .lookup(position)
    }
}
