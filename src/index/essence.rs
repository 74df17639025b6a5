//! Per-track index accumulation
//!
//! A capture track records one index record per edit unit while essence is
//! written, then emits the whole index into the footer partition.
//!
//! VBE records are kept packed in a [`BytesMut`] log rather than as
//! `IndexEntry` values:
//! ```text
//! ┌──────────────────┬───────────┐
//! │ StreamOffset (8) │ Flags (1) │  × edit units
//! └──────────────────┴───────────┘
//! ```

use std::io::{Seek, Write};

use bytes::{Buf, BufMut, BytesMut};
use tracing::debug;

use crate::error::Result;
use crate::klv::{KlvWriter, Rational};

use super::codec::{write_segment, IndexSegmentWriter, SegmentCounts};
use super::entry::IndexEntry;
use super::segment::IndexTableSegment;
use super::table::IndexTable;

const LOG_RECORD_SIZE: usize = 9;

/// Packed VBE index records in edit-unit order
#[derive(Debug, Clone, Default)]
pub struct EntryLog {
    buf: BytesMut,
}

impl EntryLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, stream_offset: u64, flags: u8) {
        self.buf.put_u64(stream_offset);
        self.buf.put_u8(flags);
    }

    pub fn len(&self) -> usize {
        self.buf.len() / LOG_RECORD_SIZE
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn get(&self, position: usize) -> Option<IndexEntry> {
        let start = position.checked_mul(LOG_RECORD_SIZE)?;
        let mut record = self.buf.get(start..start + LOG_RECORD_SIZE)?;
        let stream_offset = record.get_u64();
        let flags = record.get_u8();
        Some(IndexEntry {
            flags,
            stream_offset,
            ..Default::default()
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = IndexEntry> + '_ {
        (0..self.len()).filter_map(move |i| self.get(i))
    }
}

/// Index state of one track while it is being written
#[derive(Debug, Clone)]
pub enum EssenceIndex {
    /// Every edit unit occupies the same number of bytes
    Constant {
        edit_unit_byte_count: u32,
        duration: i64,
    },
    /// One record per edit unit
    Variable(EntryLog),
}

/// Where a track's index segments go
#[derive(Debug, Clone, Copy)]
pub struct IndexPlacement {
    pub edit_rate: Rational,
    pub index_sid: u32,
    pub body_sid: u32,
    /// VBE logs longer than this are streamed segment by segment
    pub streaming_threshold: usize,
}

impl EssenceIndex {
    pub fn constant(edit_unit_byte_count: u32) -> Self {
        EssenceIndex::Constant {
            edit_unit_byte_count,
            duration: 0,
        }
    }

    pub fn variable() -> Self {
        EssenceIndex::Variable(EntryLog::new())
    }

    pub fn duration(&self) -> i64 {
        match self {
            EssenceIndex::Constant { duration, .. } => *duration,
            EssenceIndex::Variable(log) => log.len() as i64,
        }
    }

    pub fn is_cbe(&self) -> bool {
        matches!(self, EssenceIndex::Constant { .. })
    }

    /// Account for the next edit unit; CBE tracks only count it
    pub fn record(&mut self, stream_offset: u64, flags: u8) {
        match self {
            EssenceIndex::Constant { duration, .. } => *duration += 1,
            EssenceIndex::Variable(log) => log.push(stream_offset, flags),
        }
    }

    /// Write all index segments; returns the bytes written
    pub fn write<W: Write + Seek>(
        &self,
        writer: &mut KlvWriter<W>,
        placement: &IndexPlacement,
    ) -> Result<u64> {
        match self {
            EssenceIndex::Constant {
                edit_unit_byte_count,
                duration,
            } => {
                let mut segment = IndexTableSegment::constant(
                    placement.edit_rate,
                    *edit_unit_byte_count,
                    placement.index_sid,
                    placement.body_sid,
                );
                segment.index_duration = *duration;
                write_segment(writer, &segment)
            }
            EssenceIndex::Variable(log) if log.len() > placement.streaming_threshold => {
                stream_log(writer, log, placement)
            }
            EssenceIndex::Variable(log) => {
                let mut table =
                    IndexTable::variable(placement.edit_rate, placement.index_sid, placement.body_sid);
                for entry in log.iter() {
                    table.push_entry(entry)?;
                }
                if table.segments().is_empty() {
                    let empty = IndexTableSegment::new(
                        placement.edit_rate,
                        placement.index_sid,
                        placement.body_sid,
                    );
                    return write_segment(writer, &empty);
                }
                let mut written = 0;
                for segment in table.segments() {
                    written += write_segment(writer, segment)?;
                }
                Ok(written)
            }
        }
    }
}

/// Emit a long log without materialising its entries, one segment per
/// `index_entry_capacity` records
fn stream_log<W: Write + Seek>(
    writer: &mut KlvWriter<W>,
    log: &EntryLog,
    placement: &IndexPlacement,
) -> Result<u64> {
    let template = IndexTableSegment::new(placement.edit_rate, placement.index_sid, placement.body_sid);
    let capacity = template.index_entry_capacity();
    let total = log.len();
    let mut written = 0;
    let mut start = 0;

    while start < total {
        let count = capacity.min(total - start);
        let mut header = template.clone();
        header.instance_uid = uuid::Uuid::new_v4();
        header.index_start_position = start as i64;
        header.index_duration = count as i64;

        let counts = SegmentCounts {
            delta_entries: 0,
            index_entries: count,
        };
        let mut seg_writer = IndexSegmentWriter::write_header(writer, &header, counts)?;
        for position in start..start + count {
            if let Some(entry) = log.get(position) {
                seg_writer.write_index_entry(&entry)?;
            }
        }
        written += seg_writer.finish()?;
        start += count;
    }

    debug!("streamed {} index entries in {} bytes", total, written);
    Ok(written)
}
