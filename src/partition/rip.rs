//! Random Index Pack
//!
//! Trailing directory of (BodySID, partition offset) pairs. The pack ends in a
//! 4-byte overall length so a reader can find its start from the file end.

use std::io::{Read, Seek, Write};

use tracing::debug;

use crate::error::{MxfError, Result};
use crate::klv::{labels, KlvReader, KlvWriter};

/// Entry size: BodySID (4) + ThisPartition (8)
pub const RIP_ENTRY_SIZE: u64 = 12;

/// Smallest possible pack: key + 1-byte length + overall length
const MIN_RIP_SIZE: u64 = 16 + 1 + 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RipEntry {
    pub body_sid: u32,
    pub this_partition: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RandomIndexPack {
    pub entries: Vec<RipEntry>,
}

impl RandomIndexPack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_entry(&mut self, body_sid: u32, this_partition: u64) {
        self.entries.push(RipEntry {
            body_sid,
            this_partition,
        });
    }

    /// Write the pack; returns its overall length
    pub fn write<W: Write + Seek>(&self, writer: &mut KlvWriter<W>) -> Result<u64> {
        let value_size = self.entries.len() as u64 * RIP_ENTRY_SIZE + 4;
        let kl_size = writer.write_kl(&labels::RIP, value_size)?;
        for entry in &self.entries {
            writer.write_u32(entry.body_sid)?;
            writer.write_u64(entry.this_partition)?;
        }
        let overall = kl_size as u64 + value_size;
        let overall_u32 = u32::try_from(overall).map_err(|_| {
            MxfError::CapacityExceeded {
                item: "random index pack",
                size: overall as usize,
            }
        })?;
        writer.write_u32(overall_u32)?;
        Ok(overall)
    }

    /// Look for a RIP at the end of the stream
    ///
    /// Returns `Ok(None)` when the trailing bytes do not lead to a RIP key.
    /// A RIP key whose contents are inconsistent is an error.
    pub fn locate<R: Read + Seek>(reader: &mut KlvReader<R>) -> Result<Option<Self>> {
        let stream_len = reader.stream_len()?;
        if stream_len < MIN_RIP_SIZE {
            return Ok(None);
        }

        reader.seek(stream_len - 4)?;
        let overall = reader.read_u32()? as u64;
        if overall < MIN_RIP_SIZE || overall > stream_len {
            debug!("no RIP: trailing length {} out of range", overall);
            return Ok(None);
        }

        let start = stream_len - overall;
        reader.seek(start)?;
        let key = reader.read_key()?;
        if !key.is_rip() {
            debug!("no RIP: key at offset {} is {}", start, key);
            return Ok(None);
        }

        let (length, llen) = reader.read_ber_length()?;
        let end = (start + 16 + llen as u64).saturating_add(length);
        if end != stream_len || length < 4 || (length - 4) % RIP_ENTRY_SIZE != 0 {
            return Err(MxfError::MalformedKlv(format!(
                "RIP length {} disagrees with overall length {}",
                length, overall
            )));
        }

        let count = (length - 4) / RIP_ENTRY_SIZE;
        let mut rip = RandomIndexPack::new();
        for _ in 0..count {
            let body_sid = reader.read_u32()?;
            let this_partition = reader.read_u64()?;
            rip.add_entry(body_sid, this_partition);
        }
        Ok(Some(rip))
    }
}
