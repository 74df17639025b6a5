//! KLV Writer
//!
//! Appends KLV primitives to a seekable sink. All writes are appends except
//! [`KlvWriter::patch_length`] and [`KlvWriter::overwrite_at`], which rewrite
//! bytes reserved earlier without changing their size.

use std::io::{Seek, SeekFrom, Write};

use byteorder::{BigEndian, WriteBytesExt};
use uuid::Uuid;

use crate::error::{MxfError, Result};

use super::{ber_size, encode_ber, encode_ber_fixed, labels, Key, Rational, MAX_BER_WIDTH};

/// Placeholder length written ahead of a value whose size is not yet known
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reservation {
    /// Offset of the placeholder length bytes
    pub length_offset: u64,
    /// Fixed BER width reserved
    pub width: u8,
    /// Offset of the first value byte
    pub value_offset: u64,
}

/// Writes KLV primitives to a seekable sink
pub struct KlvWriter<W> {
    inner: W,
}

impl<W: Write + Seek> KlvWriter<W> {
    pub fn new(inner: W) -> Self {
        Self { inner }
    }

    pub fn into_inner(self) -> W {
        self.inner
    }

    pub fn get_ref(&self) -> &W {
        &self.inner
    }

    pub fn get_mut(&mut self) -> &mut W {
        &mut self.inner
    }

    pub fn position(&mut self) -> Result<u64> {
        Ok(self.inner.stream_position()?)
    }

    pub fn flush(&mut self) -> Result<()> {
        Ok(self.inner.flush()?)
    }

    // =========================================================================
    // Keys and Lengths
    // =========================================================================

    pub fn write_key(&mut self, key: &Key) -> Result<()> {
        self.inner.write_all(key.as_bytes())?;
        Ok(())
    }

    /// Write a minimal BER length; returns the number of bytes written
    pub fn write_l(&mut self, length: u64) -> Result<usize> {
        let bytes = encode_ber(length);
        self.inner.write_all(&bytes)?;
        Ok(bytes.len())
    }

    /// Write a BER length using exactly `width` bytes
    pub fn write_fixed_l(&mut self, length: u64, width: u8) -> Result<()> {
        let bytes = encode_ber_fixed(length, width as usize)?;
        self.inner.write_all(&bytes)?;
        Ok(())
    }

    pub fn write_kl(&mut self, key: &Key, length: u64) -> Result<usize> {
        self.write_key(key)?;
        Ok(16 + self.write_l(length)?)
    }

    pub fn write_fixed_kl(&mut self, key: &Key, length: u64, width: u8) -> Result<()> {
        self.write_key(key)?;
        self.write_fixed_l(length, width)
    }

    /// Write a complete triplet; returns total bytes written
    pub fn write_klv(&mut self, key: &Key, value: &[u8]) -> Result<u64> {
        let kl = self.write_kl(key, value.len() as u64)?;
        self.inner.write_all(value)?;
        Ok(kl as u64 + value.len() as u64)
    }

    // =========================================================================
    // Reserve / Patch
    // =========================================================================

    /// Write `key` followed by a zero length of `width` bytes to be patched later
    pub fn reserve_kl(&mut self, key: &Key, width: u8) -> Result<Reservation> {
        self.write_key(key)?;
        let length_offset = self.position()?;
        self.write_fixed_l(0, width)?;
        Ok(Reservation {
            length_offset,
            width,
            value_offset: length_offset + width as u64,
        })
    }

    /// Fill in a reserved length with the number of bytes written since the
    /// reservation; the stream is left positioned at its previous end
    pub fn patch_length(&mut self, reservation: &Reservation) -> Result<u64> {
        let end = self.position()?;
        let length = end.checked_sub(reservation.value_offset).ok_or_else(|| {
            MxfError::MalformedKlv("stream positioned before reserved value".into())
        })?;
        let bytes = encode_ber_fixed(length, reservation.width as usize)?;
        self.overwrite_at(reservation.length_offset, &bytes)?;
        Ok(length)
    }

    /// Rewrite bytes at an earlier offset and return to the current position
    pub fn overwrite_at(&mut self, offset: u64, bytes: &[u8]) -> Result<()> {
        let end = self.position()?;
        self.inner.seek(SeekFrom::Start(offset))?;
        self.inner.write_all(bytes)?;
        self.inner.seek(SeekFrom::Start(end))?;
        Ok(())
    }

    // =========================================================================
    // Fill
    // =========================================================================

    /// Write a fill item occupying exactly `total_size` bytes (minimum 17)
    pub fn write_fill(&mut self, total_size: u64) -> Result<()> {
        if total_size < 17 {
            return Err(MxfError::MalformedKlv(format!(
                "fill item of {} bytes is smaller than key + length",
                total_size
            )));
        }
        // a wider length field shrinks the value, so pick the first width that holds it
        let llen = (1..=MAX_BER_WIDTH as u64)
            .take_while(|llen| 16 + llen <= total_size)
            .find(|llen| ber_size(total_size - 16 - llen) as u64 <= *llen)
            .ok_or_else(|| {
                MxfError::MalformedKlv(format!("no BER width fits fill of {}", total_size))
            })?;
        let value_len = total_size - 16 - llen;
        self.write_fixed_kl(&labels::FILL, value_len, llen as u8)?;
        self.write_zeros(value_len)
    }

    /// Pad with a fill item so the next byte lands on a `kag` boundary
    pub fn align_to_kag(&mut self, kag: u32) -> Result<()> {
        if kag <= 1 {
            return Ok(());
        }
        let pos = self.position()?;
        let rem = pos % kag as u64;
        if rem == 0 {
            return Ok(());
        }
        let mut pad = kag as u64 - rem;
        while pad < 17 {
            pad += kag as u64;
        }
        self.write_fill(pad)
    }

    fn write_zeros(&mut self, count: u64) -> Result<()> {
        let zeros = [0u8; 4096];
        let mut remaining = count;
        while remaining > 0 {
            let n = remaining.min(zeros.len() as u64) as usize;
            self.inner.write_all(&zeros[..n])?;
            remaining -= n as u64;
        }
        Ok(())
    }

    // =========================================================================
    // Fixed-Width Values
    // =========================================================================

    pub fn write_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        self.inner.write_all(bytes)?;
        Ok(())
    }

    pub fn write_u8(&mut self, value: u8) -> Result<()> {
        Ok(self.inner.write_u8(value)?)
    }

    pub fn write_i8(&mut self, value: i8) -> Result<()> {
        Ok(self.inner.write_i8(value)?)
    }

    pub fn write_u16(&mut self, value: u16) -> Result<()> {
        Ok(self.inner.write_u16::<BigEndian>(value)?)
    }

    pub fn write_u32(&mut self, value: u32) -> Result<()> {
        Ok(self.inner.write_u32::<BigEndian>(value)?)
    }

    pub fn write_i32(&mut self, value: i32) -> Result<()> {
        Ok(self.inner.write_i32::<BigEndian>(value)?)
    }

    pub fn write_u64(&mut self, value: u64) -> Result<()> {
        Ok(self.inner.write_u64::<BigEndian>(value)?)
    }

    pub fn write_i64(&mut self, value: i64) -> Result<()> {
        Ok(self.inner.write_i64::<BigEndian>(value)?)
    }

    pub fn write_ul(&mut self, ul: &Key) -> Result<()> {
        self.write_key(ul)
    }

    pub fn write_uuid(&mut self, uuid: &Uuid) -> Result<()> {
        self.write_bytes(uuid.as_bytes())
    }

    pub fn write_rational(&mut self, value: Rational) -> Result<()> {
        self.write_i32(value.numerator)?;
        self.write_i32(value.denominator)
    }

    pub fn write_batch_header(&mut self, count: u32, element_size: u32) -> Result<()> {
        self.write_u32(count)?;
        self.write_u32(element_size)
    }
}
