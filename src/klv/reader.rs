//! KLV Reader
//!
//! Reads keys, BER lengths and big-endian fixed-width values from any
//! seekable byte source.

use std::io::{Read, Seek, SeekFrom};

use byteorder::{BigEndian, ReadBytesExt};
use uuid::Uuid;

use crate::error::{MxfError, Result};

use super::{decode_ber, Key, Rational, MAX_BER_WIDTH};

/// A key and length read from the stream; the value follows at `value_offset`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Kl {
    pub key: Key,
    pub length: u64,
    /// Number of bytes the BER length occupied
    pub llen: u8,
    /// File offset of the key
    pub offset: u64,
    /// File offset of the first value byte
    pub value_offset: u64,
}

impl Kl {
    /// Offset of the byte following the value
    pub fn end_offset(&self) -> u64 {
        self.value_offset + self.length
    }

    /// Size of key + length + value
    pub fn total_size(&self) -> u64 {
        self.end_offset() - self.offset
    }
}

/// Reads KLV primitives from a seekable source
pub struct KlvReader<R> {
    inner: R,
}

impl<R: Read + Seek> KlvReader<R> {
    pub fn new(inner: R) -> Self {
        Self { inner }
    }

    pub fn into_inner(self) -> R {
        self.inner
    }

    pub fn get_mut(&mut self) -> &mut R {
        &mut self.inner
    }

    /// Current stream position
    pub fn position(&mut self) -> Result<u64> {
        Ok(self.inner.stream_position()?)
    }

    pub fn seek(&mut self, offset: u64) -> Result<u64> {
        Ok(self.inner.seek(SeekFrom::Start(offset))?)
    }

    /// Skip `count` bytes forward
    pub fn skip(&mut self, count: u64) -> Result<u64> {
        let count = i64::try_from(count)
            .map_err(|_| MxfError::MalformedKlv(format!("skip of {} bytes too large", count)))?;
        Ok(self.inner.seek(SeekFrom::Current(count))?)
    }

    /// Total stream length; the position is restored afterwards
    pub fn stream_len(&mut self) -> Result<u64> {
        let pos = self.inner.stream_position()?;
        let len = self.inner.seek(SeekFrom::End(0))?;
        self.inner.seek(SeekFrom::Start(pos))?;
        Ok(len)
    }

    // =========================================================================
    // Keys and Lengths
    // =========================================================================

    pub fn read_key(&mut self) -> Result<Key> {
        let mut key = [0u8; 16];
        self.read_exact(&mut key, "key")?;
        Ok(Key(key))
    }

    /// Read a BER length; returns `(length, encoded width)`
    pub fn read_ber_length(&mut self) -> Result<(u64, u8)> {
        let mut buf = [0u8; MAX_BER_WIDTH];
        self.read_exact(&mut buf[..1], "BER length")?;
        if buf[0] >= 0x80 {
            let count = ((buf[0] & 0x7F) as usize).min(MAX_BER_WIDTH - 1);
            self.read_exact(&mut buf[1..1 + count], "BER length")?;
            let (length, used) = decode_ber(&buf[..1 + count])?;
            return Ok((length, used as u8));
        }
        Ok((buf[0] as u64, 1))
    }

    /// Read a 16-byte key followed by its BER length
    ///
    /// The value must fit inside the stream, so `Kl::end_offset` never overflows.
    pub fn read_kl(&mut self) -> Result<Kl> {
        let offset = self.position()?;
        let key = self.read_key()?;
        let (length, llen) = self.read_ber_length()?;
        let value_offset = offset + 16 + llen as u64;
        let stream_len = self.stream_len()?;
        match value_offset.checked_add(length) {
            Some(end) if end <= stream_len => {}
            _ => {
                return Err(MxfError::MalformedKlv(format!(
                    "value of {} bytes at offset {} runs past end of stream ({})",
                    length, value_offset, stream_len
                )))
            }
        }
        Ok(Kl {
            key,
            length,
            llen,
            offset,
            value_offset,
        })
    }

    /// Read the next key/length, skipping over fill items
    pub fn read_next_non_fill_kl(&mut self) -> Result<Kl> {
        loop {
            let kl = self.read_kl()?;
            if !kl.key.is_fill() {
                return Ok(kl);
            }
            self.skip(kl.length)?;
        }
    }

    /// Read a value of `length` bytes, refusing lengths past the end of the stream
    pub fn read_value(&mut self, length: u64) -> Result<Vec<u8>> {
        let pos = self.position()?;
        let end = self.stream_len()?;
        if pos.saturating_add(length) > end {
            return Err(MxfError::MalformedKlv(format!(
                "value of {} bytes at offset {} runs past end of stream ({})",
                length, pos, end
            )));
        }
        let mut value = vec![0u8; length as usize];
        self.read_exact(&mut value, "value")?;
        Ok(value)
    }

    // =========================================================================
    // Fixed-Width Values
    // =========================================================================

    pub fn read_u8(&mut self) -> Result<u8> {
        self.inner.read_u8().map_err(|e| MxfError::from_read(e, "u8"))
    }

    pub fn read_i8(&mut self) -> Result<i8> {
        self.inner.read_i8().map_err(|e| MxfError::from_read(e, "i8"))
    }

    pub fn read_u16(&mut self) -> Result<u16> {
        self.inner
            .read_u16::<BigEndian>()
            .map_err(|e| MxfError::from_read(e, "u16"))
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        self.inner
            .read_u32::<BigEndian>()
            .map_err(|e| MxfError::from_read(e, "u32"))
    }

    pub fn read_i32(&mut self) -> Result<i32> {
        self.inner
            .read_i32::<BigEndian>()
            .map_err(|e| MxfError::from_read(e, "i32"))
    }

    pub fn read_u64(&mut self) -> Result<u64> {
        self.inner
            .read_u64::<BigEndian>()
            .map_err(|e| MxfError::from_read(e, "u64"))
    }

    pub fn read_i64(&mut self) -> Result<i64> {
        self.inner
            .read_i64::<BigEndian>()
            .map_err(|e| MxfError::from_read(e, "i64"))
    }

    /// Universal label (same wire form as a key)
    pub fn read_ul(&mut self) -> Result<Key> {
        self.read_key()
    }

    pub fn read_uuid(&mut self) -> Result<Uuid> {
        let mut bytes = [0u8; 16];
        self.read_exact(&mut bytes, "UUID")?;
        Ok(Uuid::from_bytes(bytes))
    }

    pub fn read_rational(&mut self) -> Result<Rational> {
        let numerator = self.read_i32()?;
        let denominator = self.read_i32()?;
        Ok(Rational::new(numerator, denominator))
    }

    /// Batch/array header: `(element count, element size)`
    pub fn read_batch_header(&mut self) -> Result<(u32, u32)> {
        let count = self.read_u32()?;
        let size = self.read_u32()?;
        Ok((count, size))
    }

    fn read_exact(&mut self, buf: &mut [u8], what: &str) -> Result<()> {
        self.inner
            .read_exact(buf)
            .map_err(|e| MxfError::from_read(e, what))
    }
}
