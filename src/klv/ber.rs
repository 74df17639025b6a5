//! BER length encoding
//!
//! Lengths are written minimal by default. The fixed-width form exists so a
//! header can be emitted before its payload size is known.

use crate::error::{MxfError, Result};

/// Widest BER length accepted: one length-of-length byte + 8 length bytes
pub const MAX_BER_WIDTH: usize = 9;

/// Number of bytes the minimal BER encoding of `length` takes
pub fn ber_size(length: u64) -> usize {
    if length < 0x80 {
        1
    } else {
        let significant = 8 - (length.leading_zeros() as usize / 8);
        1 + significant
    }
}

/// Encode `length` in its minimal BER form
pub fn encode_ber(length: u64) -> Vec<u8> {
    // ber_size never exceeds MAX_BER_WIDTH for a u64
    encode_ber_fixed(length, ber_size(length)).unwrap_or_default()
}

/// Encode `length` using exactly `width` bytes
///
/// Width 1 is the short form and only holds values below 128. Any wider
/// encoding uses the long form with `width - 1` big-endian bytes, so the same
/// value can be written non-canonically (e.g. 5 as `0x83 00 00 05`).
pub fn encode_ber_fixed(length: u64, width: usize) -> Result<Vec<u8>> {
    if width == 0 || width > MAX_BER_WIDTH {
        return Err(MxfError::MalformedKlv(format!(
            "BER width {} outside 1..={}",
            width, MAX_BER_WIDTH
        )));
    }

    if width == 1 {
        if length >= 0x80 {
            return Err(MxfError::MalformedKlv(format!(
                "length {} does not fit short-form BER",
                length
            )));
        }
        return Ok(vec![length as u8]);
    }

    let value_bytes = width - 1;
    if value_bytes < 8 && length >> (value_bytes * 8) != 0 {
        return Err(MxfError::MalformedKlv(format!(
            "length {} does not fit {}-byte BER",
            length, width
        )));
    }

    let mut out = Vec::with_capacity(width);
    out.push(0x80 | value_bytes as u8);
    let be = length.to_be_bytes();
    out.extend_from_slice(&be[8 - value_bytes..]);
    Ok(out)
}

/// Decode a BER length from the start of `data`
///
/// Returns `(length, bytes consumed)`.
pub fn decode_ber(data: &[u8]) -> Result<(u64, usize)> {
    let first = *data
        .first()
        .ok_or_else(|| MxfError::MalformedKlv("no data for BER length".into()))?;

    if first < 0x80 {
        return Ok((first as u64, 1));
    }

    let count = (first & 0x7F) as usize;
    if count == 0 {
        return Err(MxfError::MalformedKlv(
            "indefinite BER length not supported".into(),
        ));
    }
    if count > 8 {
        return Err(MxfError::MalformedKlv(format!(
            "BER length-of-length {} exceeds 8",
            count
        )));
    }
    if data.len() < 1 + count {
        return Err(MxfError::MalformedKlv(format!(
            "BER length truncated: need {} bytes, have {}",
            1 + count,
            data.len()
        )));
    }

    let length = data[1..=count]
        .iter()
        .fold(0u64, |acc, b| (acc << 8) | *b as u64);
    Ok((length, 1 + count))
}
