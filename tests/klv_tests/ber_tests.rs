//! Tests for BER length encoding
//!
//! These tests verify:
//! - Every value decodes to itself at every width that can hold it
//! - Widths too narrow for a value are rejected
//! - Malformed encodings (indefinite, oversized, truncated) fail

use mxfcap::klv::{ber_size, decode_ber, encode_ber, encode_ber_fixed};
use mxfcap::MxfError;

// =============================================================================
// Helper Functions
// =============================================================================

const WIDTHS: [usize; 5] = [1, 2, 3, 5, 9];
const VALUES: [u64; 5] = [0, 127, 128, 65535, 1 << 32];

/// Largest value a BER field of `width` bytes can hold
fn width_capacity(width: usize) -> u64 {
    match width {
        1 => 127,
        9 => u64::MAX,
        w => (1u64 << (8 * (w - 1))) - 1,
    }
}

// =============================================================================
// Width Grid
// =============================================================================

#[test]
fn test_grid_decodes_to_intended_length() {
    for &width in &WIDTHS {
        for &value in &VALUES {
            let encoded = encode_ber_fixed(value, width);
            if value <= width_capacity(width) {
                let bytes = encoded.unwrap();
                assert_eq!(bytes.len(), width, "value {} width {}", value, width);
                assert_eq!(decode_ber(&bytes).unwrap(), (value, width));
            } else {
                assert!(
                    matches!(encoded, Err(MxfError::MalformedKlv(_))),
                    "value {} should not fit width {}",
                    value,
                    width
                );
            }
        }
    }
}

#[test]
fn test_minimal_encoding_sizes() {
    assert_eq!(encode_ber(0), vec![0x00]);
    assert_eq!(encode_ber(127), vec![0x7F]);
    assert_eq!(encode_ber(128), vec![0x81, 0x80]);
    assert_eq!(encode_ber(65535), vec![0x82, 0xFF, 0xFF]);
    assert_eq!(encode_ber(1 << 32), vec![0x85, 0x01, 0x00, 0x00, 0x00, 0x00]);
    for &value in &VALUES {
        assert_eq!(encode_ber(value).len(), ber_size(value));
    }
}

#[test]
fn test_non_canonical_is_accepted_on_read() {
    assert_eq!(decode_ber(&[0x83, 0x00, 0x00, 0x05]).unwrap(), (5, 4));
    assert_eq!(decode_ber(&[0x88, 0, 0, 0, 0, 0, 0, 0, 0x10]).unwrap(), (16, 9));
}

#[test]
fn test_decode_ignores_trailing_bytes() {
    assert_eq!(decode_ber(&[0x05, 0xAA, 0xBB]).unwrap(), (5, 1));
}

// =============================================================================
// Malformed Input
// =============================================================================

#[test]
fn test_indefinite_length_rejected() {
    assert!(matches!(decode_ber(&[0x80]), Err(MxfError::MalformedKlv(_))));
}

#[test]
fn test_length_of_length_over_eight_rejected() {
    let mut bytes = vec![0x89];
    bytes.extend_from_slice(&[0u8; 9]);
    assert!(matches!(decode_ber(&bytes), Err(MxfError::MalformedKlv(_))));
}

#[test]
fn test_truncated_long_form_rejected() {
    assert!(matches!(decode_ber(&[0x83, 0x01]), Err(MxfError::MalformedKlv(_))));
    assert!(matches!(decode_ber(&[]), Err(MxfError::MalformedKlv(_))));
}

#[test]
fn test_invalid_widths_rejected() {
    assert!(encode_ber_fixed(1, 0).is_err());
    assert!(encode_ber_fixed(1, 10).is_err());
}
