//! Fixed-size value types stored in KLV payloads

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Rational number for edit rates and PosTable entries (8 bytes on disk)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rational {
    pub numerator: i32,
    pub denominator: i32,
}

impl Rational {
    pub const fn new(numerator: i32, denominator: i32) -> Self {
        Rational {
            numerator,
            denominator,
        }
    }

    pub fn to_f64(&self) -> f64 {
        if self.denominator == 0 {
            0.0
        } else {
            self.numerator as f64 / self.denominator as f64
        }
    }

    pub const fn fps_25() -> Self {
        Rational::new(25, 1)
    }

    pub const fn fps_29_97() -> Self {
        Rational::new(30000, 1001)
    }
}

impl Default for Rational {
    fn default() -> Self {
        Rational::new(0, 1)
    }
}

impl fmt::Display for Rational {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.numerator, self.denominator)
    }
}

/// UMID (Unique Material Identifier), 32 bytes
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Umid(pub [u8; 32]);

impl Umid {
    /// SMPTE 330M basic UMID label, length byte and generation method
    const PREFIX: [u8; 16] = [
        0x06, 0x0A, 0x2B, 0x34, 0x01, 0x01, 0x01, 0x05, 0x01, 0x01, 0x0D, 0x20, 0x13, 0x00, 0x00,
        0x00,
    ];

    pub fn zero() -> Self {
        Umid([0; 32])
    }

    /// New UMID with a random material number
    pub fn generate() -> Self {
        let mut bytes = [0u8; 32];
        bytes[0..16].copy_from_slice(&Self::PREFIX);
        bytes[16..32].copy_from_slice(Uuid::new_v4().as_bytes());
        Umid(bytes)
    }

    pub fn is_zero(&self) -> bool {
        self.0.iter().all(|&b| b == 0)
    }

    /// Material number portion (bytes 16..32)
    pub fn material_number(&self) -> &[u8] {
        &self.0[16..32]
    }
}

impl Default for Umid {
    fn default() -> Self {
        Umid::zero()
    }
}

impl fmt::Debug for Umid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "UMID(")?;
        for (i, byte) in self.0.iter().enumerate() {
            if i > 0 && i % 4 == 0 {
                write!(f, "-")?;
            }
            write!(f, "{:02x}", byte)?;
        }
        write!(f, ")")
    }
}
