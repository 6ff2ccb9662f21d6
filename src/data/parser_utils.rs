//! Shared helpers for the cursor and loader: winnow glue, offset arithmetic and
//! small fixed-point/bit-packing decoders.

use winnow::error::{ContextError, ErrMode};

/// Error type every winnow parser in this crate is instantiated with.
pub type WError = ErrMode<ContextError>;

/// Three-component float vector.
pub type Vector3F = [f32; 3];

/// Four-component float vector.
pub type Vector4F = [f32; 4];

/// Row-major 3x4 affine matrix.
pub type Matrix3x4 = [[f32; 4]; 3];

/// Resolve a self-relative offset: the field's own start + raw value = absolute position.
pub fn resolve_relative_offset(field_start: u64, raw: u32) -> u64 {
    field_start + u64::from(raw)
}

/// Unpack `count` booleans stored LSB-first in consecutive 32-bit words.
pub fn unpack_bit32_bools(words: &[u32], count: usize) -> Vec<bool> {
    let mut bools = Vec::with_capacity(count);
    for word in words {
        let mut value = *word;
        for _ in 0..32 {
            if bools.len() == count {
                return bools;
            }
            bools.push(value & 1 != 0);
            value >>= 1;
        }
    }
    bools
}

/// Number of 32-bit words needed to hold `count` packed booleans.
pub fn bit32_word_count(count: usize) -> usize {
    count.div_ceil(32)
}

/// A 16-bit fixed-point decimal with 1 sign bit, 10 integral bits and 5
/// fractional bits (Q10.5). Over- and underflow are not reported.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Decimal10x5 {
    raw: i16,
}

impl Decimal10x5 {
    const FRACTION_BITS: u32 = 5;

    pub const fn from_raw(raw: u16) -> Self {
        Decimal10x5 { raw: raw as i16 }
    }

    pub const fn raw(self) -> u16 {
        self.raw as u16
    }

    pub fn from_f32(value: f32) -> Self {
        Decimal10x5 {
            raw: (value * (1 << Self::FRACTION_BITS) as f32).round() as i16,
        }
    }

    pub fn to_f32(self) -> f32 {
        f32::from(self.raw) / (1 << Self::FRACTION_BITS) as f32
    }

    /// Round to the nearest integer.
    pub fn to_i32(self) -> i32 {
        let half = 1 << (Self::FRACTION_BITS - 1);
        (i32::from(self.raw) + half) >> Self::FRACTION_BITS
    }
}

impl From<Decimal10x5> for f32 {
    fn from(value: Decimal10x5) -> f32 {
        value.to_f32()
    }
}
