//! Bit-exact helpers over IEEE-754 doubles and fixed-width words.
//!
//! Difficulty bounds are part of the proof format, so every implementation has
//! to agree on how a double is split into exponent and mantissa and where the
//! rounding boundaries sit. Nothing here relies on platform libm behaviour.
use std::cmp::Ordering;

const EXPONENT_BIAS: i32 = 1023;
const EXPONENT_MASK: u64 = 0x7ff;
const SIGNIFICAND_BITS: u32 = 52;

/// Unbiased binary exponent of `value`, read straight from its bit pattern.
///
/// Zero and subnormals report `-1023`; infinities and NaN report `1024`.
pub fn exponent_of(value: f64) -> i32 {
    let biased = ((value.to_bits() >> SIGNIFICAND_BITS) & EXPONENT_MASK) as i32;
    biased - EXPONENT_BIAS
}

/// Largest double strictly less than `value`.
pub fn next_down(value: f64) -> f64 {
    if value.is_nan() || value == f64::NEG_INFINITY {
        return value;
    }
    if value == 0.0 {
        return -f64::from_bits(1);
    }
    let bits = value.to_bits();
    if value > 0.0 {
        f64::from_bits(bits - 1)
    } else {
        f64::from_bits(bits + 1)
    }
}

/// Logical right shift of a 32-bit word; shifting by the width or more yields 0.
#[inline]
pub fn unsigned_shr_u32(value: impl Into<Word32>, bits: u32) -> u32 {
    value.into().0.checked_shr(bits).unwrap_or(0)
}

/// Logical right shift of a 64-bit word; shifting by the width or more yields 0.
#[inline]
pub fn unsigned_shr_u64(value: impl Into<Word64>, bits: u32) -> u64 {
    value.into().0.checked_shr(bits).unwrap_or(0)
}

/// Compare two word sequences as unsigned big-endian integers, most significant
/// word first. A strict prefix orders before the longer sequence.
pub fn unsigned_compare(a: &[u32], b: &[u32]) -> Ordering {
    for (x, y) in a.iter().zip(b.iter()) {
        match x.cmp(y) {
            Ordering::Equal => continue,
            other => return other,
        }
    }
    a.len().cmp(&b.len())
}

/// A 32-bit word viewed as unsigned regardless of its declared signedness.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Word32(pub u32);

impl From<u32> for Word32 {
    fn from(v: u32) -> Self {
        Word32(v)
    }
}

impl From<i32> for Word32 {
    fn from(v: i32) -> Self {
        Word32(v as u32)
    }
}

/// A 64-bit word viewed as unsigned regardless of its declared signedness.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Word64(pub u64);

impl From<u64> for Word64 {
    fn from(v: u64) -> Self {
        Word64(v)
    }
}

impl From<i64> for Word64 {
    fn from(v: i64) -> Self {
        Word64(v as u64)
    }
}
