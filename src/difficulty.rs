//! Conversion from an expected-attempts difficulty to a 256-bit acceptance bound.
//!
//! A solution is accepted when its 256-bit difficulty hash, read as an unsigned
//! big-endian integer, is at most [`hash_upper_bound`]. The bound is computed
//! exactly from the binary decomposition of the difficulty so that minting and
//! verifying parties agree to the last bit.
use crate::error::Error;
use crate::numeric::exponent_of;
use num_bigint::BigUint;

/// Expected number of raw Equihash solutions per nonce at unit difficulty.
pub const MEAN_SOLUTION_COUNT_PER_NONCE: f64 = 2.0;

const HASH_BIT_LENGTH: i64 = 256;
const HASH_BYTE_LENGTH: usize = 32;
const SIGNIFICAND_BITS: i32 = 52;

/// 256-bit acceptance bound for `difficulty`, as eight big-endian words.
///
/// Fails for difficulties below `1.0` (and NaN).
pub fn hash_upper_bound(difficulty: f64) -> Result<[u32; 8], Error> {
    let inverse = inverse_difficulty_minus_one(difficulty)?;
    let bytes = copy_right_aligned(&inverse.to_bytes_be());
    let mut words = [0u32; 8];
    for (word, chunk) in words.iter_mut().zip(bytes.chunks_exact(4)) {
        *word = u32::from_be_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
    }
    Ok(words)
}

/// `max(ceil(2^256 / difficulty) - 1, 0)` computed on the exact binary value of
/// `difficulty`.
fn inverse_difficulty_minus_one(difficulty: f64) -> Result<BigUint, Error> {
    if difficulty.is_nan() || difficulty < 1.0 {
        return Err(Error::InvalidArgument(format!(
            "difficulty must be at least 1, got {difficulty}"
        )));
    }
    let exponent = exponent_of(difficulty) - SIGNIFICAND_BITS;
    let mantissa = BigUint::from(integral_mantissa(difficulty, exponent));

    let numerator = pow2_or_zero(HASH_BIT_LENGTH - i64::from(exponent)) + &mantissa - 1u32;
    let quotient = numerator / &mantissa;
    if quotient == BigUint::ZERO {
        return Ok(BigUint::ZERO);
    }
    Ok(quotient - 1u32)
}

/// `difficulty * 2^-exponent` truncated to an integer. The float-to-int cast
/// saturates, so an infinite difficulty maps to `i64::MAX`.
fn integral_mantissa(difficulty: f64, exponent: i32) -> u64 {
    let scaled = scale_by_power_of_two(difficulty, -exponent);
    (scaled as i64) as u64
}

/// Multiply by `2^power` without intermediate rounding. Splits the power so
/// that neither factor overflows to infinity or underflows to zero on its own.
fn scale_by_power_of_two(value: f64, power: i32) -> f64 {
    let mut result = value;
    let mut remaining = power;
    while remaining != 0 {
        let step = remaining.clamp(-1000, 1000);
        result *= f64::from_bits(((step + 1023) as u64) << SIGNIFICAND_BITS);
        remaining -= step;
    }
    result
}

/// `2^shift`, or zero when the shift is negative: a right shift of one by any
/// positive amount leaves nothing behind.
fn pow2_or_zero(shift: i64) -> BigUint {
    if shift < 0 {
        BigUint::ZERO
    } else {
        BigUint::from(1u32) << (shift as u64)
    }
}

/// Zero-pad `bytes` on the left to 32 bytes, keeping the low-order end.
fn copy_right_aligned(bytes: &[u8]) -> [u8; HASH_BYTE_LENGTH] {
    let mut out = [0u8; HASH_BYTE_LENGTH];
    let take = bytes.len().min(HASH_BYTE_LENGTH);
    out[HASH_BYTE_LENGTH - take..].copy_from_slice(&bytes[bytes.len() - take..]);
    out
}

/// Raise `real_difficulty` so that, accounting for the Poisson-distributed
/// number of solutions found per nonce, one accepted solution still takes
/// `real_difficulty` nonces on average.
pub fn adjust_difficulty(real_difficulty: f64) -> f64 {
    let p = -1.0 / real_difficulty.max(1.0);
    let log = log1p_checked(p);
    if log == 0.0 {
        return f64::INFINITY;
    }
    (-MEAN_SOLUTION_COUNT_PER_NONCE / log).max(1.0)
}

fn log1p_checked(p: f64) -> f64 {
    if p == -1.0 {
        f64::NEG_INFINITY
    } else if p < -1.0 {
        f64::NAN
    } else {
        p.ln_1p()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn hub(difficulty: f64) -> String {
        hash_upper_bound(difficulty)
            .expect("valid difficulty")
            .iter()
            .map(|w| hex::encode(w.to_be_bytes()))
            .collect::<Vec<_>>()
            .join(" ")
    }

    #[test]
    fn hash_upper_bound_reference_vectors() {
        assert_eq!(
            hub(1.0),
            "ffffffff ffffffff ffffffff ffffffff ffffffff ffffffff ffffffff ffffffff"
        );
        assert_eq!(
            hub(1.5),
            "aaaaaaaa aaaaaaaa aaaaaaaa aaaaaaaa aaaaaaaa aaaaaaaa aaaaaaaa aaaaaaaa"
        );
        assert_eq!(
            hub(2.0),
            "7fffffff ffffffff ffffffff ffffffff ffffffff ffffffff ffffffff ffffffff"
        );
        assert_eq!(
            hub(3.0),
            "55555555 55555555 55555555 55555555 55555555 55555555 55555555 55555555"
        );
        assert_eq!(
            hub(4.0),
            "3fffffff ffffffff ffffffff ffffffff ffffffff ffffffff ffffffff ffffffff"
        );
        assert_eq!(
            hub(5.0),
            "33333333 33333333 33333333 33333333 33333333 33333333 33333333 33333333"
        );
        assert_eq!(
            hub(50.0),
            "051eb851 eb851eb8 51eb851e b851eb85 1eb851eb 851eb851 eb851eb8 51eb851e"
        );
        assert_eq!(
            hub(500.0),
            "0083126e 978d4fdf 3b645a1c ac083126 e978d4fd f3b645a1 cac08312 6e978d4f"
        );
        assert_eq!(
            hub(1.0e20),
            "00000000 00000000 2f394219 248446ba a23d2ec7 29af3d61 0607aa01 67dd94ca"
        );
        assert_eq!(
            hub(3.402823669209385e38),
            "00000000 00000000 00000000 00000000 ffffffff ffffffff ffffffff ffffffff"
        );
        assert_eq!(
            hub(f64::INFINITY),
            "00000000 00000000 00000000 00000000 00000000 00000000 00000000 00000000"
        );
    }

    #[test]
    fn hash_upper_bound_just_above_one() {
        // One ulp above 1.0 shows the exact (non-rounded) division.
        assert_eq!(
            hub(1.0000000000000002),
            "ffffffff fffff000 00000000 00ffffff fffffff0 00000000 0000ffff ffffffff"
        );
        assert_eq!(
            hub(1.0e300),
            "00000000 00000000 00000000 00000000 00000000 00000000 00000000 00000000"
        );
    }

    #[test]
    fn hash_upper_bound_rejects_easy_difficulty() {
        for bad in [0.0, 0.5, 0.9999999999999999, -3.0, f64::NAN, f64::NEG_INFINITY] {
            assert!(matches!(
                hash_upper_bound(bad),
                Err(Error::InvalidArgument(_))
            ));
        }
    }

    #[test]
    fn adjust_difficulty_reference_values() {
        assert_eq!(adjust_difficulty(0.0), 1.0);
        assert_eq!(adjust_difficulty(0.5), 1.0);
        assert_eq!(adjust_difficulty(1.0), 1.0);
        assert_eq!(adjust_difficulty(1.1), 1.0);
        assert!((adjust_difficulty(1.2) - 1.1162212531024944).abs() < 1e-12);
        assert!((adjust_difficulty(1.5) - 1.820478453253675).abs() < 1e-12);
        assert!((adjust_difficulty(2.0) - 2.8853900817779268).abs() < 1e-12);
        assert!((adjust_difficulty(3.0) - 4.932606924752863).abs() < 1e-12);
        assert!((adjust_difficulty(4.0) - 6.952118993564414).abs() < 1e-12);
        assert!((adjust_difficulty(100.0) - 198.99832494684432).abs() < 1e-9);
        assert!((adjust_difficulty(1.0e6) - 1999998.9999998333).abs() < 1e-3);
        assert_eq!(adjust_difficulty(f64::INFINITY), f64::INFINITY);
    }

    #[test]
    fn adjust_difficulty_large_values_approach_twice_input() {
        let adjusted = adjust_difficulty(1.0e20);
        assert!((adjusted / 2.0e20 - 1.0).abs() < 1e-12);
    }

    #[test]
    fn log1p_boundaries() {
        assert_eq!(log1p_checked(-1.0), f64::NEG_INFINITY);
        assert!(log1p_checked(-1.5).is_nan());
        assert_eq!(log1p_checked(0.0), 0.0);
    }

    proptest! {
        #[test]
        fn hash_upper_bound_is_monotone(a in 1.0f64..1.0e30, b in 1.0f64..1.0e30) {
            let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
            let easy = hash_upper_bound(lo).unwrap();
            let hard = hash_upper_bound(hi).unwrap();
            prop_assert!(easy >= hard);
        }

        #[test]
        fn adjust_difficulty_is_monotone(a in 0.0f64..1.0e12, b in 0.0f64..1.0e12) {
            let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
            prop_assert!(adjust_difficulty(lo) <= adjust_difficulty(hi));
        }

        #[test]
        fn adjust_difficulty_never_below_one(d in -10.0f64..1.0e9) {
            prop_assert!(adjust_difficulty(d) >= 1.0);
        }
    }
}
