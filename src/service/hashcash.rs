use super::{PowService, PowVersion, ProofOfWork};
use crate::error::Error;
use crate::numeric::{exponent_of, next_down};
use sha2::{Digest, Sha256};
use std::time::Instant;
use tracing::info;

const STOP_POLL_INTERVAL: u64 = 1024;

/// Version 0 proofs: find a counter such that
/// `sha256(payload || challenge || counter_be64)` starts with enough zero bits.
///
/// A difficulty `d` asks for `ceil(log2(d))` leading zero bits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HashCashService;

/// Leading zero bits demanded by `difficulty`; anything at or below 1 needs none.
pub fn required_zero_bits(difficulty: f64) -> u32 {
    if !(difficulty > 1.0) {
        return 0;
    }
    (exponent_of(next_down(difficulty)) + 1).clamp(0, 256) as u32
}

fn counter_hash(payload: &[u8], challenge: &[u8], counter: u64) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(payload);
    hasher.update(challenge);
    hasher.update(counter.to_be_bytes());
    hasher.finalize().into()
}

fn leading_zero_bits(hash: &[u8; 32]) -> u32 {
    let mut count = 0u32;
    for byte in hash {
        if *byte == 0 {
            count += 8;
            continue;
        }
        count += byte.leading_zeros();
        break;
    }
    count
}

impl PowService for HashCashService {
    fn version(&self) -> PowVersion {
        PowVersion::HashCash
    }

    fn mint_until(
        &self,
        payload: &[u8],
        challenge: &[u8],
        difficulty: f64,
        should_stop: &dyn Fn() -> bool,
    ) -> Result<ProofOfWork, Error> {
        if !difficulty.is_finite() {
            return Err(Error::InvalidArgument(format!(
                "difficulty must be finite, got {difficulty}"
            )));
        }
        let bits = required_zero_bits(difficulty);
        info!(difficulty, bits, "minting hashcash proof");

        let start = Instant::now();
        let mut counter = 0u64;
        loop {
            if counter % STOP_POLL_INTERVAL == 0 && should_stop() {
                return Err(Error::Cancelled);
            }
            counter = counter.wrapping_add(1);
            if leading_zero_bits(&counter_hash(payload, challenge, counter)) >= bits {
                break;
            }
        }
        let duration_ms = start.elapsed().as_millis() as u64;
        info!(counter, duration_ms, "minted hashcash proof");

        Ok(ProofOfWork {
            payload: payload.to_vec(),
            counter,
            challenge: challenge.to_vec(),
            difficulty,
            duration_ms,
            solution: Vec::new(),
            version: PowVersion::HashCash.as_u8(),
        })
    }

    fn verify(&self, pow: &ProofOfWork) -> bool {
        if pow.version != PowVersion::HashCash.as_u8() || !pow.solution.is_empty() {
            return false;
        }
        if !pow.difficulty.is_finite() {
            return false;
        }
        let hash = counter_hash(&pow.payload, &pow.challenge, pow.counter);
        leading_zero_bits(&hash) >= required_zero_bits(pow.difficulty)
    }

    /// Difficulties are compared by the number of zero bits they demand.
    fn is_difficulty_sufficient(&self, difficulty: f64, control_difficulty: f64) -> bool {
        required_zero_bits(difficulty) >= required_zero_bits(control_difficulty)
    }
}
