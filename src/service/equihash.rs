use super::{PowService, PowVersion, ProofOfWork};
use crate::difficulty::adjust_difficulty;
use crate::equihash::{Equihash, Puzzle};
use crate::error::Error;
use byteorder::{BigEndian, ByteOrder};
use derive_builder::Builder;
use sha2::{Digest, Sha256};
use std::time::Instant;
use tracing::{debug, info};

pub const DEFAULT_N: u32 = 90;
pub const DEFAULT_K: u32 = 5;
/// Maps a requested difficulty onto the Equihash difficulty scale.
pub const DIFFICULTY_SCALE_FACTOR: f64 = 3.0e-5;

/// Version 1 proofs: an Equihash solution over `sha256(payload || challenge)`.
#[derive(Builder, Debug, Clone, PartialEq)]
#[builder(pattern = "owned")]
pub struct EquihashService {
    #[builder(default = "DEFAULT_N")]
    n: u32,
    #[builder(default = "DEFAULT_K")]
    k: u32,
    #[builder(default = "DIFFICULTY_SCALE_FACTOR")]
    difficulty_scale_factor: f64,
}

impl EquihashServiceBuilder {
    fn validate(&self) -> Result<(), Error> {
        let n = self.n.unwrap_or(DEFAULT_N);
        let k = self.k.unwrap_or(DEFAULT_K);
        Equihash::new(n, k, 1.0).map_err(|e| Error::InvalidConfig(e.to_string()))?;
        let scale = self.difficulty_scale_factor.unwrap_or(DIFFICULTY_SCALE_FACTOR);
        if !(scale.is_finite() && scale > 0.0) {
            return Err(Error::InvalidConfig(
                "difficulty_scale_factor must be finite and > 0".into(),
            ));
        }
        Ok(())
    }

    pub fn build_validated(self) -> Result<EquihashService, Error> {
        self.validate()?;
        self.build().map_err(|e| Error::InvalidConfig(e.to_string()))
    }
}

impl Default for EquihashService {
    fn default() -> Self {
        EquihashService {
            n: DEFAULT_N,
            k: DEFAULT_K,
            difficulty_scale_factor: DIFFICULTY_SCALE_FACTOR,
        }
    }
}

impl EquihashService {
    pub fn n(&self) -> u32 {
        self.n
    }

    pub fn k(&self) -> u32 {
        self.k
    }

    /// The Equihash difficulty a requested `difficulty` is solved at.
    pub fn scaled_difficulty(&self, difficulty: f64) -> f64 {
        adjust_difficulty(self.difficulty_scale_factor * difficulty)
    }

    fn puzzle(&self, payload: &[u8], challenge: &[u8], difficulty: f64) -> Result<Puzzle, Error> {
        let params = Equihash::new(self.n, self.k, self.scaled_difficulty(difficulty))?;
        Ok(params.puzzle(&puzzle_seed(payload, challenge)))
    }
}

/// `sha256(payload || challenge)`.
pub fn puzzle_seed(payload: &[u8], challenge: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(payload);
    hasher.update(challenge);
    hasher.finalize().into()
}

impl PowService for EquihashService {
    fn version(&self) -> PowVersion {
        PowVersion::Equihash
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
        let puzzle = self.puzzle(payload, challenge, difficulty)?;
        info!(
            n = self.n,
            k = self.k,
            difficulty,
            scaled = puzzle.params().difficulty(),
            "minting equihash proof"
        );

        let start = Instant::now();
        let solution = puzzle.find_solution_until(should_stop)?;
        let duration_ms = start.elapsed().as_millis() as u64;
        let bytes = solution.serialize();
        let counter = BigEndian::read_u64(&bytes[..8]);
        info!(counter, duration_ms, "minted equihash proof");

        Ok(ProofOfWork {
            payload: payload.to_vec(),
            counter,
            challenge: challenge.to_vec(),
            difficulty,
            duration_ms,
            solution: bytes,
            version: PowVersion::Equihash.as_u8(),
        })
    }

    fn verify(&self, pow: &ProofOfWork) -> bool {
        if pow.version != PowVersion::Equihash.as_u8() || !pow.difficulty.is_finite() {
            return false;
        }
        let puzzle = match self.puzzle(&pow.payload, &pow.challenge, pow.difficulty) {
            Ok(puzzle) => puzzle,
            Err(err) => {
                debug!(%err, "rejecting equihash proof");
                return false;
            }
        };
        match puzzle.deserialize_solution(&pow.solution) {
            Ok(solution) => solution.nonce() == pow.counter && puzzle.verify(&solution),
            Err(err) => {
                debug!(%err, "rejecting equihash proof");
                false
            }
        }
    }
}
