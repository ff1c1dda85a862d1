//! Equihash puzzles: generalized-birthday collisions over BLAKE2b-256.
//!
//! For parameters `(n, k)` each nonce defines `N = 2^(n/(k+1) + 1)` candidate
//! inputs. A solution is `2^k` distinct inputs whose masked hashes XOR to zero
//! pairwise up a binary tree of depth `k`, listed in the canonical order of
//! [`sort_inputs`], and whose joint hash falls under the difficulty bound.
//! Solving takes `O(N)` time and memory per nonce; verifying takes `2^k + 1`
//! hashes.
mod hasher;
mod solution;
mod table;

pub use solution::{sort_inputs, Solution};

use crate::difficulty::hash_upper_bound;
use crate::error::Error;
use crate::numeric::unsigned_compare;
use hasher::HashPrefix;
use std::cmp::Ordering;
use table::XorTable;
use tracing::{debug, trace};

const HASH_BIT_LENGTH: u32 = 256;
const WORD_BITS: u32 = 32;
const MAX_COLLISION_BITS: u32 = 30;

/// Validated Equihash parameters bound to a difficulty.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Equihash {
    n: u32,
    k: u32,
    difficulty: f64,
    input_num: usize,
    input_bits: u32,
    domain_size: u32,
    hash_upper_bound: [u32; 8],
}

impl Equihash {
    /// Build parameters for collision bit count `n`, tree depth `k` and an
    /// (already adjusted) `difficulty >= 1`.
    pub fn new(n: u32, k: u32, difficulty: f64) -> Result<Self, Error> {
        let max_k = HASH_BIT_LENGTH / WORD_BITS;
        if k == 0 || k >= max_k {
            return Err(Error::InvalidArgument(format!(
                "tree depth k must be a positive integer less than {max_k}, got {k}"
            )));
        }
        if n == 0 || n >= HASH_BIT_LENGTH || n % (k + 1) != 0 {
            return Err(Error::InvalidArgument(format!(
                "collision bit count n must be a positive multiple of k + 1 and less than \
                 {HASH_BIT_LENGTH}, got {n}"
            )));
        }
        if n / (k + 1) >= MAX_COLLISION_BITS {
            return Err(Error::InvalidArgument(format!(
                "sub-collision bit count n / (k + 1) must be less than {MAX_COLLISION_BITS}, got {}",
                n / (k + 1)
            )));
        }
        let hash_upper_bound = hash_upper_bound(difficulty)?;
        let input_bits = n / (k + 1) + 1;
        Ok(Equihash {
            n,
            k,
            difficulty,
            input_num: 1 << k,
            input_bits,
            domain_size: 1 << input_bits,
            hash_upper_bound,
        })
    }

    pub fn n(&self) -> u32 {
        self.n
    }

    pub fn k(&self) -> u32 {
        self.k
    }

    pub fn difficulty(&self) -> f64 {
        self.difficulty
    }

    /// Number of inputs in a solution, `2^k`.
    pub fn input_num(&self) -> usize {
        self.input_num
    }

    /// Bits needed to encode one input, `n / (k + 1) + 1`.
    pub fn input_bits(&self) -> u32 {
        self.input_bits
    }

    /// Number of candidate inputs per nonce, `N = 2^input_bits`.
    pub fn domain_size(&self) -> u32 {
        self.domain_size
    }

    pub fn hash_upper_bound(&self) -> &[u32; 8] {
        &self.hash_upper_bound
    }

    /// Exact length of a serialized solution.
    pub fn solution_byte_len(&self) -> usize {
        (64 + self.input_num * self.input_bits as usize + 7) / 8
    }

    pub fn puzzle(&self, seed: &[u8]) -> Puzzle {
        Puzzle {
            params: *self,
            seed: seed.to_vec(),
        }
    }

    /// Search nonces from zero until one yields an accepted solution.
    pub fn find_solution(&self, seed: &[u8]) -> Solution {
        self.puzzle(seed).find_solution()
    }

    pub fn verify(&self, seed: &[u8], nonce: u64, inputs: &[u32]) -> bool {
        self.verify_inputs(&HashPrefix::new(seed, nonce), inputs)
    }

    pub fn deserialize_solution(&self, bytes: &[u8]) -> Result<Solution, Error> {
        Solution::deserialize(bytes, self.input_num, self.input_bits)
    }

    fn hash_mask(&self) -> u32 {
        self.domain_size / 2 - 1
    }

    /// One solve attempt: build the stage-0 table for this prefix, collapse it
    /// `k` times and return the first distinct, canonically ordered candidate
    /// that meets the difficulty bound.
    fn find_inputs(&self, prefix: &HashPrefix) -> Option<Vec<u32>> {
        let key_bound = (self.domain_size / 2) as usize;
        let mut table = XorTable::initial(prefix, self.k as usize, self.domain_size);
        for round in 1..=self.k {
            table = table.find_collisions(round < self.k, key_bound);
        }
        debug_assert_eq!(table.hash_width(), 0);
        debug_assert_eq!(table.index_tuple_width(), self.input_num);

        let mut candidates = 0usize;
        for indices in table.index_tuples() {
            if !all_distinct(indices) {
                continue;
            }
            candidates += 1;
            let inputs = sort_inputs(indices);
            if self.test_difficulty_condition(prefix, &inputs) {
                return Some(inputs);
            }
        }
        trace!(
            rows = table.num_rows(),
            candidates,
            "no candidate met the difficulty bound"
        );
        None
    }

    fn test_difficulty_condition(&self, prefix: &HashPrefix, inputs: &[u32]) -> bool {
        let difficulty_hash = prefix.hash_inputs(inputs);
        unsigned_compare(&difficulty_hash, &self.hash_upper_bound) != Ordering::Greater
    }

    fn verify_inputs(&self, prefix: &HashPrefix, inputs: &[u32]) -> bool {
        if inputs.len() != self.input_num || !all_distinct(inputs) {
            return false;
        }
        if inputs.iter().any(|&input| input >= self.domain_size) {
            return false;
        }
        if sort_inputs(inputs) != inputs {
            return false;
        }
        if !self.test_difficulty_condition(prefix, inputs) {
            return false;
        }

        // Leaf hashes are folded into one accumulator per hash word; each time a
        // subtree of the collision tree completes, the words it collided on must
        // have cancelled out.
        let width = self.k as usize + 1;
        let mask = self.hash_mask();
        let mut xor_hash = vec![0u32; width];
        for (i, &input) in inputs.iter().enumerate() {
            let hash = prefix.hash_inputs(&[input]);
            for (acc, word) in xor_hash.iter_mut().zip(&hash[..width]) {
                *acc ^= word & mask;
            }
            let mut ii = i + 1 + self.input_num;
            let mut j = 0;
            while ii & 1 == 0 {
                if xor_hash[j] != 0 {
                    return false;
                }
                ii >>= 1;
                j += 1;
            }
        }
        true
    }
}

/// An Equihash instance bound to one seed.
#[derive(Debug, Clone, PartialEq)]
pub struct Puzzle {
    params: Equihash,
    seed: Vec<u8>,
}

impl Puzzle {
    pub fn params(&self) -> &Equihash {
        &self.params
    }

    pub fn seed(&self) -> &[u8] {
        &self.seed
    }

    /// Try nonces `0, 1, 2, ...` until one yields an accepted solution.
    ///
    /// There is no upper bound on the number of attempts; callers that need to
    /// give up use [`Puzzle::find_solution_until`].
    pub fn find_solution(&self) -> Solution {
        let mut nonce = 0u64;
        loop {
            if let Some(solution) = self.try_nonce(nonce) {
                return solution;
            }
            nonce = nonce.wrapping_add(1);
        }
    }

    /// Like [`Puzzle::find_solution`], but polls `should_stop` before every
    /// nonce and returns [`Error::Cancelled`] once it reports `true`.
    pub fn find_solution_until(&self, should_stop: impl Fn() -> bool) -> Result<Solution, Error> {
        let mut nonce = 0u64;
        loop {
            if should_stop() {
                debug!(attempts = nonce, "equihash search cancelled");
                return Err(Error::Cancelled);
            }
            if let Some(solution) = self.try_nonce(nonce) {
                return Ok(solution);
            }
            nonce = nonce.wrapping_add(1);
        }
    }

    /// Run a single solve attempt at `nonce`.
    pub fn try_nonce(&self, nonce: u64) -> Option<Solution> {
        let prefix = HashPrefix::new(&self.seed, nonce);
        let inputs = self.params.find_inputs(&prefix)?;
        debug!(nonce, "found equihash solution");
        Some(Solution::new(nonce, inputs, self.params.input_bits))
    }

    pub fn verify(&self, solution: &Solution) -> bool {
        self.params
            .verify(&self.seed, solution.nonce(), solution.inputs())
    }

    pub fn deserialize_solution(&self, bytes: &[u8]) -> Result<Solution, Error> {
        self.params.deserialize_solution(bytes)
    }
}

fn all_distinct(values: &[u32]) -> bool {
    let mut sorted = values.to_vec();
    sorted.sort_unstable();
    sorted.windows(2).all(|pair| pair[0] != pair[1])
}
