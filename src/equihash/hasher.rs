use blake2b_simd::{Params as Blake2bParams, State as Blake2bState};

const DIGEST_LENGTH: usize = 32;

/// BLAKE2b-256 state that has already absorbed `seed || nonce`.
///
/// Every input hash of one puzzle attempt shares this prefix, so it is absorbed
/// once and the state is cloned per input.
#[derive(Clone)]
pub(crate) struct HashPrefix {
    state: Blake2bState,
}

impl HashPrefix {
    pub(crate) fn new(seed: &[u8], nonce: u64) -> Self {
        let mut state = Blake2bParams::new().hash_length(DIGEST_LENGTH).to_state();
        state.update(seed);
        state.update(&nonce.to_be_bytes());
        HashPrefix { state }
    }

    /// Hash the big-endian encoding of `inputs` under this prefix, returning the
    /// digest as eight big-endian words.
    pub(crate) fn hash_inputs(&self, inputs: &[u32]) -> [u32; 8] {
        let mut state = self.state.clone();
        for input in inputs {
            state.update(&input.to_be_bytes());
        }
        let digest = state.finalize();
        let mut words = [0u32; 8];
        for (word, chunk) in words.iter_mut().zip(digest.as_bytes().chunks_exact(4)) {
            *word = u32::from_be_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
        }
        words
    }
}
