use crate::error::Error;
use crate::numeric::{unsigned_compare, unsigned_shr_u64};
use byteorder::{BigEndian, ByteOrder};
use std::cmp::Ordering;
use std::fmt;

/// A nonce together with the `2^k` input indices that collide under it.
///
/// Produced by the solver or by decoding; immutable afterwards.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Solution {
    nonce: u64,
    inputs: Vec<u32>,
    input_bits: u32,
}

impl Solution {
    pub(crate) fn new(nonce: u64, inputs: Vec<u32>, input_bits: u32) -> Self {
        Solution {
            nonce,
            inputs,
            input_bits,
        }
    }

    pub fn nonce(&self) -> u64 {
        self.nonce
    }

    pub fn inputs(&self) -> &[u32] {
        &self.inputs
    }

    /// Bit-packed big-endian encoding: the nonce as two 32-bit words, then each
    /// input in exactly `input_bits` bits, MSB first, with zero trailing bits.
    pub fn serialize(&self) -> Vec<u8> {
        let bit_len = 64 + self.inputs.len() * self.input_bits as usize;
        let byte_len = (bit_len + 7) / 8;
        let mut padded = vec![0u8; (byte_len + 3) & !3];
        let mut words = padded.chunks_exact_mut(4);

        let mut put = |word: u32| {
            if let Some(chunk) = words.next() {
                BigEndian::write_u32(chunk, word);
            }
        };
        put((self.nonce >> 32) as u32);
        put(self.nonce as u32);

        let mask = (1u64 << self.input_bits) - 1;
        let mut off = 64u32;
        let mut buf = 0u64;
        for &input in &self.inputs {
            off -= self.input_bits;
            buf |= (u64::from(input) & mask) << off;
            if off <= 32 {
                put((buf >> 32) as u32);
                buf <<= 32;
                off += 32;
            }
        }
        if off < 64 {
            put((buf >> 32) as u32);
        }

        padded.truncate(byte_len);
        padded
    }

    /// Inverse of [`Solution::serialize`] for the given input width and count.
    pub(crate) fn deserialize(
        bytes: &[u8],
        input_num: usize,
        input_bits: u32,
    ) -> Result<Self, Error> {
        let bit_len = 64 + input_num * input_bits as usize;
        let byte_len = (bit_len + 7) / 8;
        if bytes.len() != byte_len {
            return Err(Error::InvalidArgument(format!(
                "incorrect solution byte length: expected {byte_len} but got {}",
                bytes.len()
            )));
        }
        let padding_bits = byte_len * 8 - bit_len;
        if padding_bits > 0 && bytes[byte_len - 1] & ((1u8 << padding_bits) - 1) != 0 {
            return Err(Error::Format(
                "nonzero padding bits at end of solution".into(),
            ));
        }

        let mut padded = bytes.to_vec();
        padded.resize((byte_len + 3) & !3, 0);
        let mut words = padded.chunks_exact(4).map(BigEndian::read_u32);
        let mut next_word = || words.next().unwrap_or(0);

        let nonce = (u64::from(next_word()) << 32) | u64::from(next_word());
        let mask = (1u32 << input_bits) - 1;
        let mut inputs = Vec::with_capacity(input_num);
        let mut off = 0u32;
        let mut buf = 0u64;
        for _ in 0..input_num {
            if off < input_bits {
                buf = (buf << 32) | u64::from(next_word());
                off += 32;
            }
            off -= input_bits;
            inputs.push(unsigned_shr_u64(buf, off) as u32 & mask);
        }

        Ok(Solution::new(nonce, inputs, input_bits))
    }
}

impl fmt::Debug for Solution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Solution")
            .field("nonce", &self.nonce)
            .field("inputs", &self.inputs)
            .finish()
    }
}

/// Canonical order of a solution's inputs.
///
/// Inputs are pushed left to right as single-element runs; whenever the two
/// topmost runs have equal length they are merged, the unsigned-lexicographically
/// smaller run first. This nests sibling subtrees of the collision tree in a
/// fixed order, which verification relies on.
pub fn sort_inputs(inputs: &[u32]) -> Vec<u32> {
    let mut stack: Vec<Vec<u32>> = Vec::new();
    for &input in inputs {
        let mut top = vec![input];
        while let Some(prev) = stack.pop() {
            if prev.len() != top.len() {
                stack.push(prev);
                break;
            }
            top = if unsigned_compare(&prev, &top) == Ordering::Less {
                concat(prev, top)
            } else {
                concat(top, prev)
            };
        }
        stack.push(top);
    }
    stack.pop().unwrap_or_default()
}

fn concat(mut first: Vec<u32>, second: Vec<u32>) -> Vec<u32> {
    first.extend(second);
    first
}
