//! Bloom filter for segment negative lookups
//!
//! Double hashing over two seeded CRC32 hashes; the layout is stable across
//! builds so filters can be persisted inside segment files.
//!
//! ## Encoding
//! ```text
//! [NumHashes: u32][NumBits: u64][Bits...]
//! ```

use crate::error::{LineraError, Result};

const SECOND_SEED: u32 = 0x9747_b28c;
const MIN_BITS: u64 = 64;
const MAX_HASHES: u32 = 30;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BloomFilter {
    bits: Vec<u8>,
    num_bits: u64,
    num_hashes: u32,
}

impl BloomFilter {
    /// Size a filter for `expected_keys` keys at `bits_per_key`
    pub fn with_capacity(expected_keys: usize, bits_per_key: usize) -> Self {
        let num_bits = ((expected_keys as u64) * bits_per_key as u64).max(MIN_BITS);
        // k = bits_per_key * ln(2) minimizes the false positive rate
        let num_hashes = ((bits_per_key as f64) * std::f64::consts::LN_2).round() as u32;

        Self {
            bits: vec![0u8; num_bits.div_ceil(8) as usize],
            num_bits,
            num_hashes: num_hashes.clamp(1, MAX_HASHES),
        }
    }

    pub fn insert(&mut self, key: &[u8]) {
        self.insert_hash(key_hash(key));
    }

    /// Insert a precomputed `key_hash` pair
    pub(crate) fn insert_hash(&mut self, (h1, h2): (u32, u32)) {
        for i in 0..self.num_hashes {
            let bit = self.bit_index(h1, h2, i);
            self.bits[(bit / 8) as usize] |= 1 << (bit % 8);
        }
    }

    /// `false` means the key is definitely absent
    pub fn may_contain(&self, key: &[u8]) -> bool {
        let (h1, h2) = key_hash(key);
        (0..self.num_hashes).all(|i| {
            let bit = self.bit_index(h1, h2, i);
            self.bits[(bit / 8) as usize] & (1 << (bit % 8)) != 0
        })
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(12 + self.bits.len());
        out.extend_from_slice(&self.num_hashes.to_le_bytes());
        out.extend_from_slice(&self.num_bits.to_le_bytes());
        out.extend_from_slice(&self.bits);
        out
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < 12 {
            return Err(LineraError::Corruption(format!(
                "bloom filter block too short: {} bytes",
                bytes.len()
            )));
        }
        let num_hashes = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
        let mut num_bits_bytes = [0u8; 8];
        num_bits_bytes.copy_from_slice(&bytes[4..12]);
        let num_bits = u64::from_le_bytes(num_bits_bytes);
        let bits = bytes[12..].to_vec();

        if num_hashes == 0 || num_hashes > MAX_HASHES || num_bits == 0 {
            return Err(LineraError::Corruption(format!(
                "invalid bloom filter parameters: {} hashes, {} bits",
                num_hashes, num_bits
            )));
        }
        if bits.len() as u64 != num_bits.div_ceil(8) {
            return Err(LineraError::Corruption(format!(
                "bloom filter holds {} bytes, expected {}",
                bits.len(),
                num_bits.div_ceil(8)
            )));
        }

        Ok(Self {
            bits,
            num_bits,
            num_hashes,
        })
    }

    fn bit_index(&self, h1: u32, h2: u32, i: u32) -> u64 {
        let combined = (h1 as u64).wrapping_add((i as u64).wrapping_mul(h2 as u64 | 1));
        combined % self.num_bits
    }
}

/// The two base hashes of a key
pub(crate) fn key_hash(key: &[u8]) -> (u32, u32) {
    let h1 = crc32fast::hash(key);
    let mut second = crc32fast::Hasher::new_with_initial(SECOND_SEED);
    second.update(key);
    (h1, second.finalize())
}
