//! SpookyHash V2, Bob Jenkins' 128-bit non-cryptographic hash.
//!
//! Used by the scene pipeline as the content key of deduplicated geometry.
//! Several byte ranges are combined by *chaining*: the 64-bit hash of one
//! range becomes the seed of the next, so the final value depends on both
//! the content and the order of the ranges.
//!
//! # Example
//! ```
//! use spooky_hash::{hash64, ContentHasher};
//!
//! let positions = [0u8; 36];
//! let indices = [0u8, 1, 2];
//!
//! let chained = ContentHasher::new(7).chain(&positions).chain(&indices).finish();
//! assert_eq!(chained, hash64(&indices, hash64(&positions, 7)));
//! ```

#![cfg_attr(not(test), no_std)]

const SC_CONST: u64 = 0xdead_beef_dead_beef;
const SC_NUM_VARS: usize = 12;
const SC_BLOCK_SIZE: usize = SC_NUM_VARS * 8;
const SC_BUF_SIZE: usize = 2 * SC_BLOCK_SIZE;

const MIX_ROT: [u32; SC_NUM_VARS] = [11, 32, 43, 31, 17, 28, 39, 57, 55, 54, 22, 46];
const END_ROT: [u32; SC_NUM_VARS] = [44, 15, 34, 21, 38, 33, 10, 13, 38, 53, 42, 54];
const SHORT_MIX_ROT: [u32; 12] = [50, 52, 30, 41, 54, 48, 38, 37, 62, 34, 5, 36];
const SHORT_END_ROT: [u32; 11] = [15, 52, 26, 51, 28, 9, 47, 54, 32, 25, 63];

/// Block mixing for long messages.
#[inline(always)]
fn mix(data: &[u64; SC_NUM_VARS], s: &mut [u64; SC_NUM_VARS]) {
    for i in 0..SC_NUM_VARS {
        let next = (i + 1) % SC_NUM_VARS;
        let prev = (i + 11) % SC_NUM_VARS;
        s[i] = s[i].wrapping_add(data[i]);
        s[(i + 2) % SC_NUM_VARS] ^= s[(i + 10) % SC_NUM_VARS];
        s[prev] ^= s[i];
        s[i] = s[i].rotate_left(MIX_ROT[i]);
        s[prev] = s[prev].wrapping_add(s[next]);
    }
}

#[inline(always)]
fn end_partial(h: &mut [u64; SC_NUM_VARS]) {
    for k in 0..SC_NUM_VARS {
        let a = (k + 11) % SC_NUM_VARS;
        let b = (k + 1) % SC_NUM_VARS;
        h[a] = h[a].wrapping_add(h[b]);
        h[(k + 2) % SC_NUM_VARS] ^= h[a];
        h[b] = h[b].rotate_left(END_ROT[k]);
    }
}

#[inline(always)]
fn end(data: &[u64; SC_NUM_VARS], h: &mut [u64; SC_NUM_VARS]) {
    for (hi, di) in h.iter_mut().zip(data) {
        *hi = hi.wrapping_add(*di);
    }
    end_partial(h);
    end_partial(h);
    end_partial(h);
}

/// Four-lane mixing for short messages; lanes are `[a, b, c, d]`.
#[inline(always)]
fn short_mix(v: &mut [u64; 4]) {
    for (j, r) in SHORT_MIX_ROT.iter().enumerate() {
        let x = (2 + j) % 4;
        let y = (x + 1) % 4;
        let z = (x + 2) % 4;
        v[x] = v[x].rotate_left(*r).wrapping_add(v[y]);
        v[z] ^= v[x];
    }
}

#[inline(always)]
fn short_end(v: &mut [u64; 4]) {
    for (j, r) in SHORT_END_ROT.iter().enumerate() {
        let t = (3 + j) % 4;
        let s = (t + 3) % 4;
        v[t] ^= v[s];
        v[s] = v[s].rotate_left(*r);
        v[t] = v[t].wrapping_add(v[s]);
    }
}

/// Little-endian read of up to eight bytes, zero-extended.
#[inline(always)]
fn read_le(bytes: &[u8]) -> u64 {
    let mut buf = [0u8; 8];
    let len = bytes.len().min(8);
    buf[..len].copy_from_slice(&bytes[..len]);
    u64::from_le_bytes(buf)
}

#[inline(always)]
fn read_block(bytes: &[u8]) -> [u64; SC_NUM_VARS] {
    let mut block = [0u64; SC_NUM_VARS];
    for (i, word) in block.iter_mut().enumerate() {
        *word = read_le(&bytes[i * 8..]);
    }
    block
}

fn hash_short(message: &[u8], seed1: u64, seed2: u64) -> (u64, u64) {
    let length = message.len();
    let mut v = [seed1, seed2, SC_CONST, SC_CONST];
    let mut offset = 0;

    if length > 15 {
        let whole = (length / 32) * 32;
        while offset < whole {
            v[2] = v[2].wrapping_add(read_le(&message[offset..]));
            v[3] = v[3].wrapping_add(read_le(&message[offset + 8..]));
            short_mix(&mut v);
            v[0] = v[0].wrapping_add(read_le(&message[offset + 16..]));
            v[1] = v[1].wrapping_add(read_le(&message[offset + 24..]));
            offset += 32;
        }
        if length - offset >= 16 {
            v[2] = v[2].wrapping_add(read_le(&message[offset..]));
            v[3] = v[3].wrapping_add(read_le(&message[offset + 8..]));
            short_mix(&mut v);
            offset += 16;
        }
    }

    // Last 0..15 bytes: low eight into c, the rest into d, length in d's top byte.
    v[3] = v[3].wrapping_add((length as u64) << 56);
    let tail = &message[offset..];
    if tail.is_empty() {
        v[2] = v[2].wrapping_add(SC_CONST);
        v[3] = v[3].wrapping_add(SC_CONST);
    } else {
        v[2] = v[2].wrapping_add(read_le(tail));
        if tail.len() > 8 {
            v[3] = v[3].wrapping_add(read_le(&tail[8..]));
        }
    }

    short_end(&mut v);
    (v[0], v[1])
}

/// One-shot 128-bit hash.
pub fn hash128(message: &[u8], seed1: u64, seed2: u64) -> (u64, u64) {
    if message.len() < SC_BUF_SIZE {
        return hash_short(message, seed1, seed2);
    }

    let mut h = [
        seed1, seed2, SC_CONST, seed1, seed2, SC_CONST, seed1, seed2, SC_CONST, seed1, seed2,
        SC_CONST,
    ];

    let blocks = message.len() / SC_BLOCK_SIZE;
    for i in 0..blocks {
        mix(&read_block(&message[i * SC_BLOCK_SIZE..]), &mut h);
    }

    let processed = blocks * SC_BLOCK_SIZE;
    let remainder = message.len() - processed;
    let mut last = [0u8; SC_BLOCK_SIZE];
    last[..remainder].copy_from_slice(&message[processed..]);
    last[SC_BLOCK_SIZE - 1] = remainder as u8;
    end(&read_block(&last), &mut h);

    (h[0], h[1])
}

/// One-shot 64-bit hash (first half of [`hash128`] with both seeds equal).
pub fn hash64(message: &[u8], seed: u64) -> u64 {
    hash128(message, seed, seed).0
}

/// Order-sensitive hash over a sequence of byte ranges.
///
/// Each [`chain`](Self::chain) call rehashes the new range seeded by the
/// running value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContentHasher {
    state: u64,
}

impl ContentHasher {
    /// Start a chain from `seed`.
    pub const fn new(seed: u64) -> Self {
        Self { state: seed }
    }

    /// Fold another byte range into the chain.
    #[must_use]
    pub fn chain(mut self, bytes: &[u8]) -> Self {
        self.state = hash64(bytes, self.state);
        self
    }

    /// Current chained value.
    pub const fn finish(&self) -> u64 {
        self.state
    }
}

impl core::hash::Hasher for ContentHasher {
    fn finish(&self) -> u64 {
        self.state
    }

    fn write(&mut self, bytes: &[u8]) {
        self.state = hash64(bytes, self.state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_is_nonzero() {
        let (h1, h2) = hash128(b"", 0, 0);
        assert_ne!(h1, 0);
        assert_ne!(h2, 0);
    }

    #[test]
    fn test_every_length_differs() {
        // Covers all tail sizes of the short path plus the long path.
        let mut seen = std::collections::HashSet::new();
        for len in 0..400 {
            let data: Vec<u8> = (0..len).map(|i| i as u8).collect();
            assert!(seen.insert(hash64(&data, 0)), "collision at len={len}");
        }
    }

    #[test]
    fn test_seed_changes_hash() {
        let data = b"triangle soup";
        assert_ne!(hash64(data, 0), hash64(data, 1));
        assert_eq!(hash64(data, 42), hash64(data, 42));
    }

    #[test]
    fn test_chain_is_order_sensitive() {
        let a = [1u8; 24];
        let b = [2u8; 24];
        let ab = ContentHasher::new(0).chain(&a).chain(&b).finish();
        let ba = ContentHasher::new(0).chain(&b).chain(&a).finish();
        assert_ne!(ab, ba);
        assert_eq!(ab, hash64(&b, hash64(&a, 0)));
    }

    #[test]
    fn test_hasher_trait_matches_chain() {
        use core::hash::Hasher;
        let mut h = ContentHasher::new(9);
        h.write(b"positions");
        h.write(b"indices");
        let chained = ContentHasher::new(9).chain(b"positions").chain(b"indices");
        assert_eq!(Hasher::finish(&h), chained.finish());
    }

    /// Bob Jenkins' reference message: byte `i` is `i + 128`.
    fn reference_message(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i + 128) as u8).collect()
    }

    #[test]
    fn test_reference_hash32_values() {
        // Low 32 bits of hash128 with zero seeds, from the V2 test suite.
        let expected: [u32; 12] = [
            0x6bf5_0919, 0x70de_1d26, 0xa2b3_7298, 0x35bc_5fbf, 0x8223_b279, 0x5bcb_315e,
            0x53fe_88a1, 0xf9f1_a233, 0xee19_3982, 0x54f8_6f29, 0xc877_2d36, 0x9ed6_0886,
        ];
        for (len, want) in expected.iter().enumerate() {
            let (h1, _) = hash128(&reference_message(len), 0, 0);
            assert_eq!(h1 as u32, *want, "len={len}");
        }
    }

    #[test]
    fn test_hash64_known_answers() {
        let cases: [(usize, u64); 8] = [
            (0, 0x2327_06fc_6bf5_0919),
            (5, 0x5d7d_79cd_5bcb_315e),
            (16, 0x8d47_89b8_f274_736c),
            (40, 0xe178_3762_9856_c65f),
            (191, 0x5706_7b56_e13d_9e19),
            // Long path from here on.
            (192, 0x246e_d6ee_77e0_12bd),
            (300, 0x5442_ec15_37e2_b1da),
            (512, 0x51de_ccb3_df84_99ae),
        ];
        for (len, want) in cases {
            assert_eq!(hash64(&reference_message(len), 0), want, "len={len}");
        }
        assert_eq!(hash64(b"hello", 0), 0x3768_826a_d382_e6ca);
        assert_eq!(hash64(b"hello", 42), 0xb8d5_4b6b_b86a_856e);
        assert_eq!(hash64(&[0xab; 1000], 3), 0xe0ee_4a0d_cce0_d6b6);
    }

    #[test]
    fn test_single_byte_flip_in_long_message() {
        let mut data = vec![0xabu8; 1000];
        let before = hash64(&data, 3);
        data[517] ^= 1;
        assert_ne!(before, hash64(&data, 3));
    }
}
