// MIT License
//
// Copyright (c) 2026 Raja Lehtihet & Wael El Oraiby
//
// Permission is hereby granted, free of charge, to any person obtaining a copy
// of this software and associated documentation files (the "Software"), to deal
// in the Software without restriction, including without limitation the rights
// to use, copy, modify, merge, publish, distribute, sublicense, and/or sell
// copies of the Software, and to permit persons to whom the Software is
// furnished to do so, subject to the following conditions:
//
// The above copyright notice and this permission notice shall be included in all
// copies or substantial portions of the Software.
//
// THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND, EXPRESS OR
// IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY,
// FITNESS FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE
// AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER
// LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING FROM,
// OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER DEALINGS IN THE
// SOFTWARE.
//
//! Non-cryptographic hash primitives.
//!
//! Every sketch in this crate is built on [`fasthash64`]; [`fasthash32`] is
//! a 32-bit fold of it, and [`murmurhash3_x86_32`] is carried for
//! cross-language parity but not used by any sketch. Bit-exact reproduction
//! of the reference algorithms matters here: on-disk containers and
//! cross-language callers depend on these functions producing the same
//! output for the same `(bytes, seed)` everywhere.

const FASTHASH_M: u64 = 0x8803_55f2_1e6d_1965;

/// Mixes a 64-bit value (xor-shift-multiply, the fasthash compression step).
#[inline]
fn mix(mut h: u64) -> u64 {
    h ^= h >> 23;
    h = h.wrapping_mul(0x2127_599b_f432_5c37);
    h ^= h >> 47;
    h
}

/// FastHash64: the primary hash used to derive every row/column index in
/// this crate.
///
/// Consumes `bytes` as little-endian 8-byte words, folds a ≤7-byte tail by
/// byte-appending into a 64-bit accumulator, and finishes with one more
/// [`mix`].
pub fn fasthash64(bytes: &[u8], seed: u64) -> u64 {
    let mut h = seed ^ (bytes.len() as u64).wrapping_mul(FASTHASH_M);

    let chunks = bytes.chunks_exact(8);
    let tail = chunks.remainder();
    for chunk in chunks {
        let v = u64::from_le_bytes(chunk.try_into().expect("chunk is 8 bytes"));
        h ^= mix(v);
        h = h.wrapping_mul(FASTHASH_M);
    }

    if !tail.is_empty() {
        let mut v: u64 = 0;
        for (i, &byte) in tail.iter().enumerate() {
            v ^= (byte as u64) << (8 * i);
        }
        h ^= mix(v);
        h = h.wrapping_mul(FASTHASH_M);
    }

    mix(h)
}

/// FastHash32: a 32-bit fold of [`fasthash64`].
///
/// Folds the high and low 32-bit halves of the 64-bit hash together so the
/// result still carries entropy from the whole hash, not just one half.
pub fn fasthash32(bytes: &[u8], seed: u64) -> u32 {
    let h = fasthash64(bytes, seed);
    let folded = (h >> 32).wrapping_add(h & 0xFFFF_FFFF);
    folded as u32
}

const MURMUR_C1: u32 = 0xcc9e_2d51;
const MURMUR_C2: u32 = 0x1b87_3593;

#[inline]
fn fmix32(mut h: u32) -> u32 {
    h ^= h >> 16;
    h = h.wrapping_mul(0x85eb_ca6b);
    h ^= h >> 13;
    h = h.wrapping_mul(0xc2b2_ae35);
    h ^= h >> 16;
    h
}

/// MurmurHash3 (x86, 32-bit variant). Provided for cross-language parity;
/// no sketch in this crate uses it for indexing.
pub fn murmurhash3_x86_32(bytes: &[u8], seed: u64) -> u32 {
    let seed = seed as u32;
    let mut h1 = seed;

    let chunks = bytes.chunks_exact(4);
    let tail = chunks.remainder();
    for chunk in chunks {
        let mut k1 = u32::from_le_bytes(chunk.try_into().expect("chunk is 4 bytes"));
        k1 = k1.wrapping_mul(MURMUR_C1);
        k1 = k1.rotate_left(15);
        k1 = k1.wrapping_mul(MURMUR_C2);

        h1 ^= k1;
        h1 = h1.rotate_left(13);
        h1 = h1.wrapping_mul(5).wrapping_add(0xe654_6b64);
    }

    let mut k1: u32 = 0;
    for (i, &byte) in tail.iter().enumerate() {
        k1 ^= (byte as u32) << (8 * i);
    }
    if !tail.is_empty() {
        k1 = k1.wrapping_mul(MURMUR_C1);
        k1 = k1.rotate_left(15);
        k1 = k1.wrapping_mul(MURMUR_C2);
        h1 ^= k1;
    }

    h1 ^= bytes.len() as u32;
    fmix32(h1)
}

/// SplitMix64, used to derive independent per-row/per-worker seeds from a
/// single base seed.
pub(crate) fn splitmix64(mut x: u64) -> u64 {
    x = x.wrapping_add(0x9E37_79B9_7F4A_7C15);
    x = (x ^ (x >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    x = (x ^ (x >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    x ^ (x >> 31)
}

/// Derives the FastHash64 seed for CMS/HH row `i`, per the §6.3 wire
/// contract: row seeds are `base_seed + i`.
pub(crate) fn row_seed(base_seed: u64, row: usize) -> u64 {
    base_seed.wrapping_add(row as u64)
}

/// Hashes `key` with the row `i` seed and reduces it to a column in `[0, width)`.
pub(crate) fn row_column(key: &[u8], base_seed: u64, row: usize, width: usize) -> usize {
    (fasthash64(key, row_seed(base_seed, row)) as usize) % width
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fasthash64_is_deterministic() {
        assert_eq!(fasthash64(b"one_key", 0), fasthash64(b"one_key", 0));
        assert_ne!(fasthash64(b"one_key", 0), fasthash64(b"one_key", 1));
    }

    #[test]
    fn fasthash64_empty_input_is_seed_dependent() {
        assert_ne!(fasthash64(b"", 0), fasthash64(b"", 1));
    }

    #[test]
    fn fasthash32_folds_fasthash64() {
        let h64 = fasthash64(b"one_key", 1);
        let expected = ((h64 >> 32).wrapping_add(h64 & 0xFFFF_FFFF)) as u32;
        assert_eq!(fasthash32(b"one_key", 1), expected);
    }

    #[test]
    fn fasthash_handles_all_tail_lengths() {
        for len in 0..=16 {
            let bytes: Vec<u8> = (0..len as u8).collect();
            // Must not panic for any tail remainder length, and must be stable.
            let a = fasthash64(&bytes, 42);
            let b = fasthash64(&bytes, 42);
            assert_eq!(a, b);
        }
    }

    #[test]
    fn murmurhash3_is_deterministic_and_seed_sensitive() {
        assert_eq!(
            murmurhash3_x86_32(b"one_key", 0),
            murmurhash3_x86_32(b"one_key", 0)
        );
        assert_ne!(
            murmurhash3_x86_32(b"one_key", 0),
            murmurhash3_x86_32(b"one_key", 1)
        );
    }

    #[test]
    fn murmurhash3_handles_all_tail_lengths() {
        for len in 0..=16 {
            let bytes: Vec<u8> = (0..len as u8).collect();
            let a = murmurhash3_x86_32(&bytes, 7);
            let b = murmurhash3_x86_32(&bytes, 7);
            assert_eq!(a, b);
        }
    }

    #[test]
    fn row_seeds_are_distinct_across_rows() {
        let seeds: Vec<u64> = (0..8).map(|i| row_seed(99, i)).collect();
        let mut unique = seeds.clone();
        unique.sort_unstable();
        unique.dedup();
        assert_eq!(seeds.len(), unique.len());
    }
}
