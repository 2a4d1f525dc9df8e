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
//! Seedable PRNG stream for the Count-Min Sketch log-counter update rule.
//!
//! The log-variant conservative update needs randomness (§4.3: "with
//! probability `x^-(c - num_reserved)`, increment"), but that randomness
//! must be reproducible for a fixed seed and input order, and splittable
//! per parallel worker. A thread-local or ambient RNG can't give either
//! property, so the stream is explicit: one [`LogCounterRng`] per sketch,
//! seeded from the sketch's base seed, with a documented derivation for
//! per-worker streams.

use rand_chacha::ChaCha8Rng;
use rand_core::{RngCore, SeedableRng};

use crate::hash::splitmix64;

/// Explicit, seedable, splittable PRNG stream backing CMS log-counter
/// updates.
#[derive(Debug, Clone)]
pub struct LogCounterRng {
    inner: ChaCha8Rng,
}

impl LogCounterRng {
    /// Creates a stream seeded deterministically from a sketch's base seed.
    pub fn from_seed(seed: u64) -> Self {
        Self {
            inner: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    /// Derives the per-worker stream seed for `parallel_add`, per §5:
    /// "per-worker PRNGs deterministically from `(base_seed, worker_id)`".
    pub fn worker_seed(base_seed: u64, worker_id: usize) -> u64 {
        splitmix64(base_seed ^ splitmix64(worker_id as u64 ^ 0x5745_4B52_4F52_4B21))
    }

    /// Returns `true` with probability `p`, consuming one `u64` of stream.
    ///
    /// `p` is clamped to `[0, 1]`; `p <= 0.0` always returns `false` and
    /// `p >= 1.0` always returns `true` without consuming randomness
    /// unevenly across calls.
    pub fn sample_bernoulli(&mut self, p: f64) -> bool {
        if p <= 0.0 {
            return false;
        }
        if p >= 1.0 {
            return true;
        }
        // next_u64 as a uniform fraction of [0, 1).
        let draw = (self.inner.next_u64() >> 11) as f64 * (1.0 / (1u64 << 53) as f64);
        draw < p
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_seed_reproduces_same_sequence() {
        let mut a = LogCounterRng::from_seed(7);
        let mut b = LogCounterRng::from_seed(7);
        let draws_a: Vec<bool> = (0..100).map(|_| a.sample_bernoulli(0.5)).collect();
        let draws_b: Vec<bool> = (0..100).map(|_| b.sample_bernoulli(0.5)).collect();
        assert_eq!(draws_a, draws_b);
    }

    #[test]
    fn different_seeds_diverge() {
        let mut a = LogCounterRng::from_seed(1);
        let mut b = LogCounterRng::from_seed(2);
        let draws_a: Vec<bool> = (0..200).map(|_| a.sample_bernoulli(0.5)).collect();
        let draws_b: Vec<bool> = (0..200).map(|_| b.sample_bernoulli(0.5)).collect();
        assert_ne!(draws_a, draws_b);
    }

    #[test]
    fn boundary_probabilities_are_exact() {
        let mut rng = LogCounterRng::from_seed(42);
        for _ in 0..50 {
            assert!(!rng.sample_bernoulli(0.0));
            assert!(rng.sample_bernoulli(1.0));
        }
    }

    #[test]
    fn worker_seeds_are_distinct() {
        let seeds: Vec<u64> = (0..16)
            .map(|id| LogCounterRng::worker_seed(123, id))
            .collect();
        let mut unique = seeds.clone();
        unique.sort_unstable();
        unique.dedup();
        assert_eq!(seeds.len(), unique.len());
    }
}
