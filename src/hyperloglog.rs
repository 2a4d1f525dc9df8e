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
//! HyperLogLog++ cardinality estimator.
//!
//! Registers store a leading-zero-run rank in `[0, 64 - p + 1]`, merges
//! take the element-wise max, and `query` applies the standard HLL++
//! pipeline: raw harmonic-mean estimate, bias correction for the low/mid
//! range via k-NN interpolation over an embedded per-`p` table, and a
//! linear-counting fallback when enough registers are still at zero.

use std::collections::HashMap;

use crate::error::SketchError;
use crate::hash::fasthash64;

mod bias_table;

/// Smallest allowed precision (`p`): `2^7 = 128` registers.
pub const MIN_PRECISION: u8 = 7;
/// Largest allowed precision (`p`): `2^16 = 65536` registers.
pub const MAX_PRECISION: u8 = 16;

/// HyperLogLog++ cardinality estimator.
///
/// # Example
/// ```rust
/// use sketches::hyperloglog::HyperLogLog;
///
/// let mut hll = HyperLogLog::new(14, 0).unwrap();
/// for i in 0_u64..10_000 {
///     hll.add(&i.to_le_bytes());
/// }
/// let estimate = hll.query();
/// assert!((estimate - 10_000.0).abs() / 10_000.0 < 0.1);
/// ```
#[derive(Debug, Clone)]
pub struct HyperLogLog {
    precision: u8,
    seed: u64,
    registers: Vec<u8>,
    n_added: u64,
    n_records: u64,
}

impl HyperLogLog {
    /// Creates a sketch with precision `p` (`[7, 16]`) and hash `seed`.
    ///
    /// # Errors
    /// Returns [`SketchError::ConfigError`] when `precision` is out of range.
    pub fn new(precision: u8, seed: u64) -> Result<Self, SketchError> {
        if !(MIN_PRECISION..=MAX_PRECISION).contains(&precision) {
            return Err(SketchError::ConfigError("precision must be in [7, 16]"));
        }
        let m = 1_usize << precision;
        Ok(Self {
            precision,
            seed,
            registers: vec![0_u8; m],
            n_added: 0,
            n_records: 0,
        })
    }

    /// Returns the configured precision.
    pub fn precision(&self) -> u8 {
        self.precision
    }

    /// Returns the configured hash seed.
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Returns the number of registers (`2^precision`).
    pub fn register_count(&self) -> usize {
        self.registers.len()
    }

    /// Returns `true` if every register is still at zero.
    pub fn is_empty(&self) -> bool {
        self.registers.iter().all(|&r| r == 0)
    }

    /// Total number of `add` calls observed, including duplicates.
    pub fn n_added(&self) -> u64 {
        self.n_added
    }

    /// Caller-maintained record counter (see [`Self::add_record`]).
    pub fn n_records(&self) -> u64 {
        self.n_records
    }

    /// Increments the record counter by one.
    pub fn add_record(&mut self) {
        self.n_records += 1;
    }

    /// Increments the record counter by `n`.
    pub fn update_records(&mut self, n: u64) {
        self.n_records += n;
    }

    /// Adds one key to the sketch. HLL ignores multiplicities: it only
    /// tracks distinctness.
    pub fn add(&mut self, key: &[u8]) {
        let hash = fasthash64(key, self.seed);
        let p = self.precision as u32;
        let index = (hash >> (64 - p)) as usize;

        let guard = 1_u64 << (p - 1);
        let w = (hash << p) | guard;
        let rank = (w.leading_zeros() + 1) as u8;

        if rank > self.registers[index] {
            self.registers[index] = rank;
        }
        self.n_added += 1;
    }

    /// Adds every key yielded by `keys`.
    pub fn update<'a, I>(&mut self, keys: I)
    where
        I: IntoIterator<Item = &'a [u8]>,
    {
        for key in keys {
            self.add(key);
        }
    }

    /// Adds every key in `counts`. The HLL credits `n_added` once per
    /// distinct key regardless of the mapped count: HLL tracks
    /// distinctness, not multiplicity.
    pub fn update_counts(&mut self, counts: &HashMap<Vec<u8>, u64>) {
        for key in counts.keys() {
            self.add(key);
        }
    }

    fn alpha(&self) -> f64 {
        let m = self.register_count();
        match m {
            16 => 0.673,
            32 => 0.697,
            64 => 0.709,
            _ => 0.7213 / (1.0 + 1.079 / m as f64),
        }
    }

    /// Returns the estimated cardinality.
    pub fn query(&self) -> f64 {
        if self.is_empty() {
            return 0.0;
        }

        let m = self.register_count() as f64;
        let alpha = self.alpha();
        let harmonic_sum: f64 = self
            .registers
            .iter()
            .map(|&r| 2_f64.powi(-(r as i32)))
            .sum();
        let raw = alpha * m * m / harmonic_sum;

        let corrected = if raw <= 5.0 * m {
            (raw - bias_table::interpolate_bias(self.precision, raw)).max(0.0)
        } else {
            raw
        };

        let zero_registers = self.registers.iter().filter(|&&r| r == 0).count();
        if zero_registers > 0 {
            let linear = m * (m / zero_registers as f64).ln();
            if linear <= bias_table::threshold(self.precision) {
                return linear;
            }
        }
        corrected
    }

    /// Merges `other` into `self`. Registers become element-wise max;
    /// `n_added`/`n_records` sum.
    ///
    /// # Errors
    /// Returns [`SketchError::IncompatibleSketch`] if `precision` or `seed`
    /// differ.
    pub fn merge(&mut self, other: &Self) -> Result<(), SketchError> {
        if self.precision != other.precision {
            return Err(SketchError::IncompatibleSketch(
                "precision must match for merge",
            ));
        }
        if self.seed != other.seed {
            return Err(SketchError::IncompatibleSketch("seed must match for merge"));
        }

        for (left, right) in self.registers.iter_mut().zip(other.registers.iter()) {
            *left = (*left).max(*right);
        }
        self.n_added += other.n_added;
        self.n_records += other.n_records;
        Ok(())
    }

    pub(crate) fn registers(&self) -> &[u8] {
        &self.registers
    }

    pub(crate) fn set_n_added(&mut self, n: u64) {
        self.n_added = n;
    }

    pub(crate) fn from_parts(precision: u8, seed: u64, registers: Vec<u8>) -> Self {
        Self {
            precision,
            seed,
            registers,
            n_added: 0,
            n_records: 0,
        }
    }
}
