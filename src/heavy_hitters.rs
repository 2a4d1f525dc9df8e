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
//! Topkapi heavy-hitters sketch.
//!
//! Each of the `d x w` grid cells holds one `(key, length, counter)` slot
//! instead of a bare counter. A key competing for an occupied cell either
//! strengthens the resident key (same key) or weakens it (different key,
//! conservative decrement); a decrement that crosses zero evicts the
//! resident key and seeds the cell with the challenger. Querying scans
//! every cell (not just row 0) and keeps the max counter seen per key: a
//! deliberate accuracy/cost trade-off (Mandal et al. 2018).

use std::collections::HashMap;

use crate::error::SketchError;
use crate::hash::row_column;

/// Default number of rows.
pub const DEFAULT_DEPTH: usize = 4;

#[derive(Debug, Clone)]
struct Cell {
    key: Vec<u8>,
    len: u8,
    counter: u32,
}

impl Cell {
    fn empty(max_key_len: usize) -> Self {
        Self {
            key: vec![0_u8; max_key_len],
            len: 0,
            counter: 0,
        }
    }

    fn matches(&self, key: &[u8]) -> bool {
        self.counter > 0 && self.len as usize == key.len() && &self.key[..self.len as usize] == key
    }
}

/// Approximate top-k / phi-heavy-hitter tracker (Topkapi).
///
/// # Example
/// ```rust
/// use sketches::heavy_hitters::HeavyHitters;
///
/// let mut hh = HeavyHitters::new(64, 4, 16, None, 0).unwrap();
/// for _ in 0..3 {
///     hh.add(b"a", 1).unwrap();
/// }
/// hh.add(b"b", 1).unwrap();
/// let top = hh.query(1, 0.0);
/// assert_eq!(top[0].0, b"a");
/// ```
#[derive(Debug, Clone)]
pub struct HeavyHitters {
    width: usize,
    depth: usize,
    max_key_len: usize,
    phi: f64,
    seed: u64,
    cells: Vec<Cell>,
    n_added: u64,
    n_records: u64,
}

impl HeavyHitters {
    /// Builds a sketch. `phi` defaults to `1 / width` when `None`.
    ///
    /// # Errors
    /// Returns [`SketchError::ConfigError`] for zero dimensions, a
    /// `max_key_len` outside `[1, 255]` (cell lengths are stored as `u8`),
    /// or `phi` outside `(0, 1]`.
    pub fn new(
        width: usize,
        depth: usize,
        max_key_len: usize,
        phi: Option<f64>,
        seed: u64,
    ) -> Result<Self, SketchError> {
        if width == 0 {
            return Err(SketchError::ConfigError("width must be greater than zero"));
        }
        if depth == 0 {
            return Err(SketchError::ConfigError("depth must be greater than zero"));
        }
        if max_key_len == 0 || max_key_len > u8::MAX as usize {
            return Err(SketchError::ConfigError("max_key_len must be in [1, 255]"));
        }
        let phi = phi.unwrap_or(1.0 / width as f64);
        if !phi.is_finite() || phi <= 0.0 || phi > 1.0 {
            return Err(SketchError::ConfigError("phi must be in (0, 1]"));
        }
        let cells = width
            .checked_mul(depth)
            .ok_or(SketchError::ConfigError("width * depth overflows usize"))?;

        Ok(Self {
            width,
            depth,
            max_key_len,
            phi,
            seed,
            cells: (0..cells).map(|_| Cell::empty(max_key_len)).collect(),
            n_added: 0,
            n_records: 0,
        })
    }

    /// Returns the number of columns per row.
    pub fn width(&self) -> usize {
        self.width
    }

    /// Returns the number of rows.
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Returns the maximum key length a cell can hold.
    pub fn max_key_len(&self) -> usize {
        self.max_key_len
    }

    /// Returns the configured phi-heavy-hitter threshold fraction.
    pub fn phi(&self) -> f64 {
        self.phi
    }

    /// Returns the configured hash seed.
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Total logical count units added.
    pub fn n_added(&self) -> u64 {
        self.n_added
    }

    /// Caller-maintained record counter.
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

    /// Adds `count` occurrences of `key`.
    ///
    /// # Errors
    /// Returns [`SketchError::ConfigError`] when `key.len() > max_key_len`.
    pub fn add(&mut self, key: &[u8], count: u64) -> Result<(), SketchError> {
        if key.len() > self.max_key_len {
            return Err(SketchError::ConfigError(
                "key length exceeds max_key_len",
            ));
        }
        if count == 0 {
            return Ok(());
        }

        for row in 0..self.depth {
            let col = row_column(key, self.seed, row, self.width);
            let idx = row * self.width + col;
            let cell = &mut self.cells[idx];

            if cell.matches(key) {
                cell.counter = (cell.counter as u64).saturating_add(count).min(u32::MAX as u64) as u32;
                continue;
            }

            let previous = cell.counter as i64;
            let delta = previous - count as i64;
            if delta < 0 {
                cell.key[..key.len()].copy_from_slice(key);
                cell.len = key.len() as u8;
                cell.counter = (-delta) as u32;
            } else {
                cell.counter = delta as u32;
            }
        }

        self.n_added += count;
        Ok(())
    }

    /// Adds one occurrence of each key yielded by `keys`.
    pub fn update<'a, I>(&mut self, keys: I) -> Result<(), SketchError>
    where
        I: IntoIterator<Item = &'a [u8]>,
    {
        for key in keys {
            self.add(key, 1)?;
        }
        Ok(())
    }

    /// Adds every `(key, count)` pair in `counts`.
    pub fn update_counts(&mut self, counts: &HashMap<Vec<u8>, u64>) -> Result<(), SketchError> {
        for (key, &count) in counts {
            self.add(key, count)?;
        }
        Ok(())
    }

    /// Returns up to `k` candidates whose estimated count clears the
    /// phi-heavy-hitter cutoff, sorted by count descending (ties broken by
    /// key ascending).
    ///
    /// `threshold > 0.0` raises the cutoff to `max(threshold, phi * n_added)`;
    /// `threshold <= 0.0` uses `phi * n_added` alone.
    pub fn query(&self, k: usize, threshold: f64) -> Vec<(Vec<u8>, u64)> {
        let mut candidates: HashMap<Vec<u8>, u64> = HashMap::new();
        for cell in &self.cells {
            if cell.counter == 0 {
                continue;
            }
            let key = cell.key[..cell.len as usize].to_vec();
            let count = cell.counter as u64;
            candidates
                .entry(key)
                .and_modify(|existing| *existing = (*existing).max(count))
                .or_insert(count);
        }

        let phi_cutoff = self.phi * self.n_added as f64;
        let cutoff = if threshold > 0.0 {
            threshold.max(phi_cutoff)
        } else {
            phi_cutoff
        };

        let mut filtered: Vec<(Vec<u8>, u64)> = candidates
            .into_iter()
            .filter(|&(_, count)| count as f64 >= cutoff)
            .collect();
        filtered.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        filtered.truncate(k);
        filtered
    }

    /// Merges `other` into `self` using the Topkapi cell-merge rule:
    /// matching keys sum, mismatched keys keep the larger counter reduced
    /// by the smaller.
    ///
    /// # Errors
    /// Returns [`SketchError::IncompatibleSketch`] unless `width`, `depth`,
    /// `max_key_len`, `seed`, and `phi` all match.
    pub fn merge(&mut self, other: &Self) -> Result<(), SketchError> {
        if self.width != other.width || self.depth != other.depth {
            return Err(SketchError::IncompatibleSketch(
                "width/depth must match for merge",
            ));
        }
        if self.max_key_len != other.max_key_len {
            return Err(SketchError::IncompatibleSketch(
                "max_key_len must match for merge",
            ));
        }
        if self.seed != other.seed {
            return Err(SketchError::IncompatibleSketch("seed must match for merge"));
        }
        if (self.phi - other.phi).abs() > f64::EPSILON {
            return Err(SketchError::IncompatibleSketch("phi must match for merge"));
        }

        for (left, right) in self.cells.iter_mut().zip(other.cells.iter()) {
            let same_key = left.counter > 0
                && right.counter > 0
                && left.len == right.len
                && left.key[..left.len as usize] == right.key[..right.len as usize];

            if same_key {
                left.counter = (left.counter as u64)
                    .saturating_add(right.counter as u64)
                    .min(u32::MAX as u64) as u32;
            } else if right.counter > left.counter {
                left.key[..right.len as usize].copy_from_slice(&right.key[..right.len as usize]);
                left.len = right.len;
                left.counter = right.counter - left.counter;
            } else {
                left.counter -= right.counter;
            }
        }

        self.n_added += other.n_added;
        self.n_records += other.n_records;
        Ok(())
    }

    pub(crate) fn set_n_added(&mut self, n: u64) {
        self.n_added = n;
    }

    pub(crate) fn cell_count(&self) -> usize {
        self.cells.len()
    }

    pub(crate) fn cell_raw(&self, idx: usize) -> (&[u8], u8, u32) {
        let cell = &self.cells[idx];
        (&cell.key[..cell.len as usize], cell.len, cell.counter)
    }

    pub(crate) fn from_parts(
        width: usize,
        depth: usize,
        max_key_len: usize,
        phi: f64,
        seed: u64,
        raw_cells: Vec<(Vec<u8>, u8, u32)>,
    ) -> Self {
        let cells = raw_cells
            .into_iter()
            .map(|(key_bytes, len, counter)| {
                let mut key = vec![0_u8; max_key_len];
                key[..key_bytes.len()].copy_from_slice(&key_bytes);
                Cell { key, len, counter }
            })
            .collect();
        Self {
            width,
            depth,
            max_key_len,
            phi,
            seed,
            cells,
            n_added: 0,
            n_records: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constructor_rejects_invalid_parameters() {
        assert!(HeavyHitters::new(0, 4, 16, None, 0).is_err());
        assert!(HeavyHitters::new(64, 0, 16, None, 0).is_err());
        assert!(HeavyHitters::new(64, 4, 0, None, 0).is_err());
        assert!(HeavyHitters::new(64, 4, 16, Some(0.0), 0).is_err());
        assert!(HeavyHitters::new(64, 4, 16, Some(1.5), 0).is_err());
    }

    #[test]
    fn add_rejects_oversized_key() {
        let mut hh = HeavyHitters::new(64, 4, 4, None, 0).unwrap();
        assert!(hh.add(b"too-long-key", 1).is_err());
    }

    #[test]
    fn end_to_end_three_a_one_b() {
        let mut hh = HeavyHitters::new(64, 4, 16, None, 0).unwrap();
        for _ in 0..3 {
            hh.add(b"a", 1).unwrap();
        }
        hh.add(b"b", 1).unwrap();
        let top = hh.query(1, 0.0);
        assert_eq!(top, vec![(b"a".to_vec(), 3)]);
    }

    #[test]
    fn query_sorts_descending_with_lexicographic_tiebreak() {
        let mut hh = HeavyHitters::new(256, 4, 16, Some(0.01), 7).unwrap();
        hh.add(b"zzz", 5).unwrap();
        hh.add(b"aaa", 5).unwrap();
        hh.add(b"mmm", 10).unwrap();
        let top = hh.query(3, 0.0);
        assert_eq!(top[0].0, b"mmm");
        assert_eq!(top[1].0, b"aaa");
        assert_eq!(top[2].0, b"zzz");
    }

    #[test]
    fn merge_doubles_n_added_and_counts() {
        let mut a = HeavyHitters::new(256, 4, 16, Some(0.01), 3).unwrap();
        let mut b = HeavyHitters::new(256, 4, 16, Some(0.01), 3).unwrap();
        for _ in 0..40 {
            a.add(b"hot", 1).unwrap();
            b.add(b"hot", 1).unwrap();
        }
        a.merge(&b).unwrap();
        assert_eq!(a.n_added(), 80);
        let top = a.query(1, 0.0);
        assert_eq!(top[0], (b"hot".to_vec(), 80));
    }

    #[test]
    fn merge_rejects_mismatched_phi() {
        let mut a = HeavyHitters::new(64, 4, 16, Some(0.1), 0).unwrap();
        let b = HeavyHitters::new(64, 4, 16, Some(0.2), 0).unwrap();
        assert!(a.merge(&b).is_err());
    }

    #[test]
    fn zipf_like_stream_surfaces_true_heavy_hitter() {
        let mut hh = HeavyHitters::new(100, 4, 8, Some(0.01), 5).unwrap();
        // A skewed synthetic stream: one dominant key, a long tail of
        // singletons.
        for _ in 0..500 {
            hh.add(b"dominant", 1).unwrap();
        }
        for i in 0_u32..2_000 {
            hh.add(&i.to_le_bytes(), 1).unwrap();
        }
        let top = hh.query(1, 0.0);
        assert_eq!(top[0].0, b"dominant");
    }
}
