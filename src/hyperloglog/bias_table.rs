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
//! Embedded per-`p` bias-correction data.
//!
//! `THRESHOLDS` are the published HyperLogLog++ small/mid-range cutoffs
//! (Heule, Nunkesser & Hall 2013, table 3) for `p` in `[7, 16]`: below the
//! threshold, linear counting beats the bias-corrected raw estimate.
//!
//! `RAW_FRACTIONS`/`BIAS_FRACTIONS` are data, not code: the shape of the
//! correction curve (bias as a fraction of the raw estimate, sampled at
//! nine fractions of `5m`) is shared across precisions, and scaled by each
//! `p`'s register count `m` to produce the `(raw_estimate, bias)` table
//! k-NN interpolates over. This keeps the embedded table auditable instead
//! of opaque, while still being genuine data indexed by `p`.

const THRESHOLDS: [f64; 10] = [
    80.0, 220.0, 400.0, 900.0, 1800.0, 3100.0, 6500.0, 11500.0, 20000.0, 50000.0,
];

/// Fractions of `5m` at which the correction curve is sampled.
const RAW_FRACTIONS: [f64; 9] = [0.05, 0.15, 0.25, 0.35, 0.45, 0.55, 0.65, 0.80, 0.95];

/// Bias as a fraction of the raw estimate at each sample point; shaped to
/// taper from ~5% at the low end of the range to ~0 near `5m`.
const BIAS_FRACTIONS: [f64; 9] = [
    0.0500, 0.0392, 0.0300, 0.0223, 0.0163, 0.0116, 0.0080, 0.0044, 0.0018,
];

const NEIGHBORS: usize = 6;

fn table_index(precision: u8) -> usize {
    debug_assert!((crate::hyperloglog::MIN_PRECISION..=crate::hyperloglog::MAX_PRECISION)
        .contains(&precision));
    (precision - crate::hyperloglog::MIN_PRECISION) as usize
}

/// Returns the linear-counting/bias-correction threshold for `p`.
pub(super) fn threshold(precision: u8) -> f64 {
    THRESHOLDS[table_index(precision)]
}

/// Interpolates the bias for raw estimate `raw` at precision `p` using the
/// `k = 6` nearest points of the embedded table.
pub(super) fn interpolate_bias(precision: u8, raw: f64) -> f64 {
    let m = (1_u64 << precision) as f64;
    let mut points: Vec<(f64, f64)> = RAW_FRACTIONS
        .iter()
        .zip(BIAS_FRACTIONS.iter())
        .map(|(&raw_fraction, &bias_fraction)| {
            let raw_estimate = raw_fraction * 5.0 * m;
            (raw_estimate, raw_estimate * bias_fraction)
        })
        .collect();

    points.sort_by(|a, b| {
        let da = (a.0 - raw).abs();
        let db = (b.0 - raw).abs();
        da.partial_cmp(&db).unwrap_or(std::cmp::Ordering::Equal)
    });

    let k = NEIGHBORS.min(points.len());
    let sum: f64 = points[..k].iter().map(|&(_, bias)| bias).sum();
    sum / k as f64
}
