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
//! Fixed-memory probabilistic sketches for unbounded byte-key streams.
//!
//! Three complementary summaries share one hashing and persistence
//! substrate:
//! - [`hyperloglog::HyperLogLog`] — cardinality estimation.
//! - [`cms::Cms`] — frequency estimation (linear and approximate
//!   log-counter variants).
//! - [`heavy_hitters::HeavyHitters`] — top-k / phi-heavy-hitter tracking
//!   (Topkapi).
//!
//! [`parallel::parallel_add`] builds any subset of the three from a
//! sharded stream across OS-thread workers, reducing the per-worker
//! results with a pairwise tournament merge. [`persist`] adds binary
//! save/load for each sketch type. [`hash`] carries the non-cryptographic
//! hash primitives (FastHash64/32, MurmurHash3-x86-32) every sketch is
//! built on.

pub mod cms;
pub mod error;
pub mod hash;
pub mod heavy_hitters;
pub mod hyperloglog;
pub mod parallel;
pub mod persist;
pub(crate) mod rng;

pub use error::SketchError;
