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
//! Error taxonomy shared by every sketch in this crate.

/// Errors returned by sketch constructors, merges, and persistence.
///
/// `SaturationNotice` from the design is deliberately absent here: a
/// saturated counter is not a failure, so it is surfaced as a sticky flag
/// on the sketch instead (see [`crate::cms::Cms::is_saturated`]).
#[derive(Debug, thiserror::Error)]
pub enum SketchError {
    /// Raised by a constructor when a parameter is out of range.
    #[error("invalid configuration: {0}")]
    ConfigError(&'static str),

    /// Raised by `merge` when the two sketches' configurations differ.
    #[error("incompatible sketch: {0}")]
    IncompatibleSketch(&'static str),

    /// Raised by `load` when a binary container is malformed.
    #[error("malformed sketch container: {0}")]
    FormatError(String),

    /// Propagated from the underlying file I/O in `save`/`load`.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Raised by `parallel_add` when a worker's callback fails.
    #[error("worker failed: {0}")]
    WorkerFailure(String),
}
