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

//! Cross-module end-to-end scenarios that exercise more than one sketch or
//! the parallel engine together, rather than a single type in isolation.

use std::collections::HashMap;

use sketches::cms::{Cms, CmsKind};
use sketches::heavy_hitters::HeavyHitters;
use sketches::hyperloglog::HyperLogLog;
use sketches::parallel::{
    parallel_add, CallbackMode, CmsArgs, HhArgs, HllArgs, SketchRequest, WorkerSketches,
};
use sketches::SketchError;

fn zipf1_stream(n: usize, vocab: usize) -> Vec<Vec<u8>> {
    // Rank-1/rank harmonic weighting over a fixed vocabulary, deterministic
    // so the top-k assertions below never flake.
    let harmonic: f64 = (1..=vocab).map(|r| 1.0 / r as f64).sum();
    let mut stream = Vec::with_capacity(n);
    let mut remaining = n;
    for rank in 1..=vocab {
        let weight = (1.0 / rank as f64) / harmonic;
        let count = ((weight * n as f64).round() as usize).min(remaining);
        for _ in 0..count {
            stream.push(format!("key-{rank}").into_bytes());
        }
        remaining -= count;
        if remaining == 0 {
            break;
        }
    }
    stream
}

#[test]
fn ten_thousand_distinct_keys_across_three_sketches() {
    let mut hll = HyperLogLog::new(14, 0xA5A5).unwrap();
    let mut cms = Cms::new(CmsKind::Linear, 1 << 14, 4, 0xA5A5).unwrap();
    let mut hh = HeavyHitters::new(1024, 4, 4, Some(0.01), 0xA5A5).unwrap();

    for i in 0u32..10_000 {
        let key = i.to_le_bytes();
        hll.add(&key);
        cms.add(&key, 1);
        hh.add(&key, 1).unwrap();
    }

    let estimate = hll.query();
    let error = (estimate - 10_000.0).abs() / 10_000.0;
    assert!(error < 0.05, "HLL estimate {estimate} too far from 10000");

    let any_key = 42u32.to_le_bytes();
    assert_eq!(cms.query(&any_key), 1);

    // phi = 0.01 over 10k single-count keys puts every key below the
    // cutoff, so either the empty result or a handful of count-1 survivors
    // from hash collisions is acceptable.
    for (_, count) in hh.query(10, 0.0) {
        assert_eq!(count, 1);
    }
}

#[test]
fn parallel_ingest_matches_single_thread_top_five() {
    let shards: Vec<Vec<u8>> = (0..4)
        .flat_map(|_| zipf1_stream(100_000, 10_000))
        .collect();

    let mut single = HeavyHitters::new(100, 4, 16, Some(0.01), 7).unwrap();
    for key in &shards {
        single.add(key, 1).unwrap();
    }
    let single_top: Vec<Vec<u8>> = single
        .query(5, 0.0)
        .into_iter()
        .map(|(k, _)| k)
        .collect();

    let process: &(dyn Fn(&Vec<u8>, &mut WorkerSketches) -> Result<u64, SketchError> + Sync) =
        &|item, sketches| {
            if let Some(hh) = &mut sketches.hh {
                hh.add(item, 1)?;
            }
            Ok(1)
        };

    let request = SketchRequest {
        hll: None,
        cms: None,
        hh: Some(HhArgs {
            width: 100,
            depth: 4,
            max_key_len: 16,
            phi: Some(0.01),
            seed: 7,
        }),
    };

    let merged = parallel_add(shards, 4, request, CallbackMode::ReturnsCount(process)).unwrap();
    let hh = merged.hh.expect("heavy-hitters requested");
    let parallel_top: Vec<Vec<u8>> = hh.query(5, 0.0).into_iter().map(|(k, _)| k).collect();

    let overlap = single_top
        .iter()
        .filter(|k| parallel_top.contains(k))
        .count();
    assert!(
        overlap >= 4,
        "parallel top-5 {parallel_top:?} diverges too far from single-thread top-5 {single_top:?}"
    );
}

#[test]
fn parallel_engine_sums_n_added_exactly() {
    let items: Vec<Vec<u8>> = (0..1_000u32).map(|i| i.to_le_bytes().to_vec()).collect();

    let process: &(dyn Fn(&Vec<u8>, &mut WorkerSketches) -> Result<u64, SketchError> + Sync) =
        &|item, sketches| {
            if let Some(hll) = &mut sketches.hll {
                hll.add(item);
            }
            if let Some(cms) = &mut sketches.cms {
                cms.add(item, 1);
            }
            Ok(1)
        };

    let request = SketchRequest {
        hll: Some(HllArgs {
            precision: 10,
            seed: 1,
        }),
        cms: Some(CmsArgs {
            kind: CmsKind::Linear,
            width: 256,
            depth: 3,
            seed: 1,
            max_count: None,
            num_reserved: None,
        }),
        hh: None,
    };

    let merged = parallel_add(items, 4, request, CallbackMode::ReturnsCount(process)).unwrap();
    assert_eq!(merged.hll.unwrap().n_added(), 1_000);
    assert_eq!(merged.cms.unwrap().n_added(), 1_000);
}

#[test]
fn parallel_engine_yields_batches_mode_applies_counts_uniformly() {
    let mut source: HashMap<Vec<u8>, u64> = HashMap::new();
    source.insert(b"a".to_vec(), 3);
    source.insert(b"b".to_vec(), 1);
    let items: Vec<(Vec<u8>, u64)> = source.into_iter().collect();

    let process: &(dyn Fn(
        &(Vec<u8>, u64),
        &mut WorkerSketches,
    ) -> Result<(Vec<(Vec<u8>, u64)>, u64), SketchError>
                 + Sync) = &|item, _sketches| Ok((vec![item.clone()], 1));

    let request = SketchRequest {
        hll: None,
        cms: Some(CmsArgs {
            kind: CmsKind::Linear,
            width: 256,
            depth: 3,
            seed: 1,
            max_count: None,
            num_reserved: None,
        }),
        hh: None,
    };

    let merged = parallel_add(items, 2, request, CallbackMode::YieldsBatches(process)).unwrap();
    let cms = merged.cms.unwrap();
    assert_eq!(cms.query(b"a"), 3);
    assert_eq!(cms.query(b"b"), 1);
}
