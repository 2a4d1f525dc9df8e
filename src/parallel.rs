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
//! Parallel ingest/merge orchestrator.
//!
//! `parallel_add` owns `n_workers` private, independently-built sketch sets
//! (one per requested type), fans a bounded queue of items out to OS
//! threads, and reduces the worker results with a pairwise tournament
//! merge. Workers never see each other's sketches while ingesting; the
//! only shared state is the input queue itself.
//!
//! The two calling conventions a worker callback can use — return a record
//! count after mutating the sketches directly, or yield a batch of
//! `(key, count)` pairs for the engine to apply — are represented as an
//! explicit [`CallbackMode`] rather than inspected at runtime.

use std::any::Any;
use std::thread;

use crate::cms::{Cms, CmsKind};
use crate::error::SketchError;
use crate::heavy_hitters::HeavyHitters;
use crate::hyperloglog::HyperLogLog;
use crate::rng::LogCounterRng;

/// Extracts a message from a `JoinHandle::join()` panic payload, turning a
/// worker panic into a reportable [`SketchError::WorkerFailure`] instead of
/// re-panicking the calling thread.
fn worker_failure(payload: Box<dyn Any + Send>) -> SketchError {
    let message = payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "worker panicked with a non-string payload".to_string());
    SketchError::WorkerFailure(message)
}

/// Construction arguments for the per-worker [`HyperLogLog`].
#[derive(Debug, Clone, Copy)]
pub struct HllArgs {
    pub precision: u8,
    pub seed: u64,
}

/// Construction arguments for the per-worker [`Cms`].
#[derive(Debug, Clone, Copy)]
pub struct CmsArgs {
    pub kind: CmsKind,
    pub width: usize,
    pub depth: usize,
    pub seed: u64,
    /// `None` uses `kind`'s defaults (ignored for `CmsKind::Linear`).
    pub max_count: Option<u64>,
    /// `None` uses `kind`'s defaults (ignored for `CmsKind::Linear`).
    pub num_reserved: Option<u64>,
}

/// Construction arguments for the per-worker [`HeavyHitters`].
#[derive(Debug, Clone, Copy)]
pub struct HhArgs {
    pub width: usize,
    pub depth: usize,
    pub max_key_len: usize,
    pub phi: Option<f64>,
    pub seed: u64,
}

/// Which sketch types `parallel_add` should build. A `None` field is
/// simply absent from the returned [`SketchSet`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SketchRequest {
    pub hll: Option<HllArgs>,
    pub cms: Option<CmsArgs>,
    pub hh: Option<HhArgs>,
}

/// The sketches owned by one worker (or, after the tournament merge, the
/// final result).
#[derive(Debug, Default)]
pub struct WorkerSketches {
    pub cms: Option<Cms>,
    pub hh: Option<HeavyHitters>,
    pub hll: Option<HyperLogLog>,
}

impl WorkerSketches {
    fn apply_batch(&mut self, batch: &[(Vec<u8>, u64)]) -> Result<(), SketchError> {
        if let Some(cms) = &mut self.cms {
            for (key, count) in batch {
                cms.add(key, *count);
            }
        }
        if let Some(hh) = &mut self.hh {
            for (key, count) in batch {
                hh.add(key, *count)?;
            }
        }
        if let Some(hll) = &mut self.hll {
            for (key, _count) in batch {
                hll.add(key);
            }
        }
        Ok(())
    }

    fn update_records(&mut self, n: u64) {
        if let Some(cms) = &mut self.cms {
            cms.update_records(n);
        }
        if let Some(hh) = &mut self.hh {
            hh.update_records(n);
        }
        if let Some(hll) = &mut self.hll {
            hll.update_records(n);
        }
    }
}

/// Result of `parallel_add`: one merged sketch per requested type.
pub type SketchSet = WorkerSketches;

/// A worker callback's return value: either the engine trusts the callback
/// to have mutated the sketches directly and just reports how many records
/// it consumed, or the callback hands back raw keys for the engine to
/// apply uniformly across every requested sketch.
pub enum CallbackMode<'a, Item> {
    /// `f(item, sketches) -> records_processed`. `f` mutates `sketches`
    /// itself.
    ReturnsCount(&'a (dyn Fn(&Item, &mut WorkerSketches) -> Result<u64, SketchError> + Sync)),
    /// `f(item, sketches) -> (batch_of_key_count_pairs, records_processed)`.
    /// The engine applies `batch` to every sketch `sketches` holds.
    YieldsBatches(
        &'a (dyn Fn(&Item, &mut WorkerSketches) -> Result<(Vec<(Vec<u8>, u64)>, u64), SketchError>
                 + Sync),
    ),
}

fn build_worker_sketches(
    request: &SketchRequest,
    worker_id: usize,
) -> Result<WorkerSketches, SketchError> {
    let hll = match request.hll {
        Some(args) => Some(HyperLogLog::new(args.precision, args.seed)?),
        None => None,
    };

    let cms = match request.cms {
        Some(args) => {
            let mut cms = match (args.max_count, args.num_reserved) {
                (Some(max_count), Some(num_reserved)) => Cms::with_log_params(
                    args.kind,
                    args.width,
                    args.depth,
                    args.seed,
                    max_count,
                    num_reserved,
                )?,
                _ => Cms::new(args.kind, args.width, args.depth, args.seed)?,
            };
            // Hash seed stays identical across workers (required for merge
            // compatibility); only the log-counter RNG stream is split per
            // worker, per the engine's reproducibility contract.
            cms.reseed_rng(LogCounterRng::worker_seed(args.seed, worker_id));
            Some(cms)
        }
        None => None,
    };

    let hh = match request.hh {
        Some(args) => Some(HeavyHitters::new(
            args.width,
            args.depth,
            args.max_key_len,
            args.phi,
            args.seed,
        )?),
        None => None,
    };

    if hll.is_none() && cms.is_none() && hh.is_none() {
        return Err(SketchError::ConfigError(
            "parallel_add requires at least one requested sketch type",
        ));
    }

    Ok(WorkerSketches { cms, hh, hll })
}

/// Reduces `items` pairwise (⌈log2 W⌉ rounds, index `i` merged with
/// `i + ⌈W/2⌉`) until one survivor remains.
fn tournament_merge<T: Send + Sync>(
    mut items: Vec<T>,
    merge: fn(&mut T, &T) -> Result<(), SketchError>,
) -> Result<T, SketchError> {
    let mut width = items.len();
    while width > 1 {
        let half = width.div_ceil(2);
        let pairs = width - half;

        let errors: Vec<Option<SketchError>> = thread::scope(|scope| {
            let (left, right) = items.split_at_mut(half);
            let mut handles = Vec::with_capacity(pairs);
            for (left_item, right_item) in left[..pairs].iter_mut().zip(right[..pairs].iter()) {
                handles.push(scope.spawn(move || merge(left_item, right_item).err()));
            }
            handles
                .into_iter()
                .map(|handle| match handle.join() {
                    Ok(err) => err,
                    Err(payload) => Some(worker_failure(payload)),
                })
                .collect()
        });

        if let Some(err) = errors.into_iter().flatten().next() {
            return Err(err);
        }

        items.truncate(half);
        width = half;
    }
    Ok(items.into_iter().next().expect("tournament_merge requires at least one item"))
}

/// Ingests `items` across `n_workers` OS threads and returns the merged
/// sketch set.
///
/// Each worker owns an independently-constructed sketch set built from
/// `request`; no sketch is shared mutably while items are draining. When
/// the queue empties, the per-worker sketches are reduced with a pairwise
/// tournament merge. If any worker callback returns an error, the first
/// error observed aborts the session.
///
/// # Errors
/// Returns [`SketchError::ConfigError`] if `n_workers == 0` or `request`
/// names no sketch type. Returns the first [`SketchError`] (typically
/// [`SketchError::WorkerFailure`]) raised by a worker callback.
pub fn parallel_add<Item>(
    items: Vec<Item>,
    n_workers: usize,
    request: SketchRequest,
    mode: CallbackMode<'_, Item>,
) -> Result<SketchSet, SketchError>
where
    Item: Send,
{
    if n_workers == 0 {
        return Err(SketchError::ConfigError("n_workers must be greater than zero"));
    }

    tracing::info!(n_workers, n_items = items.len(), "starting parallel_add session");

    let mut worker_sketches: Vec<WorkerSketches> = (0..n_workers)
        .map(|worker_id| build_worker_sketches(&request, worker_id))
        .collect::<Result<_, _>>()?;

    let queue_capacity = n_workers.saturating_mul(4).max(1);
    let (sender, receiver) = crossbeam_channel::bounded::<Item>(queue_capacity);

    let worker_result: Result<(), SketchError> = thread::scope(|scope| {
        let mode_ref = &mode;
        let handles: Vec<_> = worker_sketches
            .iter_mut()
            .map(|sketches| {
                let receiver = receiver.clone();
                scope.spawn(move || -> Result<(), SketchError> {
                    for item in receiver.iter() {
                        match mode_ref {
                            CallbackMode::ReturnsCount(f) => {
                                let records = f(&item, sketches)?;
                                sketches.update_records(records);
                            }
                            CallbackMode::YieldsBatches(f) => {
                                let (batch, records) = f(&item, sketches)?;
                                sketches.apply_batch(&batch)?;
                                sketches.update_records(records);
                            }
                        }
                    }
                    Ok(())
                })
            })
            .collect();

        drop(receiver);
        for item in items {
            if sender.send(item).is_err() {
                break;
            }
        }
        drop(sender);

        let mut first_error = None;
        for handle in handles {
            let result = match handle.join() {
                Ok(result) => result,
                Err(payload) => Err(worker_failure(payload)),
            };
            if let Err(err) = result {
                if first_error.is_none() {
                    first_error = Some(err);
                }
            }
        }
        first_error.map_or(Ok(()), Err)
    });
    if let Err(ref err) = worker_result {
        tracing::warn!(%err, "parallel_add aborting: worker callback failed");
    }
    worker_result?;

    tracing::debug!("ingest complete, starting tournament merge");

    let hll = if request.hll.is_some() {
        let hlls: Vec<HyperLogLog> = worker_sketches
            .iter_mut()
            .map(|w| w.hll.take().expect("hll requested but missing from worker"))
            .collect();
        Some(tournament_merge(hlls, HyperLogLog::merge)?)
    } else {
        None
    };

    let cms = if request.cms.is_some() {
        let cmses: Vec<Cms> = worker_sketches
            .iter_mut()
            .map(|w| w.cms.take().expect("cms requested but missing from worker"))
            .collect();
        Some(tournament_merge(cmses, Cms::merge)?)
    } else {
        None
    };

    let hh = if request.hh.is_some() {
        let hhs: Vec<HeavyHitters> = worker_sketches
            .iter_mut()
            .map(|w| w.hh.take().expect("hh requested but missing from worker"))
            .collect();
        Some(tournament_merge(hhs, HeavyHitters::merge)?)
    } else {
        None
    };

    tracing::info!("parallel_add session complete");
    Ok(SketchSet { cms, hh, hll })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_zero_workers() {
        let request = SketchRequest {
            hll: Some(HllArgs { precision: 10, seed: 0 }),
            ..Default::default()
        };
        let f = |_item: &u32, sketches: &mut WorkerSketches| -> Result<u64, SketchError> {
            if let Some(hll) = &mut sketches.hll {
                hll.add(&[0_u8]);
            }
            Ok(1)
        };
        let result = parallel_add(vec![1_u32], 0, request, CallbackMode::ReturnsCount(&f));
        assert!(result.is_err());
    }

    #[test]
    fn rejects_empty_request() {
        let f = |_item: &u32, _sketches: &mut WorkerSketches| -> Result<u64, SketchError> { Ok(1) };
        let result = parallel_add(
            vec![1_u32],
            2,
            SketchRequest::default(),
            CallbackMode::ReturnsCount(&f),
        );
        assert!(result.is_err());
    }

    #[test]
    fn returns_count_mode_builds_hll_from_shards() {
        let request = SketchRequest {
            hll: Some(HllArgs { precision: 12, seed: 0 }),
            ..Default::default()
        };
        let items: Vec<u64> = (0..4_000).collect();
        let f = |item: &u64, sketches: &mut WorkerSketches| -> Result<u64, SketchError> {
            sketches.hll.as_mut().unwrap().add(&item.to_le_bytes());
            Ok(1)
        };
        let result = parallel_add(items, 4, request, CallbackMode::ReturnsCount(&f)).unwrap();
        let estimate = result.hll.unwrap().query();
        let rel_error = (estimate - 4_000.0).abs() / 4_000.0;
        assert!(rel_error < 0.1, "estimate={estimate}");
    }

    #[test]
    fn yields_batches_mode_builds_cms_from_shards() {
        let request = SketchRequest {
            cms: Some(CmsArgs {
                kind: CmsKind::Linear,
                width: 1 << 14,
                depth: 4,
                seed: 3,
                max_count: None,
                num_reserved: None,
            }),
            ..Default::default()
        };
        let items: Vec<Vec<u8>> = vec![b"a".to_vec(), b"a".to_vec(), b"a".to_vec(), b"b".to_vec()];
        let f = |item: &Vec<u8>,
                 _sketches: &mut WorkerSketches|
         -> Result<(Vec<(Vec<u8>, u64)>, u64), SketchError> { Ok((vec![(item.clone(), 1)], 1)) };
        let result = parallel_add(items, 2, request, CallbackMode::YieldsBatches(&f)).unwrap();
        let cms = result.cms.unwrap();
        assert_eq!(cms.query(b"a"), 3);
        assert_eq!(cms.query(b"b"), 1);
        assert_eq!(cms.n_records(), 4);
    }

    #[test]
    fn n_added_sums_exactly_across_workers() {
        let request = SketchRequest {
            cms: Some(CmsArgs {
                kind: CmsKind::Linear,
                width: 256,
                depth: 4,
                seed: 0,
                max_count: None,
                num_reserved: None,
            }),
            ..Default::default()
        };
        let items: Vec<u32> = (0..1_000).collect();
        let f = |item: &u32, sketches: &mut WorkerSketches| -> Result<u64, SketchError> {
            sketches.cms.as_mut().unwrap().add(&item.to_le_bytes(), 1);
            Ok(1)
        };
        let result = parallel_add(items, 8, request, CallbackMode::ReturnsCount(&f)).unwrap();
        assert_eq!(result.cms.unwrap().n_added(), 1_000);
    }

    #[test]
    fn worker_failure_is_propagated() {
        let request = SketchRequest {
            hh: Some(HhArgs {
                width: 64,
                depth: 4,
                max_key_len: 2,
                phi: None,
                seed: 0,
            }),
            ..Default::default()
        };
        let items: Vec<Vec<u8>> = vec![b"way-too-long-key".to_vec()];
        let f = |item: &Vec<u8>, sketches: &mut WorkerSketches| -> Result<u64, SketchError> {
            sketches.hh.as_mut().unwrap().add(item, 1)?;
            Ok(1)
        };
        let result = parallel_add(items, 1, request, CallbackMode::ReturnsCount(&f));
        assert!(result.is_err());
    }

    #[test]
    fn worker_panic_is_reported_as_worker_failure() {
        let previous_hook = std::panic::take_hook();
        std::panic::set_hook(Box::new(|_| {}));

        let request = SketchRequest {
            hll: Some(HllArgs { precision: 10, seed: 0 }),
            ..Default::default()
        };
        let items: Vec<u32> = vec![1, 2, 3];
        let f = |_item: &u32, _sketches: &mut WorkerSketches| -> Result<u64, SketchError> {
            panic!("simulated worker panic");
        };
        let result = parallel_add(items, 1, request, CallbackMode::ReturnsCount(&f));

        std::panic::set_hook(previous_hook);

        match result {
            Err(SketchError::WorkerFailure(message)) => {
                assert!(message.contains("simulated worker panic"), "message={message}");
            }
            other => panic!("expected WorkerFailure, got {other:?}"),
        }
    }
}
