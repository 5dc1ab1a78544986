//! This module wraps the fork-join primitives that the storage layer consumes.
//!
//! Work is executed on a crate-local [rayon] thread pool, which is created lazily
//! from the installed [StorageConfig]. If no pool can be created, all work runs
//! on the calling thread.

use std::{
    ops::Range,
    sync::atomic::{AtomicUsize, Ordering},
};

use once_cell::sync::OnceCell;
use rayon::{
    iter::{IndexedParallelIterator, IntoParallelIterator, ParallelIterator},
    ThreadPool, ThreadPoolBuilder,
};

use crate::config::StorageConfig;

/// The crate-local thread pool, or `None` if it could not be created.
static POOL: OnceCell<Option<ThreadPool>> = OnceCell::new();

/// Number of parallel regions that are currently executing.
static ACTIVE_TEAMS: AtomicUsize = AtomicUsize::new(0);

fn desired_threads(config: &StorageConfig) -> usize {
    let from_env = std::env::var("RAYON_NUM_THREADS")
        .ok()
        .and_then(|s| s.parse::<usize>().ok())
        .filter(|&n| n > 0);

    config.nthreads.or(from_env).unwrap_or_else(|| {
        std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1)
    })
}

fn build_pool() -> Option<ThreadPool> {
    let requested = desired_threads(&StorageConfig::current()).max(1);
    let try_build = |n| {
        ThreadPoolBuilder::new()
            .num_threads(n)
            .thread_name(|index| format!("colframe-worker-{index}"))
            .build()
    };

    match try_build(requested) {
        Ok(pool) => Some(pool),
        Err(error) if requested > 1 => {
            log::warn!("Could not start {requested} worker threads ({error}), trying a single one");
            try_build(1).ok()
        }
        Err(error) => {
            log::warn!("Could not start a worker thread ({error}), running sequentially");
            None
        }
    }
}

fn pool() -> Option<&'static ThreadPool> {
    POOL.get_or_init(build_pool).as_ref()
}

/// Marks a parallel region as active for as long as it is alive.
#[derive(Debug)]
struct TeamGuard;

impl TeamGuard {
    fn enter() -> Self {
        ACTIVE_TEAMS.fetch_add(1, Ordering::SeqCst);
        TeamGuard
    }
}

impl Drop for TeamGuard {
    fn drop(&mut self) {
        ACTIVE_TEAMS.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Returns the number of threads in the worker pool.
pub fn num_threads() -> usize {
    pool().map_or(1, ThreadPool::current_num_threads)
}

/// Returns `true` if a worker team is currently executing,
/// or if the caller is itself a worker thread.
///
/// Nested parallel regions are not supported; callers use this to
/// fall back to sequential execution.
pub fn threads_active() -> bool {
    ACTIVE_TEAMS.load(Ordering::SeqCst) > 0 || rayon::current_thread_index().is_some()
}

/// Executes `f(thread_index)` once on each of `nthreads` workers and waits for all of them.
///
/// Runs on the calling thread if a team is already active.
pub fn parallel_region<F>(nthreads: usize, f: F)
where
    F: Fn(usize) + Sync,
{
    let nthreads = nthreads.clamp(1, num_threads());
    match pool() {
        Some(pool) if nthreads > 1 && !threads_active() => {
            let _guard = TeamGuard::enter();
            pool.scope(|scope| {
                for index in 0..nthreads {
                    let f = &f;
                    scope.spawn(move |_| f(index));
                }
            });
        }
        _ => (0..nthreads).for_each(f),
    }
}

/// Splits `0..nrows` into consecutive ranges of at most `chunk_size` rows
/// and calls `f` for each of them, in parallel if worthwhile.
pub fn parallel_for_static<F>(nrows: usize, chunk_size: usize, f: F)
where
    F: Fn(Range<usize>) + Sync + Send,
{
    let chunk_size = chunk_size.max(1);
    let nchunks = nrows.div_ceil(chunk_size);
    let chunk = |index: usize| index * chunk_size..((index + 1) * chunk_size).min(nrows);

    match pool() {
        Some(pool) if nchunks > 1 && !threads_active() => {
            let _guard = TeamGuard::enter();
            pool.install(|| {
                (0..nchunks).into_par_iter().for_each(|index| {
                    let range = chunk(index);
                    log::trace!("Worker {:?} processes rows {range:?}", rayon::current_thread_index());
                    f(range)
                })
            });
        }
        _ => (0..nchunks).for_each(|index| f(chunk(index))),
    }
}

/// Computes `f(i)` for every `i` in `0..n` and collects the results in order.
///
/// Below [StorageConfig::min_rows_parallel] rows, or when called from within
/// an active team, the computation is sequential.
pub fn map_range<T, F>(n: usize, f: F) -> Vec<T>
where
    T: Send,
    F: Fn(usize) -> T + Sync + Send,
{
    let threshold = StorageConfig::current().min_rows_parallel;

    match pool() {
        Some(pool) if n >= threshold.max(2) && !threads_active() => {
            let _guard = TeamGuard::enter();
            let mut result = Vec::with_capacity(n);
            pool.install(|| (0..n).into_par_iter().map(&f).collect_into_vec(&mut result));
            result
        }
        _ => (0..n).map(f).collect(),
    }
}

#[cfg(test)]
mod test {
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Mutex,
    };

    use super::{map_range, parallel_for_static, parallel_region};
    use test_log::test;

    #[test]
    fn map_range_preserves_order() {
        let result = map_range(50_000, |i| i * 2);
        assert_eq!(result.len(), 50_000);
        assert!(result.iter().enumerate().all(|(i, &v)| v == 2 * i));
    }

    #[test]
    fn parallel_for_covers_every_row_once() {
        let ranges = Mutex::new(Vec::new());
        parallel_for_static(1003, 100, |range| ranges.lock().unwrap().push(range));

        let mut ranges = ranges.into_inner().unwrap();
        ranges.sort_by_key(|range| range.start);
        assert_eq!(ranges.len(), 11);
        assert_eq!(ranges.first().unwrap().start, 0);
        assert_eq!(ranges.last().unwrap().end, 1003);
        assert!(ranges.windows(2).all(|pair| pair[0].end == pair[1].start));
    }

    #[test]
    fn nested_regions_run_sequentially() {
        let inner_calls = AtomicUsize::new(0);
        parallel_region(2, |_| {
            parallel_for_static(10, 1, |_| {
                inner_calls.fetch_add(1, Ordering::SeqCst);
            });
        });
        // Every thread of the region ran all ten chunks itself.
        assert_eq!(inner_calls.load(Ordering::SeqCst) % 10, 0);
        assert!(inner_calls.load(Ordering::SeqCst) >= 10);
    }
}
