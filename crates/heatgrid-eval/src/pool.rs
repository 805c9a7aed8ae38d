//! Bounded worker pool, seed derivation and cooperative cancellation.

use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tracing::debug;

use crate::EvalError;

/// Upper bound on worker threads unless the caller overrides it.
pub const DEFAULT_MAX_WORKERS: usize = 50;

/// A rayon thread pool sized to `min(max_workers, available cores)`.
///
/// Every driver runs its independent units inside [`WorkerPool::install`],
/// so nested `par_iter` calls share the same bounded set of threads.
#[derive(Debug)]
pub struct WorkerPool {
    pool: rayon::ThreadPool,
    n_workers: usize,
}

impl WorkerPool {
    /// Build a pool with at most `max_workers` threads, or
    /// [`DEFAULT_MAX_WORKERS`] when `None`.
    ///
    /// # Errors
    ///
    /// Returns [`EvalError::WorkerPool`] when rayon cannot spawn the threads.
    pub fn new(max_workers: Option<usize>) -> Result<Self, EvalError> {
        let cores = std::thread::available_parallelism().map_or(1, std::num::NonZero::get);
        let n_workers = max_workers
            .unwrap_or(DEFAULT_MAX_WORKERS)
            .min(cores)
            .max(1);
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(n_workers)
            .thread_name(|i| format!("heatgrid-worker-{i}"))
            .build()
            .map_err(|source| EvalError::WorkerPool { n_workers, source })?;
        debug!(n_workers, "worker pool ready");
        Ok(Self { pool, n_workers })
    }

    /// Return the number of worker threads.
    #[must_use]
    pub fn n_workers(&self) -> usize {
        self.n_workers
    }

    /// Run `op` inside the pool.
    pub fn install<R, F>(&self, op: F) -> R
    where
        F: FnOnce() -> R + Send,
        R: Send,
    {
        self.pool.install(op)
    }
}

/// A shared flag that asks long-running drivers to stop scheduling work.
///
/// Units already running finish normally; partial results are returned.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    /// A token that has not been cancelled.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    /// `true` once [`cancel`](Self::cancel) has been called on any clone.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Draw `n` per-unit seeds from a master generator.
///
/// With `Some(seed)` the sequence is reproducible; with `None` the master
/// generator is seeded from the operating system.
pub(crate) fn unit_seeds(seed: Option<u64>, n: usize) -> Vec<u64> {
    let mut master = match seed {
        Some(s) => ChaCha8Rng::seed_from_u64(s),
        None => ChaCha8Rng::from_entropy(),
    };
    (0..n).map(|_| master.r#gen()).collect()
}
