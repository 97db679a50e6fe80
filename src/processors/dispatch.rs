//! Order-preserving parallel dispatch over tiles.
//!
//! Every fan-out in the pipeline (header reads, stitching, user work)
//! goes through one generic `Dispatcher`, which owns a dedicated `rayon`
//! pool sized by the caller's concurrency setting rather than the global pool.
//!
//! # Example
//!
//! ```no_run
//! use lidar_pipeline::processors::dispatch::Dispatcher;
//!
//! let dispatcher = Dispatcher::new(4).unwrap();
//! let doubled = dispatcher
//!     .apply(&[1, 2, 3], |n| Ok::<_, std::io::Error>(n * 2))
//!     .unwrap();
//! assert_eq!(doubled, vec![2, 4, 6]);
//! ```

use std::fmt::Debug;

use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};
use thiserror::Error;

/// Errors raised while setting up a dispatcher.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("concurrency must be > 0, got {0}")]
    InvalidConcurrency(usize),

    #[error("failed to start worker pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

/// A task failure, tagged with the item that caused it.
#[derive(Debug, Error)]
#[error("task {index} ({item}) failed: {source}")]
pub struct WorkerError<E> {
    /// Position of the failing item in the input sequence.
    pub index: usize,
    /// Debug rendering of the failing item.
    pub item: String,
    #[source]
    pub source: E,
}

/// Applies functions across items with bounded concurrency.
pub struct Dispatcher {
    concurrency: usize,
    pool: ThreadPool,
}

impl Dispatcher {
    /// Creates a dispatcher running at most `concurrency` tasks at once.
    pub fn new(concurrency: usize) -> Result<Self, DispatchError> {
        if concurrency == 0 {
            return Err(DispatchError::InvalidConcurrency(concurrency));
        }

        let pool = ThreadPoolBuilder::new()
            .num_threads(concurrency)
            .thread_name(|i| format!("lidar-worker-{}", i))
            .build()?;

        Ok(Self { concurrency, pool })
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Applies `func` to every item, returning results in input order.
    ///
    /// Fail-fast: once any task fails no further items are started; tasks
    /// already running finish but their results are dropped. The returned
    /// error names the failing item.
    pub fn apply<T, R, E, F>(&self, items: &[T], func: F) -> Result<Vec<R>, WorkerError<E>>
    where
        T: Sync + Debug,
        R: Send,
        E: Send,
        F: Fn(&T) -> Result<R, E> + Sync + Send,
    {
        self.pool.install(|| {
            items
                .par_iter()
                .enumerate()
                .map(|(index, item)| run_task(index, item, &func))
                .collect()
        })
    }

    /// Applies `func` to every item, collecting every outcome in input order.
    pub fn apply_best_effort<T, R, E, F>(&self, items: &[T], func: F) -> Vec<Result<R, WorkerError<E>>>
    where
        T: Sync + Debug,
        R: Send,
        E: Send,
        F: Fn(&T) -> Result<R, E> + Sync + Send,
    {
        self.pool.install(|| {
            items
                .par_iter()
                .enumerate()
                .map(|(index, item)| run_task(index, item, &func))
                .collect()
        })
    }

    /// Infallible variant of [`Dispatcher::apply`].
    pub fn map<T, R, F>(&self, items: &[T], func: F) -> Vec<R>
    where
        T: Sync,
        R: Send,
        F: Fn(&T) -> R + Sync + Send,
    {
        self.pool.install(|| items.par_iter().map(|item| func(item)).collect())
    }
}

fn run_task<T, R, E, F>(index: usize, item: &T, func: &F) -> Result<R, WorkerError<E>>
where
    T: Debug,
    F: Fn(&T) -> Result<R, E>,
{
    func(item).map_err(|source| WorkerError {
        index,
        item: format!("{:?}", item),
        source,
    })
}
