use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};
use rdf_federation_model::{PlanResult, PlanningError};
use std::fmt::Debug;
use std::sync::OnceLock;

/// Runs a task for every index of a range, possibly in parallel.
///
/// Implementations must call `task` exactly once for every index in `0..len` and only return
/// after all calls have finished.
pub trait ParallelFor: Debug + Send + Sync {
    /// Calls `task` for every index in `0..len`.
    fn for_each(&self, len: usize, task: &(dyn Fn(usize) + Sync));
}

/// Runs every task on the calling thread.
#[derive(Debug, Default, Clone, Copy)]
pub struct SequentialParallelFor;

impl ParallelFor for SequentialParallelFor {
    fn for_each(&self, len: usize, task: &(dyn Fn(usize) + Sync)) {
        (0..len).for_each(task);
    }
}

/// Runs tasks on a dedicated, fixed-size rayon thread pool.
#[derive(Debug)]
pub struct RayonParallelFor {
    pool: ThreadPool,
}

impl RayonParallelFor {
    /// Creates a new [RayonParallelFor] with `num_threads` worker threads.
    ///
    /// # Errors
    ///
    /// Returns [PlanningError::ThreadPool] if the pool cannot be created.
    pub fn try_new(num_threads: usize) -> PlanResult<Self> {
        let pool = ThreadPoolBuilder::new()
            .num_threads(num_threads.max(1))
            .thread_name(|i| format!("rdf-federation-{i}"))
            .build()
            .map_err(|e| PlanningError::ThreadPool(e.to_string()))?;
        tracing::debug!(num_threads, "Created worker pool");
        Ok(Self { pool })
    }

    /// Returns the number of worker threads.
    pub fn num_threads(&self) -> usize {
        self.pool.current_num_threads()
    }
}

impl ParallelFor for RayonParallelFor {
    fn for_each(&self, len: usize, task: &(dyn Fn(usize) + Sync)) {
        self.pool
            .install(|| (0..len).into_par_iter().for_each(|i| task(i)));
    }
}

/// Computes `f(i)` for every index in `0..len` using `parallel_for` and returns the results in
/// index order.
///
/// Every task writes only its own result slot.
///
/// # Errors
///
/// Returns [PlanningError::Internal] if `parallel_for` skipped an index.
pub fn parallel_map<T, F>(parallel_for: &dyn ParallelFor, len: usize, f: F) -> PlanResult<Vec<T>>
where
    T: Send + Sync,
    F: Fn(usize) -> T + Sync,
{
    let slots = (0..len).map(|_| OnceLock::new()).collect::<Vec<OnceLock<T>>>();
    parallel_for.for_each(len, &|i| {
        // Only the first write of an index counts.
        let _ = slots[i].set(f(i));
    });

    slots
        .into_iter()
        .enumerate()
        .map(|(i, slot)| {
            slot.into_inner()
                .ok_or_else(|| PlanningError::internal(format!("Parallel task {i} did not run")))
        })
        .collect()
}
