//! The worker pool every placement phase runs on.
//!
//! Phases are strict barriers: a phase borrows the model mutably, runs its
//! parallel loops inside [`WorkerPool::install`], and returns before the next
//! phase starts.

use hiplace_common::{InternalError, PlaceResult};
use rayon::{ThreadPool, ThreadPoolBuilder};

/// A fixed-size pool of worker threads.
#[derive(Debug)]
pub struct WorkerPool {
    pool: ThreadPool,
    jobs: usize,
}

impl WorkerPool {
    /// Creates a pool with `jobs` threads (at least one).
    pub fn new(jobs: usize) -> PlaceResult<Self> {
        let jobs = jobs.max(1);
        let pool = ThreadPoolBuilder::new()
            .num_threads(jobs)
            .thread_name(|i| format!("hiplace-worker-{i}"))
            .build()
            .map_err(|e| InternalError::new(format!("failed to start {jobs} worker threads: {e}")))?;
        Ok(Self { pool, jobs })
    }

    /// Number of worker threads.
    pub fn jobs(&self) -> usize {
        self.jobs
    }

    /// Runs `op` on the pool; parallel iterators inside it use the pool's
    /// threads.
    pub fn install<R: Send>(&self, op: impl FnOnce() -> R + Send) -> R {
        self.pool.install(op)
    }

    /// Runs two closures concurrently and waits for both.
    pub fn join<A, B, RA, RB>(&self, a: A, b: B) -> (RA, RB)
    where
        A: FnOnce() -> RA + Send,
        B: FnOnce() -> RB + Send,
        RA: Send,
        RB: Send,
    {
        self.pool.join(a, b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rayon::prelude::*;

    #[test]
    fn zero_jobs_still_gets_a_thread() {
        let pool = WorkerPool::new(0).unwrap();
        assert_eq!(pool.jobs(), 1);
    }

    #[test]
    fn install_runs_parallel_loops_on_the_pool() {
        let pool = WorkerPool::new(3).unwrap();
        let threads = pool.install(rayon::current_num_threads);
        assert_eq!(threads, 3);
        let sum: u64 = pool.install(|| (0..1000u64).into_par_iter().sum());
        assert_eq!(sum, 499_500);
    }

    #[test]
    fn join_returns_both_results() {
        let pool = WorkerPool::new(2).unwrap();
        let (a, b) = pool.join(|| 2 + 2, || "x".repeat(3));
        assert_eq!(a, 4);
        assert_eq!(b, "xxx");
    }
}
