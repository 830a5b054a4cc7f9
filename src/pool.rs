use rayon::prelude::*;

use crate::error::{Error, Result};

/// A bounded pool of OS threads for per-document fan-out.
///
/// Every helper collects results in input order, never completion order.
pub struct WorkerPool {
    pool: rayon::ThreadPool,
}

impl WorkerPool {
    /// Build a pool with `workers` threads, or one per available core.
    pub fn new(workers: Option<usize>) -> Result<Self> {
        let threads =
            workers.filter(|&n| n > 0).unwrap_or_else(default_workers);
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("libris-worker-{i}"))
            .build()
            .map_err(|e| {
                Error::Config(format!("cannot start worker pool: {e}"))
            })?;
        tracing::debug!(threads, "worker pool started");
        Ok(Self { pool })
    }

    pub fn threads(&self) -> usize {
        self.pool.current_num_threads()
    }

    /// Apply `f` to every item in parallel.
    pub fn map<T, R, F>(&self, items: &[T], f: F) -> Vec<R>
    where
        T: Sync,
        R: Send,
        F: Fn(&T) -> R + Sync + Send,
    {
        self.pool.install(|| items.par_iter().map(f).collect())
    }

    /// Keep the items for which `keep` holds.
    pub fn filter<'a, T, F>(&self, items: &'a [T], keep: F) -> Vec<&'a T>
    where
        T: Sync,
        F: Fn(&T) -> bool + Sync + Send,
    {
        self.pool
            .install(|| items.par_iter().filter(|item| keep(item)).collect())
    }
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("threads", &self.threads())
            .finish()
    }
}

fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn respects_requested_size() {
        let pool = WorkerPool::new(Some(3)).unwrap();
        assert_eq!(pool.threads(), 3);
    }

    #[test]
    fn map_preserves_input_order() {
        let pool = WorkerPool::new(Some(4)).unwrap();
        let items: Vec<u64> = (0..1000).collect();
        let doubled = pool.map(&items, |n| n * 2);
        assert_eq!(doubled, items.iter().map(|n| n * 2).collect::<Vec<_>>());
    }

    #[test]
    fn filter_is_an_ordered_subsequence() {
        let pool = WorkerPool::new(Some(4)).unwrap();
        let items: Vec<u32> = (0..500).collect();
        let kept = pool.filter(&items, |n| n % 7 == 0);
        let expected: Vec<&u32> =
            items.iter().filter(|n| *n % 7 == 0).collect();
        assert_eq!(kept, expected);
    }
}
