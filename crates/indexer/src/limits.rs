use crate::{IndexerError, Result};
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinSet;

const MAX_WORKERS: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerPoolSnapshot {
    pub limit: usize,
    pub in_flight: usize,
    pub waiters: usize,
}

/// Default worker count: one per available core
pub fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

fn clamp_workers(requested: usize) -> usize {
    requested.clamp(1, MAX_WORKERS)
}

#[derive(Debug, Default)]
struct Counters {
    in_flight: AtomicUsize,
    waiters: AtomicUsize,
}

/// Bounded fan-out for per-file work (reads, hashing, chunking).
///
/// Owned by one session; there is no process-wide pool.
#[derive(Debug, Clone)]
pub struct WorkerPool {
    permits: Arc<Semaphore>,
    limit: usize,
    counters: Arc<Counters>,
}

impl WorkerPool {
    pub fn new(workers: usize) -> Self {
        let limit = clamp_workers(workers);
        Self {
            permits: Arc::new(Semaphore::new(limit)),
            limit,
            counters: Arc::new(Counters::default()),
        }
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn snapshot(&self) -> WorkerPoolSnapshot {
        WorkerPoolSnapshot {
            limit: self.limit,
            in_flight: self.counters.in_flight.load(Ordering::Relaxed),
            waiters: self.counters.waiters.load(Ordering::Relaxed),
        }
    }

    async fn acquire(&self) -> Result<WorkerPermit> {
        self.counters.waiters.fetch_add(1, Ordering::Relaxed);
        let permit = self.permits.clone().acquire_owned().await;
        self.counters.waiters.fetch_sub(1, Ordering::Relaxed);
        let permit = permit.map_err(|_| IndexerError::Other("worker pool closed".into()))?;
        self.counters.in_flight.fetch_add(1, Ordering::Relaxed);
        Ok(WorkerPermit {
            _permit: permit,
            counters: Arc::clone(&self.counters),
        })
    }

    /// Run blocking work on the blocking thread pool under a permit
    pub async fn run_blocking<F, R>(&self, work: F) -> Result<R>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        let _permit = self.acquire().await?;
        tokio::task::spawn_blocking(work)
            .await
            .map_err(|e| IndexerError::Other(format!("worker task failed: {e}")))
    }

    /// Apply `work` to every item with at most `limit` in flight.
    ///
    /// Results come back in input order. Dropping the returned future aborts
    /// outstanding tasks.
    pub async fn map<T, R, F, Fut>(&self, items: Vec<T>, work: F) -> Result<Vec<R>>
    where
        T: Send + 'static,
        R: Send + 'static,
        F: Fn(T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = R> + Send + 'static,
    {
        let total = items.len();
        let work = Arc::new(work);
        let mut tasks = JoinSet::new();
        for (idx, item) in items.into_iter().enumerate() {
            let pool = self.clone();
            let work = Arc::clone(&work);
            tasks.spawn(async move {
                let permit = pool.acquire().await;
                let out = match permit {
                    Ok(_permit) => Ok(work(item).await),
                    Err(err) => Err(err),
                };
                (idx, out)
            });
        }

        let mut results: Vec<Option<R>> = (0..total).map(|_| None).collect();
        while let Some(joined) = tasks.join_next().await {
            let (idx, out) =
                joined.map_err(|e| IndexerError::Other(format!("worker task failed: {e}")))?;
            results[idx] = Some(out?);
        }
        Ok(results.into_iter().flatten().collect())
    }
}

impl Default for WorkerPool {
    fn default() -> Self {
        Self::new(default_workers())
    }
}

struct WorkerPermit {
    _permit: OwnedSemaphorePermit,
    counters: Arc<Counters>,
}

impl Drop for WorkerPermit {
    fn drop(&mut self) {
        self.counters.in_flight.fetch_sub(1, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    #[test]
    fn worker_count_is_clamped() {
        assert_eq!(WorkerPool::new(0).limit(), 1);
        assert_eq!(WorkerPool::new(4).limit(), 4);
        assert_eq!(WorkerPool::new(10_000).limit(), MAX_WORKERS);
        assert!(default_workers() >= 1);
    }

    #[tokio::test]
    async fn map_keeps_input_order_and_bounds_concurrency() {
        let pool = WorkerPool::new(2);
        let peak = Arc::new(AtomicUsize::new(0));
        let current = Arc::new(AtomicUsize::new(0));
        let (peak_in, current_in) = (Arc::clone(&peak), Arc::clone(&current));
        let out = pool
            .map((0..8u64).collect(), move |n| {
                let peak = Arc::clone(&peak_in);
                let current = Arc::clone(&current_in);
                async move {
                    let now = current.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(5 * (8 - n))).await;
                    current.fetch_sub(1, Ordering::SeqCst);
                    n * 10
                }
            })
            .await
            .unwrap();
        assert_eq!(out, vec![0, 10, 20, 30, 40, 50, 60, 70]);
        assert!(peak.load(Ordering::SeqCst) <= 2);
        assert_eq!(pool.snapshot().in_flight, 0);
    }

    #[tokio::test]
    async fn run_blocking_returns_value() {
        let pool = WorkerPool::new(1);
        assert_eq!(pool.run_blocking(|| 6 * 7).await.unwrap(), 42);
    }
}
