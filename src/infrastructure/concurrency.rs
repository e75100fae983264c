//! Bounded concurrency for cross-instrument `BarStore` fetches and a
//! cancellation signal checked at day boundaries (§5).

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Semaphore;

/// Default bounded worker count for concurrent `BarStore` fetches (§5:
/// "a bounded worker pool (default 4)").
pub const DEFAULT_FETCH_WORKERS: usize = 4;

/// A cooperative cancellation flag, checked at day boundaries by long-running
/// loops (§5 "Long-running runs respond to a cancellation token checked at
/// each day boundary; partial results are discarded"). Cheap to clone and
/// share across tasks.
#[derive(Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

/// Runs `jobs` concurrently with at most `DEFAULT_FETCH_WORKERS` in flight at
/// once. Completion ordering is irrelevant (§5); results are returned in the
/// same order as `jobs` for caller convenience. A job that observes
/// cancellation before starting short-circuits with `None`.
pub async fn run_bounded<T, F, Fut>(jobs: Vec<T>, cancel: CancellationToken, worker_count: usize, f: F) -> Vec<Option<Fut::Output>>
where
    F: Fn(T) -> Fut + Send + Sync + 'static,
    Fut: Future + Send + 'static,
    Fut::Output: Send + 'static,
    T: Send + 'static,
{
    let semaphore = Arc::new(Semaphore::new(worker_count.max(1)));
    let f = Arc::new(f);
    let mut handles = Vec::with_capacity(jobs.len());
    for job in jobs {
        let semaphore = semaphore.clone();
        let cancel = cancel.clone();
        let f = f.clone();
        handles.push(tokio::spawn(async move {
            if cancel.is_cancelled() {
                return None;
            }
            let _permit = semaphore.acquire().await.ok()?;
            Some(f(job).await)
        }));
    }
    let mut out = Vec::with_capacity(handles.len());
    for handle in handles {
        out.push(handle.await.unwrap_or(None));
    }
    out
}
