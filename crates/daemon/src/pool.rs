//! Bounded fan-out in barrier-separated batches.

use std::future::Future;
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::{AcquireError, Semaphore};
use tokio::task::{JoinError, JoinSet};

#[derive(Debug, Error)]
pub enum PoolError {
    #[error("batch task did not complete: {0}")]
    Task(#[from] JoinError),
    #[error("concurrency limiter closed")]
    Closed(#[from] AcquireError),
}

/// Runs tasks `size` at a time.
///
/// Items are taken in order in groups of `size`. Every task of a group holds
/// one semaphore permit while it runs, and the next group is not started
/// until the whole current group has finished, so at most `size` tasks are
/// ever in flight.
pub struct BatchPool {
    size: usize,
    permits: Arc<Semaphore>,
}

impl BatchPool {
    pub fn new(size: usize) -> Self {
        let size = size.max(1);
        Self {
            size,
            permits: Arc::new(Semaphore::new(size)),
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Runs `task` over every item and returns the outputs in item order.
    ///
    /// A panicking task fails the whole run; tasks still pending in its
    /// batch are aborted.
    pub async fn run<I, T, F, Fut>(&self, items: Vec<I>, task: F) -> Result<Vec<T>, PoolError>
    where
        I: Send + 'static,
        T: Send + 'static,
        F: Fn(I) -> Fut,
        Fut: Future<Output = T> + Send + 'static,
    {
        let mut slots: Vec<Option<T>> = std::iter::repeat_with(|| None).take(items.len()).collect();
        let mut pending = items.into_iter().enumerate().peekable();

        while pending.peek().is_some() {
            let mut batch = JoinSet::new();
            for (index, item) in pending.by_ref().take(self.size) {
                let permit = Arc::clone(&self.permits).acquire_owned().await?;
                let fut = task(item);
                batch.spawn(async move {
                    let _permit = permit;
                    (index, fut.await)
                });
            }
            while let Some(joined) = batch.join_next().await {
                let (index, output) = joined?;
                slots[index] = Some(output);
            }
        }

        Ok(slots.into_iter().flatten().collect())
    }
}
