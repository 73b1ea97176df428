//! Bounded worker pool for thread and bucket sync units.
//!
//! Tasks are admitted in submission order as permits free up; completion
//! order is unspecified. Every unit is idempotent, so callers must not rely
//! on it.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::debug;

use crate::error::{SyncError, SyncResult};

#[derive(Debug, Clone)]
pub struct ConcurrencyLimiter {
    semaphore: Arc<Semaphore>,
    capacity: usize,
}

impl ConcurrencyLimiter {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(capacity)),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Run every task with at most `capacity` in flight.
    ///
    /// Stops admitting work and aborts the tasks still running as soon as one
    /// fails; the first error is returned.
    pub async fn run_all<T, Fut>(&self, tasks: Vec<Fut>) -> SyncResult<Vec<T>>
    where
        T: Send + 'static,
        Fut: Future<Output = SyncResult<T>> + Send + 'static,
    {
        let total = tasks.len();
        let mut set = JoinSet::new();
        let mut results = Vec::with_capacity(total);

        for task in tasks {
            let permit = self
                .semaphore
                .clone()
                .acquire_owned()
                .await
                .map_err(|_| SyncError::Task("limiter closed".to_string()))?;

            while let Some(joined) = set.try_join_next() {
                results.push(flatten(joined)?);
            }

            set.spawn(async move {
                let _permit = permit;
                task.await
            });
        }

        while let Some(joined) = set.join_next().await {
            results.push(flatten(joined)?);
        }

        debug!(total, capacity = self.capacity, "limiter drained");
        Ok(results)
    }
}

fn flatten<T>(joined: Result<SyncResult<T>, tokio::task::JoinError>) -> SyncResult<T> {
    match joined {
        Ok(result) => result,
        Err(err) => Err(SyncError::Task(err.to_string())),
    }
}
