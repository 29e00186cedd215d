//! Bulkhead middleware: bounded concurrency with a bounded FIFO queue.

use crate::error::ResilienceError;
use crate::hooks::{Middleware, Next};
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Semaphore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BulkheadBuildError {
    ZeroConcurrency,
    CapacityBelowConcurrency { concurrency: usize, capacity: usize },
}

impl std::fmt::Display for BulkheadBuildError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BulkheadBuildError::ZeroConcurrency => write!(f, "max_concurrency must be > 0"),
            BulkheadBuildError::CapacityBelowConcurrency { concurrency, capacity } => write!(
                f,
                "max_capacity ({}) must be >= max_concurrency ({})",
                capacity, concurrency
            ),
        }
    }
}

impl std::error::Error for BulkheadBuildError {}

/// Limits concurrent invocations to `max_concurrency`; further invocations
/// queue (FIFO) until live plus queued work reaches `max_capacity`, beyond
/// which they fail immediately with `CapacityFull`.
///
/// Cancelling a queued invocation removes it from the queue without running.
#[derive(Clone)]
pub struct Bulkhead {
    permits: Arc<Semaphore>,
    in_flight: Arc<AtomicUsize>,
    max_concurrency: usize,
    max_capacity: usize,
    on_processing: Option<Arc<dyn Fn(usize) + Send + Sync>>,
}

impl std::fmt::Debug for Bulkhead {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bulkhead")
            .field("max_concurrency", &self.max_concurrency)
            .field("max_capacity", &self.max_capacity)
            .finish()
    }
}

impl Bulkhead {
    /// `max_concurrency` invocations may run at once; `max_capacity` bounds
    /// running plus queued invocations.
    pub fn new(max_concurrency: usize, max_capacity: usize) -> Result<Self, BulkheadBuildError> {
        if max_concurrency == 0 {
            return Err(BulkheadBuildError::ZeroConcurrency);
        }
        if max_capacity < max_concurrency {
            return Err(BulkheadBuildError::CapacityBelowConcurrency {
                concurrency: max_concurrency,
                capacity: max_capacity,
            });
        }
        Ok(Self {
            permits: Arc::new(Semaphore::new(max_concurrency)),
            in_flight: Arc::new(AtomicUsize::new(0)),
            max_concurrency,
            max_capacity,
            on_processing: None,
        })
    }

    /// No queue: invocations beyond `max_concurrency` are rejected outright.
    pub fn without_queue(max_concurrency: usize) -> Result<Self, BulkheadBuildError> {
        Self::new(max_concurrency, max_concurrency)
    }

    /// Called with the live invocation count when a permit is granted.
    pub fn on_processing<F>(mut self, callback: F) -> Self
    where
        F: Fn(usize) + Send + Sync + 'static,
    {
        self.on_processing = Some(Arc::new(callback));
        self
    }

    pub fn max_concurrency(&self) -> usize {
        self.max_concurrency
    }

    pub fn max_capacity(&self) -> usize {
        self.max_capacity
    }
}

struct Occupancy(Arc<AtomicUsize>);

impl Drop for Occupancy {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

#[async_trait]
impl<I, T, E> Middleware<I, T, E> for Bulkhead
where
    I: Send + Sync + 'static,
    T: Send + 'static,
    E: Send + Sync + 'static,
{
    async fn handle(&self, input: I, next: Next<'_, I, T, E>) -> Result<T, ResilienceError<E>> {
        let occupied = self.in_flight.fetch_add(1, Ordering::AcqRel);
        if occupied >= self.max_capacity {
            self.in_flight.fetch_sub(1, Ordering::AcqRel);
            return Err(ResilienceError::CapacityFull {
                in_flight: occupied,
                capacity: self.max_capacity,
            });
        }
        // Decrements on every exit, including cancellation while queued.
        let _occupancy = Occupancy(Arc::clone(&self.in_flight));

        let permit = tokio::select! {
            biased;
            permit = self.permits.acquire() => {
                permit.expect("bulkhead semaphore is never closed")
            }
            _ = next.token().cancelled() => return Err(ResilienceError::Aborted),
        };

        if let Some(callback) = &self.on_processing {
            let available = self.permits.available_permits();
            callback(self.max_concurrency.saturating_sub(available));
        }

        let result = next.run(input).await;
        drop(permit);
        result
    }
}
