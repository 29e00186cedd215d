//! Retry middleware with backoff and a retry predicate.

use crate::backoff::Backoff;
use crate::error::{ResilienceError, MAX_RETRY_FAILURES};
use crate::hooks::{Middleware, Next};
use crate::time::{Sleeper, TimeSpan, TokioSleeper};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

/// Retries the rest of the pipeline on failures the predicate accepts.
///
/// Only `Inner` failures are candidates; timeouts, capacity rejections,
/// breaker refusals, and cancellation all propagate immediately. On
/// exhaustion the pipeline fails with `RetryExhausted`, wrapping the (capped)
/// failure history.
pub struct Retry<E> {
    max_attempts: u32,
    backoff: Backoff,
    retry_if: Arc<dyn Fn(&E) -> bool + Send + Sync>,
    on_attempt: Option<Arc<dyn Fn(u32) + Send + Sync>>,
    on_delay: Option<Arc<dyn Fn(u32, Duration) + Send + Sync>>,
    sleeper: Arc<dyn Sleeper>,
}

impl<E> Clone for Retry<E> {
    fn clone(&self) -> Self {
        Self {
            max_attempts: self.max_attempts,
            backoff: self.backoff.clone(),
            retry_if: Arc::clone(&self.retry_if),
            on_attempt: self.on_attempt.clone(),
            on_delay: self.on_delay.clone(),
            sleeper: Arc::clone(&self.sleeper),
        }
    }
}

impl<E> std::fmt::Debug for Retry<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Retry")
            .field("max_attempts", &self.max_attempts)
            .field("backoff", &self.backoff)
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryBuildError {
    InvalidMaxAttempts(u32),
}

impl std::fmt::Display for RetryBuildError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RetryBuildError::InvalidMaxAttempts(n) => {
                write!(f, "max_attempts must be > 0 (got {})", n)
            }
        }
    }
}

impl std::error::Error for RetryBuildError {}

impl<E> Retry<E>
where
    E: Send + Sync + 'static,
{
    pub fn builder() -> RetryBuilder<E> {
        RetryBuilder::new()
    }

    /// Retry with defaults: 4 attempts, exponential backoff from one second.
    pub fn default_policy() -> Self {
        RetryBuilder::new().build()
    }
}

pub struct RetryBuilder<E> {
    max_attempts: u32,
    backoff: Backoff,
    retry_if: Arc<dyn Fn(&E) -> bool + Send + Sync>,
    on_attempt: Option<Arc<dyn Fn(u32) + Send + Sync>>,
    on_delay: Option<Arc<dyn Fn(u32, Duration) + Send + Sync>>,
    sleeper: Arc<dyn Sleeper>,
}

impl<E> std::fmt::Debug for RetryBuilder<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryBuilder")
            .field("max_attempts", &self.max_attempts)
            .field("backoff", &self.backoff)
            .finish_non_exhaustive()
    }
}

impl<E> RetryBuilder<E>
where
    E: Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self {
            max_attempts: 4,
            backoff: Backoff::exponential(TimeSpan::from_secs(1), 2.0),
            retry_if: Arc::new(|_| true),
            on_attempt: None,
            on_delay: None,
            sleeper: Arc::new(TokioSleeper),
        }
    }

    pub fn max_attempts(mut self, attempts: u32) -> Result<Self, RetryBuildError> {
        if attempts == 0 {
            return Err(RetryBuildError::InvalidMaxAttempts(attempts));
        }
        self.max_attempts = attempts;
        Ok(self)
    }

    pub fn backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    /// Only failures satisfying `predicate` are retried.
    pub fn retry_if<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&E) -> bool + Send + Sync + 'static,
    {
        self.retry_if = Arc::new(predicate);
        self
    }

    /// Called before every attempt with the 1-indexed attempt number.
    pub fn on_attempt<F>(mut self, callback: F) -> Self
    where
        F: Fn(u32) + Send + Sync + 'static,
    {
        self.on_attempt = Some(Arc::new(callback));
        self
    }

    /// Called before every backoff sleep with the attempt number and delay.
    pub fn on_delay<F>(mut self, callback: F) -> Self
    where
        F: Fn(u32, Duration) + Send + Sync + 'static,
    {
        self.on_delay = Some(Arc::new(callback));
        self
    }

    pub fn with_sleeper<S>(mut self, sleeper: S) -> Self
    where
        S: Sleeper + 'static,
    {
        self.sleeper = Arc::new(sleeper);
        self
    }

    pub fn build(self) -> Retry<E> {
        Retry {
            max_attempts: self.max_attempts,
            backoff: self.backoff,
            retry_if: self.retry_if,
            on_attempt: self.on_attempt,
            on_delay: self.on_delay,
            sleeper: self.sleeper,
        }
    }
}

impl<E> Default for RetryBuilder<E>
where
    E: Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<I, T, E> Middleware<I, T, E> for Retry<E>
where
    I: Clone + Send + Sync + 'static,
    T: Send + 'static,
    E: Send + Sync + 'static,
{
    async fn handle(&self, input: I, next: Next<'_, I, T, E>) -> Result<T, ResilienceError<E>> {
        let mut failures = Vec::new();

        for attempt in 1..=self.max_attempts {
            if let Some(callback) = &self.on_attempt {
                callback(attempt);
            }

            match next.run(input.clone()).await {
                Ok(value) => return Ok(value),
                Err(ResilienceError::Inner(error)) => {
                    if !(self.retry_if)(&error) {
                        return Err(ResilienceError::Inner(error));
                    }

                    failures.push(error);
                    if failures.len() > MAX_RETRY_FAILURES {
                        let excess = failures.len() - MAX_RETRY_FAILURES;
                        failures.drain(0..excess);
                    }

                    if attempt >= self.max_attempts {
                        return Err(ResilienceError::RetryExhausted {
                            attempts: self.max_attempts,
                            failures,
                        });
                    }

                    let delay = self.backoff.delay(attempt).to_duration();
                    if let Some(callback) = &self.on_delay {
                        callback(attempt, delay);
                    }

                    tokio::select! {
                        biased;
                        _ = self.sleeper.sleep(delay) => {}
                        _ = next.token().cancelled() => return Err(ResilienceError::Aborted),
                    }
                }
                // Timeout, CapacityFull, CircuitOpen, Adapter, Aborted: not retried.
                Err(other) => return Err(other),
            }
        }

        unreachable!("retry loop returns before exhausting attempts")
    }
}
