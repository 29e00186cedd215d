//! Timeout middleware: bound the duration of the rest of the pipeline.
//!
//! On expiry the inner layers' cancellation token is cancelled, so work that
//! cooperates with the token (adapter waits, `Task::delay`, bulkhead queues)
//! stops promptly; the inner future itself is dropped either way.

use crate::error::ResilienceError;
use crate::hooks::{Middleware, Next};
use async_trait::async_trait;
use std::time::Duration;
use tokio::time::Instant;

/// Maximum allowed timeout duration (30 days), guarding against accidental
/// `u64::MAX`-style configs while permitting long jobs.
pub const MAX_TIMEOUT: Duration = Duration::from_secs(30 * 24 * 60 * 60);

/// Errors returned when configuring timeouts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeoutError {
    /// Duration must be greater than zero.
    ZeroDuration,
    /// Duration exceeded the configured maximum.
    ExceedsMaximum { requested: Duration, limit: Duration },
}

impl std::fmt::Display for TimeoutError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TimeoutError::ZeroDuration => write!(f, "timeout duration must be > 0"),
            TimeoutError::ExceedsMaximum { requested, limit } => write!(
                f,
                "timeout duration {:?} exceeds maximum allowed {:?}; use new_with_max to override",
                requested, limit
            ),
        }
    }
}

impl std::error::Error for TimeoutError {}

/// Races the rest of the pipeline against a timer.
#[derive(Debug, Clone, Copy)]
pub struct Timeout {
    duration: Duration,
}

impl Timeout {
    /// Create a timeout middleware.
    ///
    /// # Errors
    ///
    /// Returns [`TimeoutError::ZeroDuration`] for a zero duration and
    /// [`TimeoutError::ExceedsMaximum`] beyond [`MAX_TIMEOUT`].
    #[must_use = "the result must be checked for validation errors"]
    pub fn new(duration: Duration) -> Result<Self, TimeoutError> {
        Self::new_with_max(duration, MAX_TIMEOUT)
    }

    /// Construct with a caller-specified maximum allowed timeout.
    pub fn new_with_max(duration: Duration, max: Duration) -> Result<Self, TimeoutError> {
        if duration.is_zero() {
            return Err(TimeoutError::ZeroDuration);
        }
        if duration > max {
            return Err(TimeoutError::ExceedsMaximum { requested: duration, limit: max });
        }
        Ok(Self { duration })
    }

    #[must_use]
    #[inline]
    pub fn duration(&self) -> Duration {
        self.duration
    }
}

#[async_trait]
impl<I, T, E> Middleware<I, T, E> for Timeout
where
    I: Send + Sync + 'static,
    T: Send + 'static,
    E: Send + Sync + 'static,
{
    async fn handle(&self, input: I, next: Next<'_, I, T, E>) -> Result<T, ResilienceError<E>> {
        let child = next.token().child_token();
        let inner = next.clone().with_token(child.clone());
        let start = Instant::now();

        match tokio::time::timeout(self.duration, inner.run(input)).await {
            Ok(result) => result,
            Err(_) => {
                child.cancel();
                Err(ResilienceError::Timeout { elapsed: start.elapsed(), timeout: self.duration })
            }
        }
    }
}
