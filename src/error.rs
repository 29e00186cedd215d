//! Error types for resilience policies and coordination primitives.

use crate::breaker::CircuitState;
use crate::key::KeyError;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Cap the number of stored failures inside `RetryExhausted` to avoid unbounded growth.
pub const MAX_RETRY_FAILURES: usize = 10;

/// Opaque driver/transport error raised by a storage adapter.
///
/// Cheap to clone; the underlying cause is shared behind an `Arc` so the
/// error can flow through memoized tasks and multi-listener events.
#[derive(Debug, Clone)]
pub struct AdapterError {
    cause: Arc<dyn std::error::Error + Send + Sync>,
}

impl AdapterError {
    pub fn new(cause: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self { cause: Arc::new(cause) }
    }

    pub fn msg(message: impl Into<String>) -> Self {
        Self { cause: Arc::new(Message(message.into())) }
    }
}

#[derive(Debug)]
struct Message(String);

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for Message {}

impl fmt::Display for AdapterError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "adapter error: {}", self.cause)
    }
}

impl std::error::Error for AdapterError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(self.cause.as_ref())
    }
}

impl PartialEq for AdapterError {
    fn eq(&self, other: &Self) -> bool {
        self.cause.to_string() == other.cause.to_string()
    }
}

/// Unified error type for resilience pipelines.
#[derive(Debug)]
pub enum ResilienceError<E> {
    /// The operation exceeded the timeout duration.
    Timeout { elapsed: Duration, timeout: Duration },
    /// The bulkhead rejected the operation: live plus queued work is at capacity.
    CapacityFull { in_flight: usize, capacity: usize },
    /// The circuit breaker refused the call without invoking the operation.
    CircuitOpen { state: CircuitState },
    /// All retry attempts were exhausted.
    RetryExhausted { attempts: u32, failures: Vec<E> },
    /// The invocation was cancelled. Never retried, never replaced by a fallback.
    Aborted,
    /// A storage driver failed underneath a primitive.
    Adapter(AdapterError),
    /// The underlying operation failed.
    Inner(E),
}

impl<E: Clone> Clone for ResilienceError<E> {
    fn clone(&self) -> Self {
        match self {
            Self::Timeout { elapsed, timeout } => {
                Self::Timeout { elapsed: *elapsed, timeout: *timeout }
            }
            Self::CapacityFull { in_flight, capacity } => {
                Self::CapacityFull { in_flight: *in_flight, capacity: *capacity }
            }
            Self::CircuitOpen { state } => Self::CircuitOpen { state: *state },
            Self::RetryExhausted { attempts, failures } => {
                Self::RetryExhausted { attempts: *attempts, failures: failures.clone() }
            }
            Self::Aborted => Self::Aborted,
            Self::Adapter(e) => Self::Adapter(e.clone()),
            Self::Inner(e) => Self::Inner(e.clone()),
        }
    }
}

impl<E: PartialEq> PartialEq for ResilienceError<E> {
    fn eq(&self, other: &Self) -> bool {
        use ResilienceError::*;
        match (self, other) {
            (Timeout { elapsed: a1, timeout: b1 }, Timeout { elapsed: a2, timeout: b2 }) => {
                a1 == a2 && b1 == b2
            }
            (
                CapacityFull { in_flight: a1, capacity: b1 },
                CapacityFull { in_flight: a2, capacity: b2 },
            ) => a1 == a2 && b1 == b2,
            (CircuitOpen { state: s1 }, CircuitOpen { state: s2 }) => s1 == s2,
            (
                RetryExhausted { attempts: a1, failures: f1 },
                RetryExhausted { attempts: a2, failures: f2 },
            ) => a1 == a2 && f1 == f2,
            (Aborted, Aborted) => true,
            (Adapter(e1), Adapter(e2)) => e1 == e2,
            (Inner(e1), Inner(e2)) => e1 == e2,
            _ => false,
        }
    }
}

impl<E: fmt::Display> fmt::Display for ResilienceError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Timeout { elapsed, timeout } => {
                write!(f, "operation timed out after {:?} (limit: {:?})", elapsed, timeout)
            }
            Self::CapacityFull { in_flight, capacity } => {
                write!(f, "bulkhead rejected request ({} in flight, capacity {})", in_flight, capacity)
            }
            Self::CircuitOpen { state } => {
                write!(f, "circuit breaker refused the call (state: {})", state)
            }
            Self::RetryExhausted { attempts, failures } => {
                let last = failures.last().map(|e| e.to_string()).unwrap_or_default();
                write!(
                    f,
                    "retry exhausted after {} attempts ({} failures recorded), last error: {}",
                    attempts,
                    failures.len(),
                    last
                )
            }
            Self::Aborted => write!(f, "operation was cancelled"),
            Self::Adapter(e) => write!(f, "{}", e),
            Self::Inner(e) => write!(f, "{}", e),
        }
    }
}

impl<E: std::error::Error + 'static> std::error::Error for ResilienceError<E> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Inner(e) => Some(e),
            Self::Adapter(e) => Some(e),
            Self::RetryExhausted { failures, .. } => {
                failures.last().map(|e| e as &dyn std::error::Error)
            }
            _ => None,
        }
    }
}

impl<E> ResilienceError<E> {
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    pub fn is_circuit_open(&self) -> bool {
        matches!(self, Self::CircuitOpen { .. })
    }

    pub fn is_capacity_full(&self) -> bool {
        matches!(self, Self::CapacityFull { .. })
    }

    pub fn is_retry_exhausted(&self) -> bool {
        matches!(self, Self::RetryExhausted { .. })
    }

    pub fn is_aborted(&self) -> bool {
        matches!(self, Self::Aborted)
    }

    pub fn is_inner(&self) -> bool {
        matches!(self, Self::Inner(_))
    }

    /// Get the inner error if this is an `Inner` variant.
    pub fn into_inner(self) -> Option<E> {
        match self {
            Self::Inner(e) => Some(e),
            _ => None,
        }
    }

    /// Borrow the inner error if present.
    pub fn as_inner(&self) -> Option<&E> {
        match self {
            Self::Inner(e) => Some(e),
            _ => None,
        }
    }

    /// Access all recorded failures for `RetryExhausted`, if present.
    pub fn failures(&self) -> Option<&[E]> {
        match self {
            Self::RetryExhausted { failures, .. } => Some(failures.as_slice()),
            _ => None,
        }
    }
}

/// Errors raised by distributed lock handles.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum LockError {
    #[error("failed to acquire lock `{key}`: held by another owner")]
    FailedAcquire { key: String },
    #[error("failed to release lock `{key}`: caller is not the owner")]
    FailedRelease { key: String },
    #[error("failed to refresh lock `{key}`: caller is not the owner or the lock is unexpireable")]
    FailedRefresh { key: String },
    #[error("invalid lock key")]
    Key(#[from] KeyError),
    #[error(transparent)]
    Adapter(#[from] AdapterError),
}

/// Errors raised by distributed semaphore handles.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum SemaphoreError {
    #[error("failed to acquire slot on semaphore `{key}`: limit of {limit} reached")]
    LimitReached { key: String, limit: u32 },
    #[error("failed to release slot on semaphore `{key}`: caller holds no slot")]
    FailedRelease { key: String },
    #[error("failed to refresh slot on semaphore `{key}`: no live, expireable slot for caller")]
    FailedRefresh { key: String },
    #[error("invalid semaphore key")]
    Key(#[from] KeyError),
    #[error(transparent)]
    Adapter(#[from] AdapterError),
}

/// Errors raised by shared (reader/writer) lock handles.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum SharedLockError {
    #[error("failed to acquire writer on `{key}`: readers or another writer present")]
    FailedAcquireWriter { key: String },
    #[error("failed to release writer on `{key}`: caller is not the writer")]
    FailedReleaseWriter { key: String },
    #[error("failed to refresh writer on `{key}`: caller is not the writer or the lock is unexpireable")]
    FailedRefreshWriter { key: String },
    #[error("failed to acquire reader on `{key}`: writer present or reader limit reached")]
    FailedAcquireReader { key: String },
    #[error("failed to release reader on `{key}`: caller holds no reader slot")]
    FailedReleaseReader { key: String },
    #[error("failed to refresh reader on `{key}`: no live, expireable reader slot for caller")]
    FailedRefreshReader { key: String },
    #[error("invalid shared lock key")]
    Key(#[from] KeyError),
    #[error(transparent)]
    Adapter(#[from] AdapterError),
}

/// Errors raised by circuit breaker handles.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum BreakerError {
    #[error("invalid circuit breaker key")]
    Key(#[from] KeyError),
    #[error(transparent)]
    Adapter(#[from] AdapterError),
}
