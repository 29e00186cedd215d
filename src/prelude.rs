//! Convenient re-exports for common Latchkey types.
pub use crate::{
    backoff::Backoff,
    blocking::BlockingOptions,
    breaker::{
        BreakerGate, CircuitBreaker, CircuitBreakerProvider, CircuitState, ConsecutivePolicy,
        MemoryCircuitBreakerAdapter,
    },
    bus::EventBus,
    error::{
        AdapterError, BreakerError, LockError, ResilienceError, SemaphoreError, SharedLockError,
    },
    hooks::{Context, Hooks},
    key::{Key, Namespace},
    lock::{Lock, LockEvent, LockOptions, LockProvider, MemoryLockAdapter},
    middleware::{Bulkhead, Fallback, Hedge, Observe, Retry, Timeout},
    semaphore::{
        MemorySemaphoreAdapter, Semaphore, SemaphoreEvent, SemaphoreOptions, SemaphoreProvider,
        SemaphoreState,
    },
    shared::{MemorySharedLockAdapter, SharedLock, SharedLockOptions, SharedLockProvider},
    task::Task,
    time::TimeSpan,
};
