#![forbid(unsafe_code)]

//! # Latchkey
//!
//! Distributed coordination primitives and composable resilience for async
//! Rust.
//!
//! ## Features
//!
//! - **Distributed lock**: owner-fenced, TTL-refreshable, with blocking
//!   acquisition and critical-section helpers
//! - **Counting semaphore**: bounded slots with per-slot TTLs and
//!   first-write-wins limits
//! - **Shared lock**: many readers or one writer, never both
//! - **Circuit breaker**: closed/open/half-open/isolated state machine with
//!   backoff-driven recovery, storage-adapter independent
//! - **Resilience pipeline**: retry, fallback, bulkhead, observe, timeout,
//!   and hedging middlewares composed around any async operation
//! - **Pluggable drivers**: every primitive is defined against an adapter
//!   contract with an in-memory reference driver and a public conformance
//!   suite for third-party implementations
//!
//! ## Quick Start
//!
//! ```rust
//! use latchkey::prelude::*;
//! use std::time::Duration;
//!
//! # #[derive(Debug, Clone)]
//! # struct UpstreamError;
//! # impl std::fmt::Display for UpstreamError {
//! #     fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
//! #         write!(f, "upstream failed")
//! #     }
//! # }
//! # impl std::error::Error for UpstreamError {}
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Coordination: a distributed lock over the in-memory driver.
//!     let locks = LockProvider::builder(MemoryLockAdapter::new())
//!         .default_ttl(Duration::from_secs(30))
//!         .build()?;
//!     let lock = locks.create("jobs/nightly-etl")?;
//!     let report = lock.run(async { "report built" }).await?;
//!     assert_eq!(report, "report built");
//!
//!     // Resilience: a retried, time-bounded deferred computation.
//!     let task: Task<u32, UpstreamError> = Task::new(|()| async { Ok(42) })
//!         .pipe(Retry::builder().max_attempts(3)?.build())
//!         .pipe(Timeout::new(Duration::from_secs(2))?);
//!     assert_eq!(task.run().await?, 42);
//!     Ok(())
//! }
//! ```

pub mod backoff;
pub mod blocking;
pub mod breaker;
pub mod bus;
pub mod conformance;
pub mod error;
pub mod hooks;
pub mod invokable;
pub mod key;
pub mod lazy;
pub mod lock;
pub mod middleware;
pub mod semaphore;
pub mod shared;
pub mod task;
pub mod time;

// Re-exports
pub use backoff::Backoff;
pub use blocking::{BlockingOptions, ProviderBuildError};
pub use breaker::{
    BreakerGate, BreakerPolicy, CircuitBreaker, CircuitBreakerAdapter, CircuitBreakerProvider,
    CircuitState, ConsecutivePolicy, MemoryCircuitBreakerAdapter,
};
pub use bus::EventBus;
pub use error::{
    AdapterError, BreakerError, LockError, ResilienceError, SemaphoreError, SharedLockError,
};
pub use hooks::{Context, Hooks, Middleware, Next};
pub use invokable::Invokable;
pub use key::{Key, KeyError, Namespace};
pub use lazy::{AsyncLazy, Lazy};
pub use lock::{Lock, LockAdapter, LockEvent, LockProvider, LockState, MemoryLockAdapter};
pub use middleware::{Bulkhead, Fallback, Hedge, Observe, Retry, Timeout};
pub use semaphore::{
    MemorySemaphoreAdapter, Semaphore, SemaphoreAdapter, SemaphoreEvent, SemaphoreProvider,
    SemaphoreState,
};
pub use shared::{
    MemorySharedLockAdapter, SharedLock, SharedLockAdapter, SharedLockProvider, SharedLockState,
};
pub use task::Task;
pub use time::{Clock, ManualClock, MonotonicClock, Sleeper, TimeSpan, TokioSleeper};

pub mod prelude;
