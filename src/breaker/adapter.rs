//! The storage contract circuit breaker drivers must implement.

use super::{CircuitState, Transition};
use crate::error::AdapterError;
use async_trait::async_trait;

/// Per-key circuit breaker storage.
///
/// Implementations persist one [`BreakerRecord`](super::BreakerRecord) per
/// key and delegate counting and transition decisions to a
/// [`BreakerPolicy`](super::BreakerPolicy). Each method must be atomic and
/// linearizable per key.
///
/// Contract:
/// - `state` reports the state the policy computes for "now" without
///   persisting a transition.
/// - `track_failure` / `track_success` create the record on first touch and
///   fold the outcome into its counters.
/// - `update_state` applies the policy's transition (time- and
///   counter-based) and returns where the record moved.
/// - `isolate` forces `Isolated` from any state.
/// - `reset` clears the record back to pristine `Closed`; adapters may
///   garbage-collect the storage entry.
#[async_trait]
pub trait CircuitBreakerAdapter: Send + Sync {
    async fn state(&self, key: &str) -> Result<CircuitState, AdapterError>;

    async fn track_failure(&self, key: &str) -> Result<(), AdapterError>;

    async fn track_success(&self, key: &str) -> Result<(), AdapterError>;

    async fn update_state(&self, key: &str) -> Result<Transition, AdapterError>;

    async fn isolate(&self, key: &str) -> Result<(), AdapterError>;

    async fn reset(&self, key: &str) -> Result<(), AdapterError>;
}
