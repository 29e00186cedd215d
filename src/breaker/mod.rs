//! Circuit breaker: per-key failure tracking with a pluggable record store.
//!
//! The state machine (closed → open → half-open → closed, plus an
//! operator-forced isolated state) lives in a [`BreakerPolicy`]; storage
//! adapters persist [`BreakerRecord`]s and delegate every counting and
//! transition decision to the policy, so the machine behaves identically over
//! memory, Redis, or SQL.

mod adapter;
mod gate;
mod memory;
mod policy;
mod provider;

pub use adapter::CircuitBreakerAdapter;
pub use gate::BreakerGate;
pub use memory::MemoryCircuitBreakerAdapter;
pub use policy::{BreakerPolicy, ConsecutivePolicy, PolicyBuildError};
pub use provider::{CircuitBreaker, CircuitBreakerProvider, CircuitBreakerProviderBuilder};

/// Observable breaker states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CircuitState {
    /// Calls flow; failures are counted.
    Closed,
    /// Calls are refused until the open-wait elapses.
    Open,
    /// A probe window: successes accumulate toward closing.
    HalfOpen,
    /// Operator-forced refusal; only `reset` leaves this state.
    Isolated,
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            CircuitState::Closed => "closed",
            CircuitState::Open => "open",
            CircuitState::HalfOpen => "half-open",
            CircuitState::Isolated => "isolated",
        };
        write!(f, "{}", s)
    }
}

/// The persisted per-key breaker record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BreakerRecord {
    pub state: CircuitState,
    pub failure_count: u32,
    pub success_count: u32,
    /// Millis timestamp of the last transition to `Open`, if any.
    pub opened_at_millis: Option<u64>,
    /// How many times the breaker has opened since it last fully closed;
    /// indexes the open-wait backoff.
    pub open_attempts: u32,
}

impl Default for BreakerRecord {
    fn default() -> Self {
        Self {
            state: CircuitState::Closed,
            failure_count: 0,
            success_count: 0,
            opened_at_millis: None,
            open_attempts: 0,
        }
    }
}

impl BreakerRecord {
    /// A record indistinguishable from "no record": closed with zero counts.
    pub fn is_pristine(&self) -> bool {
        self == &Self::default()
    }
}

/// The outcome of `update_state`: where the record was and where it is now.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub from: CircuitState,
    pub to: CircuitState,
}

impl Transition {
    pub fn changed(&self) -> bool {
        self.from != self.to
    }
}

/// Apply the bookkeeping for a transition decided by a policy.
///
/// Entering `Open` stamps the time and bumps the open-attempt counter;
/// entering `HalfOpen` clears both counters so only probe traffic counts;
/// entering `Closed` clears everything. A no-op transition leaves the record
/// untouched.
pub fn apply_transition(record: &mut BreakerRecord, to: CircuitState, now_millis: u64) -> Transition {
    let from = record.state;
    if from == to {
        return Transition { from, to };
    }

    record.state = to;
    match to {
        CircuitState::Open => {
            record.opened_at_millis = Some(now_millis);
            record.open_attempts = record.open_attempts.saturating_add(1);
            record.success_count = 0;
        }
        CircuitState::HalfOpen => {
            record.failure_count = 0;
            record.success_count = 0;
        }
        CircuitState::Closed => {
            record.failure_count = 0;
            record.success_count = 0;
            record.opened_at_millis = None;
            record.open_attempts = 0;
        }
        CircuitState::Isolated => {}
    }

    match to {
        CircuitState::Open => tracing::warn!(from = %from, "circuit breaker opened"),
        CircuitState::HalfOpen => tracing::info!("circuit breaker half-open"),
        CircuitState::Closed => tracing::info!(from = %from, "circuit breaker closed"),
        CircuitState::Isolated => tracing::warn!(from = %from, "circuit breaker isolated"),
    }

    Transition { from, to }
}
