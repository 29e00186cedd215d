//! In-memory circuit breaker storage.

use super::{
    apply_transition, BreakerPolicy, BreakerRecord, CircuitBreakerAdapter, CircuitState, Transition,
};
use crate::error::AdapterError;
use crate::time::{Clock, MonotonicClock};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Reference adapter: one [`BreakerRecord`] per key behind a mutex.
///
/// The table lock is never held across an await point, so every operation is
/// linearizable per key (and in fact per table).
pub struct MemoryCircuitBreakerAdapter {
    policy: Arc<dyn BreakerPolicy>,
    clock: Arc<dyn Clock>,
    records: Mutex<HashMap<String, BreakerRecord>>,
}

impl std::fmt::Debug for MemoryCircuitBreakerAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryCircuitBreakerAdapter").field("policy", &self.policy).finish()
    }
}

impl MemoryCircuitBreakerAdapter {
    pub fn new(policy: impl BreakerPolicy + 'static) -> Self {
        Self::with_clock(policy, MonotonicClock::default())
    }

    /// Override the clock (deterministic tests).
    pub fn with_clock(policy: impl BreakerPolicy + 'static, clock: impl Clock + 'static) -> Self {
        Self {
            policy: Arc::new(policy),
            clock: Arc::new(clock),
            records: Mutex::new(HashMap::new()),
        }
    }

    fn with_record<R>(&self, key: &str, f: impl FnOnce(&mut BreakerRecord, u64) -> R) -> R {
        let now = self.clock.now_millis();
        let mut records = self
            .records
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let record = records.entry(key.to_string()).or_default();
        f(record, now)
    }
}

#[async_trait]
impl CircuitBreakerAdapter for MemoryCircuitBreakerAdapter {
    async fn state(&self, key: &str) -> Result<CircuitState, AdapterError> {
        let now = self.clock.now_millis();
        let records = self
            .records
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        // Read-only view of what update_state would decide right now.
        Ok(records
            .get(key)
            .map(|record| self.policy.evaluate(record, now))
            .unwrap_or(CircuitState::Closed))
    }

    async fn track_failure(&self, key: &str) -> Result<(), AdapterError> {
        self.with_record(key, |record, _| self.policy.record_failure(record));
        Ok(())
    }

    async fn track_success(&self, key: &str) -> Result<(), AdapterError> {
        self.with_record(key, |record, _| self.policy.record_success(record));
        Ok(())
    }

    async fn update_state(&self, key: &str) -> Result<Transition, AdapterError> {
        Ok(self.with_record(key, |record, now| {
            let target = self.policy.evaluate(record, now);
            apply_transition(record, target, now)
        }))
    }

    async fn isolate(&self, key: &str) -> Result<(), AdapterError> {
        self.with_record(key, |record, now| {
            apply_transition(record, CircuitState::Isolated, now);
        });
        Ok(())
    }

    async fn reset(&self, key: &str) -> Result<(), AdapterError> {
        let mut records = self
            .records
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        // Absent record == pristine Closed, so dropping the entry is the GC.
        records.remove(key);
        Ok(())
    }
}
