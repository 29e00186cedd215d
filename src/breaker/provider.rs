//! Circuit breaker provider and per-key handles.

use super::{CircuitBreakerAdapter, CircuitState, Transition};
use crate::error::BreakerError;
use crate::key::{Key, KeyError, Namespace};
use std::sync::Arc;

/// Creates per-key [`CircuitBreaker`] handles over one adapter and namespace.
pub struct CircuitBreakerProvider {
    adapter: Arc<dyn CircuitBreakerAdapter>,
    namespace: Namespace,
}

impl std::fmt::Debug for CircuitBreakerProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CircuitBreakerProvider").field("namespace", &self.namespace).finish()
    }
}

pub struct CircuitBreakerProviderBuilder {
    adapter: Arc<dyn CircuitBreakerAdapter>,
    namespace: Option<Namespace>,
}

impl CircuitBreakerProviderBuilder {
    pub fn namespace(mut self, namespace: Namespace) -> Self {
        self.namespace = Some(namespace);
        self
    }

    pub fn build(self) -> Result<CircuitBreakerProvider, KeyError> {
        let namespace = match self.namespace {
            Some(namespace) => namespace,
            None => Namespace::new("circuit-breaker")?,
        };
        Ok(CircuitBreakerProvider { adapter: self.adapter, namespace })
    }
}

impl CircuitBreakerProvider {
    pub fn builder(adapter: impl CircuitBreakerAdapter + 'static) -> CircuitBreakerProviderBuilder {
        CircuitBreakerProviderBuilder { adapter: Arc::new(adapter), namespace: None }
    }

    /// A handle for `key`. Handles are cheap and clone-safe.
    pub fn create(&self, key: &str) -> Result<CircuitBreaker, BreakerError> {
        let key = Key::parse(key)?;
        Ok(CircuitBreaker {
            adapter: Arc::clone(&self.adapter),
            key: self.namespace.qualify(&key),
        })
    }
}

/// Per-key circuit breaker handle.
#[derive(Clone)]
pub struct CircuitBreaker {
    adapter: Arc<dyn CircuitBreakerAdapter>,
    key: String,
}

impl std::fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CircuitBreaker").field("key", &self.key).finish()
    }
}

impl CircuitBreaker {
    pub fn key(&self) -> &str {
        &self.key
    }

    /// The state the policy computes for "now" (no transition is persisted).
    pub async fn state(&self) -> Result<CircuitState, BreakerError> {
        Ok(self.adapter.state(&self.key).await?)
    }

    pub async fn track_failure(&self) -> Result<(), BreakerError> {
        Ok(self.adapter.track_failure(&self.key).await?)
    }

    pub async fn track_success(&self) -> Result<(), BreakerError> {
        Ok(self.adapter.track_success(&self.key).await?)
    }

    /// Apply the policy's transition and report where the record moved.
    pub async fn update_state(&self) -> Result<Transition, BreakerError> {
        Ok(self.adapter.update_state(&self.key).await?)
    }

    /// Force the key into `Isolated` regardless of traffic.
    pub async fn isolate(&self) -> Result<(), BreakerError> {
        Ok(self.adapter.isolate(&self.key).await?)
    }

    /// Clear counters and return to `Closed`.
    pub async fn reset(&self) -> Result<(), BreakerError> {
        Ok(self.adapter.reset(&self.key).await?)
    }
}
