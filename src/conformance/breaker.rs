//! Contract suite for [`CircuitBreakerAdapter`] implementations.
//!
//! The adapter under test must be configured with a consecutive policy of
//! `failure_threshold = 5`, `success_threshold = 5`, and a constant 50 ms
//! open-wait; the suite drives the canonical closed → open → half-open →
//! closed cycle through the driver operations alone.

use super::unique_key;
use crate::breaker::{CircuitBreakerAdapter, CircuitState};
use std::time::Duration;

/// Assert the breaker driver contract. Panics on the first violation.
pub async fn breaker_contract(adapter: &dyn CircuitBreakerAdapter) {
    full_recovery_cycle(adapter).await;
    success_in_closed_resets(adapter).await;
    isolate_overrides_everything(adapter).await;
    update_state_is_deterministic(adapter).await;
}

async fn full_recovery_cycle(adapter: &dyn CircuitBreakerAdapter) {
    let key = unique_key("breaker/cycle");

    // Five consecutive failures: the last update transitions Closed -> Open.
    for n in 1..=5u32 {
        adapter.track_failure(&key).await.unwrap();
        let transition = adapter.update_state(&key).await.unwrap();
        if n < 5 {
            assert_eq!(transition.to, CircuitState::Closed, "below threshold stays closed");
        } else {
            assert_eq!(transition.from, CircuitState::Closed);
            assert_eq!(transition.to, CircuitState::Open);
        }
    }

    // Before the open-wait elapses the key stays open.
    assert_eq!(adapter.update_state(&key).await.unwrap().to, CircuitState::Open);

    tokio::time::sleep(Duration::from_millis(75)).await;
    let transition = adapter.update_state(&key).await.unwrap();
    assert_eq!(transition.from, CircuitState::Open);
    assert_eq!(transition.to, CircuitState::HalfOpen);

    // Five successes close it; the last update transitions HalfOpen -> Closed.
    for n in 1..=5u32 {
        adapter.track_success(&key).await.unwrap();
        let transition = adapter.update_state(&key).await.unwrap();
        if n < 5 {
            assert_eq!(transition.to, CircuitState::HalfOpen);
        } else {
            assert_eq!(transition.from, CircuitState::HalfOpen);
            assert_eq!(transition.to, CircuitState::Closed);
        }
    }

    adapter.reset(&key).await.unwrap();
}

async fn success_in_closed_resets(adapter: &dyn CircuitBreakerAdapter) {
    let key = unique_key("breaker/reset-streak");

    for _ in 0..4 {
        adapter.track_failure(&key).await.unwrap();
    }
    adapter.track_success(&key).await.unwrap();
    for _ in 0..4 {
        adapter.track_failure(&key).await.unwrap();
    }
    assert_eq!(
        adapter.update_state(&key).await.unwrap().to,
        CircuitState::Closed,
        "a success in Closed must zero the failure streak"
    );
    adapter.reset(&key).await.unwrap();
}

async fn isolate_overrides_everything(adapter: &dyn CircuitBreakerAdapter) {
    let key = unique_key("breaker/isolate");

    adapter.isolate(&key).await.unwrap();
    assert_eq!(adapter.state(&key).await.unwrap(), CircuitState::Isolated);

    // Neither traffic nor time leaves isolation.
    adapter.track_success(&key).await.unwrap();
    adapter.track_failure(&key).await.unwrap();
    tokio::time::sleep(Duration::from_millis(75)).await;
    assert_eq!(adapter.update_state(&key).await.unwrap().to, CircuitState::Isolated);

    adapter.reset(&key).await.unwrap();
    assert_eq!(adapter.state(&key).await.unwrap(), CircuitState::Closed);
}

async fn update_state_is_deterministic(adapter: &dyn CircuitBreakerAdapter) {
    let key = unique_key("breaker/deterministic");

    for _ in 0..5 {
        adapter.track_failure(&key).await.unwrap();
    }
    adapter.update_state(&key).await.unwrap();

    // Repeated updates with unchanged counters and clock stay put.
    for _ in 0..5 {
        let transition = adapter.update_state(&key).await.unwrap();
        assert_eq!(transition.to, CircuitState::Open);
        assert!(!transition.changed());
    }
    adapter.reset(&key).await.unwrap();
}
