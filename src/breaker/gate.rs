//! Circuit breaker as a pipeline middleware.

use super::{CircuitBreaker, CircuitState};
use crate::error::{AdapterError, ResilienceError};
use crate::hooks::{Middleware, Next};
use async_trait::async_trait;

/// Gates the rest of the pipeline behind a [`CircuitBreaker`] handle.
///
/// Before each call the breaker's pending time-based transition is applied;
/// `Closed` and `HalfOpen` let the call through and fold its outcome back
/// into the record, while `Open` and `Isolated` short-circuit with
/// `CircuitOpen`. Cancellation is not counted as a service failure.
#[derive(Debug, Clone)]
pub struct BreakerGate {
    breaker: CircuitBreaker,
}

impl BreakerGate {
    pub fn new(breaker: CircuitBreaker) -> Self {
        Self { breaker }
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }
}

fn storage_failure<E>(error: crate::error::BreakerError) -> ResilienceError<E> {
    ResilienceError::Adapter(AdapterError::new(error))
}

#[async_trait]
impl<I, T, E> Middleware<I, T, E> for BreakerGate
where
    I: Send + Sync + 'static,
    T: Send + 'static,
    E: Send + Sync + 'static,
{
    async fn handle(&self, input: I, next: Next<'_, I, T, E>) -> Result<T, ResilienceError<E>> {
        let transition = self.breaker.update_state().await.map_err(storage_failure)?;

        match transition.to {
            CircuitState::Open | CircuitState::Isolated => {
                Err(ResilienceError::CircuitOpen { state: transition.to })
            }
            CircuitState::Closed | CircuitState::HalfOpen => {
                let result = next.run(input).await;
                match &result {
                    Ok(_) => self.breaker.track_success().await.map_err(storage_failure)?,
                    Err(ResilienceError::Aborted) => {}
                    Err(_) => self.breaker.track_failure().await.map_err(storage_failure)?,
                }
                self.breaker.update_state().await.map_err(storage_failure)?;
                result
            }
        }
    }
}
