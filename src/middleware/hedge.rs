//! Hedging middleware: race a delayed secondary attempt against a slow primary.

use crate::error::ResilienceError;
use crate::hooks::{Middleware, Next};
use async_trait::async_trait;
use std::time::Duration;

/// Starts a second attempt after `delay` if the primary hasn't finished.
///
/// The first successful outcome wins and the loser's token is cancelled. A
/// primary that *fails* before the hedge delay returns immediately; hedging
/// protects against slowness, it is not a retry. If both attempts fail, the
/// primary's error is returned.
#[derive(Debug, Clone, Copy)]
pub struct Hedge {
    delay: Duration,
}

impl Hedge {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }
}

#[async_trait]
impl<I, T, E> Middleware<I, T, E> for Hedge
where
    I: Clone + Send + Sync + 'static,
    T: Send + 'static,
    E: Send + Sync + 'static,
{
    async fn handle(&self, input: I, next: Next<'_, I, T, E>) -> Result<T, ResilienceError<E>> {
        let primary_token = next.token().child_token();
        let secondary_token = next.token().child_token();

        let primary_next = next.clone().with_token(primary_token.clone());
        let primary = primary_next.run(input.clone());
        tokio::pin!(primary);

        // Phase one: primary against the hedge timer.
        tokio::select! {
            biased;
            outcome = &mut primary => return outcome,
            _ = tokio::time::sleep(self.delay) => {}
        }

        // Phase two: both attempts race; first success wins.
        let secondary_next = next.clone().with_token(secondary_token.clone());
        let secondary = secondary_next.run(input);
        tokio::pin!(secondary);

        let mut primary_error: Option<ResilienceError<E>> = None;
        let mut secondary_error: Option<ResilienceError<E>> = None;

        loop {
            tokio::select! {
                outcome = &mut primary, if primary_error.is_none() => match outcome {
                    Ok(value) => {
                        secondary_token.cancel();
                        return Ok(value);
                    }
                    Err(error) => primary_error = Some(error),
                },
                outcome = &mut secondary, if secondary_error.is_none() => match outcome {
                    Ok(value) => {
                        primary_token.cancel();
                        return Ok(value);
                    }
                    Err(error) => secondary_error = Some(error),
                },
            }

            match (primary_error.take(), secondary_error.take()) {
                (Some(primary_failure), Some(_)) => return Err(primary_failure),
                (p, s) => {
                    primary_error = p;
                    secondary_error = s;
                }
            }
        }
    }
}
