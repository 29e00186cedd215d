//! Fallback middleware: replace matching failures with a substitute value.

use crate::error::ResilienceError;
use crate::hooks::{Middleware, Next};
use crate::lazy::Lazy;
use async_trait::async_trait;
use std::sync::Arc;

enum Source<T> {
    Eager(T),
    Lazy(Arc<Lazy<T>>),
}

impl<T: Clone> Source<T> {
    fn produce(&self) -> T {
        match self {
            Source::Eager(value) => value.clone(),
            Source::Lazy(lazy) => lazy.force().clone(),
        }
    }
}

/// Replaces failures accepted by the predicate with a fallback value.
///
/// The default predicate accepts every failure; cancellation is exempt
/// unconditionally, so an aborted pipeline is never papered over with a
/// substitute value.
pub struct Fallback<T, E> {
    source: Source<T>,
    applies_if: Arc<dyn Fn(&ResilienceError<E>) -> bool + Send + Sync>,
    on_fallback: Option<Arc<dyn Fn(&ResilienceError<E>) + Send + Sync>>,
}

impl<T, E> Fallback<T, E>
where
    T: Clone + Send + Sync + 'static,
    E: Send + Sync + 'static,
{
    /// Fall back to an eager value.
    pub fn value(value: T) -> Self {
        Self { source: Source::Eager(value), applies_if: Arc::new(|_| true), on_fallback: None }
    }

    /// Fall back to a lazily computed (once) value.
    pub fn lazy(init: impl FnOnce() -> T + Send + 'static) -> Self {
        Self {
            source: Source::Lazy(Arc::new(Lazy::new(init))),
            applies_if: Arc::new(|_| true),
            on_fallback: None,
        }
    }

    /// Restrict which failures are replaced.
    pub fn applies_if<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&ResilienceError<E>) -> bool + Send + Sync + 'static,
    {
        self.applies_if = Arc::new(predicate);
        self
    }

    /// Called with the suppressed failure whenever the fallback engages.
    pub fn on_fallback<F>(mut self, callback: F) -> Self
    where
        F: Fn(&ResilienceError<E>) + Send + Sync + 'static,
    {
        self.on_fallback = Some(Arc::new(callback));
        self
    }
}

#[async_trait]
impl<I, T, E> Middleware<I, T, E> for Fallback<T, E>
where
    I: Send + Sync + 'static,
    T: Clone + Send + Sync + 'static,
    E: Send + Sync + 'static,
{
    async fn handle(&self, input: I, next: Next<'_, I, T, E>) -> Result<T, ResilienceError<E>> {
        match next.run(input).await {
            Ok(value) => Ok(value),
            Err(error) if !error.is_aborted() && (self.applies_if)(&error) => {
                if let Some(callback) = &self.on_fallback {
                    callback(&error);
                }
                Ok(self.source.produce())
            }
            Err(error) => Err(error),
        }
    }
}
