//! A deferred async value with attachable resilience.
//!
//! A [`Task`] does nothing until first awaited; the producer then runs exactly
//! once and the outcome is cached for every later await, including awaits
//! through clones. Middlewares attach declaratively via [`Task::pipe`], which
//! returns a *new* task (fresh cache, shared producer) so a configured task
//! can be reused as a template.

use crate::error::ResilienceError;
use crate::hooks::{Hooks, Middleware};
use crate::invokable::Invokable;
use crate::lazy::AsyncLazy;
use futures::future::BoxFuture;
use std::future::IntoFuture;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

pub struct Task<T, E> {
    hooks: Hooks<(), T, E>,
    token: CancellationToken,
    outcome: AsyncLazy<Result<T, ResilienceError<E>>>,
}

impl<T, E> Clone for Task<T, E> {
    fn clone(&self) -> Self {
        Self {
            hooks: self.hooks.clone(),
            token: self.token.clone(),
            outcome: self.outcome.clone(),
        }
    }
}

impl<T, E> std::fmt::Debug for Task<T, E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Task").field("hooks", &self.hooks).finish()
    }
}

impl<T, E> Task<T, E>
where
    T: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    /// Wrap a producer. Nothing runs until the task is awaited.
    pub fn new(producer: impl Invokable<(), Result<T, ResilienceError<E>>> + 'static) -> Self {
        Self::assemble(Hooks::new(producer), CancellationToken::new())
    }

    fn assemble(hooks: Hooks<(), T, E>, token: CancellationToken) -> Self {
        let outcome = Self::memoize(&hooks, &token);
        Self { hooks, token, outcome }
    }

    fn memoize(
        hooks: &Hooks<(), T, E>,
        token: &CancellationToken,
    ) -> AsyncLazy<Result<T, ResilienceError<E>>> {
        let hooks = hooks.clone();
        let token = token.clone();
        AsyncLazy::new(move || {
            let hooks = hooks.clone();
            let token = token.clone();
            async move {
                let context = hooks.context().clone();
                hooks.invoke_with((), &context, token).await
            }
        })
    }

    /// A new task with `middleware` appended; the receiver is untouched and
    /// the new task has its own (empty) outcome cache.
    pub fn pipe(&self, middleware: impl Middleware<(), T, E> + 'static) -> Self {
        Self::assemble(self.hooks.clone().pipe(middleware), self.token.clone())
    }

    /// Like [`Task::pipe`], but only when `condition` holds.
    pub fn pipe_when(&self, condition: bool, middleware: impl Middleware<(), T, E> + 'static) -> Self {
        if condition {
            self.pipe(middleware)
        } else {
            self.clone()
        }
    }

    /// Name the computation for observers and diagnostics.
    pub fn with_name(self, name: impl Into<String>) -> Self {
        Self::assemble(self.hooks.with_name(name), self.token)
    }

    /// Attach an external cancellation token.
    pub fn with_token(self, token: CancellationToken) -> Self {
        Self::assemble(self.hooks, token)
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Await the task: runs the producer on first call, replays the cached
    /// outcome on every later call (including calls through clones).
    pub async fn run(&self) -> Result<T, ResilienceError<E>> {
        self.outcome.get().await
    }

    /// Start the computation in the background and discard its outcome.
    pub fn detach(&self) {
        let task = self.clone();
        tokio::spawn(async move {
            let _ = task.run().await;
        });
    }
}

impl<E> Task<(), E>
where
    E: Clone + Send + Sync + 'static,
{
    /// A task that resolves after `duration`, or fails with
    /// [`ResilienceError::Aborted`] if its token cancels first.
    pub fn delay(duration: Duration) -> Self {
        Self::new(move |()| async move {
            tokio::time::sleep(duration).await;
            Ok(())
        })
    }
}

impl<T, E> IntoFuture for Task<T, E>
where
    T: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    type Output = Result<T, ResilienceError<E>>;
    type IntoFuture = BoxFuture<'static, Self::Output>;

    fn into_future(self) -> Self::IntoFuture {
        Box::pin(async move { self.run().await })
    }
}
