//! Middleware engine: reverse-compose middlewares around an async function.
//!
//! Given a terminal function `F` and middlewares `[M1, M2, …, Mn]`, an
//! invocation runs `M1` outermost: `M1` wraps `M2` wraps … wraps `F`. Each
//! middleware receives the input and a [`Next`] continuation; it either calls
//! `next.run(input)` (possibly with altered input, possibly more than once)
//! or short-circuits with its own result.
//!
//! A [`CancellationToken`] travels with `Next`. The engine races the terminal
//! function against it, so a cancelled pipeline fails with
//! [`ResilienceError::Aborted`] at its innermost suspension point; middlewares
//! that wait (retry sleeps, bulkhead queues) observe the same token.

use crate::error::ResilienceError;
use crate::invokable::Invokable;
use async_trait::async_trait;
use futures::future::BoxFuture;
use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Per-invocation diagnostic metadata.
///
/// `name` identifies the operation; everything else is free-form string
/// key/value pairs for listeners and observers.
#[derive(Debug, Clone, Default)]
pub struct Context {
    name: Option<String>,
    values: HashMap<String, String>,
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn named(name: impl Into<String>) -> Self {
        Self { name: Some(name.into()), values: HashMap::new() }
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }
}

/// A middleware wrapping an async invocation.
///
/// Implementations must forward to `next` to reach the function (or inner
/// middlewares), and may observe, transform, repeat, or suppress the call.
#[async_trait]
pub trait Middleware<I, T, E>: Send + Sync {
    async fn handle(&self, input: I, next: Next<'_, I, T, E>) -> Result<T, ResilienceError<E>>;
}

type Terminal<I, T, E> = dyn Invokable<I, Result<T, ResilienceError<E>>>;

/// The continuation handed to a middleware: the rest of the chain plus the
/// terminal function.
///
/// `run` borrows rather than consumes, so a middleware can invoke the
/// remainder of the pipeline repeatedly (retry, hedging).
pub struct Next<'a, I, T, E> {
    chain: &'a [Arc<dyn Middleware<I, T, E>>],
    terminal: &'a Terminal<I, T, E>,
    context: &'a Context,
    token: CancellationToken,
}

impl<'a, I, T, E> Clone for Next<'a, I, T, E> {
    fn clone(&self) -> Self {
        Self {
            chain: self.chain,
            terminal: self.terminal,
            context: self.context,
            token: self.token.clone(),
        }
    }
}

impl<'a, I, T, E> Next<'a, I, T, E>
where
    I: Send + 'static,
    T: Send + 'static,
    E: Send + 'static,
{
    pub fn context(&self) -> &Context {
        self.context
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Hand a different token to the inner layers (used by `Timeout`).
    pub fn with_token(mut self, token: CancellationToken) -> Self {
        self.token = token;
        self
    }

    /// Invoke the rest of the pipeline.
    pub fn run(&self, input: I) -> BoxFuture<'_, Result<T, ResilienceError<E>>> {
        Box::pin(async move {
            match self.chain.split_first() {
                Some((head, rest)) => {
                    let next = Next {
                        chain: rest,
                        terminal: self.terminal,
                        context: self.context,
                        token: self.token.clone(),
                    };
                    head.handle(input, next).await
                }
                None => {
                    tokio::select! {
                        biased;
                        outcome = self.terminal.invoke(input) => outcome,
                        _ = self.token.cancelled() => Err(ResilienceError::Aborted),
                    }
                }
            }
        })
    }
}

/// An async function together with the middlewares wrapped around it.
///
/// `pipe` appends middlewares without mutating the receiver's siblings: the
/// engine is a cheap, `Clone`-able value, and every extension produces a new
/// one. The first middleware in the list is outermost; later-piped
/// middlewares sit closer to the function.
pub struct Hooks<I, T, E> {
    terminal: Arc<Terminal<I, T, E>>,
    middlewares: Vec<Arc<dyn Middleware<I, T, E>>>,
    context: Context,
}

impl<I, T, E> Clone for Hooks<I, T, E> {
    fn clone(&self) -> Self {
        Self {
            terminal: Arc::clone(&self.terminal),
            middlewares: self.middlewares.clone(),
            context: self.context.clone(),
        }
    }
}

impl<I, T, E> std::fmt::Debug for Hooks<I, T, E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Hooks")
            .field("middlewares", &self.middlewares.len())
            .field("context", &self.context)
            .finish()
    }
}

impl<I, T, E> Hooks<I, T, E>
where
    I: Send + 'static,
    T: Send + 'static,
    E: Send + 'static,
{
    pub fn new(terminal: impl Invokable<I, Result<T, ResilienceError<E>>> + 'static) -> Self {
        Self { terminal: Arc::new(terminal), middlewares: Vec::new(), context: Context::new() }
    }

    /// Append a middleware, yielding a new engine.
    pub fn pipe(mut self, middleware: impl Middleware<I, T, E> + 'static) -> Self {
        self.middlewares.push(Arc::new(middleware));
        self
    }

    /// Append a middleware only when `condition` holds.
    pub fn pipe_when(self, condition: bool, middleware: impl Middleware<I, T, E> + 'static) -> Self {
        if condition {
            self.pipe(middleware)
        } else {
            self
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.context.name = Some(name.into());
        self
    }

    pub fn with_context(mut self, context: Context) -> Self {
        self.context = context;
        self
    }

    pub fn context(&self) -> &Context {
        &self.context
    }

    /// Invoke the pipeline with the engine's own context and a fresh token.
    pub async fn invoke(&self, input: I) -> Result<T, ResilienceError<E>> {
        self.invoke_with(input, &self.context, CancellationToken::new()).await
    }

    /// Invoke the pipeline under a caller-supplied context and token.
    pub async fn invoke_with(
        &self,
        input: I,
        context: &Context,
        token: CancellationToken,
    ) -> Result<T, ResilienceError<E>> {
        let next =
            Next { chain: &self.middlewares, terminal: self.terminal.as_ref(), context, token };
        next.run(input).await
    }
}
