//! A uniform capability for "something that can be called asynchronously".
//!
//! Both plain async closures and objects with their own `invoke` method
//! satisfy [`Invokable`]; call sites hold an `Arc<dyn Invokable<I, O>>` and
//! never care which one they were given.

use futures::future::BoxFuture;
use std::future::Future;
use std::sync::Arc;

/// Anything callable with an `I`, producing an `O` asynchronously.
///
/// Implemented automatically for `Fn(I) -> impl Future<Output = O>` closures;
/// implement it by hand for stateful callables.
pub trait Invokable<I, O>: Send + Sync {
    fn invoke(&self, input: I) -> BoxFuture<'_, O>;
}

impl<I, O, F, Fut> Invokable<I, O> for F
where
    F: Fn(I) -> Fut + Send + Sync,
    Fut: Future<Output = O> + Send + 'static,
{
    fn invoke(&self, input: I) -> BoxFuture<'_, O> {
        Box::pin(self(input))
    }
}

/// Resolve any invokable into a call-site-neutral shared handle.
pub fn arc<I, O>(invokable: impl Invokable<I, O> + 'static) -> Arc<dyn Invokable<I, O>> {
    Arc::new(invokable)
}
