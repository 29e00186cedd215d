//! Typed pub/sub event bus with best-effort, non-blocking delivery.
//!
//! Each bus owns an unbounded queue drained by a single worker, so `dispatch`
//! never blocks and never fails, delivery order matches dispatch order, and a
//! slow listener only delays listeners behind it on the same bus, never the
//! dispatcher. Listener errors are logged and swallowed.

use futures::future::BoxFuture;
use std::future::Future;
use std::sync::{Arc, RwLock};
use tokio::sync::mpsc;

type ListenerError = Box<dyn std::error::Error + Send + Sync>;
type Listener<E> = Arc<dyn Fn(E) -> BoxFuture<'static, Result<(), ListenerError>> + Send + Sync>;

pub struct EventBus<E> {
    tx: mpsc::UnboundedSender<E>,
    listeners: Arc<RwLock<Vec<Listener<E>>>>,
}

impl<E> Clone for EventBus<E> {
    fn clone(&self) -> Self {
        Self { tx: self.tx.clone(), listeners: Arc::clone(&self.listeners) }
    }
}

impl<E> std::fmt::Debug for EventBus<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let count = self.listeners.read().map(|l| l.len()).unwrap_or(0);
        f.debug_struct("EventBus").field("listeners", &count).finish()
    }
}

impl<E> EventBus<E>
where
    E: Clone + Send + 'static,
{
    /// Create a bus and spawn its drain worker. Requires a tokio runtime.
    pub fn new() -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<E>();
        let listeners: Arc<RwLock<Vec<Listener<E>>>> = Arc::new(RwLock::new(Vec::new()));

        let worker_listeners = Arc::clone(&listeners);
        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                let snapshot: Vec<Listener<E>> = worker_listeners
                    .read()
                    .unwrap_or_else(|poisoned| poisoned.into_inner())
                    .clone();
                for listener in snapshot {
                    if let Err(error) = listener(event.clone()).await {
                        tracing::warn!(%error, "event listener failed; error dropped");
                    }
                }
            }
        });

        Self { tx, listeners }
    }

    /// Register an async listener. Listeners run sequentially, in
    /// subscription order, on the bus worker.
    pub fn subscribe<F, Fut>(&self, listener: F)
    where
        F: Fn(E) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), ListenerError>> + Send + 'static,
    {
        let listener: Listener<E> =
            Arc::new(move |event| -> BoxFuture<'static, Result<(), ListenerError>> {
                Box::pin(listener(event))
            });
        self.listeners
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(listener);
    }

    /// Enqueue an event. Never blocks; if the worker is gone the event is
    /// dropped silently.
    pub fn dispatch(&self, event: E) {
        let _ = self.tx.send(event);
    }
}

impl<E> Default for EventBus<E>
where
    E: Clone + Send + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}
