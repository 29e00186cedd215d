//! Deferred, once-evaluated values.

use futures::future::BoxFuture;
use std::sync::{Arc, Mutex, OnceLock};

/// A value computed on first access and cached afterwards.
pub struct Lazy<T> {
    cell: OnceLock<T>,
    init: Mutex<Option<Box<dyn FnOnce() -> T + Send>>>,
}

impl<T> Lazy<T> {
    pub fn new(init: impl FnOnce() -> T + Send + 'static) -> Self {
        Self { cell: OnceLock::new(), init: Mutex::new(Some(Box::new(init))) }
    }

    /// Evaluate the initializer if it hasn't run yet and return the value.
    pub fn force(&self) -> &T {
        self.cell.get_or_init(|| {
            let init = self
                .init
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .take()
                .expect("Lazy initializer already consumed without a stored value");
            init()
        })
    }

    /// The cached value, if the initializer has already run.
    pub fn get(&self) -> Option<&T> {
        self.cell.get()
    }
}

impl<T: std::fmt::Debug> std::fmt::Debug for Lazy<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Lazy").field("value", &self.cell.get()).finish()
    }
}

type AsyncInit<T> = Arc<dyn Fn() -> BoxFuture<'static, T> + Send + Sync>;

/// An async value computed on first `get` and cached afterwards.
///
/// Cloning shares the cache; [`AsyncLazy::fresh`] keeps the initializer but
/// forgets the cached value, so the computation runs again on next access.
pub struct AsyncLazy<T> {
    cell: Arc<tokio::sync::OnceCell<T>>,
    init: AsyncInit<T>,
}

impl<T> Clone for AsyncLazy<T> {
    fn clone(&self) -> Self {
        Self { cell: Arc::clone(&self.cell), init: Arc::clone(&self.init) }
    }
}

impl<T: Clone> AsyncLazy<T> {
    pub fn new<F, Fut>(init: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = T> + Send + 'static,
    {
        Self {
            cell: Arc::new(tokio::sync::OnceCell::new()),
            init: Arc::new(move || -> BoxFuture<'static, T> { Box::pin(init()) }),
        }
    }

    /// Run the initializer at most once across all clones; later calls get
    /// the cached value.
    pub async fn get(&self) -> T {
        self.cell.get_or_init(|| (self.init)()).await.clone()
    }

    /// The cached value, if the initializer has already completed.
    pub fn peek(&self) -> Option<&T> {
        self.cell.get()
    }

    /// Same initializer, empty cache.
    pub fn fresh(&self) -> Self {
        Self { cell: Arc::new(tokio::sync::OnceCell::new()), init: Arc::clone(&self.init) }
    }
}

impl<T: std::fmt::Debug> std::fmt::Debug for AsyncLazy<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AsyncLazy").field("value", &self.cell.get()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn lazy_runs_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let lazy = Lazy::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            42
        });

        assert_eq!(lazy.get(), None);
        assert_eq!(*lazy.force(), 42);
        assert_eq!(*lazy.force(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(lazy.get(), Some(&42));
    }

    #[tokio::test]
    async fn async_lazy_runs_once_across_clones() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let lazy = AsyncLazy::new(move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                "ready".to_string()
            }
        });

        let other = lazy.clone();
        assert_eq!(lazy.get().await, "ready");
        assert_eq!(other.get().await, "ready");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn fresh_forgets_the_cache() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let lazy = AsyncLazy::new(move || {
            let counter = counter.clone();
            async move { counter.fetch_add(1, Ordering::SeqCst) }
        });

        assert_eq!(lazy.get().await, 0);
        assert_eq!(lazy.fresh().get().await, 1);
        assert_eq!(lazy.get().await, 0, "original cache is untouched");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn concurrent_gets_run_the_initializer_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let lazy = AsyncLazy::new(move || {
            let counter = counter.clone();
            async move {
                tokio::time::sleep(std::time::Duration::from_millis(10)).await;
                counter.fetch_add(1, Ordering::SeqCst);
                7u32
            }
        });

        let (a, b) = tokio::join!(lazy.get(), lazy.get());
        assert_eq!((a, b), (7, 7));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
