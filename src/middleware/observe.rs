//! Observation middleware: lifecycle callbacks with monotonic timing.

use crate::error::ResilienceError;
use crate::hooks::{Context, Middleware, Next};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Invokes callbacks around the rest of the pipeline.
///
/// Per invocation: `on_start` fires exactly once, then exactly one of
/// `on_success`/`on_error`, then `on_finally` exactly once. Timing comes from
/// a monotonic clock and covers everything below this middleware.
pub struct Observe<T, E> {
    on_start: Option<Arc<dyn Fn(&Context) + Send + Sync>>,
    on_success: Option<Arc<dyn Fn(&T, Duration) + Send + Sync>>,
    on_error: Option<Arc<dyn Fn(&ResilienceError<E>, Duration) + Send + Sync>>,
    on_finally: Option<Arc<dyn Fn(Duration) + Send + Sync>>,
}

impl<T, E> Default for Observe<T, E> {
    fn default() -> Self {
        Self { on_start: None, on_success: None, on_error: None, on_finally: None }
    }
}

impl<T, E> Clone for Observe<T, E> {
    fn clone(&self) -> Self {
        Self {
            on_start: self.on_start.clone(),
            on_success: self.on_success.clone(),
            on_error: self.on_error.clone(),
            on_finally: self.on_finally.clone(),
        }
    }
}

impl<T, E> std::fmt::Debug for Observe<T, E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Observe")
            .field("on_start", &self.on_start.is_some())
            .field("on_success", &self.on_success.is_some())
            .field("on_error", &self.on_error.is_some())
            .field("on_finally", &self.on_finally.is_some())
            .finish()
    }
}

impl<T, E> Observe<T, E> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_start<F>(mut self, callback: F) -> Self
    where
        F: Fn(&Context) + Send + Sync + 'static,
    {
        self.on_start = Some(Arc::new(callback));
        self
    }

    pub fn on_success<F>(mut self, callback: F) -> Self
    where
        F: Fn(&T, Duration) + Send + Sync + 'static,
    {
        self.on_success = Some(Arc::new(callback));
        self
    }

    pub fn on_error<F>(mut self, callback: F) -> Self
    where
        F: Fn(&ResilienceError<E>, Duration) + Send + Sync + 'static,
    {
        self.on_error = Some(Arc::new(callback));
        self
    }

    pub fn on_finally<F>(mut self, callback: F) -> Self
    where
        F: Fn(Duration) + Send + Sync + 'static,
    {
        self.on_finally = Some(Arc::new(callback));
        self
    }
}

#[async_trait]
impl<I, T, E> Middleware<I, T, E> for Observe<T, E>
where
    I: Send + Sync + 'static,
    T: Send + Sync + 'static,
    E: Send + Sync + 'static,
{
    async fn handle(&self, input: I, next: Next<'_, I, T, E>) -> Result<T, ResilienceError<E>> {
        if let Some(callback) = &self.on_start {
            callback(next.context());
        }
        let start = Instant::now();

        let result = next.run(input).await;
        let elapsed = start.elapsed();

        match &result {
            Ok(value) => {
                if let Some(callback) = &self.on_success {
                    callback(value, elapsed);
                }
            }
            Err(error) => {
                if let Some(callback) = &self.on_error {
                    callback(error, elapsed);
                }
            }
        }
        if let Some(callback) = &self.on_finally {
            callback(elapsed);
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hooks::Hooks;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Debug, Clone, PartialEq, Eq)]
    struct TestError(String);

    impl std::fmt::Display for TestError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "TestError: {}", self.0)
        }
    }

    impl std::error::Error for TestError {}

    #[derive(Default)]
    struct Counters {
        start: AtomicUsize,
        success: AtomicUsize,
        error: AtomicUsize,
        finally: AtomicUsize,
    }

    fn observed(counters: Arc<Counters>) -> Observe<u32, TestError> {
        let on_start = counters.clone();
        let on_success = counters.clone();
        let on_error = counters.clone();
        let on_finally = counters;
        Observe::new()
            .on_start(move |_| {
                on_start.start.fetch_add(1, Ordering::SeqCst);
            })
            .on_success(move |_, _| {
                on_success.success.fetch_add(1, Ordering::SeqCst);
            })
            .on_error(move |_, _| {
                on_error.error.fetch_add(1, Ordering::SeqCst);
            })
            .on_finally(move |_| {
                on_finally.finally.fetch_add(1, Ordering::SeqCst);
            })
    }

    #[tokio::test]
    async fn success_fires_start_success_finally() {
        let counters = Arc::new(Counters::default());
        let hooks = Hooks::new(|_: ()| async move { Ok::<_, ResilienceError<TestError>>(42) })
            .pipe(observed(counters.clone()));

        assert_eq!(hooks.invoke(()).await.unwrap(), 42);
        assert_eq!(counters.start.load(Ordering::SeqCst), 1);
        assert_eq!(counters.success.load(Ordering::SeqCst), 1);
        assert_eq!(counters.error.load(Ordering::SeqCst), 0);
        assert_eq!(counters.finally.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failure_fires_start_error_finally() {
        let counters = Arc::new(Counters::default());
        let hooks: Hooks<(), u32, TestError> =
            Hooks::new(|_: ()| async move { Err(ResilienceError::Inner(TestError("boom".into()))) })
                .pipe(observed(counters.clone()));

        assert!(hooks.invoke(()).await.is_err());
        assert_eq!(counters.start.load(Ordering::SeqCst), 1);
        assert_eq!(counters.success.load(Ordering::SeqCst), 0);
        assert_eq!(counters.error.load(Ordering::SeqCst), 1);
        assert_eq!(counters.finally.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn timing_is_monotonic_and_covers_the_operation() {
        let seen = Arc::new(Mutex::new(None));
        let sink = seen.clone();
        let hooks = Hooks::new(|_: ()| async move {
            tokio::time::sleep(Duration::from_millis(30)).await;
            Ok::<_, ResilienceError<TestError>>(())
        })
        .pipe(Observe::new().on_finally(move |elapsed| {
            *sink.lock().unwrap() = Some(elapsed);
        }));

        hooks.invoke(()).await.unwrap();
        let elapsed = seen.lock().unwrap().expect("on_finally fired");
        assert!(elapsed >= Duration::from_millis(25), "got {:?}", elapsed);
    }

    #[tokio::test]
    async fn observing_a_retried_pipeline_counts_one_invocation() {
        use crate::backoff::Backoff;
        use crate::middleware::Retry;
        use crate::time::{InstantSleeper, TimeSpan};

        let counters = Arc::new(Counters::default());
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let retry = Retry::builder()
            .max_attempts(3)
            .expect("max_attempts > 0")
            .backoff(Backoff::constant(TimeSpan::ZERO))
            .with_sleeper(InstantSleeper)
            .build();

        // Observe sits outside retry: one start/finally per pipeline invocation.
        let hooks = Hooks::new(move |_: ()| {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err::<u32, _>(ResilienceError::Inner(TestError("boom".into())))
            }
        })
        .pipe(observed(counters.clone()))
        .pipe(retry);

        assert!(hooks.invoke(()).await.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(counters.start.load(Ordering::SeqCst), 1);
        assert_eq!(counters.error.load(Ordering::SeqCst), 1);
        assert_eq!(counters.finally.load(Ordering::SeqCst), 1);
    }
}
