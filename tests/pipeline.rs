//! Cross-middleware pipeline behavior: composition, task integration, and
//! the properties each policy guarantees when stacked.

use latchkey::backoff::Backoff;
use latchkey::error::ResilienceError;
use latchkey::hooks::Hooks;
use latchkey::middleware::{Bulkhead, Fallback, Observe, Retry, Timeout};
use latchkey::task::Task;
use latchkey::time::{InstantSleeper, TimeSpan};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
enum UpstreamError {
    Transient,
    Fatal,
}

impl std::fmt::Display for UpstreamError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UpstreamError::Transient => write!(f, "transient upstream failure"),
            UpstreamError::Fatal => write!(f, "fatal upstream failure"),
        }
    }
}

impl std::error::Error for UpstreamError {}

fn quick_retry(max_attempts: u32) -> Retry<UpstreamError> {
    Retry::builder()
        .max_attempts(max_attempts)
        .expect("max_attempts > 0")
        .backoff(Backoff::constant(TimeSpan::from_millis(1)))
        .with_sleeper(InstantSleeper)
        .build()
}

#[tokio::test]
async fn retry_exhaustion_calls_the_function_exactly_max_attempts_times() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let hooks = Hooks::new(move |_: ()| {
        let counter = counter.clone();
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Err::<u32, _>(ResilienceError::Inner(UpstreamError::Transient))
        }
    })
    .pipe(quick_retry(4));

    let err = hooks.invoke(()).await.unwrap_err();
    assert_eq!(calls.load(Ordering::SeqCst), 4);
    match err {
        ResilienceError::RetryExhausted { attempts, failures } => {
            assert_eq!(attempts, 4);
            assert_eq!(failures.last(), Some(&UpstreamError::Transient));
        }
        e => panic!("expected RetryExhausted, got {:?}", e),
    }
}

#[tokio::test]
async fn a_rejecting_retry_policy_surfaces_the_raw_error() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let retry = Retry::builder()
        .max_attempts(4)
        .expect("max_attempts > 0")
        .retry_if(|error: &UpstreamError| matches!(error, UpstreamError::Transient))
        .with_sleeper(InstantSleeper)
        .build();

    let hooks = Hooks::new(move |_: ()| {
        let counter = counter.clone();
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Err::<u32, _>(ResilienceError::Inner(UpstreamError::Fatal))
        }
    })
    .pipe(retry);

    let err = hooks.invoke(()).await.unwrap_err();
    assert_eq!(calls.load(Ordering::SeqCst), 1, "the policy rejected the retry");
    assert_eq!(err, ResilienceError::Inner(UpstreamError::Fatal));
}

#[tokio::test]
async fn fallback_over_retry_rescues_exhaustion() {
    let hooks = Hooks::new(|_: ()| async move {
        Err::<u32, _>(ResilienceError::Inner(UpstreamError::Transient))
    })
    .pipe(Fallback::value(0))
    .pipe(quick_retry(3));

    assert_eq!(hooks.invoke(()).await.unwrap(), 0, "fallback caught the exhaustion");
}

#[tokio::test]
async fn the_full_stack_composes_in_order() {
    // fallback -> retry -> bulkhead -> timeout -> operation
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();

    let hooks = Hooks::new(move |_: ()| {
        let counter = counter.clone();
        async move {
            let n = counter.fetch_add(1, Ordering::SeqCst);
            if n < 2 {
                Err(ResilienceError::Inner(UpstreamError::Transient))
            } else {
                Ok(7u32)
            }
        }
    })
    .pipe(Fallback::value(0))
    .pipe(quick_retry(5))
    .pipe(Bulkhead::new(2, 4).unwrap())
    .pipe(Timeout::new(Duration::from_secs(1)).unwrap());

    assert_eq!(hooks.invoke(()).await.unwrap(), 7, "retried past two failures");
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn timeouts_inside_retry_are_not_retried() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();

    let hooks = Hooks::new(move |_: ()| {
        let counter = counter.clone();
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_secs(10)).await;
            Ok::<u32, ResilienceError<UpstreamError>>(1)
        }
    })
    .pipe(quick_retry(5))
    .pipe(Timeout::new(Duration::from_millis(30)).unwrap());

    let err = hooks.invoke(()).await.unwrap_err();
    assert!(err.is_timeout());
    assert_eq!(calls.load(Ordering::SeqCst), 1, "a timeout is terminal for retry");
}

#[tokio::test]
async fn observe_sees_one_invocation_with_success_xor_error() {
    let starts = Arc::new(AtomicUsize::new(0));
    let successes = Arc::new(AtomicUsize::new(0));
    let errors = Arc::new(AtomicUsize::new(0));
    let finallys = Arc::new(AtomicUsize::new(0));

    let observe = {
        let starts = starts.clone();
        let successes = successes.clone();
        let errors = errors.clone();
        let finallys = finallys.clone();
        Observe::new()
            .on_start(move |_| {
                starts.fetch_add(1, Ordering::SeqCst);
            })
            .on_success(move |_: &u32, _| {
                successes.fetch_add(1, Ordering::SeqCst);
            })
            .on_error(move |_: &ResilienceError<UpstreamError>, _| {
                errors.fetch_add(1, Ordering::SeqCst);
            })
            .on_finally(move |_| {
                finallys.fetch_add(1, Ordering::SeqCst);
            })
    };

    let flips = Arc::new(AtomicUsize::new(0));
    let counter = flips.clone();
    let hooks = Hooks::new(move |_: ()| {
        let counter = counter.clone();
        async move {
            if counter.fetch_add(1, Ordering::SeqCst) % 2 == 0 {
                Ok(1u32)
            } else {
                Err(ResilienceError::Inner(UpstreamError::Transient))
            }
        }
    })
    .pipe(observe);

    for _ in 0..6 {
        let _ = hooks.invoke(()).await;
    }

    assert_eq!(starts.load(Ordering::SeqCst), 6);
    assert_eq!(finallys.load(Ordering::SeqCst), 6);
    assert_eq!(successes.load(Ordering::SeqCst) + errors.load(Ordering::SeqCst), 6);
    assert_eq!(successes.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn bulkhead_rejections_carry_the_capacity() {
    let gate = Arc::new(tokio::sync::Barrier::new(3));
    let release = Arc::new(tokio::sync::Notify::new());
    let gate_ref = gate.clone();
    let release_ref = release.clone();

    let hooks = Arc::new(
        Hooks::new(move |_: ()| {
            let gate = gate_ref.clone();
            let release = release_ref.clone();
            async move {
                gate.wait().await;
                release.notified().await;
                Ok::<u32, ResilienceError<UpstreamError>>(1)
            }
        })
        .pipe(Bulkhead::new(2, 2).unwrap()),
    );

    let mut inflight = Vec::new();
    for _ in 0..2 {
        let hooks = hooks.clone();
        inflight.push(tokio::spawn(async move { hooks.invoke(()).await }));
    }
    gate.wait().await;

    match hooks.invoke(()).await.unwrap_err() {
        ResilienceError::CapacityFull { in_flight, capacity } => {
            assert_eq!(capacity, 2);
            assert_eq!(in_flight, 2);
        }
        e => panic!("expected CapacityFull, got {:?}", e),
    }

    release.notify_waiters();
    for worker in inflight {
        worker.await.unwrap().unwrap();
    }
}

#[tokio::test]
async fn a_task_carries_its_pipeline_and_memoizes_the_result() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();

    let task: Task<u32, UpstreamError> = Task::new(move |()| {
        let counter = counter.clone();
        async move {
            let n = counter.fetch_add(1, Ordering::SeqCst);
            if n < 2 {
                Err(ResilienceError::Inner(UpstreamError::Transient))
            } else {
                Ok(9)
            }
        }
    })
    .pipe(quick_retry(5))
    .with_name("fetch-nine");

    assert_eq!(task.run().await.unwrap(), 9);
    assert_eq!(task.run().await.unwrap(), 9, "memoized");
    assert_eq!(calls.load(Ordering::SeqCst), 3, "retries happened inside one execution");
}

#[tokio::test]
async fn task_delay_cooperates_with_timeout_middleware() {
    let task: Task<(), UpstreamError> =
        Task::delay(Duration::from_secs(30)).pipe(Timeout::new(Duration::from_millis(30)).unwrap());

    let start = std::time::Instant::now();
    let err = task.run().await.unwrap_err();
    assert!(err.is_timeout());
    assert!(start.elapsed() < Duration::from_secs(1));
}
