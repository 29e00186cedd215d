//! End-to-end lock behavior over the in-memory driver.

use latchkey::prelude::*;
use std::time::Duration;

fn provider() -> LockProvider {
    LockProvider::builder(MemoryLockAdapter::new())
        .default_ttl(Duration::from_millis(100))
        .build()
        .expect("valid provider config")
}

#[tokio::test]
async fn contended_lock_blocks_until_released() {
    let provider = provider();
    let a = provider.create("k").unwrap();
    let b = provider.create("k").unwrap();

    assert!(a.acquire().await.unwrap());

    // While a holds the key, a short blocking acquire gives up.
    let options = BlockingOptions::new(Duration::from_millis(50), Duration::from_millis(10));
    assert!(!b.acquire_blocking_with(options).await.unwrap());

    assert!(a.release().await.unwrap());
    assert!(b.acquire_blocking_with(options).await.unwrap());
}

#[tokio::test]
async fn an_expired_lock_changes_hands() {
    let provider = LockProvider::builder(MemoryLockAdapter::new())
        .default_ttl(Duration::from_millis(50))
        .build()
        .unwrap();
    let a = provider.create("k").unwrap();
    let b = provider.create("k").unwrap();

    assert!(a.acquire().await.unwrap());
    tokio::time::sleep(Duration::from_millis(80)).await;

    assert!(b.acquire().await.unwrap(), "expired key is free for b");
    assert!(!a.release().await.unwrap(), "a's ownership lapsed");

    let state = b.state().await.unwrap().expect("b holds the key");
    assert_eq!(state.owner, b.lock_id());
}

#[tokio::test]
async fn refresh_keeps_a_lock_alive_past_its_first_ttl() {
    let provider = LockProvider::builder(MemoryLockAdapter::new())
        .default_ttl(Duration::from_millis(60))
        .default_refresh_ttl(Duration::from_millis(200))
        .build()
        .unwrap();
    let a = provider.create("k").unwrap();
    let b = provider.create("k").unwrap();

    a.acquire().await.unwrap();
    tokio::time::sleep(Duration::from_millis(30)).await;
    assert!(a.refresh().await.unwrap());

    tokio::time::sleep(Duration::from_millis(60)).await;
    assert!(!b.acquire().await.unwrap(), "refresh extended past the original deadline");
}

#[tokio::test]
async fn run_serializes_critical_sections_across_handles() {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    let provider = LockProvider::builder(MemoryLockAdapter::new())
        .default_ttl(Duration::from_secs(10))
        .default_blocking_time(Duration::from_secs(5))
        .default_blocking_interval(Duration::from_millis(5))
        .build()
        .unwrap();

    let live = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));
    let mut workers = Vec::new();

    for _ in 0..8 {
        let handle = provider.create("shared-resource").unwrap();
        let live = live.clone();
        let peak = peak.clone();
        workers.push(tokio::spawn(async move {
            handle
                .run_blocking(async {
                    let current = live.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(current, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(10)).await;
                    live.fetch_sub(1, Ordering::SeqCst);
                })
                .await
        }));
    }

    for worker in workers {
        worker.await.unwrap().unwrap();
    }
    assert_eq!(peak.load(Ordering::SeqCst), 1, "mutual exclusion held");
}

#[tokio::test]
async fn event_listeners_observe_the_lifecycle_without_blocking_it() {
    use std::sync::{Arc, Mutex};

    let bus = EventBus::new();
    let names = Arc::new(Mutex::new(Vec::new()));
    let sink = names.clone();
    bus.subscribe(move |event: LockEvent| {
        let sink = sink.clone();
        async move {
            // A deliberately slow listener must not slow the lock down.
            tokio::time::sleep(Duration::from_millis(5)).await;
            sink.lock().unwrap().push(event.name().to_string());
            Ok(())
        }
    });

    let provider = LockProvider::builder(MemoryLockAdapter::new())
        .event_bus(bus)
        .build()
        .unwrap();
    let lock = provider.create("k").unwrap();

    let start = std::time::Instant::now();
    lock.acquire().await.unwrap();
    lock.release().await.unwrap();
    assert!(start.elapsed() < Duration::from_millis(50), "dispatch is non-blocking");

    tokio::time::sleep(Duration::from_millis(60)).await;
    assert_eq!(*names.lock().unwrap(), vec!["ACQUIRED", "RELEASED"]);
}

#[tokio::test]
async fn unexpireable_handles_never_lapse() {
    let provider = provider();
    let a = provider
        .create_with("k", LockOptions::new().unexpireable())
        .unwrap();
    let b = provider.create("k").unwrap();

    a.acquire().await.unwrap();
    tokio::time::sleep(Duration::from_millis(150)).await;
    assert!(!b.acquire().await.unwrap(), "no ttl, no expiry");
    assert!(!a.refresh().await.unwrap(), "and nothing to refresh");
    assert!(a.force_release().await.unwrap());
}
