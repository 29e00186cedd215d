//! Contract suite for [`SemaphoreAdapter`] implementations.

use super::unique_key;
use crate::semaphore::SemaphoreAdapter;
use std::time::Duration;

/// Assert the full semaphore driver contract. Panics on the first violation.
pub async fn semaphore_contract(adapter: &dyn SemaphoreAdapter) {
    slot_bound(adapter).await;
    idempotent_acquire(adapter).await;
    first_write_wins_limit(adapter).await;
    slot_expiration(adapter).await;
    refresh_fencing(adapter).await;
    record_lifecycle(adapter).await;
    key_ttl_aggregation(adapter).await;
}

async fn slot_bound(adapter: &dyn SemaphoreAdapter) {
    let key = unique_key("semaphore/bound");
    assert!(adapter.acquire(&key, "a", 2, None).await.unwrap());
    assert!(adapter.acquire(&key, "b", 2, None).await.unwrap());
    assert!(
        !adapter.acquire(&key, "c", 2, None).await.unwrap(),
        "live slots must never exceed the limit"
    );

    let snapshot = adapter.state(&key).await.unwrap().expect("record exists");
    assert_eq!(snapshot.acquired(), 2);
    assert!(snapshot.acquired() <= snapshot.limit);
    adapter.force_release_all(&key).await.unwrap();
}

async fn idempotent_acquire(adapter: &dyn SemaphoreAdapter) {
    let key = unique_key("semaphore/idempotent");
    assert!(adapter.acquire(&key, "a", 2, None).await.unwrap());
    assert!(
        adapter.acquire(&key, "a", 2, None).await.unwrap(),
        "the same slot id twice must yield one slot"
    );
    let snapshot = adapter.state(&key).await.unwrap().expect("record exists");
    assert_eq!(snapshot.acquired(), 1, "idempotent acquire must not consume capacity");
    adapter.force_release_all(&key).await.unwrap();
}

async fn first_write_wins_limit(adapter: &dyn SemaphoreAdapter) {
    let key = unique_key("semaphore/limit");
    adapter.acquire(&key, "a", 1, None).await.unwrap();
    assert!(
        !adapter.acquire(&key, "b", 100, None).await.unwrap(),
        "a later limit must not displace the stored one"
    );
    assert_eq!(adapter.state(&key).await.unwrap().expect("record").limit, 1);
    adapter.force_release_all(&key).await.unwrap();
}

async fn slot_expiration(adapter: &dyn SemaphoreAdapter) {
    let key = unique_key("semaphore/ttl");
    adapter.acquire(&key, "a", 1, Some(Duration::from_millis(50))).await.unwrap();
    assert!(!adapter.acquire(&key, "b", 1, None).await.unwrap());

    tokio::time::sleep(Duration::from_millis(80)).await;
    assert!(
        adapter.acquire(&key, "b", 1, None).await.unwrap(),
        "an expired slot must free capacity"
    );
    let snapshot = adapter.state(&key).await.unwrap().expect("record");
    assert!(!snapshot.slots.contains_key("a"), "expired slots must not be observable");
    adapter.force_release_all(&key).await.unwrap();
}

async fn refresh_fencing(adapter: &dyn SemaphoreAdapter) {
    let key = unique_key("semaphore/refresh");
    adapter.acquire(&key, "a", 3, Some(Duration::from_secs(60))).await.unwrap();
    adapter.acquire(&key, "b", 3, None).await.unwrap();

    assert!(adapter.refresh(&key, "a", Duration::from_secs(60)).await.unwrap());
    assert!(
        !adapter.refresh(&key, "b", Duration::from_secs(60)).await.unwrap(),
        "an unexpireable slot must refuse refresh"
    );
    assert!(
        !adapter.refresh(&key, "nobody", Duration::from_secs(60)).await.unwrap(),
        "refresh must be fenced to slot holders"
    );
    assert!(
        !adapter
            .refresh(&unique_key("semaphore/missing"), "a", Duration::from_secs(60))
            .await
            .unwrap(),
        "refresh of a missing key must fail"
    );
    adapter.force_release_all(&key).await.unwrap();
}

async fn record_lifecycle(adapter: &dyn SemaphoreAdapter) {
    let key = unique_key("semaphore/lifecycle");
    assert!(!adapter.release(&key, "a").await.unwrap());
    assert!(!adapter.force_release_all(&key).await.unwrap());

    adapter.acquire(&key, "a", 2, None).await.unwrap();
    adapter.acquire(&key, "b", 2, None).await.unwrap();
    assert!(adapter.release(&key, "a").await.unwrap());
    assert!(!adapter.release(&key, "a").await.unwrap(), "double release reports false");
    assert!(adapter.release(&key, "b").await.unwrap());
    assert!(
        adapter.state(&key).await.unwrap().is_none(),
        "the record must vanish with its last slot"
    );
}

async fn key_ttl_aggregation(adapter: &dyn SemaphoreAdapter) {
    let key = unique_key("semaphore/key-ttl");
    adapter.acquire(&key, "a", 3, Some(Duration::from_millis(100))).await.unwrap();
    adapter.acquire(&key, "b", 3, Some(Duration::from_secs(60))).await.unwrap();

    let snapshot = adapter.state(&key).await.unwrap().expect("record");
    let key_ttl = snapshot.key_ttl().expect("all slots expire, so the key does");
    assert!(key_ttl > Duration::from_millis(100), "key ttl follows the longest slot");

    adapter.acquire(&key, "c", 3, None).await.unwrap();
    let snapshot = adapter.state(&key).await.unwrap().expect("record");
    assert!(
        snapshot.key_ttl().is_none(),
        "any unexpireable slot must make the key unexpireable"
    );
    adapter.force_release_all(&key).await.unwrap();
}
