//! Contract suite for [`LockAdapter`] implementations.

use super::unique_key;
use crate::lock::LockAdapter;
use std::time::Duration;

/// Assert the full lock driver contract. Panics on the first violation.
pub async fn lock_contract(adapter: &dyn LockAdapter) {
    mutual_exclusion(adapter).await;
    idempotent_acquire(adapter).await;
    owner_fencing(adapter).await;
    ttl_expiration(adapter).await;
    unexpireable_refresh(adapter).await;
    force_release(adapter).await;
    state_reporting(adapter).await;
}

async fn mutual_exclusion(adapter: &dyn LockAdapter) {
    let key = unique_key("lock/exclusion");
    assert!(
        adapter.acquire(&key, "a", None).await.unwrap(),
        "a free key must be acquirable"
    );
    assert!(
        !adapter.acquire(&key, "b", None).await.unwrap(),
        "a held key must refuse other owners"
    );
    assert!(adapter.release(&key, "a").await.unwrap());
    assert!(
        adapter.acquire(&key, "b", None).await.unwrap(),
        "a released key must be acquirable"
    );
    adapter.force_release(&key).await.unwrap();
}

async fn idempotent_acquire(adapter: &dyn LockAdapter) {
    let key = unique_key("lock/idempotent");
    assert!(adapter.acquire(&key, "a", None).await.unwrap());
    assert!(
        adapter.acquire(&key, "a", None).await.unwrap(),
        "re-acquire by the owner must succeed"
    );
    assert!(
        adapter.release(&key, "a").await.unwrap(),
        "one release must free an idempotently re-acquired lock"
    );
    assert!(adapter.state(&key).await.unwrap().is_none());
}

async fn owner_fencing(adapter: &dyn LockAdapter) {
    let key = unique_key("lock/fencing");
    adapter.acquire(&key, "a", Some(Duration::from_secs(60))).await.unwrap();

    assert!(!adapter.release(&key, "b").await.unwrap(), "release must be owner-fenced");
    assert!(
        !adapter.refresh(&key, "b", Duration::from_secs(60)).await.unwrap(),
        "refresh must be owner-fenced"
    );
    assert!(adapter.refresh(&key, "a", Duration::from_secs(60)).await.unwrap());
    adapter.force_release(&key).await.unwrap();
}

async fn ttl_expiration(adapter: &dyn LockAdapter) {
    let key = unique_key("lock/ttl");
    adapter.acquire(&key, "a", Some(Duration::from_millis(50))).await.unwrap();
    tokio::time::sleep(Duration::from_millis(80)).await;

    assert!(
        adapter.acquire(&key, "b", Some(Duration::from_secs(60))).await.unwrap(),
        "an expired lock must be acquirable by another owner"
    );
    assert!(
        !adapter.release(&key, "a").await.unwrap(),
        "the expired owner must not release the new owner's lock"
    );
    let state = adapter.state(&key).await.unwrap().expect("b holds the key");
    assert_eq!(state.owner, "b");
    adapter.force_release(&key).await.unwrap();
}

async fn unexpireable_refresh(adapter: &dyn LockAdapter) {
    let key = unique_key("lock/unexpireable");
    adapter.acquire(&key, "a", None).await.unwrap();
    assert!(
        !adapter.refresh(&key, "a", Duration::from_secs(60)).await.unwrap(),
        "an unexpireable lock must refuse refresh"
    );
    adapter.force_release(&key).await.unwrap();
}

async fn force_release(adapter: &dyn LockAdapter) {
    let key = unique_key("lock/force");
    assert!(
        !adapter.force_release(&key).await.unwrap(),
        "force_release of a missing key reports false"
    );
    adapter.acquire(&key, "a", None).await.unwrap();
    assert!(adapter.force_release(&key).await.unwrap());
    assert!(adapter.state(&key).await.unwrap().is_none());
}

async fn state_reporting(adapter: &dyn LockAdapter) {
    let key = unique_key("lock/state");
    assert!(adapter.state(&key).await.unwrap().is_none());

    adapter.acquire(&key, "a", Some(Duration::from_secs(60))).await.unwrap();
    let state = adapter.state(&key).await.unwrap().expect("held key has state");
    assert_eq!(state.owner, "a");
    let remaining = state.remaining_ttl.expect("expireable lock reports a ttl");
    assert!(remaining <= Duration::from_secs(60));
    adapter.force_release(&key).await.unwrap();
}
