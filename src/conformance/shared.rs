//! Contract suite for [`SharedLockAdapter`] implementations.

use super::unique_key;
use crate::shared::{SharedLockAdapter, SharedLockSnapshot};
use std::time::Duration;

/// Assert the full shared lock driver contract. Panics on the first violation.
pub async fn shared_lock_contract(adapter: &dyn SharedLockAdapter) {
    writer_excludes_readers(adapter).await;
    readers_exclude_writer(adapter).await;
    disjoint_state(adapter).await;
    release_reader_under_writer(adapter).await;
    force_release_semantics(adapter).await;
    side_expiration(adapter).await;
    refresh_fencing(adapter).await;
}

async fn writer_excludes_readers(adapter: &dyn SharedLockAdapter) {
    let key = unique_key("shared/writer-first");
    assert!(adapter.acquire_writer(&key, "w", None).await.unwrap());
    assert!(adapter.acquire_writer(&key, "w", None).await.unwrap(), "writer re-acquire");
    assert!(!adapter.acquire_writer(&key, "other", None).await.unwrap());
    assert!(
        !adapter.acquire_reader(&key, "r", 3, None).await.unwrap(),
        "no reader may join while a writer holds the key"
    );

    assert!(adapter.release_writer(&key, "w").await.unwrap());
    assert!(adapter.acquire_reader(&key, "r", 3, None).await.unwrap());
    adapter.force_release(&key).await.unwrap();
}

async fn readers_exclude_writer(adapter: &dyn SharedLockAdapter) {
    let key = unique_key("shared/readers-first");
    assert!(adapter.acquire_reader(&key, "r1", 2, None).await.unwrap());
    assert!(adapter.acquire_reader(&key, "r2", 2, None).await.unwrap());
    assert!(!adapter.acquire_reader(&key, "r3", 2, None).await.unwrap(), "limit binds");
    assert!(
        !adapter.acquire_writer(&key, "w", None).await.unwrap(),
        "no writer may join while readers hold the key"
    );

    adapter.release_reader(&key, "r1").await.unwrap();
    assert!(!adapter.acquire_writer(&key, "w", None).await.unwrap(), "one reader left");
    adapter.release_reader(&key, "r2").await.unwrap();
    assert!(adapter.acquire_writer(&key, "w", None).await.unwrap());
    adapter.force_release(&key).await.unwrap();
}

async fn disjoint_state(adapter: &dyn SharedLockAdapter) {
    let key = unique_key("shared/disjoint");
    assert!(adapter.state(&key).await.unwrap().is_none());

    adapter.acquire_writer(&key, "w", None).await.unwrap();
    match adapter.state(&key).await.unwrap().expect("writer live") {
        SharedLockSnapshot::Writer(state) => assert_eq!(state.owner, "w"),
        SharedLockSnapshot::Readers(_) => panic!("writer live but readers reported"),
    }

    adapter.force_release(&key).await.unwrap();
    adapter.acquire_reader(&key, "r", 2, None).await.unwrap();
    match adapter.state(&key).await.unwrap().expect("readers live") {
        SharedLockSnapshot::Readers(snapshot) => assert_eq!(snapshot.acquired(), 1),
        SharedLockSnapshot::Writer(_) => panic!("readers live but writer reported"),
    }
    adapter.force_release(&key).await.unwrap();
}

async fn release_reader_under_writer(adapter: &dyn SharedLockAdapter) {
    let key = unique_key("shared/release-reader");
    adapter.acquire_writer(&key, "w", None).await.unwrap();
    assert!(
        !adapter.release_reader(&key, "r").await.unwrap(),
        "release_reader under a writer reports false, not an error"
    );
    assert!(adapter.state(&key).await.unwrap().is_some(), "the writer survives");
    adapter.force_release(&key).await.unwrap();
}

async fn force_release_semantics(adapter: &dyn SharedLockAdapter) {
    let key = unique_key("shared/force");
    adapter.acquire_writer(&key, "w", None).await.unwrap();
    assert!(
        !adapter.force_release_all_readers(&key).await.unwrap(),
        "force_release_all_readers is a no-op while a writer holds the key"
    );
    assert!(adapter.force_release(&key).await.unwrap(), "force_release clears the writer");

    adapter.acquire_reader(&key, "r1", 3, None).await.unwrap();
    adapter.acquire_reader(&key, "r2", 3, None).await.unwrap();
    assert!(adapter.force_release_all_readers(&key).await.unwrap());
    assert!(adapter.state(&key).await.unwrap().is_none());
}

async fn side_expiration(adapter: &dyn SharedLockAdapter) {
    let key = unique_key("shared/ttl");
    adapter
        .acquire_writer(&key, "w", Some(Duration::from_millis(50)))
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(80)).await;
    assert!(
        adapter.acquire_reader(&key, "r", 2, None).await.unwrap(),
        "an expired writer admits readers"
    );
    adapter.force_release(&key).await.unwrap();

    adapter
        .acquire_reader(&key, "r", 2, Some(Duration::from_millis(50)))
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(80)).await;
    assert!(
        adapter.acquire_writer(&key, "w", None).await.unwrap(),
        "expired readers admit the writer"
    );
    adapter.force_release(&key).await.unwrap();
}

async fn refresh_fencing(adapter: &dyn SharedLockAdapter) {
    let key = unique_key("shared/refresh");
    adapter
        .acquire_writer(&key, "w", Some(Duration::from_secs(60)))
        .await
        .unwrap();
    assert!(adapter.refresh_writer(&key, "w", Duration::from_secs(60)).await.unwrap());
    assert!(!adapter.refresh_writer(&key, "x", Duration::from_secs(60)).await.unwrap());
    assert!(
        !adapter.refresh_reader(&key, "w", Duration::from_secs(60)).await.unwrap(),
        "the reader side has no slot while the writer holds the key"
    );
    adapter.force_release(&key).await.unwrap();

    adapter.acquire_writer(&key, "w", None).await.unwrap();
    assert!(
        !adapter.refresh_writer(&key, "w", Duration::from_secs(60)).await.unwrap(),
        "an unexpireable writer refuses refresh"
    );
    adapter.force_release(&key).await.unwrap();
}
