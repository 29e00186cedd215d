//! The storage contract shared (reader/writer) lock drivers must implement.

use crate::error::AdapterError;
use crate::lock::LockState;
use crate::semaphore::SemaphoreSnapshot;
use async_trait::async_trait;
use std::time::Duration;

/// Observable state of a shared lock key: exactly one side is live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SharedLockSnapshot {
    Writer(LockState),
    Readers(SemaphoreSnapshot),
}

/// Per-key reader/writer lock storage.
///
/// Conceptually a writer lock plus a reader semaphore under one key, with
/// mutual exclusion between the sides enforced atomically per operation
/// (Lua script on Redis, transaction on SQL, single-document update on
/// Mongo).
///
/// Contract, on top of the lock and semaphore rules for each side:
/// - `acquire_writer` succeeds iff no live readers exist and the writer
///   side is free or already owned by `lock_id`.
/// - `acquire_reader` succeeds iff no live writer exists and the reader
///   semaphore rules admit the slot.
/// - `release_reader` under a live writer returns false (the writer owns
///   the key), never an error.
/// - `force_release_all_readers` is a no-op (false) while a writer holds
///   the key; `force_release` clears whichever side is live.
#[async_trait]
pub trait SharedLockAdapter: Send + Sync {
    async fn acquire_writer(
        &self,
        key: &str,
        lock_id: &str,
        ttl: Option<Duration>,
    ) -> Result<bool, AdapterError>;

    async fn release_writer(&self, key: &str, lock_id: &str) -> Result<bool, AdapterError>;

    async fn refresh_writer(
        &self,
        key: &str,
        lock_id: &str,
        ttl: Duration,
    ) -> Result<bool, AdapterError>;

    async fn acquire_reader(
        &self,
        key: &str,
        slot_id: &str,
        limit: u32,
        ttl: Option<Duration>,
    ) -> Result<bool, AdapterError>;

    async fn release_reader(&self, key: &str, slot_id: &str) -> Result<bool, AdapterError>;

    async fn refresh_reader(
        &self,
        key: &str,
        slot_id: &str,
        ttl: Duration,
    ) -> Result<bool, AdapterError>;

    async fn force_release_all_readers(&self, key: &str) -> Result<bool, AdapterError>;

    async fn force_release(&self, key: &str) -> Result<bool, AdapterError>;

    async fn state(&self, key: &str) -> Result<Option<SharedLockSnapshot>, AdapterError>;
}
