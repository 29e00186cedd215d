//! The storage contract lock drivers must implement.

use crate::error::AdapterError;
use async_trait::async_trait;
use std::time::Duration;

/// Observable state of a held lock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockState {
    /// The holder's lock id.
    pub owner: String,
    /// Time until expiry; `None` means unexpireable.
    pub remaining_ttl: Option<Duration>,
}

/// Per-key exclusive lock storage.
///
/// A record exists iff someone holds the lock; an expired record behaves as
/// absent for every operation. Each method must be atomic and linearizable
/// per key (Lua script on Redis, transaction on SQL, single-document update
/// on Mongo).
///
/// Contract:
/// - `acquire` returns true iff the lock was free (or expired), or already
///   held by `lock_id` (idempotent re-acquire; the stored TTL is untouched).
/// - `release` returns true iff `lock_id` is the current owner; the record
///   is then removed.
/// - `refresh` returns true iff `lock_id` is the current owner *and* the
///   stored TTL is not `None`: an unexpireable lock refuses refresh rather
///   than silently doing nothing.
/// - `force_release` removes any live record, returns whether one existed.
/// - `state` reports the live record, if any.
#[async_trait]
pub trait LockAdapter: Send + Sync {
    async fn acquire(
        &self,
        key: &str,
        lock_id: &str,
        ttl: Option<Duration>,
    ) -> Result<bool, AdapterError>;

    async fn release(&self, key: &str, lock_id: &str) -> Result<bool, AdapterError>;

    async fn refresh(&self, key: &str, lock_id: &str, ttl: Duration)
        -> Result<bool, AdapterError>;

    async fn force_release(&self, key: &str) -> Result<bool, AdapterError>;

    async fn state(&self, key: &str) -> Result<Option<LockState>, AdapterError>;
}
