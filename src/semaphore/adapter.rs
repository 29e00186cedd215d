//! The storage contract semaphore drivers must implement.

use crate::error::AdapterError;
use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;

/// Observable state of a semaphore key: the fixed limit and the live slots.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SemaphoreSnapshot {
    pub limit: u32,
    /// Live slots with their remaining TTL; `None` means unexpireable.
    pub slots: HashMap<String, Option<Duration>>,
}

impl SemaphoreSnapshot {
    pub fn acquired(&self) -> u32 {
        self.slots.len() as u32
    }

    /// The key-level TTL: unexpireable (`None`) if any live slot is, else
    /// the maximum remaining slot TTL.
    pub fn key_ttl(&self) -> Option<Duration> {
        let mut longest = Duration::ZERO;
        for remaining in self.slots.values() {
            match remaining {
                None => return None,
                Some(remaining) => longest = longest.max(*remaining),
            }
        }
        Some(longest)
    }
}

/// Per-key counting semaphore storage.
///
/// A record exists iff at least one live slot does; expired slots are never
/// observable and are garbage-collected by every mutating call. Each method
/// must be atomic and linearizable per key.
///
/// Contract:
/// - The `acquire` that creates the record fixes `limit`; later acquires
///   with a different limit use the stored one (first-write wins).
/// - `acquire` returns true iff the caller already holds a live slot
///   (idempotent) or the live slot count is below the limit.
/// - `release` removes the caller's slot, returns whether one existed.
/// - `refresh` returns true only for a live, expireable slot owned by the
///   caller.
/// - `force_release_all` drops every slot, returns whether any live slot
///   existed.
#[async_trait]
pub trait SemaphoreAdapter: Send + Sync {
    async fn acquire(
        &self,
        key: &str,
        slot_id: &str,
        limit: u32,
        ttl: Option<Duration>,
    ) -> Result<bool, AdapterError>;

    async fn release(&self, key: &str, slot_id: &str) -> Result<bool, AdapterError>;

    async fn refresh(&self, key: &str, slot_id: &str, ttl: Duration)
        -> Result<bool, AdapterError>;

    async fn force_release_all(&self, key: &str) -> Result<bool, AdapterError>;

    async fn state(&self, key: &str) -> Result<Option<SemaphoreSnapshot>, AdapterError>;
}
