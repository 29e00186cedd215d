//! In-memory shared lock storage.

use super::{SharedLockAdapter, SharedLockSnapshot};
use crate::error::AdapterError;
use crate::lock::LockState;
use crate::semaphore::SemaphoreSnapshot;
use crate::time::{Clock, MonotonicClock};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Debug, Clone)]
enum Side {
    Writer { owner: String, expires_at: Option<u64> },
    Readers { limit: u32, slots: HashMap<String, Option<u64>> },
}

impl Side {
    /// Drop expired state; `None` means the whole record is gone.
    fn pruned(self, now: u64) -> Option<Side> {
        match self {
            Side::Writer { owner, expires_at } => match expires_at {
                Some(deadline) if deadline <= now => None,
                _ => Some(Side::Writer { owner, expires_at }),
            },
            Side::Readers { limit, mut slots } => {
                slots.retain(|_, deadline| match deadline {
                    Some(deadline) => *deadline > now,
                    None => true,
                });
                if slots.is_empty() {
                    None
                } else {
                    Some(Side::Readers { limit, slots })
                }
            }
        }
    }
}

/// Reference adapter: the writer-XOR-readers invariant is enforced by
/// storing exactly one [`Side`] per key under one mutex.
pub struct MemorySharedLockAdapter {
    clock: Arc<dyn Clock>,
    records: Mutex<HashMap<String, Side>>,
}

impl std::fmt::Debug for MemorySharedLockAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemorySharedLockAdapter").finish()
    }
}

impl Default for MemorySharedLockAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl MemorySharedLockAdapter {
    pub fn new() -> Self {
        Self::with_clock(MonotonicClock::default())
    }

    /// Override the clock (deterministic expiry tests).
    pub fn with_clock(clock: impl Clock + 'static) -> Self {
        Self { clock: Arc::new(clock), records: Mutex::new(HashMap::new()) }
    }

    fn deadline(now: u64, ttl: Option<Duration>) -> Option<u64> {
        ttl.map(|ttl| now.saturating_add(ttl.as_millis() as u64))
    }

    /// Run `f` against the pruned record for `key`, writing back its result.
    fn mutate<R>(&self, key: &str, f: impl FnOnce(Option<Side>, u64) -> (Option<Side>, R)) -> R {
        let now = self.clock.now_millis();
        let mut table = self.records.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let current = table.remove(key).and_then(|side| side.pruned(now));
        let (next, result) = f(current, now);
        if let Some(next) = next {
            table.insert(key.to_string(), next);
        }
        result
    }
}

#[async_trait]
impl SharedLockAdapter for MemorySharedLockAdapter {
    async fn acquire_writer(
        &self,
        key: &str,
        lock_id: &str,
        ttl: Option<Duration>,
    ) -> Result<bool, AdapterError> {
        Ok(self.mutate(key, |current, now| match current {
            None => (
                Some(Side::Writer {
                    owner: lock_id.to_string(),
                    expires_at: Self::deadline(now, ttl),
                }),
                true,
            ),
            Some(Side::Writer { owner, expires_at }) if owner == lock_id => {
                (Some(Side::Writer { owner, expires_at }), true)
            }
            Some(other) => (Some(other), false),
        }))
    }

    async fn release_writer(&self, key: &str, lock_id: &str) -> Result<bool, AdapterError> {
        Ok(self.mutate(key, |current, _| match current {
            Some(Side::Writer { owner, .. }) if owner == lock_id => (None, true),
            other => (other, false),
        }))
    }

    async fn refresh_writer(
        &self,
        key: &str,
        lock_id: &str,
        ttl: Duration,
    ) -> Result<bool, AdapterError> {
        Ok(self.mutate(key, |current, now| match current {
            Some(Side::Writer { owner, expires_at: Some(_) }) if owner == lock_id => (
                Some(Side::Writer { owner, expires_at: Self::deadline(now, Some(ttl)) }),
                true,
            ),
            other => (other, false),
        }))
    }

    async fn acquire_reader(
        &self,
        key: &str,
        slot_id: &str,
        limit: u32,
        ttl: Option<Duration>,
    ) -> Result<bool, AdapterError> {
        Ok(self.mutate(key, |current, now| match current {
            None => {
                if limit == 0 {
                    return (None, false);
                }
                let slots =
                    HashMap::from([(slot_id.to_string(), Self::deadline(now, ttl))]);
                (Some(Side::Readers { limit, slots }), true)
            }
            Some(Side::Readers { limit: stored, mut slots }) => {
                if slots.contains_key(slot_id) {
                    return (Some(Side::Readers { limit: stored, slots }), true);
                }
                let admitted = (slots.len() as u32) < stored;
                if admitted {
                    slots.insert(slot_id.to_string(), Self::deadline(now, ttl));
                }
                (Some(Side::Readers { limit: stored, slots }), admitted)
            }
            Some(writer) => (Some(writer), false),
        }))
    }

    async fn release_reader(&self, key: &str, slot_id: &str) -> Result<bool, AdapterError> {
        Ok(self.mutate(key, |current, _| match current {
            Some(Side::Readers { limit, mut slots }) => {
                let removed = slots.remove(slot_id).is_some();
                if slots.is_empty() {
                    (None, removed)
                } else {
                    (Some(Side::Readers { limit, slots }), removed)
                }
            }
            // A live writer owns the key: not an error, just not released.
            other => (other, false),
        }))
    }

    async fn refresh_reader(
        &self,
        key: &str,
        slot_id: &str,
        ttl: Duration,
    ) -> Result<bool, AdapterError> {
        Ok(self.mutate(key, |current, now| match current {
            Some(Side::Readers { limit, mut slots }) => {
                let refreshed = match slots.get_mut(slot_id) {
                    Some(Some(deadline)) => {
                        *deadline = now.saturating_add(ttl.as_millis() as u64);
                        true
                    }
                    Some(None) | None => false,
                };
                (Some(Side::Readers { limit, slots }), refreshed)
            }
            other => (other, false),
        }))
    }

    async fn force_release_all_readers(&self, key: &str) -> Result<bool, AdapterError> {
        Ok(self.mutate(key, |current, _| match current {
            Some(Side::Readers { .. }) => (None, true),
            other => (other, false),
        }))
    }

    async fn force_release(&self, key: &str) -> Result<bool, AdapterError> {
        Ok(self.mutate(key, |current, _| (None, current.is_some())))
    }

    async fn state(&self, key: &str) -> Result<Option<SharedLockSnapshot>, AdapterError> {
        let now = self.clock.now_millis();
        let table = self.records.lock().unwrap_or_else(|poisoned| poisoned.into_inner());

        let Some(side) = table.get(key).cloned().and_then(|side| side.pruned(now)) else {
            return Ok(None);
        };
        Ok(Some(match side {
            Side::Writer { owner, expires_at } => SharedLockSnapshot::Writer(LockState {
                owner,
                remaining_ttl: expires_at
                    .map(|deadline| Duration::from_millis(deadline.saturating_sub(now))),
            }),
            Side::Readers { limit, slots } => {
                let slots = slots
                    .into_iter()
                    .map(|(slot_id, deadline)| {
                        let remaining = deadline
                            .map(|deadline| Duration::from_millis(deadline.saturating_sub(now)));
                        (slot_id, remaining)
                    })
                    .collect();
                SharedLockSnapshot::Readers(SemaphoreSnapshot { limit, slots })
            }
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::ManualClock;

    fn adapter() -> (ManualClock, MemorySharedLockAdapter) {
        let clock = ManualClock::new();
        let adapter = MemorySharedLockAdapter::with_clock(clock.clone());
        (clock, adapter)
    }

    #[tokio::test]
    async fn writer_excludes_readers_and_other_writers() {
        let (_, adapter) = adapter();
        assert!(adapter.acquire_writer("k", "w1", None).await.unwrap());
        assert!(!adapter.acquire_writer("k", "w2", None).await.unwrap());
        assert!(!adapter.acquire_reader("k", "r1", 3, None).await.unwrap());

        assert!(adapter.acquire_writer("k", "w1", None).await.unwrap(), "idempotent");
    }

    #[tokio::test]
    async fn readers_exclude_the_writer_up_to_the_limit() {
        let (_, adapter) = adapter();
        assert!(adapter.acquire_reader("k", "r1", 2, None).await.unwrap());
        assert!(adapter.acquire_reader("k", "r2", 2, None).await.unwrap());
        assert!(!adapter.acquire_reader("k", "r3", 2, None).await.unwrap());
        assert!(!adapter.acquire_writer("k", "w1", None).await.unwrap());
    }

    #[tokio::test]
    async fn the_sides_never_coexist() {
        let (_, adapter) = adapter();
        adapter.acquire_reader("k", "r1", 2, None).await.unwrap();

        match adapter.state("k").await.unwrap().unwrap() {
            SharedLockSnapshot::Readers(snapshot) => assert_eq!(snapshot.acquired(), 1),
            SharedLockSnapshot::Writer(_) => panic!("readers live, writer reported"),
        }

        adapter.release_reader("k", "r1").await.unwrap();
        adapter.acquire_writer("k", "w1", None).await.unwrap();

        match adapter.state("k").await.unwrap().unwrap() {
            SharedLockSnapshot::Writer(state) => assert_eq!(state.owner, "w1"),
            SharedLockSnapshot::Readers(_) => panic!("writer live, readers reported"),
        }
    }

    #[tokio::test]
    async fn release_reader_under_a_writer_is_false_not_an_error() {
        let (_, adapter) = adapter();
        adapter.acquire_writer("k", "w1", None).await.unwrap();
        assert!(!adapter.release_reader("k", "r1").await.unwrap());
        // The writer is untouched.
        assert!(matches!(
            adapter.state("k").await.unwrap(),
            Some(SharedLockSnapshot::Writer(_))
        ));
    }

    #[tokio::test]
    async fn force_release_all_readers_is_a_no_op_under_a_writer() {
        let (_, adapter) = adapter();
        adapter.acquire_writer("k", "w1", None).await.unwrap();
        assert!(!adapter.force_release_all_readers("k").await.unwrap());
        assert!(adapter.state("k").await.unwrap().is_some());

        adapter.force_release("k").await.unwrap();
        adapter.acquire_reader("k", "r1", 2, None).await.unwrap();
        assert!(adapter.force_release_all_readers("k").await.unwrap());
        assert!(adapter.state("k").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn an_expired_writer_admits_readers() {
        let (clock, adapter) = adapter();
        adapter.acquire_writer("k", "w1", Some(Duration::from_millis(50))).await.unwrap();
        assert!(!adapter.acquire_reader("k", "r1", 2, None).await.unwrap());

        clock.advance(60);
        assert!(adapter.acquire_reader("k", "r1", 2, None).await.unwrap());
        assert!(!adapter.release_writer("k", "w1").await.unwrap());
    }

    #[tokio::test]
    async fn expired_readers_admit_the_writer() {
        let (clock, adapter) = adapter();
        adapter
            .acquire_reader("k", "r1", 2, Some(Duration::from_millis(50)))
            .await
            .unwrap();
        assert!(!adapter.acquire_writer("k", "w1", None).await.unwrap());

        clock.advance(60);
        assert!(adapter.acquire_writer("k", "w1", None).await.unwrap());
    }

    #[tokio::test]
    async fn refreshes_are_fenced_per_side() {
        let (_, adapter) = adapter();
        adapter.acquire_writer("k", "w1", Some(Duration::from_millis(50))).await.unwrap();
        assert!(adapter.refresh_writer("k", "w1", Duration::from_millis(100)).await.unwrap());
        assert!(!adapter.refresh_writer("k", "w2", Duration::from_millis(100)).await.unwrap());
        assert!(!adapter.refresh_reader("k", "r1", Duration::from_millis(100)).await.unwrap());

        adapter.force_release("k").await.unwrap();
        adapter.acquire_writer("k", "w1", None).await.unwrap();
        assert!(
            !adapter.refresh_writer("k", "w1", Duration::from_millis(100)).await.unwrap(),
            "unexpireable writer refuses refresh"
        );
    }

    #[tokio::test]
    async fn reader_limit_is_fixed_by_the_first_reader() {
        let (_, adapter) = adapter();
        adapter.acquire_reader("k", "r1", 1, None).await.unwrap();
        assert!(!adapter.acquire_reader("k", "r2", 10, None).await.unwrap());
    }
}
