//! In-memory semaphore storage.

use super::{SemaphoreAdapter, SemaphoreSnapshot};
use crate::error::AdapterError;
use crate::time::{Clock, MonotonicClock};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Debug, Clone)]
struct Record {
    limit: u32,
    /// Slot id to clock-millis deadline; `None` means unexpireable.
    slots: HashMap<String, Option<u64>>,
}

impl Record {
    fn prune(&mut self, now: u64) {
        self.slots.retain(|_, deadline| match deadline {
            Some(deadline) => *deadline > now,
            None => true,
        });
    }
}

/// Reference adapter: one record per key behind a mutex.
///
/// Expired slots are pruned at the start of every mutating call; a record
/// whose last slot goes is removed, which is exactly the key-level
/// expiration the contract requires (the key TTL is the maximum slot TTL).
pub struct MemorySemaphoreAdapter {
    clock: Arc<dyn Clock>,
    records: Mutex<HashMap<String, Record>>,
}

impl std::fmt::Debug for MemorySemaphoreAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemorySemaphoreAdapter").finish()
    }
}

impl Default for MemorySemaphoreAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl MemorySemaphoreAdapter {
    pub fn new() -> Self {
        Self::with_clock(MonotonicClock::default())
    }

    /// Override the clock (deterministic expiry tests).
    pub fn with_clock(clock: impl Clock + 'static) -> Self {
        Self { clock: Arc::new(clock), records: Mutex::new(HashMap::new()) }
    }

    fn table(&self) -> std::sync::MutexGuard<'_, HashMap<String, Record>> {
        self.records.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn deadline(now: u64, ttl: Option<Duration>) -> Option<u64> {
        ttl.map(|ttl| now.saturating_add(ttl.as_millis() as u64))
    }
}

#[async_trait]
impl SemaphoreAdapter for MemorySemaphoreAdapter {
    async fn acquire(
        &self,
        key: &str,
        slot_id: &str,
        limit: u32,
        ttl: Option<Duration>,
    ) -> Result<bool, AdapterError> {
        let now = self.clock.now_millis();
        let mut table = self.table();

        let record = table.entry(key.to_string()).or_insert_with(|| Record {
            // First acquire fixes the limit; later values are ignored.
            limit,
            slots: HashMap::new(),
        });
        record.prune(now);

        if record.slots.contains_key(slot_id) {
            return Ok(true);
        }
        if (record.slots.len() as u32) < record.limit {
            record.slots.insert(slot_id.to_string(), Self::deadline(now, ttl));
            return Ok(true);
        }
        let full = record.slots.is_empty();
        if full {
            // A zero-capacity record with no slots would otherwise linger.
            table.remove(key);
        }
        Ok(false)
    }

    async fn release(&self, key: &str, slot_id: &str) -> Result<bool, AdapterError> {
        let now = self.clock.now_millis();
        let mut table = self.table();

        let Some(record) = table.get_mut(key) else {
            return Ok(false);
        };
        record.prune(now);
        let removed = record.slots.remove(slot_id).is_some();
        if record.slots.is_empty() {
            table.remove(key);
        }
        Ok(removed)
    }

    async fn refresh(
        &self,
        key: &str,
        slot_id: &str,
        ttl: Duration,
    ) -> Result<bool, AdapterError> {
        let now = self.clock.now_millis();
        let mut table = self.table();

        let Some(record) = table.get_mut(key) else {
            return Ok(false);
        };
        record.prune(now);
        let refreshed = match record.slots.get_mut(slot_id) {
            // Unexpireable slots refuse refresh rather than silently no-op.
            Some(Some(deadline)) => {
                *deadline = now.saturating_add(ttl.as_millis() as u64);
                true
            }
            Some(None) | None => false,
        };
        if record.slots.is_empty() {
            table.remove(key);
        }
        Ok(refreshed)
    }

    async fn force_release_all(&self, key: &str) -> Result<bool, AdapterError> {
        let now = self.clock.now_millis();
        let mut table = self.table();

        match table.remove(key) {
            Some(mut record) => {
                record.prune(now);
                Ok(!record.slots.is_empty())
            }
            None => Ok(false),
        }
    }

    async fn state(&self, key: &str) -> Result<Option<SemaphoreSnapshot>, AdapterError> {
        let now = self.clock.now_millis();
        let table = self.table();

        let Some(record) = table.get(key) else {
            return Ok(None);
        };
        let slots: HashMap<String, Option<Duration>> = record
            .slots
            .iter()
            .filter(|(_, deadline)| deadline.map_or(true, |deadline| deadline > now))
            .map(|(slot_id, deadline)| {
                let remaining =
                    deadline.map(|deadline| Duration::from_millis(deadline.saturating_sub(now)));
                (slot_id.clone(), remaining)
            })
            .collect();

        if slots.is_empty() {
            return Ok(None);
        }
        Ok(Some(SemaphoreSnapshot { limit: record.limit, slots }))
    }
}
