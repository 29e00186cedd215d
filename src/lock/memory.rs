//! In-memory lock storage.

use super::{LockAdapter, LockState};
use crate::error::AdapterError;
use crate::time::{Clock, MonotonicClock};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Debug, Clone)]
struct Record {
    owner: String,
    /// Clock-millis deadline; `None` means unexpireable.
    expires_at: Option<u64>,
}

impl Record {
    fn is_live(&self, now: u64) -> bool {
        match self.expires_at {
            Some(deadline) => deadline > now,
            None => true,
        }
    }
}

/// Reference adapter: one record per key behind a mutex.
///
/// The table lock is never held across an await point. Expiry uses an
/// injected [`Clock`], so TTL behavior is testable without real sleeps.
pub struct MemoryLockAdapter {
    clock: Arc<dyn Clock>,
    records: Mutex<HashMap<String, Record>>,
}

impl std::fmt::Debug for MemoryLockAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryLockAdapter").finish()
    }
}

impl Default for MemoryLockAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryLockAdapter {
    pub fn new() -> Self {
        Self::with_clock(MonotonicClock::default())
    }

    /// Override the clock (deterministic expiry tests).
    pub fn with_clock(clock: impl Clock + 'static) -> Self {
        Self { clock: Arc::new(clock), records: Mutex::new(HashMap::new()) }
    }

    fn deadline(&self, now: u64, ttl: Option<Duration>) -> Option<u64> {
        ttl.map(|ttl| now.saturating_add(ttl.as_millis() as u64))
    }

    fn table(&self) -> std::sync::MutexGuard<'_, HashMap<String, Record>> {
        self.records.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl LockAdapter for MemoryLockAdapter {
    async fn acquire(
        &self,
        key: &str,
        lock_id: &str,
        ttl: Option<Duration>,
    ) -> Result<bool, AdapterError> {
        let now = self.clock.now_millis();
        let mut table = self.table();

        match table.get(key) {
            Some(record) if record.is_live(now) => Ok(record.owner == lock_id),
            _ => {
                table.insert(
                    key.to_string(),
                    Record { owner: lock_id.to_string(), expires_at: self.deadline(now, ttl) },
                );
                Ok(true)
            }
        }
    }

    async fn release(&self, key: &str, lock_id: &str) -> Result<bool, AdapterError> {
        let now = self.clock.now_millis();
        let mut table = self.table();

        match table.get(key) {
            Some(record) if record.is_live(now) && record.owner == lock_id => {
                table.remove(key);
                Ok(true)
            }
            Some(record) if !record.is_live(now) => {
                table.remove(key);
                Ok(false)
            }
            _ => Ok(false),
        }
    }

    async fn refresh(
        &self,
        key: &str,
        lock_id: &str,
        ttl: Duration,
    ) -> Result<bool, AdapterError> {
        let now = self.clock.now_millis();
        let mut table = self.table();

        match table.get_mut(key) {
            Some(record) if record.is_live(now) => {
                if record.owner != lock_id || record.expires_at.is_none() {
                    return Ok(false);
                }
                record.expires_at = self.deadline(now, Some(ttl));
                Ok(true)
            }
            Some(_) => {
                table.remove(key);
                Ok(false)
            }
            None => Ok(false),
        }
    }

    async fn force_release(&self, key: &str) -> Result<bool, AdapterError> {
        let now = self.clock.now_millis();
        let mut table = self.table();

        match table.remove(key) {
            Some(record) => Ok(record.is_live(now)),
            None => Ok(false),
        }
    }

    async fn state(&self, key: &str) -> Result<Option<LockState>, AdapterError> {
        let now = self.clock.now_millis();
        let table = self.table();

        Ok(table.get(key).filter(|record| record.is_live(now)).map(|record| LockState {
            owner: record.owner.clone(),
            remaining_ttl: record
                .expires_at
                .map(|deadline| Duration::from_millis(deadline.saturating_sub(now))),
        }))
    }
}
