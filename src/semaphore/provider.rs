//! Semaphore provider and per-key handles.

use super::{SemaphoreAdapter, SemaphoreEvent, SemaphoreSnapshot};
use crate::blocking::{poll_until, BlockingOptions, ProviderBuildError};
use crate::bus::EventBus;
use crate::error::SemaphoreError;
use crate::key::{Key, Namespace};
use crate::time::{Sleeper, TokioSleeper};
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// What a handle sees when it inspects its key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SemaphoreState {
    /// This handle held a slot that has since expired.
    Expired,
    /// No slot for this handle and the key is at its limit.
    LimitReached { limit: u32, acquired: u32 },
    /// No slot for this handle; capacity remains.
    Unacquired { limit: u32, acquired: u32 },
    /// This handle holds a live slot.
    Acquired { limit: u32, acquired: u32, remaining_ttl: Option<Duration> },
}

#[derive(Clone)]
struct SemaphoreDefaults {
    limit: u32,
    ttl: Option<Duration>,
    blocking: BlockingOptions,
    refresh_ttl: Duration,
}

impl Default for SemaphoreDefaults {
    fn default() -> Self {
        Self {
            limit: 1,
            ttl: Some(Duration::from_secs(300)),
            blocking: BlockingOptions::default(),
            refresh_ttl: Duration::from_secs(300),
        }
    }
}

/// Creates per-key [`Semaphore`] handles over one adapter and namespace.
pub struct SemaphoreProvider {
    adapter: Arc<dyn SemaphoreAdapter>,
    namespace: Namespace,
    bus: Option<EventBus<SemaphoreEvent>>,
    defaults: SemaphoreDefaults,
    sleeper: Arc<dyn Sleeper>,
}

impl std::fmt::Debug for SemaphoreProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SemaphoreProvider").field("namespace", &self.namespace).finish()
    }
}

pub struct SemaphoreProviderBuilder {
    adapter: Arc<dyn SemaphoreAdapter>,
    namespace: Option<Namespace>,
    bus: Option<EventBus<SemaphoreEvent>>,
    defaults: SemaphoreDefaults,
    sleeper: Arc<dyn Sleeper>,
}

impl SemaphoreProviderBuilder {
    pub fn namespace(mut self, namespace: Namespace) -> Self {
        self.namespace = Some(namespace);
        self
    }

    pub fn default_limit(mut self, limit: u32) -> Self {
        self.defaults.limit = limit;
        self
    }

    pub fn default_ttl(mut self, ttl: Duration) -> Self {
        self.defaults.ttl = Some(ttl);
        self
    }

    pub fn default_unexpireable(mut self) -> Self {
        self.defaults.ttl = None;
        self
    }

    pub fn default_blocking_time(mut self, time: Duration) -> Self {
        self.defaults.blocking.time = time;
        self
    }

    pub fn default_blocking_interval(mut self, interval: Duration) -> Self {
        self.defaults.blocking.interval = interval;
        self
    }

    pub fn default_refresh_ttl(mut self, ttl: Duration) -> Self {
        self.defaults.refresh_ttl = ttl;
        self
    }

    pub fn event_bus(mut self, bus: EventBus<SemaphoreEvent>) -> Self {
        self.bus = Some(bus);
        self
    }

    pub fn sleeper(mut self, sleeper: impl Sleeper + 'static) -> Self {
        self.sleeper = Arc::new(sleeper);
        self
    }

    pub fn build(self) -> Result<SemaphoreProvider, ProviderBuildError> {
        if self.defaults.blocking.interval.is_zero() {
            return Err(ProviderBuildError::ZeroBlockingInterval);
        }
        if self.defaults.refresh_ttl.is_zero() {
            return Err(ProviderBuildError::ZeroRefreshTtl);
        }
        let namespace = self
            .namespace
            .unwrap_or_else(|| Namespace::new("semaphore").expect("static namespace is valid"));
        Ok(SemaphoreProvider {
            adapter: self.adapter,
            namespace,
            bus: self.bus,
            defaults: self.defaults,
            sleeper: self.sleeper,
        })
    }
}

impl SemaphoreProvider {
    pub fn builder(adapter: impl SemaphoreAdapter + 'static) -> SemaphoreProviderBuilder {
        SemaphoreProviderBuilder {
            adapter: Arc::new(adapter),
            namespace: None,
            bus: None,
            defaults: SemaphoreDefaults::default(),
            sleeper: Arc::new(TokioSleeper),
        }
    }

    /// A handle for `key` with a generated slot id and provider defaults.
    pub fn create(&self, key: &str) -> Result<Semaphore, SemaphoreError> {
        self.create_with(key, SemaphoreOptions::new())
    }

    /// A handle for `key` with per-handle overrides.
    pub fn create_with(
        &self,
        key: &str,
        options: SemaphoreOptions,
    ) -> Result<Semaphore, SemaphoreError> {
        let key = Key::parse(key)?;
        Ok(Semaphore {
            adapter: Arc::clone(&self.adapter),
            bus: self.bus.clone(),
            key: self.namespace.qualify(&key),
            slot_id: options.slot_id.unwrap_or_else(|| Uuid::new_v4().to_string()),
            limit: options.limit.unwrap_or(self.defaults.limit),
            ttl: options.ttl.unwrap_or(self.defaults.ttl),
            blocking: self.defaults.blocking,
            refresh_ttl: self.defaults.refresh_ttl,
            sleeper: Arc::clone(&self.sleeper),
            held: Arc::new(AtomicBool::new(false)),
        })
    }
}

/// Per-handle overrides for [`SemaphoreProvider::create_with`].
#[derive(Debug, Clone, Default)]
pub struct SemaphoreOptions {
    limit: Option<u32>,
    ttl: Option<Option<Duration>>,
    slot_id: Option<String>,
}

impl SemaphoreOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Requested limit; only binds if this handle's acquire creates the key.
    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(Some(ttl));
        self
    }

    pub fn unexpireable(mut self) -> Self {
        self.ttl = Some(None);
        self
    }

    pub fn slot_id(mut self, slot_id: impl Into<String>) -> Self {
        self.slot_id = Some(slot_id.into());
        self
    }
}

/// Per-key, per-slot semaphore handle.
#[derive(Clone)]
pub struct Semaphore {
    adapter: Arc<dyn SemaphoreAdapter>,
    bus: Option<EventBus<SemaphoreEvent>>,
    key: String,
    slot_id: String,
    limit: u32,
    ttl: Option<Duration>,
    blocking: BlockingOptions,
    refresh_ttl: Duration,
    sleeper: Arc<dyn Sleeper>,
    /// Set once this handle has held a slot; lets `state` distinguish a slot
    /// that expired from one never acquired.
    held: Arc<AtomicBool>,
}

impl std::fmt::Debug for Semaphore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Semaphore")
            .field("key", &self.key)
            .field("slot_id", &self.slot_id)
            .field("limit", &self.limit)
            .finish()
    }
}

impl Semaphore {
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn slot_id(&self) -> &str {
        &self.slot_id
    }

    fn emit(&self, event: SemaphoreEvent) {
        if let Some(bus) = &self.bus {
            bus.dispatch(event);
        }
    }

    fn unexpected<E: Into<SemaphoreError>>(&self, error: E) -> SemaphoreError {
        let error = error.into();
        tracing::warn!(key = %self.key, %error, "semaphore driver error");
        self.emit(SemaphoreEvent::UnexpectedError {
            key: self.key.clone(),
            message: error.to_string(),
        });
        error
    }

    /// Try to take a slot. Returns whether this handle now holds one.
    pub async fn acquire(&self) -> Result<bool, SemaphoreError> {
        match self.adapter.acquire(&self.key, &self.slot_id, self.limit, self.ttl).await {
            Ok(true) => {
                self.held.store(true, Ordering::Release);
                self.emit(SemaphoreEvent::Acquired {
                    key: self.key.clone(),
                    slot_id: self.slot_id.clone(),
                });
                Ok(true)
            }
            Ok(false) => {
                self.emit(SemaphoreEvent::LimitReached {
                    key: self.key.clone(),
                    slot_id: self.slot_id.clone(),
                });
                Ok(false)
            }
            Err(error) => Err(self.unexpected(error)),
        }
    }

    /// Like [`Semaphore::acquire`], but a full semaphore is an error.
    pub async fn acquire_or_fail(&self) -> Result<(), SemaphoreError> {
        if self.acquire().await? {
            Ok(())
        } else {
            Err(SemaphoreError::LimitReached { key: self.key.clone(), limit: self.limit })
        }
    }

    /// Poll `acquire` on the provider's default budget.
    pub async fn acquire_blocking(&self) -> Result<bool, SemaphoreError> {
        self.acquire_blocking_with(self.blocking).await
    }

    pub async fn acquire_blocking_with(
        &self,
        options: BlockingOptions,
    ) -> Result<bool, SemaphoreError> {
        poll_until(options, self.sleeper.as_ref(), || self.acquire()).await
    }

    /// Give the slot back. Returns false when this handle holds none.
    pub async fn release(&self) -> Result<bool, SemaphoreError> {
        match self.adapter.release(&self.key, &self.slot_id).await {
            Ok(true) => {
                self.held.store(false, Ordering::Release);
                self.emit(SemaphoreEvent::Released {
                    key: self.key.clone(),
                    slot_id: self.slot_id.clone(),
                });
                Ok(true)
            }
            Ok(false) => {
                self.emit(SemaphoreEvent::FailedRelease {
                    key: self.key.clone(),
                    slot_id: self.slot_id.clone(),
                });
                Ok(false)
            }
            Err(error) => Err(self.unexpected(error)),
        }
    }

    pub async fn release_or_fail(&self) -> Result<(), SemaphoreError> {
        if self.release().await? {
            Ok(())
        } else {
            Err(SemaphoreError::FailedRelease { key: self.key.clone() })
        }
    }

    /// Extend this slot's TTL using the provider default.
    pub async fn refresh(&self) -> Result<bool, SemaphoreError> {
        self.refresh_with(self.refresh_ttl).await
    }

    pub async fn refresh_with(&self, ttl: Duration) -> Result<bool, SemaphoreError> {
        match self.adapter.refresh(&self.key, &self.slot_id, ttl).await {
            Ok(true) => {
                self.emit(SemaphoreEvent::Refreshed {
                    key: self.key.clone(),
                    slot_id: self.slot_id.clone(),
                });
                Ok(true)
            }
            Ok(false) => {
                self.emit(SemaphoreEvent::FailedRefresh {
                    key: self.key.clone(),
                    slot_id: self.slot_id.clone(),
                });
                Ok(false)
            }
            Err(error) => Err(self.unexpected(error)),
        }
    }

    pub async fn refresh_or_fail(&self) -> Result<(), SemaphoreError> {
        if self.refresh().await? {
            Ok(())
        } else {
            Err(SemaphoreError::FailedRefresh { key: self.key.clone() })
        }
    }

    /// Evict every holder. Returns whether any live slot existed.
    pub async fn force_release_all(&self) -> Result<bool, SemaphoreError> {
        match self.adapter.force_release_all(&self.key).await {
            Ok(existed) => {
                if existed {
                    self.emit(SemaphoreEvent::AllForceReleased { key: self.key.clone() });
                }
                self.held.store(false, Ordering::Release);
                Ok(existed)
            }
            Err(error) => Err(self.unexpected(error)),
        }
    }

    /// This handle's view of the key.
    pub async fn state(&self) -> Result<SemaphoreState, SemaphoreError> {
        let snapshot = self
            .adapter
            .state(&self.key)
            .await
            .map_err(|error| self.unexpected(error))?;

        Ok(match snapshot {
            Some(snapshot) => self.classify(snapshot),
            None if self.held.load(Ordering::Acquire) => SemaphoreState::Expired,
            None => SemaphoreState::Unacquired { limit: self.limit, acquired: 0 },
        })
    }

    fn classify(&self, snapshot: SemaphoreSnapshot) -> SemaphoreState {
        let acquired = snapshot.acquired();
        match snapshot.slots.get(&self.slot_id) {
            Some(remaining_ttl) => SemaphoreState::Acquired {
                limit: snapshot.limit,
                acquired,
                remaining_ttl: *remaining_ttl,
            },
            None if self.held.load(Ordering::Acquire) => SemaphoreState::Expired,
            None if acquired >= snapshot.limit => {
                SemaphoreState::LimitReached { limit: snapshot.limit, acquired }
            }
            None => SemaphoreState::Unacquired { limit: snapshot.limit, acquired },
        }
    }

    /// The raw driver snapshot (all live slots), if the key exists.
    pub async fn snapshot(&self) -> Result<Option<SemaphoreSnapshot>, SemaphoreError> {
        self.adapter.state(&self.key).await.map_err(|error| self.unexpected(error))
    }

    /// Acquire a slot, run `operation`, release on every path.
    pub async fn run<T, F>(&self, operation: F) -> Result<T, SemaphoreError>
    where
        F: Future<Output = T> + Send,
    {
        if !self.acquire().await? {
            return Err(SemaphoreError::LimitReached { key: self.key.clone(), limit: self.limit });
        }
        self.guarded(operation).await
    }

    /// Like [`Semaphore::run`], but waits for a slot on the blocking budget.
    pub async fn run_blocking<T, F>(&self, operation: F) -> Result<T, SemaphoreError>
    where
        F: Future<Output = T> + Send,
    {
        if !self.acquire_blocking().await? {
            return Err(SemaphoreError::LimitReached { key: self.key.clone(), limit: self.limit });
        }
        self.guarded(operation).await
    }

    async fn guarded<T, F>(&self, operation: F) -> Result<T, SemaphoreError>
    where
        F: Future<Output = T> + Send,
    {
        let guard = SlotGuard { semaphore: Some(self.clone()) };
        let value = operation.await;
        guard.release_now().await?;
        Ok(value)
    }
}

/// Releases the slot if the critical section is dropped before completing.
struct SlotGuard {
    semaphore: Option<Semaphore>,
}

impl SlotGuard {
    async fn release_now(mut self) -> Result<bool, SemaphoreError> {
        match self.semaphore.take() {
            Some(semaphore) => semaphore.release().await,
            None => Ok(false),
        }
    }
}

impl Drop for SlotGuard {
    fn drop(&mut self) {
        if let Some(semaphore) = self.semaphore.take() {
            if let Ok(handle) = tokio::runtime::Handle::try_current() {
                handle.spawn(async move {
                    let _ = semaphore.release().await;
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::MemorySemaphoreAdapter;
    use super::*;
    use crate::time::{InstantSleeper, ManualClock};

    fn provider_with(limit: u32) -> SemaphoreProvider {
        SemaphoreProvider::builder(MemorySemaphoreAdapter::new())
            .default_limit(limit)
            .sleeper(InstantSleeper)
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn slots_are_bounded_by_the_limit() {
        let provider = provider_with(2);
        let a = provider.create("k").unwrap();
        let b = provider.create("k").unwrap();
        let c = provider.create("k").unwrap();

        assert!(a.acquire().await.unwrap());
        assert!(b.acquire().await.unwrap());
        assert!(!c.acquire().await.unwrap());

        assert!(b.release().await.unwrap());
        assert!(c.acquire().await.unwrap());
    }

    #[tokio::test]
    async fn or_fail_variants_convert_false_to_errors() {
        let provider = provider_with(1);
        let a = provider.create("k").unwrap();
        let b = provider.create("k").unwrap();

        a.acquire_or_fail().await.unwrap();
        assert_eq!(
            b.acquire_or_fail().await.unwrap_err(),
            SemaphoreError::LimitReached { key: "semaphore/k".into(), limit: 1 }
        );
        assert_eq!(
            b.release_or_fail().await.unwrap_err(),
            SemaphoreError::FailedRelease { key: "semaphore/k".into() }
        );
        assert_eq!(
            b.refresh_or_fail().await.unwrap_err(),
            SemaphoreError::FailedRefresh { key: "semaphore/k".into() }
        );
    }

    #[tokio::test]
    async fn state_classifies_the_callers_view() {
        let provider = provider_with(1);
        let a = provider.create("k").unwrap();
        let b = provider.create("k").unwrap();

        assert_eq!(
            a.state().await.unwrap(),
            SemaphoreState::Unacquired { limit: 1, acquired: 0 }
        );

        a.acquire().await.unwrap();
        assert!(matches!(
            a.state().await.unwrap(),
            SemaphoreState::Acquired { limit: 1, acquired: 1, remaining_ttl: Some(_) }
        ));
        assert_eq!(
            b.state().await.unwrap(),
            SemaphoreState::LimitReached { limit: 1, acquired: 1 }
        );
    }

    #[tokio::test]
    async fn an_expired_slot_reads_as_expired() {
        let clock = ManualClock::new();
        let provider = SemaphoreProvider::builder(MemorySemaphoreAdapter::with_clock(clock.clone()))
            .default_ttl(Duration::from_millis(50))
            .sleeper(InstantSleeper)
            .build()
            .unwrap();
        let a = provider.create("k").unwrap();

        a.acquire().await.unwrap();
        clock.advance(80);
        assert_eq!(a.state().await.unwrap(), SemaphoreState::Expired);
    }

    #[tokio::test]
    async fn blocking_acquire_waits_for_capacity() {
        let provider = provider_with(1);
        let a = provider.create("k").unwrap();
        let b = provider.create("k").unwrap();

        a.acquire().await.unwrap();
        let waiter = tokio::spawn(async move {
            b.acquire_blocking_with(BlockingOptions::new(
                Duration::from_secs(5),
                Duration::from_millis(5),
            ))
            .await
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        a.release().await.unwrap();
        assert!(waiter.await.unwrap().unwrap());
    }

    #[tokio::test]
    async fn run_releases_the_slot_on_every_path() {
        let provider = provider_with(1);
        let a = provider.create("k").unwrap();
        let b = provider.create("k").unwrap();

        assert_eq!(a.run(async { 7 }).await.unwrap(), 7);
        assert!(b.acquire().await.unwrap(), "slot came back after run");
        b.release().await.unwrap();

        a.acquire().await.unwrap();
        let err = b.run(async { 7 }).await.unwrap_err();
        assert_eq!(err, SemaphoreError::LimitReached { key: "semaphore/k".into(), limit: 1 });
    }

    #[tokio::test]
    async fn events_are_dispatched_for_the_lifecycle() {
        let bus = EventBus::new();
        let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
        let sink = seen.clone();
        bus.subscribe(move |event: SemaphoreEvent| {
            let sink = sink.clone();
            async move {
                sink.lock().unwrap().push(event.name());
                Ok(())
            }
        });

        let provider = SemaphoreProvider::builder(MemorySemaphoreAdapter::new())
            .default_limit(1)
            .event_bus(bus)
            .sleeper(InstantSleeper)
            .build()
            .unwrap();
        let a = provider.create("k").unwrap();
        let b = provider.create("k").unwrap();

        a.acquire().await.unwrap();
        assert!(!b.acquire().await.unwrap());
        a.refresh().await.unwrap();
        a.release().await.unwrap();
        a.acquire().await.unwrap();
        a.force_release_all().await.unwrap();

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(
            *seen.lock().unwrap(),
            vec![
                "ACQUIRED",
                "LIMIT_REACHED",
                "REFRESHED",
                "RELEASED",
                "ACQUIRED",
                "ALL_FORCE_RELEASED",
            ]
        );
    }

    #[tokio::test]
    async fn handle_limit_loses_to_the_stored_limit() {
        let provider = provider_with(1);
        let a = provider.create("k").unwrap();
        let b = provider.create_with("k", SemaphoreOptions::new().limit(10)).unwrap();

        a.acquire().await.unwrap();
        assert!(!b.acquire().await.unwrap(), "stored limit of 1 wins");
    }
}
