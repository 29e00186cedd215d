//! Lock provider and per-key handles.

use super::{LockAdapter, LockEvent, LockState};
use crate::blocking::{poll_until, BlockingOptions, ProviderBuildError};
use crate::bus::EventBus;
use crate::error::LockError;
use crate::key::{Key, Namespace};
use crate::time::{Sleeper, TokioSleeper};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

#[derive(Clone)]
struct LockDefaults {
    ttl: Option<Duration>,
    blocking: BlockingOptions,
    refresh_ttl: Duration,
}

impl Default for LockDefaults {
    fn default() -> Self {
        Self {
            ttl: Some(Duration::from_secs(300)),
            blocking: BlockingOptions::default(),
            refresh_ttl: Duration::from_secs(300),
        }
    }
}

/// Creates per-key [`Lock`] handles over one adapter and namespace.
pub struct LockProvider {
    adapter: Arc<dyn LockAdapter>,
    namespace: Namespace,
    bus: Option<EventBus<LockEvent>>,
    defaults: LockDefaults,
    sleeper: Arc<dyn Sleeper>,
}

impl std::fmt::Debug for LockProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LockProvider").field("namespace", &self.namespace).finish()
    }
}

pub struct LockProviderBuilder {
    adapter: Arc<dyn LockAdapter>,
    namespace: Option<Namespace>,
    bus: Option<EventBus<LockEvent>>,
    defaults: LockDefaults,
    sleeper: Arc<dyn Sleeper>,
}

impl LockProviderBuilder {
    pub fn namespace(mut self, namespace: Namespace) -> Self {
        self.namespace = Some(namespace);
        self
    }

    /// Default TTL for new handles. Locks default to five minutes rather
    /// than unexpireable so a crashed holder cannot wedge a key forever.
    pub fn default_ttl(mut self, ttl: Duration) -> Self {
        self.defaults.ttl = Some(ttl);
        self
    }

    /// Make new handles unexpireable unless a TTL is set per handle.
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

    pub fn event_bus(mut self, bus: EventBus<LockEvent>) -> Self {
        self.bus = Some(bus);
        self
    }

    pub fn sleeper(mut self, sleeper: impl Sleeper + 'static) -> Self {
        self.sleeper = Arc::new(sleeper);
        self
    }

    pub fn build(self) -> Result<LockProvider, ProviderBuildError> {
        if self.defaults.blocking.interval.is_zero() {
            return Err(ProviderBuildError::ZeroBlockingInterval);
        }
        if self.defaults.refresh_ttl.is_zero() {
            return Err(ProviderBuildError::ZeroRefreshTtl);
        }
        let namespace = self
            .namespace
            .unwrap_or_else(|| Namespace::new("lock").expect("static namespace is valid"));
        Ok(LockProvider {
            adapter: self.adapter,
            namespace,
            bus: self.bus,
            defaults: self.defaults,
            sleeper: self.sleeper,
        })
    }
}

impl LockProvider {
    pub fn builder(adapter: impl LockAdapter + 'static) -> LockProviderBuilder {
        LockProviderBuilder {
            adapter: Arc::new(adapter),
            namespace: None,
            bus: None,
            defaults: LockDefaults::default(),
            sleeper: Arc::new(TokioSleeper),
        }
    }

    /// A handle for `key` with a generated owner id and provider defaults.
    pub fn create(&self, key: &str) -> Result<Lock, LockError> {
        self.create_with(key, LockOptions::new())
    }

    /// A handle for `key` with per-handle overrides.
    pub fn create_with(&self, key: &str, options: LockOptions) -> Result<Lock, LockError> {
        let key = Key::parse(key)?;
        Ok(Lock {
            adapter: Arc::clone(&self.adapter),
            bus: self.bus.clone(),
            key: self.namespace.qualify(&key),
            lock_id: options.lock_id.unwrap_or_else(|| Uuid::new_v4().to_string()),
            ttl: options.ttl.unwrap_or(self.defaults.ttl),
            blocking: self.defaults.blocking,
            refresh_ttl: self.defaults.refresh_ttl,
            sleeper: Arc::clone(&self.sleeper),
        })
    }
}

/// Per-handle overrides for [`LockProvider::create_with`].
#[derive(Debug, Clone, Default)]
pub struct LockOptions {
    ttl: Option<Option<Duration>>,
    lock_id: Option<String>,
}

impl LockOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(Some(ttl));
        self
    }

    /// The lock never expires; only `release` or `force_release` frees it.
    pub fn unexpireable(mut self) -> Self {
        self.ttl = Some(None);
        self
    }

    /// Reuse an owner identity instead of generating one, e.g. to share a
    /// lock across processes of one logical owner.
    pub fn lock_id(mut self, lock_id: impl Into<String>) -> Self {
        self.lock_id = Some(lock_id.into());
        self
    }
}

/// Per-key, per-owner lock handle.
///
/// Handles are cheap to clone and safe to use from any task; clones share
/// the owner identity.
#[derive(Clone)]
pub struct Lock {
    adapter: Arc<dyn LockAdapter>,
    bus: Option<EventBus<LockEvent>>,
    key: String,
    lock_id: String,
    ttl: Option<Duration>,
    blocking: BlockingOptions,
    refresh_ttl: Duration,
    sleeper: Arc<dyn Sleeper>,
}

impl std::fmt::Debug for Lock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Lock")
            .field("key", &self.key)
            .field("lock_id", &self.lock_id)
            .field("ttl", &self.ttl)
            .finish()
    }
}

impl Lock {
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn lock_id(&self) -> &str {
        &self.lock_id
    }

    fn emit(&self, event: LockEvent) {
        if let Some(bus) = &self.bus {
            bus.dispatch(event);
        }
    }

    fn unexpected<E: Into<LockError>>(&self, error: E) -> LockError {
        let error = error.into();
        tracing::warn!(key = %self.key, %error, "lock driver error");
        self.emit(LockEvent::UnexpectedError { key: self.key.clone(), message: error.to_string() });
        error
    }

    /// Try to take the lock. Returns whether this owner now holds it.
    pub async fn acquire(&self) -> Result<bool, LockError> {
        match self.adapter.acquire(&self.key, &self.lock_id, self.ttl).await {
            Ok(true) => {
                self.emit(LockEvent::Acquired {
                    key: self.key.clone(),
                    owner: self.lock_id.clone(),
                });
                Ok(true)
            }
            Ok(false) => {
                self.emit(LockEvent::Unavailable {
                    key: self.key.clone(),
                    owner: self.lock_id.clone(),
                });
                Ok(false)
            }
            Err(error) => Err(self.unexpected(error)),
        }
    }

    /// Like [`Lock::acquire`], but an unavailable lock is an error.
    pub async fn acquire_or_fail(&self) -> Result<(), LockError> {
        if self.acquire().await? {
            Ok(())
        } else {
            Err(LockError::FailedAcquire { key: self.key.clone() })
        }
    }

    /// Poll `acquire` on the provider's default budget.
    pub async fn acquire_blocking(&self) -> Result<bool, LockError> {
        self.acquire_blocking_with(self.blocking).await
    }

    /// Poll `acquire` every `options.interval` until it succeeds or
    /// `options.time` elapses.
    pub async fn acquire_blocking_with(
        &self,
        options: BlockingOptions,
    ) -> Result<bool, LockError> {
        poll_until(options, self.sleeper.as_ref(), || self.acquire()).await
    }

    /// Give the lock back. Returns false when this owner doesn't hold it.
    pub async fn release(&self) -> Result<bool, LockError> {
        match self.adapter.release(&self.key, &self.lock_id).await {
            Ok(true) => {
                self.emit(LockEvent::Released {
                    key: self.key.clone(),
                    owner: self.lock_id.clone(),
                });
                Ok(true)
            }
            Ok(false) => {
                self.emit(LockEvent::FailedRelease {
                    key: self.key.clone(),
                    owner: self.lock_id.clone(),
                });
                Ok(false)
            }
            Err(error) => Err(self.unexpected(error)),
        }
    }

    pub async fn release_or_fail(&self) -> Result<(), LockError> {
        if self.release().await? {
            Ok(())
        } else {
            Err(LockError::FailedRelease { key: self.key.clone() })
        }
    }

    /// Extend the TTL using the provider's default refresh TTL.
    pub async fn refresh(&self) -> Result<bool, LockError> {
        self.refresh_with(self.refresh_ttl).await
    }

    /// Extend the TTL. Fails (false) for non-owners and unexpireable locks.
    pub async fn refresh_with(&self, ttl: Duration) -> Result<bool, LockError> {
        match self.adapter.refresh(&self.key, &self.lock_id, ttl).await {
            Ok(true) => {
                self.emit(LockEvent::Refreshed {
                    key: self.key.clone(),
                    owner: self.lock_id.clone(),
                });
                Ok(true)
            }
            Ok(false) => {
                self.emit(LockEvent::FailedRefresh {
                    key: self.key.clone(),
                    owner: self.lock_id.clone(),
                });
                Ok(false)
            }
            Err(error) => Err(self.unexpected(error)),
        }
    }

    pub async fn refresh_or_fail(&self) -> Result<(), LockError> {
        if self.refresh().await? {
            Ok(())
        } else {
            Err(LockError::FailedRefresh { key: self.key.clone() })
        }
    }

    /// Evict whoever holds the key. Returns whether a live record existed.
    pub async fn force_release(&self) -> Result<bool, LockError> {
        match self.adapter.force_release(&self.key).await {
            Ok(existed) => {
                if existed {
                    self.emit(LockEvent::ForceReleased { key: self.key.clone() });
                }
                Ok(existed)
            }
            Err(error) => Err(self.unexpected(error)),
        }
    }

    /// The live record for this key, if any.
    pub async fn state(&self) -> Result<Option<LockState>, LockError> {
        self.adapter.state(&self.key).await.map_err(|error| self.unexpected(error))
    }

    /// Whether this handle's owner currently holds the key.
    pub async fn is_held_by_self(&self) -> Result<bool, LockError> {
        Ok(self.state().await?.is_some_and(|state| state.owner == self.lock_id))
    }

    /// Acquire, run `operation`, and release on every path (including drop
    /// mid-flight). Fails with `FailedAcquire` when the lock is taken.
    pub async fn run<T, F>(&self, operation: F) -> Result<T, LockError>
    where
        F: Future<Output = T> + Send,
    {
        if !self.acquire().await? {
            return Err(LockError::FailedAcquire { key: self.key.clone() });
        }
        self.guarded(operation).await
    }

    /// Like [`Lock::run`], but waits for the lock on the blocking budget.
    pub async fn run_blocking<T, F>(&self, operation: F) -> Result<T, LockError>
    where
        F: Future<Output = T> + Send,
    {
        if !self.acquire_blocking().await? {
            return Err(LockError::FailedAcquire { key: self.key.clone() });
        }
        self.guarded(operation).await
    }

    async fn guarded<T, F>(&self, operation: F) -> Result<T, LockError>
    where
        F: Future<Output = T> + Send,
    {
        let guard = ReleaseGuard { lock: Some(self.clone()) };
        let value = operation.await;
        guard.release_now().await?;
        Ok(value)
    }
}

/// Releases the lock if the critical section is dropped before completing.
struct ReleaseGuard {
    lock: Option<Lock>,
}

impl ReleaseGuard {
    async fn release_now(mut self) -> Result<bool, LockError> {
        match self.lock.take() {
            Some(lock) => lock.release().await,
            None => Ok(false),
        }
    }
}

impl Drop for ReleaseGuard {
    fn drop(&mut self) {
        if let Some(lock) = self.lock.take() {
            if let Ok(handle) = tokio::runtime::Handle::try_current() {
                handle.spawn(async move {
                    let _ = lock.release().await;
                });
            }
        }
    }
}
