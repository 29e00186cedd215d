//! Distributed exclusive lock: owner-fenced, TTL-expiring, driver-backed.

mod adapter;
mod events;
mod memory;
mod provider;

pub use adapter::{LockAdapter, LockState};
pub use events::LockEvent;
pub use memory::MemoryLockAdapter;
pub use provider::{Lock, LockOptions, LockProvider, LockProviderBuilder};
