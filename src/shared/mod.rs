//! Distributed shared lock: one writer or many readers, never both.

mod adapter;
mod memory;
mod provider;

pub use adapter::{SharedLockAdapter, SharedLockSnapshot};
pub use memory::MemorySharedLockAdapter;
pub use provider::{
    SharedLock, SharedLockOptions, SharedLockProvider, SharedLockProviderBuilder, SharedLockState,
};
