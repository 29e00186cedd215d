//! Distributed counting semaphore: bounded slots with per-slot TTLs.

mod adapter;
mod events;
mod memory;
mod provider;

pub use adapter::{SemaphoreAdapter, SemaphoreSnapshot};
pub use events::SemaphoreEvent;
pub use memory::MemorySemaphoreAdapter;
pub use provider::{
    Semaphore, SemaphoreOptions, SemaphoreProvider, SemaphoreProviderBuilder, SemaphoreState,
};
