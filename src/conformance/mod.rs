//! Contract test suites for third-party storage drivers.
//!
//! Every primitive publishes an adapter trait; a driver is conformant only
//! if it passes the suite for that trait. Each suite is an async function
//! taking the adapter under test; call it from the driver crate's
//! integration tests:
//!
//! ```
//! use latchkey::conformance;
//! use latchkey::lock::MemoryLockAdapter;
//!
//! #[tokio::main]
//! async fn main() {
//!     conformance::lock_contract(&MemoryLockAdapter::new()).await;
//! }
//! ```
//!
//! Suites use real (short) sleeps for TTL checks and uuid-suffixed keys, so
//! they are safe to run repeatedly against a shared store.

mod breaker;
mod lock;
mod semaphore;
mod shared;

pub use breaker::breaker_contract;
pub use lock::lock_contract;
pub use semaphore::semaphore_contract;
pub use shared::shared_lock_contract;

pub(crate) fn unique_key(prefix: &str) -> String {
    format!("conformance/{}/{}", prefix, uuid::Uuid::new_v4())
}
