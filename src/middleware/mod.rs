//! Resilience middlewares for the [`Hooks`](crate::hooks::Hooks) pipeline.
//!
//! Each middleware is an independent policy value; compose them with
//! `pipe`. The first middleware piped is outermost, so a typical stack is
//! fallback → retry → breaker gate → bulkhead → timeout → operation.

mod bulkhead;
mod fallback;
mod hedge;
mod observe;
mod retry;
mod timeout;

pub use bulkhead::{Bulkhead, BulkheadBuildError};
pub use fallback::Fallback;
pub use hedge::Hedge;
pub use observe::Observe;
pub use retry::{Retry, RetryBuildError, RetryBuilder};
pub use timeout::{Timeout, TimeoutError, MAX_TIMEOUT};
