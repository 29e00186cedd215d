//! Blocking-acquisition settings shared by the coordination primitives.
//!
//! Acquisition is opportunistic polling: no queue, no fairness across
//! waiters. A blocking acquire simply retries `acquire` on a fixed interval
//! until it succeeds or the time budget runs out.

use crate::time::Sleeper;
use std::future::Future;
use std::time::Duration;

/// Provider construction failures shared by every primitive's builder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderBuildError {
    ZeroBlockingInterval,
    ZeroRefreshTtl,
}

impl std::fmt::Display for ProviderBuildError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProviderBuildError::ZeroBlockingInterval => {
                write!(f, "default_blocking_interval must be > 0")
            }
            ProviderBuildError::ZeroRefreshTtl => write!(f, "default_refresh_ttl must be > 0"),
        }
    }
}

impl std::error::Error for ProviderBuildError {}

/// How long to keep polling, and how often.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockingOptions {
    pub time: Duration,
    pub interval: Duration,
}

impl BlockingOptions {
    pub fn new(time: Duration, interval: Duration) -> Self {
        Self { time, interval }
    }
}

impl Default for BlockingOptions {
    fn default() -> Self {
        Self { time: Duration::from_secs(10), interval: Duration::from_millis(50) }
    }
}

/// Poll `attempt` until it returns true or the budget elapses.
///
/// The budget is accounted in interval steps rather than wall-clock reads, so
/// a test [`Sleeper`](crate::time::Sleeper) that skips real sleeps still
/// terminates after the same number of polls.
pub(crate) async fn poll_until<F, Fut, Err>(
    options: BlockingOptions,
    sleeper: &dyn Sleeper,
    mut attempt: F,
) -> Result<bool, Err>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<bool, Err>>,
{
    // A zero interval would spin forever; treat it as one poll step.
    let interval = options.interval.max(Duration::from_millis(1));
    let mut remaining = options.time;

    loop {
        if attempt().await? {
            return Ok(true);
        }
        if remaining.is_zero() {
            return Ok(false);
        }
        sleeper.sleep(interval.min(remaining)).await;
        remaining = remaining.saturating_sub(interval);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::{InstantSleeper, TrackingSleeper};
    use std::convert::Infallible;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn immediate_success_never_sleeps() {
        let sleeper = TrackingSleeper::new();
        let ok = poll_until(BlockingOptions::default(), &sleeper, || async {
            Ok::<_, Infallible>(true)
        })
        .await
        .unwrap();
        assert!(ok);
        assert_eq!(sleeper.calls(), 0);
    }

    #[tokio::test]
    async fn gives_up_when_the_budget_elapses() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let counter = attempts.clone();
        let options =
            BlockingOptions::new(Duration::from_millis(50), Duration::from_millis(10));

        let ok = poll_until(options, &InstantSleeper, move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok::<_, Infallible>(false)
            }
        })
        .await
        .unwrap();

        assert!(!ok);
        assert_eq!(attempts.load(Ordering::SeqCst), 6, "polls at 0,10,20,30,40,50");
    }

    #[tokio::test]
    async fn succeeds_mid_budget() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let counter = attempts.clone();
        let options = BlockingOptions::new(Duration::from_secs(10), Duration::from_millis(10));

        let ok = poll_until(options, &InstantSleeper, move || {
            let counter = counter.clone();
            async move { Ok::<_, Infallible>(counter.fetch_add(1, Ordering::SeqCst) == 2) }
        })
        .await
        .unwrap();

        assert!(ok);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn errors_propagate_immediately() {
        let outcome = poll_until(BlockingOptions::default(), &InstantSleeper, || async {
            Err::<bool, &str>("driver down")
        })
        .await;
        assert_eq!(outcome.unwrap_err(), "driver down");
    }
}
