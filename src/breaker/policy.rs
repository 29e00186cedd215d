//! Breaker policies: the counting rules and transition function.

use super::{BreakerRecord, CircuitState};
use crate::backoff::Backoff;
use crate::time::TimeSpan;

/// Decides how outcomes are counted and when the state machine moves.
///
/// `evaluate` must be a pure function of the record and the clock so that
/// `update_state` is deterministic for every storage adapter.
pub trait BreakerPolicy: Send + Sync + std::fmt::Debug {
    /// Fold a failure into the record's counters.
    fn record_failure(&self, record: &mut BreakerRecord);

    /// Fold a success into the record's counters.
    fn record_success(&self, record: &mut BreakerRecord);

    /// The state the record should be in right now.
    fn evaluate(&self, record: &BreakerRecord, now_millis: u64) -> CircuitState;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyBuildError {
    ZeroFailureThreshold,
    ZeroSuccessThreshold,
}

impl std::fmt::Display for PolicyBuildError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PolicyBuildError::ZeroFailureThreshold => write!(f, "failure_threshold must be > 0"),
            PolicyBuildError::ZeroSuccessThreshold => write!(f, "success_threshold must be > 0"),
        }
    }
}

impl std::error::Error for PolicyBuildError {}

/// Consecutive-outcome policy.
///
/// Closed opens after `failure_threshold` consecutive failures (any success
/// zeroes the streak). Open waits `backoff(open_attempts)` before allowing a
/// half-open probe window, which closes after `success_threshold` successes
/// and re-opens on any failure.
#[derive(Debug, Clone)]
pub struct ConsecutivePolicy {
    failure_threshold: u32,
    success_threshold: u32,
    backoff: Backoff,
}

impl ConsecutivePolicy {
    pub fn new(
        failure_threshold: u32,
        success_threshold: u32,
        backoff: Backoff,
    ) -> Result<Self, PolicyBuildError> {
        if failure_threshold == 0 {
            return Err(PolicyBuildError::ZeroFailureThreshold);
        }
        if success_threshold == 0 {
            return Err(PolicyBuildError::ZeroSuccessThreshold);
        }
        Ok(Self { failure_threshold, success_threshold, backoff })
    }

    /// Five consecutive failures open; one probe success closes; constant
    /// thirty-second open-wait.
    pub fn default_policy() -> Self {
        Self {
            failure_threshold: 5,
            success_threshold: 1,
            backoff: Backoff::constant(TimeSpan::from_secs(30)),
        }
    }

    fn open_wait_millis(&self, open_attempts: u32) -> u64 {
        self.backoff.delay(open_attempts.max(1)).to_duration().as_millis() as u64
    }
}

impl BreakerPolicy for ConsecutivePolicy {
    fn record_failure(&self, record: &mut BreakerRecord) {
        record.failure_count = record.failure_count.saturating_add(1);
    }

    fn record_success(&self, record: &mut BreakerRecord) {
        match record.state {
            CircuitState::Closed => record.failure_count = 0,
            CircuitState::HalfOpen => {
                record.success_count = record.success_count.saturating_add(1);
            }
            CircuitState::Open | CircuitState::Isolated => {}
        }
    }

    fn evaluate(&self, record: &BreakerRecord, now_millis: u64) -> CircuitState {
        match record.state {
            // Isolation outranks every other transition.
            CircuitState::Isolated => CircuitState::Isolated,
            CircuitState::Closed => {
                if record.failure_count >= self.failure_threshold {
                    CircuitState::Open
                } else {
                    CircuitState::Closed
                }
            }
            CircuitState::Open => {
                let opened_at = record.opened_at_millis.unwrap_or(now_millis);
                let elapsed = now_millis.saturating_sub(opened_at);
                if elapsed >= self.open_wait_millis(record.open_attempts) {
                    CircuitState::HalfOpen
                } else {
                    CircuitState::Open
                }
            }
            CircuitState::HalfOpen => {
                if record.failure_count > 0 {
                    CircuitState::Open
                } else if record.success_count >= self.success_threshold {
                    CircuitState::Closed
                } else {
                    CircuitState::HalfOpen
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::apply_transition;
    use super::*;

    fn policy(failures: u32, successes: u32, wait_millis: i64) -> ConsecutivePolicy {
        ConsecutivePolicy::new(
            failures,
            successes,
            Backoff::constant(TimeSpan::from_millis(wait_millis)),
        )
        .expect("valid thresholds")
    }

    #[test]
    fn closed_opens_at_the_failure_threshold() {
        let policy = policy(3, 1, 50);
        let mut record = BreakerRecord::default();

        for _ in 0..2 {
            policy.record_failure(&mut record);
            assert_eq!(policy.evaluate(&record, 0), CircuitState::Closed);
        }
        policy.record_failure(&mut record);
        assert_eq!(policy.evaluate(&record, 0), CircuitState::Open);
    }

    #[test]
    fn success_in_closed_resets_the_streak() {
        let policy = policy(3, 1, 50);
        let mut record = BreakerRecord::default();

        policy.record_failure(&mut record);
        policy.record_failure(&mut record);
        policy.record_success(&mut record);
        assert_eq!(record.failure_count, 0);

        policy.record_failure(&mut record);
        policy.record_failure(&mut record);
        assert_eq!(policy.evaluate(&record, 0), CircuitState::Closed);
    }

    #[test]
    fn open_half_opens_after_the_backoff_wait() {
        let policy = policy(1, 1, 50);
        let mut record = BreakerRecord::default();
        policy.record_failure(&mut record);
        let next = policy.evaluate(&record, 100);
        apply_transition(&mut record, next, 100);
        assert_eq!(record.state, CircuitState::Open);

        assert_eq!(policy.evaluate(&record, 120), CircuitState::Open);
        assert_eq!(policy.evaluate(&record, 150), CircuitState::HalfOpen);
    }

    #[test]
    fn open_wait_follows_the_attempt_backoff() {
        let policy = ConsecutivePolicy::new(
            1,
            1,
            Backoff::exponential(TimeSpan::from_millis(100), 2.0),
        )
        .unwrap();
        let mut record = BreakerRecord::default();

        policy.record_failure(&mut record);
        let next = policy.evaluate(&record, 0);
        apply_transition(&mut record, next, 0);
        assert_eq!(record.open_attempts, 1);
        assert_eq!(policy.evaluate(&record, 99), CircuitState::Open);
        assert_eq!(policy.evaluate(&record, 100), CircuitState::HalfOpen);

        // Second open waits twice as long.
        apply_transition(&mut record, CircuitState::HalfOpen, 100);
        policy.record_failure(&mut record);
        let next = policy.evaluate(&record, 100);
        apply_transition(&mut record, next, 100);
        assert_eq!(record.open_attempts, 2);
        assert_eq!(policy.evaluate(&record, 299), CircuitState::Open);
        assert_eq!(policy.evaluate(&record, 300), CircuitState::HalfOpen);
    }

    #[test]
    fn half_open_closes_after_enough_successes() {
        let policy = policy(1, 3, 50);
        let mut record = BreakerRecord {
            state: CircuitState::HalfOpen,
            ..Default::default()
        };

        for _ in 0..2 {
            policy.record_success(&mut record);
            assert_eq!(policy.evaluate(&record, 0), CircuitState::HalfOpen);
        }
        policy.record_success(&mut record);
        assert_eq!(policy.evaluate(&record, 0), CircuitState::Closed);
    }

    #[test]
    fn half_open_failure_reopens() {
        let policy = policy(5, 3, 50);
        let mut record = BreakerRecord {
            state: CircuitState::HalfOpen,
            ..Default::default()
        };

        policy.record_failure(&mut record);
        assert_eq!(policy.evaluate(&record, 0), CircuitState::Open);
    }

    #[test]
    fn isolated_wins_over_everything() {
        let policy = policy(1, 1, 50);
        let record = BreakerRecord {
            state: CircuitState::Isolated,
            failure_count: 100,
            opened_at_millis: Some(0),
            ..Default::default()
        };
        assert_eq!(policy.evaluate(&record, u64::MAX), CircuitState::Isolated);
    }

    #[test]
    fn evaluation_is_deterministic() {
        let policy = policy(2, 2, 50);
        let record = BreakerRecord {
            state: CircuitState::Open,
            failure_count: 2,
            success_count: 0,
            opened_at_millis: Some(1_000),
            open_attempts: 1,
        };
        for _ in 0..10 {
            assert_eq!(policy.evaluate(&record, 1_049), CircuitState::Open);
            assert_eq!(policy.evaluate(&record, 1_050), CircuitState::HalfOpen);
        }
    }

    #[test]
    fn zero_thresholds_are_rejected() {
        let backoff = Backoff::constant(TimeSpan::from_millis(1));
        assert_eq!(
            ConsecutivePolicy::new(0, 1, backoff.clone()).unwrap_err(),
            PolicyBuildError::ZeroFailureThreshold
        );
        assert_eq!(
            ConsecutivePolicy::new(1, 0, backoff).unwrap_err(),
            PolicyBuildError::ZeroSuccessThreshold
        );
    }
}
