//! Time primitives shared by every policy and primitive.
//!
//! `TimeSpan` is a signed duration with nanosecond precision, `Clock` lets
//! expiry logic be faked in tests, and `Sleeper` lets waits be skipped or
//! recorded in tests.

use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

const NANOS_PER_MICRO: i64 = 1_000;
const NANOS_PER_MILLI: i64 = 1_000_000;
const NANOS_PER_SEC: i64 = 1_000_000_000;
const SECS_PER_MIN: i64 = 60;
const SECS_PER_HOUR: i64 = 3_600;
const SECS_PER_DAY: i64 = 86_400;

/// A signed duration with nanosecond precision.
///
/// Unlike [`std::time::Duration`], a `TimeSpan` can be negative, which makes
/// interval arithmetic total: subtracting a larger span from a smaller one is
/// well-defined instead of a panic. The representable range is roughly
/// ±292 years. All arithmetic saturates at the range boundaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct TimeSpan {
    nanos: i64,
}

impl TimeSpan {
    pub const ZERO: TimeSpan = TimeSpan { nanos: 0 };
    pub const MAX: TimeSpan = TimeSpan { nanos: i64::MAX };
    pub const MIN: TimeSpan = TimeSpan { nanos: i64::MIN };

    pub const fn from_nanos(nanos: i64) -> Self {
        Self { nanos }
    }

    pub const fn from_micros(micros: i64) -> Self {
        Self { nanos: micros.saturating_mul(NANOS_PER_MICRO) }
    }

    pub const fn from_millis(millis: i64) -> Self {
        Self { nanos: millis.saturating_mul(NANOS_PER_MILLI) }
    }

    pub const fn from_secs(secs: i64) -> Self {
        Self { nanos: secs.saturating_mul(NANOS_PER_SEC) }
    }

    pub const fn from_mins(mins: i64) -> Self {
        Self::from_secs(mins.saturating_mul(SECS_PER_MIN))
    }

    pub const fn from_hours(hours: i64) -> Self {
        Self::from_secs(hours.saturating_mul(SECS_PER_HOUR))
    }

    pub const fn from_days(days: i64) -> Self {
        Self::from_secs(days.saturating_mul(SECS_PER_DAY))
    }

    pub const fn as_nanos(&self) -> i64 {
        self.nanos
    }

    pub const fn as_millis(&self) -> i64 {
        self.nanos / NANOS_PER_MILLI
    }

    pub const fn as_secs(&self) -> i64 {
        self.nanos / NANOS_PER_SEC
    }

    pub fn as_secs_f64(&self) -> f64 {
        self.nanos as f64 / NANOS_PER_SEC as f64
    }

    pub const fn is_zero(&self) -> bool {
        self.nanos == 0
    }

    pub const fn is_negative(&self) -> bool {
        self.nanos < 0
    }

    pub const fn abs(&self) -> Self {
        Self { nanos: self.nanos.saturating_abs() }
    }

    pub const fn saturating_add(self, other: Self) -> Self {
        Self { nanos: self.nanos.saturating_add(other.nanos) }
    }

    pub const fn saturating_sub(self, other: Self) -> Self {
        Self { nanos: self.nanos.saturating_sub(other.nanos) }
    }

    pub const fn saturating_mul(self, factor: i64) -> Self {
        Self { nanos: self.nanos.saturating_mul(factor) }
    }

    /// Scale by a float, saturating on overflow. NaN scales to zero.
    pub fn scale(self, factor: f64) -> Self {
        let scaled = self.nanos as f64 * factor;
        if scaled.is_nan() {
            return Self::ZERO;
        }
        if scaled >= i64::MAX as f64 {
            return Self::MAX;
        }
        if scaled <= i64::MIN as f64 {
            return Self::MIN;
        }
        Self { nanos: scaled as i64 }
    }

    /// Integer division. Returns `None` for a zero divisor.
    pub const fn checked_div(self, divisor: i64) -> Option<Self> {
        match self.nanos.checked_div(divisor) {
            Some(nanos) => Some(Self { nanos }),
            None => None,
        }
    }

    /// Clamp to the `[ZERO, max]` window, or `[ZERO, ∞)` when `max` is `None`.
    pub fn clamp_non_negative(self, max: Option<TimeSpan>) -> Self {
        let floored = if self.nanos < 0 { Self::ZERO } else { self };
        match max {
            Some(cap) if floored > cap => cap,
            _ => floored,
        }
    }

    /// Convert to an unsigned duration; negative spans collapse to zero.
    pub fn to_duration(&self) -> Duration {
        if self.nanos <= 0 {
            Duration::ZERO
        } else {
            Duration::from_nanos(self.nanos as u64)
        }
    }

    /// Project forward from `from`: the instant this span ends if it starts there.
    ///
    /// Negative spans project backwards. Saturates at the instant boundaries.
    pub fn end_from(&self, from: Instant) -> Instant {
        if self.nanos >= 0 {
            from.checked_add(self.to_duration()).unwrap_or(from)
        } else {
            from.checked_sub(self.abs().to_duration()).unwrap_or(from)
        }
    }

    /// Project backward from `to`: the instant this span must start to end there.
    pub fn start_from(&self, to: Instant) -> Instant {
        if self.nanos >= 0 {
            to.checked_sub(self.to_duration()).unwrap_or(to)
        } else {
            to.checked_add(self.abs().to_duration()).unwrap_or(to)
        }
    }
}

impl From<Duration> for TimeSpan {
    fn from(duration: Duration) -> Self {
        let nanos = duration.as_nanos();
        if nanos > i64::MAX as u128 {
            Self::MAX
        } else {
            Self { nanos: nanos as i64 }
        }
    }
}

impl std::ops::Add for TimeSpan {
    type Output = TimeSpan;
    fn add(self, rhs: Self) -> Self {
        self.saturating_add(rhs)
    }
}

impl std::ops::Sub for TimeSpan {
    type Output = TimeSpan;
    fn sub(self, rhs: Self) -> Self {
        self.saturating_sub(rhs)
    }
}

impl std::ops::Neg for TimeSpan {
    type Output = TimeSpan;
    fn neg(self) -> Self {
        Self { nanos: self.nanos.saturating_neg() }
    }
}

impl std::fmt::Display for TimeSpan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.nanos < 0 {
            write!(f, "-{:?}", self.abs().to_duration())
        } else {
            write!(f, "{:?}", self.to_duration())
        }
    }
}

/// Clock abstraction so expiry and breaker timing can be faked in tests.
pub trait Clock: Send + Sync + std::fmt::Debug {
    fn now_millis(&self) -> u64;
}

/// Monotonic clock backed by `Instant::now()`.
#[derive(Debug, Clone)]
pub struct MonotonicClock {
    start: Instant,
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self { start: Instant::now() }
    }
}

impl Clock for MonotonicClock {
    fn now_millis(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }
}

/// Manually advanced clock for deterministic expiry tests.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now: Arc<AtomicU64>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&self, millis: u64) {
        self.now.fetch_add(millis, Ordering::SeqCst);
    }

    pub fn set(&self, millis: u64) {
        self.now.store(millis, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_millis(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }
}

/// Abstraction for sleeping between retry attempts and acquisition polls.
#[async_trait]
pub trait Sleeper: Send + Sync + std::fmt::Debug {
    async fn sleep(&self, duration: Duration);
}

/// Production sleeper using the tokio runtime.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await
    }
}

/// Test sleeper that doesn't actually sleep.
#[derive(Debug, Default, Clone, Copy)]
pub struct InstantSleeper;

#[async_trait]
impl Sleeper for InstantSleeper {
    async fn sleep(&self, _duration: Duration) {
        // no-op
    }
}

/// Test sleeper that records every requested delay without sleeping.
#[derive(Debug, Clone, Default)]
pub struct TrackingSleeper {
    calls: Arc<Mutex<Vec<Duration>>>,
}

impl TrackingSleeper {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of recorded sleep calls.
    pub fn calls(&self) -> usize {
        self.calls.lock().expect("TrackingSleeper.calls: mutex poisoned").len()
    }

    /// Get a recorded delay by index, if present.
    pub fn call_at(&self, index: usize) -> Option<Duration> {
        self.calls.lock().expect("TrackingSleeper.call_at: mutex poisoned").get(index).copied()
    }

    pub fn clear(&self) {
        self.calls.lock().expect("TrackingSleeper.clear: mutex poisoned").clear();
    }
}

#[async_trait]
impl Sleeper for TrackingSleeper {
    async fn sleep(&self, duration: Duration) {
        self.calls.lock().unwrap_or_else(|poisoned| poisoned.into_inner()).push(duration);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constructors_normalize_to_nanos() {
        assert_eq!(TimeSpan::from_millis(1), TimeSpan::from_nanos(1_000_000));
        assert_eq!(TimeSpan::from_secs(1), TimeSpan::from_millis(1_000));
        assert_eq!(TimeSpan::from_mins(2), TimeSpan::from_secs(120));
        assert_eq!(TimeSpan::from_hours(1), TimeSpan::from_mins(60));
        assert_eq!(TimeSpan::from_days(1), TimeSpan::from_hours(24));
    }

    #[test]
    fn equality_is_by_value() {
        assert_eq!(TimeSpan::from_secs(60), TimeSpan::from_mins(1));
        assert_ne!(TimeSpan::from_secs(60), TimeSpan::from_secs(-60));
    }

    #[test]
    fn arithmetic_saturates() {
        assert_eq!(TimeSpan::MAX + TimeSpan::from_secs(1), TimeSpan::MAX);
        assert_eq!(TimeSpan::MIN - TimeSpan::from_secs(1), TimeSpan::MIN);
        assert_eq!(TimeSpan::MAX.saturating_mul(2), TimeSpan::MAX);
    }

    #[test]
    fn negative_spans_are_first_class() {
        let span = TimeSpan::from_secs(1) - TimeSpan::from_secs(3);
        assert!(span.is_negative());
        assert_eq!(span.abs(), TimeSpan::from_secs(2));
        assert_eq!(-span, TimeSpan::from_secs(2));
        assert_eq!(span.to_duration(), Duration::ZERO);
    }

    #[test]
    fn scale_handles_edge_inputs() {
        assert_eq!(TimeSpan::from_secs(2).scale(1.5), TimeSpan::from_millis(3_000));
        assert_eq!(TimeSpan::from_secs(1).scale(f64::NAN), TimeSpan::ZERO);
        assert_eq!(TimeSpan::MAX.scale(2.0), TimeSpan::MAX);
    }

    #[test]
    fn checked_div_rejects_zero() {
        assert_eq!(TimeSpan::from_secs(10).checked_div(2), Some(TimeSpan::from_secs(5)));
        assert_eq!(TimeSpan::from_secs(10).checked_div(0), None);
    }

    #[test]
    fn clamp_floors_and_caps() {
        let cap = Some(TimeSpan::from_secs(5));
        assert_eq!(TimeSpan::from_secs(-1).clamp_non_negative(cap), TimeSpan::ZERO);
        assert_eq!(TimeSpan::from_secs(3).clamp_non_negative(cap), TimeSpan::from_secs(3));
        assert_eq!(TimeSpan::from_secs(9).clamp_non_negative(cap), TimeSpan::from_secs(5));
        assert_eq!(TimeSpan::from_secs(9).clamp_non_negative(None), TimeSpan::from_secs(9));
    }

    #[test]
    fn instant_projection_round_trips() {
        let origin = Instant::now();
        let span = TimeSpan::from_millis(250);
        let end = span.end_from(origin);
        assert_eq!(end - origin, Duration::from_millis(250));
        assert_eq!(span.start_from(end), origin);

        let backwards = -span;
        assert_eq!(backwards.end_from(end), origin);
    }

    #[test]
    fn duration_conversion_saturates() {
        let huge = Duration::from_secs(u64::MAX);
        assert_eq!(TimeSpan::from(huge), TimeSpan::MAX);
        assert_eq!(TimeSpan::from(Duration::from_millis(7)), TimeSpan::from_millis(7));
    }

    #[test]
    fn manual_clock_advances() {
        let clock = ManualClock::new();
        assert_eq!(clock.now_millis(), 0);
        clock.advance(150);
        assert_eq!(clock.now_millis(), 150);
        clock.set(10);
        assert_eq!(clock.now_millis(), 10);
    }

    #[tokio::test]
    async fn instant_sleeper_doesnt_sleep() {
        let sleeper = InstantSleeper;
        let start = Instant::now();
        sleeper.sleep(Duration::from_secs(10)).await;
        assert!(start.elapsed() < Duration::from_millis(100));
    }

    #[tokio::test]
    async fn tracking_sleeper_records_calls() {
        let sleeper = TrackingSleeper::new();
        sleeper.sleep(Duration::from_millis(100)).await;
        sleeper.sleep(Duration::from_millis(200)).await;

        assert_eq!(sleeper.calls(), 2);
        assert_eq!(sleeper.call_at(0), Some(Duration::from_millis(100)));
        assert_eq!(sleeper.call_at(1), Some(Duration::from_millis(200)));

        sleeper.clear();
        assert_eq!(sleeper.calls(), 0);
    }
}
