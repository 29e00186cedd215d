//! Backoff policies for retries and circuit breaker open-waits.
//!
//! Every policy is a pure function of the (1-indexed) attempt number. Jitter,
//! when configured, multiplies the computed delay by `1 + U(-j, +j)`; the
//! result is clamped to `[0, max]`.

use crate::time::TimeSpan;
use rand::Rng;

/// Delay policy for a given attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum Backoff {
    /// Fixed delay between attempts.
    Constant { delay: TimeSpan, jitter: Option<f64> },
    /// Delay growing by `step` each attempt.
    Linear { initial: TimeSpan, step: TimeSpan, max: Option<TimeSpan>, jitter: Option<f64> },
    /// Delay multiplied by `factor` each attempt.
    Exponential { initial: TimeSpan, factor: f64, max: Option<TimeSpan>, jitter: Option<f64> },
    /// Delay scaled by `attempt^degree`.
    Polynomial { initial: TimeSpan, degree: u32, max: Option<TimeSpan>, jitter: Option<f64> },
}

impl Backoff {
    pub fn constant(delay: TimeSpan) -> Self {
        Backoff::Constant { delay, jitter: None }
    }

    pub fn linear(initial: TimeSpan, step: TimeSpan) -> Self {
        Backoff::Linear { initial, step, max: None, jitter: None }
    }

    pub fn exponential(initial: TimeSpan, factor: f64) -> Self {
        Backoff::Exponential { initial, factor, max: None, jitter: None }
    }

    pub fn polynomial(initial: TimeSpan, degree: u32) -> Self {
        Backoff::Polynomial { initial, degree, max: None, jitter: None }
    }

    /// Cap the computed delay, jitter included. `Constant` carries no cap;
    /// for that policy this is a no-op.
    pub fn with_max(mut self, cap: TimeSpan) -> Self {
        match &mut self {
            Backoff::Constant { .. } => {}
            Backoff::Linear { max, .. }
            | Backoff::Exponential { max, .. }
            | Backoff::Polynomial { max, .. } => *max = Some(cap),
        }
        self
    }

    /// Multiply each delay by `1 + U(-amount, +amount)`. Negative amounts are
    /// treated as zero.
    pub fn with_jitter(mut self, amount: f64) -> Self {
        let amount = if amount.is_finite() && amount > 0.0 { Some(amount) } else { None };
        match &mut self {
            Backoff::Constant { jitter, .. }
            | Backoff::Linear { jitter, .. }
            | Backoff::Exponential { jitter, .. }
            | Backoff::Polynomial { jitter, .. } => *jitter = amount,
        }
        self
    }

    /// Compute the delay for `attempt` (1-indexed).
    pub fn delay(&self, attempt: u32) -> TimeSpan {
        self.delay_with_rng(attempt, &mut rand::rng())
    }

    /// Compute the delay with a caller-supplied RNG (deterministic tests).
    pub fn delay_with_rng<R: Rng>(&self, attempt: u32, rng: &mut R) -> TimeSpan {
        let attempt = attempt.max(1);
        let (raw, max, jitter) = match self {
            Backoff::Constant { delay, jitter } => (*delay, None, *jitter),
            Backoff::Linear { initial, step, max, jitter } => {
                let grown = initial.saturating_add(step.saturating_mul(i64::from(attempt - 1)));
                (grown, *max, *jitter)
            }
            Backoff::Exponential { initial, factor, max, jitter } => {
                let grown = initial.scale(factor.powi(attempt as i32 - 1));
                (grown, *max, *jitter)
            }
            Backoff::Polynomial { initial, degree, max, jitter } => {
                let grown = initial.scale(f64::from(attempt).powi(*degree as i32));
                (grown, *max, *jitter)
            }
        };

        let jittered = match jitter {
            Some(amount) => raw.scale(1.0 + rng.random_range(-amount..=amount)),
            None => raw,
        };
        jittered.clamp_non_negative(max)
    }
}
