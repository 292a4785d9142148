//! Retry policy and error classification.

use crate::Error;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Total attempts, including the first call.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub multiplier: f64,
    pub max_delay: Duration,
    pub jitter: bool,
    /// Upper bound of the uniform jitter added to each delay.
    pub jitter_max: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            multiplier: 2.0,
            max_delay: Duration::from_secs(30),
            jitter: true,
            jitter_max: Duration::from_secs(2),
        }
    }
}

impl RetryConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    pub fn with_backoff(mut self, base: Duration, multiplier: f64, max: Duration) -> Self {
        self.base_delay = base;
        self.multiplier = multiplier.max(1.0);
        self.max_delay = max;
        self
    }

    pub fn with_jitter(mut self, jitter_max: Option<Duration>) -> Self {
        self.jitter = jitter_max.is_some();
        self.jitter_max = jitter_max.unwrap_or(Duration::ZERO);
        self
    }

    /// No delay between attempts. Used by tests.
    pub fn immediate(max_attempts: u32) -> Self {
        Self::new()
            .with_max_attempts(max_attempts)
            .with_backoff(Duration::ZERO, 1.0, Duration::ZERO)
            .with_jitter(None)
    }

    /// Deterministic part of the delay before retrying after `attempt` (1-based) failed:
    /// `min(max_delay, base_delay * multiplier^(attempt-1))`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let secs = self.base_delay.as_secs_f64() * self.multiplier.powi(exp);
        let capped = secs.min(self.max_delay.as_secs_f64());
        if capped.is_finite() && capped > 0.0 {
            Duration::from_secs_f64(capped)
        } else {
            Duration::ZERO
        }
    }

    /// Backoff plus uniform jitter in `[0, jitter_max]` when enabled.
    pub fn delay(&self, attempt: u32) -> Duration {
        let base = self.backoff(attempt);
        if !self.jitter || self.jitter_max.is_zero() {
            return base;
        }
        let jitter_ms = rand::rng().random_range(0..=self.jitter_max.as_millis() as u64);
        base + Duration::from_millis(jitter_ms)
    }
}

/// State of a retry loop after a failed attempt.
#[derive(Debug, Clone, Copy)]
pub struct RetryState<'a> {
    /// 1-based number of the attempt that just failed.
    pub attempt_number: u32,
    pub error: Option<&'a Error>,
}

impl<'a> RetryState<'a> {
    pub fn new(attempt_number: u32, error: &'a Error) -> Self {
        Self {
            attempt_number,
            error: Some(error),
        }
    }
}

/// Whether `err` is worth retrying.
///
/// Transient errors (every [`crate::TransientKind`]) and open breakers retry;
/// permanent and validation errors do not. Errors that fit neither family are
/// retried.
pub fn classify_error(err: &Error) -> bool {
    match err {
        Error::Transient { .. } | Error::CircuitOpen { .. } => true,
        Error::Permanent { .. } | Error::Validation { .. } => false,
        Error::RetryExhausted { .. } => false,
        Error::Infrastructure { .. }
        | Error::Serialization(_)
        | Error::Io(_)
        | Error::Unknown { .. } => true,
    }
}

/// Predicate form of [`classify_error`] for retry loops.
pub fn should_retry_on_error(state: &RetryState<'_>) -> bool {
    state.error.map(classify_error).unwrap_or(false)
}
