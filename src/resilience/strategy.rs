use super::circuit_breaker::CircuitBreakerConfig;
use super::retry::RetryConfig;
use crate::{Error, ErrorContext, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Named resilience presets, from most to least tolerant of downtime:
/// aggressive fails fast, critical retries hardest before giving up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ResilienceStrategy {
    Aggressive,
    #[default]
    Balanced,
    Conservative,
    Critical,
}

impl ResilienceStrategy {
    pub const ALL: [ResilienceStrategy; 4] = [
        ResilienceStrategy::Aggressive,
        ResilienceStrategy::Balanced,
        ResilienceStrategy::Conservative,
        ResilienceStrategy::Critical,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ResilienceStrategy::Aggressive => "aggressive",
            ResilienceStrategy::Balanced => "balanced",
            ResilienceStrategy::Conservative => "conservative",
            ResilienceStrategy::Critical => "critical",
        }
    }
}

impl FromStr for ResilienceStrategy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "aggressive" => Ok(ResilienceStrategy::Aggressive),
            "balanced" => Ok(ResilienceStrategy::Balanced),
            "conservative" => Ok(ResilienceStrategy::Conservative),
            "critical" => Ok(ResilienceStrategy::Critical),
            other => Err(Error::validation_with_context(
                format!("unknown resilience strategy '{}'", other),
                ErrorContext::new().with_source("resilience_strategy"),
            )),
        }
    }
}

impl fmt::Display for ResilienceStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fully resolved resilience parameters for one operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResilienceConfig {
    pub strategy: ResilienceStrategy,
    pub retry: RetryConfig,
    pub circuit_breaker: CircuitBreakerConfig,
    pub enable_retry: bool,
    pub enable_circuit_breaker: bool,
    /// Deadline for each individual attempt.
    pub operation_timeout: Option<Duration>,
}

impl ResilienceConfig {
    pub fn for_strategy(strategy: ResilienceStrategy) -> Self {
        // (attempts, base ms, multiplier, max delay s, jitter ms, threshold, recovery s, timeout s)
        let (attempts, base_ms, multiplier, max_s, jitter_ms, threshold, recovery_s, timeout_s) =
            match strategy {
                ResilienceStrategy::Aggressive => (2, 500, 1.5, 5, 500, 3, 30, 15),
                ResilienceStrategy::Balanced => (3, 1_000, 2.0, 10, 1_000, 5, 60, 30),
                ResilienceStrategy::Conservative => (5, 2_000, 2.0, 30, 2_000, 8, 120, 60),
                ResilienceStrategy::Critical => (7, 1_000, 2.0, 60, 2_000, 10, 300, 90),
            };
        Self {
            strategy,
            retry: RetryConfig::new()
                .with_max_attempts(attempts)
                .with_backoff(
                    Duration::from_millis(base_ms),
                    multiplier,
                    Duration::from_secs(max_s),
                )
                .with_jitter(Some(Duration::from_millis(jitter_ms))),
            circuit_breaker: CircuitBreakerConfig::new()
                .with_failure_threshold(threshold)
                .with_recovery_timeout(Duration::from_secs(recovery_s)),
            enable_retry: true,
            enable_circuit_breaker: true,
            operation_timeout: Some(Duration::from_secs(timeout_s)),
        }
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_circuit_breaker(mut self, cb: CircuitBreakerConfig) -> Self {
        self.circuit_breaker = cb;
        self
    }

    pub fn with_operation_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.operation_timeout = timeout;
        self
    }

    pub fn without_retry(mut self) -> Self {
        self.enable_retry = false;
        self
    }

    pub fn without_circuit_breaker(mut self) -> Self {
        self.enable_circuit_breaker = false;
        self
    }
}

impl Default for ResilienceConfig {
    fn default() -> Self {
        Self::for_strategy(ResilienceStrategy::default())
    }
}
