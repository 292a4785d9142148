use super::metrics::ResilienceMetrics;
use crate::{Error, Result};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl CircuitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CircuitState::Closed => "closed",
            CircuitState::Open => "open",
            CircuitState::HalfOpen => "half_open",
        }
    }
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CircuitBreakerConfig {
    pub failure_threshold: u32,
    pub recovery_timeout: Duration,
    /// Trial calls admitted while half-open.
    pub half_open_max_calls: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            recovery_timeout: Duration::from_secs(60),
            half_open_max_calls: 1,
        }
    }
}

impl CircuitBreakerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_failure_threshold(mut self, threshold: u32) -> Self {
        self.failure_threshold = threshold.max(1);
        self
    }

    pub fn with_recovery_timeout(mut self, timeout: Duration) -> Self {
        self.recovery_timeout = timeout;
        self
    }

    pub fn with_half_open_max_calls(mut self, calls: u32) -> Self {
        self.half_open_max_calls = calls.max(1);
        self
    }
}

/// Health snapshot of a single breaker, as served to health checks.
#[derive(Debug, Clone, Serialize)]
pub struct CircuitBreakerHealth {
    pub healthy: bool,
    pub state: CircuitState,
    pub failure_count: u32,
    pub failure_threshold: u32,
    pub recovery_timeout_secs: u64,
    /// Unix seconds of the failure that last opened the breaker.
    pub last_failure_time: Option<u64>,
    pub half_open_max_calls: u32,
}

#[derive(Debug)]
struct Inner {
    state: CircuitState,
    failure_count: u32,
    opened_at: Option<Instant>,
    last_failure_time: Option<SystemTime>,
    half_open_calls: u32,
    /// Bumped on every trip, so a stale permit cannot release a newer slot.
    generation: u64,
    metrics: ResilienceMetrics,
}

/// Failure-counting circuit breaker for one operation.
///
/// - Closed: calls pass; consecutive failures reaching the threshold open it
/// - Open: calls fail fast until `recovery_timeout` has elapsed
/// - HalfOpen: up to `half_open_max_calls` trial calls; a success closes, a failure reopens
///
/// The breaker also owns the operation's [`ResilienceMetrics`]. Every attempt,
/// including fast-failed ones, counts towards `total_calls`.
pub struct CircuitBreaker {
    name: String,
    cfg: CircuitBreakerConfig,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, cfg: CircuitBreakerConfig) -> Self {
        Self {
            name: name.into(),
            cfg,
            inner: Mutex::new(Inner {
                state: CircuitState::Closed,
                failure_count: 0,
                opened_at: None,
                last_failure_time: None,
                half_open_calls: 0,
                generation: 0,
                metrics: ResilienceMetrics::default(),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.cfg
    }

    pub fn state(&self) -> CircuitState {
        self.inner.lock().state
    }

    pub fn failure_count(&self) -> u32 {
        self.inner.lock().failure_count
    }

    /// Gate an attempt. Returns [`Error::CircuitOpen`] without side effects on
    /// the failure count when the call is rejected.
    ///
    /// A half-open slot taken here is only released by `record_success` or
    /// `record_failure`; prefer [`CircuitBreaker::permit`] when the attempt
    /// may be cancelled.
    pub fn allow(&self) -> Result<()> {
        self.admit().map(|_| ())
    }

    /// Gate an attempt and hand back a [`CallPermit`] that settles it.
    pub fn permit(&self) -> Result<CallPermit<'_>> {
        let trial = self.admit()?;
        Ok(CallPermit {
            breaker: self,
            trial,
        })
    }

    /// Returns the breaker generation when the admitted call is a half-open trial call.
    fn admit(&self) -> Result<Option<u64>> {
        let mut st = self.inner.lock();
        match st.state {
            CircuitState::Closed => return Ok(None),
            CircuitState::Open => {
                let elapsed = st.opened_at.map(|t| t.elapsed()).unwrap_or(Duration::MAX);
                if elapsed >= self.cfg.recovery_timeout {
                    st.state = CircuitState::HalfOpen;
                    st.half_open_calls = 1;
                    st.metrics.circuit_breaker_half_opens += 1;
                    tracing::info!(operation = %self.name, "circuit breaker half-open, admitting trial calls");
                    return Ok(Some(st.generation));
                }
            }
            CircuitState::HalfOpen => {
                if st.half_open_calls < self.cfg.half_open_max_calls {
                    st.half_open_calls += 1;
                    return Ok(Some(st.generation));
                }
            }
        }
        st.metrics.record_failure();
        tracing::debug!(operation = %self.name, state = %st.state, "circuit breaker rejected call");
        Err(Error::CircuitOpen {
            operation: self.name.clone(),
        })
    }

    /// Give back a trial slot whose attempt never reported an outcome.
    fn release_trial(&self, generation: u64) {
        let mut st = self.inner.lock();
        if st.state == CircuitState::HalfOpen && st.generation == generation {
            st.half_open_calls = st.half_open_calls.saturating_sub(1);
            tracing::debug!(operation = %self.name, "abandoned half-open trial call released");
        }
    }

    pub fn record_success(&self) {
        let mut st = self.inner.lock();
        st.metrics.record_success();
        match st.state {
            CircuitState::HalfOpen => {
                st.state = CircuitState::Closed;
                st.failure_count = 0;
                st.half_open_calls = 0;
                st.opened_at = None;
                st.metrics.circuit_breaker_closes += 1;
                tracing::info!(operation = %self.name, "circuit breaker closed");
            }
            CircuitState::Closed => st.failure_count = 0,
            // a call admitted before the breaker opened
            CircuitState::Open => {}
        }
    }

    pub fn record_failure(&self) {
        let mut st = self.inner.lock();
        st.metrics.record_failure();
        match st.state {
            CircuitState::Closed => {
                st.failure_count = st.failure_count.saturating_add(1);
                if st.failure_count >= self.cfg.failure_threshold {
                    self.trip(&mut st);
                    tracing::warn!(
                        operation = %self.name,
                        failures = st.failure_count,
                        threshold = self.cfg.failure_threshold,
                        "circuit breaker opened"
                    );
                }
            }
            CircuitState::HalfOpen => {
                st.failure_count = st.failure_count.saturating_add(1);
                self.trip(&mut st);
                tracing::warn!(operation = %self.name, "half-open trial call failed, circuit breaker reopened");
            }
            CircuitState::Open => {}
        }
    }

    fn trip(&self, st: &mut Inner) {
        st.state = CircuitState::Open;
        st.opened_at = Some(Instant::now());
        st.last_failure_time = Some(SystemTime::now());
        st.half_open_calls = 0;
        st.generation = st.generation.wrapping_add(1);
        st.metrics.circuit_breaker_opens += 1;
    }

    /// Run `fut` through the breaker.
    pub async fn call<T, F>(&self, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        let permit = self.permit()?;
        match fut.await {
            Ok(v) => {
                permit.success();
                Ok(v)
            }
            Err(e) => {
                permit.failure();
                Err(e)
            }
        }
    }

    pub(crate) fn record_retry(&self) {
        self.inner.lock().metrics.retry_attempts += 1;
    }

    /// Count an outcome without driving state transitions, for operations
    /// running with the breaker disabled.
    pub(crate) fn record_outcome(&self, success: bool) {
        let mut st = self.inner.lock();
        if success {
            st.metrics.record_success();
        } else {
            st.metrics.record_failure();
        }
    }

    pub(crate) fn restore_metrics(&self, metrics: ResilienceMetrics) {
        self.inner.lock().metrics = metrics;
    }

    pub fn metrics(&self) -> ResilienceMetrics {
        self.inner.lock().metrics.clone()
    }

    pub fn reset_metrics(&self) {
        self.inner.lock().metrics = ResilienceMetrics::default();
    }

    /// Force the breaker closed. Metrics are kept.
    pub fn reset(&self) {
        let mut st = self.inner.lock();
        st.state = CircuitState::Closed;
        st.failure_count = 0;
        st.opened_at = None;
        st.half_open_calls = 0;
        st.generation = st.generation.wrapping_add(1);
        tracing::info!(operation = %self.name, "circuit breaker reset");
    }

    pub fn health(&self) -> CircuitBreakerHealth {
        let st = self.inner.lock();
        CircuitBreakerHealth {
            healthy: st.state == CircuitState::Closed,
            state: st.state,
            failure_count: st.failure_count,
            failure_threshold: self.cfg.failure_threshold,
            recovery_timeout_secs: self.cfg.recovery_timeout.as_secs(),
            last_failure_time: st
                .last_failure_time
                .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
                .map(|d| d.as_secs()),
            half_open_max_calls: self.cfg.half_open_max_calls,
        }
    }
}

impl std::fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("name", &self.name)
            .field("config", &self.cfg)
            .field("state", &self.state())
            .finish()
    }
}

/// One admitted attempt. Settle it with [`CallPermit::success`] or
/// [`CallPermit::failure`]; dropping it unsettled frees its half-open slot.
#[must_use]
pub struct CallPermit<'a> {
    breaker: &'a CircuitBreaker,
    trial: Option<u64>,
}

impl CallPermit<'_> {
    pub fn success(mut self) {
        self.trial = None;
        self.breaker.record_success();
    }

    pub fn failure(mut self) {
        self.trial = None;
        self.breaker.record_failure();
    }
}

impl Drop for CallPermit<'_> {
    fn drop(&mut self) {
        if let Some(generation) = self.trial.take() {
            self.breaker.release_trial(generation);
        }
    }
}
