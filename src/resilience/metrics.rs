use serde::Serialize;
use std::time::SystemTime;

/// Per-operation call counters.
///
/// Counters only move forward; they are cleared solely by an explicit reset.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ResilienceMetrics {
    pub total_calls: u64,
    pub successful_calls: u64,
    pub failed_calls: u64,
    pub retry_attempts: u64,
    pub circuit_breaker_opens: u64,
    pub circuit_breaker_half_opens: u64,
    pub circuit_breaker_closes: u64,
    pub last_success: Option<SystemTime>,
    pub last_failure: Option<SystemTime>,
}

impl ResilienceMetrics {
    pub fn success_rate(&self) -> f64 {
        if self.total_calls == 0 {
            return 0.0;
        }
        self.successful_calls as f64 / self.total_calls as f64 * 100.0
    }

    pub fn failure_rate(&self) -> f64 {
        if self.total_calls == 0 {
            return 0.0;
        }
        self.failed_calls as f64 / self.total_calls as f64 * 100.0
    }

    pub(crate) fn record_success(&mut self) {
        self.total_calls += 1;
        self.successful_calls += 1;
        self.last_success = Some(SystemTime::now());
    }

    pub(crate) fn record_failure(&mut self) {
        self.total_calls += 1;
        self.failed_calls += 1;
        self.last_failure = Some(SystemTime::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rates() {
        let mut m = ResilienceMetrics::default();
        assert_eq!(m.success_rate(), 0.0);
        m.record_success();
        m.record_success();
        m.record_success();
        m.record_failure();
        assert_eq!(m.total_calls, 4);
        assert!((m.success_rate() - 75.0).abs() < f64::EPSILON);
        assert!((m.failure_rate() - 25.0).abs() < f64::EPSILON);
        assert!(m.last_success.is_some());
        assert!(m.last_failure.is_some());
    }
}
