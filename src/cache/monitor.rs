//! Cache performance monitoring.
//!
//! Keeps a bounded window of recent measurements for key generation and cache
//! operations. Measurements are observability-only and never influence cache
//! behaviour.

use super::key::TextTier;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::time::Duration;

const DEFAULT_MAX_MEASUREMENTS: usize = 1000;

#[derive(Debug, Clone)]
pub struct KeyGenerationMeasurement {
    pub text_length: usize,
    pub operation: String,
    pub duration: Duration,
    pub tier: TextTier,
    pub has_options: bool,
    pub has_question: bool,
}

#[derive(Debug, Clone)]
pub struct CacheOperationMeasurement {
    pub operation: String,
    pub duration: Duration,
    /// `Some(true)` for hits, `Some(false)` for misses, `None` for writes/deletes.
    pub hit: Option<bool>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct KeyGenerationStats {
    pub total_generations: usize,
    pub avg_duration_ms: f64,
    pub max_duration_ms: f64,
    pub avg_text_length: f64,
    pub max_text_length: usize,
    pub by_tier: HashMap<String, usize>,
    pub by_operation: HashMap<String, usize>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct CacheOperationStats {
    pub total_operations: usize,
    pub avg_duration_ms: f64,
    pub max_duration_ms: f64,
    pub hits: usize,
    pub misses: usize,
    pub hit_rate: f64,
    pub by_operation: HashMap<String, usize>,
}

#[derive(Debug, Default)]
struct Windows {
    key_generations: VecDeque<KeyGenerationMeasurement>,
    cache_operations: VecDeque<CacheOperationMeasurement>,
}

/// Bounded in-process recorder for cache timings.
#[derive(Debug)]
pub struct CachePerformanceMonitor {
    max_measurements: usize,
    windows: Mutex<Windows>,
}

impl CachePerformanceMonitor {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_MAX_MEASUREMENTS)
    }

    pub fn with_capacity(max_measurements: usize) -> Self {
        Self {
            max_measurements: max_measurements.max(1),
            windows: Mutex::new(Windows::default()),
        }
    }

    pub fn record_key_generation(&self, measurement: KeyGenerationMeasurement) {
        let mut w = self.windows.lock();
        w.key_generations.push_back(measurement);
        while w.key_generations.len() > self.max_measurements {
            w.key_generations.pop_front();
        }
    }

    pub fn record_cache_operation(
        &self,
        operation: impl Into<String>,
        duration: Duration,
        hit: Option<bool>,
    ) {
        let mut w = self.windows.lock();
        w.cache_operations.push_back(CacheOperationMeasurement {
            operation: operation.into(),
            duration,
            hit,
        });
        while w.cache_operations.len() > self.max_measurements {
            w.cache_operations.pop_front();
        }
    }

    pub fn key_generation_stats(&self) -> KeyGenerationStats {
        let w = self.windows.lock();
        let n = w.key_generations.len();
        if n == 0 {
            return KeyGenerationStats::default();
        }
        let mut stats = KeyGenerationStats {
            total_generations: n,
            ..Default::default()
        };
        let mut total_ms = 0.0;
        let mut total_len = 0usize;
        for m in &w.key_generations {
            let ms = m.duration.as_secs_f64() * 1000.0;
            total_ms += ms;
            stats.max_duration_ms = stats.max_duration_ms.max(ms);
            total_len += m.text_length;
            stats.max_text_length = stats.max_text_length.max(m.text_length);
            *stats.by_tier.entry(m.tier.as_str().to_string()).or_insert(0) += 1;
            *stats.by_operation.entry(m.operation.clone()).or_insert(0) += 1;
        }
        stats.avg_duration_ms = total_ms / n as f64;
        stats.avg_text_length = total_len as f64 / n as f64;
        stats
    }

    pub fn cache_operation_stats(&self) -> CacheOperationStats {
        let w = self.windows.lock();
        let n = w.cache_operations.len();
        if n == 0 {
            return CacheOperationStats::default();
        }
        let mut stats = CacheOperationStats {
            total_operations: n,
            ..Default::default()
        };
        let mut total_ms = 0.0;
        for m in &w.cache_operations {
            let ms = m.duration.as_secs_f64() * 1000.0;
            total_ms += ms;
            stats.max_duration_ms = stats.max_duration_ms.max(ms);
            match m.hit {
                Some(true) => stats.hits += 1,
                Some(false) => stats.misses += 1,
                None => {}
            }
            *stats.by_operation.entry(m.operation.clone()).or_insert(0) += 1;
        }
        stats.avg_duration_ms = total_ms / n as f64;
        let lookups = stats.hits + stats.misses;
        stats.hit_rate = if lookups == 0 {
            0.0
        } else {
            stats.hits as f64 / lookups as f64
        };
        stats
    }

    pub fn hit_rate(&self) -> f64 {
        self.cache_operation_stats().hit_rate
    }

    pub fn reset(&self) {
        let mut w = self.windows.lock();
        w.key_generations.clear();
        w.cache_operations.clear();
    }
}

impl Default for CachePerformanceMonitor {
    fn default() -> Self {
        Self::new()
    }
}
