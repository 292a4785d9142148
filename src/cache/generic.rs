//! Redis-backed cache with an in-process L1 tier.
//!
//! Reads check L1 first, then L2; L2 hits are promoted into L1 with the
//! remaining L2 TTL. Writes go to L2 (compressed above a size threshold) and
//! L1 with the same TTL. When L2 is unavailable and
//! `fail_on_connection_error` is off, the cache degrades to L1-only.

use super::backend::{CacheBackend, RedisBackend};
use super::codec::{ValueCodec, DEFAULT_COMPRESSION_LEVEL, DEFAULT_COMPRESSION_THRESHOLD};
use super::events::{CacheEvent, CacheEventData, CacheTier, CallbackRegistry};
use super::memory::{InMemoryCache, MemoryCacheStats, DEFAULT_L1_SIZE};
use super::monitor::CachePerformanceMonitor;
use super::security::{
    render_security_report, SecurityConfig, SecurityStatus, SecurityTestResult, SecurityValidation,
};
use crate::{Error, ErrorContext, Result};
use serde::Serialize;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

pub const DEFAULT_REDIS_URL: &str = "redis://localhost:6379";
pub const DEFAULT_TTL: Duration = Duration::from_secs(3600);

#[derive(Debug, Clone)]
pub struct GenericRedisCacheConfig {
    pub redis_url: String,
    pub default_ttl: Duration,
    pub enable_l1_cache: bool,
    pub l1_cache_size: usize,
    pub compression_threshold: usize,
    pub compression_level: u32,
    /// Surface L2 failures as errors instead of degrading to L1-only.
    pub fail_on_connection_error: bool,
    /// Derived from the environment when `None`.
    pub security: Option<SecurityConfig>,
}

impl Default for GenericRedisCacheConfig {
    fn default() -> Self {
        Self {
            redis_url: DEFAULT_REDIS_URL.to_string(),
            default_ttl: DEFAULT_TTL,
            enable_l1_cache: true,
            l1_cache_size: DEFAULT_L1_SIZE,
            compression_threshold: DEFAULT_COMPRESSION_THRESHOLD,
            compression_level: DEFAULT_COMPRESSION_LEVEL,
            fail_on_connection_error: false,
            security: None,
        }
    }
}

impl GenericRedisCacheConfig {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn with_redis_url(mut self, url: impl Into<String>) -> Self {
        self.redis_url = url.into();
        self
    }
    pub fn with_default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = ttl;
        self
    }
    pub fn with_l1_cache(mut self, enabled: bool, size: usize) -> Self {
        self.enable_l1_cache = enabled;
        self.l1_cache_size = size;
        self
    }
    pub fn with_compression(mut self, threshold: usize, level: u32) -> Self {
        self.compression_threshold = threshold;
        self.compression_level = level;
        self
    }
    pub fn with_fail_on_connection_error(mut self, strict: bool) -> Self {
        self.fail_on_connection_error = strict;
        self
    }
    pub fn with_security(mut self, security: SecurityConfig) -> Self {
        self.security = Some(security);
        self
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct GenericCacheStats {
    pub backend: String,
    pub connected: bool,
    pub hits: u64,
    pub misses: u64,
    pub l1_hits: u64,
    pub l2_hits: u64,
    pub sets: u64,
    pub deletes: u64,
    pub errors: u64,
    pub compressed_writes: u64,
    pub hit_ratio: f64,
    pub l1: Option<MemoryCacheStats>,
}

#[derive(Default)]
struct AtomicStats {
    misses: AtomicU64,
    l1_hits: AtomicU64,
    l2_hits: AtomicU64,
    sets: AtomicU64,
    deletes: AtomicU64,
    errors: AtomicU64,
    compressed_writes: AtomicU64,
}

pub struct GenericRedisCache {
    config: GenericRedisCacheConfig,
    security: SecurityConfig,
    backend: Arc<dyn CacheBackend>,
    l1: Option<Arc<InMemoryCache<Value>>>,
    codec: ValueCodec,
    callbacks: CallbackRegistry,
    stats: AtomicStats,
    l2_available: AtomicBool,
}

impl GenericRedisCache {
    /// Create a cache backed by Redis at `config.redis_url`.
    pub fn new(config: GenericRedisCacheConfig) -> Result<Self> {
        let security = config
            .security
            .clone()
            .unwrap_or_else(SecurityConfig::from_env)
            .with_url_credentials(&config.redis_url);
        let backend = Arc::new(RedisBackend::new(&config.redis_url, &security)?);
        Ok(Self::assemble(config, security, backend))
    }

    /// Create a cache over an arbitrary L2 backend.
    pub fn with_backend(config: GenericRedisCacheConfig, backend: Arc<dyn CacheBackend>) -> Self {
        let security = config
            .security
            .clone()
            .unwrap_or_else(SecurityConfig::from_env)
            .with_url_credentials(&config.redis_url);
        Self::assemble(config, security, backend)
    }

    fn assemble(
        config: GenericRedisCacheConfig,
        security: SecurityConfig,
        backend: Arc<dyn CacheBackend>,
    ) -> Self {
        let l1 = config.enable_l1_cache.then(|| {
            Arc::new(InMemoryCache::new(config.l1_cache_size).with_default_ttl(config.default_ttl))
        });
        let codec = ValueCodec::new(config.compression_threshold, config.compression_level);
        Self {
            config,
            security,
            backend,
            l1,
            codec,
            callbacks: CallbackRegistry::new(),
            stats: AtomicStats::default(),
            l2_available: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> &GenericRedisCacheConfig {
        &self.config
    }

    pub fn security_config(&self) -> &SecurityConfig {
        &self.security
    }

    pub fn l1(&self) -> Option<&Arc<InMemoryCache<Value>>> {
        self.l1.as_ref()
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    pub fn is_connected(&self) -> bool {
        self.l2_available.load(Ordering::Acquire)
    }

    /// Connect the L2 backend.
    ///
    /// Returns `Ok(false)` when the connection fails and the cache is allowed
    /// to degrade to L1-only operation.
    pub async fn connect(&self) -> Result<bool> {
        match self.backend.connect().await {
            Ok(()) => {
                self.l2_available.store(true, Ordering::Release);
                Ok(true)
            }
            Err(e) => {
                self.l2_available.store(false, Ordering::Release);
                if self.config.fail_on_connection_error {
                    return Err(Error::infrastructure_with_context(
                        format!("failed to connect cache backend: {}", e),
                        ErrorContext::new()
                            .with_operation("cache.connect")
                            .with_source(self.backend.name()),
                    ));
                }
                tracing::warn!(
                    backend = self.backend.name(),
                    error = %e,
                    "cache backend unavailable, continuing with L1 only"
                );
                Ok(false)
            }
        }
    }

    pub async fn disconnect(&self) {
        self.backend.disconnect().await;
        self.l2_available.store(false, Ordering::Release);
    }

    pub fn register_callback<F>(&self, event: CacheEvent, callback: F)
    where
        F: Fn(&CacheEventData) + Send + Sync + 'static,
    {
        self.callbacks.register(event, callback);
    }

    /// Record every get/set/delete into `monitor`.
    pub fn attach_monitor(&self, monitor: Arc<CachePerformanceMonitor>) {
        for event in [
            CacheEvent::GetSuccess,
            CacheEvent::GetMiss,
            CacheEvent::SetSuccess,
            CacheEvent::DeleteSuccess,
        ] {
            let monitor = monitor.clone();
            self.register_callback(event, move |data| {
                let (op, hit) = match data.event {
                    CacheEvent::GetSuccess => ("get", Some(true)),
                    CacheEvent::GetMiss => ("get", Some(false)),
                    CacheEvent::SetSuccess => ("set", None),
                    _ => ("delete", None),
                };
                monitor.record_cache_operation(op, data.duration, hit);
            });
        }
    }

    /// Handle an L2 failure according to `fail_on_connection_error`.
    fn on_backend_error(&self, op: &str, key: &str, err: Error) -> Result<()> {
        self.stats.errors.fetch_add(1, Ordering::Relaxed);
        if self.config.fail_on_connection_error {
            let message = err.to_string();
            return Err(match err {
                e @ Error::Infrastructure { .. } => e,
                _ => Error::infrastructure_with_context(
                    message,
                    ErrorContext::new()
                        .with_operation(format!("cache.{}", op))
                        .with_source(self.backend.name()),
                ),
            });
        }
        tracing::warn!(
            operation = op,
            key = %key,
            error = %err,
            "cache backend error, degrading to L1"
        );
        Ok(())
    }

    pub async fn get(&self, key: &str) -> Result<Option<Value>> {
        let start = Instant::now();

        if let Some(ref l1) = self.l1 {
            if let Some(value) = l1.get(key).await {
                self.stats.l1_hits.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(key = %key, "cache hit (l1)");
                self.callbacks.fire(&CacheEventData::new(
                    CacheEvent::GetSuccess,
                    key,
                    CacheTier::L1,
                    start.elapsed(),
                ));
                return Ok(Some(value));
            }
        }

        if self.is_connected() {
            match self.backend.get(key).await {
                Ok(Some(bytes)) => match self.codec.decode(&bytes) {
                    Ok(value) => {
                        self.promote(key, &value).await;
                        self.stats.l2_hits.fetch_add(1, Ordering::Relaxed);
                        tracing::debug!(key = %key, "cache hit (l2)");
                        self.callbacks.fire(&CacheEventData::new(
                            CacheEvent::GetSuccess,
                            key,
                            CacheTier::L2,
                            start.elapsed(),
                        ));
                        return Ok(Some(value));
                    }
                    Err(e) => {
                        self.stats.errors.fetch_add(1, Ordering::Relaxed);
                        tracing::warn!(key = %key, error = %e, "dropping undecodable cache entry");
                        if let Err(e) = self.backend.delete(key).await {
                            tracing::debug!(key = %key, error = %e, "failed to drop undecodable cache entry");
                        }
                    }
                },
                Ok(None) => {}
                Err(e) => {
                    let mut data =
                        CacheEventData::new(CacheEvent::GetError, key, CacheTier::L2, start.elapsed());
                    data.error = Some(e.to_string());
                    self.callbacks.fire(&data);
                    self.on_backend_error("get", key, e)?;
                }
            }
        }

        self.stats.misses.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(key = %key, "cache miss");
        self.callbacks.fire(&CacheEventData::new(
            CacheEvent::GetMiss,
            key,
            CacheTier::None,
            start.elapsed(),
        ));
        Ok(None)
    }

    /// Copy an L2 value into L1 without outliving its L2 TTL.
    async fn promote(&self, key: &str, value: &Value) {
        let Some(ref l1) = self.l1 else { return };
        let ttl = match self.backend.ttl(key).await {
            Ok(Some(remaining)) => remaining.min(self.config.default_ttl),
            _ => self.config.default_ttl,
        };
        l1.set(key, value.clone(), Some(ttl)).await;
    }

    /// Store `value`; `ttl` defaults to the configured default TTL.
    pub async fn set(&self, key: &str, value: &Value, ttl: Option<Duration>) -> Result<()> {
        let start = Instant::now();
        let ttl = ttl.unwrap_or(self.config.default_ttl);
        let encoded = self.codec.encode(value)?;

        let mut tier = CacheTier::None;
        if self.is_connected() {
            match self.backend.set(key, &encoded.bytes, Some(ttl)).await {
                Ok(()) => {
                    tier = CacheTier::L2;
                    if encoded.compressed {
                        self.stats.compressed_writes.fetch_add(1, Ordering::Relaxed);
                    }
                }
                Err(e) => {
                    let mut data =
                        CacheEventData::new(CacheEvent::SetError, key, CacheTier::L2, start.elapsed());
                    data.error = Some(e.to_string());
                    self.callbacks.fire(&data);
                    self.on_backend_error("set", key, e)?;
                }
            }
        }

        if let Some(ref l1) = self.l1 {
            l1.set(key, value.clone(), Some(ttl)).await;
            tier = match tier {
                CacheTier::L2 => CacheTier::Both,
                _ => CacheTier::L1,
            };
        }

        self.stats.sets.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(
            key = %key,
            ttl_secs = ttl.as_secs(),
            size = encoded.bytes.len(),
            compressed = encoded.compressed,
            "cache set"
        );
        let mut data = CacheEventData::new(CacheEvent::SetSuccess, key, tier, start.elapsed());
        data.size = Some(encoded.bytes.len());
        data.compressed = Some(encoded.compressed);
        self.callbacks.fire(&data);
        Ok(())
    }

    /// Remove `key` from both tiers.
    pub async fn delete(&self, key: &str) -> Result<bool> {
        let start = Instant::now();
        let mut removed = match self.l1 {
            Some(ref l1) => l1.delete(key).await,
            None => false,
        };
        if self.is_connected() {
            match self.backend.delete(key).await {
                Ok(r) => removed |= r,
                Err(e) => self.on_backend_error("delete", key, e)?,
            }
        }
        if removed {
            self.stats.deletes.fetch_add(1, Ordering::Relaxed);
        }
        self.callbacks.fire(&CacheEventData::new(
            CacheEvent::DeleteSuccess,
            key,
            CacheTier::Both,
            start.elapsed(),
        ));
        Ok(removed)
    }

    /// L2 is authoritative when available; a stale L1 entry is dropped.
    pub async fn exists(&self, key: &str) -> Result<bool> {
        if self.is_connected() {
            match self.backend.exists(key).await {
                Ok(true) => return Ok(true),
                Ok(false) => {
                    if let Some(ref l1) = self.l1 {
                        l1.delete(key).await;
                    }
                    return Ok(false);
                }
                Err(e) => self.on_backend_error("exists", key, e)?,
            }
        }
        Ok(match self.l1 {
            Some(ref l1) => l1.exists(key).await,
            None => false,
        })
    }

    /// Delete every key matching a Redis glob pattern from both tiers.
    pub async fn invalidate_pattern(&self, pattern: &str) -> Result<usize> {
        let l1_removed = self.l1.as_ref().map(|l1| l1.remove_matching(pattern)).unwrap_or(0);
        if !self.is_connected() {
            tracing::info!(pattern, removed = l1_removed, "invalidated L1 entries");
            return Ok(l1_removed);
        }
        let keys = match self.backend.keys_matching(pattern).await {
            Ok(keys) => keys,
            Err(e) => {
                self.on_backend_error("invalidate", pattern, e)?;
                return Ok(l1_removed);
            }
        };
        let mut removed = 0usize;
        for key in &keys {
            match self.backend.delete(key).await {
                Ok(true) => removed += 1,
                Ok(false) => {}
                Err(e) => self.on_backend_error("invalidate", key, e)?,
            }
        }
        tracing::info!(pattern, removed, "invalidated cache entries");
        Ok(removed.max(l1_removed))
    }

    /// Drop every entry from both tiers.
    pub async fn clear(&self) -> Result<usize> {
        let removed = self.invalidate_pattern("*").await?;
        self.clear_l1();
        Ok(removed)
    }

    pub fn clear_l1(&self) {
        if let Some(ref l1) = self.l1 {
            l1.clear();
        }
    }

    pub fn stats(&self) -> GenericCacheStats {
        let l1_hits = self.stats.l1_hits.load(Ordering::Relaxed);
        let l2_hits = self.stats.l2_hits.load(Ordering::Relaxed);
        let misses = self.stats.misses.load(Ordering::Relaxed);
        let hits = l1_hits + l2_hits;
        let lookups = hits + misses;
        GenericCacheStats {
            backend: self.backend.name().to_string(),
            connected: self.is_connected(),
            hits,
            misses,
            l1_hits,
            l2_hits,
            sets: self.stats.sets.load(Ordering::Relaxed),
            deletes: self.stats.deletes.load(Ordering::Relaxed),
            errors: self.stats.errors.load(Ordering::Relaxed),
            compressed_writes: self.stats.compressed_writes.load(Ordering::Relaxed),
            hit_ratio: if lookups == 0 {
                0.0
            } else {
                hits as f64 / lookups as f64
            },
            l1: self.l1.as_ref().map(|l1| l1.stats()),
        }
    }

    pub fn get_security_status(&self) -> SecurityStatus {
        SecurityStatus::from_config(&self.security, self.backend.name(), self.is_connected())
    }

    pub fn validate_security(&self) -> SecurityValidation {
        self.security.validate()
    }

    pub fn generate_security_report(&self) -> String {
        render_security_report(&self.get_security_status(), &self.validate_security())
    }

    pub fn get_security_recommendations(&self) -> Vec<String> {
        self.security.recommendations()
    }

    /// Exercise the backend with the configured security settings.
    pub async fn test_security_configuration(&self) -> SecurityTestResult {
        let start = Instant::now();
        let mut errors = Vec::new();
        if !self.is_connected() {
            if let Err(e) = self.backend.connect().await {
                errors.push(format!("connect: {}", e));
            } else {
                self.l2_available.store(true, Ordering::Release);
            }
        }
        let connection_ok = errors.is_empty()
            && match self.backend.ping().await {
                Ok(()) => true,
                Err(e) => {
                    errors.push(format!("ping: {}", e));
                    false
                }
            };
        let validation = self.security.validate();
        errors.extend(validation.vulnerabilities.iter().cloned());
        SecurityTestResult {
            overall_secure: connection_ok && validation.is_valid,
            connection_ok,
            tls_configured: self.security.use_tls,
            auth_configured: !self.security.password.is_empty(),
            errors,
            duration_ms: start.elapsed().as_millis() as u64,
        }
    }
}
