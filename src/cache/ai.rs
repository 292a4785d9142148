//! AI response cache: the generic two-tier cache plus operation-aware keys
//! and TTLs.

use super::generic::{GenericCacheStats, GenericRedisCache, GenericRedisCacheConfig};
use super::key::{CacheKeyGenerator, HashAlgorithm, DEFAULT_TEXT_HASH_THRESHOLD, KEY_PREFIX};
use super::monitor::{CachePerformanceMonitor, KeyGenerationStats};
use crate::Result;
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Default TTLs in seconds for the built-in operations.
pub fn default_operation_ttls() -> HashMap<String, u64> {
    [
        ("summarize", 7200),
        ("sentiment", 86400),
        ("key_points", 7200),
        ("questions", 3600),
        ("qa", 1800),
    ]
    .into_iter()
    .map(|(op, secs)| (op.to_string(), secs))
    .collect()
}

#[derive(Debug, Clone)]
pub struct AiResponseCacheConfig {
    pub generic: GenericRedisCacheConfig,
    pub text_hash_threshold: usize,
    pub hash_algorithm: HashAlgorithm,
    /// Operation name → TTL in seconds. Unlisted operations use the generic default TTL.
    pub operation_ttls: HashMap<String, u64>,
    /// Overrides `generic.l1_cache_size` when set.
    pub memory_cache_size: Option<usize>,
}

impl Default for AiResponseCacheConfig {
    fn default() -> Self {
        Self {
            generic: GenericRedisCacheConfig::default(),
            text_hash_threshold: DEFAULT_TEXT_HASH_THRESHOLD,
            hash_algorithm: HashAlgorithm::default(),
            operation_ttls: default_operation_ttls(),
            memory_cache_size: None,
        }
    }
}

impl AiResponseCacheConfig {
    pub fn with_generic(mut self, generic: GenericRedisCacheConfig) -> Self {
        self.generic = generic;
        self
    }

    pub fn with_text_hash_threshold(mut self, threshold: usize) -> Self {
        self.text_hash_threshold = threshold;
        self
    }

    pub fn with_operation_ttl(mut self, operation: impl Into<String>, ttl_secs: u64) -> Self {
        self.operation_ttls.insert(operation.into(), ttl_secs);
        self
    }

    pub fn with_memory_cache_size(mut self, size: usize) -> Self {
        self.memory_cache_size = Some(size);
        self
    }

    fn resolved_generic(&self) -> GenericRedisCacheConfig {
        let mut generic = self.generic.clone();
        if let Some(size) = self.memory_cache_size {
            generic.l1_cache_size = size;
        }
        generic
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AiCacheStats {
    #[serde(flatten)]
    pub cache: GenericCacheStats,
    pub text_hash_threshold: usize,
    pub operation_ttls: HashMap<String, u64>,
    pub key_generation: Option<KeyGenerationStats>,
}

pub struct AiResponseCache {
    inner: GenericRedisCache,
    keys: CacheKeyGenerator,
    operation_ttls: HashMap<String, u64>,
    monitor: Arc<CachePerformanceMonitor>,
}

impl AiResponseCache {
    /// Build an AI cache over Redis.
    pub fn new(config: AiResponseCacheConfig) -> Result<Self> {
        let inner = GenericRedisCache::new(config.resolved_generic())?;
        Ok(Self::from_parts(config, inner))
    }

    /// Build an AI cache over an already constructed generic cache.
    ///
    /// `config.generic` and `memory_cache_size` are ignored here; the generic
    /// cache keeps its own configuration.
    pub fn with_cache(config: AiResponseCacheConfig, inner: GenericRedisCache) -> Self {
        Self::from_parts(config, inner)
    }

    fn from_parts(config: AiResponseCacheConfig, inner: GenericRedisCache) -> Self {
        let monitor = Arc::new(CachePerformanceMonitor::new());
        inner.attach_monitor(monitor.clone());
        let keys = CacheKeyGenerator::new()
            .with_text_hash_threshold(config.text_hash_threshold)
            .with_hash_algorithm(config.hash_algorithm)
            .with_monitor(monitor.clone());
        Self {
            inner,
            keys,
            operation_ttls: config.operation_ttls,
            monitor,
        }
    }

    /// The underlying two-tier cache.
    pub fn generic(&self) -> &GenericRedisCache {
        &self.inner
    }

    pub fn monitor(&self) -> &Arc<CachePerformanceMonitor> {
        &self.monitor
    }

    /// L1 capacity.
    pub fn memory_cache_size(&self) -> usize {
        self.inner
            .l1()
            .map(|l1| l1.max_size())
            .unwrap_or(0)
    }

    pub async fn connect(&self) -> Result<bool> {
        self.inner.connect().await
    }

    pub fn build_key(
        &self,
        text: &str,
        operation: &str,
        options: Option<&Value>,
        question: Option<&str>,
    ) -> String {
        self.keys.generate_cache_key(text, operation, options, question)
    }

    pub fn ttl_for_operation(&self, operation: &str) -> Duration {
        self.operation_ttls
            .get(operation)
            .map(|secs| Duration::from_secs(*secs))
            .unwrap_or(self.inner.config().default_ttl)
    }

    pub async fn get(&self, key: &str) -> Result<Option<Value>> {
        self.inner.get(key).await
    }

    pub async fn set(&self, key: &str, value: &Value, ttl: Option<Duration>) -> Result<()> {
        self.inner.set(key, value, ttl).await
    }

    pub async fn delete(&self, key: &str) -> Result<bool> {
        self.inner.delete(key).await
    }

    pub async fn exists(&self, key: &str) -> Result<bool> {
        self.inner.exists(key).await
    }

    /// Look up a cached response; object responses come back with `cache_hit: true`.
    pub async fn get_cached_response(
        &self,
        text: &str,
        operation: &str,
        options: Option<&Value>,
        question: Option<&str>,
    ) -> Result<Option<Value>> {
        let key = self.build_key(text, operation, options, question);
        let Some(mut value) = self.inner.get(&key).await? else {
            return Ok(None);
        };
        if let Value::Object(ref mut map) = value {
            map.insert("cache_hit".to_string(), Value::Bool(true));
        }
        Ok(Some(value))
    }

    /// Store `response` under its derived key with the operation's TTL.
    ///
    /// Object responses are stamped with `cached_at` (unix seconds) and
    /// `cache_hit: false`; other JSON values are wrapped as `{"result": ...}`.
    pub async fn cache_response(
        &self,
        text: &str,
        operation: &str,
        options: Option<&Value>,
        response: &Value,
        question: Option<&str>,
    ) -> Result<String> {
        let key = self.build_key(text, operation, options, question);
        let mut map = match response {
            Value::Object(map) => map.clone(),
            other => {
                let mut map = Map::new();
                map.insert("result".to_string(), other.clone());
                map
            }
        };
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        map.insert("cached_at".to_string(), Value::from(now));
        map.insert("cache_hit".to_string(), Value::Bool(false));
        map.insert("operation".to_string(), Value::String(operation.to_string()));

        let ttl = self.ttl_for_operation(operation);
        self.inner.set(&key, &Value::Object(map), Some(ttl)).await?;
        tracing::debug!(operation, key = %key, ttl_secs = ttl.as_secs(), "cached ai response");
        Ok(key)
    }

    /// Remove every cached response of `operation`.
    pub async fn invalidate_by_operation(&self, operation: &str) -> Result<usize> {
        let removed = self
            .inner
            .invalidate_pattern(&format!("{}op:{}|*", KEY_PREFIX, operation))
            .await?;
        tracing::info!(operation, removed, "invalidated cached responses for operation");
        Ok(removed)
    }

    /// Remove cached responses whose key contains `pattern`.
    pub async fn invalidate_pattern(&self, pattern: &str) -> Result<usize> {
        self.inner
            .invalidate_pattern(&format!("{}*{}*", KEY_PREFIX, pattern))
            .await
    }

    /// Remove every AI response, leaving other keys in the shared tier alone.
    pub async fn clear(&self) -> Result<usize> {
        let removed = self.inner.invalidate_pattern(&format!("{}*", KEY_PREFIX)).await?;
        self.inner.clear_l1();
        Ok(removed)
    }

    pub fn get_cache_stats(&self) -> AiCacheStats {
        let mut operation_ttls = self.operation_ttls.clone();
        operation_ttls
            .entry("default".to_string())
            .or_insert(self.inner.config().default_ttl.as_secs());
        AiCacheStats {
            cache: self.inner.stats(),
            text_hash_threshold: self.keys.text_hash_threshold(),
            operation_ttls,
            key_generation: self.keys.get_key_generation_stats(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::memory::InMemoryCache;
    use crate::cache::security::SecurityConfig;
    use serde_json::json;

    async fn cache_with(config: AiResponseCacheConfig) -> (AiResponseCache, Arc<InMemoryCache<Vec<u8>>>) {
        let backend = Arc::new(InMemoryCache::<Vec<u8>>::new(1000));
        let generic = GenericRedisCache::with_backend(
            config
                .resolved_generic()
                .with_security(SecurityConfig::for_testing()),
            backend.clone(),
        );
        let cache = AiResponseCache::with_cache(config, generic);
        cache.connect().await.unwrap();
        (cache, backend)
    }

    #[tokio::test]
    async fn test_operation_ttls() {
        let (cache, _) = cache_with(AiResponseCacheConfig::default()).await;
        assert_eq!(cache.ttl_for_operation("sentiment"), Duration::from_secs(86400));
        assert_eq!(cache.ttl_for_operation("qa"), Duration::from_secs(1800));
        assert_eq!(cache.ttl_for_operation("unknown"), Duration::from_secs(3600));
    }

    #[tokio::test]
    async fn test_cache_response_round_trip_marks_hits() {
        let (cache, backend) = cache_with(AiResponseCacheConfig::default()).await;
        let opts = json!({"max_length": 100});
        cache
            .cache_response("hello", "summarize", Some(&opts), &json!({"summary": "hi"}), None)
            .await
            .unwrap();

        let hit = cache
            .get_cached_response("hello", "summarize", Some(&opts), None)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(hit["summary"], "hi");
        assert_eq!(hit["cache_hit"], true);
        assert!(hit["cached_at"].as_u64().unwrap() > 0);

        let key = cache.build_key("hello", "summarize", Some(&opts), None);
        let remaining = backend.remaining_ttl(&key).unwrap();
        assert!(remaining <= Duration::from_secs(7200));
        assert!(remaining > Duration::from_secs(7000));
    }

    #[tokio::test]
    async fn test_question_changes_key() {
        let (cache, _) = cache_with(AiResponseCacheConfig::default()).await;
        cache
            .cache_response("doc", "qa", None, &json!({"answer": "a"}), Some("what?"))
            .await
            .unwrap();
        assert!(cache
            .get_cached_response("doc", "qa", None, Some("why?"))
            .await
            .unwrap()
            .is_none());
        assert!(cache
            .get_cached_response("doc", "qa", None, Some("what?"))
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn test_invalidate_by_operation() {
        let (cache, _) = cache_with(AiResponseCacheConfig::default()).await;
        for text in ["a", "b"] {
            cache
                .cache_response(text, "summarize", None, &json!({"s": text}), None)
                .await
                .unwrap();
        }
        cache
            .cache_response("a", "sentiment", None, &json!({"label": "pos"}), None)
            .await
            .unwrap();

        assert_eq!(cache.invalidate_by_operation("summarize").await.unwrap(), 2);
        assert!(cache
            .get_cached_response("a", "summarize", None, None)
            .await
            .unwrap()
            .is_none());
        assert!(cache
            .get_cached_response("a", "sentiment", None, None)
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn test_clear_leaves_foreign_keys() {
        let (cache, backend) = cache_with(AiResponseCacheConfig::default()).await;
        cache
            .cache_response("a", "summarize", None, &json!({"s": 1}), None)
            .await
            .unwrap();
        backend.set("session:1", b"x".to_vec(), None).await;

        assert_eq!(cache.clear().await.unwrap(), 1);
        assert!(backend.exists("session:1").await);
    }

    #[tokio::test]
    async fn test_memory_cache_size_overrides_l1() {
        let config = AiResponseCacheConfig::default().with_memory_cache_size(7);
        let (cache, _) = cache_with(config).await;
        assert_eq!(cache.memory_cache_size(), 7);
    }

    #[tokio::test]
    async fn test_stats_include_key_generation() {
        let (cache, _) = cache_with(AiResponseCacheConfig::default()).await;
        cache
            .cache_response("a", "summarize", None, &json!({"s": 1}), None)
            .await
            .unwrap();
        cache.get_cached_response("a", "summarize", None, None).await.unwrap();
        let stats = cache.get_cache_stats();
        assert_eq!(stats.key_generation.unwrap().total_generations, 2);
        assert_eq!(stats.cache.l1_hits, 1);
        assert_eq!(stats.operation_ttls["default"], 3600);
    }
}
