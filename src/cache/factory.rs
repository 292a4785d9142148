//! Preconfigured cache constructors.

use super::ai::{AiResponseCache, AiResponseCacheConfig};
use super::generic::{GenericRedisCache, GenericRedisCacheConfig};
use super::memory::InMemoryCache;
use super::security::SecurityConfig;
use crate::config::Settings;
use crate::Result;
use std::sync::Arc;
use std::time::Duration;

/// Capacity of the in-process store standing in for an unreachable Redis.
const FALLBACK_MEMORY_ENTRIES: usize = 10_000;

pub struct CacheFactory;

impl CacheFactory {
    /// Short-lived entries and a larger L1 for request/response web traffic.
    pub async fn for_web_app(redis_url: &str) -> Result<AiResponseCache> {
        let config = AiResponseCacheConfig::default().with_generic(
            GenericRedisCacheConfig::new()
                .with_redis_url(redis_url)
                .with_default_ttl(Duration::from_secs(1800))
                .with_l1_cache(true, 200)
                .with_compression(2000, 6),
        );
        Self::build(config).await
    }

    /// Defaults tuned for AI responses: lower hash threshold, operation TTLs.
    pub async fn for_ai_app(redis_url: &str) -> Result<AiResponseCache> {
        let config = AiResponseCacheConfig::default()
            .with_generic(
                GenericRedisCacheConfig::new()
                    .with_redis_url(redis_url)
                    .with_default_ttl(Duration::from_secs(3600))
                    .with_compression(1000, 6),
            )
            .with_text_hash_threshold(500)
            .with_memory_cache_size(100);
        Self::build(config).await
    }

    /// In-process only; never touches the network.
    pub async fn for_testing() -> Result<AiResponseCache> {
        let config = AiResponseCacheConfig::default().with_generic(
            GenericRedisCacheConfig::new()
                .with_default_ttl(Duration::from_secs(60))
                .with_l1_cache(true, 50)
                .with_security(SecurityConfig::for_testing()),
        );
        Self::in_memory(config).await
    }

    pub async fn from_settings(settings: &Settings) -> Result<AiResponseCache> {
        Self::build(settings.ai_cache_config()).await
    }

    /// Connect to Redis; fall back to an in-process L2 unless the config is strict.
    pub async fn build(mut config: AiResponseCacheConfig) -> Result<AiResponseCache> {
        if config.generic.security.is_none() {
            config.generic.security = Some(SecurityConfig::from_env());
        }
        let redis = AiResponseCache::new(config.clone())?;
        if redis.connect().await? {
            return Ok(redis);
        }
        tracing::warn!(
            redis_url = %super::backend::redact_url(&config.generic.redis_url),
            "redis unreachable, falling back to in-memory cache"
        );
        Self::in_memory(config).await
    }

    async fn in_memory(config: AiResponseCacheConfig) -> Result<AiResponseCache> {
        let mut generic = config.generic.clone();
        if let Some(size) = config.memory_cache_size {
            generic.l1_cache_size = size;
        }
        let backend = Arc::new(InMemoryCache::<Vec<u8>>::new(FALLBACK_MEMORY_ENTRIES));
        let cache = AiResponseCache::with_cache(config, GenericRedisCache::with_backend(generic, backend));
        cache.connect().await?;
        Ok(cache)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::security::{Environment, SecurityLevel};
    use serde_json::json;

    #[tokio::test]
    async fn test_testing_cache_is_in_memory() {
        let cache = CacheFactory::for_testing().await.unwrap();
        assert_eq!(cache.generic().backend_name(), "memory");
        assert!(cache.generic().is_connected());
        assert_eq!(cache.memory_cache_size(), 50);
        cache
            .cache_response("t", "summarize", None, &json!({"s": 1}), None)
            .await
            .unwrap();
        assert!(cache
            .get_cached_response("t", "summarize", None, None)
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn test_unreachable_redis_falls_back_to_memory() {
        let mut config = AiResponseCacheConfig::default().with_generic(
            GenericRedisCacheConfig::new()
                // port 1 is never a redis server
                .with_redis_url("redis://127.0.0.1:1")
                .with_security(SecurityConfig::for_testing().with_tls(false, false)),
        );
        config.generic.security.as_mut().unwrap().connection_timeout = Duration::from_millis(200);
        let cache = CacheFactory::build(config).await.unwrap();
        assert_eq!(cache.generic().backend_name(), "memory");
    }

    #[tokio::test]
    async fn test_from_settings_secures_cache_for_settings_environment() {
        let settings = Settings::from_yaml_str(
            "environment: production\nresilience_preset: production\nredis_url: \"redis://:url-secret-value@127.0.0.1:1\"\n",
        )
        .unwrap();
        let cache = CacheFactory::from_settings(&settings).await.unwrap();
        let security = cache.generic().security_config();
        assert_eq!(security.environment, Environment::Production);
        assert_eq!(security.password, "url-secret-value");
        assert!(!security.password_generated);
        assert_eq!(
            cache.generic().get_security_status().security_level,
            SecurityLevel::High
        );
    }

    #[tokio::test]
    async fn test_strict_mode_does_not_fall_back() {
        let mut config = AiResponseCacheConfig::default().with_generic(
            GenericRedisCacheConfig::new()
                .with_redis_url("redis://127.0.0.1:1")
                .with_fail_on_connection_error(true)
                .with_security(SecurityConfig::for_testing().with_tls(false, false)),
        );
        config.generic.security.as_mut().unwrap().connection_timeout = Duration::from_millis(200);
        assert!(CacheFactory::build(config).await.is_err());
    }
}
