//! Two-tier cache behaviour over an in-process L2 backend

use ai_resilience_cache::cache::{
    AiResponseCache, AiResponseCacheConfig, CacheBackend, CacheEvent, CacheFactory,
    GenericRedisCache, GenericRedisCacheConfig, InMemoryCache, SecurityConfig, SecurityLevel,
};
use ai_resilience_cache::{Error, ErrorContext, Result};
use async_trait::async_trait;
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

fn memory_cache(config: GenericRedisCacheConfig) -> (GenericRedisCache, Arc<InMemoryCache<Vec<u8>>>) {
    let backend = Arc::new(InMemoryCache::<Vec<u8>>::new(1000));
    let config = config.with_security(SecurityConfig::for_testing());
    (GenericRedisCache::with_backend(config, backend.clone()), backend)
}

struct DownBackend;

fn refused() -> Error {
    Error::infrastructure_with_context("connection refused", ErrorContext::new().with_source("down"))
}

#[async_trait]
impl CacheBackend for DownBackend {
    async fn connect(&self) -> Result<()> {
        Err(refused())
    }
    async fn get(&self, _: &str) -> Result<Option<Vec<u8>>> {
        Err(refused())
    }
    async fn set(&self, _: &str, _: &[u8], _: Option<Duration>) -> Result<()> {
        Err(refused())
    }
    async fn delete(&self, _: &str) -> Result<bool> {
        Err(refused())
    }
    async fn exists(&self, _: &str) -> Result<bool> {
        Err(refused())
    }
    async fn ttl(&self, _: &str) -> Result<Option<Duration>> {
        Err(refused())
    }
    async fn keys_matching(&self, _: &str) -> Result<Vec<String>> {
        Err(refused())
    }
    async fn ping(&self) -> Result<()> {
        Err(refused())
    }
    fn is_connected(&self) -> bool {
        false
    }
    fn name(&self) -> &'static str {
        "down"
    }
}

#[tokio::test]
async fn test_write_through_then_l2_promotion() {
    let (cache, backend) = memory_cache(GenericRedisCacheConfig::new());
    assert!(cache.connect().await.unwrap());

    cache.set("user:1", &json!({"name": "ada"}), None).await.unwrap();
    assert!(backend.exists("user:1").await);

    cache.clear_l1();
    assert_eq!(cache.get("user:1").await.unwrap(), Some(json!({"name": "ada"})));
    assert_eq!(cache.get("user:1").await.unwrap(), Some(json!({"name": "ada"})));

    let stats = cache.stats();
    assert_eq!(stats.l2_hits, 1);
    assert_eq!(stats.l1_hits, 1);
    assert_eq!(stats.misses, 0);
}

#[tokio::test]
async fn test_expired_entries_are_gone_from_both_tiers() {
    let (cache, _) = memory_cache(GenericRedisCacheConfig::new());
    cache.connect().await.unwrap();
    cache
        .set("short", &json!(1), Some(Duration::from_millis(50)))
        .await
        .unwrap();
    assert!(cache.exists("short").await.unwrap());

    tokio::time::sleep(Duration::from_millis(120)).await;
    assert_eq!(cache.get("short").await.unwrap(), None);
    assert!(!cache.exists("short").await.unwrap());
}

#[tokio::test]
async fn test_l1_is_bounded() {
    let (cache, _) = memory_cache(GenericRedisCacheConfig::new().with_l1_cache(true, 3));
    cache.connect().await.unwrap();
    for i in 0..10 {
        cache.set(&format!("k{}", i), &json!(i), None).await.unwrap();
    }
    let l1 = cache.l1().unwrap();
    assert!(l1.len() <= 3);
    // older entries are still served from L2
    assert_eq!(cache.get("k0").await.unwrap(), Some(json!(0)));
}

#[tokio::test]
async fn test_pattern_invalidation_spans_tiers() {
    let (cache, backend) = memory_cache(GenericRedisCacheConfig::new());
    cache.connect().await.unwrap();
    for key in ["session:a", "session:b", "profile:a"] {
        cache.set(key, &json!(key), None).await.unwrap();
    }

    let removed = cache.invalidate_pattern("session:*").await.unwrap();
    assert_eq!(removed, 2);
    assert_eq!(cache.get("session:a").await.unwrap(), None);
    assert!(!backend.exists("session:b").await);
    assert_eq!(cache.get("profile:a").await.unwrap(), Some(json!("profile:a")));
}

#[tokio::test]
async fn test_unreachable_l2_degrades_to_l1() {
    let cache = GenericRedisCache::with_backend(
        GenericRedisCacheConfig::new().with_security(SecurityConfig::for_testing()),
        Arc::new(DownBackend),
    );
    assert!(!cache.connect().await.unwrap());
    assert!(!cache.is_connected());

    cache.set("k", &json!("local"), None).await.unwrap();
    assert_eq!(cache.get("k").await.unwrap(), Some(json!("local")));
    assert!(cache.delete("k").await.unwrap());
    assert_eq!(cache.get("k").await.unwrap(), None);
}

#[tokio::test]
async fn test_strict_mode_surfaces_connection_errors() {
    let cache = GenericRedisCache::with_backend(
        GenericRedisCacheConfig::new()
            .with_fail_on_connection_error(true)
            .with_security(SecurityConfig::for_testing()),
        Arc::new(DownBackend),
    );
    let err = cache.connect().await.unwrap_err();
    assert!(matches!(err, Error::Infrastructure { .. }), "got {:?}", err);
}

#[tokio::test]
async fn test_callbacks_observe_hits_and_misses() {
    let (cache, _) = memory_cache(GenericRedisCacheConfig::new());
    cache.connect().await.unwrap();
    let hits = Arc::new(AtomicUsize::new(0));
    let misses = Arc::new(AtomicUsize::new(0));
    {
        let hits = hits.clone();
        cache.register_callback(CacheEvent::GetSuccess, move |_| {
            hits.fetch_add(1, Ordering::SeqCst);
        });
        let misses = misses.clone();
        cache.register_callback(CacheEvent::GetMiss, move |_| {
            misses.fetch_add(1, Ordering::SeqCst);
        });
    }
    cache.register_callback(CacheEvent::GetMiss, |_| panic!("misbehaving observer"));

    cache.set("k", &json!(1), None).await.unwrap();
    cache.get("k").await.unwrap();
    assert_eq!(cache.get("missing").await.unwrap(), None);

    assert_eq!(hits.load(Ordering::SeqCst), 1);
    assert_eq!(misses.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_security_level_is_never_below_medium() {
    for cfg in [
        SecurityConfig::for_testing(),
        SecurityConfig::for_testing().with_tls(false, false),
        SecurityConfig::for_testing().with_password("short"),
    ] {
        let backend = Arc::new(InMemoryCache::<Vec<u8>>::new(10));
        let cache = GenericRedisCache::with_backend(GenericRedisCacheConfig::new().with_security(cfg), backend);
        let status = cache.get_security_status();
        assert!(status.security_level >= SecurityLevel::Medium);
        assert!(status.authentication_enabled);
    }
}

#[tokio::test]
async fn test_security_report_and_check() {
    let (cache, _) = memory_cache(GenericRedisCacheConfig::new());
    cache.connect().await.unwrap();
    let report = cache.generate_security_report();
    assert!(report.contains("Redis Security Report"));
    assert!(!cache.get_security_recommendations().is_empty());

    let check = cache.test_security_configuration().await;
    assert!(check.connection_ok, "errors: {:?}", check.errors);
}

#[tokio::test]
async fn test_ai_cache_round_trip_with_operation_ttl() {
    let cache: AiResponseCache = CacheFactory::for_testing().await.unwrap();
    let options = json!({"max_length": 50});
    let key = cache
        .cache_response("article body", "summarize", Some(&options), &json!({"summary": "short"}), None)
        .await
        .unwrap();
    assert!(key.starts_with("ai_cache:op:summarize|"));

    let hit = cache
        .get_cached_response("article body", "summarize", Some(&options), None)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(hit["summary"], "short");
    assert_eq!(hit["cache_hit"], true);
    assert_eq!(hit["operation"], "summarize");

    assert_eq!(cache.ttl_for_operation("sentiment"), Duration::from_secs(86400));
    assert_eq!(cache.ttl_for_operation("qa"), Duration::from_secs(1800));
}

#[tokio::test]
async fn test_ai_cache_invalidation_by_operation() {
    let cache = CacheFactory::for_testing().await.unwrap();
    for op in ["summarize", "sentiment"] {
        for text in ["one", "two"] {
            cache
                .cache_response(text, op, None, &json!({"r": op}), None)
                .await
                .unwrap();
        }
    }
    assert_eq!(cache.invalidate_by_operation("summarize").await.unwrap(), 2);
    assert!(cache
        .get_cached_response("one", "summarize", None, None)
        .await
        .unwrap()
        .is_none());
    assert!(cache
        .get_cached_response("one", "sentiment", None, None)
        .await
        .unwrap()
        .is_some());

    let stats = cache.get_cache_stats();
    assert!(stats.cache.sets >= 4);
}

#[tokio::test]
async fn test_ai_cache_config_tunes_key_threshold() {
    let backend = Arc::new(InMemoryCache::<Vec<u8>>::new(100));
    let config = AiResponseCacheConfig::default()
        .with_text_hash_threshold(10)
        .with_generic(GenericRedisCacheConfig::new().with_security(SecurityConfig::for_testing()));
    let cache = AiResponseCache::with_cache(
        config.clone(),
        GenericRedisCache::with_backend(config.generic.clone(), backend),
    );
    let key = cache.build_key("longer than ten characters", "summarize", None, None);
    assert!(key.contains("txt:hash:"));
}
