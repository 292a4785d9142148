//! 缓存模块：两级（内存 L1 + Redis L2）AI 响应缓存。
//!
//! # Response Caching Module
//!
//! Two-tier caching of AI responses: a bounded in-process LRU (L1) in front
//! of a shared Redis store (L2), with deterministic AI-aware cache keys.
//!
//! ## Key Components
//!
//! | Component | Description |
//! |-----------|-------------|
//! | [`CacheKeyGenerator`] | Deterministic, size-bounded keys from text, operation, options and question |
//! | [`InMemoryCache`] | LRU L1 with per-entry TTL |
//! | [`CacheBackend`] | Trait for L2 stores; [`RedisBackend`] and [`InMemoryCache`] implement it |
//! | [`GenericRedisCache`] | L1 + L2 cache with compression, callbacks and security reporting |
//! | [`AiResponseCache`] | Generic cache plus operation TTLs and key generation |
//! | [`CacheFactory`] | Preset constructors with in-memory fallback |
//! | [`SecurityConfig`] | TLS and AUTH/ACL settings for Redis |
//!
//! ## Example
//!
//! ```rust,no_run
//! use ai_resilience_cache::cache::CacheFactory;
//! use serde_json::json;
//!
//! # async fn demo() -> ai_resilience_cache::Result<()> {
//! let cache = CacheFactory::for_ai_app("redis://localhost:6379").await?;
//! cache
//!     .cache_response("long article ...", "summarize", None, &json!({"summary": "..."}), None)
//!     .await?;
//! let hit = cache.get_cached_response("long article ...", "summarize", None, None).await?;
//! assert!(hit.is_some());
//! # Ok(())
//! # }
//! ```
//!
//! ## Cache Key Format
//!
//! `ai_cache:op:<operation>|txt:<text or hash:16hex>|opts:<8hex>|q:<8hex>`
//!
//! Text above the hash threshold is hashed, so key length never grows with
//! input size. Option ordering never changes the key, and questions are
//! always hashed.

mod ai;
mod backend;
mod codec;
mod events;
mod factory;
mod generic;
mod key;
mod memory;
mod monitor;
mod security;

pub use ai::{default_operation_ttls, AiCacheStats, AiResponseCache, AiResponseCacheConfig};
pub use backend::{CacheBackend, RedisBackend};
pub use codec::{Encoded, ValueCodec, DEFAULT_COMPRESSION_LEVEL, DEFAULT_COMPRESSION_THRESHOLD};
pub use events::{CacheCallback, CacheEvent, CacheEventData, CacheTier, CallbackRegistry};
pub use factory::CacheFactory;
pub use generic::{
    GenericCacheStats, GenericRedisCache, GenericRedisCacheConfig, DEFAULT_REDIS_URL, DEFAULT_TTL,
};
pub use key::{CacheKeyGenerator, HashAlgorithm, TextTier, DEFAULT_TEXT_HASH_THRESHOLD, KEY_PREFIX};
pub use memory::{InMemoryCache, MemoryCacheStats, DEFAULT_L1_SIZE};
pub use monitor::{
    CacheOperationMeasurement, CacheOperationStats, CachePerformanceMonitor,
    KeyGenerationMeasurement, KeyGenerationStats,
};
pub use security::{
    render_security_report, Environment, SecurityConfig, SecurityLevel, SecurityStatus,
    SecurityTestResult, SecurityValidation,
};
