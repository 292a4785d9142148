//! # ai-resilience-cache
//!
//! AI 文本处理后端的弹性与缓存核心：按操作的熔断/重试编排，以及两级 AI 响应缓存。
//!
//! Resilience and caching core for an AI text-processing backend.
//!
//! ## Overview
//!
//! Calls to an AI provider are slow, rate limited and occasionally down. This
//! crate provides the two layers that sit between a request handler and the
//! provider:
//!
//! - **Resilience**: every named operation ("summarize", "qa", ...) gets its
//!   own circuit breaker, retry policy, timeout and metrics, resolved from a
//!   strategy preset. A wrapped call retries transient failures, fails fast
//!   while the breaker is open and can degrade to a fallback.
//! - **Caching**: responses are cached in a bounded in-process LRU (L1) in
//!   front of Redis (L2), keyed by deterministic, size-bounded AI cache keys
//!   with per-operation TTLs.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use ai_resilience_cache::cache::CacheFactory;
//! use ai_resilience_cache::resilience::AiServiceResilience;
//! use ai_resilience_cache::Settings;
//!
//! #[tokio::main]
//! async fn main() -> ai_resilience_cache::Result<()> {
//!     let settings = Settings::from_env()?;
//!     let resilience = AiServiceResilience::from_settings(&settings)?;
//!     let cache = CacheFactory::from_settings(&settings).await?;
//!
//!     let key = cache.build_key("some text", "summarize", None, None);
//!     if cache.get(&key).await?.is_none() {
//!         let summary = resilience
//!             .execute("summarize", (), |_| async { Ok(serde_json::json!("...")) })
//!             .await?;
//!         cache.set(&key, &summary, Some(cache.ttl_for_operation("summarize"))).await?;
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Module Organization
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`cache`] | Key generation, L1/L2 caches, security, factory |
//! | [`resilience`] | Circuit breaker, retry, strategies, presets, orchestrator |
//! | [`config`] | Environment and YAML settings |
//! | [`service`] | Cache-first, resilience-wrapped text processor |

pub mod cache;
pub mod config;
pub mod resilience;
pub mod service;

/// Error type for the library
pub mod error;
pub use error::{Error, ErrorContext, PermanentKind, TransientKind};

pub use cache::{AiResponseCache, CacheFactory, CacheKeyGenerator, GenericRedisCache};
pub use config::Settings;
pub use resilience::{AiServiceResilience, ResilienceStrategy};
pub use service::{AiProvider, ProcessingRequest, ProcessingResponse, TextProcessor};

/// Result type alias for the library
pub type Result<T> = std::result::Result<T, Error>;
