//! 弹性模式模块：为 AI 调用提供熔断、重试与降级保障。
//!
//! # Resilience Module
//!
//! Per-operation fault handling for calls to an AI provider.
//!
//! ## Key Components
//!
//! | Component | Description |
//! |-----------|-------------|
//! | [`CircuitBreaker`] | Closed / open / half-open breaker owning its operation's metrics |
//! | [`RetryConfig`] | Exponential backoff with jitter |
//! | [`classify_error`] | Transient vs permanent error classification |
//! | [`ResilienceStrategy`] | Named presets from aggressive to critical |
//! | [`PresetManager`] | Environment-level presets and JSON overrides |
//! | [`AiServiceResilience`] | Orchestrator binding operations to breaker + retry + fallback |
//!
//! ## Example
//!
//! ```rust,no_run
//! use ai_resilience_cache::resilience::{AiServiceResilience, ResilienceStrategy};
//!
//! # async fn demo() -> ai_resilience_cache::Result<()> {
//! let resilience = AiServiceResilience::new();
//! resilience.register_operation("summarize", ResilienceStrategy::Balanced);
//!
//! let summary = resilience
//!     .execute("summarize", "some text".to_string(), |text| async move {
//!         Ok(format!("summary of {} chars", text.len()))
//!     })
//!     .await?;
//! # let _ = summary;
//! # Ok(())
//! # }
//! ```

pub mod circuit_breaker;
pub mod metrics;
pub mod orchestrator;
pub mod presets;
pub mod retry;
pub mod strategy;

pub use circuit_breaker::{
    CallPermit, CircuitBreaker, CircuitBreakerConfig, CircuitBreakerHealth, CircuitState,
};
pub use metrics::ResilienceMetrics;
pub use orchestrator::{AiServiceResilience, Fallback, OrchestratorHealth};
pub use presets::{PresetManager, ResiliencePreset};
pub use retry::{classify_error, should_retry_on_error, RetryConfig, RetryState};
pub use strategy::{ResilienceConfig, ResilienceStrategy};
