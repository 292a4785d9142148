//! Text processing through cache and resilience layers together

use ai_resilience_cache::cache::CacheFactory;
use ai_resilience_cache::resilience::{ResilienceConfig, ResilienceStrategy, RetryConfig};
use ai_resilience_cache::{
    AiProvider, AiServiceResilience, Error, ProcessingRequest, Result, TextProcessor,
};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Fails a fixed number of times, then answers slowly.
struct SlowRecoveringProvider {
    failures_left: AtomicU32,
    calls: AtomicU32,
    latency: Duration,
}

impl SlowRecoveringProvider {
    fn new(failures: u32, latency: Duration) -> Self {
        Self {
            failures_left: AtomicU32::new(failures),
            calls: AtomicU32::new(0),
            latency,
        }
    }
}

#[async_trait]
impl AiProvider for SlowRecoveringProvider {
    async fn process(&self, request: &ProcessingRequest) -> Result<Value> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(Error::service_unavailable("model overloaded"));
        }
        tokio::time::sleep(self.latency).await;
        Ok(json!({
            "summary": request.text.split_whitespace().take(3).collect::<Vec<_>>().join(" "),
        }))
    }
}

async fn processor(provider: Arc<SlowRecoveringProvider>) -> TextProcessor {
    let resilience = AiServiceResilience::new();
    for op in ["summarize", "qa"] {
        resilience.register_operation_with_config(
            op,
            ResilienceConfig::for_strategy(ResilienceStrategy::Balanced)
                .with_retry(RetryConfig::immediate(3)),
        );
    }
    let cache = Arc::new(CacheFactory::for_testing().await.unwrap());
    TextProcessor::new(provider, cache, resilience)
}

#[tokio::test]
async fn test_recovering_provider_result_is_cached() {
    let provider = Arc::new(SlowRecoveringProvider::new(2, Duration::from_millis(30)));
    let tp = processor(provider.clone()).await;
    let request = ProcessingRequest::new("the quick brown fox jumps", "summarize")
        .with_options(json!({"max_length": 10}));

    let first = tp.process(&request).await.unwrap();
    assert!(!first.cached);
    assert!(!first.degraded);
    assert_eq!(first.result["summary"], "the quick brown");
    assert_eq!(provider.calls.load(Ordering::SeqCst), 3);

    let metrics = tp.resilience().get_metrics("summarize").unwrap();
    assert_eq!(metrics.retry_attempts, 2);
    assert_eq!(metrics.successful_calls, 1);

    let start = Instant::now();
    let second = tp.process(&request).await.unwrap();
    let cached_elapsed = start.elapsed();
    assert!(second.cached);
    assert_eq!(second.result, first.result);
    assert_eq!(provider.calls.load(Ordering::SeqCst), 3);
    assert!(cached_elapsed < Duration::from_millis(30));
}

#[tokio::test]
async fn test_different_options_miss_the_cache() {
    let provider = Arc::new(SlowRecoveringProvider::new(0, Duration::ZERO));
    let tp = processor(provider.clone()).await;
    let base = ProcessingRequest::new("same text", "summarize");

    tp.process(&base.clone().with_options(json!({"max_length": 10})))
        .await
        .unwrap();
    let other = tp
        .process(&base.clone().with_options(json!({"max_length": 20})))
        .await
        .unwrap();
    assert!(!other.cached);
    let repeated = tp
        .process(&base.with_options(json!({"max_length": 20})))
        .await
        .unwrap();
    assert!(repeated.cached);
    assert_eq!(provider.calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_questions_partition_qa_cache() {
    let provider = Arc::new(SlowRecoveringProvider::new(0, Duration::ZERO));
    let tp = processor(provider.clone()).await;

    let who = ProcessingRequest::new("a document", "qa").with_question("who?");
    let when = ProcessingRequest::new("a document", "qa").with_question("when?");
    tp.process(&who).await.unwrap();
    assert!(!tp.process(&when).await.unwrap().cached);
    assert!(tp.process(&who).await.unwrap().cached);
    assert_eq!(provider.calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_outage_degrades_then_recovers_after_reset() {
    let provider = Arc::new(SlowRecoveringProvider::new(u32::MAX, Duration::ZERO));
    let tp = processor(provider.clone()).await;
    let request = ProcessingRequest::new("anything", "summarize");

    let resp = tp.process(&request).await.unwrap();
    assert!(resp.degraded);
    assert!(!tp.process(&request).await.unwrap().cached);

    provider.failures_left.store(0, Ordering::SeqCst);
    tp.resilience().reset_circuit_breaker("summarize");
    let resp = tp.process(&request).await.unwrap();
    assert!(!resp.degraded);
    assert!(tp.process(&request).await.unwrap().cached);
}
