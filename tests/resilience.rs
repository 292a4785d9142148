//! Orchestrator behaviour: breaker state machine, retries, fallbacks and isolation

use ai_resilience_cache::resilience::{
    AiServiceResilience, CircuitBreakerConfig, CircuitState, Fallback, PresetManager,
    ResilienceConfig, ResilienceStrategy, RetryConfig,
};
use ai_resilience_cache::{Error, Settings};
use futures::FutureExt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

fn tight_config(threshold: u32, attempts: u32, recovery: Duration) -> ResilienceConfig {
    ResilienceConfig::for_strategy(ResilienceStrategy::Aggressive)
        .with_retry(RetryConfig::immediate(attempts))
        .with_circuit_breaker(
            CircuitBreakerConfig::new()
                .with_failure_threshold(threshold)
                .with_recovery_timeout(recovery),
        )
}

fn state_of(resilience: &AiServiceResilience, op: &str) -> CircuitState {
    resilience.get_health_status().circuit_breakers[op].state
}

async fn fail_once(resilience: &AiServiceResilience, op: &str, calls: &Arc<AtomicU32>) -> Error {
    let calls = calls.clone();
    resilience
        .execute(op, (), move |_| {
            let calls = calls.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(Error::service_unavailable("down"))
            }
        })
        .await
        .unwrap_err()
}

#[tokio::test]
async fn test_breaker_opens_fails_fast_and_recovers() {
    let resilience = AiServiceResilience::new();
    resilience.register_operation_with_config(
        "summarize",
        tight_config(3, 1, Duration::from_millis(100)),
    );
    let calls = Arc::new(AtomicU32::new(0));

    for _ in 0..3 {
        fail_once(&resilience, "summarize", &calls).await;
    }
    assert_eq!(state_of(&resilience, "summarize"), CircuitState::Open);
    assert!(!resilience.is_healthy());

    let start = Instant::now();
    let err = fail_once(&resilience, "summarize", &calls).await;
    assert!(start.elapsed() < Duration::from_millis(10));
    assert!(matches!(err, Error::CircuitOpen { .. }), "got {:?}", err);
    assert_eq!(calls.load(Ordering::SeqCst), 3, "open breaker must not invoke the call");

    tokio::time::sleep(Duration::from_millis(150)).await;
    let value = resilience
        .execute("summarize", (), |_| async { Ok::<_, Error>("recovered") })
        .await
        .unwrap();
    assert_eq!(value, "recovered");
    assert_eq!(state_of(&resilience, "summarize"), CircuitState::Closed);

    let metrics = resilience.get_metrics("summarize").unwrap();
    assert_eq!(metrics.circuit_breaker_opens, 1);
    assert_eq!(metrics.circuit_breaker_half_opens, 1);
    assert_eq!(metrics.circuit_breaker_closes, 1);
    assert_eq!(metrics.successful_calls, 1);
}

#[tokio::test]
async fn test_failed_trial_call_reopens() {
    let resilience = AiServiceResilience::new();
    resilience.register_operation_with_config("qa", tight_config(1, 1, Duration::from_millis(50)));
    let calls = Arc::new(AtomicU32::new(0));

    fail_once(&resilience, "qa", &calls).await;
    assert_eq!(state_of(&resilience, "qa"), CircuitState::Open);

    tokio::time::sleep(Duration::from_millis(80)).await;
    fail_once(&resilience, "qa", &calls).await;
    assert_eq!(state_of(&resilience, "qa"), CircuitState::Open);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_operations_are_isolated() {
    let resilience = AiServiceResilience::new();
    resilience.register_operation_with_config("a", tight_config(2, 1, Duration::from_secs(60)));
    resilience.register_operation_with_config("b", tight_config(2, 1, Duration::from_secs(60)));
    let calls = Arc::new(AtomicU32::new(0));

    for _ in 0..2 {
        fail_once(&resilience, "a", &calls).await;
    }
    assert_eq!(state_of(&resilience, "a"), CircuitState::Open);
    assert_eq!(state_of(&resilience, "b"), CircuitState::Closed);

    let ok = resilience
        .execute("b", 21, |x: i32| async move { Ok::<_, Error>(x * 2) })
        .await
        .unwrap();
    assert_eq!(ok, 42);

    let health = resilience.get_health_status();
    assert_eq!(health.open_circuit_breakers, vec!["a".to_string()]);
    assert_eq!(resilience.get_metrics("b").unwrap().failed_calls, 0);
}

#[tokio::test]
async fn test_exact_attempt_count_without_fallback() {
    let resilience = AiServiceResilience::new();
    resilience.register_operation_with_config(
        "summarize",
        tight_config(100, 4, Duration::from_secs(60)),
    );
    let calls = Arc::new(AtomicU32::new(0));
    let err = fail_once(&resilience, "summarize", &calls).await;

    assert_eq!(calls.load(Ordering::SeqCst), 4);
    match err {
        Error::RetryExhausted { attempts, last, .. } => {
            assert_eq!(attempts, 4);
            assert!(last.is_transient());
        }
        other => panic!("expected RetryExhausted, got {:?}", other),
    }
    let metrics = resilience.get_metrics("summarize").unwrap();
    assert_eq!(metrics.retry_attempts, 3);
    assert_eq!(metrics.failed_calls, 4);
}

#[tokio::test]
async fn test_permanent_errors_are_not_retried_nor_replaced() {
    let resilience = AiServiceResilience::new();
    resilience.register_operation_with_config("qa", tight_config(100, 5, Duration::from_secs(60)));
    let calls = Arc::new(AtomicU32::new(0));
    let fallback: Fallback<(), &'static str> =
        Arc::new(|_: ()| async { Ok::<_, Error>("fallback") }.boxed());

    let counter = calls.clone();
    let err = resilience
        .execute_with_fallback(
            "qa",
            (),
            move |_| {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err::<&'static str, _>(Error::authentication("bad key"))
                }
            },
            fallback,
        )
        .await
        .unwrap_err();
    assert!(err.is_permanent());
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_fallback_receives_original_arguments() {
    let resilience = AiServiceResilience::new();
    resilience.register_operation_with_config(
        "sentiment",
        tight_config(100, 2, Duration::from_secs(60)),
    );
    let fallback: Fallback<String, String> =
        Arc::new(|text: String| async move { Ok::<_, Error>(format!("neutral:{}", text)) }.boxed());

    let result = resilience
        .execute_with_fallback(
            "sentiment",
            "great product".to_string(),
            |_text: String| async { Err::<String, _>(Error::rate_limit("429")) },
            fallback,
        )
        .await
        .unwrap();
    assert_eq!(result, "neutral:great product");
}

#[tokio::test]
async fn test_wrapped_function_is_reusable() {
    let resilience = AiServiceResilience::new();
    resilience.register_operation_with_config(
        "key_points",
        tight_config(100, 3, Duration::from_secs(60)),
    );
    let attempts = Arc::new(AtomicU32::new(0));
    let counter = attempts.clone();
    let wrapped = resilience.with_resilience(
        "key_points",
        move |n: u32| {
            let counter = counter.clone();
            async move {
                if counter.fetch_add(1, Ordering::SeqCst) % 2 == 0 {
                    Err(Error::timeout("slow"))
                } else {
                    Ok(n + 1)
                }
            }
        },
        None,
    );

    assert_eq!(wrapped(1).await.unwrap(), 2);
    assert_eq!(wrapped(10).await.unwrap(), 11);
    assert_eq!(attempts.load(Ordering::SeqCst), 4);
}

#[tokio::test]
async fn test_attempt_timeout_counts_as_transient() {
    let resilience = AiServiceResilience::new();
    resilience.register_operation_with_config(
        "questions",
        tight_config(100, 2, Duration::from_secs(60))
            .with_operation_timeout(Some(Duration::from_millis(20))),
    );
    let err = resilience
        .execute("questions", (), |_| async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok::<_, Error>(())
        })
        .await
        .unwrap_err();
    match err {
        Error::RetryExhausted { attempts, last, .. } => {
            assert_eq!(attempts, 2);
            assert!(last.is_transient());
        }
        other => panic!("expected RetryExhausted, got {:?}", other),
    }
}

#[tokio::test]
async fn test_unknown_operations_use_default_strategy() {
    let resilience = AiServiceResilience::with_default_strategy(ResilienceStrategy::Conservative);
    resilience
        .execute("translate", (), |_| async { Ok::<_, Error>(()) })
        .await
        .unwrap();
    let cfg = resilience.operation_config("translate").unwrap();
    assert_eq!(cfg.strategy, ResilienceStrategy::Conservative);
    assert_eq!(resilience.operations(), vec!["translate".to_string()]);
}

#[tokio::test]
async fn test_reset_closes_breaker_and_clears_metrics() {
    let resilience = AiServiceResilience::new();
    resilience.register_operation_with_config("qa", tight_config(1, 1, Duration::from_secs(60)));
    let calls = Arc::new(AtomicU32::new(0));
    fail_once(&resilience, "qa", &calls).await;
    assert_eq!(state_of(&resilience, "qa"), CircuitState::Open);

    assert!(resilience.reset_circuit_breaker("qa"));
    assert!(!resilience.reset_circuit_breaker("missing"));
    assert_eq!(state_of(&resilience, "qa"), CircuitState::Closed);

    resilience.reset_metrics(Some("qa"));
    assert_eq!(resilience.get_metrics("qa").unwrap().total_calls, 0);
}

#[test]
fn test_production_settings_build_expected_operations() {
    let settings = Settings::from_yaml_str(
        "environment: production\nresilience_preset: production\n",
    )
    .unwrap();
    let resilience = AiServiceResilience::from_settings(&settings).unwrap();
    assert_eq!(
        resilience.operation_config("qa").unwrap().strategy,
        ResilienceStrategy::Critical
    );
    assert_eq!(
        resilience.operation_config("sentiment").unwrap().strategy,
        ResilienceStrategy::Aggressive
    );
    assert_eq!(
        PresetManager::new().recommend_preset(settings.environment),
        "production"
    );
}

#[tokio::test]
async fn test_cancelled_half_open_attempt_does_not_wedge_breaker() {
    let resilience = AiServiceResilience::new();
    resilience.register_operation_with_config(
        "summarize",
        tight_config(1, 1, Duration::from_millis(20)),
    );
    let calls = Arc::new(AtomicU32::new(0));
    fail_once(&resilience, "summarize", &calls).await;
    assert_eq!(state_of(&resilience, "summarize"), CircuitState::Open);
    tokio::time::sleep(Duration::from_millis(40)).await;

    // the caller gives up on the half-open attempt mid-flight
    let abandoned = tokio::time::timeout(
        Duration::from_millis(5),
        resilience.execute("summarize", (), |_| async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok::<_, Error>("late")
        }),
    )
    .await;
    assert!(abandoned.is_err());
    tokio::time::sleep(Duration::from_millis(50)).await;

    let res = resilience
        .execute("summarize", (), |_| async { Ok::<_, Error>("fresh") })
        .await;
    assert_eq!(res.unwrap(), "fresh");
    assert_eq!(state_of(&resilience, "summarize"), CircuitState::Closed);
}
