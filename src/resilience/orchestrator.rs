//! Per-operation resilience orchestration.

use super::circuit_breaker::{CircuitBreaker, CircuitBreakerHealth, CircuitState};
use super::metrics::ResilienceMetrics;
use super::retry::{should_retry_on_error, RetryState};
use super::strategy::{ResilienceConfig, ResilienceStrategy};
use crate::config::Settings;
use crate::{Error, ErrorContext, Result};
use futures::future::BoxFuture;
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::sync::Arc;

/// Substitute result producer invoked with the original arguments once an
/// operation cannot succeed.
pub type Fallback<A, T> = Arc<dyn Fn(A) -> BoxFuture<'static, Result<T>> + Send + Sync>;

/// Aggregate health of every registered operation.
#[derive(Debug, Clone, Serialize)]
pub struct OrchestratorHealth {
    pub healthy: bool,
    pub total_circuit_breakers: usize,
    pub open_circuit_breakers: Vec<String>,
    pub half_open_circuit_breakers: Vec<String>,
    pub circuit_breakers: BTreeMap<String, CircuitBreakerHealth>,
}

struct Operation {
    config: ResilienceConfig,
    breaker: CircuitBreaker,
}

struct Inner {
    operations: RwLock<HashMap<String, Arc<Operation>>>,
    default_strategy: ResilienceStrategy,
}

/// Binds named operations to a circuit breaker and retry policy.
///
/// Cloning is cheap and every clone shares the same operation map. Each
/// operation's breaker and metrics are independent: one operation tripping
/// never affects another.
#[derive(Clone)]
pub struct AiServiceResilience {
    inner: Arc<Inner>,
}

impl AiServiceResilience {
    pub fn new() -> Self {
        Self::with_default_strategy(ResilienceStrategy::default())
    }

    /// Unregistered operations are registered on first use with `strategy`.
    pub fn with_default_strategy(strategy: ResilienceStrategy) -> Self {
        Self {
            inner: Arc::new(Inner {
                operations: RwLock::new(HashMap::new()),
                default_strategy: strategy,
            }),
        }
    }

    /// Register every operation configured in `settings`.
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let preset = settings.resilience_preset()?;
        let orchestrator = Self::with_default_strategy(preset.default_strategy);
        for operation in settings.operation_names() {
            let config = settings.resilience_config_for(&preset, &operation);
            orchestrator.register_operation_with_config(&operation, config);
        }
        tracing::info!(
            preset = %preset.name,
            operations = orchestrator.operations().len(),
            "resilience orchestrator configured"
        );
        Ok(orchestrator)
    }

    pub fn register_operation(&self, name: &str, strategy: ResilienceStrategy) {
        self.register_operation_with_config(name, ResilienceConfig::for_strategy(strategy));
    }

    /// Create or update an operation.
    ///
    /// Re-registering with an identical configuration is a no-op. A changed
    /// configuration gets a fresh breaker; accumulated metrics carry over.
    pub fn register_operation_with_config(&self, name: &str, config: ResilienceConfig) {
        let mut ops = self.inner.operations.write();
        let previous = match ops.get(name) {
            Some(existing) if existing.config == config => return,
            Some(existing) => Some(existing.breaker.metrics()),
            None => None,
        };
        let breaker = CircuitBreaker::new(name, config.circuit_breaker.clone());
        if let Some(metrics) = previous {
            breaker.restore_metrics(metrics);
        }
        tracing::debug!(
            operation = %name,
            strategy = %config.strategy,
            max_attempts = config.retry.max_attempts,
            failure_threshold = config.circuit_breaker.failure_threshold,
            "registered resilient operation"
        );
        ops.insert(name.to_string(), Arc::new(Operation { config, breaker }));
    }

    fn operation(&self, name: &str) -> Arc<Operation> {
        if let Some(op) = self.inner.operations.read().get(name) {
            return op.clone();
        }
        let strategy = self.inner.default_strategy;
        self.inner
            .operations
            .write()
            .entry(name.to_string())
            .or_insert_with(|| {
                tracing::debug!(operation = %name, strategy = %strategy, "auto-registered operation");
                let config = ResilienceConfig::for_strategy(strategy);
                Arc::new(Operation {
                    breaker: CircuitBreaker::new(name, config.circuit_breaker.clone()),
                    config,
                })
            })
            .clone()
    }

    pub fn operations(&self) -> Vec<String> {
        let mut names: Vec<String> = self.inner.operations.read().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn operation_config(&self, name: &str) -> Option<ResilienceConfig> {
        self.inner
            .operations
            .read()
            .get(name)
            .map(|op| op.config.clone())
    }

    /// Wrap `func` so every call goes through the breaker and retry loop of
    /// `operation`. With a `fallback`, retry exhaustion and open breakers
    /// resolve to the fallback's result; permanent errors always propagate.
    pub fn with_resilience<A, T, F, Fut>(
        &self,
        operation: &str,
        func: F,
        fallback: Option<Fallback<A, T>>,
    ) -> impl Fn(A) -> BoxFuture<'static, Result<T>> + Send + Sync + 'static
    where
        A: Clone + Send + Sync + 'static,
        T: Send + 'static,
        F: Fn(A) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        let this = self.clone();
        let operation = operation.to_string();
        let func = Arc::new(func);
        move |args: A| -> BoxFuture<'static, Result<T>> {
            let this = this.clone();
            let operation = operation.clone();
            let func = func.clone();
            let fallback = fallback.clone();
            Box::pin(async move {
                this.run(&operation, |a| func(a), args, fallback.as_ref())
                    .await
            })
        }
    }

    /// Run `func(args)` under `operation`'s policy.
    pub async fn execute<A, T, F, Fut>(&self, operation: &str, args: A, func: F) -> Result<T>
    where
        A: Clone,
        F: Fn(A) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        self.run(operation, func, args, None).await
    }

    pub async fn execute_with_fallback<A, T, F, Fut>(
        &self,
        operation: &str,
        args: A,
        func: F,
        fallback: Fallback<A, T>,
    ) -> Result<T>
    where
        A: Clone,
        F: Fn(A) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        self.run(operation, func, args, Some(&fallback)).await
    }

    async fn run<A, T, F, Fut>(
        &self,
        operation: &str,
        func: F,
        args: A,
        fallback: Option<&Fallback<A, T>>,
    ) -> Result<T>
    where
        A: Clone,
        F: Fn(A) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let op = self.operation(operation);
        let err = match self.attempt_loop(operation, &op, &func, &args).await {
            Ok(v) => return Ok(v),
            Err(e) => e,
        };
        match fallback {
            Some(fallback) if matches!(err, Error::RetryExhausted { .. } | Error::CircuitOpen { .. }) => {
                tracing::warn!(operation = %operation, error = %err, "using fallback");
                fallback(args).await
            }
            _ => Err(err),
        }
    }

    async fn attempt_loop<A, T, F, Fut>(
        &self,
        name: &str,
        op: &Operation,
        func: &F,
        args: &A,
    ) -> Result<T>
    where
        A: Clone,
        F: Fn(A) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let cfg = &op.config;
        let max_attempts = if cfg.enable_retry {
            cfg.retry.max_attempts.max(1)
        } else {
            1
        };
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            let permit = if cfg.enable_circuit_breaker {
                Some(op.breaker.permit()?)
            } else {
                None
            };

            let outcome = match cfg.operation_timeout {
                Some(limit) => match tokio::time::timeout(limit, func(args.clone())).await {
                    Ok(r) => r,
                    Err(_) => Err(Error::timeout(format!(
                        "attempt exceeded {}ms",
                        limit.as_millis()
                    ))
                    .with_context(ErrorContext::new().with_operation(name))),
                },
                None => func(args.clone()).await,
            };

            let err = match outcome {
                Ok(v) => {
                    match permit {
                        Some(permit) => permit.success(),
                        None => op.breaker.record_outcome(true),
                    }
                    if attempt > 1 {
                        tracing::info!(operation = %name, attempt, "succeeded after retry");
                    }
                    return Ok(v);
                }
                Err(e) => e,
            };

            match permit {
                Some(permit) => permit.failure(),
                None => op.breaker.record_outcome(false),
            }

            if !should_retry_on_error(&RetryState::new(attempt, &err)) {
                tracing::debug!(operation = %name, error = %err, "permanent failure, not retrying");
                return Err(err);
            }
            if attempt >= max_attempts {
                tracing::warn!(operation = %name, attempts = attempt, error = %err, "retries exhausted");
                return Err(Error::RetryExhausted {
                    operation: name.to_string(),
                    attempts: attempt,
                    last: Box::new(err),
                });
            }

            let delay = cfg.retry.delay(attempt);
            op.breaker.record_retry();
            tracing::warn!(
                operation = %name,
                attempt,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "attempt failed, retrying"
            );
            tokio::time::sleep(delay).await;
        }
    }

    pub fn get_health_status(&self) -> OrchestratorHealth {
        let ops = self.inner.operations.read();
        let mut circuit_breakers = BTreeMap::new();
        let mut open = Vec::new();
        let mut half_open = Vec::new();
        for (name, op) in ops.iter() {
            let health = op.breaker.health();
            match health.state {
                CircuitState::Open => open.push(name.clone()),
                CircuitState::HalfOpen => half_open.push(name.clone()),
                CircuitState::Closed => {}
            }
            circuit_breakers.insert(name.clone(), health);
        }
        open.sort();
        half_open.sort();
        OrchestratorHealth {
            healthy: open.is_empty() && half_open.is_empty(),
            total_circuit_breakers: circuit_breakers.len(),
            open_circuit_breakers: open,
            half_open_circuit_breakers: half_open,
            circuit_breakers,
        }
    }

    pub fn is_healthy(&self) -> bool {
        self.inner
            .operations
            .read()
            .values()
            .all(|op| op.breaker.state() == CircuitState::Closed)
    }

    pub fn get_metrics(&self, operation: &str) -> Option<ResilienceMetrics> {
        self.inner
            .operations
            .read()
            .get(operation)
            .map(|op| op.breaker.metrics())
    }

    pub fn get_all_metrics(&self) -> BTreeMap<String, ResilienceMetrics> {
        self.inner
            .operations
            .read()
            .iter()
            .map(|(name, op)| (name.clone(), op.breaker.metrics()))
            .collect()
    }

    /// Clear metrics for one operation, or all when `operation` is `None`.
    pub fn reset_metrics(&self, operation: Option<&str>) {
        let ops = self.inner.operations.read();
        match operation {
            Some(name) => {
                if let Some(op) = ops.get(name) {
                    op.breaker.reset_metrics();
                }
            }
            None => ops.values().for_each(|op| op.breaker.reset_metrics()),
        }
    }

    /// Force an operation's breaker closed. Returns false for unknown operations.
    pub fn reset_circuit_breaker(&self, operation: &str) -> bool {
        match self.inner.operations.read().get(operation) {
            Some(op) => {
                op.breaker.reset();
                true
            }
            None => false,
        }
    }
}

impl Default for AiServiceResilience {
    fn default() -> Self {
        Self::new()
    }
}
