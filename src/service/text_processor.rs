use crate::cache::AiResponseCache;
use crate::resilience::{AiServiceResilience, Fallback};
use crate::{Error, ErrorContext, Result};
use async_trait::async_trait;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Instant;

/// The AI backend performing an operation on text.
#[async_trait]
pub trait AiProvider: Send + Sync {
    async fn process(&self, request: &ProcessingRequest) -> Result<Value>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessingRequest {
    pub text: String,
    pub operation: String,
    #[serde(default)]
    pub options: Option<Value>,
    #[serde(default)]
    pub question: Option<String>,
}

impl ProcessingRequest {
    pub fn new(text: impl Into<String>, operation: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            operation: operation.into(),
            options: None,
            question: None,
        }
    }

    pub fn with_options(mut self, options: Value) -> Self {
        self.options = Some(options);
        self
    }

    pub fn with_question(mut self, question: impl Into<String>) -> Self {
        self.question = Some(question.into());
        self
    }

    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: &str| {
            Err(Error::validation_with_context(
                msg,
                ErrorContext::new()
                    .with_operation(self.operation.clone())
                    .with_source("text_processor"),
            ))
        };
        if self.text.trim().is_empty() {
            return invalid("text must not be empty");
        }
        if self.operation.trim().is_empty() {
            return invalid("operation must not be empty");
        }
        if self.operation == "qa" && self.question.as_deref().map_or(true, |q| q.trim().is_empty()) {
            return invalid("qa requires a question");
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ProcessingResponse {
    pub operation: String,
    pub result: Value,
    pub cached: bool,
    /// The result came from the fallback and was not cached.
    pub degraded: bool,
    pub processing_time_ms: u64,
}

/// Cache-first, resilience-wrapped text processing.
pub struct TextProcessor {
    provider: Arc<dyn AiProvider>,
    cache: Arc<AiResponseCache>,
    resilience: AiServiceResilience,
    background_writes: bool,
    fallback_enabled: bool,
}

impl TextProcessor {
    pub fn new(
        provider: Arc<dyn AiProvider>,
        cache: Arc<AiResponseCache>,
        resilience: AiServiceResilience,
    ) -> Self {
        Self {
            provider,
            cache,
            resilience,
            background_writes: false,
            fallback_enabled: true,
        }
    }

    /// Write cache entries from a spawned task instead of before returning.
    pub fn with_background_writes(mut self, enabled: bool) -> Self {
        self.background_writes = enabled;
        self
    }

    /// Propagate provider failures instead of serving a degraded result.
    pub fn without_fallback(mut self) -> Self {
        self.fallback_enabled = false;
        self
    }

    pub fn cache(&self) -> &Arc<AiResponseCache> {
        &self.cache
    }

    pub fn resilience(&self) -> &AiServiceResilience {
        &self.resilience
    }

    pub async fn process(&self, request: &ProcessingRequest) -> Result<ProcessingResponse> {
        let start = Instant::now();
        request.validate()?;
        let question = request.question.as_deref();
        let options = request.options.as_ref();

        if let Some(hit) = self
            .cache
            .get_cached_response(&request.text, &request.operation, options, question)
            .await?
        {
            tracing::debug!(operation = %request.operation, "serving cached response");
            return Ok(ProcessingResponse {
                operation: request.operation.clone(),
                result: hit.get("result").cloned().unwrap_or(hit),
                cached: true,
                degraded: false,
                processing_time_ms: start.elapsed().as_millis() as u64,
            });
        }

        let provider = self.provider.clone();
        let call = move |req: ProcessingRequest| {
            let provider = provider.clone();
            async move { provider.process(&req).await.map(|v| (v, false)) }
        };
        let (result, degraded) = if self.fallback_enabled {
            let fallback: Fallback<ProcessingRequest, (Value, bool)> = Arc::new(|req: ProcessingRequest| {
                async move { Ok::<_, Error>((degraded_result(&req), true)) }.boxed()
            });
            self.resilience
                .execute_with_fallback(&request.operation, request.clone(), call, fallback)
                .await?
        } else {
            self.resilience
                .execute(&request.operation, request.clone(), call)
                .await?
        };

        if degraded {
            tracing::warn!(operation = %request.operation, "returning degraded result");
        } else {
            self.store(request, &result).await;
        }

        Ok(ProcessingResponse {
            operation: request.operation.clone(),
            result,
            cached: false,
            degraded,
            processing_time_ms: start.elapsed().as_millis() as u64,
        })
    }

    async fn store(&self, request: &ProcessingRequest, result: &Value) {
        let payload = json!({ "result": result });
        if !self.background_writes {
            if let Err(e) = self
                .cache
                .cache_response(
                    &request.text,
                    &request.operation,
                    request.options.as_ref(),
                    &payload,
                    request.question.as_deref(),
                )
                .await
            {
                tracing::warn!(operation = %request.operation, error = %e, "failed to cache response");
            }
            return;
        }
        let cache = self.cache.clone();
        let request = request.clone();
        tokio::spawn(async move {
            if let Err(e) = cache
                .cache_response(
                    &request.text,
                    &request.operation,
                    request.options.as_ref(),
                    &payload,
                    request.question.as_deref(),
                )
                .await
            {
                tracing::warn!(operation = %request.operation, error = %e, "background cache write failed");
            }
        });
    }
}

fn degraded_result(request: &ProcessingRequest) -> Value {
    json!({
        "operation": request.operation,
        "message": "The AI service is temporarily unavailable. Please try again shortly.",
        "fallback": true,
    })
}
