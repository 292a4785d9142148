use std::fmt;
use thiserror::Error;

/// Structured error context for better error handling and debugging.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ErrorContext {
    /// Resilience operation or cache operation the error belongs to (e.g. "summarize", "cache.get")
    pub operation: Option<String>,
    /// Additional context about the error (e.g. the offending key or configuration value)
    pub details: Option<String>,
    /// Component that raised the error (e.g. "circuit_breaker", "redis_backend")
    pub source: Option<String>,
}

impl ErrorContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_operation(mut self, operation: impl Into<String>) -> Self {
        self.operation = Some(operation.into());
        self
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }
}

/// Families of transient (retry-worthy) failures.
///
/// Every kind inherits the transient classification, including `Custom`
/// kinds defined by callers for their own provider errors.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TransientKind {
    RateLimit,
    Timeout,
    ServiceUnavailable,
    Network,
    Custom(String),
}

/// Families of permanent (fail-fast) failures.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PermanentKind {
    Configuration,
    Authentication,
    InvalidRequest,
    Custom(String),
}

impl fmt::Display for TransientKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RateLimit => f.write_str("rate_limit"),
            Self::Timeout => f.write_str("timeout"),
            Self::ServiceUnavailable => f.write_str("service_unavailable"),
            Self::Network => f.write_str("network"),
            Self::Custom(name) => f.write_str(name),
        }
    }
}

impl fmt::Display for PermanentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Configuration => f.write_str("configuration"),
            Self::Authentication => f.write_str("authentication"),
            Self::InvalidRequest => f.write_str("invalid_request"),
            Self::Custom(name) => f.write_str(name),
        }
    }
}

/// Unified error type for the resilience and cache layers.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Transient AI error ({kind}): {message}{}", format_context(.context))]
    Transient {
        kind: TransientKind,
        message: String,
        context: ErrorContext,
    },

    #[error("Permanent AI error ({kind}): {message}{}", format_context(.context))]
    Permanent {
        kind: PermanentKind,
        message: String,
        context: ErrorContext,
    },

    #[error("Infrastructure error: {message}{}", format_context(.context))]
    Infrastructure {
        message: String,
        context: ErrorContext,
    },

    #[error("Validation error: {message}{}", format_context(.context))]
    Validation {
        message: String,
        context: ErrorContext,
    },

    #[error("Circuit breaker is open for operation '{operation}'")]
    CircuitOpen { operation: String },

    #[error("Retries exhausted for operation '{operation}' after {attempts} attempt(s): {last}")]
    RetryExhausted {
        operation: String,
        attempts: u32,
        last: Box<Error>,
    },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Unknown error: {message}{}", format_context(.context))]
    Unknown {
        message: String,
        context: ErrorContext,
    },
}

// Helper function to format error context for display
fn format_context(ctx: &ErrorContext) -> String {
    let mut parts = Vec::new();
    if let Some(ref op) = ctx.operation {
        parts.push(format!("operation: {}", op));
    }
    if let Some(ref details) = ctx.details {
        parts.push(format!("details: {}", details));
    }
    if let Some(ref source) = ctx.source {
        parts.push(format!("source: {}", source));
    }
    if parts.is_empty() {
        String::new()
    } else {
        format!(" ({})", parts.join(", "))
    }
}

impl Error {
    pub fn transient(kind: TransientKind, msg: impl Into<String>) -> Self {
        Error::Transient {
            kind,
            message: msg.into(),
            context: ErrorContext::new(),
        }
    }

    pub fn permanent(kind: PermanentKind, msg: impl Into<String>) -> Self {
        Error::Permanent {
            kind,
            message: msg.into(),
            context: ErrorContext::new(),
        }
    }

    pub fn rate_limit(msg: impl Into<String>) -> Self {
        Self::transient(TransientKind::RateLimit, msg)
    }

    pub fn timeout(msg: impl Into<String>) -> Self {
        Self::transient(TransientKind::Timeout, msg)
    }

    pub fn service_unavailable(msg: impl Into<String>) -> Self {
        Self::transient(TransientKind::ServiceUnavailable, msg)
    }

    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::permanent(PermanentKind::Configuration, msg)
    }

    pub fn authentication(msg: impl Into<String>) -> Self {
        Self::permanent(PermanentKind::Authentication, msg)
    }

    /// Create a new infrastructure error with structured context
    pub fn infrastructure_with_context(msg: impl Into<String>, context: ErrorContext) -> Self {
        Error::Infrastructure {
            message: msg.into(),
            context,
        }
    }

    /// Create a new validation error with structured context
    pub fn validation_with_context(msg: impl Into<String>, context: ErrorContext) -> Self {
        Error::Validation {
            message: msg.into(),
            context,
        }
    }

    /// Create a new unknown error with structured context
    pub fn unknown_with_context(msg: impl Into<String>, context: ErrorContext) -> Self {
        Error::Unknown {
            message: msg.into(),
            context,
        }
    }

    /// Attach (or replace) structured context on variants that carry one.
    pub fn with_context(mut self, ctx: ErrorContext) -> Self {
        match &mut self {
            Error::Transient { context, .. }
            | Error::Permanent { context, .. }
            | Error::Infrastructure { context, .. }
            | Error::Validation { context, .. }
            | Error::Unknown { context, .. } => *context = ctx,
            _ => {}
        }
        self
    }

    /// Extract error context if available
    pub fn context(&self) -> Option<&ErrorContext> {
        match self {
            Error::Transient { context, .. }
            | Error::Permanent { context, .. }
            | Error::Infrastructure { context, .. }
            | Error::Validation { context, .. }
            | Error::Unknown { context, .. } => Some(context),
            _ => None,
        }
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, Error::Transient { .. } | Error::CircuitOpen { .. })
    }

    pub fn is_permanent(&self) -> bool {
        matches!(self, Error::Permanent { .. } | Error::Validation { .. })
    }

    /// The innermost error, unwrapping retry exhaustion.
    pub fn root(&self) -> &Error {
        match self {
            Error::RetryExhausted { last, .. } => last.root(),
            other => other,
        }
    }
}

impl From<redis::RedisError> for Error {
    fn from(err: redis::RedisError) -> Self {
        let kind = if err.is_timeout() {
            "timeout"
        } else if err.is_connection_refusal() || err.is_connection_dropped() {
            "connection"
        } else {
            "command"
        };
        Error::infrastructure_with_context(
            err.to_string(),
            ErrorContext::new()
                .with_source("redis_backend")
                .with_details(kind),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_includes_context() {
        let err = Error::rate_limit("slow down").with_context(
            ErrorContext::new()
                .with_operation("summarize")
                .with_source("provider"),
        );
        let text = err.to_string();
        assert!(text.contains("rate_limit"));
        assert!(text.contains("operation: summarize"));
        assert!(text.contains("source: provider"));
    }

    #[test]
    fn test_root_unwraps_retry_exhausted() {
        let err = Error::RetryExhausted {
            operation: "qa".into(),
            attempts: 3,
            last: Box::new(Error::timeout("too slow")),
        };
        assert!(matches!(
            err.root(),
            Error::Transient {
                kind: TransientKind::Timeout,
                ..
            }
        ));
    }

    #[test]
    fn test_family_predicates() {
        assert!(Error::service_unavailable("down").is_transient());
        assert!(Error::CircuitOpen { operation: "x".into() }.is_transient());
        assert!(Error::authentication("bad key").is_permanent());
        assert!(!Error::authentication("bad key").is_transient());
    }
}
