//! Application settings.
//!
//! Loaded from environment variables ([`Settings::from_env`]) or YAML
//! ([`Settings::from_yaml_str`]). Missing values fall back to defaults.

use crate::cache::{AiResponseCacheConfig, Environment, GenericRedisCacheConfig, SecurityConfig};
use crate::resilience::{PresetManager, ResilienceConfig, ResiliencePreset, ResilienceStrategy};
use crate::{Error, ErrorContext, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;
use std::time::Duration;

/// Operations served by the text processor.
pub const BUILTIN_OPERATIONS: [&str; 5] = ["summarize", "sentiment", "key_points", "questions", "qa"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub environment: Environment,
    pub redis_url: String,
    /// One of the [`PresetManager`] preset names.
    pub resilience_preset: String,
    /// JSON object overriding preset fields.
    pub resilience_custom_config: Option<String>,
    /// Seconds.
    pub cache_default_ttl: u64,
    pub cache_text_hash_threshold: usize,
    pub cache_memory_size: usize,
    pub cache_compression_threshold: usize,
    pub cache_compression_level: u32,
    pub cache_fail_on_connection_error: bool,
    pub circuit_breaker_failure_threshold: Option<u32>,
    /// Seconds.
    pub circuit_breaker_recovery_timeout: Option<u64>,
    pub retry_max_attempts: Option<u32>,
    /// Per-operation strategy, overriding the preset.
    pub operation_strategies: BTreeMap<String, ResilienceStrategy>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            environment: Environment::Development,
            redis_url: "redis://localhost:6379".to_string(),
            resilience_preset: "simple".to_string(),
            resilience_custom_config: None,
            cache_default_ttl: 3600,
            cache_text_hash_threshold: 1000,
            cache_memory_size: 100,
            cache_compression_threshold: 1000,
            cache_compression_level: 6,
            cache_fail_on_connection_error: false,
            circuit_breaker_failure_threshold: None,
            circuit_breaker_recovery_timeout: None,
            retry_max_attempts: None,
            operation_strategies: BTreeMap::new(),
        }
    }
}

fn lookup_var<L>(lookup: &L, name: &str) -> Option<String>
where
    L: Fn(&str) -> Option<String>,
{
    lookup(name).filter(|v| !v.trim().is_empty())
}

fn parse_var<T, L>(lookup: &L, name: &str) -> Result<Option<T>>
where
    T: FromStr,
    L: Fn(&str) -> Option<String>,
{
    match lookup_var(lookup, name) {
        None => Ok(None),
        Some(raw) => raw.trim().parse().map(Some).map_err(|_| {
            Error::validation_with_context(
                format!("invalid value '{}' for {}", raw, name),
                ErrorContext::new().with_source("settings"),
            )
        }),
    }
}

impl Settings {
    /// Read settings from the process environment.
    ///
    /// Per-operation strategies come from `<OPERATION>_RESILIENCE_STRATEGY`
    /// for each built-in operation.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Read settings through `lookup`, which maps a variable name to its value.
    pub fn from_lookup<L>(lookup: L) -> Result<Self>
    where
        L: Fn(&str) -> Option<String>,
    {
        let mut s = Settings::default();
        if let Some(env) = lookup_var(&lookup, "ENVIRONMENT") {
            s.environment = env.parse()?;
        }
        if let Some(v) = lookup_var(&lookup, "REDIS_URL") {
            s.redis_url = v;
        }
        if let Some(v) = lookup_var(&lookup, "RESILIENCE_PRESET") {
            s.resilience_preset = v.trim().to_ascii_lowercase();
        }
        s.resilience_custom_config = lookup_var(&lookup, "RESILIENCE_CUSTOM_CONFIG");
        if let Some(v) = parse_var(&lookup, "CACHE_DEFAULT_TTL")? {
            s.cache_default_ttl = v;
        }
        if let Some(v) = parse_var(&lookup, "CACHE_TEXT_HASH_THRESHOLD")? {
            s.cache_text_hash_threshold = v;
        }
        if let Some(v) = parse_var(&lookup, "CACHE_MEMORY_SIZE")? {
            s.cache_memory_size = v;
        }
        if let Some(v) = parse_var(&lookup, "CACHE_COMPRESSION_THRESHOLD")? {
            s.cache_compression_threshold = v;
        }
        if let Some(v) = parse_var(&lookup, "CACHE_COMPRESSION_LEVEL")? {
            s.cache_compression_level = v;
        }
        if let Some(v) = parse_var(&lookup, "CACHE_FAIL_ON_CONNECTION_ERROR")? {
            s.cache_fail_on_connection_error = v;
        }
        s.circuit_breaker_failure_threshold = parse_var(&lookup, "CIRCUIT_BREAKER_FAILURE_THRESHOLD")?;
        s.circuit_breaker_recovery_timeout = parse_var(&lookup, "CIRCUIT_BREAKER_RECOVERY_TIMEOUT")?;
        s.retry_max_attempts = parse_var(&lookup, "RETRY_MAX_ATTEMPTS")?;
        for op in BUILTIN_OPERATIONS {
            let var = format!("{}_RESILIENCE_STRATEGY", op.to_ascii_uppercase());
            if let Some(strategy) = parse_var::<ResilienceStrategy, _>(&lookup, &var)? {
                s.operation_strategies.insert(op.to_string(), strategy);
            }
        }
        s.validate()?;
        Ok(s)
    }

    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let s: Settings = serde_yaml::from_str(yaml).map_err(|e| {
            Error::validation_with_context(
                format!("invalid settings yaml: {}", e),
                ErrorContext::new().with_source("settings"),
            )
        })?;
        s.validate()?;
        Ok(s)
    }

    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: String| {
            Err(Error::validation_with_context(
                msg,
                ErrorContext::new().with_source("settings"),
            ))
        };
        if self.cache_memory_size == 0 {
            return invalid("cache_memory_size must be at least 1".into());
        }
        if !(1..=9).contains(&self.cache_compression_level) {
            return invalid(format!(
                "cache_compression_level must be 1-9, got {}",
                self.cache_compression_level
            ));
        }
        if self.circuit_breaker_failure_threshold == Some(0) {
            return invalid("circuit_breaker_failure_threshold must be at least 1".into());
        }
        if self.retry_max_attempts == Some(0) {
            return invalid("retry_max_attempts must be at least 1".into());
        }
        self.resilience_preset().map(|_| ())
    }

    /// The configured preset with the custom JSON override applied.
    pub fn resilience_preset(&self) -> Result<ResiliencePreset> {
        let preset = PresetManager::new().get(&self.resilience_preset)?;
        match self.resilience_custom_config {
            Some(ref json) => preset.with_custom_config(json),
            None => Ok(preset),
        }
    }

    /// Built-in operations plus any operation named in `operation_strategies`.
    pub fn operation_names(&self) -> Vec<String> {
        let mut names: Vec<String> = BUILTIN_OPERATIONS.iter().map(|s| s.to_string()).collect();
        for op in self.operation_strategies.keys() {
            if !names.contains(op) {
                names.push(op.clone());
            }
        }
        names
    }

    pub fn strategy_for(&self, preset: &ResiliencePreset, operation: &str) -> ResilienceStrategy {
        self.operation_strategies
            .get(operation)
            .copied()
            .unwrap_or_else(|| preset.strategy_for(operation))
    }

    /// Resolve `operation` against `preset`; explicit breaker/retry settings win.
    pub fn resilience_config_for(&self, preset: &ResiliencePreset, operation: &str) -> ResilienceConfig {
        let mut cfg = preset.resilience_config(self.strategy_for(preset, operation));
        if let Some(v) = self.circuit_breaker_failure_threshold {
            cfg.circuit_breaker.failure_threshold = v;
        }
        if let Some(v) = self.circuit_breaker_recovery_timeout {
            cfg.circuit_breaker.recovery_timeout = Duration::from_secs(v);
        }
        if let Some(v) = self.retry_max_attempts {
            cfg.retry.max_attempts = v;
        }
        cfg
    }

    /// L2 settings; connection security follows `environment`, with the
    /// `REDIS_*` overrides from [`SecurityConfig::with_env_overrides`] on top.
    pub fn generic_cache_config(&self) -> GenericRedisCacheConfig {
        GenericRedisCacheConfig::new()
            .with_security(SecurityConfig::for_environment(self.environment).with_env_overrides())
            .with_redis_url(self.redis_url.clone())
            .with_default_ttl(Duration::from_secs(self.cache_default_ttl))
            .with_l1_cache(true, self.cache_memory_size)
            .with_compression(self.cache_compression_threshold, self.cache_compression_level)
            .with_fail_on_connection_error(self.cache_fail_on_connection_error)
    }

    pub fn ai_cache_config(&self) -> AiResponseCacheConfig {
        AiResponseCacheConfig::default()
            .with_generic(self.generic_cache_config())
            .with_text_hash_threshold(self.cache_text_hash_threshold)
            .with_memory_cache_size(self.cache_memory_size)
    }
}
