//! Environment-level resilience presets.
//!
//! A preset picks a default strategy plus per-operation overrides, and pins
//! the retry/breaker numbers of its default strategy. A JSON blob can override
//! any preset field.

use super::strategy::{ResilienceConfig, ResilienceStrategy};
use crate::cache::Environment;
use crate::{Error, ErrorContext, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResiliencePreset {
    pub name: String,
    pub description: String,
    pub retry_attempts: u32,
    pub circuit_breaker_threshold: u32,
    /// Seconds.
    pub recovery_timeout: u64,
    pub default_strategy: ResilienceStrategy,
    pub operation_overrides: HashMap<String, ResilienceStrategy>,
    pub environment_contexts: Vec<Environment>,
}

impl ResiliencePreset {
    pub fn strategy_for(&self, operation: &str) -> ResilienceStrategy {
        self.operation_overrides
            .get(operation)
            .copied()
            .unwrap_or(self.default_strategy)
    }

    /// Resolve the configuration for `operation` with `strategy`.
    ///
    /// The preset's own numbers apply only to its default strategy; other
    /// strategies keep their stock parameters.
    pub fn resilience_config(&self, strategy: ResilienceStrategy) -> ResilienceConfig {
        let mut cfg = ResilienceConfig::for_strategy(strategy);
        if strategy == self.default_strategy {
            cfg.retry.max_attempts = self.retry_attempts;
            cfg.circuit_breaker.failure_threshold = self.circuit_breaker_threshold;
            cfg.circuit_breaker.recovery_timeout = Duration::from_secs(self.recovery_timeout);
        }
        cfg
    }

    /// Apply a JSON override. Unknown fields and out-of-range values are rejected.
    pub fn with_custom_config(mut self, json: &str) -> Result<Self> {
        let custom: CustomResilienceConfig = serde_json::from_str(json).map_err(|e| {
            Error::validation_with_context(
                format!("invalid custom resilience config: {}", e),
                ErrorContext::new().with_source("resilience_preset"),
            )
        })?;
        custom.validate()?;
        if let Some(v) = custom.retry_attempts {
            self.retry_attempts = v;
        }
        if let Some(v) = custom.circuit_breaker_threshold {
            self.circuit_breaker_threshold = v;
        }
        if let Some(v) = custom.recovery_timeout {
            self.recovery_timeout = v;
        }
        if let Some(v) = custom.default_strategy {
            self.default_strategy = v;
        }
        self.operation_overrides.extend(custom.operation_overrides);
        tracing::info!(preset = %self.name, "applied custom resilience config");
        Ok(self)
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct CustomResilienceConfig {
    retry_attempts: Option<u32>,
    circuit_breaker_threshold: Option<u32>,
    recovery_timeout: Option<u64>,
    default_strategy: Option<ResilienceStrategy>,
    #[serde(default)]
    operation_overrides: HashMap<String, ResilienceStrategy>,
}

impl CustomResilienceConfig {
    fn validate(&self) -> Result<()> {
        let check = |field: &str, value: Option<u64>, min: u64, max: u64| -> Result<()> {
            match value {
                Some(v) if v < min || v > max => Err(Error::validation_with_context(
                    format!("{} must be between {} and {}, got {}", field, min, max, v),
                    ErrorContext::new().with_source("resilience_preset"),
                )),
                _ => Ok(()),
            }
        };
        check("retry_attempts", self.retry_attempts.map(u64::from), 1, 10)?;
        check(
            "circuit_breaker_threshold",
            self.circuit_breaker_threshold.map(u64::from),
            1,
            20,
        )?;
        check("recovery_timeout", self.recovery_timeout, 10, 300)?;
        Ok(())
    }
}

/// Registry of the built-in presets.
#[derive(Debug, Clone)]
pub struct PresetManager {
    presets: BTreeMap<String, ResiliencePreset>,
}

impl PresetManager {
    pub fn new() -> Self {
        let presets = [simple(), development(), production()]
            .into_iter()
            .map(|p| (p.name.clone(), p))
            .collect();
        Self { presets }
    }

    pub fn get(&self, name: &str) -> Result<ResiliencePreset> {
        self.presets.get(name).cloned().ok_or_else(|| {
            Error::validation_with_context(
                format!(
                    "unknown resilience preset '{}', expected one of: {}",
                    name,
                    self.list_presets().join(", ")
                ),
                ErrorContext::new().with_source("preset_manager"),
            )
        })
    }

    pub fn list_presets(&self) -> Vec<String> {
        self.presets.keys().cloned().collect()
    }

    pub fn recommend_preset(&self, environment: Environment) -> &'static str {
        match environment {
            Environment::Development | Environment::Testing => "development",
            Environment::Staging | Environment::Production => "production",
        }
    }
}

impl Default for PresetManager {
    fn default() -> Self {
        Self::new()
    }
}

fn simple() -> ResiliencePreset {
    ResiliencePreset {
        name: "simple".into(),
        description: "Balanced defaults for every operation".into(),
        retry_attempts: 3,
        circuit_breaker_threshold: 5,
        recovery_timeout: 60,
        default_strategy: ResilienceStrategy::Balanced,
        operation_overrides: HashMap::new(),
        environment_contexts: vec![
            Environment::Testing,
            Environment::Staging,
            Environment::Production,
        ],
    }
}

fn development() -> ResiliencePreset {
    ResiliencePreset {
        name: "development".into(),
        description: "Fail fast for quick local feedback".into(),
        retry_attempts: 2,
        circuit_breaker_threshold: 3,
        recovery_timeout: 30,
        default_strategy: ResilienceStrategy::Aggressive,
        operation_overrides: HashMap::from([
            ("sentiment".to_string(), ResilienceStrategy::Aggressive),
            ("qa".to_string(), ResilienceStrategy::Balanced),
        ]),
        environment_contexts: vec![Environment::Development, Environment::Testing],
    }
}

fn production() -> ResiliencePreset {
    ResiliencePreset {
        name: "production".into(),
        description: "High reliability for production workloads".into(),
        retry_attempts: 5,
        circuit_breaker_threshold: 10,
        recovery_timeout: 120,
        default_strategy: ResilienceStrategy::Conservative,
        operation_overrides: HashMap::from([
            ("qa".to_string(), ResilienceStrategy::Critical),
            ("sentiment".to_string(), ResilienceStrategy::Aggressive),
            ("summarize".to_string(), ResilienceStrategy::Conservative),
            ("key_points".to_string(), ResilienceStrategy::Balanced),
            ("questions".to_string(), ResilienceStrategy::Balanced),
        ]),
        environment_contexts: vec![Environment::Staging, Environment::Production],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_presets() {
        let mgr = PresetManager::new();
        assert_eq!(mgr.list_presets(), vec!["development", "production", "simple"]);
        let prod = mgr.get("production").unwrap();
        assert_eq!(prod.strategy_for("qa"), ResilienceStrategy::Critical);
        assert_eq!(prod.strategy_for("unlisted"), ResilienceStrategy::Conservative);
        assert!(matches!(mgr.get("chaos"), Err(Error::Validation { .. })));
    }

    #[test]
    fn test_recommendation_per_environment() {
        let mgr = PresetManager::new();
        assert_eq!(mgr.recommend_preset(Environment::Development), "development");
        assert_eq!(mgr.recommend_preset(Environment::Production), "production");
    }

    #[test]
    fn test_preset_numbers_apply_to_default_strategy() {
        let prod = PresetManager::new().get("production").unwrap();
        let cfg = prod.resilience_config(ResilienceStrategy::Conservative);
        assert_eq!(cfg.circuit_breaker.failure_threshold, 10);
        assert_eq!(cfg.retry.max_attempts, 5);

        let critical = prod.resilience_config(ResilienceStrategy::Critical);
        assert_eq!(
            critical,
            ResilienceConfig::for_strategy(ResilienceStrategy::Critical)
        );
    }

    #[test]
    fn test_custom_config_overrides() {
        let preset = PresetManager::new()
            .get("simple")
            .unwrap()
            .with_custom_config(
                r#"{"retry_attempts": 4, "default_strategy": "conservative",
                    "operation_overrides": {"qa": "critical"}}"#,
            )
            .unwrap();
        assert_eq!(preset.retry_attempts, 4);
        assert_eq!(preset.default_strategy, ResilienceStrategy::Conservative);
        assert_eq!(preset.strategy_for("qa"), ResilienceStrategy::Critical);
        assert_eq!(preset.circuit_breaker_threshold, 5);
    }

    #[test]
    fn test_custom_config_rejects_bad_input() {
        let simple = PresetManager::new().get("simple").unwrap();
        for bad in [
            "{not json",
            r#"{"retry_attempts": 0}"#,
            r#"{"recovery_timeout": 9999}"#,
            r#"{"surprise": true}"#,
            r#"{"default_strategy": "reckless"}"#,
        ] {
            let err = simple.clone().with_custom_config(bad).unwrap_err();
            assert!(matches!(err, Error::Validation { .. }), "{}", bad);
        }
    }
}
