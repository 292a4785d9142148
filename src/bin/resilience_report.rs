//! Print the resolved resilience configuration, cache health and Redis
//! security report for the current environment.
//!
//! Usage: `resilience-report [--config settings.yaml] [--json]`

use ai_resilience_cache::cache::CacheFactory;
use ai_resilience_cache::resilience::{AiServiceResilience, PresetManager};
use ai_resilience_cache::Settings;
use anyhow::Context;
use serde_json::json;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let mut args = std::env::args().skip(1);
    let mut config_path = None;
    let mut as_json = false;
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" => config_path = args.next(),
            "--json" => as_json = true,
            other => anyhow::bail!("unknown argument: {}", other),
        }
    }

    let settings = match config_path {
        Some(path) => {
            let raw = std::fs::read_to_string(&path)
                .with_context(|| format!("reading settings from {}", path))?;
            Settings::from_yaml_str(&raw)?
        }
        None => Settings::from_env()?,
    };

    let resilience = AiServiceResilience::from_settings(&settings)?;
    let cache = CacheFactory::from_settings(&settings).await?;
    let recommended = PresetManager::new().recommend_preset(settings.environment);

    let operations: serde_json::Map<String, serde_json::Value> = resilience
        .operations()
        .into_iter()
        .filter_map(|op| {
            let cfg = resilience.operation_config(&op)?;
            Some((
                op,
                json!({
                    "strategy": cfg.strategy,
                    "max_attempts": cfg.retry.max_attempts,
                    "failure_threshold": cfg.circuit_breaker.failure_threshold,
                    "recovery_timeout_secs": cfg.circuit_breaker.recovery_timeout.as_secs(),
                    "operation_timeout_secs": cfg.operation_timeout.map(|t| t.as_secs()),
                }),
            ))
        })
        .collect();

    let security_test = cache.generic().test_security_configuration().await;

    if as_json {
        let report = json!({
            "environment": settings.environment,
            "preset": settings.resilience_preset,
            "recommended_preset": recommended,
            "operations": operations,
            "health": resilience.get_health_status(),
            "cache": cache.get_cache_stats(),
            "security": cache.generic().get_security_status(),
            "security_validation": cache.generic().validate_security(),
            "security_test": security_test,
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("Environment: {}", settings.environment);
    println!(
        "Resilience preset: {} (recommended: {})",
        settings.resilience_preset, recommended
    );
    println!("\n=== Operations ===");
    for (name, cfg) in &operations {
        println!("  {:<12} {}", name, cfg);
    }
    println!(
        "\nResilience healthy: {}",
        if resilience.is_healthy() { "yes" } else { "no" }
    );
    println!(
        "Cache backend: {} (connected: {})\n",
        cache.generic().backend_name(),
        cache.generic().is_connected()
    );
    print!("{}", cache.generic().generate_security_report());
    if !security_test.errors.is_empty() {
        println!("\nSecurity test errors:");
        for e in &security_test.errors {
            println!("  - {}", e);
        }
    }
    Ok(())
}
