//! Redis connection security.
//!
//! A [`SecurityConfig`] is always present on a cache: when none is supplied
//! one is derived from the detected [`Environment`]. Authentication and TLS
//! are provisioned by default; development and testing relax certificate
//! verification only. There is no "unsecured" configuration, so the reported
//! [`SecurityLevel`] is either `Medium` or `High`.

use crate::{Error, ErrorContext, Result};
use rand::distr::Alphanumeric;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

const GENERATED_PASSWORD_LEN: usize = 32;
const MIN_PASSWORD_LEN: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Development,
    Testing,
    Staging,
    Production,
}

impl Environment {
    /// Read `ENVIRONMENT`; unknown or missing values mean development.
    pub fn detect() -> Self {
        std::env::var("ENVIRONMENT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or_default()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Development => "development",
            Environment::Testing => "testing",
            Environment::Staging => "staging",
            Environment::Production => "production",
        }
    }

    pub fn is_production_like(&self) -> bool {
        matches!(self, Environment::Staging | Environment::Production)
    }
}

impl FromStr for Environment {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "development" | "dev" | "local" => Ok(Environment::Development),
            "testing" | "test" => Ok(Environment::Testing),
            "staging" | "stage" => Ok(Environment::Staging),
            "production" | "prod" => Ok(Environment::Production),
            other => Err(Error::validation_with_context(
                format!("unknown environment '{}'", other),
                ErrorContext::new().with_source("environment"),
            )),
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SecurityLevel {
    Medium,
    High,
}

impl SecurityLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            SecurityLevel::Medium => "MEDIUM",
            SecurityLevel::High => "HIGH",
        }
    }
}

/// TLS and AUTH/ACL settings for the Redis connection.
#[derive(Clone)]
pub struct SecurityConfig {
    pub environment: Environment,
    pub use_tls: bool,
    pub verify_certificates: bool,
    pub tls_ca_path: Option<PathBuf>,
    pub tls_cert_path: Option<PathBuf>,
    pub tls_key_path: Option<PathBuf>,
    /// ACL username; `None` authenticates as the default user.
    pub username: Option<String>,
    pub password: String,
    pub password_generated: bool,
    pub connection_timeout: Duration,
}

impl fmt::Debug for SecurityConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecurityConfig")
            .field("environment", &self.environment)
            .field("use_tls", &self.use_tls)
            .field("verify_certificates", &self.verify_certificates)
            .field("tls_ca_path", &self.tls_ca_path)
            .field("tls_cert_path", &self.tls_cert_path)
            .field("tls_key_path", &self.tls_key_path)
            .field("username", &self.username)
            .field("password", &"***")
            .field("password_generated", &self.password_generated)
            .field("connection_timeout", &self.connection_timeout)
            .finish()
    }
}

fn generate_password() -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(GENERATED_PASSWORD_LEN)
        .map(char::from)
        .collect()
}

impl SecurityConfig {
    /// Secure defaults for `env` with a freshly generated password.
    pub fn for_environment(env: Environment) -> Self {
        let strict = env.is_production_like();
        Self {
            environment: env,
            use_tls: true,
            verify_certificates: strict,
            tls_ca_path: None,
            tls_cert_path: None,
            tls_key_path: None,
            username: None,
            password: generate_password(),
            password_generated: true,
            connection_timeout: if strict {
                Duration::from_secs(10)
            } else {
                Duration::from_secs(5)
            },
        }
    }

    pub fn for_testing() -> Self {
        Self::for_environment(Environment::Testing)
    }

    /// Derive from the process environment: `ENVIRONMENT` picks the defaults,
    /// then [`SecurityConfig::with_env_overrides`] applies.
    pub fn from_env() -> Self {
        Self::for_environment(Environment::detect()).with_env_overrides()
    }

    /// Apply `REDIS_PASSWORD`, `REDIS_USERNAME`, `REDIS_TLS_CA_PATH`,
    /// `REDIS_TLS_CERT_PATH`, `REDIS_TLS_KEY_PATH` and
    /// `REDIS_VERIFY_CERTIFICATES` from the process environment.
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides_from(|name| std::env::var(name).ok())
    }

    /// Same as [`SecurityConfig::with_env_overrides`], reading through `lookup`.
    pub fn with_overrides_from<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|v| !v.is_empty());
        if let Some(password) = var("REDIS_PASSWORD") {
            self.password = password;
            self.password_generated = false;
        }
        if let Some(username) = var("REDIS_USERNAME") {
            self.username = Some(username);
        }
        if let Some(path) = var("REDIS_TLS_CA_PATH") {
            self.tls_ca_path = Some(PathBuf::from(path));
        }
        if let Some(path) = var("REDIS_TLS_CERT_PATH") {
            self.tls_cert_path = Some(PathBuf::from(path));
        }
        if let Some(path) = var("REDIS_TLS_KEY_PATH") {
            self.tls_key_path = Some(PathBuf::from(path));
        }
        if let Some(verify) = var("REDIS_VERIFY_CERTIFICATES").and_then(|v| v.parse::<bool>().ok()) {
            self.verify_certificates = verify;
        }
        if self.password_generated {
            tracing::warn!(
                environment = %self.environment,
                "REDIS_PASSWORD not set; generated a random AUTH password, configure the server to match"
            );
        }
        self
    }

    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = password.into();
        self.password_generated = false;
        self
    }

    /// Adopt credentials embedded in `raw` unless they were configured
    /// explicitly. Unparseable URLs leave the config untouched.
    pub fn with_url_credentials(mut self, raw: &str) -> Self {
        let Ok(url) = url::Url::parse(raw) else {
            return self;
        };
        if self.password_generated {
            if let Some(password) = url.password().filter(|p| !p.is_empty()) {
                self.password = password.to_string();
                self.password_generated = false;
            }
        }
        if self.username.is_none() && !url.username().is_empty() {
            self.username = Some(url.username().to_string());
        }
        self
    }

    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    pub fn with_tls(mut self, use_tls: bool, verify_certificates: bool) -> Self {
        self.use_tls = use_tls;
        self.verify_certificates = verify_certificates;
        self
    }

    pub fn with_ca_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.tls_ca_path = Some(path.into());
        self
    }

    pub fn with_client_certificate(
        mut self,
        cert: impl Into<PathBuf>,
        key: impl Into<PathBuf>,
    ) -> Self {
        self.tls_cert_path = Some(cert.into());
        self.tls_key_path = Some(key.into());
        self
    }

    pub fn security_level(&self) -> SecurityLevel {
        if self.use_tls && self.verify_certificates && self.password.len() >= MIN_PASSWORD_LEN {
            SecurityLevel::High
        } else {
            SecurityLevel::Medium
        }
    }

    /// Rewrite `raw` with the TLS scheme and credentials this config requires.
    ///
    /// Credentials already in `raw` win over a generated password and an
    /// unset username; explicitly configured ones replace them.
    pub fn apply_to_url(&self, raw: &str) -> Result<String> {
        let ctx = || ErrorContext::new().with_source("security_config");
        let mut url = url::Url::parse(raw).map_err(|e| {
            Error::validation_with_context(format!("invalid redis url: {}", e), ctx())
        })?;
        match url.scheme() {
            "redis" | "rediss" => {}
            other => {
                return Err(Error::validation_with_context(
                    format!("unsupported redis url scheme '{}'", other),
                    ctx(),
                ))
            }
        }
        let scheme = if self.use_tls { "rediss" } else { "redis" };
        url.set_scheme(scheme)
            .map_err(|_| Error::validation_with_context("cannot set redis url scheme", ctx()))?;
        if let Some(ref user) = self.username {
            url.set_username(user)
                .map_err(|_| Error::validation_with_context("cannot set redis username", ctx()))?;
        }
        let url_has_password = url.password().is_some_and(|p| !p.is_empty());
        if !(self.password_generated && url_has_password) {
            url.set_password(Some(&self.password))
                .map_err(|_| Error::validation_with_context("cannot set redis password", ctx()))?;
        }
        if self.use_tls && !self.verify_certificates {
            url.set_fragment(Some("insecure"));
        } else {
            url.set_fragment(None);
        }
        Ok(url.to_string())
    }

    /// Load certificate material when TLS uses custom roots or client auth.
    pub fn tls_certificates(&self) -> Result<Option<redis::TlsCertificates>> {
        if !self.use_tls {
            return Ok(None);
        }
        let root_cert = match self.tls_ca_path {
            Some(ref path) => Some(std::fs::read(path)?),
            None => None,
        };
        let client_tls = match (&self.tls_cert_path, &self.tls_key_path) {
            (Some(cert), Some(key)) => Some(redis::ClientTlsConfig {
                client_cert: std::fs::read(cert)?,
                client_key: std::fs::read(key)?,
            }),
            _ => None,
        };
        if root_cert.is_none() && client_tls.is_none() {
            return Ok(None);
        }
        Ok(Some(redis::TlsCertificates {
            client_tls,
            root_cert,
        }))
    }

    pub fn validate(&self) -> SecurityValidation {
        let mut vulnerabilities = Vec::new();
        let mut warnings = Vec::new();

        if !self.use_tls {
            if self.environment.is_production_like() {
                vulnerabilities.push("TLS is disabled in a production-like environment".to_string());
            } else {
                warnings.push("TLS is disabled".to_string());
            }
        }
        if self.use_tls && !self.verify_certificates {
            if self.environment.is_production_like() {
                vulnerabilities
                    .push("certificate verification is disabled in a production-like environment".to_string());
            } else {
                warnings.push(format!(
                    "certificate verification relaxed for {} environment",
                    self.environment
                ));
            }
        }
        if self.password.len() < MIN_PASSWORD_LEN {
            warnings.push(format!(
                "AUTH password is shorter than {} characters",
                MIN_PASSWORD_LEN
            ));
        }
        if self.password_generated && self.environment.is_production_like() {
            warnings.push("AUTH password was generated at startup; set REDIS_PASSWORD".to_string());
        }
        if self.tls_cert_path.is_some() != self.tls_key_path.is_some() {
            vulnerabilities.push("client certificate and key must be configured together".to_string());
        }
        for path in [&self.tls_ca_path, &self.tls_cert_path, &self.tls_key_path]
            .into_iter()
            .flatten()
        {
            if !path.exists() {
                vulnerabilities.push(format!("certificate file not found: {}", path.display()));
            }
        }

        SecurityValidation {
            is_valid: vulnerabilities.is_empty(),
            security_level: self.security_level(),
            vulnerabilities,
            warnings,
            recommendations: self.recommendations(),
        }
    }

    pub fn recommendations(&self) -> Vec<String> {
        let mut recs = Vec::new();
        if !self.use_tls {
            recs.push("Enable TLS (rediss://) for all Redis connections".to_string());
        }
        if self.use_tls && !self.verify_certificates {
            recs.push("Enable certificate verification before deploying to production".to_string());
        }
        if self.use_tls && self.tls_ca_path.is_none() && self.environment.is_production_like() {
            recs.push("Pin a CA certificate with REDIS_TLS_CA_PATH".to_string());
        }
        if self.username.is_none() {
            recs.push("Use a dedicated Redis ACL user instead of the default user".to_string());
        }
        if self.password_generated {
            recs.push("Provide REDIS_PASSWORD explicitly so all replicas share credentials".to_string());
        }
        if self.password.len() < MIN_PASSWORD_LEN {
            recs.push(format!("Use an AUTH password of at least {} characters", MIN_PASSWORD_LEN));
        }
        recs
    }
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self::for_environment(Environment::detect())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SecurityValidation {
    pub is_valid: bool,
    pub security_level: SecurityLevel,
    pub vulnerabilities: Vec<String>,
    pub warnings: Vec<String>,
    pub recommendations: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SecurityStatus {
    pub security_level: SecurityLevel,
    pub environment: Environment,
    pub backend: String,
    pub connected: bool,
    pub tls_enabled: bool,
    pub certificate_verification: bool,
    pub authentication_enabled: bool,
    pub acl_username: Option<String>,
    pub custom_ca: bool,
    pub client_certificate: bool,
}

impl SecurityStatus {
    pub fn from_config(cfg: &SecurityConfig, backend: &str, connected: bool) -> Self {
        Self {
            security_level: cfg.security_level(),
            environment: cfg.environment,
            backend: backend.to_string(),
            connected,
            tls_enabled: cfg.use_tls,
            certificate_verification: cfg.verify_certificates,
            authentication_enabled: !cfg.password.is_empty(),
            acl_username: cfg.username.clone(),
            custom_ca: cfg.tls_ca_path.is_some(),
            client_certificate: cfg.tls_cert_path.is_some() && cfg.tls_key_path.is_some(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SecurityTestResult {
    pub overall_secure: bool,
    pub connection_ok: bool,
    pub tls_configured: bool,
    pub auth_configured: bool,
    pub errors: Vec<String>,
    pub duration_ms: u64,
}

/// Render a human-readable report.
pub fn render_security_report(status: &SecurityStatus, validation: &SecurityValidation) -> String {
    let mut out = String::new();
    out.push_str("Redis Security Report\n");
    out.push_str("=====================\n");
    out.push_str(&format!("Security level:           {}\n", status.security_level.as_str()));
    out.push_str(&format!("Environment:              {}\n", status.environment));
    out.push_str(&format!("Backend:                  {}\n", status.backend));
    out.push_str(&format!("Connected:                {}\n", status.connected));
    out.push_str(&format!("TLS:                      {}\n", status.tls_enabled));
    out.push_str(&format!("Certificate verification: {}\n", status.certificate_verification));
    out.push_str(&format!("Authentication:           {}\n", status.authentication_enabled));
    out.push_str(&format!(
        "ACL user:                 {}\n",
        status.acl_username.as_deref().unwrap_or("default")
    ));
    out.push_str(&format!(
        "Configuration valid:      {}\n",
        if validation.is_valid { "yes" } else { "no" }
    ));

    let sections = [
        ("Vulnerabilities", &validation.vulnerabilities),
        ("Warnings", &validation.warnings),
        ("Recommendations", &validation.recommendations),
    ];
    for (title, items) in sections {
        if items.is_empty() {
            continue;
        }
        out.push_str(&format!("\n{}:\n", title));
        for item in items {
            out.push_str(&format!("  - {}\n", item));
        }
    }
    out
}
