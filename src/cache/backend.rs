//! L2 cache backends.

use super::security::SecurityConfig;
use crate::{Error, ErrorContext, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use std::time::Duration;

const SCAN_BATCH: usize = 200;

/// Byte-oriented shared store sitting behind the L1 tier.
#[async_trait]
pub trait CacheBackend: Send + Sync {
    /// Establish the underlying connection. In-process backends are always connected.
    async fn connect(&self) -> Result<()> {
        Ok(())
    }
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;
    async fn set(&self, key: &str, value: &[u8], ttl: Option<Duration>) -> Result<()>;
    async fn delete(&self, key: &str) -> Result<bool>;
    async fn exists(&self, key: &str) -> Result<bool>;
    /// Remaining time-to-live; `None` when the key is missing or never expires.
    async fn ttl(&self, key: &str) -> Result<Option<Duration>>;
    /// Keys matching a Redis-style glob pattern.
    async fn keys_matching(&self, pattern: &str) -> Result<Vec<String>>;
    async fn ping(&self) -> Result<()>;
    async fn disconnect(&self) {}
    fn is_connected(&self) -> bool {
        true
    }
    fn name(&self) -> &'static str;
}

/// Redis-backed store using a multiplexed tokio connection.
pub struct RedisBackend {
    client: redis::Client,
    display_url: String,
    connect_timeout: Duration,
    conn: Mutex<Option<MultiplexedConnection>>,
}

impl RedisBackend {
    /// Create a backend for `url` with `security` applied (TLS scheme, AUTH, certificates).
    pub fn new(url: &str, security: &SecurityConfig) -> Result<Self> {
        let secured = security.apply_to_url(url)?;
        let client = match security.tls_certificates()? {
            Some(certs) => redis::Client::build_with_tls(secured.as_str(), certs)?,
            None => redis::Client::open(secured.as_str())?,
        };
        Ok(Self {
            client,
            display_url: redact_url(url),
            connect_timeout: security.connection_timeout,
            conn: Mutex::new(None),
        })
    }

    pub fn url(&self) -> &str {
        &self.display_url
    }

    fn connection(&self) -> Result<MultiplexedConnection> {
        self.conn.lock().clone().ok_or_else(|| {
            Error::infrastructure_with_context(
                "redis backend is not connected",
                ErrorContext::new()
                    .with_source("redis_backend")
                    .with_details(self.display_url.clone()),
            )
        })
    }
}

#[async_trait]
impl CacheBackend for RedisBackend {
    async fn connect(&self) -> Result<()> {
        if self.conn.lock().is_some() {
            return Ok(());
        }
        let fut = self.client.get_multiplexed_async_connection();
        let conn = tokio::time::timeout(self.connect_timeout, fut)
            .await
            .map_err(|_| {
                Error::infrastructure_with_context(
                    format!(
                        "timed out connecting to redis after {}ms",
                        self.connect_timeout.as_millis()
                    ),
                    ErrorContext::new()
                        .with_source("redis_backend")
                        .with_details(self.display_url.clone()),
                )
            })??;
        let mut ping_conn = conn.clone();
        let _: String = redis::cmd("PING").query_async(&mut ping_conn).await?;
        *self.conn.lock() = Some(conn);
        tracing::info!(url = %self.display_url, "connected to redis");
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let mut conn = self.connection()?;
        let value: Option<Vec<u8>> = conn.get(key).await?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: &[u8], ttl: Option<Duration>) -> Result<()> {
        let mut conn = self.connection()?;
        match ttl {
            Some(ttl) => {
                let ms = (ttl.as_millis() as u64).max(1);
                let _: () = conn.pset_ex(key, value, ms).await?;
            }
            None => {
                let _: () = conn.set(key, value).await?;
            }
        }
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        let mut conn = self.connection()?;
        let removed: usize = conn.del(key).await?;
        Ok(removed > 0)
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        let mut conn = self.connection()?;
        let found: bool = conn.exists(key).await?;
        Ok(found)
    }

    async fn ttl(&self, key: &str) -> Result<Option<Duration>> {
        let mut conn = self.connection()?;
        let ms: i64 = conn.pttl(key).await?;
        Ok((ms > 0).then(|| Duration::from_millis(ms as u64)))
    }

    async fn keys_matching(&self, pattern: &str) -> Result<Vec<String>> {
        let mut conn = self.connection()?;
        let mut cursor: u64 = 0;
        let mut keys = Vec::new();
        loop {
            let (next, batch): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(pattern)
                .arg("COUNT")
                .arg(SCAN_BATCH)
                .query_async(&mut conn)
                .await?;
            keys.extend(batch);
            if next == 0 {
                break;
            }
            cursor = next;
        }
        Ok(keys)
    }

    async fn ping(&self) -> Result<()> {
        let mut conn = self.connection()?;
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(())
    }

    async fn disconnect(&self) {
        if self.conn.lock().take().is_some() {
            tracing::info!(url = %self.display_url, "disconnected from redis");
        }
    }

    fn is_connected(&self) -> bool {
        self.conn.lock().is_some()
    }

    fn name(&self) -> &'static str {
        "redis"
    }
}

/// Strip credentials from a connection URL for logging.
pub(crate) fn redact_url(raw: &str) -> String {
    match url::Url::parse(raw) {
        Ok(mut parsed) => {
            if parsed.password().is_some() {
                let _ = parsed.set_password(Some("***"));
            }
            parsed.to_string()
        }
        Err(_) => "<invalid redis url>".to_string(),
    }
}
