//! Cache event callbacks.

use parking_lot::RwLock;
use serde::Serialize;
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheEvent {
    GetSuccess,
    GetMiss,
    GetError,
    SetSuccess,
    SetError,
    DeleteSuccess,
}

impl CacheEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheEvent::GetSuccess => "get_success",
            CacheEvent::GetMiss => "get_miss",
            CacheEvent::GetError => "get_error",
            CacheEvent::SetSuccess => "set_success",
            CacheEvent::SetError => "set_error",
            CacheEvent::DeleteSuccess => "delete_success",
        }
    }
}

/// Which tier served or stored the value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheTier {
    L1,
    L2,
    Both,
    None,
}

#[derive(Debug, Clone, Serialize)]
pub struct CacheEventData {
    pub event: CacheEvent,
    pub key: String,
    pub tier: CacheTier,
    pub duration: Duration,
    /// Encoded size in bytes, for writes.
    pub size: Option<usize>,
    pub compressed: Option<bool>,
    pub error: Option<String>,
}

impl CacheEventData {
    pub fn new(event: CacheEvent, key: &str, tier: CacheTier, duration: Duration) -> Self {
        Self {
            event,
            key: key.to_string(),
            tier,
            duration,
            size: None,
            compressed: None,
            error: None,
        }
    }
}

pub type CacheCallback = Arc<dyn Fn(&CacheEventData) + Send + Sync>;

/// Event name → ordered handlers. Each handler runs in isolation: a panicking
/// callback is logged and does not affect the others or the cache operation.
#[derive(Default)]
pub struct CallbackRegistry {
    callbacks: RwLock<HashMap<CacheEvent, Vec<CacheCallback>>>,
}

impl CallbackRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(&self, event: CacheEvent, callback: F)
    where
        F: Fn(&CacheEventData) + Send + Sync + 'static,
    {
        self.callbacks
            .write()
            .entry(event)
            .or_default()
            .push(Arc::new(callback));
    }

    pub fn count(&self, event: CacheEvent) -> usize {
        self.callbacks.read().get(&event).map(|v| v.len()).unwrap_or(0)
    }

    pub fn clear(&self) {
        self.callbacks.write().clear();
    }

    pub fn fire(&self, data: &CacheEventData) {
        let handlers: Vec<CacheCallback> = self
            .callbacks
            .read()
            .get(&data.event)
            .cloned()
            .unwrap_or_default();
        for (index, handler) in handlers.iter().enumerate() {
            if catch_unwind(AssertUnwindSafe(|| handler(data))).is_err() {
                tracing::error!(
                    event = data.event.as_str(),
                    handler = index,
                    key = %data.key,
                    "cache callback panicked"
                );
            }
        }
    }
}
