//! In-memory LRU cache with per-entry TTL.
//!
//! Used as the L1 tier in front of the Redis cache. With `V = Vec<u8>` it
//! also implements [`CacheBackend`], so an in-process store can stand in for
//! Redis when no server is reachable.

use super::backend::CacheBackend;
use crate::Result;
use async_trait::async_trait;
use lru::LruCache;
use parking_lot::Mutex;
use serde::Serialize;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;

pub const DEFAULT_L1_SIZE: usize = 100;

#[derive(Clone)]
struct CacheEntry<V> {
    value: V,
    expires_at: Option<Instant>,
}

impl<V> CacheEntry<V> {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.map(|t| now >= t).unwrap_or(false)
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct MemoryCacheStats {
    pub entries: usize,
    pub max_size: usize,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub expirations: u64,
}

impl MemoryCacheStats {
    pub fn hit_ratio(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

#[derive(Default)]
struct AtomicStats {
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
    expirations: AtomicU64,
}

/// Bounded LRU cache. `get` refreshes recency; expired entries behave as
/// misses and are removed on access.
pub struct InMemoryCache<V> {
    entries: Mutex<LruCache<String, CacheEntry<V>>>,
    max_size: usize,
    default_ttl: Option<Duration>,
    stats: AtomicStats,
}

impl<V: Clone + Send + Sync + 'static> InMemoryCache<V> {
    pub fn new(max_size: usize) -> Self {
        let cap = NonZeroUsize::new(max_size.max(1)).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(cap)),
            max_size: cap.get(),
            default_ttl: None,
            stats: AtomicStats::default(),
        }
    }

    pub fn with_default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = Some(ttl);
        self
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    pub fn default_ttl(&self) -> Option<Duration> {
        self.default_ttl
    }

    pub async fn get(&self, key: &str) -> Option<V> {
        let now = Instant::now();
        let mut entries = self.entries.lock();
        let expired = match entries.get(key) {
            Some(entry) if !entry.is_expired(now) => {
                self.stats.hits.fetch_add(1, Ordering::Relaxed);
                return Some(entry.value.clone());
            }
            Some(_) => true,
            None => false,
        };
        if expired {
            entries.pop(key);
            self.stats.expirations.fetch_add(1, Ordering::Relaxed);
        }
        self.stats.misses.fetch_add(1, Ordering::Relaxed);
        None
    }

    /// Insert `value`; `ttl` overrides the default TTL for this entry.
    pub async fn set(&self, key: &str, value: V, ttl: Option<Duration>) {
        let expires_at = ttl.or(self.default_ttl).map(|t| Instant::now() + t);
        let mut entries = self.entries.lock();
        if let Some((evicted, _)) = entries.push(key.to_string(), CacheEntry { value, expires_at }) {
            if evicted != key {
                self.stats.evictions.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(key = %evicted, "l1 cache evicted least-recently-used entry");
            }
        }
    }

    pub async fn delete(&self, key: &str) -> bool {
        self.entries.lock().pop(key).is_some()
    }

    /// Existence check that does not refresh recency.
    pub async fn exists(&self, key: &str) -> bool {
        let now = Instant::now();
        let mut entries = self.entries.lock();
        match entries.peek(key) {
            Some(entry) if entry.is_expired(now) => {
                entries.pop(key);
                self.stats.expirations.fetch_add(1, Ordering::Relaxed);
                false
            }
            Some(_) => true,
            None => false,
        }
    }

    /// Remaining TTL of a live entry, without refreshing recency.
    pub fn remaining_ttl(&self, key: &str) -> Option<Duration> {
        let now = Instant::now();
        let entries = self.entries.lock();
        let entry = entries.peek(key)?;
        match entry.expires_at {
            Some(t) if t > now => Some(t - now),
            _ => None,
        }
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    /// Number of live (non-expired) entries.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.entries
            .lock()
            .iter()
            .filter(|(_, e)| !e.is_expired(now))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Keys from most to least recently used, expired entries excluded.
    pub fn keys(&self) -> Vec<String> {
        let now = Instant::now();
        self.entries
            .lock()
            .iter()
            .filter(|(_, e)| !e.is_expired(now))
            .map(|(k, _)| k.clone())
            .collect()
    }

    /// Remove every expired entry. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.lock();
        let expired: Vec<String> = entries
            .iter()
            .filter(|(_, e)| e.is_expired(now))
            .map(|(k, _)| k.clone())
            .collect();
        for k in &expired {
            entries.pop(k);
        }
        self.stats
            .expirations
            .fetch_add(expired.len() as u64, Ordering::Relaxed);
        expired.len()
    }

    /// Remove every key matching a glob pattern (`*` and `?`).
    pub fn remove_matching(&self, pattern: &str) -> usize {
        let mut entries = self.entries.lock();
        let matched: Vec<String> = entries
            .iter()
            .filter(|(k, _)| glob_match(pattern, k))
            .map(|(k, _)| k.clone())
            .collect();
        for k in &matched {
            entries.pop(k);
        }
        matched.len()
    }

    /// Periodically purge expired entries until the cache is dropped.
    pub fn spawn_sweeper(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let weak = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(cache) = weak.upgrade() else { break };
                let purged = cache.purge_expired();
                if purged > 0 {
                    tracing::debug!(purged, "l1 cache sweep removed expired entries");
                }
            }
        })
    }

    pub fn stats(&self) -> MemoryCacheStats {
        MemoryCacheStats {
            entries: self.len(),
            max_size: self.max_size,
            hits: self.stats.hits.load(Ordering::Relaxed),
            misses: self.stats.misses.load(Ordering::Relaxed),
            evictions: self.stats.evictions.load(Ordering::Relaxed),
            expirations: self.stats.expirations.load(Ordering::Relaxed),
        }
    }
}

/// Minimal glob matcher supporting `*` (any run) and `?` (any single char),
/// matching the subset of Redis `MATCH` syntax used by the cache.
pub(crate) fn glob_match(pattern: &str, text: &str) -> bool {
    let p: Vec<char> = pattern.chars().collect();
    let t: Vec<char> = text.chars().collect();
    let (mut pi, mut ti) = (0usize, 0usize);
    let mut star: Option<usize> = None;
    let mut mark = 0usize;
    while ti < t.len() {
        if pi < p.len() && (p[pi] == '?' || p[pi] == t[ti]) {
            pi += 1;
            ti += 1;
        } else if pi < p.len() && p[pi] == '*' {
            star = Some(pi);
            mark = ti;
            pi += 1;
        } else if let Some(s) = star {
            pi = s + 1;
            mark += 1;
            ti = mark;
        } else {
            return false;
        }
    }
    while pi < p.len() && p[pi] == '*' {
        pi += 1;
    }
    pi == p.len()
}

#[async_trait]
impl CacheBackend for InMemoryCache<Vec<u8>> {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(InMemoryCache::get(self, key).await)
    }

    async fn set(&self, key: &str, value: &[u8], ttl: Option<Duration>) -> Result<()> {
        InMemoryCache::set(self, key, value.to_vec(), ttl).await;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        Ok(InMemoryCache::delete(self, key).await)
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        Ok(InMemoryCache::exists(self, key).await)
    }

    async fn ttl(&self, key: &str) -> Result<Option<Duration>> {
        Ok(self.remaining_ttl(key))
    }

    async fn keys_matching(&self, pattern: &str) -> Result<Vec<String>> {
        Ok(self
            .keys()
            .into_iter()
            .filter(|k| glob_match(pattern, k))
            .collect())
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}
