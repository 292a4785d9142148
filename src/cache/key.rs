//! Cache key generation.
//!
//! Keys have the stable shape
//! `ai_cache:op:<operation>|txt:<literal|hash:<16hex>>|opts:<8hex>|q:<8hex>`.
//! The `opts` and `q` segments are omitted entirely when absent. External
//! tooling that inspects Redis keys depends on this layout.

use super::monitor::{CachePerformanceMonitor, KeyGenerationMeasurement, KeyGenerationStats};
use serde_json::Value;
use sha2::{Digest, Sha256, Sha512};
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::sync::Arc;
use std::time::Instant;

pub const KEY_PREFIX: &str = "ai_cache:";
pub const DEFAULT_TEXT_HASH_THRESHOLD: usize = 1000;

/// Large texts are fed to the hasher in chunks of this many bytes.
const HASH_CHUNK_SIZE: usize = 8192;

/// Hash algorithm used for long texts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HashAlgorithm {
    #[default]
    Sha256,
    Sha512,
}

impl HashAlgorithm {
    /// Stream `text` through the hasher, followed by its length metadata.
    fn digest_text(&self, text: &str, char_len: usize) -> String {
        match self {
            HashAlgorithm::Sha256 => streamed_hex::<Sha256>(text, char_len),
            HashAlgorithm::Sha512 => streamed_hex::<Sha512>(text, char_len),
        }
    }
}

fn streamed_hex<D: Digest>(text: &str, char_len: usize) -> String {
    let mut hasher = D::new();
    for chunk in text.as_bytes().chunks(HASH_CHUNK_SIZE) {
        hasher.update(chunk);
    }
    hasher.update(format!("len:{}", char_len).as_bytes());
    to_hex(&hasher.finalize())
}

fn to_hex(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        let _ = write!(out, "{:02x}", b);
    }
    out
}

fn short_sha256(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    let mut hex = to_hex(&hasher.finalize());
    hex.truncate(8);
    hex
}

/// Size tier of the input text, reported to the performance monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextTier {
    Small,
    Medium,
    Large,
    XLarge,
}

impl TextTier {
    pub fn for_length(chars: usize) -> Self {
        match chars {
            0..=499 => TextTier::Small,
            500..=4_999 => TextTier::Medium,
            5_000..=49_999 => TextTier::Large,
            _ => TextTier::XLarge,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TextTier::Small => "small",
            TextTier::Medium => "medium",
            TextTier::Large => "large",
            TextTier::XLarge => "xlarge",
        }
    }
}

/// Serialize a JSON value with object keys sorted at every depth.
fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let sorted: BTreeMap<&String, &Value> = map.iter().collect();
            out.push('{');
            for (i, (k, v)) in sorted.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String(k.clone()).to_string());
                out.push(':');
                write_canonical(v, out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, v) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(v, out);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}

pub(crate) fn canonical_json(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

fn options_present(options: Option<&Value>) -> Option<&Value> {
    match options {
        None | Some(Value::Null) => None,
        Some(Value::Object(map)) if map.is_empty() => None,
        Some(Value::Array(items)) if items.is_empty() => None,
        other => other,
    }
}

/// Builds deterministic, size-bounded cache keys for AI operations.
#[derive(Clone)]
pub struct CacheKeyGenerator {
    text_hash_threshold: usize,
    hash_algorithm: HashAlgorithm,
    monitor: Option<Arc<CachePerformanceMonitor>>,
}

impl CacheKeyGenerator {
    pub fn new() -> Self {
        Self {
            text_hash_threshold: DEFAULT_TEXT_HASH_THRESHOLD,
            hash_algorithm: HashAlgorithm::default(),
            monitor: None,
        }
    }

    pub fn with_text_hash_threshold(mut self, threshold: usize) -> Self {
        self.text_hash_threshold = threshold;
        self
    }

    pub fn with_hash_algorithm(mut self, algorithm: HashAlgorithm) -> Self {
        self.hash_algorithm = algorithm;
        self
    }

    pub fn with_monitor(mut self, monitor: Arc<CachePerformanceMonitor>) -> Self {
        self.monitor = Some(monitor);
        self
    }

    pub fn text_hash_threshold(&self) -> usize {
        self.text_hash_threshold
    }

    /// Render the `txt:` segment value for `text`.
    ///
    /// Returns the identifier and the text length in chars.
    fn text_identifier(&self, text: &str) -> (String, usize) {
        // Byte length bounds char length from above, so short inputs skip the count.
        let char_len = if text.len() <= self.text_hash_threshold {
            text.chars().count()
        } else {
            let n = text.chars().count();
            if n > self.text_hash_threshold {
                let mut digest = self.hash_algorithm.digest_text(text, n);
                digest.truncate(16);
                return (format!("hash:{}", digest), n);
            }
            n
        };
        (text.replace(['|', ':'], "_"), char_len)
    }

    /// Generate the cache key for an AI operation.
    pub fn generate_cache_key(
        &self,
        text: &str,
        operation: &str,
        options: Option<&Value>,
        question: Option<&str>,
    ) -> String {
        let start = Instant::now();
        let (text_id, text_len) = self.text_identifier(text);
        let options = options_present(options);

        let mut key = String::with_capacity(KEY_PREFIX.len() + operation.len() + text_id.len() + 32);
        key.push_str(KEY_PREFIX);
        key.push_str("op:");
        key.push_str(operation);
        key.push_str("|txt:");
        key.push_str(&text_id);

        if let Some(opts) = options {
            key.push_str("|opts:");
            key.push_str(&short_sha256(&canonical_json(opts)));
        }
        if let Some(q) = question {
            key.push_str("|q:");
            key.push_str(&short_sha256(q));
        }

        if let Some(ref monitor) = self.monitor {
            monitor.record_key_generation(KeyGenerationMeasurement {
                text_length: text_len,
                operation: operation.to_string(),
                duration: start.elapsed(),
                tier: TextTier::for_length(text_len),
                has_options: options.is_some(),
                has_question: question.is_some(),
            });
        }

        key
    }

    /// Key generation statistics, if a monitor is attached.
    pub fn get_key_generation_stats(&self) -> Option<KeyGenerationStats> {
        self.monitor.as_ref().map(|m| m.key_generation_stats())
    }
}

impl Default for CacheKeyGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for CacheKeyGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheKeyGenerator")
            .field("text_hash_threshold", &self.text_hash_threshold)
            .field("hash_algorithm", &self.hash_algorithm)
            .field("monitor", &self.monitor.is_some())
            .finish()
    }
}
