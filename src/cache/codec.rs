//! Value encoding for the L2 tier.
//!
//! Stored layout: one header byte followed by the payload.
//! - `0x00`: raw JSON
//! - `0x01`: zlib-compressed JSON

use crate::{Error, ErrorContext, Result};
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use serde_json::Value;
use std::io::{Read, Write};

const HEADER_RAW: u8 = 0x00;
const HEADER_ZLIB: u8 = 0x01;

pub const DEFAULT_COMPRESSION_THRESHOLD: usize = 1000;
pub const DEFAULT_COMPRESSION_LEVEL: u32 = 6;

#[derive(Debug, Clone, Copy)]
pub struct ValueCodec {
    /// JSON payloads larger than this many bytes are compressed.
    pub compression_threshold: usize,
    /// zlib level, clamped to 1..=9.
    pub compression_level: u32,
}

#[derive(Debug)]
pub struct Encoded {
    pub bytes: Vec<u8>,
    pub compressed: bool,
    /// Size of the JSON payload before compression.
    pub original_size: usize,
}

impl ValueCodec {
    pub fn new(compression_threshold: usize, compression_level: u32) -> Self {
        Self {
            compression_threshold,
            compression_level: compression_level.clamp(1, 9),
        }
    }

    pub fn encode(&self, value: &Value) -> Result<Encoded> {
        let json = serde_json::to_vec(value)?;
        let original_size = json.len();
        if original_size <= self.compression_threshold {
            let mut bytes = Vec::with_capacity(original_size + 1);
            bytes.push(HEADER_RAW);
            bytes.extend_from_slice(&json);
            return Ok(Encoded {
                bytes,
                compressed: false,
                original_size,
            });
        }

        let mut encoder = ZlibEncoder::new(vec![HEADER_ZLIB], Compression::new(self.compression_level));
        encoder.write_all(&json)?;
        let bytes = encoder.finish()?;
        tracing::debug!(
            original_size,
            compressed_size = bytes.len(),
            "compressed cache value"
        );
        Ok(Encoded {
            bytes,
            compressed: true,
            original_size,
        })
    }

    pub fn decode(&self, data: &[u8]) -> Result<Value> {
        let Some((&header, payload)) = data.split_first() else {
            return Err(corrupt("empty cache payload"));
        };
        match header {
            HEADER_RAW => Ok(serde_json::from_slice(payload)?),
            HEADER_ZLIB => {
                let mut json = Vec::new();
                ZlibDecoder::new(payload).read_to_end(&mut json)?;
                Ok(serde_json::from_slice(&json)?)
            }
            unknown => Err(corrupt(format!("unknown cache payload header 0x{:02x}", unknown))),
        }
    }
}

impl Default for ValueCodec {
    fn default() -> Self {
        Self::new(DEFAULT_COMPRESSION_THRESHOLD, DEFAULT_COMPRESSION_LEVEL)
    }
}

fn corrupt(msg: impl Into<String>) -> Error {
    Error::validation_with_context(msg, ErrorContext::new().with_source("value_codec"))
}
