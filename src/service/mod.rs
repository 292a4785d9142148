//! Reference consumer of the cache and resilience layers.

mod text_processor;

pub use text_processor::{AiProvider, ProcessingRequest, ProcessingResponse, TextProcessor};
