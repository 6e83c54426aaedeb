//! LLM integration
//!
//! Provides traits and implementations for:
//! - Chat completion against external services (vLLM, OpenAI, etc.)
//! - Embedding generation over the same HTTP stack
//! - Structured JSON output parsing
//! - Response caching and retry-with-backoff

mod cache;
mod client;
mod http_embedder;
mod retry;
mod structured;
mod traits;

pub use cache::{CacheStats, LLMCache};
pub use client::{APIMetrics, ChatMessage, LLMClient, MetricsSnapshot, VLLMClient};
pub use http_embedder::HttpEmbedder;
pub use retry::{compute_backoff, is_retryable, with_retry};
pub use structured::{extract_json, parse_structured, structured_completion};
pub use traits::Embedder;
