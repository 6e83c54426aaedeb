//! Regrag Core Library
//!
//! Self-correcting retrieval-augmented question answering over a corpus of
//! regulatory documents.
//!
//! # Features
//! - Query analysis with heuristic fallback
//! - Dense, BM25 and hybrid (score-fused) retrieval
//! - Per-passage grading with literal evidence spans
//! - Evidence-grounded generation and self-validation
//! - Web search fallback when the corpus has no answer
//! - SQLite passage store with FTS5 and stored embeddings

pub mod config;
pub mod db;
pub mod error;
pub mod llm;
pub mod pipeline;
pub mod search;
pub mod web;

pub use config::{Config, LLMServiceConfig, PipelineConfig, RetryConfig, WebSearchConfig};
pub use db::{Database, DatabaseStats};
pub use error::{Capability, Error, RagError, Result};
pub use llm::{ChatMessage, Embedder, HttpEmbedder, LLMClient, MetricsSnapshot, VLLMClient};
pub use pipeline::{
    GradedEvidence, Pipeline, Query, QueryRequest, QueryType, Response, ResponseMetadata,
    RetrievalStrategy, RetrievedPassage, StrategyHint, ValidationResult,
};
pub use search::{Bm25Index, DenseIndex, IndexHit, LexicalIndex, PassageMetadata, VectorIndex};
pub use web::{TavilyClient, WebResult, WebSearch};

/// Default cache directory name
pub const CACHE_DIR_NAME: &str = "regrag";

/// Default config directory name
pub const CONFIG_DIR_NAME: &str = "regrag";
