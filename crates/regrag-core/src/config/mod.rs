//! Configuration management

use crate::error::{RagError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Pipeline thresholds and budgets
    #[serde(default)]
    pub pipeline: PipelineConfig,

    /// LLM service configuration
    #[serde(default)]
    pub llm_service: LLMServiceConfig,

    /// Web search fallback configuration
    #[serde(default)]
    pub web_search: WebSearchConfig,
}

/// Thresholds, attempt budgets and fusion weights for one pipeline instance
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub max_retrieval_attempts: u32,
    pub max_generation_attempts: u32,
    pub min_confidence_score: f64,
    /// Accepted evidence below this count triggers a retrieval retry
    pub min_accepted_evidence: usize,
    pub top_k: usize,
    pub max_k: usize,
    /// Minimum cosine similarity kept from the dense index
    pub dense_score_floor: f64,
    /// BM25 scores must be strictly above this
    pub sparse_score_floor: f64,
    pub dense_weight: f64,
    pub sparse_weight: f64,
    /// Confidence multiplier applied when external evidence was consulted
    pub web_search_discount: f64,
    /// Confidence multiplier applied when validation flags the answer
    pub degraded_confidence_factor: f64,
    /// Share of a claim's content terms that must appear in the evidence
    pub grounding_overlap: f64,
    pub capability_timeout_secs: u64,
    pub grading_concurrency: usize,
    pub max_evidence_chars: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_retrieval_attempts: 3,
            max_generation_attempts: 2,
            min_confidence_score: 0.7,
            min_accepted_evidence: 1,
            top_k: 5,
            max_k: 15,
            dense_score_floor: 0.2,
            sparse_score_floor: 0.0,
            dense_weight: 0.5,
            sparse_weight: 0.5,
            web_search_discount: 0.8,
            degraded_confidence_factor: 0.5,
            grounding_overlap: 0.5,
            capability_timeout_secs: 30,
            grading_concurrency: 4,
            max_evidence_chars: 1200,
        }
    }
}

impl PipelineConfig {
    /// Timeout applied around every capability call
    pub fn capability_timeout(&self) -> Duration {
        Duration::from_secs(self.capability_timeout_secs)
    }

    /// Top-k for a given (1-based) retrieval attempt
    pub fn k_for_attempt(&self, attempt: u32) -> usize {
        let attempt = attempt.max(1) as usize;
        (self.top_k * attempt).min(self.max_k.max(self.top_k))
    }

    /// Fusion weights normalized to sum to one
    pub fn fusion_weights(&self) -> (f64, f64) {
        let total = self.dense_weight + self.sparse_weight;
        if total <= 0.0 {
            return (0.5, 0.5);
        }
        (self.dense_weight / total, self.sparse_weight / total)
    }

    /// Reject values the pipeline cannot work with
    pub fn validate(&self) -> Result<()> {
        let unit = |name: &str, value: f64| -> Result<()> {
            if (0.0..=1.0).contains(&value) {
                Ok(())
            } else {
                Err(RagError::Config(format!(
                    "{} must be within [0, 1], got {}",
                    name, value
                )))
            }
        };

        unit("min_confidence_score", self.min_confidence_score)?;
        unit("web_search_discount", self.web_search_discount)?;
        unit("degraded_confidence_factor", self.degraded_confidence_factor)?;
        unit("grounding_overlap", self.grounding_overlap)?;
        unit("dense_score_floor", self.dense_score_floor.abs())?;

        if self.max_retrieval_attempts == 0 || self.max_generation_attempts == 0 {
            return Err(RagError::Config(
                "attempt budgets must be at least 1".to_string(),
            ));
        }
        if self.top_k == 0 {
            return Err(RagError::Config("top_k must be at least 1".to_string()));
        }
        if self.max_k < self.top_k {
            return Err(RagError::Config(format!(
                "max_k ({}) must not be smaller than top_k ({})",
                self.max_k, self.top_k
            )));
        }
        if self.dense_weight < 0.0
            || self.sparse_weight < 0.0
            || self.dense_weight + self.sparse_weight <= 0.0
        {
            return Err(RagError::Config(
                "fusion weights must be non-negative and not both zero".to_string(),
            ));
        }
        if self.grading_concurrency == 0 {
            return Err(RagError::Config(
                "grading_concurrency must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// LLM service configuration for external inference
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LLMServiceConfig {
    /// Base URL of the LLM service for chat/completions
    pub url: String,

    /// Model name for chat completions
    #[serde(default = "default_chat_model")]
    pub model: String,

    /// Base URL for embeddings service (can be different from LLM URL)
    #[serde(default)]
    pub embedding_url: Option<String>,

    /// Model name for embeddings
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,

    /// Embedding dimensions (will be auto-detected if not specified)
    #[serde(default)]
    pub embedding_dimensions: Option<usize>,

    /// API key (optional, for authenticated services)
    #[serde(default)]
    pub api_key: Option<String>,

    /// Request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Adapter-level retry policy
    #[serde(default)]
    pub retry: RetryConfig,
}

impl LLMServiceConfig {
    /// Get the embeddings URL (falls back to main URL if not specified)
    pub fn embeddings_url(&self) -> &str {
        self.embedding_url.as_deref().unwrap_or(&self.url)
    }
}

impl Default for LLMServiceConfig {
    fn default() -> Self {
        Self {
            url: std::env::var("REGRAG_LLM_URL")
                .unwrap_or_else(|_| "http://localhost:8000".to_string()),
            model: default_chat_model(),
            embedding_url: std::env::var("REGRAG_EMBEDDING_URL").ok(),
            embedding_model: default_embedding_model(),
            embedding_dimensions: std::env::var("REGRAG_EMBEDDING_DIMS")
                .ok()
                .and_then(|s| s.parse().ok()),
            api_key: std::env::var("REGRAG_LLM_API_KEY").ok(),
            timeout_secs: default_timeout(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            retry: RetryConfig::default(),
        }
    }
}

fn default_chat_model() -> String {
    std::env::var("REGRAG_LLM_MODEL")
        .unwrap_or_else(|_| "meta-llama/Llama-3.3-70B-Instruct".to_string())
}

fn default_embedding_model() -> String {
    std::env::var("REGRAG_EMBEDDING_MODEL")
        .unwrap_or_else(|_| "sentence-transformers/all-MiniLM-L6-v2".to_string())
}

fn default_timeout() -> u64 {
    30
}

fn default_temperature() -> f32 {
    0.3
}

fn default_max_tokens() -> u32 {
    2048
}

/// Bounded retry-with-backoff for transient adapter failures
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub initial_backoff_ms: u64,
    pub backoff_multiplier: f64,
    pub max_backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff_ms: 300,
            backoff_multiplier: 2.0,
            max_backoff_ms: 5_000,
        }
    }
}

impl RetryConfig {
    /// No retries at all
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }
}

/// Web search fallback configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebSearchConfig {
    #[serde(default = "default_web_enabled")]
    pub enabled: bool,

    #[serde(default = "default_web_endpoint")]
    pub endpoint: String,

    #[serde(default)]
    pub api_key: Option<String>,

    #[serde(default = "default_web_max_results")]
    pub max_results: usize,

    /// "basic" or "advanced"
    #[serde(default = "default_search_depth")]
    pub search_depth: String,

    #[serde(default = "default_web_timeout")]
    pub timeout_secs: u64,

    #[serde(default)]
    pub retry: RetryConfig,
}

impl Default for WebSearchConfig {
    fn default() -> Self {
        Self {
            enabled: default_web_enabled(),
            endpoint: default_web_endpoint(),
            api_key: std::env::var("TAVILY_API_KEY").ok(),
            max_results: default_web_max_results(),
            search_depth: default_search_depth(),
            timeout_secs: default_web_timeout(),
            retry: RetryConfig::default(),
        }
    }
}

impl WebSearchConfig {
    /// Web search is usable only when enabled and a key is present
    pub fn is_available(&self) -> bool {
        self.enabled && self.api_key.as_deref().is_some_and(|k| !k.is_empty())
    }
}

fn default_web_enabled() -> bool {
    true
}

fn default_web_endpoint() -> String {
    "https://api.tavily.com/search".to_string()
}

fn default_web_max_results() -> usize {
    5
}

fn default_search_depth() -> String {
    "advanced".to_string()
}

fn default_web_timeout() -> u64 {
    10
}

impl Config {
    /// Load config from `REGRAG_CONFIG` or the default path
    pub fn load() -> Result<Self> {
        let path = std::env::var("REGRAG_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| Self::default_path());
        Self::load_from(path)
    }

    /// Load config from a specific path, defaults if it does not exist
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path)?;
            serde_yaml::from_str::<Config>(&content)?
        } else {
            Config::default()
        };
        // Keys left out of the file come from the environment
        if config.llm_service.api_key.is_none() {
            config.llm_service.api_key = std::env::var("REGRAG_LLM_API_KEY").ok();
        }
        if config.web_search.api_key.is_none() {
            config.web_search.api_key = std::env::var("TAVILY_API_KEY").ok();
        }
        config.pipeline.validate()?;
        Ok(config)
    }

    /// Save config to a specific path
    pub fn save_to(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_yaml::to_string(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Save config to default path
    pub fn save(&self) -> Result<()> {
        self.save_to(Self::default_path())
    }

    /// Get default config path
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(crate::CONFIG_DIR_NAME)
            .join("config.yml")
    }
}
