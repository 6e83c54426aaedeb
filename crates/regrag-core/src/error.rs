//! Error types for regrag

use thiserror::Error;

/// Result type alias using RagError
pub type Result<T> = std::result::Result<T, RagError>;

/// Error type alias for convenience
pub type Error = RagError;

/// Exit codes for CLI
pub mod exit_codes {
    pub const SUCCESS: i32 = 0;
    pub const GENERAL_ERROR: i32 = 1;
    pub const NOT_FOUND: i32 = 2;
    pub const INVALID_INPUT: i32 = 3;
}

/// External capability a call was made against
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    Embedding,
    DenseIndex,
    LexicalIndex,
    LanguageModel,
    WebSearch,
}

impl std::fmt::Display for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Embedding => "embedding",
            Self::DenseIndex => "dense index",
            Self::LexicalIndex => "lexical index",
            Self::LanguageModel => "language model",
            Self::WebSearch => "web search",
        };
        f.write_str(name)
    }
}

/// Main error type for regrag
#[derive(Debug, Error)]
pub enum RagError {
    /// Malformed input rejected before the pipeline starts
    #[error("Analysis error: {0}")]
    Analysis(String),

    #[error("{capability} failure: {message}")]
    Capability {
        capability: Capability,
        message: String,
    },

    #[error("{capability} call timed out after {secs}s")]
    Timeout { capability: Capability, secs: u64 },

    #[error("Generation error: {0}")]
    Generation(String),

    #[error("Query cancelled")]
    Cancelled,

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("LLM error: {0}")]
    Llm(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Passage not found: {0}")]
    PassageNotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("External service error: {0}")]
    ExternalError(String),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl RagError {
    /// Shorthand for a capability failure
    pub fn capability(capability: Capability, message: impl Into<String>) -> Self {
        Self::Capability {
            capability,
            message: message.into(),
        }
    }

    /// True for failures of an external collaborator (absorbed by the pipeline)
    pub fn is_capability_failure(&self) -> bool {
        matches!(
            self,
            Self::Capability { .. }
                | Self::Timeout { .. }
                | Self::Generation(_)
                | Self::Llm(_)
                | Self::Http(_)
                | Self::ExternalError(_)
                | Self::Database(_)
                | Self::Serialization(_)
        )
    }

    /// Get the exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::PassageNotFound(_) => exit_codes::NOT_FOUND,
            Self::Analysis(_) | Self::InvalidInput(_) | Self::Config(_) => {
                exit_codes::INVALID_INPUT
            }
            _ => exit_codes::GENERAL_ERROR,
        }
    }
}
