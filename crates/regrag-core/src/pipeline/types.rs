//! Pipeline data model

use crate::search::{IndexHit, PassageMetadata};
use serde::{Deserialize, Serialize};

/// Intent label used when the query could not be classified
pub const GENERIC_INTENT: &str = "information_seeking";

/// Coarse query classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryType {
    Factual,
    Analytical,
    Procedural,
    #[default]
    Unknown,
}

impl QueryType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Factual => "factual",
            Self::Analytical => "analytical",
            Self::Procedural => "procedural",
            Self::Unknown => "unknown",
        }
    }

    /// Lenient parse of a model-produced label; anything unrecognized is `Unknown`
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_lowercase().as_str() {
            "factual" => Self::Factual,
            "analytical" => Self::Analytical,
            "procedural" => Self::Procedural,
            _ => Self::Unknown,
        }
    }
}

impl std::fmt::Display for QueryType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An analyzed user query.
///
/// Only `rewritten_text` changes after analysis; each retry overwrites it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Query {
    pub text: String,
    pub language: String,
    pub query_type: QueryType,
    pub intent: String,
    pub extracted_entities: Vec<String>,
    pub rewritten_text: Option<String>,
}

impl Query {
    /// Text retrieval and grading should use: the latest rewrite, else the original
    pub fn effective_text(&self) -> &str {
        self.rewritten_text.as_deref().unwrap_or(&self.text)
    }
}

/// Where a passage came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetrievalStrategy {
    Dense,
    Sparse,
    Hybrid,
    External,
}

impl RetrievalStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Dense => "dense",
            Self::Sparse => "sparse",
            Self::Hybrid => "hybrid",
            Self::External => "external",
        }
    }
}

impl std::fmt::Display for RetrievalStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Strategy requested for a retrieval attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StrategyHint {
    /// Let the selector decide from the query type
    #[default]
    Auto,
    Dense,
    Sparse,
    Hybrid,
}

impl StrategyHint {
    /// The explicit strategy, if any
    pub fn forced(&self) -> Option<RetrievalStrategy> {
        match self {
            Self::Auto => None,
            Self::Dense => Some(RetrievalStrategy::Dense),
            Self::Sparse => Some(RetrievalStrategy::Sparse),
            Self::Hybrid => Some(RetrievalStrategy::Hybrid),
        }
    }
}

impl From<RetrievalStrategy> for StrategyHint {
    fn from(strategy: RetrievalStrategy) -> Self {
        match strategy {
            RetrievalStrategy::Dense => Self::Dense,
            RetrievalStrategy::Sparse => Self::Sparse,
            RetrievalStrategy::Hybrid | RetrievalStrategy::External => Self::Hybrid,
        }
    }
}

/// Candidate evidence unit, never mutated after retrieval
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RetrievedPassage {
    pub source_id: String,
    pub text: String,
    /// Strategy-specific score; not comparable across strategies
    pub raw_score: f64,
    pub strategy: RetrievalStrategy,
    pub metadata: PassageMetadata,
}

impl RetrievedPassage {
    pub fn from_hit(hit: IndexHit, strategy: RetrievalStrategy) -> Self {
        Self {
            source_id: hit.source_id,
            text: hit.text,
            raw_score: hit.score,
            strategy,
            metadata: hit.metadata,
        }
    }

    /// Citation label for prompts and responses
    pub fn label(&self) -> String {
        self.metadata.label(&self.source_id)
    }
}

/// A passage after grading
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GradedEvidence {
    pub passage: RetrievedPassage,
    pub relevance_score: f64,
    pub quality_score: f64,
    /// Literal substring of `passage.text`
    pub evidence_span: String,
    pub accepted: bool,
}

/// Outcome of one self-check of a draft answer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub has_hallucinations: bool,
    pub answers_question: bool,
    pub quality_score: f64,
    pub improvement_needed: Vec<String>,
    pub reasoning: String,
}

/// Inbound request
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueryRequest {
    pub query: String,
    #[serde(default)]
    pub include_source_documents: bool,
}

impl QueryRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            include_source_documents: false,
        }
    }

    pub fn with_source_documents(mut self) -> Self {
        self.include_source_documents = true;
        self
    }
}

/// Response metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseMetadata {
    pub sources_used: usize,
    pub key_concepts: Vec<String>,
    pub confidence_factors: Vec<String>,
    pub web_search_used: bool,
    pub retrieval_attempts: u32,
    pub generation_attempts: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retrieval_strategy: Option<RetrievalStrategy>,
}

/// Evidence item surfaced on request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceDocument {
    pub source_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    pub strategy: RetrievalStrategy,
    pub relevance_score: f64,
    pub evidence_span: String,
}

impl From<&GradedEvidence> for SourceDocument {
    fn from(evidence: &GradedEvidence) -> Self {
        Self {
            source_id: evidence.passage.source_id.clone(),
            title: evidence.passage.metadata.title.clone(),
            url: evidence.passage.metadata.url.clone(),
            strategy: evidence.passage.strategy,
            relevance_score: evidence.relevance_score,
            evidence_span: evidence.evidence_span.clone(),
        }
    }
}

/// Terminal answer returned to the caller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub answer: String,
    pub supporting_evidence: Vec<String>,
    pub confidence_score: f64,
    pub query_type: QueryType,
    pub query_intent: String,
    /// Wall-clock seconds
    pub processing_time: f64,
    pub metadata: ResponseMetadata,
    pub suggested_followup: Vec<String>,
    pub validation: ValidationResult,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_documents: Option<Vec<SourceDocument>>,
}
