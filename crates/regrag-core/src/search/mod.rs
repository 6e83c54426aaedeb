//! Search capabilities
//!
//! Provides:
//! - Dense (vector) and lexical index capability traits
//! - In-memory BM25 and brute-force cosine indexes
//! - Hybrid fusion of the two rankings
//! - Evidence span extraction

mod bm25;
mod hybrid;
mod snippet;
mod vector;

pub use bm25::{bm25_idf, Bm25Index, DEFAULT_B, DEFAULT_K1};
pub use hybrid::{fuse, normalize_scores, spans_overlap, FusedHit, FusionWeights};
pub use snippet::{extract_snippet, Snippet};
pub use vector::{cosine_similarity, VectorIndex};

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Source metadata attached to a passage
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PassageMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub section: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,
    /// Set for external (web) evidence
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

impl PassageMetadata {
    pub fn titled(title: impl Into<String>) -> Self {
        Self {
            title: Some(title.into()),
            ..Self::default()
        }
    }

    /// Human-readable citation label
    pub fn label(&self, source_id: &str) -> String {
        let mut label = self.title.clone().unwrap_or_else(|| source_id.to_string());
        if let Some(ref section) = self.section {
            label.push_str(&format!(", {}", section));
        }
        if let Some(page) = self.page {
            label.push_str(&format!(", p. {}", page));
        }
        label
    }
}

/// One scored hit returned by an index
#[derive(Debug, Clone, PartialEq)]
pub struct IndexHit {
    pub source_id: String,
    pub text: String,
    pub score: f64,
    pub metadata: PassageMetadata,
}

/// Nearest-neighbour lookup over passage embeddings
#[async_trait]
pub trait DenseIndex: Send + Sync {
    /// Top-k hits by similarity, best first
    async fn query(&self, vector: &[f32], k: usize) -> Result<Vec<IndexHit>>;
}

/// Term-frequency ranked lookup over passage text
#[async_trait]
pub trait LexicalIndex: Send + Sync {
    /// Top-k hits by BM25, best first
    async fn query(&self, tokens: &[String], k: usize) -> Result<Vec<IndexHit>>;
}

/// Common English stop words dropped from queries and claims
const STOP_WORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "by", "for", "from", "has", "have", "he", "in",
    "is", "it", "its", "of", "on", "or", "that", "the", "to", "was", "were", "will", "with",
    "does", "do", "did", "can", "could", "should", "would", "what", "where", "when", "why", "how",
    "who", "which", "this", "these", "those", "there", "here", "i", "we", "you", "they", "their",
    "our", "me", "my", "about", "into", "been", "being", "than", "then", "also", "not", "no",
    "any", "all", "such",
];

pub fn is_stop_word(word: &str) -> bool {
    STOP_WORDS.contains(&word)
}

/// Lowercased content terms, stop words removed, order preserved.
///
/// Single letters are dropped; numbers of any length are kept.
pub fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
        .filter(|t| t.chars().count() > 1 || t.chars().all(|c| c.is_ascii_digit()))
        .filter(|t| !is_stop_word(t))
        .collect()
}

/// Tokens that are entirely digits (years, article numbers, amounts)
pub fn numeric_tokens(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty() && t.chars().all(|c| c.is_ascii_digit()))
        .map(str::to_string)
        .collect()
}
