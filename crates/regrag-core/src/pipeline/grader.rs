//! Per-passage relevance grading and evidence-span extraction

use super::guarded;
use super::types::{GradedEvidence, Query, RetrievedPassage};
use crate::error::{Capability, Result};
use crate::llm::{structured_completion, LLMClient};
use crate::search::{extract_snippet, tokenize};
use futures::stream::{self, StreamExt};
use serde::Deserialize;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

const GRADER_SYSTEM: &str = r#"You are a document grader. Judge whether a passage helps answer a question.

Respond with JSON only:
{
  "relevance_score": 0.0-1.0,
  "quality_score": 0.0-1.0,
  "evidence_span": "the exact sentence(s) copied from the passage that bear on the question, or empty"
}

relevance_score: how directly the passage addresses the question.
quality_score: how complete and specific the passage is.
evidence_span must be copied verbatim from the passage. Do not paraphrase."#;

#[derive(Debug, Deserialize)]
struct GraderReply {
    #[serde(default)]
    relevance_score: f64,
    #[serde(default)]
    quality_score: f64,
    #[serde(default)]
    evidence_span: String,
}

/// Grades passages independently and in bounded parallel
pub struct DocumentGrader {
    llm: Arc<dyn LLMClient>,
    timeout: Duration,
    min_confidence_score: f64,
    concurrency: usize,
    max_span_chars: usize,
}

impl DocumentGrader {
    pub fn new(
        llm: Arc<dyn LLMClient>,
        timeout: Duration,
        min_confidence_score: f64,
        concurrency: usize,
        max_span_chars: usize,
    ) -> Self {
        Self {
            llm,
            timeout,
            min_confidence_score,
            concurrency: concurrency.max(1),
            max_span_chars,
        }
    }

    /// Grade every passage; result is sorted by relevance, highest first.
    ///
    /// Never fails: a passage whose model call fails is graded lexically.
    pub async fn grade(&self, query: &Query, passages: &[RetrievedPassage]) -> Vec<GradedEvidence> {
        // Futures are built up front so the stream holds no higher-ranked closure
        let futures: Vec<_> = passages
            .iter()
            .map(|passage| self.grade_one(query, passage))
            .collect();
        let mut graded: Vec<GradedEvidence> =
            stream::iter(futures)
                .buffered(self.concurrency)
                .collect()
                .await;

        // Stable: equal relevance keeps retrieval order
        graded.sort_by(|a, b| {
            b.relevance_score
                .partial_cmp(&a.relevance_score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        let accepted = graded.iter().filter(|g| g.accepted).count();
        tracing::debug!(total = graded.len(), accepted, "Graded passages");
        graded
    }

    async fn grade_one(&self, query: &Query, passage: &RetrievedPassage) -> GradedEvidence {
        let prompt = format!(
            "Question: {}\n\nPassage ({}):\n{}",
            query.effective_text(),
            passage.label(),
            passage.text
        );

        let reply: Result<GraderReply> = guarded(
            Capability::LanguageModel,
            self.timeout,
            structured_completion(self.llm.as_ref(), GRADER_SYSTEM, prompt),
        )
        .await;

        let (relevance, quality, span) = match reply {
            Ok(r) => (
                r.relevance_score.clamp(0.0, 1.0),
                r.quality_score.clamp(0.0, 1.0),
                locate_span(&passage.text, &r.evidence_span),
            ),
            Err(e) => {
                tracing::debug!(source = %passage.source_id, error = %e, "Lexical grading fallback");
                let (relevance, quality) = lexical_grade(query, &passage.text);
                (relevance, quality, None)
            }
        };

        let evidence_span = span.unwrap_or_else(|| {
            let terms = query_terms(query);
            extract_snippet(&passage.text, &terms, self.max_span_chars).snippet
        });

        GradedEvidence {
            passage: passage.clone(),
            relevance_score: relevance,
            quality_score: quality,
            evidence_span,
            accepted: relevance >= self.min_confidence_score,
        }
    }
}

/// Find `candidate` inside `text` and return the literal slice.
///
/// Tries an exact match, then a case-insensitive one. Model-produced spans
/// that were paraphrased return `None`.
pub fn locate_span(text: &str, candidate: &str) -> Option<String> {
    let candidate = candidate.trim().trim_matches('"').trim();
    if candidate.is_empty() {
        return None;
    }

    if text.contains(candidate) {
        return Some(candidate.to_string());
    }

    // Lowercasing can change byte lengths outside ASCII
    if !text.is_ascii() || !candidate.is_ascii() {
        return None;
    }
    let start = text.to_lowercase().find(&candidate.to_lowercase())?;
    Some(text[start..start + candidate.len()].to_string())
}

/// Overlap-based (relevance, quality) used when the model is unavailable
pub fn lexical_grade(query: &Query, text: &str) -> (f64, f64) {
    let terms = query_terms(query);
    if terms.is_empty() {
        return (0.0, 0.0);
    }

    let passage_tokens: HashSet<String> = tokenize(text).into_iter().collect();
    let matched = terms.iter().filter(|t| passage_tokens.contains(*t)).count();
    let relevance = matched as f64 / terms.len() as f64;

    // Longer passages carry more context, up to a point
    let quality = 0.5 + 0.5 * (passage_tokens.len() as f64 / 30.0).min(1.0);
    (relevance, quality * relevance.max(0.1))
}

fn query_terms(query: &Query) -> Vec<String> {
    let mut seen = HashSet::new();
    tokenize(&query.text)
        .into_iter()
        .chain(query.rewritten_text.as_deref().map(tokenize).unwrap_or_default())
        .filter(|t| seen.insert(t.clone()))
        .collect()
}
