//! Answer self-check: grounding, relevance and completeness

use super::generator::is_decline;
use super::guarded;
use super::types::{GradedEvidence, Query, ValidationResult};
use crate::error::{Capability, Result};
use crate::llm::{structured_completion, LLMClient};
use crate::search::{numeric_tokens, tokenize};
use lazy_static::lazy_static;
use regex::Regex;
use serde::Deserialize;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

lazy_static! {
    static ref CITATION_RE: Regex = Regex::new(r"\[S\d+\]").unwrap();
    static ref LIST_MARKER_RE: Regex = Regex::new(r"^\s*(?:[#>*\-|]+|\d+[.)])\s*").unwrap();
    static ref HEADING_RE: Regex = Regex::new(r"^\s{0,3}#{1,6}(?:\s|$)").unwrap();
}

const VALIDATOR_SYSTEM: &str = r#"You are an answer validator. Check a draft answer against the evidence it was written from.

Respond with JSON only:
{
  "has_hallucinations": true/false,
  "answers_question": true/false,
  "coverage": 0.0-1.0,
  "relevance": 0.0-1.0,
  "completeness": 0.0-1.0,
  "improvement_needed": ["specific problem to fix"],
  "reasoning": "short explanation"
}

has_hallucinations: the answer states something the evidence does not support.
coverage: share of the answer's factual claims that the evidence supports.
relevance: how directly the answer addresses the question.
completeness: how fully the question is answered."#;

/// Claims with at least this many content terms are checked
const MIN_CLAIM_TERMS: usize = 3;

/// Unsupported claims quoted back as remarks
const MAX_CLAIM_REMARKS: usize = 3;

#[derive(Debug, Deserialize)]
struct ValidatorReply {
    #[serde(default)]
    has_hallucinations: bool,
    #[serde(default = "default_true")]
    answers_question: bool,
    coverage: Option<f64>,
    relevance: Option<f64>,
    completeness: Option<f64>,
    #[serde(default)]
    improvement_needed: Vec<String>,
    #[serde(default)]
    reasoning: String,
}

fn default_true() -> bool {
    true
}

/// Lexical grounding of an answer's claims against evidence spans
#[derive(Debug, Clone, PartialEq)]
pub struct GroundingReport {
    pub claims: usize,
    pub unsupported: Vec<String>,
}

impl GroundingReport {
    /// Share of claims that are supported; 1.0 when nothing was claimed
    pub fn coverage(&self) -> f64 {
        if self.claims == 0 {
            1.0
        } else {
            (self.claims - self.unsupported.len()) as f64 / self.claims as f64
        }
    }
}

/// Combined quality in [0, 1].
///
/// Coverage gates everything: an answer with no supported claims scores zero
/// however relevant it reads.
pub fn combine_quality(coverage: f64, relevance: f64, completeness: f64) -> f64 {
    (coverage * (0.5 * relevance + 0.5 * completeness)).clamp(0.0, 1.0)
}

/// Check every claim-bearing sentence of `answer` against the spans.
///
/// A sentence is a claim when it has enough content terms or any number.
/// It is supported when one span contains at least `overlap` of its terms
/// and every number in it appears in some span.
pub fn check_grounding(answer: &str, spans: &[&str], overlap: f64) -> GroundingReport {
    let span_terms: Vec<HashSet<String>> = spans
        .iter()
        .map(|s| tokenize(s).into_iter().collect())
        .collect();
    let span_numbers: HashSet<String> = spans.iter().flat_map(|s| numeric_tokens(s)).collect();

    let mut claims = 0;
    let mut unsupported = Vec::new();

    for sentence in sentences(answer) {
        let terms: HashSet<String> = tokenize(&sentence).into_iter().collect();
        let numbers = numeric_tokens(&sentence);
        if terms.len() < MIN_CLAIM_TERMS && numbers.is_empty() {
            continue;
        }
        claims += 1;

        let numbers_ok = numbers.iter().all(|n| span_numbers.contains(n));
        let terms_ok = span_terms.iter().any(|span| {
            let hits = terms.iter().filter(|t| span.contains(*t)).count();
            hits as f64 / terms.len().max(1) as f64 >= overlap
        });

        if !(numbers_ok && terms_ok) {
            unsupported.push(sentence);
        }
    }

    GroundingReport {
        claims,
        unsupported,
    }
}

/// Split into sentences with citation tags and markdown markers removed
fn sentences(answer: &str) -> Vec<String> {
    let cleaned = CITATION_RE.replace_all(answer, "");
    let mut out = Vec::new();

    for line in cleaned.lines().filter(|l| !is_layout_line(l)) {
        let line = LIST_MARKER_RE.replace(line, "");
        let mut current = String::new();
        let mut chars = line.chars().peekable();
        while let Some(c) = chars.next() {
            current.push(c);
            let at_break = matches!(c, '.' | '!' | '?')
                && chars.peek().map_or(true, |next| next.is_whitespace());
            if at_break {
                push_sentence(&mut out, &mut current);
            }
        }
        push_sentence(&mut out, &mut current);
    }
    out
}

/// Headings, code fences, rules and table separator rows carry no claims
fn is_layout_line(line: &str) -> bool {
    let t = line.trim();
    HEADING_RE.is_match(t)
        || t.starts_with("```")
        || (t.contains(['-', '*', '_'])
            && t.chars().all(|c| matches!(c, '|' | '-' | ':' | '*' | '_' | ' ')))
}

fn push_sentence(out: &mut Vec<String>, current: &mut String) {
    let sentence = current.trim();
    if !sentence.is_empty() {
        out.push(sentence.to_string());
    }
    current.clear();
}

/// Share of the question's content terms the answer mentions
fn term_relevance(query: &Query, answer: &str) -> f64 {
    let terms = tokenize(&query.text);
    if terms.is_empty() {
        return 0.5;
    }
    let answer_terms: HashSet<String> = tokenize(answer).into_iter().collect();
    let hits = terms.iter().filter(|t| answer_terms.contains(*t)).count();
    hits as f64 / terms.len() as f64
}

pub struct AnswerValidator {
    llm: Arc<dyn LLMClient>,
    timeout: Duration,
    grounding_overlap: f64,
}

impl AnswerValidator {
    pub fn new(llm: Arc<dyn LLMClient>, timeout: Duration, grounding_overlap: f64) -> Self {
        Self {
            llm,
            timeout,
            grounding_overlap,
        }
    }

    /// Validate a draft against the accepted evidence.
    ///
    /// Never fails: without the model only the local grounding check runs.
    pub async fn validate(
        &self,
        query: &Query,
        draft_answer: &str,
        evidence: &[GradedEvidence],
    ) -> ValidationResult {
        if is_decline(draft_answer) {
            return ValidationResult {
                has_hallucinations: false,
                answers_question: false,
                quality_score: 0.0,
                improvement_needed: vec![
                    "No accepted evidence was available for this question".to_string(),
                ],
                reasoning: "The answer declines because no relevant evidence was found."
                    .to_string(),
            };
        }

        let spans: Vec<&str> = evidence
            .iter()
            .filter(|e| e.accepted)
            .map(|e| e.evidence_span.as_str())
            .collect();
        let grounding = check_grounding(draft_answer, &spans, self.grounding_overlap);
        let local_relevance = term_relevance(query, draft_answer);

        let critique: Result<ValidatorReply> = guarded(
            Capability::LanguageModel,
            self.timeout,
            structured_completion(
                self.llm.as_ref(),
                VALIDATOR_SYSTEM,
                build_prompt(query, draft_answer, &spans),
            ),
        )
        .await;

        let result = match critique {
            Ok(reply) => {
                let coverage = reply
                    .coverage
                    .unwrap_or(1.0)
                    .clamp(0.0, 1.0)
                    .min(grounding.coverage());
                let relevance = reply.relevance.unwrap_or(local_relevance).clamp(0.0, 1.0);
                let completeness = reply.completeness.unwrap_or(relevance).clamp(0.0, 1.0);

                let mut remarks: Vec<String> = reply
                    .improvement_needed
                    .into_iter()
                    .map(|r| r.trim().to_string())
                    .filter(|r| !r.is_empty())
                    .collect();
                remarks.extend(claim_remarks(&grounding));

                ValidationResult {
                    has_hallucinations: reply.has_hallucinations || !grounding.unsupported.is_empty(),
                    answers_question: reply.answers_question,
                    quality_score: combine_quality(coverage, relevance, completeness),
                    improvement_needed: remarks,
                    reasoning: reply.reasoning,
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "Validator model unavailable; grounding check only");
                let answers_question = local_relevance >= 0.5;
                let mut remarks = claim_remarks(&grounding);
                if !answers_question {
                    remarks.push("Address the question's key terms directly".to_string());
                }

                ValidationResult {
                    has_hallucinations: !grounding.unsupported.is_empty(),
                    answers_question,
                    quality_score: combine_quality(
                        grounding.coverage(),
                        local_relevance,
                        local_relevance,
                    ),
                    improvement_needed: remarks,
                    reasoning: format!(
                        "Local check: {} of {} claims grounded in evidence.",
                        grounding.claims - grounding.unsupported.len(),
                        grounding.claims
                    ),
                }
            }
        };

        tracing::debug!(
            hallucinations = result.has_hallucinations,
            answers = result.answers_question,
            quality = result.quality_score,
            "Validated draft"
        );
        result
    }
}

fn build_prompt(query: &Query, answer: &str, spans: &[&str]) -> String {
    let mut prompt = format!("Question: {}\n\nEvidence:\n", query.text);
    for (i, span) in spans.iter().enumerate() {
        prompt.push_str(&format!("[S{}] {}\n", i + 1, span));
    }
    prompt.push_str(&format!("\nDraft answer:\n{}", answer));
    prompt
}

fn claim_remarks(grounding: &GroundingReport) -> Vec<String> {
    grounding
        .unsupported
        .iter()
        .take(MAX_CLAIM_REMARKS)
        .map(|claim| format!("Unsupported claim: \"{}\"", claim))
        .collect()
}
