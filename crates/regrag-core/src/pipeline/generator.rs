//! Evidence-grounded answer generation

use super::guarded;
use super::types::{GradedEvidence, Query, ValidationResult};
use crate::error::{Capability, RagError, Result};
use crate::llm::{parse_structured, ChatMessage, LLMClient};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;

/// Canned answer when no evidence was accepted
pub const DECLINE_ANSWER: &str = "I apologize, but I couldn't find any relevant documents to answer your question. Please rephrase your query or ask about a different topic that might be covered in our knowledge base.";

/// Follow-ups offered alongside [`DECLINE_ANSWER`]
pub const DECLINE_FOLLOWUPS: &[&str] = &[
    "Could you rephrase your question?",
    "Would you like to ask about a different topic?",
];

/// Marker the model is told to emit when the evidence falls short
const INSUFFICIENT_MARKER: &str = "INSUFFICIENT_EVIDENCE";

const GENERATOR_SYSTEM: &str = r#"You answer questions strictly from supplied evidence. Each evidence item is tagged [S1], [S2], ...

Rules:
- Use only facts stated in the evidence. No outside knowledge.
- Cite the tag of each item you rely on, e.g. "founded in 1921 [S1]".
- Keep names, numbers and dates exactly as written in the evidence.
- If the evidence does not answer the question, set "answer" to exactly INSUFFICIENT_EVIDENCE.

Formatting of "answer" (Markdown):
- Short answers are one or two plain sentences.
- Longer answers start with a ## heading and group related points under ### subheadings.
- Use bullet lists for unordered points and numbered lists for steps or ranked items.
- Use a Markdown table for comparisons, thresholds or figures across several items.
- Use **bold** for key terms and > blockquotes for short verbatim quotes from the evidence.
- Escape double quotes and backslashes so the JSON stays valid.

Respond with JSON only:
{
  "answer": "the answer",
  "key_concepts": ["concept"],
  "suggested_followup": ["follow-up question"]
}"#;

const STRICT_RULES: &str = "Your previous draft was rejected. Every sentence must be directly supported by the evidence; omit anything the evidence does not state.";

#[derive(Debug, Deserialize)]
struct GeneratorReply {
    #[serde(default)]
    answer: String,
    #[serde(default)]
    key_concepts: Vec<String>,
    #[serde(default)]
    suggested_followup: Vec<String>,
}

/// A generated (not yet validated) answer
#[derive(Debug, Clone, PartialEq)]
pub struct DraftAnswer {
    pub answer: String,
    pub key_concepts: Vec<String>,
    pub suggested_followup: Vec<String>,
    /// Answer is the canned decline rather than model output
    pub declined: bool,
}

impl DraftAnswer {
    pub fn decline() -> Self {
        Self {
            answer: DECLINE_ANSWER.to_string(),
            key_concepts: Vec::new(),
            suggested_followup: DECLINE_FOLLOWUPS.iter().map(|s| s.to_string()).collect(),
            declined: true,
        }
    }
}

/// Whether `answer` is the canned decline
pub fn is_decline(answer: &str) -> bool {
    answer.trim() == DECLINE_ANSWER
}

pub struct AnswerGenerator {
    llm: Arc<dyn LLMClient>,
    timeout: Duration,
    max_evidence_chars: usize,
}

impl AnswerGenerator {
    pub fn new(llm: Arc<dyn LLMClient>, timeout: Duration, max_evidence_chars: usize) -> Self {
        Self {
            llm,
            timeout,
            max_evidence_chars,
        }
    }

    /// Draft an answer from accepted evidence only.
    ///
    /// With no accepted evidence the canned decline comes back without a
    /// model call. `feedback` switches the prompt to strict mode.
    pub async fn generate(
        &self,
        query: &Query,
        evidence: &[GradedEvidence],
        feedback: Option<&ValidationResult>,
    ) -> Result<DraftAnswer> {
        let accepted: Vec<&GradedEvidence> = evidence.iter().filter(|e| e.accepted).collect();
        if accepted.is_empty() {
            tracing::debug!("No accepted evidence; declining");
            return Ok(DraftAnswer::decline());
        }

        let prompt = self.build_prompt(query, &accepted, feedback);
        let messages = vec![ChatMessage::system(GENERATOR_SYSTEM), ChatMessage::user(prompt)];

        let raw = guarded(
            Capability::LanguageModel,
            self.timeout,
            self.llm.chat_completion(messages),
        )
        .await
        .map_err(|e| RagError::Generation(e.to_string()))?;

        let draft = parse_draft(&raw)?;
        tracing::debug!(
            chars = draft.answer.len(),
            declined = draft.declined,
            strict = feedback.is_some(),
            "Generated draft"
        );
        Ok(draft)
    }

    fn build_prompt(
        &self,
        query: &Query,
        accepted: &[&GradedEvidence],
        feedback: Option<&ValidationResult>,
    ) -> String {
        let mut prompt = String::new();
        prompt.push_str("Evidence:\n");
        for (i, item) in accepted.iter().enumerate() {
            prompt.push_str(&format!(
                "[S{}] ({}) {}\n",
                i + 1,
                item.passage.label(),
                truncate_chars(&item.evidence_span, self.max_evidence_chars)
            ));
        }

        prompt.push_str(&format!("\nQuestion: {}\n", query.text));
        if !query.extracted_entities.is_empty() {
            prompt.push_str(&format!(
                "Key entities: {}\n",
                query.extracted_entities.join(", ")
            ));
        }

        if let Some(feedback) = feedback {
            prompt.push_str(&format!("\n{}\n", STRICT_RULES));
            for remark in &feedback.improvement_needed {
                prompt.push_str(&format!("- {}\n", remark));
            }
        }

        prompt
    }
}

fn parse_draft(raw: &str) -> Result<DraftAnswer> {
    let (answer, key_concepts, suggested_followup) =
        match parse_structured::<GeneratorReply>(raw) {
            Ok(reply) => (reply.answer, reply.key_concepts, reply.suggested_followup),
            // Plain prose is acceptable when the model ignores the JSON format
            Err(_) => (raw.to_string(), Vec::new(), Vec::new()),
        };

    let answer = answer.trim();
    if answer.is_empty() {
        return Err(RagError::Generation("model returned an empty answer".to_string()));
    }
    if answer.contains(INSUFFICIENT_MARKER) {
        return Ok(DraftAnswer::decline());
    }

    Ok(DraftAnswer {
        answer: answer.to_string(),
        key_concepts: clean_list(key_concepts),
        suggested_followup: clean_list(suggested_followup),
        declined: false,
    })
}

fn clean_list(items: Vec<String>) -> Vec<String> {
    items
        .into_iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
