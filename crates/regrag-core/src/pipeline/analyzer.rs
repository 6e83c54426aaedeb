//! Query analysis: classification, entity extraction, index relevance, rewrites

use super::guarded;
use super::types::{Query, QueryType, GENERIC_INTENT};
use crate::error::{Capability, RagError, Result};
use crate::llm::{structured_completion, LLMClient};
use crate::search::{is_stop_word, tokenize};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;

const ANALYZER_SYSTEM: &str = r#"You are the query analyzer for a question answering system over a corpus of regulatory documents.

Classify the user query:
- factual: direct questions seeking a specific fact (dates, names, amounts, definitions)
- analytical: questions requiring analysis, comparison, or reasoning
- procedural: how-to questions or step-by-step instructions
- conversational: greetings, chitchat, or general dialogue

Mark "is_related_to_index" false only if the query explicitly needs real-time data
or information that cannot be in any document collection.

Extract explicit and implicit entities (organisations, laws, sections, dates).

Respond ONLY with JSON:
{
  "is_related_to_index": true | false,
  "query_type": "factual" | "analytical" | "procedural" | "conversational",
  "query_entities": ["..."],
  "query_intent": "information_seeking" | "clarification" | "greeting" | "task" | "feedback",
  "language": "ISO 639-1 code",
  "confidence": 0.0-1.0,
  "reasoning": "brief explanation"
}"#;

const REWRITE_SYSTEM: &str = r#"You rewrite search queries for better document retrieval.
Keep the meaning of the original question. Respond ONLY with JSON:
{"rewritten_query": "..."}"#;

const WEB_QUERY_SYSTEM: &str = r#"You write concise web search queries for questions the internal document collection could not answer.
Respond ONLY with JSON:
{"search_query": "..."}"#;

/// Markers of questions that need live data
const REALTIME_MARKERS: &[&str] = &[
    "today",
    "right now",
    "current price",
    "stock price",
    "exchange rate today",
    "latest news",
    "weather",
    "this morning",
];

const PROCEDURAL_MARKERS: &[&str] = &[
    "how to",
    "how do",
    "how can",
    "how should",
    "steps",
    "procedure",
    "process for",
    "apply for",
    "register",
    "submit",
    "file a",
];

const ANALYTICAL_MARKERS: &[&str] = &[
    "why",
    "compare",
    "comparison",
    "difference",
    "differ",
    "impact",
    "analy",
    "evaluate",
    "versus",
    " vs ",
    "implications",
    "pros and cons",
];

const FACTUAL_OPENERS: &[&str] = &[
    "what", "when", "who", "where", "which", "is", "are", "does", "did", "was", "were", "how many",
    "how much", "define", "list",
];

/// Result of analyzing one raw query
#[derive(Debug, Clone, PartialEq)]
pub struct QueryAnalysis {
    pub query: Query,
    /// Advisory estimate that the corpus can answer
    pub related_to_index: bool,
    pub confidence: f64,
    pub reasoning: String,
}

/// How a retry reformulates the question
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RewriteStyle {
    /// Broader wording and synonyms
    Broaden,
    /// Centred on the extracted entities
    EntityFocused,
}

impl RewriteStyle {
    /// Retries alternate styles, starting broad
    pub fn for_attempt(attempt: u32) -> Self {
        if attempt % 2 == 0 {
            Self::Broaden
        } else {
            Self::EntityFocused
        }
    }
}

#[derive(Debug, Deserialize)]
struct AnalyzerReply {
    #[serde(default = "default_true")]
    is_related_to_index: bool,
    #[serde(default)]
    query_type: String,
    #[serde(default)]
    query_entities: Vec<String>,
    #[serde(default)]
    query_intent: String,
    #[serde(default)]
    language: Option<String>,
    #[serde(default)]
    confidence: f64,
    #[serde(default)]
    reasoning: String,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize)]
struct RewriteReply {
    rewritten_query: String,
}

#[derive(Debug, Deserialize)]
struct WebQueryReply {
    search_query: String,
}

/// LLM-backed analyzer with deterministic heuristic fallback
pub struct QueryAnalyzer {
    llm: Arc<dyn LLMClient>,
    timeout: Duration,
}

impl QueryAnalyzer {
    pub fn new(llm: Arc<dyn LLMClient>, timeout: Duration) -> Self {
        Self { llm, timeout }
    }

    /// Classify a raw query.
    ///
    /// Fails only on empty or whitespace-only input.
    pub async fn analyze(&self, raw_query: &str) -> Result<QueryAnalysis> {
        let text = raw_query.trim();
        if text.is_empty() {
            return Err(RagError::Analysis(
                "query is empty or whitespace-only".to_string(),
            ));
        }

        let reply = guarded(
            Capability::LanguageModel,
            self.timeout,
            structured_completion::<AnalyzerReply>(
                self.llm.as_ref(),
                ANALYZER_SYSTEM,
                format!("Analyze this query: {}", text),
            ),
        )
        .await;

        match reply {
            Ok(reply) => Ok(from_reply(text, reply)),
            Err(e) => {
                tracing::warn!(error = %e, "Query analysis fell back to heuristics");
                Ok(heuristic_analysis(text))
            }
        }
    }

    /// Reformulate the original question for a retry attempt
    pub async fn rewrite(&self, query: &Query, attempt: u32) -> String {
        let style = RewriteStyle::for_attempt(attempt);
        let instruction = match style {
            RewriteStyle::Broaden => {
                "Broaden the query: use synonyms and more general regulatory terminology."
            }
            RewriteStyle::EntityFocused => {
                "Focus the query on its key entities (organisations, laws, sections, dates)."
            }
        };

        let prompt = format!(
            "{}\n\nOriginal query: {}\nQuery type: {}\nEntities: {}\nIntent: {}",
            instruction,
            query.text,
            query.query_type,
            query.extracted_entities.join(", "),
            query.intent
        );

        let reply = guarded(
            Capability::LanguageModel,
            self.timeout,
            structured_completion::<RewriteReply>(self.llm.as_ref(), REWRITE_SYSTEM, prompt),
        )
        .await;

        match reply {
            Ok(r) if !r.rewritten_query.trim().is_empty() => r.rewritten_query.trim().to_string(),
            Ok(_) => fallback_rewrite(query, style),
            Err(e) => {
                tracing::warn!(error = %e, "Query rewrite fell back to term extraction");
                fallback_rewrite(query, style)
            }
        }
    }

    /// Concise web search query for the fallback path
    pub async fn web_search_query(&self, query: &Query) -> String {
        let prompt = format!(
            "Question: {}\nKey entities: {}",
            query.text,
            query.extracted_entities.join(", ")
        );

        let reply = guarded(
            Capability::LanguageModel,
            self.timeout,
            structured_completion::<WebQueryReply>(self.llm.as_ref(), WEB_QUERY_SYSTEM, prompt),
        )
        .await;

        match reply {
            Ok(r) if !r.search_query.trim().is_empty() => r.search_query.trim().to_string(),
            Ok(_) => query.effective_text().to_string(),
            Err(e) => {
                tracing::warn!(error = %e, "Web query generation fell back to query text");
                query.effective_text().to_string()
            }
        }
    }
}

fn from_reply(text: &str, reply: AnalyzerReply) -> QueryAnalysis {
    let mut entities: Vec<String> = Vec::new();
    for entity in reply.query_entities {
        let entity = entity.trim().to_string();
        if !entity.is_empty() && !entities.contains(&entity) {
            entities.push(entity);
        }
    }
    if entities.is_empty() {
        entities = heuristic_entities(text);
    }

    let intent = reply.query_intent.trim();
    let language = reply
        .language
        .map(|l| l.trim().to_lowercase())
        .filter(|l| !l.is_empty())
        .unwrap_or_else(|| "en".to_string());

    QueryAnalysis {
        query: Query {
            text: text.to_string(),
            language,
            query_type: QueryType::from_label(&reply.query_type),
            intent: if intent.is_empty() {
                GENERIC_INTENT.to_string()
            } else {
                intent.to_string()
            },
            extracted_entities: entities,
            rewritten_text: None,
        },
        related_to_index: reply.is_related_to_index,
        confidence: reply.confidence.clamp(0.0, 1.0),
        reasoning: reply.reasoning,
    }
}

/// Keyword classification used when the model is unavailable
pub fn heuristic_analysis(text: &str) -> QueryAnalysis {
    let lower = format!(" {} ", text.to_lowercase());
    let query_type = heuristic_query_type(&lower);
    let intent = match query_type {
        QueryType::Procedural => "task",
        QueryType::Analytical => "clarification",
        _ => GENERIC_INTENT,
    };
    let realtime = REALTIME_MARKERS.iter().any(|m| lower.contains(m));

    QueryAnalysis {
        query: Query {
            text: text.to_string(),
            language: "en".to_string(),
            query_type,
            intent: intent.to_string(),
            extracted_entities: heuristic_entities(text),
            rewritten_text: None,
        },
        related_to_index: !realtime,
        confidence: 0.5,
        reasoning: format!("Keyword heuristic classified the query as {}", query_type),
    }
}

fn heuristic_query_type(padded_lower: &str) -> QueryType {
    if PROCEDURAL_MARKERS.iter().any(|m| padded_lower.contains(m)) {
        return QueryType::Procedural;
    }
    if ANALYTICAL_MARKERS.iter().any(|m| padded_lower.contains(m)) {
        return QueryType::Analytical;
    }
    let trimmed = padded_lower.trim_start();
    if FACTUAL_OPENERS
        .iter()
        .any(|o| trimmed.starts_with(&format!("{} ", o)))
    {
        return QueryType::Factual;
    }
    QueryType::Unknown
}

fn flush(run: &mut Vec<&str>, entities: &mut Vec<String>) {
    // Trailing connectors ("of", "the") belong to no entity
    while run.last().is_some_and(|w| is_stop_word(&w.to_lowercase())) {
        run.pop();
    }
    if !run.is_empty() {
        let entity = run.join(" ");
        if !entities.contains(&entity) {
            entities.push(entity);
        }
    }
    run.clear();
}

/// Capitalized runs and numbers; falls back to content terms
pub fn heuristic_entities(text: &str) -> Vec<String> {
    let mut entities: Vec<String> = Vec::new();
    let mut run: Vec<&str> = Vec::new();

    for (i, raw) in text.split_whitespace().enumerate() {
        let word = raw.trim_matches(|c: char| !c.is_alphanumeric());
        if word.is_empty() {
            flush(&mut run, &mut entities);
            continue;
        }

        let lower = word.to_lowercase();
        let capitalized = word.chars().next().is_some_and(char::is_uppercase);
        let numeric = word.chars().all(|c| c.is_ascii_digit());
        let connector = !run.is_empty() && matches!(lower.as_str(), "of" | "the" | "for" | "and");

        if numeric || (capitalized && !(i == 0 && is_stop_word(&lower))) || connector {
            run.push(word);
        } else {
            flush(&mut run, &mut entities);
        }

        if raw.ends_with(|c: char| matches!(c, ',' | '?' | '.' | ';' | ':' | '!')) {
            flush(&mut run, &mut entities);
        }
    }
    flush(&mut run, &mut entities);

    if entities.is_empty() {
        entities = tokenize(text).into_iter().take(5).collect();
    }
    entities
}

/// Rewrite without the model
pub fn fallback_rewrite(query: &Query, style: RewriteStyle) -> String {
    let terms = tokenize(&query.text);
    match style {
        RewriteStyle::Broaden => {
            if terms.is_empty() {
                query.text.clone()
            } else {
                terms.join(" ")
            }
        }
        RewriteStyle::EntityFocused => {
            let mut parts: Vec<String> = query.extracted_entities.clone();
            for term in terms {
                if !parts.iter().any(|p| p.to_lowercase().contains(&term)) {
                    parts.push(term);
                }
            }
            if parts.is_empty() {
                query.text.clone()
            } else {
                parts.join(" ")
            }
        }
    }
}
