//! Deterministic capability stubs shared by the integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use regrag_core::search::tokenize;
use regrag_core::{
    Bm25Index, ChatMessage, DenseIndex, Embedder, IndexHit, LLMClient, LexicalIndex,
    PassageMetadata, RagError, Result, VectorIndex, WebResult, WebSearch,
};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const DIMENSIONS: usize = 256;

/// The regulatory corpus used by the scenarios
pub const CORPUS: &[(&str, &str, &str)] = &[
    (
        "ministry-history",
        "Ministry of Finance History",
        "The Ministry of Finance was founded in 1921. It supervises public revenue and the national budget.",
    ),
    (
        "capital-rules",
        "Capital Requirements Regulation",
        "Banks must hold a capital conservation buffer of 2.5 percent of risk-weighted assets.",
    ),
    (
        "payment-licensing",
        "Payment Services Act",
        "A payment institution must obtain a licence from the central bank before offering payment services.",
    ),
];

pub const MINISTRY_QUESTION: &str = "When was the Ministry of Finance founded?";
pub const MINISTRY_ANSWER: &str = r#"{"answer": "The Ministry of Finance was founded in 1921 [S1].", "key_concepts": ["Ministry of Finance"], "suggested_followup": ["What does the Ministry of Finance supervise?"]}"#;

pub const FACTUAL_ANALYSIS: &str = r#"{"is_related_to_index": true, "query_type": "factual", "query_entities": ["Ministry of Finance"], "query_intent": "information_seeking", "language": "en", "confidence": 0.9, "reasoning": "Asks for a date"}"#;

pub const APPROVING_VALIDATION: &str = r#"{"has_hallucinations": false, "answers_question": true, "coverage": 1.0, "relevance": 0.9, "completeness": 0.9, "improvement_needed": [], "reasoning": "Every claim is supported."}"#;

pub const REJECTING_VALIDATION: &str = r#"{"has_hallucinations": true, "answers_question": true, "coverage": 0.5, "relevance": 0.9, "completeness": 0.9, "improvement_needed": ["Drop the unsupported claim"], "reasoning": "One claim is unsupported."}"#;

/// Which pipeline component a chat call came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Analyzer,
    Rewriter,
    WebQuery,
    Grader,
    Generator,
    Validator,
    Unknown,
}

impl Role {
    fn of(system_prompt: &str) -> Self {
        if system_prompt.contains("query analyzer") {
            Self::Analyzer
        } else if system_prompt.contains("rewrite search queries") {
            Self::Rewriter
        } else if system_prompt.contains("web search queries") {
            Self::WebQuery
        } else if system_prompt.contains("document grader") {
            Self::Grader
        } else if system_prompt.contains("strictly from supplied evidence") {
            Self::Generator
        } else if system_prompt.contains("answer validator") {
            Self::Validator
        } else {
            Self::Unknown
        }
    }
}

/// Language model scripted per component.
///
/// The grader accepts passages containing one of `accept_markers`. Answer and
/// validation queues replay in order and repeat their last entry.
pub struct ScriptedLlm {
    analysis: String,
    accept_markers: Vec<String>,
    answers: Mutex<VecDeque<String>>,
    validations: Mutex<VecDeque<String>>,
    calls: Mutex<Vec<Role>>,
    hang: bool,
}

impl ScriptedLlm {
    pub fn new() -> Self {
        Self {
            analysis: FACTUAL_ANALYSIS.to_string(),
            accept_markers: vec!["1921".to_string()],
            answers: Mutex::new(VecDeque::from([MINISTRY_ANSWER.to_string()])),
            validations: Mutex::new(VecDeque::from([APPROVING_VALIDATION.to_string()])),
            calls: Mutex::new(Vec::new()),
            hang: false,
        }
    }

    /// A model that never answers
    pub fn hanging() -> Self {
        Self {
            hang: true,
            ..Self::new()
        }
    }

    pub fn with_analysis(mut self, analysis: &str) -> Self {
        self.analysis = analysis.to_string();
        self
    }

    pub fn accepting(mut self, markers: &[&str]) -> Self {
        self.accept_markers = markers.iter().map(|m| m.to_string()).collect();
        self
    }

    pub fn with_answers(self, answers: &[&str]) -> Self {
        *self.answers.lock().unwrap() = answers.iter().map(|a| a.to_string()).collect();
        self
    }

    pub fn with_validations(self, validations: &[&str]) -> Self {
        *self.validations.lock().unwrap() = validations.iter().map(|v| v.to_string()).collect();
        self
    }

    pub fn calls(&self, role: Role) -> usize {
        self.calls.lock().unwrap().iter().filter(|r| **r == role).count()
    }

    fn replay(queue: &Mutex<VecDeque<String>>) -> String {
        let mut queue = queue.lock().unwrap();
        if queue.len() > 1 {
            queue.pop_front().unwrap_or_default()
        } else {
            queue.front().cloned().unwrap_or_default()
        }
    }

    fn grade(&self, prompt: &str) -> String {
        let passage = prompt.split("Passage").nth(1).unwrap_or_default();
        if self.accept_markers.iter().any(|m| passage.contains(m.as_str())) {
            r#"{"relevance_score": 0.9, "quality_score": 0.85, "evidence_span": ""}"#.to_string()
        } else {
            r#"{"relevance_score": 0.1, "quality_score": 0.4, "evidence_span": ""}"#.to_string()
        }
    }
}

#[async_trait]
impl LLMClient for ScriptedLlm {
    async fn chat_completion(&self, messages: Vec<ChatMessage>) -> Result<String> {
        let system = messages.first().map(|m| m.content.as_str()).unwrap_or_default();
        let user = messages.last().map(|m| m.content.as_str()).unwrap_or_default();
        let role = Role::of(system);
        self.calls.lock().unwrap().push(role);

        if self.hang {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }

        match role {
            Role::Analyzer => Ok(self.analysis.clone()),
            Role::Rewriter => Ok(r#"{"rewritten_query": "Ministry of Finance establishment year"}"#.to_string()),
            Role::WebQuery => Ok(r#"{"search_query": "mackerel fishing quota"}"#.to_string()),
            Role::Grader => Ok(self.grade(user)),
            Role::Generator => Ok(Self::replay(&self.answers)),
            Role::Validator => Ok(Self::replay(&self.validations)),
            Role::Unknown => Err(RagError::Llm("unscripted prompt".to_string())),
        }
    }

    fn model_name(&self) -> &str {
        "scripted"
    }
}

/// Bag-of-words embedding over hashed term buckets
pub struct HashEmbedder;

pub fn hash_embed(text: &str) -> Vec<f32> {
    let mut vector = vec![0.0f32; DIMENSIONS];
    for token in tokenize(text) {
        // FNV-1a
        let mut hash: u64 = 0xcbf29ce484222325;
        for byte in token.bytes() {
            hash ^= byte as u64;
            hash = hash.wrapping_mul(0x100000001b3);
        }
        vector[(hash % DIMENSIONS as u64) as usize] += 1.0;
    }

    let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > 0.0 {
        vector.iter_mut().for_each(|v| *v /= norm);
    }
    vector
}

#[async_trait]
impl Embedder for HashEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        Ok(hash_embed(text))
    }

    fn dimensions(&self) -> usize {
        DIMENSIONS
    }

    fn model_name(&self) -> &str {
        "fnv-bag-of-words"
    }
}

pub fn vector_index() -> VectorIndex {
    let mut index = VectorIndex::new();
    for (id, title, text) in CORPUS {
        index
            .add(*id, *text, PassageMetadata::titled(*title), hash_embed(text))
            .unwrap();
    }
    index
}

pub fn bm25_index() -> Bm25Index {
    let mut index = Bm25Index::new();
    for (id, title, text) in CORPUS {
        index.add(*id, *text, PassageMetadata::titled(*title));
    }
    index
}

/// Dense index wrapper counting queries
pub struct CountingDense {
    inner: Arc<dyn DenseIndex>,
    pub calls: AtomicUsize,
}

impl CountingDense {
    pub fn new(inner: Arc<dyn DenseIndex>) -> Self {
        Self {
            inner,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DenseIndex for CountingDense {
    async fn query(&self, vector: &[f32], k: usize) -> Result<Vec<IndexHit>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.query(vector, k).await
    }
}

/// Lexical index wrapper counting queries
pub struct CountingLexical {
    inner: Arc<dyn LexicalIndex>,
    pub calls: AtomicUsize,
}

impl CountingLexical {
    pub fn new(inner: Arc<dyn LexicalIndex>) -> Self {
        Self {
            inner,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LexicalIndex for CountingLexical {
    async fn query(&self, tokens: &[String], k: usize) -> Result<Vec<IndexHit>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.query(tokens, k).await
    }
}

/// Dense index that never returns
pub struct HangingDense;

#[async_trait]
impl DenseIndex for HangingDense {
    async fn query(&self, _vector: &[f32], _k: usize) -> Result<Vec<IndexHit>> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Ok(Vec::new())
    }
}

/// Web search returning fixed results and counting calls
pub struct CannedWeb {
    results: Vec<WebResult>,
    pub calls: AtomicUsize,
}

impl CannedWeb {
    pub fn new(results: Vec<WebResult>) -> Self {
        Self {
            results,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn mackerel() -> Self {
        Self::new(vec![WebResult {
            url: "https://fisheries.example/quota".to_string(),
            title: "Mackerel quota".to_string(),
            snippet: "The mackerel fishing quota is 500 tonnes per vessel.".to_string(),
        }])
    }

    /// Results that mention the topic but carry no answer
    pub fn off_topic() -> Self {
        Self::new(vec![WebResult {
            url: "https://news.example/harbour".to_string(),
            title: "Harbour festival".to_string(),
            snippet: "Fishing boats paraded through the harbour during the summer festival."
                .to_string(),
        }])
    }

    pub fn count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl WebSearch for CannedWeb {
    async fn search(&self, _query_text: &str) -> Result<Vec<WebResult>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.results.clone())
    }
}
