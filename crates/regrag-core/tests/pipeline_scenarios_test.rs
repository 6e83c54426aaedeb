//! End-to-end pipeline scenarios against deterministic stubs
//!
//! Tests:
//! 1. Answer grounded in the corpus
//! 2. Topic absent from the corpus (decline after the retry budget)
//! 3. Web search fallback after the retry budget, with and without a usable
//!    result, and web-first routing
//! 4. Regeneration after a failed validation, and best-draft retention
//! 5. Empty input and cancellation
//! 6. Capability timeouts absorbed by the state machine
//! 7. Concurrent runs over shared capabilities

mod common;

use async_trait::async_trait;
use common::*;
use regrag_core::{
    ChatMessage, LLMClient, Pipeline, PipelineConfig, QueryRequest, QueryType, RagError, Result,
    RetrievalStrategy,
};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

const MACKEREL_QUESTION: &str = "What is the mackerel fishing quota?";
const MACKEREL_ANSWER: &str = r#"{"answer": "The mackerel fishing quota is 500 tonnes per vessel [S1].", "key_concepts": ["mackerel quota"], "suggested_followup": []}"#;

struct Harness {
    llm: Arc<ScriptedLlm>,
    dense: Arc<CountingDense>,
    lexical: Arc<CountingLexical>,
    web: Option<Arc<CannedWeb>>,
}

impl Harness {
    fn new(llm: ScriptedLlm) -> Self {
        Self {
            llm: Arc::new(llm),
            dense: Arc::new(CountingDense::new(Arc::new(vector_index()))),
            lexical: Arc::new(CountingLexical::new(Arc::new(bm25_index()))),
            web: None,
        }
    }

    fn with_web(mut self, web: CannedWeb) -> Self {
        self.web = Some(Arc::new(web));
        self
    }

    fn pipeline(&self, config: PipelineConfig) -> Pipeline {
        let pipeline = Pipeline::new(
            config,
            self.llm.clone(),
            Arc::new(HashEmbedder),
            self.dense.clone(),
            self.lexical.clone(),
        )
        .unwrap();

        match &self.web {
            Some(web) => pipeline.with_web_search(web.clone()),
            None => pipeline,
        }
    }
}

fn mackerel_analysis() -> String {
    FACTUAL_ANALYSIS.replace("Ministry of Finance", "mackerel quota")
}

#[tokio::test]
async fn test_answer_grounded_in_corpus() {
    let harness = Harness::new(ScriptedLlm::new());
    let pipeline = harness.pipeline(PipelineConfig::default());

    let response = pipeline
        .run(&QueryRequest::new(MINISTRY_QUESTION), &CancellationToken::new())
        .await
        .unwrap();

    assert!(response.answer.contains("1921"));
    assert_eq!(response.query_type, QueryType::Factual);
    assert!(!response.supporting_evidence.is_empty());
    assert!(response.supporting_evidence[0].contains("Ministry of Finance History"));
    assert!(response.confidence_score >= 0.7);
    assert!(!response.validation.has_hallucinations);
    assert_eq!(response.metadata.sources_used, 1);
    assert_eq!(response.metadata.retrieval_attempts, 1);
    assert_eq!(response.metadata.generation_attempts, 1);
    assert_eq!(
        response.metadata.retrieval_strategy,
        Some(RetrievalStrategy::Dense)
    );
    assert!(!response.metadata.web_search_used);
    assert!(response.source_documents.is_none());
    assert!(response.processing_time >= 0.0);
}

#[tokio::test]
async fn test_source_documents_on_request() {
    let harness = Harness::new(ScriptedLlm::new());
    let pipeline = harness.pipeline(PipelineConfig::default());

    let response = pipeline
        .run(
            &QueryRequest::new(MINISTRY_QUESTION).with_source_documents(),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    let documents = response.source_documents.unwrap();
    assert_eq!(documents.len(), 1);
    assert_eq!(documents[0].source_id, "ministry-history");
    assert!(CORPUS[0].2.contains(&documents[0].evidence_span));
}

#[tokio::test]
async fn test_absent_topic_declines_after_retry_budget() {
    let llm = ScriptedLlm::new()
        .with_analysis(&mackerel_analysis())
        .accepting(&["500 tonnes"]);
    let harness = Harness::new(llm);
    let config = PipelineConfig::default();
    let pipeline = harness.pipeline(config.clone());

    let response = pipeline
        .run(&QueryRequest::new(MACKEREL_QUESTION), &CancellationToken::new())
        .await
        .unwrap();

    assert!(response.answer.contains("couldn't find any relevant documents"));
    assert!(response.confidence_score < config.min_confidence_score);
    assert_eq!(response.metadata.sources_used, 0);
    assert!(response.supporting_evidence.is_empty());
    assert_eq!(response.suggested_followup.len(), 2);

    // Every attempt consults the dense index, once
    assert_eq!(
        response.metadata.retrieval_attempts,
        config.max_retrieval_attempts
    );
    assert_eq!(harness.dense.count(), config.max_retrieval_attempts as usize);
    assert_eq!(
        harness.llm.calls(Role::Rewriter),
        config.max_retrieval_attempts as usize - 1
    );
    // The decline needs no model call
    assert_eq!(harness.llm.calls(Role::Generator), 0);
}

#[tokio::test]
async fn test_web_fallback_after_retry_budget() {
    let llm = ScriptedLlm::new()
        .with_analysis(&mackerel_analysis())
        .accepting(&["500 tonnes"])
        .with_answers(&[MACKEREL_ANSWER]);
    let harness = Harness::new(llm).with_web(CannedWeb::mackerel());
    let config = PipelineConfig::default();
    let pipeline = harness.pipeline(config.clone());

    let response = pipeline
        .run(&QueryRequest::new(MACKEREL_QUESTION), &CancellationToken::new())
        .await
        .unwrap();

    let web = harness.web.as_ref().unwrap();
    assert_eq!(harness.dense.count(), config.max_retrieval_attempts as usize);
    assert_eq!(web.count(), 1);
    assert!(response.metadata.web_search_used);
    assert!(response.answer.contains("500 tonnes"));
    // 0.9 quality discounted for external evidence
    assert!((response.confidence_score - 0.9 * config.web_search_discount).abs() < 1e-9);
    assert!(response.supporting_evidence[0].contains("Mackerel quota"));
}

#[tokio::test]
async fn test_declines_when_web_search_finds_nothing_relevant() {
    let llm = ScriptedLlm::new()
        .with_analysis(&mackerel_analysis())
        .accepting(&["500 tonnes"]);
    let harness = Harness::new(llm).with_web(CannedWeb::off_topic());
    let config = PipelineConfig::default();
    let pipeline = harness.pipeline(config.clone());

    let response = pipeline
        .run(&QueryRequest::new(MACKEREL_QUESTION), &CancellationToken::new())
        .await
        .unwrap();

    assert!(response.answer.contains("couldn't find any relevant documents"));
    assert!(response.confidence_score < config.min_confidence_score);
    assert_eq!(response.metadata.sources_used, 0);
    assert!(response.supporting_evidence.is_empty());

    assert_eq!(harness.dense.count(), config.max_retrieval_attempts as usize);
    assert_eq!(harness.web.as_ref().unwrap().count(), 1);
    // The search ran even though nothing it found was accepted
    assert!(response.metadata.web_search_used);
    assert!(response
        .metadata
        .confidence_factors
        .iter()
        .any(|f| f.contains("Web search returned no usable evidence")));
    assert_eq!(harness.llm.calls(Role::Generator), 0);
}

#[tokio::test]
async fn test_unrelated_query_goes_to_web_first() {
    let analysis = mackerel_analysis().replace(
        "\"is_related_to_index\": true",
        "\"is_related_to_index\": false",
    );
    let llm = ScriptedLlm::new()
        .with_analysis(&analysis)
        .accepting(&["500 tonnes"])
        .with_answers(&[MACKEREL_ANSWER]);
    let harness = Harness::new(llm).with_web(CannedWeb::mackerel());
    let pipeline = harness.pipeline(PipelineConfig::default());

    let response = pipeline
        .run(&QueryRequest::new(MACKEREL_QUESTION), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(harness.web.as_ref().unwrap().count(), 1);
    assert_eq!(harness.dense.count(), 0);
    assert_eq!(response.metadata.retrieval_attempts, 0);
    assert_eq!(
        response.metadata.retrieval_strategy,
        Some(RetrievalStrategy::External)
    );
}

#[tokio::test]
async fn test_regenerates_after_failed_validation() {
    let llm = ScriptedLlm::new().with_validations(&[REJECTING_VALIDATION, APPROVING_VALIDATION]);
    let harness = Harness::new(llm);
    let pipeline = harness.pipeline(PipelineConfig::default());

    let response = pipeline
        .run(&QueryRequest::new(MINISTRY_QUESTION), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(response.metadata.generation_attempts, 2);
    assert_eq!(harness.llm.calls(Role::Generator), 2);
    assert!(!response.validation.has_hallucinations);
    assert!(response.confidence_score >= 0.7);
}

#[tokio::test]
async fn test_generation_budget_exhausted_lowers_confidence() {
    let llm = ScriptedLlm::new().with_validations(&[REJECTING_VALIDATION]);
    let harness = Harness::new(llm);
    let config = PipelineConfig::default();
    let pipeline = harness.pipeline(config.clone());

    let response = pipeline
        .run(&QueryRequest::new(MINISTRY_QUESTION), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(
        response.metadata.generation_attempts,
        config.max_generation_attempts
    );
    assert!(response.validation.has_hallucinations);
    assert!(response.confidence_score < config.min_confidence_score);
    assert!(!response.answer.is_empty());
}

#[tokio::test]
async fn test_empty_query_rejected_before_any_capability() {
    let harness = Harness::new(ScriptedLlm::new());
    let pipeline = harness.pipeline(PipelineConfig::default());

    let result = pipeline
        .run(&QueryRequest::new("   \n\t"), &CancellationToken::new())
        .await;

    assert!(matches!(result, Err(RagError::Analysis(_))));
    assert_eq!(harness.llm.calls(Role::Analyzer), 0);
    assert_eq!(harness.dense.count(), 0);
    assert_eq!(harness.lexical.count(), 0);
}

#[tokio::test]
async fn test_cancelled_before_start() {
    let harness = Harness::new(ScriptedLlm::new());
    let pipeline = harness.pipeline(PipelineConfig::default());
    let token = CancellationToken::new();
    token.cancel();

    let result = pipeline.run(&QueryRequest::new(MINISTRY_QUESTION), &token).await;
    assert!(matches!(result, Err(RagError::Cancelled)));
    assert_eq!(harness.llm.calls(Role::Analyzer), 0);
}

/// Cancels the run the first time a passage is graded
struct CancelOnGrade {
    inner: Arc<ScriptedLlm>,
    token: CancellationToken,
}

#[async_trait]
impl LLMClient for CancelOnGrade {
    async fn chat_completion(&self, messages: Vec<ChatMessage>) -> Result<String> {
        if messages[0].content.contains("document grader") {
            self.token.cancel();
        }
        self.inner.chat_completion(messages).await
    }

    fn model_name(&self) -> &str {
        "cancel-on-grade"
    }
}

#[tokio::test]
async fn test_cancelled_mid_run_returns_no_response() {
    let inner = Arc::new(ScriptedLlm::new());
    let token = CancellationToken::new();
    let llm = Arc::new(CancelOnGrade {
        inner: inner.clone(),
        token: token.clone(),
    });
    let pipeline = Pipeline::new(
        PipelineConfig::default(),
        llm,
        Arc::new(HashEmbedder),
        Arc::new(vector_index()),
        Arc::new(bm25_index()),
    )
    .unwrap();

    let result = pipeline.run(&QueryRequest::new(MINISTRY_QUESTION), &token).await;

    assert!(matches!(result, Err(RagError::Cancelled)));
    // Stopped at the next stage boundary
    assert_eq!(inner.calls(Role::Generator), 0);
}

#[tokio::test(start_paused = true)]
async fn test_dense_timeout_recovers_through_hybrid() {
    let llm = Arc::new(ScriptedLlm::new());
    let lexical = Arc::new(CountingLexical::new(Arc::new(bm25_index())));
    let config = PipelineConfig {
        capability_timeout_secs: 2,
        ..PipelineConfig::default()
    };
    let pipeline = Pipeline::new(
        config,
        llm.clone(),
        Arc::new(HashEmbedder),
        Arc::new(HangingDense),
        lexical.clone(),
    )
    .unwrap();

    let response = pipeline
        .run(&QueryRequest::new(MINISTRY_QUESTION), &CancellationToken::new())
        .await
        .unwrap();

    // Attempt 1 (dense) timed out; attempt 2 escalated to hybrid
    assert_eq!(response.metadata.retrieval_attempts, 2);
    assert_eq!(
        response.metadata.retrieval_strategy,
        Some(RetrievalStrategy::Hybrid)
    );
    assert_eq!(lexical.count(), 1);
    assert!(response.answer.contains("1921"));
}

#[tokio::test(start_paused = true)]
async fn test_hanging_model_still_yields_response() {
    let harness = Harness::new(ScriptedLlm::hanging());
    let config = PipelineConfig {
        capability_timeout_secs: 2,
        ..PipelineConfig::default()
    };
    let pipeline = harness.pipeline(config.clone());

    let response = pipeline
        .run(&QueryRequest::new(MINISTRY_QUESTION), &CancellationToken::new())
        .await
        .unwrap();

    // Heuristic analysis and lexical grading carried the run; generation never returned
    assert_eq!(
        response.metadata.generation_attempts,
        config.max_generation_attempts
    );
    assert_eq!(response.confidence_score, 0.0);
    assert_eq!(response.metadata.sources_used, 0);
    assert!(!response.validation.answers_question);
}

#[tokio::test]
async fn test_classification_is_stable_across_runs() {
    let harness = Harness::new(ScriptedLlm::new());
    let pipeline = harness.pipeline(PipelineConfig::default());
    let token = CancellationToken::new();

    let first = pipeline
        .run(&QueryRequest::new(MINISTRY_QUESTION), &token)
        .await
        .unwrap();
    let second = pipeline
        .run(&QueryRequest::new(MINISTRY_QUESTION), &token)
        .await
        .unwrap();

    assert_eq!(first.query_type, second.query_type);
    assert_eq!(first.query_intent, second.query_intent);
    assert_eq!(first.answer, second.answer);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_runs_share_capabilities() {
    let harness = Harness::new(ScriptedLlm::new());
    let pipeline = Arc::new(harness.pipeline(PipelineConfig::default()));

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let pipeline = pipeline.clone();
            tokio::spawn(async move {
                pipeline
                    .run(&QueryRequest::new(MINISTRY_QUESTION), &CancellationToken::new())
                    .await
            })
        })
        .collect();

    for handle in handles {
        let response = handle.await.unwrap().unwrap();
        assert!(response.answer.contains("1921"));
        assert_eq!(response.metadata.retrieval_attempts, 1);
    }

    assert_eq!(harness.llm.calls(Role::Analyzer), 8);
    assert_eq!(harness.dense.count(), 8);
}
