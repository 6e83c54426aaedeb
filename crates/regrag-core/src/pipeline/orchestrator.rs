//! Request-level driver of the stage machine

use super::analyzer::QueryAnalyzer;
use super::generator::{AnswerGenerator, DraftAnswer};
use super::grader::DocumentGrader;
use super::retriever::{escalate_strategy, select_strategy, Retriever};
use super::state::{next_stage, PipelineState, Stage};
use super::types::{
    GradedEvidence, Query, QueryRequest, Response, ResponseMetadata, RetrievalStrategy,
    SourceDocument, ValidationResult,
};
use super::validator::AnswerValidator;
use super::web_fallback::WebSearchFallback;
use crate::config::PipelineConfig;
use crate::error::{RagError, Result};
use crate::llm::{Embedder, LLMClient};
use crate::search::{DenseIndex, LexicalIndex};
use crate::web::WebSearch;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

/// Returned when every generation attempt failed
const UNAVAILABLE_ANSWER: &str = "I'm sorry, but I couldn't generate an answer right now. Please try again later.";

/// Characters of each evidence span quoted in `supporting_evidence`
const QUOTE_CHARS: usize = 300;

/// Final confidence for a validated answer, in [0, 1]
pub fn compute_confidence(
    validation: &ValidationResult,
    external_evidence_used: bool,
    config: &PipelineConfig,
) -> f64 {
    let mut confidence = validation.quality_score;
    if external_evidence_used {
        confidence *= config.web_search_discount;
    }
    if validation.has_hallucinations || !validation.answers_question {
        confidence *= config.degraded_confidence_factor;
    }
    confidence.clamp(0.0, 1.0)
}

/// Self-correcting question answering over shared, read-only capabilities.
///
/// One `Pipeline` serves any number of concurrent `run` calls; each run owns
/// its own `PipelineState`.
pub struct Pipeline {
    config: PipelineConfig,
    analyzer: QueryAnalyzer,
    retriever: Retriever,
    grader: DocumentGrader,
    generator: AnswerGenerator,
    validator: AnswerValidator,
    web: Option<WebSearchFallback>,
}

impl Pipeline {
    pub fn new(
        config: PipelineConfig,
        llm: Arc<dyn LLMClient>,
        embedder: Arc<dyn Embedder>,
        dense: Arc<dyn DenseIndex>,
        lexical: Arc<dyn LexicalIndex>,
    ) -> Result<Self> {
        config.validate()?;
        let timeout = config.capability_timeout();

        Ok(Self {
            analyzer: QueryAnalyzer::new(llm.clone(), timeout),
            retriever: Retriever::new(embedder, dense, lexical, config.clone()),
            grader: DocumentGrader::new(
                llm.clone(),
                timeout,
                config.min_confidence_score,
                config.grading_concurrency,
                config.max_evidence_chars,
            ),
            generator: AnswerGenerator::new(llm.clone(), timeout, config.max_evidence_chars),
            validator: AnswerValidator::new(llm, timeout, config.grounding_overlap),
            web: None,
            config,
        })
    }

    /// Enable the web search fallback
    pub fn with_web_search(mut self, web: Arc<dyn WebSearch>) -> Self {
        self.web = Some(WebSearchFallback::new(web, self.config.capability_timeout()));
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Answer one question.
    ///
    /// Errors only for empty input (`Analysis`) or cancellation; every
    /// capability failure is absorbed and shows up as lower confidence.
    pub async fn run(&self, request: &QueryRequest, cancel: &CancellationToken) -> Result<Response> {
        let started = Instant::now();
        check_cancelled(cancel)?;

        let analysis = self.analyzer.analyze(&request.query).await?;
        let mut query = analysis.query;
        let mut state = PipelineState::new(self.web.is_some());
        state.related_to_index = analysis.related_to_index;

        tracing::info!(
            query_type = %query.query_type,
            intent = %query.intent,
            related_to_index = analysis.related_to_index,
            "Query analyzed"
        );

        let mut stage = next_stage(Stage::Analyze, &state, &self.config);
        while !stage.is_terminal() {
            check_cancelled(cancel)?;
            self.execute(stage, &mut query, &mut state).await;

            let next = next_stage(stage, &state, &self.config);
            tracing::info!(
                stage = %stage,
                next = %next,
                retrieval_attempts = state.retrieval_attempts,
                generation_attempts = state.generation_attempts,
                accepted = state.accepted_evidence.len(),
                "Stage complete"
            );
            stage = next;
        }

        check_cancelled(cancel)?;
        let response = self.respond(request, &query, state, started.elapsed());
        tracing::info!(
            confidence = response.confidence_score,
            sources = response.metadata.sources_used,
            secs = response.processing_time,
            "Query answered"
        );
        Ok(response)
    }

    async fn execute(&self, stage: Stage, query: &mut Query, state: &mut PipelineState) {
        match stage {
            Stage::Retrieve => {
                state.retrieval_attempts += 1;
                let strategy = select_strategy(query.query_type, state.strategy_hint);
                state.last_strategy = Some(strategy);
                state.retrieved = match self
                    .retriever
                    .retrieve(query, state.strategy_hint, state.retrieval_attempts)
                    .await
                {
                    Ok(passages) => passages,
                    Err(e) => {
                        tracing::warn!(error = %e, attempt = state.retrieval_attempts, "Retrieval failed");
                        Vec::new()
                    }
                };
            }
            Stage::Grade => {
                let passages = std::mem::take(&mut state.retrieved);
                let graded = self.grader.grade(query, &passages).await;
                state.record_grading(graded);
            }
            Stage::RetryRetrieve => {
                let rewrite = self.analyzer.rewrite(query, state.retrieval_attempts).await;
                tracing::debug!(rewrite = %rewrite, "Query rewritten");
                query.rewritten_text = Some(rewrite);

                let previous = state
                    .last_strategy
                    .unwrap_or_else(|| select_strategy(query.query_type, state.strategy_hint));
                state.strategy_hint = escalate_strategy(previous).into();
            }
            Stage::WebSearch => {
                let Some(web) = &self.web else {
                    return;
                };
                state.web_search_attempted = true;
                let web_query = self.analyzer.web_search_query(query).await;
                state.retrieved = match web.search_web(&web_query).await {
                    Ok(passages) => passages,
                    Err(e) => {
                        tracing::warn!(error = %e, "Web search failed");
                        Vec::new()
                    }
                };
            }
            Stage::Generate => {
                state.generation_attempts += 1;
                let feedback = if state.generation_attempts > 1 {
                    state.validation.clone()
                } else {
                    None
                };

                match self
                    .generator
                    .generate(query, &state.accepted_evidence, feedback.as_ref())
                    .await
                {
                    Ok(draft) => state.draft = Some(draft),
                    Err(e) => {
                        tracing::warn!(error = %e, attempt = state.generation_attempts, "Generation failed");
                        state.draft = None;
                        state.validation = Some(failed_generation(&e));
                    }
                }
            }
            Stage::Validate => {
                if let Some(draft) = &state.draft {
                    let validation = self
                        .validator
                        .validate(query, &draft.answer, &state.accepted_evidence)
                        .await;
                    state.record_validation(validation);
                }
            }
            Stage::RetryGenerate => {
                let remarks = state
                    .validation
                    .as_ref()
                    .map_or(0, |v| v.improvement_needed.len());
                tracing::debug!(remarks, "Regenerating under strict grounding");
            }
            Stage::Analyze | Stage::Respond => {}
        }
    }

    fn respond(
        &self,
        request: &QueryRequest,
        query: &Query,
        mut state: PipelineState,
        elapsed: Duration,
    ) -> Response {
        let (draft, validation) = match state.best.take() {
            Some(best) => best,
            None => {
                let validation = state
                    .validation
                    .take()
                    .unwrap_or_else(|| failed_generation(&RagError::Generation("no draft".to_string())));
                let draft = DraftAnswer {
                    answer: UNAVAILABLE_ANSWER.to_string(),
                    key_concepts: Vec::new(),
                    suggested_followup: Vec::new(),
                    declined: true,
                };
                (draft, validation)
            }
        };

        let used: &[GradedEvidence] = if draft.declined {
            &[]
        } else {
            &state.accepted_evidence
        };

        // Metadata reports the search ran; only accepted web evidence is discounted
        let web_search_used = state.web_search_attempted;
        let external_used = used
            .iter()
            .any(|e| e.passage.strategy == RetrievalStrategy::External);
        let confidence = compute_confidence(&validation, external_used, &self.config);

        let supporting_evidence = used
            .iter()
            .enumerate()
            .map(|(i, e)| {
                format!(
                    "[S{}] {}: \"{}\"",
                    i + 1,
                    e.passage.label(),
                    quote(&e.evidence_span, QUOTE_CHARS)
                )
            })
            .collect();

        let sources_used = used
            .iter()
            .map(|e| e.passage.source_id.as_str())
            .collect::<HashSet<_>>()
            .len();

        let key_concepts = if draft.key_concepts.is_empty() {
            query.extracted_entities.clone()
        } else {
            draft.key_concepts.clone()
        };

        let confidence_factors =
            self.confidence_factors(&state, &validation, used, sources_used, external_used);

        let retrieval_strategy = if external_used && state.last_strategy.is_none() {
            Some(RetrievalStrategy::External)
        } else {
            state.last_strategy
        };

        let source_documents = request
            .include_source_documents
            .then(|| used.iter().map(SourceDocument::from).collect());

        Response {
            answer: draft.answer,
            supporting_evidence,
            confidence_score: confidence,
            query_type: query.query_type,
            query_intent: query.intent.clone(),
            processing_time: elapsed.as_secs_f64(),
            metadata: ResponseMetadata {
                sources_used,
                key_concepts,
                confidence_factors,
                web_search_used,
                retrieval_attempts: state.retrieval_attempts,
                generation_attempts: state.generation_attempts,
                retrieval_strategy,
            },
            suggested_followup: draft.suggested_followup,
            validation,
            source_documents,
        }
    }

    fn confidence_factors(
        &self,
        state: &PipelineState,
        validation: &ValidationResult,
        used: &[GradedEvidence],
        sources_used: usize,
        external_used: bool,
    ) -> Vec<String> {
        let mut factors = Vec::new();

        if used.is_empty() {
            factors.push("No accepted evidence".to_string());
        } else {
            factors.push(format!(
                "{} accepted passage(s) from {} source(s)",
                used.len(),
                sources_used
            ));
        }
        factors.push(format!("Validation quality {:.2}", validation.quality_score));

        if external_used {
            factors.push(format!(
                "External web evidence (discount {:.2})",
                self.config.web_search_discount
            ));
        } else if state.web_search_attempted {
            factors.push("Web search returned no usable evidence".to_string());
        }
        if validation.has_hallucinations {
            factors.push("Unsupported claims detected".to_string());
        }
        if !validation.answers_question {
            factors.push("Question not fully answered".to_string());
        }
        if state.retrieval_attempts > 1 {
            factors.push(format!("{} retrieval attempts", state.retrieval_attempts));
        }
        if state.generation_attempts > 1 {
            factors.push(format!("{} generation attempts", state.generation_attempts));
        }
        factors
    }
}

fn check_cancelled(cancel: &CancellationToken) -> Result<()> {
    if cancel.is_cancelled() {
        tracing::info!("Pipeline run cancelled");
        Err(RagError::Cancelled)
    } else {
        Ok(())
    }
}

fn failed_generation(error: &RagError) -> ValidationResult {
    ValidationResult {
        has_hallucinations: false,
        answers_question: false,
        quality_score: 0.0,
        improvement_needed: vec!["Answer generation failed; try again".to_string()],
        reasoning: error.to_string(),
    }
}

fn quote(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", text[..idx].trim_end()),
        None => text.to_string(),
    }
}
