//! Pipeline stages and the transition function between them
//!
//! `next_stage` is pure: it only reads the accumulated state, so every
//! routing decision can be tested without running a capability.

use super::generator::DraftAnswer;
use super::types::{
    GradedEvidence, RetrievalStrategy, RetrievedPassage, StrategyHint, ValidationResult,
};
use crate::config::PipelineConfig;
use std::cmp::Ordering;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Analyze,
    Retrieve,
    Grade,
    RetryRetrieve,
    WebSearch,
    Generate,
    Validate,
    RetryGenerate,
    Respond,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Analyze => "analyze",
            Self::Retrieve => "retrieve",
            Self::Grade => "grade",
            Self::RetryRetrieve => "retry_retrieve",
            Self::WebSearch => "web_search",
            Self::Generate => "generate",
            Self::Validate => "validate",
            Self::RetryGenerate => "retry_generate",
            Self::Respond => "respond",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Respond)
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything one request accumulates on its way through the stages.
///
/// Owned by a single run; never shared between requests.
#[derive(Debug, Clone, Default)]
pub struct PipelineState {
    pub related_to_index: bool,
    pub web_search_available: bool,
    pub web_search_attempted: bool,
    pub retrieval_attempts: u32,
    pub generation_attempts: u32,
    pub strategy_hint: StrategyHint,
    pub last_strategy: Option<RetrievalStrategy>,
    /// Passages from the latest retrieval or web search, not yet graded
    pub retrieved: Vec<RetrievedPassage>,
    /// Grading output of the latest retrieval or web search
    pub graded: Vec<GradedEvidence>,
    /// Accepted evidence across all attempts, best first
    pub accepted_evidence: Vec<GradedEvidence>,
    pub draft: Option<DraftAnswer>,
    pub validation: Option<ValidationResult>,
    /// Best validated draft so far
    pub best: Option<(DraftAnswer, ValidationResult)>,
}

impl PipelineState {
    pub fn new(web_search_available: bool) -> Self {
        Self {
            web_search_available,
            related_to_index: true,
            ..Self::default()
        }
    }

    /// Fold a grading round into the state.
    ///
    /// Accepted items join the running evidence set unless the same span of
    /// the same source is already there.
    pub fn record_grading(&mut self, graded: Vec<GradedEvidence>) {
        for item in graded.iter().filter(|g| g.accepted) {
            let duplicate = self.accepted_evidence.iter().any(|e| {
                e.passage.source_id == item.passage.source_id
                    && e.evidence_span == item.evidence_span
            });
            if !duplicate {
                self.accepted_evidence.push(item.clone());
            }
        }
        self.accepted_evidence.sort_by(|a, b| {
            b.relevance_score
                .partial_cmp(&a.relevance_score)
                .unwrap_or(Ordering::Equal)
        });
        self.graded = graded;
    }

    /// Store a validated draft, keeping the best one seen.
    ///
    /// Hallucination-free beats higher quality; ties keep the earlier draft.
    pub fn record_validation(&mut self, validation: ValidationResult) {
        if let Some(draft) = self.draft.clone() {
            let replace = match &self.best {
                None => true,
                Some((_, best)) => rank(&validation) > rank(best),
            };
            if replace {
                self.best = Some((draft, validation.clone()));
            }
        }
        self.validation = Some(validation);
    }

    pub fn web_search_remaining(&self) -> bool {
        self.web_search_available && !self.web_search_attempted
    }

    fn latest_draft_declined(&self) -> bool {
        self.draft.as_ref().is_some_and(|d| d.declined)
    }
}

fn rank(validation: &ValidationResult) -> (bool, u64) {
    // Quality in fixed-point so the tuple is totally ordered
    let quality = (validation.quality_score.clamp(0.0, 1.0) * 1_000_000.0).round() as u64;
    (!validation.has_hallucinations, quality)
}

/// Whether a validation outcome should trigger another generation attempt
pub fn needs_regeneration(validation: &ValidationResult, config: &PipelineConfig) -> bool {
    validation.has_hallucinations || validation.quality_score < config.min_confidence_score
}

/// The stage after `stage`, given what the run has accumulated
pub fn next_stage(stage: Stage, state: &PipelineState, config: &PipelineConfig) -> Stage {
    match stage {
        Stage::Analyze => {
            if !state.related_to_index && state.web_search_remaining() {
                Stage::WebSearch
            } else {
                Stage::Retrieve
            }
        }
        Stage::Retrieve => Stage::Grade,
        Stage::Grade => {
            if state.accepted_evidence.len() >= config.min_accepted_evidence {
                Stage::Generate
            } else if state.retrieval_attempts == 0 {
                // Web evidence fell short before the corpus was tried
                Stage::Retrieve
            } else if state.retrieval_attempts < config.max_retrieval_attempts {
                Stage::RetryRetrieve
            } else if state.web_search_remaining() {
                Stage::WebSearch
            } else {
                Stage::Generate
            }
        }
        Stage::RetryRetrieve => Stage::Retrieve,
        Stage::WebSearch => Stage::Grade,
        Stage::Generate => Stage::Validate,
        Stage::Validate => {
            let retry = state
                .validation
                .as_ref()
                .is_some_and(|v| needs_regeneration(v, config))
                && !state.latest_draft_declined()
                && state.generation_attempts < config.max_generation_attempts;
            if retry {
                Stage::RetryGenerate
            } else {
                Stage::Respond
            }
        }
        Stage::RetryGenerate => Stage::Generate,
        Stage::Respond => Stage::Respond,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::PassageMetadata;

    fn evidence(id: &str, relevance: f64) -> GradedEvidence {
        GradedEvidence {
            passage: RetrievedPassage {
                source_id: id.to_string(),
                text: format!("{} text", id),
                raw_score: relevance,
                strategy: RetrievalStrategy::Dense,
                metadata: PassageMetadata::default(),
            },
            relevance_score: relevance,
            quality_score: 0.5,
            evidence_span: format!("{} text", id),
            accepted: relevance >= 0.7,
        }
    }

    fn validation(hallucinations: bool, quality: f64) -> ValidationResult {
        ValidationResult {
            has_hallucinations: hallucinations,
            answers_question: true,
            quality_score: quality,
            improvement_needed: vec![],
            reasoning: String::new(),
        }
    }

    fn draft(answer: &str) -> DraftAnswer {
        DraftAnswer {
            answer: answer.to_string(),
            key_concepts: vec![],
            suggested_followup: vec![],
            declined: false,
        }
    }

    #[test]
    fn test_analyze_routes_unrelated_queries_to_web() {
        let config = PipelineConfig::default();
        let mut state = PipelineState::new(true);
        assert_eq!(next_stage(Stage::Analyze, &state, &config), Stage::Retrieve);

        state.related_to_index = false;
        assert_eq!(next_stage(Stage::Analyze, &state, &config), Stage::WebSearch);

        state.web_search_available = false;
        assert_eq!(next_stage(Stage::Analyze, &state, &config), Stage::Retrieve);
    }

    #[test]
    fn test_grade_retry_budget_then_web_then_generate() {
        let config = PipelineConfig::default();
        let mut state = PipelineState::new(true);

        for attempt in 1..config.max_retrieval_attempts {
            state.retrieval_attempts = attempt;
            assert_eq!(next_stage(Stage::Grade, &state, &config), Stage::RetryRetrieve);
        }

        state.retrieval_attempts = config.max_retrieval_attempts;
        assert_eq!(next_stage(Stage::Grade, &state, &config), Stage::WebSearch);

        state.web_search_attempted = true;
        assert_eq!(next_stage(Stage::Grade, &state, &config), Stage::Generate);
    }

    #[test]
    fn test_web_first_falls_back_to_corpus() {
        let config = PipelineConfig::default();
        let mut state = PipelineState::new(true);
        state.web_search_attempted = true;
        assert_eq!(next_stage(Stage::Grade, &state, &config), Stage::Retrieve);
    }

    #[test]
    fn test_accepted_evidence_goes_to_generate() {
        let config = PipelineConfig::default();
        let mut state = PipelineState::new(false);
        state.retrieval_attempts = 1;
        state.record_grading(vec![evidence("a", 0.9), evidence("b", 0.2)]);
        assert_eq!(state.accepted_evidence.len(), 1);
        assert_eq!(next_stage(Stage::Grade, &state, &config), Stage::Generate);
    }

    #[test]
    fn test_record_grading_dedups_and_sorts() {
        let mut state = PipelineState::new(false);
        state.record_grading(vec![evidence("a", 0.8)]);
        state.record_grading(vec![evidence("a", 0.8), evidence("b", 0.95)]);
        let ids: Vec<&str> = state
            .accepted_evidence
            .iter()
            .map(|e| e.passage.source_id.as_str())
            .collect();
        assert_eq!(ids, vec!["b", "a"]);
        assert_eq!(state.graded.len(), 2);
    }

    #[test]
    fn test_validate_regenerates_within_budget() {
        let config = PipelineConfig::default();
        let mut state = PipelineState::new(false);
        state.draft = Some(draft("x"));
        state.generation_attempts = 1;
        state.record_validation(validation(true, 0.9));
        assert_eq!(next_stage(Stage::Validate, &state, &config), Stage::RetryGenerate);

        state.generation_attempts = config.max_generation_attempts;
        assert_eq!(next_stage(Stage::Validate, &state, &config), Stage::Respond);
    }

    #[test]
    fn test_declined_draft_is_not_regenerated() {
        let config = PipelineConfig::default();
        let mut state = PipelineState::new(false);
        state.draft = Some(DraftAnswer::decline());
        state.generation_attempts = 1;
        state.record_validation(validation(false, 0.0));
        assert_eq!(next_stage(Stage::Validate, &state, &config), Stage::Respond);
    }

    #[test]
    fn test_best_draft_retained() {
        let mut state = PipelineState::new(false);
        state.draft = Some(draft("first"));
        state.record_validation(validation(false, 0.6));
        state.draft = Some(draft("second"));
        state.record_validation(validation(true, 0.95));
        state.draft = Some(draft("third"));
        state.record_validation(validation(false, 0.6));

        let (best, _) = state.best.as_ref().unwrap();
        assert_eq!(best.answer, "first");
    }
}
