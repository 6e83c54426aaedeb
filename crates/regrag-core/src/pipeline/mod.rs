//! Retrieval-augmented answering pipeline
//!
//! Stages run as an explicit state machine:
//! analyze, retrieve, grade, (retry | web search | generate), validate,
//! (regenerate | respond). Capability failures are absorbed at each stage
//! boundary; only empty input and cancellation reach the caller as errors.

mod analyzer;
mod generator;
mod grader;
mod orchestrator;
mod retriever;
mod state;
mod types;
mod validator;
mod web_fallback;

pub use analyzer::{
    fallback_rewrite, heuristic_analysis, heuristic_entities, QueryAnalysis, QueryAnalyzer,
    RewriteStyle,
};
pub use generator::{is_decline, AnswerGenerator, DraftAnswer, DECLINE_ANSWER, DECLINE_FOLLOWUPS};
pub use grader::{lexical_grade, locate_span, DocumentGrader};
pub use orchestrator::{compute_confidence, Pipeline};
pub use retriever::{escalate_strategy, select_strategy, Retriever};
pub use state::{needs_regeneration, next_stage, PipelineState, Stage};
pub use types::*;
pub use validator::{check_grounding, combine_quality, AnswerValidator, GroundingReport};
pub use web_fallback::WebSearchFallback;

use crate::error::{Capability, RagError, Result};
use std::future::Future;
use std::time::Duration;

/// Run one capability call under a timeout.
///
/// Every failure comes back as a capability-class error.
pub(crate) async fn guarded<T, F>(capability: Capability, timeout: Duration, call: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(timeout, call).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) if e.is_capability_failure() => Err(e),
        Ok(Err(e)) => Err(RagError::capability(capability, e.to_string())),
        Err(_) => Err(RagError::Timeout {
            capability,
            secs: timeout.as_secs(),
        }),
    }
}
