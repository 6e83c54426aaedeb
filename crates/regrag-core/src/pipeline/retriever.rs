//! Retrieval strategy selection and the dense, sparse and hybrid executors

use super::guarded;
use super::types::{Query, QueryType, RetrievalStrategy, RetrievedPassage, StrategyHint};
use crate::config::PipelineConfig;
use crate::error::{Capability, Result};
use crate::llm::Embedder;
use crate::search::{fuse, tokenize, DenseIndex, FusionWeights, IndexHit, LexicalIndex};
use std::sync::Arc;

/// Strategy for a query type, unless a hint forces one
pub fn select_strategy(query_type: QueryType, hint: StrategyHint) -> RetrievalStrategy {
    if let Some(forced) = hint.forced() {
        return forced;
    }
    match query_type {
        QueryType::Factual => RetrievalStrategy::Dense,
        QueryType::Analytical | QueryType::Procedural | QueryType::Unknown => {
            RetrievalStrategy::Hybrid
        }
    }
}

/// Strategy for the next attempt after `previous` came up short
pub fn escalate_strategy(previous: RetrievalStrategy) -> RetrievalStrategy {
    match previous {
        RetrievalStrategy::Dense | RetrievalStrategy::Sparse | RetrievalStrategy::External => {
            RetrievalStrategy::Hybrid
        }
        RetrievalStrategy::Hybrid => RetrievalStrategy::Hybrid,
    }
}

/// Executes retrieval against the shared, read-only indexes
pub struct Retriever {
    embedder: Arc<dyn Embedder>,
    dense: Arc<dyn DenseIndex>,
    lexical: Arc<dyn LexicalIndex>,
    config: PipelineConfig,
}

impl Retriever {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        dense: Arc<dyn DenseIndex>,
        lexical: Arc<dyn LexicalIndex>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            embedder,
            dense,
            lexical,
            config,
        }
    }

    /// Retrieve passages for one (1-based) attempt.
    ///
    /// Nothing clearing the score floor is an empty result, not an error.
    /// Hybrid succeeds if either branch does.
    pub async fn retrieve(
        &self,
        query: &Query,
        hint: StrategyHint,
        attempt: u32,
    ) -> Result<Vec<RetrievedPassage>> {
        let strategy = select_strategy(query.query_type, hint);
        let k = self.config.k_for_attempt(attempt);
        let text = query.effective_text();

        tracing::debug!(%strategy, k, attempt, query = text, "Retrieving");

        let passages = match strategy {
            RetrievalStrategy::Dense => self
                .dense_hits(text, k)
                .await?
                .into_iter()
                .map(|h| RetrievedPassage::from_hit(h, RetrievalStrategy::Dense))
                .collect(),
            RetrievalStrategy::Sparse => self
                .sparse_hits(text, k)
                .await?
                .into_iter()
                .map(|h| RetrievedPassage::from_hit(h, RetrievalStrategy::Sparse))
                .collect(),
            RetrievalStrategy::Hybrid | RetrievalStrategy::External => {
                self.hybrid(text, k).await?
            }
        };

        tracing::debug!(count = passages.len(), "Retrieved passages");
        Ok(passages)
    }

    async fn dense_hits(&self, text: &str, k: usize) -> Result<Vec<IndexHit>> {
        let vector = guarded(
            Capability::Embedding,
            self.config.capability_timeout(),
            self.embedder.embed(text),
        )
        .await?;

        let hits = guarded(
            Capability::DenseIndex,
            self.config.capability_timeout(),
            self.dense.query(&vector, k),
        )
        .await?;

        let floor = self.config.dense_score_floor;
        Ok(hits.into_iter().filter(|h| h.score >= floor).take(k).collect())
    }

    async fn sparse_hits(&self, text: &str, k: usize) -> Result<Vec<IndexHit>> {
        let tokens = tokenize(text);
        if tokens.is_empty() {
            return Ok(Vec::new());
        }

        let hits = guarded(
            Capability::LexicalIndex,
            self.config.capability_timeout(),
            self.lexical.query(&tokens, k),
        )
        .await?;

        let floor = self.config.sparse_score_floor;
        Ok(hits.into_iter().filter(|h| h.score > floor).take(k).collect())
    }

    async fn hybrid(&self, text: &str, k: usize) -> Result<Vec<RetrievedPassage>> {
        // The two branches are independent; join them before fusing
        let (dense, sparse) = tokio::join!(self.dense_hits(text, k), self.sparse_hits(text, k));

        let (dense, sparse) = match (dense, sparse) {
            (Ok(d), Ok(s)) => (d, s),
            (Ok(d), Err(e)) => {
                tracing::warn!(error = %e, "Sparse branch failed; using dense results only");
                (d, Vec::new())
            }
            (Err(e), Ok(s)) => {
                tracing::warn!(error = %e, "Dense branch failed; using sparse results only");
                (Vec::new(), s)
            }
            (Err(e), Err(_)) => return Err(e),
        };

        let (dense_weight, sparse_weight) = self.config.fusion_weights();
        let fused = fuse(&dense, &sparse, FusionWeights::new(dense_weight, sparse_weight));

        Ok(fused
            .into_iter()
            .take(k)
            .map(|f| RetrievedPassage::from_hit(f.hit, RetrievalStrategy::Hybrid))
            .collect())
    }
}
