//! External web evidence for queries the corpus cannot answer

use super::guarded;
use super::types::{RetrievalStrategy, RetrievedPassage};
use crate::error::{Capability, Result};
use crate::search::PassageMetadata;
use crate::web::WebSearch;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

pub struct WebSearchFallback {
    web: Arc<dyn WebSearch>,
    timeout: Duration,
}

impl WebSearchFallback {
    pub fn new(web: Arc<dyn WebSearch>, timeout: Duration) -> Self {
        Self { web, timeout }
    }

    /// Search the web and convert results into external passages.
    ///
    /// Results keep provider order; the first result scores highest. Empty
    /// snippets and repeated URLs are dropped.
    pub async fn search_web(&self, query_text: &str) -> Result<Vec<RetrievedPassage>> {
        let results = guarded(
            Capability::WebSearch,
            self.timeout,
            self.web.search(query_text),
        )
        .await?;

        let mut seen = HashSet::new();
        let passages: Vec<RetrievedPassage> = results
            .into_iter()
            .filter(|r| !r.snippet.trim().is_empty())
            .filter(|r| seen.insert(r.url.clone()))
            .enumerate()
            .map(|(rank, r)| RetrievedPassage {
                source_id: r.url.clone(),
                text: r.snippet.trim().to_string(),
                raw_score: 1.0 / (rank as f64 + 1.0),
                strategy: RetrievalStrategy::External,
                metadata: PassageMetadata {
                    title: Some(r.title).filter(|t| !t.is_empty()),
                    url: Some(r.url),
                    ..PassageMetadata::default()
                },
            })
            .collect();

        tracing::info!(query = query_text, results = passages.len(), "Web search fallback");
        Ok(passages)
    }
}
