//! Tavily search API adapter

use super::{WebResult, WebSearch};
use crate::config::WebSearchConfig;
use crate::error::{RagError, Result};
use crate::llm::with_retry;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Serialize)]
struct SearchRequest<'a> {
    api_key: &'a str,
    query: &'a str,
    max_results: usize,
    search_depth: &'a str,
}

#[derive(Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<TavilyResult>,
}

#[derive(Deserialize)]
struct TavilyResult {
    #[serde(default)]
    url: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    content: String,
}

/// HTTP client for `api.tavily.com/search`
pub struct TavilyClient {
    http_client: reqwest::Client,
    config: WebSearchConfig,
    api_key: String,
}

impl TavilyClient {
    pub fn new(config: WebSearchConfig) -> Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| RagError::Config("web search requires an API key".to_string()))?;

        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            http_client,
            config,
            api_key,
        })
    }

    async fn search_once(&self, query_text: &str) -> Result<Vec<WebResult>> {
        let request = SearchRequest {
            api_key: &self.api_key,
            query: query_text,
            max_results: self.config.max_results,
            search_depth: &self.config.search_depth,
        };

        let response = self
            .http_client
            .post(&self.config.endpoint)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(RagError::ExternalError(format!(
                "Web search error (HTTP {}): {}",
                status, body
            )));
        }

        let parsed: SearchResponse = response.json().await?;
        Ok(convert_results(parsed.results, self.config.max_results))
    }
}

fn convert_results(results: Vec<TavilyResult>, max_results: usize) -> Vec<WebResult> {
    results
        .into_iter()
        .filter(|r| !r.content.trim().is_empty())
        .take(max_results)
        .map(|r| WebResult {
            title: if r.title.is_empty() {
                r.url.clone()
            } else {
                r.title
            },
            url: r.url,
            snippet: r.content,
        })
        .collect()
}

#[async_trait]
impl WebSearch for TavilyClient {
    async fn search(&self, query_text: &str) -> Result<Vec<WebResult>> {
        tracing::debug!(query = query_text, "Web search");
        with_retry(&self.config.retry, "web_search", || self.search_once(query_text)).await
    }
}
