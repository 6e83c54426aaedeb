//! Web search capability
//!
//! Used only as a fallback when the curated corpus cannot answer.

mod tavily;

pub use tavily::TavilyClient;

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// One external search result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebResult {
    pub url: String,
    pub title: String,
    pub snippet: String,
}

/// External web search
#[async_trait]
pub trait WebSearch: Send + Sync {
    async fn search(&self, query_text: &str) -> Result<Vec<WebResult>>;
}
