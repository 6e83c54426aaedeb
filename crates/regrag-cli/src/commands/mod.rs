//! CLI command handlers

pub mod ask;
pub mod config;
pub mod retrieve;
pub mod status;

use regrag_core::{Config, Embedder, HttpEmbedder, VLLMClient};
use std::sync::Arc;

/// Model client plus an embedder sharing its HTTP stack and cache
pub fn model_clients(config: &Config) -> anyhow::Result<(Arc<VLLMClient>, Arc<dyn Embedder>)> {
    let client = Arc::new(VLLMClient::new(config.llm_service.clone())?);
    let embedder = Arc::new(HttpEmbedder::new(client.clone()));
    Ok((client, embedder))
}
