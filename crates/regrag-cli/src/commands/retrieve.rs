//! Retrieve command

use crate::app::{OutputFormat, RetrieveArgs};
use crate::output::format_passages;
use anyhow::Result;
use regrag_core::pipeline::{heuristic_analysis, Retriever};
use regrag_core::{Config, Database, RagError, StrategyHint};
use std::sync::Arc;

pub async fn run(
    args: RetrieveArgs,
    db: Arc<Database>,
    config: &Config,
    format: OutputFormat,
) -> Result<()> {
    let text = args.query.join(" ");
    if text.trim().is_empty() {
        return Err(RagError::Analysis("query is empty".to_string()).into());
    }

    let mut pipeline_config = config.pipeline.clone();
    if let Some(n) = args.limit {
        pipeline_config.top_k = n.max(1);
        pipeline_config.max_k = pipeline_config.max_k.max(pipeline_config.top_k);
    }

    let (_, embedder) = super::model_clients(config)?;
    let retriever = Retriever::new(embedder, db.clone(), db, pipeline_config);

    let query = heuristic_analysis(&text).query;
    let hint = args.strategy.map(StrategyHint::from).unwrap_or_default();
    let passages = retriever.retrieve(&query, hint, 1).await?;

    print!("{}", format_passages(&passages, format));
    Ok(())
}
