//! Ask command

use crate::app::{AskArgs, OutputFormat};
use crate::output::format_response;
use anyhow::Result;
use regrag_core::{Config, Database, Pipeline, QueryRequest, TavilyClient};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

pub async fn run(
    args: AskArgs,
    db: Arc<Database>,
    config: &Config,
    format: OutputFormat,
) -> Result<()> {
    let (client, embedder) = super::model_clients(config)?;

    let mut pipeline = Pipeline::new(
        config.pipeline.clone(),
        client.clone(),
        embedder,
        db.clone(),
        db,
    )?;
    if config.web_search.is_available() {
        pipeline = pipeline.with_web_search(Arc::new(TavilyClient::new(config.web_search.clone())?));
    } else {
        tracing::debug!("Web search not configured");
    }

    let mut request = QueryRequest::new(args.query.join(" "));
    if args.sources {
        request = request.with_source_documents();
    }

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    let watcher = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("Cancelling...");
            on_interrupt.cancel();
        }
    });

    let result = pipeline.run(&request, &cancel).await;
    watcher.abort();

    let usage = client.metrics();
    tracing::info!(
        requests = usage.total_requests,
        errors = usage.total_errors,
        cache_hits = usage.cache_hits,
        cached_entries = usage.cache.active_entries,
        avg_latency_ms = usage.avg_latency_ms,
        "Model usage"
    );

    let response = result?;
    print!("{}", format_response(&response, format));
    Ok(())
}
