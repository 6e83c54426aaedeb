//! Status command

use crate::app::OutputFormat;
use regrag_core::Database;
use anyhow::Result;

pub async fn run(db: &Database, format: OutputFormat) -> Result<()> {
    let stats = db.get_stats()?;

    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }
        _ => {
            println!("Sources:         {}", stats.source_count);
            println!("Passages:        {}", stats.passage_count);
            println!();
            println!("Embeddings:");
            println!("  Embedded:      {}", stats.embedded_count);
            println!("  Pending:       {}", stats.pending_embedding);
        }
    }
    Ok(())
}
