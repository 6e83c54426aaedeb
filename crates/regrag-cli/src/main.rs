//! Regrag CLI
//!
//! Ask questions of a regulatory document corpus.

use anyhow::Result;
use clap::Parser;
use regrag_core::{Config, Database, RagError};
use std::sync::Arc;

mod app;
mod commands;
mod output;

use app::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "regrag_core=info,regrag=info" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let result = run(cli).await;

    if let Err(e) = &result {
        if let Some(rag) = e.downcast_ref::<RagError>() {
            eprintln!("Error: {}", rag);
            std::process::exit(rag.exit_code());
        }
    }
    result
}

async fn run(cli: Cli) -> Result<()> {
    let config_path = cli.config.clone();
    let config = match &config_path {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };

    if let Commands::Config(args) = cli.command {
        return commands::config::run(args, &config, config_path, cli.format).await;
    }

    // Use REGRAG_DB env var if set, otherwise the default path
    let db_path = std::env::var("REGRAG_DB")
        .map(std::path::PathBuf::from)
        .unwrap_or_else(|_| Database::default_path());
    let db = Database::open(&db_path)?;
    db.initialize()?;
    let db = Arc::new(db);

    match cli.command {
        Commands::Ask(args) => commands::ask::run(args, db, &config, cli.format).await,
        Commands::Retrieve(args) => commands::retrieve::run(args, db, &config, cli.format).await,
        Commands::Status => commands::status::run(&db, cli.format).await,
        Commands::Config(_) => Ok(()),
    }
}
