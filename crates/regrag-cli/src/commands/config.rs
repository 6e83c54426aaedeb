//! Config command

use crate::app::{ConfigArgs, OutputFormat};
use anyhow::Result;
use regrag_core::Config;
use std::path::PathBuf;

pub async fn run(
    args: ConfigArgs,
    config: &Config,
    path: Option<PathBuf>,
    format: OutputFormat,
) -> Result<()> {
    if args.init {
        let path = path.unwrap_or_else(Config::default_path);
        if path.exists() && !args.force {
            anyhow::bail!(
                "Config already exists at {} (use --force to overwrite)",
                path.display()
            );
        }
        // Keys come from the environment, never from a generated file
        let mut fresh = Config::default();
        fresh.llm_service.api_key = None;
        fresh.web_search.api_key = None;
        fresh.save_to(&path)?;
        println!("Wrote default configuration to {}", path.display());
        return Ok(());
    }

    let mut shown = config.clone();
    for key in [&mut shown.llm_service.api_key, &mut shown.web_search.api_key] {
        if key.is_some() {
            *key = Some("***".to_string());
        }
    }
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&shown)?),
        _ => print!("{}", serde_yaml::to_string(&shown)?),
    }
    Ok(())
}
