//! CLI argument definitions

use clap::{Args, Parser, Subcommand, ValueEnum};
use regrag_core::StrategyHint;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "regrag")]
#[command(
    author,
    version,
    about = "Self-correcting question answering over regulatory documents"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Output format
    #[arg(long, global = true, value_enum, default_value = "cli")]
    pub format: OutputFormat,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Config file (defaults to REGRAG_CONFIG or the user config dir)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Answer a question from the indexed corpus
    Ask(AskArgs),

    /// Show the passages retrieval finds for a query
    Retrieve(RetrieveArgs),

    /// Show index status
    Status,

    /// Show or initialize configuration
    Config(ConfigArgs),
}

#[derive(Args)]
pub struct AskArgs {
    /// Question
    pub query: Vec<String>,

    /// Include the evidence passages in the output
    #[arg(long)]
    pub sources: bool,
}

#[derive(Args)]
pub struct RetrieveArgs {
    /// Search query
    pub query: Vec<String>,

    /// Force a retrieval strategy
    #[arg(long, value_enum)]
    pub strategy: Option<StrategyArg>,

    /// Number of results
    #[arg(short = 'n')]
    pub limit: Option<usize>,
}

#[derive(Args)]
pub struct ConfigArgs {
    /// Write the default configuration file
    #[arg(long)]
    pub init: bool,

    /// Overwrite an existing file with --init
    #[arg(long, requires = "init")]
    pub force: bool,
}

#[derive(Clone, Copy, ValueEnum)]
pub enum StrategyArg {
    Dense,
    Sparse,
    Hybrid,
}

impl From<StrategyArg> for StrategyHint {
    fn from(arg: StrategyArg) -> Self {
        match arg {
            StrategyArg::Dense => StrategyHint::Dense,
            StrategyArg::Sparse => StrategyHint::Sparse,
            StrategyArg::Hybrid => StrategyHint::Hybrid,
        }
    }
}

#[derive(Clone, Copy, ValueEnum, Default)]
pub enum OutputFormat {
    #[default]
    Cli,
    Json,
    Md,
}
