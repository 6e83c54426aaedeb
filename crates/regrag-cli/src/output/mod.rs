//! Output formatters

pub mod json;
pub mod markdown;
pub mod terminal;

use crate::app::OutputFormat;
use regrag_core::{Response, RetrievedPassage};

/// Format a pipeline response
pub fn format_response(response: &Response, format: OutputFormat) -> String {
    match format {
        OutputFormat::Json => json::format_response(response),
        OutputFormat::Md => markdown::format_response(response),
        OutputFormat::Cli => terminal::format_response(response),
    }
}

/// Format retrieved passages
pub fn format_passages(passages: &[RetrievedPassage], format: OutputFormat) -> String {
    match format {
        OutputFormat::Json => json::format_passages(passages),
        OutputFormat::Md => markdown::format_passages(passages),
        OutputFormat::Cli => terminal::format_passages(passages),
    }
}
