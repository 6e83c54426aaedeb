//! JSON output formatter

use regrag_core::{Response, RetrievedPassage};
use serde::Serialize;

pub fn format_response(response: &Response) -> String {
    pretty(response)
}

#[derive(Serialize)]
struct PassageJson<'a> {
    source_id: &'a str,
    label: String,
    strategy: &'static str,
    score: f64,
    text: &'a str,
}

pub fn format_passages(passages: &[RetrievedPassage]) -> String {
    let rows: Vec<PassageJson> = passages
        .iter()
        .map(|p| PassageJson {
            source_id: &p.source_id,
            label: p.label(),
            strategy: p.strategy.as_str(),
            score: p.raw_score,
            text: &p.text,
        })
        .collect();
    pretty(&rows)
}

fn pretty<T: Serialize + ?Sized>(value: &T) -> String {
    let mut out = serde_json::to_string_pretty(value).unwrap_or_else(|_| "{}".to_string());
    out.push('\n');
    out
}
