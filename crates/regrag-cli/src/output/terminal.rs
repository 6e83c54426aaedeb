//! Terminal output formatter

use regrag_core::{Response, RetrievedPassage};

const PREVIEW_LINES: usize = 3;

pub fn format_response(r: &Response) -> String {
    let mut output = format!("{}\n", r.answer);

    if !r.supporting_evidence.is_empty() {
        output.push_str("\nEvidence:\n");
        for item in &r.supporting_evidence {
            output.push_str(&format!("  {}\n", item));
        }
    }

    if !r.suggested_followup.is_empty() {
        output.push_str("\nFollow-up:\n");
        for question in &r.suggested_followup {
            output.push_str(&format!("  - {}\n", question));
        }
    }

    output.push_str(&format!(
        "\nConfidence {:>3}%  sources {}  {} / {}  {:.2}s\n",
        (r.confidence_score * 100.0) as u32,
        r.metadata.sources_used,
        r.query_type.as_str(),
        r.query_intent,
        r.processing_time
    ));
    if r.metadata.web_search_used {
        output.push_str("Answer includes web search results\n");
    }

    if let Some(ref docs) = r.source_documents {
        output.push_str("\nSources:\n");
        for doc in docs {
            output.push_str(&format!(
                "  {:>3}% {} [{}]\n",
                (doc.relevance_score * 100.0) as u32,
                doc.url.as_deref().unwrap_or(&doc.source_id),
                doc.strategy.as_str()
            ));
        }
    }

    output
}

pub fn format_passages(passages: &[RetrievedPassage]) -> String {
    let mut output = String::new();

    for p in passages {
        output.push_str(&format!(
            "{:.3} {} [{}]\n",
            p.raw_score,
            p.label(),
            p.strategy.as_str()
        ));
        let lines: Vec<&str> = p.text.lines().take(PREVIEW_LINES).collect();
        for line in &lines {
            output.push_str(&format!("  {}\n", line));
        }
        if p.text.lines().count() > PREVIEW_LINES {
            output.push_str("  ...\n");
        }
    }

    output
}
