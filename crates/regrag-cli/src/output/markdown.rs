//! Markdown output formatter

use regrag_core::{Response, RetrievedPassage};

pub fn format_response(r: &Response) -> String {
    let mut output = String::from("### Answer\n\n");
    output.push_str(&r.answer);
    output.push_str("\n\n");

    if !r.supporting_evidence.is_empty() {
        output.push_str("### Supporting Evidence\n\n");
        for item in &r.supporting_evidence {
            output.push_str(&format!("> {}\n>\n", item));
        }
        output.push('\n');
    }

    output.push_str("### Analysis\n\n");
    output.push_str(&format!(
        "- **Confidence Score**: {:.1}%\n",
        r.confidence_score * 100.0
    ));
    output.push_str(&format!(
        "- **Quality Score**: {:.1}%\n\n",
        r.validation.quality_score * 100.0
    ));

    output.push_str("### Key Information\n\n");
    output.push_str(&format!("- **Sources Used**: {}\n", r.metadata.sources_used));
    if !r.metadata.key_concepts.is_empty() {
        output.push_str(&format!(
            "- **Key Concepts**: {}\n",
            r.metadata.key_concepts.join(", ")
        ));
    }
    if !r.metadata.confidence_factors.is_empty() {
        output.push_str("- **Confidence Factors**:\n");
        for factor in &r.metadata.confidence_factors {
            output.push_str(&format!("  - {}\n", factor));
        }
    }
    output.push('\n');

    if !r.suggested_followup.is_empty() {
        output.push_str("### Suggested Follow-up Questions\n\n");
        for question in &r.suggested_followup {
            output.push_str(&format!("- {}\n", question));
        }
        output.push('\n');
    }

    output.push_str("### Processing Details\n\n");
    output.push_str(&format!("- **Query Type**: {}\n", r.query_type.as_str()));
    output.push_str(&format!("- **Query Intent**: {}\n", r.query_intent));
    output.push_str(&format!(
        "- **Processing Time**: {:.2} seconds\n",
        r.processing_time
    ));

    if let Some(ref docs) = r.source_documents {
        output.push_str("\n### Source Documents\n\n");
        for doc in docs {
            let name = doc.title.as_deref().unwrap_or(&doc.source_id);
            output.push_str(&format!(
                "- **{}** ({}, relevance {:.2})",
                name,
                doc.strategy.as_str(),
                doc.relevance_score
            ));
            if let Some(ref url) = doc.url {
                output.push_str(&format!(" <{}>", url));
            }
            output.push('\n');
        }
    }

    output
}

pub fn format_passages(passages: &[RetrievedPassage]) -> String {
    let mut output = String::from("# Retrieved Passages\n\n");

    for (i, p) in passages.iter().enumerate() {
        output.push_str(&format!(
            "## {}. {} (Score: {:.3})\n\n",
            i + 1,
            p.label(),
            p.raw_score
        ));
        output.push_str(&format!("- **Source**: `{}`\n", p.source_id));
        output.push_str(&format!("- **Strategy**: {}\n\n", p.strategy.as_str()));
        output.push_str(&format!("{}\n", p.text));
        output.push_str("\n---\n\n");
    }

    if passages.is_empty() {
        output.push_str("*No results found*\n");
    }

    output
}
