//! Evidence span extraction
//!
//! A span is always a literal slice of the passage, so it can be traced back
//! to the text it came from.

use regex::RegexBuilder;

/// Extracted span with its byte range in the source text
#[derive(Debug, Clone, PartialEq)]
pub struct Snippet {
    pub snippet: String,
    pub start_pos: usize,
    pub end_pos: usize,
}

/// Extract the window of `content` around the first query term it contains.
///
/// `snippet == &content[start_pos..end_pos]` always holds.
pub fn extract_snippet(content: &str, query_terms: &[String], max_length: usize) -> Snippet {
    let max_len = max_length.max(1);

    if content.len() <= max_len {
        return trimmed(content, 0, content.len());
    }

    let center = find_query_position(content, query_terms);

    let half_len = max_len / 2;
    let mut start = floor_char_boundary(content, center.saturating_sub(half_len));
    let mut end = floor_char_boundary(content, (start + max_len).min(content.len()));
    if end == content.len() {
        start = ceil_char_boundary(content, end.saturating_sub(max_len));
    }

    let (adj_start, adj_end) = shrink_to_word_boundaries(content, start, end);
    if adj_start < adj_end {
        start = adj_start;
        end = adj_end;
    }

    trimmed(content, start, end)
}

fn trimmed(content: &str, start: usize, end: usize) -> Snippet {
    let slice = &content[start..end];
    let lead = slice.len() - slice.trim_start().len();
    let tail = slice.len() - slice.trim_end().len();
    let (start, end) = if lead + tail >= slice.len() {
        (start, end)
    } else {
        (start + lead, end - tail)
    };

    Snippet {
        snippet: content[start..end].to_string(),
        start_pos: start,
        end_pos: end,
    }
}

/// Byte offset of the first query term found, case-insensitive
fn find_query_position(content: &str, query_terms: &[String]) -> usize {
    query_terms
        .iter()
        .filter(|t| !t.is_empty())
        .filter_map(|term| {
            RegexBuilder::new(&regex::escape(term))
                .case_insensitive(true)
                .build()
                .ok()?
                .find(content)
                .map(|m| m.start())
        })
        .min()
        .unwrap_or(0)
}

fn floor_char_boundary(s: &str, mut i: usize) -> usize {
    i = i.min(s.len());
    while i > 0 && !s.is_char_boundary(i) {
        i -= 1;
    }
    i
}

fn ceil_char_boundary(s: &str, mut i: usize) -> usize {
    while i < s.len() && !s.is_char_boundary(i) {
        i += 1;
    }
    i.min(s.len())
}

/// Pull both ends inward so no word is cut in half
fn shrink_to_word_boundaries(content: &str, start: usize, end: usize) -> (usize, usize) {
    let window = &content[start..end];

    let new_start = if start == 0 || content[..start].ends_with(char::is_whitespace) {
        start
    } else {
        match window.find(char::is_whitespace) {
            Some(offset) => start + offset,
            None => start,
        }
    };

    let new_end = if end == content.len() || content[end..].starts_with(char::is_whitespace) {
        end
    } else {
        match window.rfind(char::is_whitespace) {
            Some(offset) => start + offset,
            None => end,
        }
    };

    (new_start, new_end)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn terms(words: &[&str]) -> Vec<String> {
        words.iter().map(|w| w.to_string()).collect()
    }

    #[test]
    fn test_short_content() {
        let snippet = extract_snippet("Hello world", &terms(&["hello"]), 500);
        assert_eq!(snippet.snippet, "Hello world");
        assert_eq!((snippet.start_pos, snippet.end_pos), (0, 11));
    }

    #[test]
    fn test_window_centers_on_term() {
        let content = format!("{} The Ministry was founded in 1921. {}", "filler ".repeat(100), "tail ".repeat(100));
        let snippet = extract_snippet(&content, &terms(&["founded"]), 80);
        assert!(snippet.snippet.contains("founded"));
        assert!(snippet.snippet.len() <= 80);
        assert_eq!(&content[snippet.start_pos..snippet.end_pos], snippet.snippet);
    }

    #[test]
    fn test_multibyte_text_never_splits_chars() {
        let content = "é".repeat(300) + " ministère fondé en 1921 " + &"ü".repeat(300);
        for max in [7, 31, 64, 101] {
            let snippet = extract_snippet(&content, &terms(&["fondé"]), max);
            assert!(content.contains(&snippet.snippet));
            assert_eq!(&content[snippet.start_pos..snippet.end_pos], snippet.snippet);
        }
    }

    #[test]
    fn test_no_term_found_starts_at_beginning() {
        let content = "word ".repeat(200);
        let snippet = extract_snippet(&content, &terms(&["absent"]), 50);
        assert_eq!(snippet.start_pos, 0);
        assert!(content.contains(&snippet.snippet));
    }
}
