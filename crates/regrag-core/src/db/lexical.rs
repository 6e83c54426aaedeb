//! BM25 full-text search via FTS5

use super::Database;
use crate::error::Result;
use crate::search::{IndexHit, LexicalIndex, PassageMetadata};
use async_trait::async_trait;
use rusqlite::params;

/// Build an FTS5 MATCH expression: every token quoted, OR-joined
pub fn fts5_match_expression(tokens: &[String]) -> Option<String> {
    let terms: Vec<String> = tokens
        .iter()
        .map(|t| t.trim())
        .filter(|t| !t.is_empty())
        .map(|t| format!("\"{}\"", t.replace('"', "\"\"")))
        .collect();

    if terms.is_empty() {
        None
    } else {
        Some(terms.join(" OR "))
    }
}

impl Database {
    /// Rank passages by FTS5 bm25 (higher is better)
    pub fn search_fts(&self, tokens: &[String], k: usize) -> Result<Vec<IndexHit>> {
        let Some(expression) = fts5_match_expression(tokens) else {
            return Ok(Vec::new());
        };

        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT p.source_id, p.text, p.title, p.section, p.page,
                    -bm25(passages_fts) AS score
             FROM passages_fts
             JOIN passages p ON p.id = passages_fts.rowid
             WHERE passages_fts MATCH ?1
             ORDER BY score DESC
             LIMIT ?2",
        )?;

        let hits = stmt
            .query_map(params![expression, k as i64], |row| {
                Ok(IndexHit {
                    source_id: row.get(0)?,
                    text: row.get(1)?,
                    score: row.get(5)?,
                    metadata: PassageMetadata {
                        title: row.get(2)?,
                        section: row.get(3)?,
                        page: row.get(4)?,
                        url: None,
                    },
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(hits)
    }
}

#[async_trait]
impl LexicalIndex for Database {
    async fn query(&self, tokens: &[String], k: usize) -> Result<Vec<IndexHit>> {
        self.search_fts(tokens, k)
    }
}
