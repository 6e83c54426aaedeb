//! In-memory Okapi BM25 index

use super::{tokenize, IndexHit, LexicalIndex, PassageMetadata};
use crate::error::Result;
use async_trait::async_trait;
use std::collections::HashMap;

/// Term-frequency saturation
pub const DEFAULT_K1: f64 = 1.2;

/// Length normalization strength
pub const DEFAULT_B: f64 = 0.75;

struct IndexedPassage {
    source_id: String,
    text: String,
    metadata: PassageMetadata,
    term_freq: HashMap<String, usize>,
    len: usize,
}

/// BM25 index built once and then shared read-only
pub struct Bm25Index {
    passages: Vec<IndexedPassage>,
    doc_freq: HashMap<String, usize>,
    total_len: usize,
    k1: f64,
    b: f64,
}

/// Non-negative BM25 inverse document frequency
pub fn bm25_idf(n_docs: usize, doc_freq: usize) -> f64 {
    let n = n_docs as f64;
    let df = doc_freq as f64;
    (1.0 + (n - df + 0.5) / (df + 0.5)).ln()
}

impl Bm25Index {
    pub fn new() -> Self {
        Self::with_params(DEFAULT_K1, DEFAULT_B)
    }

    pub fn with_params(k1: f64, b: f64) -> Self {
        Self {
            passages: Vec::new(),
            doc_freq: HashMap::new(),
            total_len: 0,
            k1,
            b,
        }
    }

    /// Index one passage
    pub fn add(
        &mut self,
        source_id: impl Into<String>,
        text: impl Into<String>,
        metadata: PassageMetadata,
    ) {
        let text = text.into();
        let tokens = tokenize(&text);

        let mut term_freq: HashMap<String, usize> = HashMap::new();
        for token in &tokens {
            *term_freq.entry(token.clone()).or_insert(0) += 1;
        }
        for term in term_freq.keys() {
            *self.doc_freq.entry(term.clone()).or_insert(0) += 1;
        }

        self.total_len += tokens.len();
        self.passages.push(IndexedPassage {
            source_id: source_id.into(),
            text,
            metadata,
            term_freq,
            len: tokens.len(),
        });
    }

    pub fn len(&self) -> usize {
        self.passages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.passages.is_empty()
    }

    fn avg_len(&self) -> f64 {
        if self.passages.is_empty() {
            0.0
        } else {
            self.total_len as f64 / self.passages.len() as f64
        }
    }

    fn score_passage(&self, passage: &IndexedPassage, terms: &[String]) -> f64 {
        let n = self.passages.len();
        let avg_len = self.avg_len().max(1.0);
        let norm = 1.0 - self.b + self.b * passage.len as f64 / avg_len;

        terms
            .iter()
            .filter_map(|term| {
                let tf = *passage.term_freq.get(term)? as f64;
                let df = self.doc_freq.get(term).copied().unwrap_or(0);
                let idf = bm25_idf(n, df);
                Some(idf * tf * (self.k1 + 1.0) / (tf + self.k1 * norm))
            })
            .sum()
    }

    /// Top-k passages with a positive score, best first (ties keep insertion order)
    pub fn search(&self, tokens: &[String], k: usize) -> Vec<IndexHit> {
        let mut terms: Vec<String> = tokens.iter().map(|t| t.to_lowercase()).collect();
        terms.sort();
        terms.dedup();

        let mut scored: Vec<(usize, f64)> = self
            .passages
            .iter()
            .enumerate()
            .map(|(i, p)| (i, self.score_passage(p, &terms)))
            .filter(|(_, score)| *score > 0.0)
            .collect();

        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

        scored
            .into_iter()
            .take(k)
            .map(|(i, score)| {
                let p = &self.passages[i];
                IndexHit {
                    source_id: p.source_id.clone(),
                    text: p.text.clone(),
                    score,
                    metadata: p.metadata.clone(),
                }
            })
            .collect()
    }
}

impl Default for Bm25Index {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LexicalIndex for Bm25Index {
    async fn query(&self, tokens: &[String], k: usize) -> Result<Vec<IndexHit>> {
        Ok(self.search(tokens, k))
    }
}
