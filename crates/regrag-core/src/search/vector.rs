//! Vector similarity search
//!
//! Brute-force cosine similarity over stored embeddings.

use super::{DenseIndex, IndexHit, PassageMetadata};
use crate::error::{RagError, Result};
use async_trait::async_trait;

/// Compute cosine similarity between two vectors
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot / (norm_a * norm_b)
}

struct StoredVector {
    source_id: String,
    text: String,
    metadata: PassageMetadata,
    embedding: Vec<f32>,
}

/// In-memory dense index
#[derive(Default)]
pub struct VectorIndex {
    entries: Vec<StoredVector>,
    dimensions: Option<usize>,
}

impl VectorIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store one passage embedding; all embeddings must share a dimension
    pub fn add(
        &mut self,
        source_id: impl Into<String>,
        text: impl Into<String>,
        metadata: PassageMetadata,
        embedding: Vec<f32>,
    ) -> Result<()> {
        match self.dimensions {
            Some(dims) if dims != embedding.len() => {
                return Err(RagError::InvalidInput(format!(
                    "embedding has {} dimensions, index expects {}",
                    embedding.len(),
                    dims
                )));
            }
            None => self.dimensions = Some(embedding.len()),
            _ => {}
        }

        self.entries.push(StoredVector {
            source_id: source_id.into(),
            text: text.into(),
            metadata,
            embedding,
        });
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Top-k entries by cosine similarity, best first
    pub fn search(&self, vector: &[f32], k: usize) -> Vec<IndexHit> {
        let mut similarities: Vec<(usize, f32)> = self
            .entries
            .iter()
            .enumerate()
            .map(|(i, e)| (i, cosine_similarity(vector, &e.embedding)))
            .collect();

        similarities.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

        similarities
            .into_iter()
            .take(k)
            .map(|(i, score)| {
                let e = &self.entries[i];
                IndexHit {
                    source_id: e.source_id.clone(),
                    text: e.text.clone(),
                    score: score as f64,
                    metadata: e.metadata.clone(),
                }
            })
            .collect()
    }
}

#[async_trait]
impl DenseIndex for VectorIndex {
    async fn query(&self, vector: &[f32], k: usize) -> Result<Vec<IndexHit>> {
        Ok(self.search(vector, k))
    }
}
