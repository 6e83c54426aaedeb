//! Vector storage operations
//!
//! Stores embeddings as BLOBs and computes cosine similarity in Rust.

use super::Database;
use crate::error::{RagError, Result};
use crate::search::{cosine_similarity, DenseIndex, IndexHit, PassageMetadata};
use async_trait::async_trait;
use chrono::Utc;
use rusqlite::params;

impl Database {
    /// Store (or replace) the embedding for a passage
    pub fn insert_embedding(&self, passage_id: i64, model: &str, embedding: &[f32]) -> Result<()> {
        let conn = self.conn()?;

        let exists: i64 = conn.query_row(
            "SELECT COUNT(*) FROM passages WHERE id = ?1",
            params![passage_id],
            |row| row.get(0),
        )?;
        if exists == 0 {
            return Err(RagError::PassageNotFound(passage_id.to_string()));
        }

        conn.execute(
            "INSERT OR REPLACE INTO embeddings (passage_id, model, dimensions, embedding, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                passage_id,
                model,
                embedding.len() as i64,
                embedding_to_bytes(embedding),
                Utc::now().to_rfc3339()
            ],
        )?;
        Ok(())
    }

    /// Check if vector index exists and has data
    pub fn has_vector_index(&self) -> bool {
        self.conn()
            .and_then(|conn| {
                Ok(conn.query_row("SELECT COUNT(*) FROM embeddings", [], |row| {
                    row.get::<_, i64>(0)
                })?)
            })
            .map(|count| count > 0)
            .unwrap_or(false)
    }

    /// Brute-force nearest neighbours over all stored embeddings
    pub fn search_vectors(&self, query: &[f32], k: usize) -> Result<Vec<IndexHit>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT p.source_id, p.text, p.title, p.section, p.page, e.embedding
             FROM embeddings e
             JOIN passages p ON p.id = e.passage_id",
        )?;

        let mut hits: Vec<IndexHit> = stmt
            .query_map([], |row| {
                let bytes: Vec<u8> = row.get(5)?;
                let score = cosine_similarity(query, &bytes_to_embedding(&bytes)) as f64;
                Ok(IndexHit {
                    source_id: row.get(0)?,
                    text: row.get(1)?,
                    score,
                    metadata: PassageMetadata {
                        title: row.get(2)?,
                        section: row.get(3)?,
                        page: row.get(4)?,
                        url: None,
                    },
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        hits.truncate(k);
        Ok(hits)
    }
}

#[async_trait]
impl DenseIndex for Database {
    async fn query(&self, vector: &[f32], k: usize) -> Result<Vec<IndexHit>> {
        self.search_vectors(vector, k)
    }
}

/// Convert f32 embedding to bytes (little-endian)
pub fn embedding_to_bytes(embedding: &[f32]) -> Vec<u8> {
    embedding.iter().flat_map(|f| f.to_le_bytes()).collect()
}

/// Convert bytes to f32 embedding
pub fn bytes_to_embedding(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}
