//! Passage storage operations

use super::Database;
use crate::error::Result;
use crate::search::PassageMetadata;
use chrono::Utc;
use rusqlite::{params, OptionalExtension};
use sha2::{Digest, Sha256};

/// Hash a passage by source and text
pub fn hash_passage(source_id: &str, text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(source_id.as_bytes());
    hasher.update([0u8]);
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Stored passage row
#[derive(Debug, Clone, serde::Serialize)]
pub struct StoredPassage {
    pub id: i64,
    pub source_id: String,
    pub text: String,
    pub metadata: PassageMetadata,
}

impl Database {
    /// Insert a passage if not present; returns its row id either way
    pub fn insert_passage(
        &self,
        source_id: &str,
        text: &str,
        metadata: &PassageMetadata,
    ) -> Result<i64> {
        let hash = hash_passage(source_id, text);
        let now = Utc::now().to_rfc3339();
        let conn = self.conn()?;

        conn.execute(
            "INSERT OR IGNORE INTO passages (source_id, text, title, section, page, hash, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                source_id,
                text,
                metadata.title,
                metadata.section,
                metadata.page,
                hash,
                now
            ],
        )?;

        let id = conn.query_row(
            "SELECT id FROM passages WHERE hash = ?1",
            params![hash],
            |row| row.get(0),
        )?;
        Ok(id)
    }

    /// Fetch a passage by row id
    pub fn get_passage(&self, id: i64) -> Result<Option<StoredPassage>> {
        let passage = self
            .conn()?
            .query_row(
                "SELECT id, source_id, text, title, section, page FROM passages WHERE id = ?1",
                params![id],
                |row| {
                    Ok(StoredPassage {
                        id: row.get(0)?,
                        source_id: row.get(1)?,
                        text: row.get(2)?,
                        metadata: PassageMetadata {
                            title: row.get(3)?,
                            section: row.get(4)?,
                            page: row.get(5)?,
                            url: None,
                        },
                    })
                },
            )
            .optional()?;
        Ok(passage)
    }

    /// Passages that have no embedding yet
    pub fn passages_without_embeddings(&self) -> Result<Vec<StoredPassage>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT p.id, p.source_id, p.text, p.title, p.section, p.page
             FROM passages p
             LEFT JOIN embeddings e ON e.passage_id = p.id
             WHERE e.passage_id IS NULL
             ORDER BY p.id",
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok(StoredPassage {
                    id: row.get(0)?,
                    source_id: row.get(1)?,
                    text: row.get(2)?,
                    metadata: PassageMetadata {
                        title: row.get(3)?,
                        section: row.get(4)?,
                        page: row.get(5)?,
                        url: None,
                    },
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn db() -> Database {
        let db = Database::open_in_memory().unwrap();
        db.initialize().unwrap();
        db
    }

    #[test]
    fn test_insert_is_idempotent() {
        let db = db();
        let metadata = PassageMetadata::titled("Banking Act");
        let a = db.insert_passage("banking-act", "Capital rules.", &metadata).unwrap();
        let b = db.insert_passage("banking-act", "Capital rules.", &metadata).unwrap();
        assert_eq!(a, b);

        let c = db.insert_passage("banking-act", "Liquidity rules.", &metadata).unwrap();
        assert_ne!(a, c);
    }

    #[test]
    fn test_get_passage_roundtrips_metadata() {
        let db = db();
        let metadata = PassageMetadata {
            title: Some("Ministry History".to_string()),
            section: Some("Origins".to_string()),
            page: Some(3),
            url: None,
        };
        let id = db
            .insert_passage("history", "Founded in 1921.", &metadata)
            .unwrap();

        let stored = db.get_passage(id).unwrap().unwrap();
        assert_eq!(stored.source_id, "history");
        assert_eq!(stored.metadata, metadata);
        assert!(db.get_passage(id + 100).unwrap().is_none());
    }

    #[test]
    fn test_hash_distinguishes_source() {
        assert_ne!(hash_passage("a", "text"), hash_passage("b", "text"));
    }
}
