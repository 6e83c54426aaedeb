//! Database statistics

use super::Database;
use crate::error::Result;

/// Database stats
#[derive(Debug, Clone, serde::Serialize)]
pub struct DatabaseStats {
    pub source_count: usize,
    pub passage_count: usize,
    pub embedded_count: usize,
    pub pending_embedding: usize,
}

impl Database {
    /// Get database statistics
    pub fn get_stats(&self) -> Result<DatabaseStats> {
        let conn = self.conn()?;

        let source_count: i64 = conn.query_row(
            "SELECT COUNT(DISTINCT source_id) FROM passages",
            [],
            |row| row.get(0),
        )?;

        let passage_count: i64 =
            conn.query_row("SELECT COUNT(*) FROM passages", [], |row| row.get(0))?;

        let embedded_count: i64 = conn
            .query_row("SELECT COUNT(*) FROM embeddings", [], |row| row.get(0))
            .unwrap_or(0);

        Ok(DatabaseStats {
            source_count: source_count as usize,
            passage_count: passage_count as usize,
            embedded_count: embedded_count as usize,
            pending_embedding: (passage_count - embedded_count).max(0) as usize,
        })
    }

    /// Vacuum the database
    pub fn vacuum(&self) -> Result<()> {
        self.conn()?.execute("VACUUM", [])?;
        Ok(())
    }
}
