//! Database layer for regrag
//!
//! SQLite passage store serving both index capabilities:
//! - FTS5 full-text search (lexical)
//! - BLOB embeddings with cosine similarity (dense)

mod lexical;
mod passages;
mod schema;
mod stats;
pub mod vectors;

pub use lexical::fts5_match_expression;
pub use passages::{hash_passage, StoredPassage};
pub use schema::Database;
pub use stats::DatabaseStats;
use std::path::PathBuf;

impl Database {
    /// Get the default database path
    pub fn default_path() -> PathBuf {
        dirs::cache_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(crate::CACHE_DIR_NAME)
            .join("index.sqlite")
    }
}
