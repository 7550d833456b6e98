use chrono::Utc;
use rusqlite::Connection;

use crate::error::RetrievalError;

/// Passage table layout. One row per chunk of a document page.
pub const PASSAGE_TABLE_DDL: &str = "\
CREATE TABLE IF NOT EXISTS passages (
    id           INTEGER PRIMARY KEY AUTOINCREMENT,
    document_id  TEXT NOT NULL,
    year         INTEGER NOT NULL,
    page         INTEGER NOT NULL,
    chunk_index  INTEGER NOT NULL,
    text         TEXT NOT NULL,
    source       TEXT NOT NULL,
    indexed_at   TEXT NOT NULL,
    UNIQUE (document_id, page, chunk_index)
);
CREATE INDEX IF NOT EXISTS idx_passages_document ON passages(document_id);
CREATE INDEX IF NOT EXISTS idx_passages_year ON passages(year);
";

/// A stored chunk as read back from SQLite.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredPassage {
    pub document_id: String,
    pub year: i32,
    pub page: u32,
    pub chunk_index: u32,
    pub text: String,
}

/// A chunk ready to be written for one document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewChunk {
    pub page: u32,
    pub chunk_index: u32,
    pub text: String,
}

/// SQLite-backed passage store.
pub struct PassageStore {
    conn: Connection,
}

impl PassageStore {
    /// Open (or create) the passage database at `path` with WAL journaling.
    pub fn open(path: &str) -> Result<Self, RetrievalError> {
        let conn = Connection::open(path)?;
        conn.execute_batch(PASSAGE_TABLE_DDL)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        Ok(Self { conn })
    }

    pub fn open_in_memory() -> Result<Self, RetrievalError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(PASSAGE_TABLE_DDL)?;
        Ok(Self { conn })
    }

    /// Replace every chunk of `document_id` in one transaction.
    /// Returns the number of chunks written.
    pub fn replace_document(
        &mut self,
        document_id: &str,
        year: i32,
        source: &str,
        chunks: &[NewChunk],
    ) -> Result<usize, RetrievalError> {
        let now = Utc::now().to_rfc3339();
        let tx = self.conn.transaction()?;
        tx.execute(
            "DELETE FROM passages WHERE document_id = ?1",
            rusqlite::params![document_id],
        )?;
        {
            let mut stmt = tx.prepare_cached(
                "INSERT INTO passages \
                 (document_id, year, page, chunk_index, text, source, indexed_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            )?;
            for chunk in chunks {
                stmt.execute(rusqlite::params![
                    document_id,
                    year,
                    chunk.page,
                    chunk.chunk_index,
                    chunk.text,
                    source,
                    now,
                ])?;
            }
        }
        tx.commit()?;
        Ok(chunks.len())
    }

    /// Every stored chunk, ordered by document, page and chunk.
    pub fn all(&self) -> Result<Vec<StoredPassage>, RetrievalError> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT document_id, year, page, chunk_index, text FROM passages \
             ORDER BY document_id, page, chunk_index",
        )?;

        let rows = stmt
            .query_map([], |row| {
                Ok(StoredPassage {
                    document_id: row.get(0)?,
                    year: row.get(1)?,
                    page: row.get(2)?,
                    chunk_index: row.get(3)?,
                    text: row.get(4)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(rows)
    }

    /// Count all stored chunks.
    pub fn count(&self) -> Result<usize, RetrievalError> {
        let count: usize = self
            .conn
            .query_row("SELECT COUNT(*) FROM passages", [], |row| row.get(0))?;
        Ok(count)
    }

    /// Count distinct documents.
    pub fn document_count(&self) -> Result<usize, RetrievalError> {
        let count: usize = self.conn.query_row(
            "SELECT COUNT(DISTINCT document_id) FROM passages",
            [],
            |row| row.get(0),
        )?;
        Ok(count)
    }
}
