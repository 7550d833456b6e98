use thiserror::Error;

#[derive(Error, Debug)]
pub enum RetrievalError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid document: {0}")]
    InvalidDocument(String),

    #[error("Passage store not available: {0}")]
    Unavailable(String),
}
