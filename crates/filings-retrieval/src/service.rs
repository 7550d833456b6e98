use async_trait::async_trait;
use filings_models::{DocumentInput, Passage};

use crate::error::RetrievalError;

/// A passage index the orchestrator can query and feed.
#[async_trait]
pub trait RetrievalService: Send + Sync {
    /// Up to `top_k` passages ranked by descending relevance.
    async fn search(&self, query: &str, top_k: usize) -> Result<Vec<Passage>, RetrievalError>;

    /// Index a document, replacing any earlier version with the same id.
    /// Returns the number of passages written.
    async fn ingest(&self, document: DocumentInput) -> Result<usize, RetrievalError>;
}
