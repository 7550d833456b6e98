use std::cmp::Ordering;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use filings_models::{DocumentInput, Passage, RetrievalConfig};
use tracing::debug;

use crate::chunker::chunk_words;
use crate::error::RetrievalError;
use crate::memory::QueryCache;
use crate::scoring::{query_terms, score};
use crate::service::RetrievalService;
use crate::store::{NewChunk, PassageStore, StoredPassage};

/// Lexically ranked passage index: moka (hot) → SQLite scan.
///
/// SQLite access is synchronized via `Mutex` since `rusqlite::Connection` is
/// not `Sync`, and runs on the blocking pool.
///
/// `generation` counts completed ingests. It only changes under the store
/// lock, so a search reads its rows and their generation together and caches
/// the ranking under that generation.
pub struct PassageIndex {
    store: Arc<Mutex<PassageStore>>,
    generation: Arc<AtomicU64>,
    cache: QueryCache,
    chunk_size: usize,
    chunk_overlap: usize,
}

impl PassageIndex {
    pub fn new(store: PassageStore, config: &RetrievalConfig) -> Self {
        Self {
            store: Arc::new(Mutex::new(store)),
            generation: Arc::new(AtomicU64::new(0)),
            cache: QueryCache::new(
                config.cache_max_capacity,
                Duration::from_secs(config.cache_ttl_seconds),
            ),
            chunk_size: config.chunk_size,
            chunk_overlap: config.chunk_overlap,
        }
    }

    /// Open the store named in `config` and wrap it.
    pub fn open(config: &RetrievalConfig) -> Result<Self, RetrievalError> {
        Ok(Self::new(PassageStore::open(&config.sqlite_path)?, config))
    }

    /// Number of stored passages.
    pub async fn passage_count(&self) -> Result<usize, RetrievalError> {
        let store = Arc::clone(&self.store);
        run_blocking(move || {
            let store = lock(&store)?;
            store.count()
        })
        .await
    }

    fn chunk_document(&self, document: &DocumentInput) -> Vec<NewChunk> {
        let mut chunks = Vec::new();
        for page in &document.pages {
            for (i, text) in chunk_words(&page.text, self.chunk_size, self.chunk_overlap)
                .into_iter()
                .enumerate()
            {
                chunks.push(NewChunk {
                    page: page.page,
                    chunk_index: i as u32,
                    text,
                });
            }
        }
        chunks
    }
}

#[async_trait]
impl RetrievalService for PassageIndex {
    async fn search(&self, query: &str, top_k: usize) -> Result<Vec<Passage>, RetrievalError> {
        let current = self.generation.load(AtomicOrdering::Acquire);
        if let Some(hit) = self.cache.get(&QueryCache::key(current, query, top_k)).await {
            debug!(query, top_k, "passage cache hit");
            return Ok(hit.as_ref().clone());
        }

        let store = Arc::clone(&self.store);
        let generation = Arc::clone(&self.generation);
        let query_owned = query.to_string();
        let (read_at, ranked) = run_blocking(move || {
            let (read_at, rows) = {
                let store = lock(&store)?;
                (generation.load(AtomicOrdering::Acquire), store.all()?)
            };
            Ok((read_at, rank(&query_owned, rows, top_k)))
        })
        .await?;

        debug!(query, top_k, generation = read_at, hits = ranked.len(), "passage search");
        self.cache
            .insert(QueryCache::key(read_at, query, top_k), Arc::new(ranked.clone()))
            .await;
        Ok(ranked)
    }

    async fn ingest(&self, document: DocumentInput) -> Result<usize, RetrievalError> {
        if document.document_id.trim().is_empty() {
            return Err(RetrievalError::InvalidDocument(
                "document id is empty".to_string(),
            ));
        }

        let chunks = self.chunk_document(&document);
        let store = Arc::clone(&self.store);
        let generation = Arc::clone(&self.generation);
        let written = run_blocking(move || {
            let mut store = lock(&store)?;
            let written = store.replace_document(
                &document.document_id,
                document.year,
                &document.source,
                &chunks,
            )?;
            generation.fetch_add(1, AtomicOrdering::Release);
            Ok(written)
        })
        .await?;

        self.cache.invalidate_all();
        Ok(written)
    }
}

/// Score every row, keep those that match at all, best first.
fn rank(query: &str, rows: Vec<StoredPassage>, top_k: usize) -> Vec<Passage> {
    let terms = query_terms(query);
    let mut scored: Vec<(f64, StoredPassage)> = rows
        .into_iter()
        .map(|row| (score(&terms, &row.text, &row.document_id, row.year), row))
        .filter(|(s, _)| *s > 0.0)
        .collect();

    // Ties keep store order (document, page, chunk) for determinism.
    scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(Ordering::Equal));
    scored.truncate(top_k);

    scored
        .into_iter()
        .map(|(relevance_score, row)| Passage {
            text: row.text,
            document_id: row.document_id,
            year: row.year,
            page: row.page,
            relevance_score,
        })
        .collect()
}

fn lock(store: &Mutex<PassageStore>) -> Result<MutexGuard<'_, PassageStore>, RetrievalError> {
    store
        .lock()
        .map_err(|e| RetrievalError::Unavailable(format!("SQLite mutex poisoned: {e}")))
}

async fn run_blocking<T, F>(f: F) -> Result<T, RetrievalError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, RetrievalError> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| RetrievalError::Unavailable(format!("blocking task failed: {e}")))?
}
