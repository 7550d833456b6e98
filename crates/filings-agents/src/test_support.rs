//! Test doubles for the orchestration loop.
//!
//! `ScriptedModel` replays canned assistant replies; `StaticRetrieval` and
//! `StaticMarket` stand in for the passage index and the FT client. All three
//! can share a [`CallLog`] so tests can assert the order in which backends
//! were reached.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use filings_market::{MarketDataError, MarketDataService};
use filings_models::{
    Article, DocumentInput, MarketFacts, MarketLookup, Message, Passage, Shareholder,
};
use filings_retrieval::{RetrievalError, RetrievalService};

use crate::error::AgentError;
use crate::model::LanguageModel;

/// Search endpoint reported by [`StaticMarket`] lookups.
pub const STATIC_SEARCH_URL: &str = "https://api.ft.com/content/search/v1";
/// Holders endpoint reported by [`StaticMarket`] lookups.
pub const STATIC_HOLDERS_URL: &str =
    "https://markets.ft.com/research/webservices/securities/v1/holders";

fn guard<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Fixed lookup time so attributions compare equal across runs.
pub fn fixed_timestamp() -> DateTime<Utc> {
    DateTime::from_timestamp(1_704_164_645, 0).unwrap_or_default()
}

/// Ordered record of backend calls shared between doubles.
#[derive(Debug, Clone, Default)]
pub struct CallLog(Arc<Mutex<Vec<String>>>);

impl CallLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, entry: impl Into<String>) {
        guard(&self.0).push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        guard(&self.0).clone()
    }

    /// Index of the first entry starting with `prefix`.
    pub fn position(&self, prefix: &str) -> Option<usize> {
        guard(&self.0).iter().position(|e| e.starts_with(prefix))
    }
}

enum Script {
    Sequence(VecDeque<String>),
    Repeat(String),
    Unreachable,
}

/// A [`LanguageModel`] that answers from a script instead of a runtime.
pub struct ScriptedModel {
    script: Mutex<Script>,
    failures_left: Mutex<u32>,
    transcripts: Mutex<Vec<Vec<Message>>>,
    delay: Option<Duration>,
    log: Option<CallLog>,
}

impl ScriptedModel {
    fn with_script(script: Script) -> Self {
        Self {
            script: Mutex::new(script),
            failures_left: Mutex::new(0),
            transcripts: Mutex::new(Vec::new()),
            delay: None,
            log: None,
        }
    }

    /// Reply with each entry in order; calls past the end fail.
    pub fn new<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::with_script(Script::Sequence(
            replies.into_iter().map(Into::into).collect(),
        ))
    }

    /// Reply with the same text forever.
    pub fn repeating(reply: impl Into<String>) -> Self {
        Self::with_script(Script::Repeat(reply.into()))
    }

    /// Fail every call as if the runtime were down.
    pub fn unreachable() -> Self {
        Self::with_script(Script::Unreachable)
    }

    /// Fail the next `n` calls before following the script.
    pub fn failing_first(self, n: u32) -> Self {
        *guard(&self.failures_left) = n;
        self
    }

    /// Sleep before every reply.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn with_log(mut self, log: CallLog) -> Self {
        self.log = Some(log);
        self
    }

    pub fn call_count(&self) -> usize {
        guard(&self.transcripts).len()
    }

    /// The message sequence seen by each call, oldest first.
    pub fn transcripts(&self) -> Vec<Vec<Message>> {
        guard(&self.transcripts).clone()
    }
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, messages: &[Message]) -> Result<String, AgentError> {
        guard(&self.transcripts).push(messages.to_vec());
        if let Some(log) = &self.log {
            log.record("model");
        }
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        {
            let mut failures = guard(&self.failures_left);
            if *failures > 0 {
                *failures -= 1;
                return Err(AgentError::Model("connection refused".to_string()));
            }
        }

        match &mut *guard(&self.script) {
            Script::Sequence(replies) => replies
                .pop_front()
                .ok_or_else(|| AgentError::Model("script exhausted".to_string())),
            Script::Repeat(reply) => Ok(reply.clone()),
            Script::Unreachable => Err(AgentError::Model("connection refused".to_string())),
        }
    }
}

/// A [`RetrievalService`] that returns a fixed passage list for every query.
pub struct StaticRetrieval {
    passages: Vec<Passage>,
    unavailable: Option<String>,
    delay: Option<Duration>,
    searches: Mutex<Vec<String>>,
    ingested: Mutex<Vec<DocumentInput>>,
    log: Option<CallLog>,
}

impl StaticRetrieval {
    pub fn new(passages: Vec<Passage>) -> Self {
        Self {
            passages,
            unavailable: None,
            delay: None,
            searches: Mutex::new(Vec::new()),
            ingested: Mutex::new(Vec::new()),
            log: None,
        }
    }

    pub fn empty() -> Self {
        Self::new(Vec::new())
    }

    /// Every search fails with [`RetrievalError::Unavailable`].
    pub fn unavailable(reason: impl Into<String>) -> Self {
        let mut retrieval = Self::empty();
        retrieval.unavailable = Some(reason.into());
        retrieval
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn with_log(mut self, log: CallLog) -> Self {
        self.log = Some(log);
        self
    }

    /// Queries received, oldest first.
    pub fn searches(&self) -> Vec<String> {
        guard(&self.searches).clone()
    }

    pub fn ingested(&self) -> Vec<DocumentInput> {
        guard(&self.ingested).clone()
    }
}

#[async_trait]
impl RetrievalService for StaticRetrieval {
    async fn search(&self, query: &str, top_k: usize) -> Result<Vec<Passage>, RetrievalError> {
        guard(&self.searches).push(query.to_string());
        if let Some(log) = &self.log {
            log.record(format!("retrieval:search:{query}"));
        }
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(reason) = &self.unavailable {
            return Err(RetrievalError::Unavailable(reason.clone()));
        }
        Ok(self.passages.iter().take(top_k).cloned().collect())
    }

    async fn ingest(&self, document: DocumentInput) -> Result<usize, RetrievalError> {
        if let Some(log) = &self.log {
            log.record(format!("retrieval:ingest:{}", document.document_id));
        }
        let pages = document.pages.len();
        guard(&self.ingested).push(document);
        Ok(pages)
    }
}

enum MarketFailure {
    RateLimited,
    Provider(String),
}

/// A [`MarketDataService`] serving fixed articles and holders.
pub struct StaticMarket {
    articles: Vec<Article>,
    holders: Vec<Shareholder>,
    failure: Option<MarketFailure>,
    calls: Mutex<Vec<String>>,
    log: Option<CallLog>,
}

impl Default for StaticMarket {
    fn default() -> Self {
        Self::new()
    }
}

impl StaticMarket {
    pub fn new() -> Self {
        Self {
            articles: Vec::new(),
            holders: Vec::new(),
            failure: None,
            calls: Mutex::new(Vec::new()),
            log: None,
        }
    }

    pub fn with_articles(mut self, articles: Vec<Article>) -> Self {
        self.articles = articles;
        self
    }

    pub fn with_holders(mut self, holders: Vec<Shareholder>) -> Self {
        self.holders = holders;
        self
    }

    /// Every lookup fails with a (recoverable) rate limit.
    pub fn rate_limited() -> Self {
        let mut market = Self::new();
        market.failure = Some(MarketFailure::RateLimited);
        market
    }

    /// Every lookup fails with a (non-recoverable) provider error.
    pub fn provider_error(message: impl Into<String>) -> Self {
        let mut market = Self::new();
        market.failure = Some(MarketFailure::Provider(message.into()));
        market
    }

    pub fn with_log(mut self, log: CallLog) -> Self {
        self.log = Some(log);
        self
    }

    /// Calls received as `search:<query>` / `shareholders:<ticker>`.
    pub fn calls(&self) -> Vec<String> {
        guard(&self.calls).clone()
    }

    fn record(&self, call: String) -> Result<(), MarketDataError> {
        if let Some(log) = &self.log {
            log.record(format!("market:{call}"));
        }
        guard(&self.calls).push(call);
        match &self.failure {
            None => Ok(()),
            Some(MarketFailure::RateLimited) => Err(MarketDataError::RateLimited {
                provider: "FT".to_string(),
            }),
            Some(MarketFailure::Provider(message)) => Err(MarketDataError::Provider {
                provider: "FT".to_string(),
                message: message.clone(),
            }),
        }
    }
}

#[async_trait]
impl MarketDataService for StaticMarket {
    async fn search(
        &self,
        query: &str,
        max_results: usize,
    ) -> Result<MarketLookup, MarketDataError> {
        self.record(format!("search:{query}"))?;
        Ok(MarketLookup {
            facts: MarketFacts::Articles(
                self.articles.iter().take(max_results).cloned().collect(),
            ),
            source_url: STATIC_SEARCH_URL.to_string(),
            timestamp: fixed_timestamp(),
        })
    }

    async fn shareholders(&self, ticker: &str) -> Result<MarketLookup, MarketDataError> {
        self.record(format!("shareholders:{ticker}"))?;
        Ok(MarketLookup {
            facts: MarketFacts::Shareholders(self.holders.clone()),
            source_url: format!("{STATIC_HOLDERS_URL}?symbols={ticker}"),
            timestamp: fixed_timestamp(),
        })
    }
}

/// A passage with a given score, for building fixtures.
pub fn passage(document_id: &str, year: i32, page: u32, score: f64, text: &str) -> Passage {
    Passage {
        text: text.to_string(),
        document_id: document_id.to_string(),
        year,
        page,
        relevance_score: score,
    }
}

pub fn article(id: &str, title: &str, excerpt: &str, published: Option<&str>) -> Article {
    Article {
        id: id.to_string(),
        title: title.to_string(),
        excerpt: excerpt.to_string(),
        published: published.map(str::to_string),
    }
}
