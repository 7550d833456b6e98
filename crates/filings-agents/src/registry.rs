use std::collections::BTreeMap;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{Datelike, Utc};
use filings_market::{MarketDataError, MarketDataService};
use filings_models::{
    Attribution, Capability, DocumentInput, FailureKind, FilingsConfig, MarketFacts, PageText,
    ParamMap, ToolFailure, ToolPayload, ToolResult,
};
use filings_retrieval::ingest::year_in;
use filings_retrieval::{load_text_document, RetrievalError, RetrievalService};
use tracing::{debug, info, warn};

use crate::error::ToolError;

pub const RAG_QUERY: &str = "rag_query";
pub const SEARCH_PLC: &str = "search_plc";
pub const GET_SHAREHOLDERS: &str = "get_shareholders";
pub const INGEST_DOCUMENT: &str = "ingest_document";

const MAX_COUNT: usize = 20;
const DEFAULT_MAX_RESULTS: usize = 5;

/// Accepted shape of a parameter value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    /// Non-empty free text.
    Text,
    /// Integer within an inclusive range.
    Count { min: usize, max: usize },
    /// `SYMBOL:EXCHANGE`, e.g. `BARC:LSE`.
    Ticker,
    /// Bare file name, no directory components.
    FileName,
    /// Four-digit year, 1900..=2099.
    Year,
}

impl ParamKind {
    fn describe(&self) -> String {
        match self {
            ParamKind::Text => "text".to_string(),
            ParamKind::Count { min, max } => format!("integer {min}-{max}"),
            ParamKind::Ticker => "SYMBOL:EXCHANGE".to_string(),
            ParamKind::FileName => "file name".to_string(),
            ParamKind::Year => "year".to_string(),
        }
    }

    /// `None` when `value` is acceptable, otherwise what is wrong with it.
    fn check(&self, name: &str, value: &str) -> Option<String> {
        match self {
            ParamKind::Text => None,
            ParamKind::Count { min, max } => match value.parse::<usize>() {
                Ok(n) if (*min..=*max).contains(&n) => None,
                _ => Some(format!(
                    "`{name}` must be an integer between {min} and {max} (got \"{value}\")"
                )),
            },
            ParamKind::Ticker => {
                let valid = value.split_once(':').is_some_and(|(symbol, exchange)| {
                    is_ticker_part(symbol) && is_ticker_part(exchange)
                });
                (!valid).then(|| {
                    format!("`{name}` must look like SYMBOL:EXCHANGE, e.g. BARC:LSE (got \"{value}\")")
                })
            }
            ParamKind::FileName => {
                let bare = !value.contains(['/', '\\']) && !value.contains("..");
                (!bare).then(|| {
                    format!("`{name}` must be a plain file name inside the documents directory (got \"{value}\")")
                })
            }
            ParamKind::Year => match value.parse::<i32>() {
                Ok(y) if (1900..=2099).contains(&y) => None,
                _ => Some(format!("`{name}` must be a four-digit year (got \"{value}\")")),
            },
        }
    }
}

fn is_ticker_part(part: &str) -> bool {
    !part.is_empty()
        && part
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '-')
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParamSpec {
    pub name: &'static str,
    pub kind: ParamKind,
    pub required: bool,
    pub description: &'static str,
}

impl ParamSpec {
    const fn required(name: &'static str, kind: ParamKind, description: &'static str) -> Self {
        Self {
            name,
            kind,
            required: true,
            description,
        }
    }

    const fn optional(name: &'static str, kind: ParamKind, description: &'static str) -> Self {
        Self {
            name,
            kind,
            required: false,
            description,
        }
    }

    /// One-line form used in the system prompt.
    pub fn signature(&self) -> String {
        format!(
            "{} ({}, {}): {}",
            self.name,
            self.kind.describe(),
            if self.required { "required" } else { "optional" },
            self.description
        )
    }
}

/// A tool the model may call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolSpec {
    pub name: &'static str,
    pub description: &'static str,
    pub params: Vec<ParamSpec>,
    pub capability: Capability,
}

/// Registry settings taken from [`FilingsConfig`].
#[derive(Debug, Clone, PartialEq)]
pub struct RegistrySettings {
    pub top_k: usize,
    pub relevance_threshold: f64,
    pub documents_dir: PathBuf,
    pub retrieval_timeout: Duration,
    pub market_timeout: Duration,
    /// Index `search_plc` articles into the passage store.
    pub index_market_results: bool,
}

impl RegistrySettings {
    pub fn from_config(config: &FilingsConfig) -> Self {
        Self {
            top_k: config.retrieval.top_k.clamp(1, MAX_COUNT),
            relevance_threshold: config.retrieval.relevance_threshold,
            documents_dir: PathBuf::from(&config.retrieval.documents_dir),
            retrieval_timeout: Duration::from_secs(config.retrieval.timeout_seconds),
            market_timeout: Duration::from_secs(config.market_data.timeout_seconds),
            index_market_results: config.market_data.index_results,
        }
    }
}

impl Default for RegistrySettings {
    fn default() -> Self {
        Self::from_config(&FilingsConfig::default())
    }
}

fn tool_specs() -> Vec<ToolSpec> {
    vec![
        ToolSpec {
            name: RAG_QUERY,
            description: "Search the indexed annual reports for passages relevant to a question. \
                          Each passage is cited by document, year and page.",
            params: vec![
                ParamSpec::required("query", ParamKind::Text, "what to look for"),
                ParamSpec::optional(
                    "k",
                    ParamKind::Count { min: 1, max: MAX_COUNT },
                    "number of passages to return",
                ),
            ],
            capability: Capability::Retrieval,
        },
        ToolSpec {
            name: SEARCH_PLC,
            description: "Search Financial Times news coverage of a listed company.",
            params: vec![
                ParamSpec::required("company_name", ParamKind::Text, "company to search for"),
                ParamSpec::optional(
                    "max_results",
                    ParamKind::Count { min: 1, max: MAX_COUNT },
                    "number of articles to return (default 5)",
                ),
            ],
            capability: Capability::MarketSearch,
        },
        ToolSpec {
            name: GET_SHAREHOLDERS,
            description: "Look up the major institutional shareholders of a listed company.",
            params: vec![ParamSpec::required(
                "ticker",
                ParamKind::Ticker,
                "exchange ticker such as BARC:LSE",
            )],
            capability: Capability::Shareholders,
        },
        ToolSpec {
            name: INGEST_DOCUMENT,
            description: "Index a text annual report from the documents directory so it can be searched.",
            params: vec![
                ParamSpec::required("file", ParamKind::FileName, "text file to index"),
                ParamSpec::optional(
                    "document_id",
                    ParamKind::Text,
                    "identifier used in citations (default: file name without extension)",
                ),
                ParamSpec::optional(
                    "year",
                    ParamKind::Year,
                    "reporting year (default: taken from the file name)",
                ),
            ],
            capability: Capability::Ingest,
        },
    ]
}

/// Fixed set of tools bound to their backends.
///
/// Request-level problems (unknown tool, bad parameters) come back as
/// `Err(ToolError)`; anything that goes wrong in a backend is folded into an
/// `Ok(ToolResult)` with `success == false`.
pub struct ToolRegistry {
    specs: Vec<ToolSpec>,
    retrieval: Arc<dyn RetrievalService>,
    market: Arc<dyn MarketDataService>,
    settings: RegistrySettings,
}

impl ToolRegistry {
    pub fn new(
        retrieval: Arc<dyn RetrievalService>,
        market: Arc<dyn MarketDataService>,
        settings: RegistrySettings,
    ) -> Self {
        Self {
            specs: tool_specs(),
            retrieval,
            market,
            settings,
        }
    }

    pub fn specs(&self) -> &[ToolSpec] {
        &self.specs
    }

    pub fn settings(&self) -> &RegistrySettings {
        &self.settings
    }

    pub fn tool_names(&self) -> Vec<String> {
        self.specs.iter().map(|s| s.name.to_string()).collect()
    }

    /// Case-insensitive lookup, surrounding whitespace ignored.
    pub fn lookup(&self, name: &str) -> Option<&ToolSpec> {
        let name = name.trim();
        self.specs.iter().find(|s| s.name.eq_ignore_ascii_case(name))
    }

    pub fn capability_of(&self, name: &str) -> Option<Capability> {
        self.lookup(name).map(|s| s.capability)
    }

    pub async fn invoke(&self, name: &str, parameters: &ParamMap) -> Result<ToolResult, ToolError> {
        let spec = self.lookup(name).ok_or_else(|| ToolError::UnknownTool {
            name: name.trim().to_string(),
            available: self.tool_names(),
        })?;
        let params = validate(spec, parameters)?;

        let start = Instant::now();
        let result = match spec.capability {
            Capability::Retrieval => self.run_retrieval(&params).await,
            Capability::MarketSearch => self.run_market_search(&params).await,
            Capability::Shareholders => self.run_shareholders(&params).await,
            Capability::Ingest => self.run_ingest(&params).await,
        };

        info!(
            tool = spec.name,
            success = result.success,
            attributions = result.attributions.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Tool invoked"
        );
        Ok(result)
    }

    async fn run_retrieval(&self, params: &BTreeMap<String, String>) -> ToolResult {
        let query = text_param(params, "query");
        let k = count_param(params, "k").unwrap_or(self.settings.top_k);
        let threshold = self.settings.relevance_threshold;

        let passages = match within(
            self.settings.retrieval_timeout,
            self.retrieval.search(&query, k),
        )
        .await
        {
            Ok(Ok(passages)) => passages,
            Ok(Err(e)) => {
                return ToolResult::failure(RAG_QUERY, Capability::Retrieval, retrieval_failure(&e))
            }
            Err(failure) => return ToolResult::failure(RAG_QUERY, Capability::Retrieval, failure),
        };

        let relevant: Vec<_> = passages
            .into_iter()
            .filter(|p| p.relevance_score >= threshold)
            .collect();
        debug!(query = %query, k, relevant = relevant.len(), "Retrieval filtered");

        if relevant.is_empty() {
            return ToolResult::success(
                RAG_QUERY,
                Capability::Retrieval,
                ToolPayload::Text(format!(
                    "No passages above the relevance threshold ({threshold:.2}) for \"{query}\"."
                )),
                Vec::new(),
            );
        }

        let mut attributions: Vec<Attribution> = Vec::new();
        let mut blocks = Vec::with_capacity(relevant.len());
        for (i, passage) in relevant.iter().enumerate() {
            let attribution = passage.attribution();
            blocks.push(format!(
                "[{}] {} (score {:.2})\n{}",
                i + 1,
                attribution.citation(),
                passage.relevance_score,
                passage.text.trim()
            ));
            if !attributions.contains(&attribution) {
                attributions.push(attribution);
            }
        }

        ToolResult::success(
            RAG_QUERY,
            Capability::Retrieval,
            ToolPayload::Text(blocks.join("\n\n")),
            attributions,
        )
    }

    async fn run_market_search(&self, params: &BTreeMap<String, String>) -> ToolResult {
        let company = text_param(params, "company_name");
        let max_results = count_param(params, "max_results").unwrap_or(DEFAULT_MAX_RESULTS);

        let lookup = match within(
            self.settings.market_timeout,
            self.market.search(&company, max_results),
        )
        .await
        {
            Ok(Ok(lookup)) => lookup,
            Ok(Err(e)) => {
                return ToolResult::failure(SEARCH_PLC, Capability::MarketSearch, market_failure(&e))
            }
            Err(failure) => {
                return ToolResult::failure(SEARCH_PLC, Capability::MarketSearch, failure)
            }
        };

        if self.settings.index_market_results {
            if let MarketFacts::Articles(articles) = &lookup.facts {
                self.index_articles(articles, &lookup.source_url).await;
            }
        }

        market_result(SEARCH_PLC, Capability::MarketSearch, lookup)
    }

    async fn run_shareholders(&self, params: &BTreeMap<String, String>) -> ToolResult {
        let ticker = text_param(params, "ticker").to_uppercase();

        let lookup = match within(self.settings.market_timeout, self.market.shareholders(&ticker))
            .await
        {
            Ok(Ok(lookup)) => lookup,
            Ok(Err(e)) => {
                return ToolResult::failure(
                    GET_SHAREHOLDERS,
                    Capability::Shareholders,
                    market_failure(&e),
                )
            }
            Err(failure) => {
                return ToolResult::failure(GET_SHAREHOLDERS, Capability::Shareholders, failure)
            }
        };

        market_result(GET_SHAREHOLDERS, Capability::Shareholders, lookup)
    }

    async fn run_ingest(&self, params: &BTreeMap<String, String>) -> ToolResult {
        let file = text_param(params, "file");
        let document_id = params.get("document_id").cloned();
        let year = params.get("year").and_then(|y| y.parse::<i32>().ok());
        let dir = self.settings.documents_dir.clone();
        let retrieval = Arc::clone(&self.retrieval);
        let file_name = file.clone();

        let work = async move {
            let document = tokio::task::spawn_blocking(move || {
                load_text_document(&dir, &file_name, document_id.as_deref(), year)
            })
            .await
            .map_err(|e| RetrievalError::Unavailable(format!("loader task failed: {e}")))??;
            let summary = (document.document_id.clone(), document.year);
            let written = retrieval.ingest(document).await?;
            Ok::<_, RetrievalError>((summary, written))
        };

        match within(self.settings.retrieval_timeout, work).await {
            Ok(Ok(((id, year), written))) => ToolResult::success(
                INGEST_DOCUMENT,
                Capability::Ingest,
                ToolPayload::Text(format!(
                    "Indexed {written} passages from {file} as {id} ({year})."
                )),
                Vec::new(),
            ),
            Ok(Err(e)) => {
                ToolResult::failure(INGEST_DOCUMENT, Capability::Ingest, retrieval_failure(&e))
            }
            Err(failure) => ToolResult::failure(INGEST_DOCUMENT, Capability::Ingest, failure),
        }
    }

    /// Make content-search articles retrievable. Failures only cost recall.
    async fn index_articles(&self, articles: &[filings_models::Article], source_url: &str) {
        let current_year = Utc::now().year();
        for article in articles {
            let year = article
                .published
                .as_deref()
                .and_then(year_in)
                .unwrap_or(current_year);
            let document = DocumentInput {
                document_id: format!("ft_{}", article.id),
                year,
                source: source_url.to_string(),
                pages: vec![PageText {
                    page: 1,
                    text: format!("{} - {}", article.title, article.excerpt),
                }],
            };
            match within(self.settings.retrieval_timeout, self.retrieval.ingest(document)).await {
                Ok(Ok(_)) => {}
                Ok(Err(e)) => warn!(article = %article.id, error = %e, "Failed to index article"),
                Err(f) => warn!(article = %article.id, error = %f.message, "Failed to index article"),
            }
        }
    }
}

/// Normalize keys (trimmed, lowercase) and values (trimmed), then check
/// every declared parameter. Extra parameters are dropped.
fn validate(spec: &ToolSpec, parameters: &ParamMap) -> Result<BTreeMap<String, String>, ToolError> {
    let supplied: BTreeMap<String, String> = parameters
        .iter()
        .map(|(k, v)| (k.trim().to_lowercase(), v.trim().to_string()))
        .filter(|(_, v)| !v.is_empty())
        .collect();

    let mut params = BTreeMap::new();
    let mut problems = Vec::new();
    for param in &spec.params {
        match supplied.get(param.name) {
            None if param.required => {
                problems.push(format!("missing required parameter `{}`", param.name))
            }
            None => {}
            Some(value) => match param.kind.check(param.name, value) {
                Some(problem) => problems.push(problem),
                None => {
                    params.insert(param.name.to_string(), value.clone());
                }
            },
        }
    }

    if problems.is_empty() {
        Ok(params)
    } else {
        Err(ToolError::InvalidParameters {
            tool: spec.name.to_string(),
            problems,
        })
    }
}

fn text_param(params: &BTreeMap<String, String>, name: &str) -> String {
    params.get(name).cloned().unwrap_or_default()
}

fn count_param(params: &BTreeMap<String, String>, name: &str) -> Option<usize> {
    params.get(name).and_then(|v| v.parse().ok())
}

/// Run `fut` under `limit`; elapsing becomes a retryable timeout failure.
async fn within<T>(limit: Duration, fut: impl Future<Output = T>) -> Result<T, ToolFailure> {
    tokio::time::timeout(limit, fut)
        .await
        .map_err(|_| ToolFailure {
            kind: FailureKind::Timeout,
            message: format!("no response within {} ms", limit.as_millis()),
            retryable: true,
        })
}

fn retrieval_failure(e: &RetrievalError) -> ToolFailure {
    match e {
        RetrievalError::Unavailable(_) => ToolFailure {
            kind: FailureKind::Transport,
            message: e.to_string(),
            retryable: true,
        },
        _ => ToolFailure {
            kind: FailureKind::Backend,
            message: e.to_string(),
            retryable: false,
        },
    }
}

fn market_failure(e: &MarketDataError) -> ToolFailure {
    ToolFailure {
        kind: e.failure_kind(),
        message: e.to_string(),
        retryable: e.is_recoverable(),
    }
}

/// Facts become a structured payload; the lookup is only cited when it
/// returned something.
fn market_result(
    tool: &str,
    capability: Capability,
    lookup: filings_models::MarketLookup,
) -> ToolResult {
    let value = match serde_json::to_value(&lookup.facts) {
        Ok(value) => value,
        Err(e) => {
            return ToolResult::failure(
                tool,
                capability,
                ToolFailure {
                    kind: FailureKind::Backend,
                    message: format!("could not encode market data: {e}"),
                    retryable: false,
                },
            )
        }
    };
    let attributions = if lookup.facts.is_empty() {
        Vec::new()
    } else {
        vec![lookup.attribution()]
    };
    ToolResult::success(tool, capability, ToolPayload::Structured(value), attributions)
}
