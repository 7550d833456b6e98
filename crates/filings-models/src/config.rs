use serde::{Deserialize, Serialize};

/// Top-level configuration for the filings assistant.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct FilingsConfig {
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub market_data: MarketDataConfig,
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,
}

/// Which language-model runtime answers queries.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ModelProvider {
    #[default]
    Ollama,
    ClaudeCli,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModelConfig {
    #[serde(default)]
    pub provider: ModelProvider,
    /// Model name passed to the runtime (`llama3`, `claude-sonnet-4-5-20250929`).
    #[serde(default = "default_model_name")]
    pub name: String,
    /// Base URL of the Ollama server. Ignored by the CLI provider.
    #[serde(default = "default_model_host")]
    pub host: String,
    /// Timeout for a single model call.
    #[serde(default = "default_model_timeout")]
    pub timeout_seconds: u64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            provider: ModelProvider::default(),
            name: default_model_name(),
            host: default_model_host(),
            timeout_seconds: default_model_timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetrievalConfig {
    /// Path to the SQLite passage store.
    #[serde(default = "default_sqlite_path")]
    pub sqlite_path: String,
    /// Directory that `ingest_document` and `filings index` read text files from.
    #[serde(default = "default_documents_dir")]
    pub documents_dir: String,
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    /// Passages scoring below this are not handed to the model.
    #[serde(default = "default_relevance_threshold")]
    pub relevance_threshold: f64,
    /// Chunk length in words.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    /// Words shared between consecutive chunks.
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
    /// Maximum number of cached query results.
    #[serde(default = "default_cache_capacity")]
    pub cache_max_capacity: u64,
    #[serde(default = "default_retrieval_cache_ttl")]
    pub cache_ttl_seconds: u64,
    #[serde(default = "default_retrieval_timeout")]
    pub timeout_seconds: u64,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            sqlite_path: default_sqlite_path(),
            documents_dir: default_documents_dir(),
            top_k: default_top_k(),
            relevance_threshold: default_relevance_threshold(),
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
            cache_max_capacity: default_cache_capacity(),
            cache_ttl_seconds: default_retrieval_cache_ttl(),
            timeout_seconds: default_retrieval_timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MarketDataConfig {
    /// FT API key. Without one, content search answers from offline mock articles.
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_search_url")]
    pub search_url: String,
    #[serde(default = "default_holders_url")]
    pub holders_url: String,
    /// `source` query parameter expected by the holders endpoint.
    #[serde(default = "default_holders_source")]
    pub holders_source: String,
    #[serde(default = "default_market_timeout")]
    pub timeout_seconds: u64,
    /// How long a lookup is served from memory before hitting the provider again.
    #[serde(default = "default_market_cache_ttl")]
    pub cache_ttl_seconds: u64,
    /// Index content-search results into the passage store.
    #[serde(default = "default_true")]
    pub index_results: bool,
}

impl Default for MarketDataConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            search_url: default_search_url(),
            holders_url: default_holders_url(),
            holders_source: default_holders_source(),
            timeout_seconds: default_market_timeout(),
            cache_ttl_seconds: default_market_cache_ttl(),
            index_results: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OrchestratorConfig {
    /// Upper bound on model calls per query. Values below 1 are treated as 1.
    #[serde(default = "default_max_turns")]
    pub max_turns: u32,
    /// Run one market-data search when retrieval finds nothing for a figure query.
    #[serde(default = "default_true")]
    pub market_fallback: bool,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_turns: default_max_turns(),
            market_fallback: true,
        }
    }
}

impl OrchestratorConfig {
    pub fn effective_max_turns(&self) -> u32 {
        self.max_turns.max(1)
    }
}

fn default_model_name() -> String {
    "llama3".to_string()
}
fn default_model_host() -> String {
    "http://localhost:11434".to_string()
}
fn default_model_timeout() -> u64 {
    120
}
fn default_sqlite_path() -> String {
    "data/passages.db".to_string()
}
fn default_documents_dir() -> String {
    "data".to_string()
}
fn default_top_k() -> usize {
    5
}
fn default_relevance_threshold() -> f64 {
    0.25
}
fn default_chunk_size() -> usize {
    500
}
fn default_chunk_overlap() -> usize {
    50
}
fn default_cache_capacity() -> u64 {
    1_000
}
fn default_retrieval_cache_ttl() -> u64 {
    300
}
fn default_retrieval_timeout() -> u64 {
    10
}
fn default_search_url() -> String {
    "https://api.ft.com/content/search/v1".to_string()
}
fn default_holders_url() -> String {
    "https://markets.ft.com/research/webservices/securities/v1/holders".to_string()
}
fn default_holders_source() -> String {
    "befd8ca75ac4a20e".to_string()
}
fn default_market_timeout() -> u64 {
    15
}
fn default_market_cache_ttl() -> u64 {
    600
}
fn default_max_turns() -> u32 {
    4
}
fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_filings_config() {
        let config = FilingsConfig::default();
        let toml_str = toml::to_string(&config).unwrap();
        let parsed: FilingsConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn empty_toml_gives_defaults() {
        let config: FilingsConfig = toml::from_str("").unwrap();
        assert_eq!(config.model.provider, ModelProvider::Ollama);
        assert_eq!(config.model.name, "llama3");
        assert_eq!(config.retrieval.top_k, 5);
        assert_eq!(config.retrieval.chunk_size, 500);
        assert_eq!(config.retrieval.chunk_overlap, 50);
        assert!(config.market_data.api_key.is_none());
        assert!(config.market_data.index_results);
        assert_eq!(config.orchestrator.max_turns, 4);
        assert!(config.orchestrator.market_fallback);
    }

    #[test]
    fn config_from_toml() {
        let toml_str = r#"
[model]
provider = "claude_cli"
name = "claude-sonnet-4-5-20250929"
timeout_seconds = 60

[retrieval]
sqlite_path = "/tmp/passages.db"
relevance_threshold = 0.4

[market_data]
api_key = "secret"
index_results = false

[orchestrator]
max_turns = 6
"#;
        let config: FilingsConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.model.provider, ModelProvider::ClaudeCli);
        assert_eq!(config.model.host, "http://localhost:11434");
        assert_eq!(config.retrieval.sqlite_path, "/tmp/passages.db");
        assert_eq!(config.retrieval.relevance_threshold, 0.4);
        assert_eq!(config.retrieval.top_k, 5);
        assert_eq!(config.market_data.api_key.as_deref(), Some("secret"));
        assert!(!config.market_data.index_results);
        assert_eq!(config.orchestrator.max_turns, 6);
    }

    #[test]
    fn max_turns_floor_is_one() {
        let config = OrchestratorConfig {
            max_turns: 0,
            market_fallback: false,
        };
        assert_eq!(config.effective_max_turns(), 1);
    }
}
