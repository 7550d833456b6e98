//! Filings - grounded answers about UK PLCs
//!
//! A local language model answers questions about listed companies by calling
//! tools over indexed annual reports and Financial Times market data. Every
//! answer carries the attributions (document page, or source URL and time)
//! of the evidence it was built from.
//!
//! # Library Usage
//!
//! ```rust,no_run
//! use filings::models::FilingsConfig;
//!
//! # async fn run() -> anyhow::Result<()> {
//! let config = FilingsConfig::default();
//! let orchestrator = filings::build_orchestrator(&config)?;
//! let answer = orchestrator.answer("What were Barclays' total assets in 2020?").await?;
//! for source in &answer.attributions {
//!     println!("{source}");
//! }
//! # Ok(())
//! # }
//! ```

pub use filings_agents as agents;
pub use filings_market as market;
pub use filings_models as models;
pub use filings_retrieval as retrieval;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use filings_agents::claude_cli::ClaudeCliConfig;
use filings_agents::{
    ClaudeCliModel, LanguageModel, OllamaModel, Orchestrator, RegistrySettings, ToolRegistry,
};
use filings_market::FtClient;
use filings_models::{FilingsConfig, ModelProvider};
use filings_retrieval::{
    list_text_documents, load_text_document, PassageIndex, RetrievalService,
};
use tracing::{info, warn};

pub const DEFAULT_CONFIG_PATH: &str = "config/filings.toml";

/// Read a TOML config file. Missing sections and fields take their defaults.
pub fn load_config(path: &Path) -> anyhow::Result<FilingsConfig> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config: {}", path.display()))?;
    toml::from_str(&raw).with_context(|| format!("Failed to parse config: {}", path.display()))
}

/// Apply `OLLAMA_HOST`, `OLLAMA_MODEL` and `FT_API_KEY` on top of the file
/// config. Empty values are ignored.
pub fn apply_env_overrides<F>(config: &mut FilingsConfig, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

    if let Some(host) = var("OLLAMA_HOST") {
        config.model.host = host;
    }
    if let Some(name) = var("OLLAMA_MODEL") {
        config.model.name = name;
    }
    if let Some(key) = var("FT_API_KEY") {
        config.market_data.api_key = Some(key);
    }
}

/// Open (creating if needed) the passage store named in the config.
pub fn open_index(config: &FilingsConfig) -> anyhow::Result<PassageIndex> {
    let path = Path::new(&config.retrieval.sqlite_path);
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    PassageIndex::open(&config.retrieval)
        .with_context(|| format!("Failed to open passage store: {}", path.display()))
}

/// Build the language model selected by `config.model.provider`.
pub fn build_model(config: &FilingsConfig) -> anyhow::Result<Arc<dyn LanguageModel>> {
    let timeout = Duration::from_secs(config.model.timeout_seconds);
    let model: Arc<dyn LanguageModel> = match config.model.provider {
        ModelProvider::Ollama => Arc::new(
            OllamaModel::new(&config.model.host, &config.model.name, timeout)
                .context("Failed to build Ollama client")?,
        ),
        ModelProvider::ClaudeCli => Arc::new(ClaudeCliModel::new(ClaudeCliConfig {
            model: config.model.name.clone(),
            timeout,
        })),
    };
    Ok(model)
}

/// Build an Orchestrator from configuration.
pub fn build_orchestrator(config: &FilingsConfig) -> anyhow::Result<Orchestrator> {
    let index = Arc::new(open_index(config)?);
    let market = FtClient::new(config.market_data.clone()).context("Failed to build FT client")?;
    if market.is_offline() {
        info!("No FT API key configured, content search serves offline articles");
    }

    let registry = ToolRegistry::new(
        index,
        Arc::new(market),
        RegistrySettings::from_config(config),
    );
    let model = build_model(config)?;

    Ok(Orchestrator::new(
        model,
        Arc::new(registry),
        config.orchestrator.clone(),
        Duration::from_secs(config.model.timeout_seconds),
    ))
}

/// One file indexed by [`index_documents`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexedFile {
    pub file: String,
    pub document_id: String,
    pub year: i32,
    pub passages: usize,
}

/// Ingest every `.txt` file in `dir`. Files that cannot be read or have no
/// year in their name are skipped with a warning.
pub async fn index_documents(
    retrieval: &dyn RetrievalService,
    dir: &Path,
) -> anyhow::Result<Vec<IndexedFile>> {
    let files = list_text_documents(dir)
        .with_context(|| format!("Failed to list documents in {}", dir.display()))?;

    let mut indexed = Vec::with_capacity(files.len());
    for file in files {
        let document = match load_text_document(dir, &file, None, None) {
            Ok(document) => document,
            Err(e) => {
                warn!(file = %file, error = %e, "Skipping document");
                continue;
            }
        };
        let document_id = document.document_id.clone();
        let year = document.year;
        let passages = retrieval
            .ingest(document)
            .await
            .with_context(|| format!("Failed to index {file}"))?;
        info!(file = %file, document_id = %document_id, passages, "Indexed document");
        indexed.push(IndexedFile {
            file,
            document_id,
            year,
            passages,
        });
    }
    Ok(indexed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use filings_models::RetrievalConfig;
    use filings_retrieval::PassageStore;
    use std::collections::HashMap;

    #[test]
    fn env_overrides_replace_file_values() {
        let env: HashMap<&str, &str> = [
            ("OLLAMA_HOST", "http://gpu-box:11434"),
            ("OLLAMA_MODEL", "mistral"),
            ("FT_API_KEY", "  "),
        ]
        .into_iter()
        .collect();

        let mut config = FilingsConfig::default();
        apply_env_overrides(&mut config, |name| env.get(name).map(|v| v.to_string()));

        assert_eq!(config.model.host, "http://gpu-box:11434");
        assert_eq!(config.model.name, "mistral");
        assert_eq!(config.market_data.api_key, None);
    }

    #[test]
    fn config_file_is_loaded_with_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("filings.toml");
        std::fs::write(&path, "[orchestrator]\nmax_turns = 6\n").unwrap();

        let config = load_config(&path).unwrap();
        assert_eq!(config.orchestrator.max_turns, 6);
        assert_eq!(config.retrieval.top_k, 5);

        assert!(load_config(&dir.path().join("absent.toml")).is_err());
    }

    #[test]
    fn shipped_config_matches_defaults() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("../../config/filings.toml");
        assert_eq!(load_config(&path).unwrap(), FilingsConfig::default());
    }

    #[test]
    fn orchestrator_builds_without_contacting_backends() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = FilingsConfig::default();
        config.retrieval.sqlite_path = dir
            .path()
            .join("nested/passages.db")
            .to_string_lossy()
            .into_owned();

        let orchestrator = build_orchestrator(&config).unwrap();
        assert_eq!(orchestrator.model_name(), "llama3");
        assert_eq!(orchestrator.registry().tool_names().len(), 4);
        assert!(dir.path().join("nested/passages.db").exists());

        config.model.provider = ModelProvider::ClaudeCli;
        config.model.name = "claude-sonnet-4-5-20250929".to_string();
        assert_eq!(
            build_model(&config).unwrap().name(),
            "claude-sonnet-4-5-20250929"
        );
    }

    #[tokio::test]
    async fn index_documents_ingests_text_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("barclays_2020_ar.txt"),
            "Strategic report\x0cConsolidated balance sheet. Total assets £1,349bn",
        )
        .unwrap();
        std::fs::write(dir.path().join("notes.txt"), "no year here").unwrap();
        std::fs::write(dir.path().join("cover.pdf"), "%PDF").unwrap();

        let index = PassageIndex::new(
            PassageStore::open_in_memory().unwrap(),
            &RetrievalConfig::default(),
        );
        let indexed = index_documents(&index, dir.path()).await.unwrap();

        assert_eq!(
            indexed,
            vec![IndexedFile {
                file: "barclays_2020_ar.txt".to_string(),
                document_id: "barclays_2020_ar".to_string(),
                year: 2020,
                passages: 2,
            }]
        );
        let hits = index.search("total assets", 5).await.unwrap();
        assert_eq!(hits[0].page, 2);
    }
}
