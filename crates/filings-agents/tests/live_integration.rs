//! Integration tests against real model runtimes.
//!
//! These tests are `#[ignore]` by default. They require one of:
//! - a running Ollama server (`OLLAMA_HOST`, default `http://localhost:11434`)
//!   with the model named by `OLLAMA_MODEL` (default `llama3`) pulled
//! - the `claude` CLI installed, on PATH and signed in
//!
//! Run explicitly with:
//! ```bash
//! cargo test -p filings-agents --test live_integration -- --ignored
//! ```

use std::sync::Arc;
use std::time::Duration;

use filings_agents::claude_cli::{check_cli_available, ClaudeCliConfig};
use filings_agents::registry::{RegistrySettings, ToolRegistry};
use filings_agents::test_support::{passage, StaticMarket, StaticRetrieval};
use filings_agents::{parse_signal, ClaudeCliModel, LanguageModel, OllamaModel, Orchestrator};
use filings_models::{Attribution, Message, OrchestratorConfig, Signal};

fn ollama() -> OllamaModel {
    let host = std::env::var("OLLAMA_HOST").unwrap_or_else(|_| "http://localhost:11434".into());
    let model = std::env::var("OLLAMA_MODEL").unwrap_or_else(|_| "llama3".into());
    OllamaModel::new(&host, &model, Duration::from_secs(120)).unwrap()
}

fn barclays_registry() -> Arc<ToolRegistry> {
    Arc::new(ToolRegistry::new(
        Arc::new(StaticRetrieval::new(vec![passage(
            "barclays_2020_ar",
            2020,
            47,
            0.9,
            "Consolidated balance sheet as at 31 December 2020. Total assets £1,349bn.",
        )])),
        Arc::new(StaticMarket::new()),
        RegistrySettings::default(),
    ))
}

/// The configured model must be installed for the other Ollama tests to mean anything.
#[tokio::test]
#[ignore]
async fn ollama_is_reachable() {
    let model = ollama();
    let installed = model.health_check().await.unwrap();
    assert!(!installed.is_empty(), "Ollama at {} has no models", model.host());
}

#[tokio::test]
#[ignore]
async fn ollama_completes_a_chat() {
    let reply = ollama()
        .complete(&[
            Message::system("Reply with the single word: ready"),
            Message::user("Are you ready?"),
        ])
        .await
        .unwrap();
    assert!(!reply.trim().is_empty());
}

/// A real model should follow the tool-call format closely enough for the
/// parser, and cite the passage it was given.
#[tokio::test]
#[ignore]
async fn ollama_answers_from_retrieved_passage() {
    let orchestrator = Orchestrator::new(
        Arc::new(ollama()),
        barclays_registry(),
        OrchestratorConfig::default(),
        Duration::from_secs(120),
    );

    let answer = orchestrator
        .answer("What were Barclays' total assets in 2020?")
        .await
        .unwrap();
    eprintln!("answer: {}", answer.answer_text);
    assert!(answer.tool_calls >= 1, "model never called a tool");
    assert!(answer
        .attributions
        .contains(&Attribution::document("barclays_2020_ar", 2020, 47)));
}

#[tokio::test]
#[ignore]
async fn claude_cli_emits_a_parseable_tool_call() {
    if !check_cli_available().await {
        eprintln!("Skipping: claude CLI not available");
        return;
    }

    let model = ClaudeCliModel::new(ClaudeCliConfig {
        model: "claude-3-5-haiku-latest".to_string(),
        timeout: Duration::from_secs(60),
    });
    let reply = model
        .complete(&[
            Message::system(
                "To search reports reply with exactly one line: TOOL_CALL: rag_query {\"query\": \"...\"}",
            ),
            Message::user("Search the reports for Barclays total assets."),
        ])
        .await
        .unwrap();

    match parse_signal(&reply) {
        Signal::ToolCall(call) => {
            assert_eq!(call.tool_name, "rag_query");
            assert!(call.parameters.contains_key("query"));
        }
        other => panic!("expected a tool call, got {other:?} from {reply:?}"),
    }
}
