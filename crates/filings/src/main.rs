use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use filings::agents::{AgentError, Orchestrator};
use filings::models::{Answer, FilingsConfig};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "filings",
    about = "Grounded answers about UK PLCs from annual reports and market data"
)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = filings::DEFAULT_CONFIG_PATH)]
    config: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Answer a single question
    Ask {
        query: String,
        /// Print the full Answer as JSON
        #[arg(long)]
        json: bool,
    },
    /// Ask questions interactively until `exit`
    Chat,
    /// Index every .txt report in a directory (default: retrieval.documents_dir)
    Index { dir: Option<PathBuf> },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr so stdout carries only answers (respects RUST_LOG)
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli.config)?;

    match cli.command {
        Command::Ask { query, json } => {
            let orchestrator =
                filings::build_orchestrator(&config).context("Failed to build orchestrator")?;
            let answer = answer_interruptibly(&orchestrator, &query)
                .await
                .map_err(|e| anyhow::anyhow!("Query failed: {e}"))?;
            if json {
                println!("{}", serde_json::to_string_pretty(&answer)?);
            } else {
                print_answer(&answer);
            }
        }
        Command::Chat => {
            let orchestrator =
                filings::build_orchestrator(&config).context("Failed to build orchestrator")?;
            chat(&orchestrator).await?;
        }
        Command::Index { dir } => {
            let dir = dir.unwrap_or_else(|| PathBuf::from(&config.retrieval.documents_dir));
            let index = filings::open_index(&config)?;
            let indexed = filings::index_documents(&index, &dir).await?;
            for file in &indexed {
                println!(
                    "{}: {} passages ({} {})",
                    file.file, file.passages, file.document_id, file.year
                );
            }
            println!("Indexed {} document(s) from {}", indexed.len(), dir.display());
        }
    }

    Ok(())
}

/// The default config path may be absent; an explicit one must exist.
fn load_config(path: &str) -> Result<FilingsConfig> {
    let mut config = if path == filings::DEFAULT_CONFIG_PATH && !Path::new(path).exists() {
        info!(path, "No config file, using defaults");
        FilingsConfig::default()
    } else {
        filings::load_config(Path::new(path))?
    };
    filings::apply_env_overrides(&mut config, |name| std::env::var(name).ok());
    Ok(config)
}

/// Run one query; Ctrl-C cancels it.
async fn answer_interruptibly(
    orchestrator: &Orchestrator,
    query: &str,
) -> Result<Answer, AgentError> {
    let cancel = CancellationToken::new();
    let watcher = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        })
    };
    let outcome = orchestrator.answer_with_cancel(query, &cancel).await;
    watcher.abort();
    outcome
}

async fn chat(orchestrator: &Orchestrator) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();
    println!("Ask about a UK PLC. Type `exit` to quit; Ctrl-C cancels a running query.");

    loop {
        stdout.write_all(b"\n> ").await?;
        stdout.flush().await?;

        let line = tokio::select! {
            line = lines.next_line() => line.context("Failed to read from stdin")?,
            _ = tokio::signal::ctrl_c() => None,
        };
        let Some(line) = line else { break };
        let query = line.trim();
        if query.is_empty() {
            continue;
        }
        if query.eq_ignore_ascii_case("exit") || query.eq_ignore_ascii_case("quit") {
            break;
        }

        match answer_interruptibly(orchestrator, query).await {
            Ok(answer) => print_answer(&answer),
            Err(AgentError::Cancelled) => println!("(cancelled)"),
            Err(e) => {
                warn!(error = %e, "Query failed");
                println!("Error: {e}");
            }
        }
    }
    Ok(())
}

fn print_answer(answer: &Answer) {
    if answer.incomplete {
        println!("[incomplete: stopped after {} turns without a final answer]", answer.turns);
    }
    println!("{}", answer.answer_text);
    if !answer.attributions.is_empty() {
        println!("\nSources:");
        for source in &answer.attributions {
            println!("- {source}");
        }
    }
}
