use std::time::Duration;

use async_trait::async_trait;
use filings_models::{Message, Role};
use tokio::process::Command;
use tracing::{debug, warn};

use crate::error::AgentError;
use crate::model::LanguageModel;

/// Configuration for a Claude CLI invocation.
#[derive(Debug, Clone)]
pub struct ClaudeCliConfig {
    pub model: String,
    pub timeout: Duration,
}

impl Default for ClaudeCliConfig {
    fn default() -> Self {
        Self {
            model: "claude-sonnet-4-5-20250929".to_string(),
            timeout: Duration::from_secs(120),
        }
    }
}

/// Invoke the `claude` CLI with a system prompt and user prompt.
/// Returns the raw stdout text.
pub async fn invoke_claude(
    system_prompt: &str,
    user_prompt: &str,
    config: &ClaudeCliConfig,
) -> Result<String, AgentError> {
    debug!(model = %config.model, "Invoking claude CLI");

    let result = tokio::time::timeout(config.timeout, async {
        Command::new("claude")
            .args([
                "-p",
                user_prompt,
                "--system-prompt",
                system_prompt,
                "--model",
                &config.model,
                "--output-format",
                "text",
            ])
            .kill_on_drop(true)
            .output()
            .await
    })
    .await
    .map_err(|_| AgentError::Timeout(config.timeout.as_secs()))?
    .map_err(|e| AgentError::Cli(format!("Failed to spawn claude: {e}")))?;

    if !result.status.success() {
        let stderr = String::from_utf8_lossy(&result.stderr);
        warn!(status = %result.status, stderr = %stderr, "Claude CLI failed");
        return Err(AgentError::Cli(format!(
            "claude exited {}: {}",
            result.status, stderr
        )));
    }

    let stdout = String::from_utf8_lossy(&result.stdout).to_string();
    if stdout.trim().is_empty() {
        return Err(AgentError::Cli(
            "Claude returned empty response".to_string(),
        ));
    }

    Ok(stdout)
}

/// Check if the `claude` CLI is available on the system.
pub async fn check_cli_available() -> bool {
    match Command::new("claude").arg("--version").output().await {
        Ok(output) => output.status.success(),
        Err(_) => false,
    }
}

/// A [`LanguageModel`] backed by one-shot `claude -p` invocations.
///
/// The CLI is stateless, so each call sends the system messages as the
/// system prompt and the rest of the conversation as a labelled transcript.
pub struct ClaudeCliModel {
    config: ClaudeCliConfig,
}

impl ClaudeCliModel {
    pub fn new(config: ClaudeCliConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl LanguageModel for ClaudeCliModel {
    fn name(&self) -> &str {
        &self.config.model
    }

    async fn complete(&self, messages: &[Message]) -> Result<String, AgentError> {
        let (system_prompt, transcript) = render_transcript(messages);
        invoke_claude(&system_prompt, &transcript, &self.config).await
    }
}

/// Split a conversation into (system prompt, transcript of the other turns).
pub fn render_transcript(messages: &[Message]) -> (String, String) {
    let system_prompt = messages
        .iter()
        .filter(|m| m.role == Role::System)
        .map(|m| m.content.as_str())
        .collect::<Vec<_>>()
        .join("\n\n");

    let mut transcript = String::new();
    for message in messages.iter().filter(|m| m.role != Role::System) {
        let label = match message.role {
            Role::User => "USER",
            Role::Assistant => "ASSISTANT",
            Role::Tool => "TOOL RESULT",
            Role::System => continue,
        };
        transcript.push_str(&format!("[{label}]\n{}\n\n", message.content.trim()));
    }
    transcript.push_str("[ASSISTANT]\n");

    (system_prompt, transcript)
}
