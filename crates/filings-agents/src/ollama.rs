use std::time::Duration;

use async_trait::async_trait;
use filings_models::Message;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, warn};

use crate::error::AgentError;
use crate::model::LanguageModel;

/// Chat model served by a local Ollama runtime (`/api/chat`).
pub struct OllamaModel {
    client: reqwest::Client,
    host: String,
    model: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatMessage {
    content: String,
}

#[derive(Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<TagEntry>,
}

#[derive(Deserialize)]
struct TagEntry {
    name: String,
}

impl OllamaModel {
    pub fn new(host: &str, model: &str, timeout: Duration) -> Result<Self, AgentError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            host: normalize_host(host),
            model: model.to_string(),
        })
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    /// Probe `GET /api/tags` and return the names of the installed models.
    pub async fn health_check(&self) -> Result<Vec<String>, AgentError> {
        let url = format!("{}/api/tags", self.host);
        let response = self.client.get(&url).send().await?.error_for_status()?;
        let tags: TagsResponse = response.json().await?;
        let names: Vec<String> = tags.models.into_iter().map(|m| m.name).collect();

        let wanted = self.model.as_str();
        if !names
            .iter()
            .any(|n| n == wanted || n.split(':').next() == Some(wanted))
        {
            warn!(model = %self.model, installed = ?names, "configured model not installed in Ollama");
        }
        Ok(names)
    }
}

#[async_trait]
impl LanguageModel for OllamaModel {
    fn name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, messages: &[Message]) -> Result<String, AgentError> {
        let url = format!("{}/api/chat", self.host);
        let body = json!({
            "model": self.model,
            "stream": false,
            "messages": messages,
            "options": { "temperature": 0 },
        });
        debug!(model = %self.model, messages = messages.len(), "Invoking Ollama chat");

        let response = self.client.post(&url).json(&body).send().await?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(AgentError::Model(format!("ollama http error {status}: {text}")));
        }

        let out: ChatResponse = response
            .json()
            .await
            .map_err(|e| AgentError::Model(format!("ollama returned invalid JSON: {e}")))?;
        Ok(out.message.content)
    }
}

fn normalize_host(host: &str) -> String {
    let mut host = host.trim().to_string();
    if host.is_empty() {
        host = "http://localhost:11434".to_string();
    }
    if !host.starts_with("http://") && !host.starts_with("https://") {
        host = format!("http://{host}");
    }
    host.trim_end_matches('/').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_normalization() {
        assert_eq!(normalize_host("localhost:11434/"), "http://localhost:11434");
        assert_eq!(normalize_host(" https://gpu.box:443 "), "https://gpu.box:443");
        assert_eq!(normalize_host(""), "http://localhost:11434");
    }

    #[test]
    fn chat_response_shape() {
        let raw = r#"{"model":"llama3","message":{"role":"assistant","content":"hi"},"done":true}"#;
        let parsed: ChatResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(parsed.message.content, "hi");
    }

    #[test]
    fn messages_serialize_as_ollama_expects() {
        let msgs = vec![Message::system("s"), Message::tool("t")];
        let value = serde_json::to_value(&msgs).unwrap();
        assert_eq!(value[0]["role"], "system");
        assert_eq!(value[1]["role"], "tool");
        assert_eq!(value[1]["content"], "t");
    }
}
