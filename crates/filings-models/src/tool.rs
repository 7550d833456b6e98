use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::attribution::Attribution;

/// Tool parameters as the model supplied them: name → string value.
pub type ParamMap = BTreeMap<String, String>;

/// A tool call requested by the model, parsed from assistant text.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ToolCallSignal {
    pub tool_name: String,
    pub parameters: ParamMap,
}

/// Outcome of scanning one assistant message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Signal {
    /// No tool marker: the text is the model's answer.
    FinalAnswer(String),
    /// Exactly one well-formed tool call.
    ToolCall(ToolCallSignal),
    /// A marker was present but could not be read unambiguously.
    Unparseable { reason: String },
}

/// Which backend a tool is bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    Retrieval,
    MarketSearch,
    Shareholders,
    Ingest,
}

impl Capability {
    pub fn is_market(&self) -> bool {
        matches!(self, Capability::MarketSearch | Capability::Shareholders)
    }
}

/// Tool output before it is rendered into a tool message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum ToolPayload {
    Text(String),
    Structured(serde_json::Value),
}

impl ToolPayload {
    pub fn render(&self) -> String {
        match self {
            ToolPayload::Text(text) => text.clone(),
            ToolPayload::Structured(value) => {
                serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Timeout,
    Transport,
    RateLimited,
    Backend,
}

/// Structured description of a failed backend call.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ToolFailure {
    pub kind: FailureKind,
    pub message: String,
    /// Whether repeating the same call later may succeed.
    pub retryable: bool,
}

/// Normalized result of one tool invocation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolResult {
    pub tool_name: String,
    pub capability: Capability,
    pub payload: ToolPayload,
    pub attributions: Vec<Attribution>,
    pub success: bool,
    pub error_detail: Option<ToolFailure>,
}

impl ToolResult {
    pub fn success(
        tool_name: impl Into<String>,
        capability: Capability,
        payload: ToolPayload,
        attributions: Vec<Attribution>,
    ) -> Self {
        Self {
            tool_name: tool_name.into(),
            capability,
            payload,
            attributions,
            success: true,
            error_detail: None,
        }
    }

    pub fn failure(
        tool_name: impl Into<String>,
        capability: Capability,
        failure: ToolFailure,
    ) -> Self {
        Self {
            tool_name: tool_name.into(),
            capability,
            payload: ToolPayload::Text(String::new()),
            attributions: Vec::new(),
            success: false,
            error_detail: Some(failure),
        }
    }

    /// Text of the tool message folded into the conversation: the payload
    /// followed by a "Sources:" footer, or a failure report.
    pub fn render_message(&self) -> String {
        if !self.success {
            let (kind, message, retryable) = match &self.error_detail {
                Some(f) => (f.kind, f.message.as_str(), f.retryable),
                None => (FailureKind::Backend, "unknown failure", false),
            };
            let hint = if retryable {
                "The call may succeed if retried later, or try another tool."
            } else {
                "Try another tool or answer with the evidence you already have."
            };
            return format!(
                "Tool `{}` failed ({}): {message}\n{hint}",
                self.tool_name,
                serde_json::to_value(kind)
                    .ok()
                    .and_then(|v| v.as_str().map(str::to_string))
                    .unwrap_or_else(|| "backend".to_string()),
            );
        }

        let mut out = format!("Result of `{}`:\n{}", self.tool_name, self.payload.render());
        if !self.attributions.is_empty() {
            out.push_str("\n\nSources:");
            for attr in &self.attributions {
                out.push_str("\n- ");
                out.push_str(&attr.citation());
            }
        }
        out
    }
}
