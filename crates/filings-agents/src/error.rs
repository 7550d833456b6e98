use thiserror::Error;

#[derive(Error, Debug)]
pub enum AgentError {
    /// Every attempt at a model call failed; the query cannot proceed.
    #[error("Language model unavailable after {attempts} attempt(s): {detail}")]
    ModelUnavailable { attempts: u32, detail: String },

    #[error("Language model error: {0}")]
    Model(String),

    #[error("Claude CLI error: {0}")]
    Cli(String),

    #[error("Agent timed out after {0} seconds")]
    Timeout(u64),

    #[error("Query cancelled")]
    Cancelled,

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Request-level tool failures, reported back to the model as corrective
/// tool messages rather than ending the query.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ToolError {
    #[error("Unknown tool '{name}'. Available tools: {}", available.join(", "))]
    UnknownTool { name: String, available: Vec<String> },

    #[error("Invalid parameters for '{tool}': {}", problems.join("; "))]
    InvalidParameters { tool: String, problems: Vec<String> },
}
