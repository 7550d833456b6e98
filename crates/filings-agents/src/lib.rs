pub mod claude_cli;
pub mod enhance;
pub mod error;
pub mod model;
pub mod ollama;
pub mod orchestrator;
pub mod parser;
pub mod prompts;
pub mod registry;

pub mod test_support;

pub use claude_cli::ClaudeCliModel;
pub use error::{AgentError, ToolError};
pub use model::LanguageModel;
pub use ollama::OllamaModel;
pub use orchestrator::Orchestrator;
pub use parser::parse_signal;
pub use registry::{ParamKind, ParamSpec, RegistrySettings, ToolRegistry, ToolSpec};
