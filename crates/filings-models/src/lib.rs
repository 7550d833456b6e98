pub mod answer;
pub mod attribution;
pub mod config;
pub mod market;
pub mod message;
pub mod passage;
pub mod tool;

pub use answer::{Answer, StopReason};
pub use attribution::Attribution;
pub use config::{
    FilingsConfig, MarketDataConfig, ModelConfig, ModelProvider, OrchestratorConfig,
    RetrievalConfig,
};
pub use market::{Article, MarketFacts, MarketLookup, Shareholder};
pub use message::{Message, Role};
pub use passage::{DocumentInput, PageText, Passage};
pub use tool::{
    Capability, FailureKind, ParamMap, Signal, ToolCallSignal, ToolFailure, ToolPayload,
    ToolResult,
};
