use async_trait::async_trait;
use filings_models::Message;

use crate::error::AgentError;

/// A chat model that turns an ordered conversation into assistant text.
/// Mockable for testing.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    fn name(&self) -> &str;

    async fn complete(&self, messages: &[Message]) -> Result<String, AgentError>;
}
