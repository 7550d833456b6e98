use filings_models::FailureKind;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MarketDataError {
    /// HTTP 429, or 403 once the key's quota is spent.
    #[error("Rate limited: {provider}")]
    RateLimited { provider: String },

    #[error("Timeout: {provider}")]
    Timeout { provider: String },

    #[error("Provider error: {provider} - {message}")]
    Provider { provider: String, message: String },

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),
}

impl MarketDataError {
    /// Whether the same request may succeed if repeated later.
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::RateLimited { .. } | Self::Timeout { .. } | Self::Network(_) => true,
            Self::Provider { .. } | Self::InvalidRequest(_) => false,
        }
    }

    pub fn failure_kind(&self) -> FailureKind {
        match self {
            Self::RateLimited { .. } => FailureKind::RateLimited,
            Self::Timeout { .. } => FailureKind::Timeout,
            Self::Network(e) if e.is_timeout() => FailureKind::Timeout,
            Self::Network(_) => FailureKind::Transport,
            Self::Provider { .. } | Self::InvalidRequest(_) => FailureKind::Backend,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification() {
        let limited = MarketDataError::RateLimited {
            provider: "FT".to_string(),
        };
        assert!(limited.is_recoverable());
        assert_eq!(limited.failure_kind(), FailureKind::RateLimited);

        let provider = MarketDataError::Provider {
            provider: "FT".to_string(),
            message: "HTTP 500".to_string(),
        };
        assert!(!provider.is_recoverable());
        assert_eq!(provider.failure_kind(), FailureKind::Backend);

        let timeout = MarketDataError::Timeout {
            provider: "FT".to_string(),
        };
        assert!(timeout.is_recoverable());
        assert_eq!(timeout.failure_kind(), FailureKind::Timeout);
    }
}
