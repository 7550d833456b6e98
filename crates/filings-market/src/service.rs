use async_trait::async_trait;
use filings_models::MarketLookup;

use crate::error::MarketDataError;

/// Live market data about listed companies.
#[async_trait]
pub trait MarketDataService: Send + Sync {
    /// News articles about a company, most relevant first.
    async fn search(&self, query: &str, max_results: usize)
        -> Result<MarketLookup, MarketDataError>;

    /// Major shareholders for a `SYMBOL:EXCHANGE` ticker (e.g. `BARC:LSE`).
    async fn shareholders(&self, ticker: &str) -> Result<MarketLookup, MarketDataError>;
}
