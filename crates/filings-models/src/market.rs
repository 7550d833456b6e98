use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::attribution::Attribution;

/// A news article returned by a market-data content search.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Article {
    pub id: String,
    pub title: String,
    pub excerpt: String,
    /// RFC 3339 publish time as reported by the provider.
    pub published: Option<String>,
}

/// A holder of a company's shares.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Shareholder {
    pub name: String,
    pub shares: Option<Decimal>,
    /// Percentage of the share capital held (e.g. `6.12` for 6.12%).
    pub stake_pct: Option<Decimal>,
}

/// Structured facts returned by the market-data service.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "items", rename_all = "snake_case")]
pub enum MarketFacts {
    Articles(Vec<Article>),
    Shareholders(Vec<Shareholder>),
}

impl MarketFacts {
    pub fn len(&self) -> usize {
        match self {
            MarketFacts::Articles(items) => items.len(),
            MarketFacts::Shareholders(items) => items.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// One market-data response with its provenance.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MarketLookup {
    pub facts: MarketFacts,
    pub source_url: String,
    pub timestamp: DateTime<Utc>,
}

impl MarketLookup {
    pub fn attribution(&self) -> Attribution {
        Attribution::source(self.source_url.clone(), self.timestamp)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn shareholders_roundtrip_keeps_decimals_exact() {
        let lookup = MarketLookup {
            facts: MarketFacts::Shareholders(vec![Shareholder {
                name: "Qatar Holding LLC".to_string(),
                shares: Some(dec!(952000000)),
                stake_pct: Some(dec!(5.97)),
            }]),
            source_url: "https://markets.ft.com/research/webservices/securities/v1/holders"
                .to_string(),
            timestamp: Utc::now(),
        };

        let json = serde_json::to_string(&lookup).unwrap();
        let back: MarketLookup = serde_json::from_str(&json).unwrap();
        assert_eq!(back, lookup);
        assert_eq!(back.facts.len(), 1);
    }

    #[test]
    fn facts_are_tagged() {
        let facts = MarketFacts::Articles(vec![]);
        let json = serde_json::to_value(&facts).unwrap();
        assert_eq!(json["type"], "articles");
        assert!(facts.is_empty());
    }
}
