use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use filings_models::{Article, MarketDataConfig, MarketFacts, MarketLookup, Shareholder};
use moka::future::Cache;
use rust_decimal::Decimal;
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::error::MarketDataError;
use crate::mock::{mock_articles, MOCK_SOURCE_URL};
use crate::service::MarketDataService;

const PROVIDER_ID: &str = "FT";
const BROWSER_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) Chrome/91.0.4472.124 Safari/537.36";
const CACHE_CAPACITY: u64 = 500;

/// Financial Times client: content search plus shareholder holdings.
///
/// Successful lookups are kept in a moka cache for `cache_ttl_seconds`.
/// Without an API key, content search is answered from offline fixtures.
pub struct FtClient {
    client: reqwest::Client,
    config: MarketDataConfig,
    cache: Cache<String, MarketLookup>,
}

impl FtClient {
    pub fn new(config: MarketDataConfig) -> Result<Self, MarketDataError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()?;
        let cache = Cache::builder()
            .max_capacity(CACHE_CAPACITY)
            .time_to_live(Duration::from_secs(config.cache_ttl_seconds))
            .build();
        Ok(Self {
            client,
            config,
            cache,
        })
    }

    pub fn is_offline(&self) -> bool {
        self.api_key().is_none()
    }

    fn api_key(&self) -> Option<&str> {
        self.config
            .api_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<Value, MarketDataError> {
        let response = request.send().await.map_err(classify_send_error)?;
        let status = response.status();

        if status == reqwest::StatusCode::TOO_MANY_REQUESTS
            || status == reqwest::StatusCode::FORBIDDEN
        {
            return Err(MarketDataError::RateLimited {
                provider: PROVIDER_ID.to_string(),
            });
        }

        if status == reqwest::StatusCode::UNAUTHORIZED {
            return Err(MarketDataError::Provider {
                provider: PROVIDER_ID.to_string(),
                message: "Invalid or missing API key".to_string(),
            });
        }

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(MarketDataError::Provider {
                provider: PROVIDER_ID.to_string(),
                message: format!("HTTP {}: {}", status.as_u16(), truncate(&body, 200)),
            });
        }

        response.json::<Value>().await.map_err(|e| {
            if e.is_timeout() {
                MarketDataError::Timeout {
                    provider: PROVIDER_ID.to_string(),
                }
            } else {
                MarketDataError::Provider {
                    provider: PROVIDER_ID.to_string(),
                    message: format!("Failed to parse response: {e}"),
                }
            }
        })
    }
}

#[async_trait]
impl MarketDataService for FtClient {
    async fn search(
        &self,
        query: &str,
        max_results: usize,
    ) -> Result<MarketLookup, MarketDataError> {
        let company = query.trim();
        if company.is_empty() {
            return Err(MarketDataError::InvalidRequest(
                "company name is empty".to_string(),
            ));
        }

        let key = format!("search:{max_results}:{}", company.to_lowercase());
        if let Some(hit) = self.cache.get(&key).await {
            debug!(company, "market search cache hit");
            return Ok(hit);
        }

        let lookup = match self.api_key() {
            None => {
                debug!(company, "no FT API key, serving offline articles");
                MarketLookup {
                    facts: MarketFacts::Articles(mock_articles(company, max_results)),
                    source_url: MOCK_SOURCE_URL.to_string(),
                    timestamp: Utc::now(),
                }
            }
            Some(api_key) => {
                let body = json!({
                    "queryString": format!("{company} AND PLC"),
                    "queryContext": { "curations": ["ARTICLES"] },
                    "resultContext": {
                        "maxResults": max_results,
                        "aspects": ["title", "summary", "lifecycle", "location", "metadata"],
                    },
                });
                debug!(company, max_results, "FT content search");
                let request = self
                    .client
                    .post(&self.config.search_url)
                    .header("X-Api-Key", api_key)
                    .json(&body);
                let value = self.send(request).await?;
                let mut articles = parse_articles(&value);
                articles.truncate(max_results);
                MarketLookup {
                    facts: MarketFacts::Articles(articles),
                    source_url: self.config.search_url.clone(),
                    timestamp: Utc::now(),
                }
            }
        };

        self.cache.insert(key, lookup.clone()).await;
        Ok(lookup)
    }

    async fn shareholders(&self, ticker: &str) -> Result<MarketLookup, MarketDataError> {
        let ticker = ticker.trim().to_uppercase();
        let key = format!("holders:{ticker}");
        if let Some(hit) = self.cache.get(&key).await {
            debug!(ticker = %ticker, "shareholders cache hit");
            return Ok(hit);
        }

        debug!(ticker = %ticker, "FT holders lookup");
        let request = self
            .client
            .get(&self.config.holders_url)
            .query(&[
                ("symbols", ticker.as_str()),
                ("source", self.config.holders_source.as_str()),
            ])
            .header(reqwest::header::USER_AGENT, BROWSER_USER_AGENT)
            .header(reqwest::header::ACCEPT, "application/json")
            .header(
                reqwest::header::REFERER,
                format!("https://markets.ft.com/data/equities/tearsheet/profile?s={ticker}"),
            );
        let value = self.send(request).await?;
        let holders = parse_holders(&value);
        if holders.is_empty() {
            warn!(ticker = %ticker, "holders response had no usable entries");
        }

        let lookup = MarketLookup {
            facts: MarketFacts::Shareholders(holders),
            source_url: format!("{}?symbols={ticker}", self.config.holders_url),
            timestamp: Utc::now(),
        };
        self.cache.insert(key, lookup.clone()).await;
        Ok(lookup)
    }
}

fn classify_send_error(e: reqwest::Error) -> MarketDataError {
    if e.is_timeout() {
        MarketDataError::Timeout {
            provider: PROVIDER_ID.to_string(),
        }
    } else {
        MarketDataError::Network(e)
    }
}

/// Articles from a content-search response.
///
/// The live API nests hits as `results[0].results[]`; flat `results[]`
/// arrays are accepted too.
pub fn parse_articles(value: &Value) -> Vec<Article> {
    let Some(results) = value.get("results").and_then(Value::as_array) else {
        return Vec::new();
    };

    let mut hits = Vec::new();
    for entry in results {
        match entry.get("results").and_then(Value::as_array) {
            Some(nested) => hits.extend(nested.iter()),
            None => hits.push(entry),
        }
    }

    hits.into_iter()
        .filter_map(|hit| {
            let id = hit.get("id").and_then(Value::as_str)?;
            let title = hit
                .pointer("/title/title")
                .and_then(Value::as_str)
                .unwrap_or_default();
            if title.is_empty() {
                return None;
            }
            let excerpt = hit
                .pointer("/summary/excerpt")
                .and_then(Value::as_str)
                .unwrap_or_default();
            let published = hit
                .pointer("/lifecycle/initialPublishDateTime")
                .and_then(Value::as_str)
                .map(str::to_string);
            Some(Article {
                id: id.to_string(),
                title: title.to_string(),
                excerpt: excerpt.to_string(),
                published,
            })
        })
        .collect()
}

/// Holders from `data.items[0]`: institutional holders, else major holders.
/// Entries without a name are skipped.
pub fn parse_holders(value: &Value) -> Vec<Shareholder> {
    let Some(item) = value.pointer("/data/items/0") else {
        return Vec::new();
    };
    let holders = item
        .get("institutionalHolders")
        .or_else(|| item.get("majorHolders"))
        .and_then(Value::as_array);
    let Some(holders) = holders else {
        return Vec::new();
    };

    holders
        .iter()
        .filter_map(|holder| {
            let name = holder.get("name").and_then(Value::as_str)?.trim();
            if name.is_empty() {
                return None;
            }
            Some(Shareholder {
                name: name.to_string(),
                shares: holder.get("sharesHeld").and_then(decimal_field),
                stake_pct: holder.get("percentageHeld").and_then(decimal_field),
            })
        })
        .collect()
}

/// Numbers arrive as JSON numbers or as display strings ("1,234", "5.97%").
fn decimal_field(value: &Value) -> Option<Decimal> {
    match value {
        Value::Number(n) => {
            let text = n.to_string();
            Decimal::from_str(&text)
                .or_else(|_| Decimal::from_scientific(&text))
                .ok()
        }
        Value::String(s) => {
            let cleaned: String = s
                .chars()
                .filter(|c| !matches!(c, ',' | '%' | ' '))
                .collect();
            Decimal::from_str(&cleaned).ok()
        }
        _ => None,
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}…", &text[..idx]),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn parse_nested_search_results() {
        let value = json!({
            "results": [{
                "indexCount": 2,
                "results": [
                    {
                        "id": "a1",
                        "title": {"title": "Barclays lifts dividend"},
                        "summary": {"excerpt": "The lender raised its payout."},
                        "lifecycle": {"initialPublishDateTime": "2021-02-18T07:00:00Z"}
                    },
                    {"id": "a2", "title": {"title": "Barclays settles probe"}}
                ]
            }]
        });
        let articles = parse_articles(&value);
        assert_eq!(articles.len(), 2);
        assert_eq!(articles[0].title, "Barclays lifts dividend");
        assert_eq!(
            articles[0].published.as_deref(),
            Some("2021-02-18T07:00:00Z")
        );
        assert_eq!(articles[1].excerpt, "");
    }

    #[test]
    fn parse_flat_search_results_skips_untitled() {
        let value = json!({
            "results": [
                {"id": "x", "title": {"title": "Kept"}},
                {"id": "y", "summary": {"excerpt": "No title"}}
            ]
        });
        let articles = parse_articles(&value);
        assert_eq!(articles.len(), 1);
        assert_eq!(articles[0].id, "x");
        assert!(parse_articles(&json!({"error": "nope"})).is_empty());
    }

    #[test]
    fn parse_institutional_holders() {
        let value = json!({
            "data": {"items": [{
                "institutionalHolders": [
                    {"name": " Qatar Holding LLC ", "sharesHeld": 952000000, "percentageHeld": 5.97},
                    {"name": "BlackRock", "sharesHeld": "1,012,345", "percentageHeld": "6.12%"},
                    {"name": "", "sharesHeld": 1}
                ],
                "majorHolders": [{"name": "ignored"}]
            }]}
        });
        let holders = parse_holders(&value);
        assert_eq!(holders.len(), 2);
        assert_eq!(holders[0].name, "Qatar Holding LLC");
        assert_eq!(holders[0].shares, Some(dec!(952000000)));
        assert_eq!(holders[0].stake_pct, Some(dec!(5.97)));
        assert_eq!(holders[1].shares, Some(dec!(1012345)));
        assert_eq!(holders[1].stake_pct, Some(dec!(6.12)));
    }

    #[test]
    fn parse_major_holders_fallback() {
        let value = json!({
            "data": {"items": [{
                "majorHolders": [{"name": "Directors", "percentageHeld": 0.1}]
            }]}
        });
        let holders = parse_holders(&value);
        assert_eq!(holders.len(), 1);
        assert_eq!(holders[0].shares, None);
        assert!(parse_holders(&json!({"data": {"items": []}})).is_empty());
    }

    #[tokio::test]
    async fn offline_search_uses_fixtures_and_cache() {
        let client = FtClient::new(MarketDataConfig::default()).unwrap();
        assert!(client.is_offline());

        let first = client.search("Apple", 1).await.unwrap();
        assert_eq!(first.source_url, MOCK_SOURCE_URL);
        assert_eq!(first.facts.len(), 1);

        let second = client.search("apple", 1).await.unwrap();
        assert_eq!(second.timestamp, first.timestamp);
    }

    #[tokio::test]
    async fn empty_company_rejected() {
        let client = FtClient::new(MarketDataConfig::default()).unwrap();
        assert!(matches!(
            client.search("  ", 5).await,
            Err(MarketDataError::InvalidRequest(_))
        ));
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate("£££", 2), "££…");
        assert_eq!(truncate("ok", 10), "ok");
    }
}
