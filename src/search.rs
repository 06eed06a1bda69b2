//! The Search client (§6 "Outbound: Search API"): one request per subquery,
//! returning a ranked list of `{title, url, snippet}`, with bounded backoff
//! on 5xx responses.

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

use crate::error::{Error, Result};

/// One search result, as returned per subquery.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    pub title: String,
    pub url: String,
    pub snippet: String,
}

/// Narrow interface the Research strategy depends on (§9: duck-typed tool
/// objects become a trait per tool kind).
#[async_trait]
pub trait SearchClient: Send + Sync {
    async fn search(&self, query: &str, timeout_ms: u64) -> Result<Vec<SearchHit>>;
}

#[derive(Debug, Deserialize)]
struct RawSearchResponse {
    results: Vec<RawSearchHit>,
}

#[derive(Debug, Deserialize)]
struct RawSearchHit {
    title: String,
    url: String,
    #[serde(default)]
    snippet: String,
}

/// HTTP-backed search client, speaking a generic `{results: [{title, url,
/// snippet}]}` JSON shape. Retries on 5xx with bounded exponential backoff.
pub struct HttpSearchClient {
    http: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
    max_attempts: u32,
}

impl HttpSearchClient {
    pub fn new(endpoint: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            endpoint: endpoint.into(),
            api_key,
            max_attempts: 3,
        }
    }
}

#[async_trait]
impl SearchClient for HttpSearchClient {
    #[tracing::instrument(skip(self), fields(query_len = query.len()))]
    async fn search(&self, query: &str, timeout_ms: u64) -> Result<Vec<SearchHit>> {
        let timeout = Duration::from_millis(timeout_ms);
        let mut last_err = Error::Transport("search request never attempted".to_string());

        for attempt in 0..self.max_attempts {
            let mut req = self.http.get(&self.endpoint).query(&[("q", query)]).timeout(timeout);
            if let Some(ref key) = self.api_key {
                req = req.bearer_auth(key);
            }

            let outcome = tokio::time::timeout(timeout, req.send()).await;
            let resp = match outcome {
                Ok(Ok(resp)) => resp,
                Ok(Err(e)) => {
                    last_err = Error::Transport(e.to_string());
                    break;
                }
                Err(_) => {
                    last_err = Error::Timeout {
                        duration_ms: timeout_ms,
                    };
                    break;
                }
            };

            if resp.status().is_server_error() {
                last_err = Error::ProviderUnavailable(format!("search returned {}", resp.status()));
                if attempt + 1 < self.max_attempts {
                    tokio::time::sleep(Duration::from_millis(100 * 2u64.pow(attempt))).await;
                    continue;
                }
                break;
            }

            let parsed: RawSearchResponse = resp.json().await.map_err(|e| Error::Transport(e.to_string()))?;
            return Ok(parsed
                .results
                .into_iter()
                .map(|h| SearchHit {
                    title: h.title,
                    url: h.url,
                    snippet: h.snippet,
                })
                .collect());
        }

        Err(last_err)
    }
}

/// Scripted offline search client used by tests and the end-to-end scenarios
/// (§10.5): returns a fixed result set per call, or an error if configured to
/// simulate a failed subquery.
pub struct FakeSearchClient {
    pub hits: Vec<SearchHit>,
    pub fail: bool,
}

impl FakeSearchClient {
    pub fn with_hits(hits: Vec<SearchHit>) -> Self {
        Self { hits, fail: false }
    }

    pub fn failing() -> Self {
        Self {
            hits: Vec::new(),
            fail: true,
        }
    }
}

#[async_trait]
impl SearchClient for FakeSearchClient {
    async fn search(&self, _query: &str, _timeout_ms: u64) -> Result<Vec<SearchHit>> {
        if self.fail {
            Err(Error::ProviderUnavailable("fake search failure".to_string()))
        } else {
            Ok(self.hits.clone())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fake_client_returns_scripted_hits() {
        let client = FakeSearchClient::with_hits(vec![SearchHit {
            title: "A".to_string(),
            url: "https://example.com/a".to_string(),
            snippet: "snippet".to_string(),
        }]);
        let hits = client.search("anything", 1000).await.unwrap();
        assert_eq!(hits.len(), 1);
    }

    #[tokio::test]
    async fn failing_fake_client_errors_without_panicking() {
        let client = FakeSearchClient::failing();
        assert!(client.search("anything", 1000).await.is_err());
    }
}
