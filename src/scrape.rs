//! The Scrape client and content-extractor seam (§6 "Outbound: Scrape").
//!
//! A plain HTTP GET per URL with a User-Agent header; text extraction from
//! the response body is delegated to an external content-extractor
//! collaborator (§1 — PDF/DOCX/HTML extractors are black-box text emitters
//! out of scope for this crate). [`PlainTextExtractor`] is the minimal
//! in-crate fallback (tag-strip) used when no richer extractor is wired in.

use async_trait::async_trait;
use std::time::Duration;

use crate::error::{Error, Result};

const USER_AGENT: &str = "qse-core/0.1 (+research-strategy)";

/// Narrow interface the Research strategy depends on for fetching raw bytes.
#[async_trait]
pub trait ScrapeClient: Send + Sync {
    async fn fetch(&self, url: &str, timeout_ms: u64) -> Result<String>;
}

/// Narrow interface for turning a fetched body into plain text. The real
/// implementation (HTML boilerplate removal, PDF/DOCX parsing) is an
/// excluded collaborator (§1); this crate depends only on the trait.
pub trait ContentExtractor: Send + Sync {
    fn extract(&self, body: &str) -> String;
}

pub struct HttpScrapeClient {
    http: reqwest::Client,
}

impl HttpScrapeClient {
    pub fn new() -> Self {
        Self {
            http: reqwest::Client::builder()
                .user_agent(USER_AGENT)
                .build()
                .unwrap_or_else(|_| reqwest::Client::new()),
        }
    }
}

impl Default for HttpScrapeClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ScrapeClient for HttpScrapeClient {
    #[tracing::instrument(skip(self))]
    async fn fetch(&self, url: &str, timeout_ms: u64) -> Result<String> {
        let timeout = Duration::from_millis(timeout_ms);
        let outcome = tokio::time::timeout(timeout, self.http.get(url).send()).await;
        let resp = match outcome {
            Ok(Ok(resp)) => resp,
            Ok(Err(e)) => return Err(Error::Transport(e.to_string())),
            Err(_) => {
                return Err(Error::Timeout {
                    duration_ms: timeout_ms,
                })
            }
        };
        if !resp.status().is_success() {
            return Err(Error::ProviderUnavailable(format!(
                "scrape of {url} returned {}",
                resp.status()
            )));
        }
        resp.text().await.map_err(|e| Error::Transport(e.to_string()))
    }
}

/// Minimal tag-stripping extractor: drops anything between `<` and `>` and
/// collapses whitespace. A real deployment wires in a proper
/// boilerplate-removal extractor per §1; this is the crate-internal default.
pub struct PlainTextExtractor;

impl ContentExtractor for PlainTextExtractor {
    fn extract(&self, body: &str) -> String {
        let mut out = String::with_capacity(body.len());
        let mut in_tag = false;
        for ch in body.chars() {
            match ch {
                '<' => in_tag = true,
                '>' => in_tag = false,
                _ if !in_tag => out.push(ch),
                _ => {}
            }
        }
        out.split_whitespace().collect::<Vec<_>>().join(" ")
    }
}

/// Scripted offline scrape client used by tests (§10.5).
pub struct FakeScrapeClient {
    pub pages: std::collections::HashMap<String, String>,
}

impl FakeScrapeClient {
    pub fn new(pages: std::collections::HashMap<String, String>) -> Self {
        Self { pages }
    }
}

#[async_trait]
impl ScrapeClient for FakeScrapeClient {
    async fn fetch(&self, url: &str, _timeout_ms: u64) -> Result<String> {
        self.pages
            .get(url)
            .cloned()
            .ok_or_else(|| Error::ProviderUnavailable(format!("no fake page for {url}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_text_extractor_strips_tags() {
        let extractor = PlainTextExtractor;
        let text = extractor.extract("<html><body><p>Hello <b>world</b></p></body></html>");
        assert_eq!(text, "Hello world");
    }

    #[tokio::test]
    async fn fake_scrape_client_returns_missing_url_as_error() {
        let client = FakeScrapeClient::new(std::collections::HashMap::new());
        assert!(client.fetch("https://missing.example", 1000).await.is_err());
    }
}
