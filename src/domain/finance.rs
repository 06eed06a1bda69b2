//! Finance domain strategy collaborators: ticker extraction and the
//! primary/fallback provider pair (§4.7). Finance is the domain §4.7
//! specifically calls out as using "a commercial provider primarily with a
//! public fallback" — [`AlphaVantageProvider`] (API-key gated) is primary,
//! [`StooqProvider`] (keyless, delayed/free data) is the fallback.

use async_trait::async_trait;
use regex::Regex;
use std::sync::LazyLock;
use std::time::Duration;

use super::DomainProvider;
use crate::error::{Error, Result};

static TICKER_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b([A-Z]{1,5}(?:\.[A-Z]{1,3})?)\b").unwrap());

static STOCK_PHRASE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:stock|share\s*price|ticker|quote)\s+(?:of|for)\s+([A-Za-z.]{1,10})\b")
        .unwrap()
});

/// English stopwords short enough to also match the ticker shape
/// (`[A-Z]{1,5}`) when a query is fully uppercased; excluded so "WHAT IS"
/// doesn't get extracted as a ticker.
const COMMON_WORD_DENYLIST: &[&str] = &[
    "A", "I", "IS", "THE", "OF", "FOR", "AND", "TO", "IN", "ON", "AT", "WHAT", "STOCK", "PRICE",
];

/// Extract a ticker symbol from a free-form finance query. Returns `None`
/// when no symbol can be confidently extracted.
pub fn extract_ticker(query: &str) -> Option<String> {
    if let Some(caps) = STOCK_PHRASE.captures(query) {
        let raw = caps.get(1)?.as_str().to_ascii_uppercase();
        if !raw.is_empty() {
            return Some(raw);
        }
    }

    // Fall back to the first all-caps token of plausible ticker length that
    // isn't a common English stopword (query may otherwise be lowercase,
    // e.g. "what's apple's stock price" — those cases are left for the LLM
    // router / LLM-backed entity extraction to resolve, per §4.7 "or by a
    // dedicated LLM call if configured").
    for caps in TICKER_PATTERN.captures_iter(query) {
        let candidate = caps.get(1)?.as_str();
        if candidate.len() >= 1
            && candidate.chars().all(|c| c.is_ascii_uppercase() || c == '.')
            && !COMMON_WORD_DENYLIST.contains(&candidate)
        {
            return Some(candidate.to_string());
        }
    }
    None
}

/// Primary finance provider: Alpha-Vantage-shaped, requires an API key.
pub struct AlphaVantageProvider {
    http: reqwest::Client,
    api_key: String,
}

impl AlphaVantageProvider {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_key: api_key.into(),
        }
    }
}

#[async_trait]
impl DomainProvider for AlphaVantageProvider {
    #[tracing::instrument(skip(self))]
    async fn fetch(&self, entity: &str, timeout_ms: u64) -> Result<serde_json::Value> {
        let timeout = Duration::from_millis(timeout_ms);
        let url = format!(
            "https://www.alphavantage.co/query?function=GLOBAL_QUOTE&symbol={}&apikey={}",
            entity, self.api_key
        );
        let resp = tokio::time::timeout(timeout, self.http.get(&url).send())
            .await
            .map_err(|_| Error::Timeout {
                duration_ms: timeout_ms,
            })?
            .map_err(|e| Error::Transport(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(Error::ProviderUnavailable(format!(
                "alpha vantage returned {}",
                resp.status()
            )));
        }
        let payload: serde_json::Value =
            resp.json().await.map_err(|e| Error::Transport(e.to_string()))?;
        if payload.get("Global Quote").and_then(|q| q.as_object()).map(|o| o.is_empty()).unwrap_or(true) {
            return Err(Error::ProviderUnavailable(
                "alpha vantage returned an empty quote (rate limited or unknown symbol)"
                    .to_string(),
            ));
        }
        Ok(payload)
    }

    fn name(&self) -> &str {
        "alpha_vantage"
    }
}

/// Public fallback finance provider: Stooq CSV endpoint, no API key.
pub struct StooqProvider {
    http: reqwest::Client,
}

impl StooqProvider {
    pub fn new() -> Self {
        Self {
            http: reqwest::Client::new(),
        }
    }
}

impl Default for StooqProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DomainProvider for StooqProvider {
    async fn fetch(&self, entity: &str, timeout_ms: u64) -> Result<serde_json::Value> {
        let timeout = Duration::from_millis(timeout_ms);
        let url = format!("https://stooq.com/q/l/?s={}&f=sd2t2ohlcv&h&e=csv", entity.to_ascii_lowercase());
        let resp = tokio::time::timeout(timeout, self.http.get(&url).send())
            .await
            .map_err(|_| Error::Timeout {
                duration_ms: timeout_ms,
            })?
            .map_err(|e| Error::Transport(e.to_string()))?;
        let body = resp.text().await.map_err(|e| Error::Transport(e.to_string()))?;
        let mut lines = body.lines();
        let header = lines.next().unwrap_or_default();
        let row = lines.next().unwrap_or_default();
        let headers: Vec<&str> = header.split(',').collect();
        let values: Vec<&str> = row.split(',').collect();
        let mut obj = serde_json::Map::new();
        for (h, v) in headers.iter().zip(values.iter()) {
            obj.insert(h.to_string(), serde_json::Value::String(v.to_string()));
        }
        Ok(serde_json::Value::Object(obj))
    }

    fn name(&self) -> &str {
        "stooq"
    }
}

/// Format a provider payload into a short natural-language summary (§4.7
/// step 3). Deterministic/templated, not LLM-backed (same rationale as
/// [`super::weather::format_summary`]): both provider payloads already carry
/// a settled numeric quote, nothing left to synthesize.
pub fn format_summary(ticker: &str, payload: &serde_json::Value) -> String {
    if let Some(quote) = payload.get("Global Quote").and_then(|q| q.as_object()) {
        let price = quote
            .get("05. price")
            .and_then(|v| v.as_str())
            .unwrap_or("unknown");
        let change_pct = quote
            .get("10. change percent")
            .and_then(|v| v.as_str())
            .unwrap_or("unknown");
        return format!("{ticker} is trading at {price} ({change_pct} change).");
    }
    if let Some(close) = payload.get("Close").and_then(|v| v.as_str()) {
        return format!("{ticker} last closed at {close}.");
    }
    format!("Quote data for {ticker} was retrieved but could not be summarized.")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_ticker_from_stock_price_phrase() {
        let ticker = extract_ticker("What's the stock price of AAPL?").unwrap();
        assert_eq!(ticker, "AAPL");
    }

    #[test]
    fn extracts_bare_uppercase_ticker() {
        let ticker = extract_ticker("quote TSLA today").unwrap();
        assert_eq!(ticker, "TSLA");
    }

    #[test]
    fn common_words_are_not_mistaken_for_tickers() {
        assert!(extract_ticker("what is the price").is_none());
    }

    #[test]
    fn format_summary_handles_alpha_vantage_shape() {
        let payload = serde_json::json!({"Global Quote": {"05. price": "123.45", "10. change percent": "1.2%"}});
        let summary = format_summary("AAPL", &payload);
        assert!(summary.contains("123.45"));
        assert!(summary.contains("AAPL"));
    }
}
