//! Weather domain strategy collaborators: location extraction and the
//! primary/fallback provider pair (§4.7).

use async_trait::async_trait;
use regex::Regex;
use std::sync::LazyLock;
use std::time::Duration;

use super::DomainProvider;
use crate::error::{Error, Result};

static LATIN_PREPOSITION_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:weather|temperature|humidity|forecast)\s+(?:in|for|at)\s+([\p{L} ]+?)\s*[?？.!]*$")
        .unwrap()
});

static LATIN_SUFFIX_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^([\p{L} ]+?)\s+weather\b").unwrap());

static CJK_SUFFIX_MARKERS: &[&str] = &["天氣", "天气", "氣溫", "气温", "濕度", "湿度", "預報", "预报"];
static CJK_TRIM_PREFIXES: &[&str] = &["現在", "现在", "實時", "实时"];

/// Extract a location string from a free-form weather query. Returns `None`
/// when no location can be confidently extracted (the strategy then returns
/// an explanatory `DomainResult` rather than an error, per §4.7).
pub fn extract_location(query: &str) -> Option<String> {
    if let Some(caps) = LATIN_PREPOSITION_PATTERN.captures(query) {
        let raw = caps.get(1)?.as_str().trim();
        if !raw.is_empty() {
            return Some(raw.to_string());
        }
    }
    if let Some(caps) = LATIN_SUFFIX_PATTERN.captures(query) {
        let raw = caps.get(1)?.as_str().trim();
        if !raw.is_empty() {
            return Some(raw.to_string());
        }
    }

    // CJK: take everything before the first weather-noun marker, then strip
    // a trailing real-time marker and/or possessive particle "的".
    for marker in CJK_SUFFIX_MARKERS {
        if let Some(idx) = query.find(marker) {
            let mut candidate = query[..idx].trim_end_matches('的').trim();
            for prefix_marker in CJK_TRIM_PREFIXES {
                if let Some(stripped) = candidate.strip_suffix(prefix_marker) {
                    candidate = stripped.trim();
                }
            }
            if !candidate.is_empty() {
                return Some(candidate.to_string());
            }
        }
    }
    None
}

/// Primary weather provider: Open-Meteo-shaped (no API key required).
pub struct OpenMeteoProvider {
    http: reqwest::Client,
}

impl OpenMeteoProvider {
    pub fn new() -> Self {
        Self {
            http: reqwest::Client::new(),
        }
    }
}

impl Default for OpenMeteoProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DomainProvider for OpenMeteoProvider {
    #[tracing::instrument(skip(self))]
    async fn fetch(&self, entity: &str, timeout_ms: u64) -> Result<serde_json::Value> {
        let timeout = Duration::from_millis(timeout_ms);
        let url = format!(
            "https://geocoding-api.open-meteo.com/v1/search?name={}",
            urlencode(entity)
        );
        let resp = tokio::time::timeout(timeout, self.http.get(&url).send())
            .await
            .map_err(|_| Error::Timeout {
                duration_ms: timeout_ms,
            })?
            .map_err(|e| Error::Transport(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(Error::ProviderUnavailable(format!(
                "open-meteo returned {}",
                resp.status()
            )));
        }
        resp.json().await.map_err(|e| Error::Transport(e.to_string()))
    }

    fn name(&self) -> &str {
        "open_meteo"
    }
}

/// Public fallback weather provider, tried only if the primary fails.
pub struct WttrInProvider {
    http: reqwest::Client,
}

impl WttrInProvider {
    pub fn new() -> Self {
        Self {
            http: reqwest::Client::new(),
        }
    }
}

impl Default for WttrInProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DomainProvider for WttrInProvider {
    async fn fetch(&self, entity: &str, timeout_ms: u64) -> Result<serde_json::Value> {
        let timeout = Duration::from_millis(timeout_ms);
        let url = format!("https://wttr.in/{}?format=j1", urlencode(entity));
        let resp = tokio::time::timeout(timeout, self.http.get(&url).send())
            .await
            .map_err(|_| Error::Timeout {
                duration_ms: timeout_ms,
            })?
            .map_err(|e| Error::Transport(e.to_string()))?;
        resp.json().await.map_err(|e| Error::Transport(e.to_string()))
    }

    fn name(&self) -> &str {
        "wttr_in"
    }
}

fn urlencode(s: &str) -> String {
    s.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_string()
            } else {
                format!("%{:02X}", c as u32)
            }
        })
        .collect()
}

/// Format a provider payload into a short natural-language summary (§4.7
/// step 3). Deterministic/templated rather than LLM-backed: the summary is
/// trivially derivable from the normalized payload, so an extra completion
/// round-trip buys nothing but latency.
pub fn format_summary(location: &str, payload: &serde_json::Value) -> String {
    if let Some(temp) = payload
        .get("current")
        .and_then(|c| c.get("temperature_2m"))
        .and_then(|v| v.as_f64())
    {
        format!("The current temperature in {location} is {temp:.1}\u{00b0}C.")
    } else if let Some(results) = payload.get("results").and_then(|v| v.as_array()) {
        if let Some(first) = results.first() {
            format!(
                "Found location data for {location}: {}",
                first.get("name").and_then(|n| n.as_str()).unwrap_or(location)
            )
        } else {
            format!("No weather data could be found for {location}.")
        }
    } else {
        format!("Weather data for {location} was retrieved but could not be summarized.")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_location_from_cjk_query() {
        let loc = extract_location("澳門現在的濕度是多少？").unwrap();
        assert!(loc.contains("澳門"));
    }

    #[test]
    fn extracts_location_from_english_preposition_phrase() {
        let loc = extract_location("What's the weather in Lisbon?").unwrap();
        assert_eq!(loc.trim(), "Lisbon");
    }

    #[test]
    fn no_location_yields_none() {
        assert!(extract_location("hello there").is_none());
    }

    #[test]
    fn format_summary_handles_open_meteo_shape() {
        let payload = serde_json::json!({"current": {"temperature_2m": 21.5}});
        let summary = format_summary("Lisbon", &payload);
        assert!(summary.contains("21.5"));
        assert!(summary.contains("Lisbon"));
    }
}
