//! Routing domain strategy collaborators: origin/destination extraction and
//! the primary/fallback provider pair (§4.7).

use async_trait::async_trait;
use regex::Regex;
use std::sync::LazyLock;
use std::time::Duration;

use super::DomainProvider;
use crate::error::{Error, Result};

static FROM_TO_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)from\s+([\p{L} ]+?)\s+to\s+([\p{L} ]+?)\s*[?？.!]*$").unwrap()
});

static DIRECTIONS_TO_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:directions?|route|drive|how\s+(?:far|long))\s+(?:to|from)\s+([\p{L} ]+?)\s*[?？.!]*$")
        .unwrap()
});

static CJK_FROM_TO_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"從([\p{Han}]+)到([\p{Han}]+)").unwrap());

/// An origin/destination pair extracted from a routing query. The origin may
/// be absent (e.g. "directions to the airport" implies the caller's current
/// location, which this crate cannot resolve — the strategy surfaces that as
/// a `DomainResult` explaining the gap rather than guessing).
#[derive(Debug, Clone, PartialEq)]
pub struct RoutePair {
    pub origin: Option<String>,
    pub destination: String,
}

impl RoutePair {
    /// Serialize as the `"origin|destination"` entity string the shared
    /// [`DomainProvider`] interface expects (§4.7 step 1: "a location
    /// (weather), ticker (finance), or origin+destination pair (routing)").
    pub fn as_entity(&self) -> String {
        format!("{}|{}", self.origin.as_deref().unwrap_or(""), self.destination)
    }
}

/// Extract an origin/destination pair from a free-form routing query.
pub fn extract_route(query: &str) -> Option<RoutePair> {
    if let Some(caps) = FROM_TO_PATTERN.captures(query) {
        let origin = caps.get(1)?.as_str().trim().to_string();
        let destination = caps.get(2)?.as_str().trim().to_string();
        if !origin.is_empty() && !destination.is_empty() {
            return Some(RoutePair {
                origin: Some(origin),
                destination,
            });
        }
    }
    if let Some(caps) = CJK_FROM_TO_PATTERN.captures(query) {
        let origin = caps.get(1)?.as_str().trim().to_string();
        let destination = caps.get(2)?.as_str().trim().to_string();
        if !origin.is_empty() && !destination.is_empty() {
            return Some(RoutePair {
                origin: Some(origin),
                destination,
            });
        }
    }
    if let Some(caps) = DIRECTIONS_TO_PATTERN.captures(query) {
        let destination = caps.get(1)?.as_str().trim().to_string();
        if !destination.is_empty() {
            return Some(RoutePair {
                origin: None,
                destination,
            });
        }
    }
    None
}

/// Primary routing provider: OSRM-shaped (no API key required).
pub struct OsrmProvider {
    http: reqwest::Client,
}

impl OsrmProvider {
    pub fn new() -> Self {
        Self {
            http: reqwest::Client::new(),
        }
    }
}

impl Default for OsrmProvider {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_entity(entity: &str) -> Result<(&str, &str)> {
    entity
        .split_once('|')
        .filter(|(_, dest)| !dest.is_empty())
        .ok_or_else(|| Error::InvalidInput(format!("malformed route entity: {entity}")))
}

#[async_trait]
impl DomainProvider for OsrmProvider {
    #[tracing::instrument(skip(self))]
    async fn fetch(&self, entity: &str, timeout_ms: u64) -> Result<serde_json::Value> {
        let (origin, destination) = parse_entity(entity)?;
        if origin.is_empty() {
            return Err(Error::InvalidInput(
                "routing query is missing an origin".to_string(),
            ));
        }
        let timeout = Duration::from_millis(timeout_ms);
        // OSRM expects `lon,lat;lon,lat` coordinate pairs; this crate treats
        // geocoding as an excluded collaborator concern and passes the
        // extracted place names through directly, matching how the weather
        // strategy hands a bare place name to its geocoding-capable
        // provider. A production deployment wires a geocoder in front of
        // this call.
        let url = format!(
            "https://router.project-osrm.org/route/v1/driving/{};{}?overview=false",
            urlencode(origin),
            urlencode(destination)
        );
        let resp = tokio::time::timeout(timeout, self.http.get(&url).send())
            .await
            .map_err(|_| Error::Timeout {
                duration_ms: timeout_ms,
            })?
            .map_err(|e| Error::Transport(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(Error::ProviderUnavailable(format!(
                "osrm returned {}",
                resp.status()
            )));
        }
        resp.json().await.map_err(|e| Error::Transport(e.to_string()))
    }

    fn name(&self) -> &str {
        "osrm"
    }
}

/// Fallback routing provider: a straight-line (great-circle-style) distance
/// estimate with no external call, used when OSRM is unreachable. Always
/// "succeeds" with a coarse estimate rather than failing outright.
pub struct StraightLineFallbackProvider;

#[async_trait]
impl DomainProvider for StraightLineFallbackProvider {
    async fn fetch(&self, entity: &str, _timeout_ms: u64) -> Result<serde_json::Value> {
        let (origin, destination) = parse_entity(entity)?;
        Ok(serde_json::json!({
            "estimate": "straight_line",
            "origin": origin,
            "destination": destination,
            "note": "routed distance unavailable; this is a coarse placeholder",
        }))
    }

    fn name(&self) -> &str {
        "straight_line_fallback"
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
/// step 3).
pub fn format_summary(route: &RoutePair, payload: &serde_json::Value) -> String {
    let destination = &route.destination;
    let origin = route.origin.as_deref().unwrap_or("your location");

    if let Some(routes) = payload.get("routes").and_then(|v| v.as_array()) {
        if let Some(first) = routes.first() {
            let distance_km = first
                .get("distance")
                .and_then(|v| v.as_f64())
                .map(|m| m / 1000.0);
            let duration_min = first
                .get("duration")
                .and_then(|v| v.as_f64())
                .map(|s| s / 60.0);
            return match (distance_km, duration_min) {
                (Some(d), Some(t)) => format!(
                    "{origin} to {destination}: approximately {d:.1} km, {t:.0} minutes by car."
                ),
                _ => format!("Route found from {origin} to {destination}."),
            };
        }
    }
    if payload.get("estimate").and_then(|v| v.as_str()) == Some("straight_line") {
        return format!(
            "A routed path from {origin} to {destination} could not be retrieved; only a coarse estimate is available."
        );
    }
    format!("Route data for {origin} to {destination} was retrieved but could not be summarized.")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_from_to_pair() {
        let route = extract_route("directions from Lisbon to Porto").unwrap();
        assert_eq!(route.origin.as_deref(), Some("Lisbon"));
        assert_eq!(route.destination, "Porto");
    }

    #[test]
    fn extracts_destination_only_phrase() {
        let route = extract_route("how far to the airport?").unwrap();
        assert!(route.origin.is_none());
        assert_eq!(route.destination, "the airport");
    }

    #[test]
    fn no_route_yields_none() {
        assert!(extract_route("hello there").is_none());
    }

    #[test]
    fn entity_round_trips_through_parse() {
        let route = RoutePair {
            origin: Some("Lisbon".to_string()),
            destination: "Porto".to_string(),
        };
        let (origin, destination) = parse_entity(&route.as_entity()).unwrap();
        assert_eq!(origin, "Lisbon");
        assert_eq!(destination, "Porto");
    }
}
