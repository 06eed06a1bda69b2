//! Domain-Data strategies (§4.7): entity extraction → two-tier provider
//! invocation → deterministic formatting, one [`Strategy`] per
//! [`DomainKind`]. Each strategy is a thin adapter over the already-built
//! `domain::{weather,finance,routing}` extractor + [`DomainProviderSet`]
//! pair; no new fetching logic lives here.

use async_trait::async_trait;

use super::Strategy;
use crate::domain::DomainProviderSet;
use crate::domain::{finance, routing, weather};
use crate::error::Result;
use crate::types::{DomainKind, DomainResult, QueryRequest, RoutingDecision, StrategyOutput};

fn missing_entity_result(kind: DomainKind, what: &str) -> StrategyOutput {
    StrategyOutput::Domain(DomainResult {
        kind,
        entity: String::new(),
        provider_payload: serde_json::Value::Null,
        formatted_summary: format!(
            "Could not identify {what} in the request; please rephrase with a specific {what}."
        ),
    })
}

pub struct WeatherStrategy {
    providers: DomainProviderSet,
    timeout_ms: u64,
}

impl WeatherStrategy {
    pub fn new(providers: DomainProviderSet, timeout_ms: u64) -> Self {
        Self { providers, timeout_ms }
    }
}

#[async_trait]
impl Strategy for WeatherStrategy {
    async fn execute(
        &self,
        request: &QueryRequest,
        _routing: &RoutingDecision,
    ) -> Result<StrategyOutput> {
        let Some(location) = weather::extract_location(&request.query_text) else {
            return Ok(missing_entity_result(DomainKind::Weather, "location"));
        };
        let payload = self.providers.invoke(&location, self.timeout_ms).await?;
        let formatted_summary = weather::format_summary(&location, &payload);
        Ok(StrategyOutput::Domain(DomainResult {
            kind: DomainKind::Weather,
            entity: location,
            provider_payload: payload,
            formatted_summary,
        }))
    }
}

pub struct FinanceStrategy {
    providers: DomainProviderSet,
    timeout_ms: u64,
}

impl FinanceStrategy {
    pub fn new(providers: DomainProviderSet, timeout_ms: u64) -> Self {
        Self { providers, timeout_ms }
    }
}

#[async_trait]
impl Strategy for FinanceStrategy {
    async fn execute(
        &self,
        request: &QueryRequest,
        _routing: &RoutingDecision,
    ) -> Result<StrategyOutput> {
        let Some(ticker) = finance::extract_ticker(&request.query_text) else {
            return Ok(missing_entity_result(DomainKind::Finance, "ticker symbol"));
        };
        let payload = self.providers.invoke(&ticker, self.timeout_ms).await?;
        let formatted_summary = finance::format_summary(&ticker, &payload);
        Ok(StrategyOutput::Domain(DomainResult {
            kind: DomainKind::Finance,
            entity: ticker,
            provider_payload: payload,
            formatted_summary,
        }))
    }
}

pub struct RoutingStrategy {
    providers: DomainProviderSet,
    timeout_ms: u64,
}

impl RoutingStrategy {
    pub fn new(providers: DomainProviderSet, timeout_ms: u64) -> Self {
        Self { providers, timeout_ms }
    }
}

#[async_trait]
impl Strategy for RoutingStrategy {
    async fn execute(
        &self,
        request: &QueryRequest,
        _routing: &RoutingDecision,
    ) -> Result<StrategyOutput> {
        let Some(route) = routing::extract_route(&request.query_text) else {
            return Ok(missing_entity_result(
                DomainKind::Routing,
                "origin/destination pair",
            ));
        };
        let entity = route.as_entity();
        let payload = self.providers.invoke(&entity, self.timeout_ms).await?;
        let formatted_summary = routing::format_summary(&route, &payload);
        Ok(StrategyOutput::Domain(DomainResult {
            kind: DomainKind::Routing,
            entity,
            provider_payload: payload,
            formatted_summary,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::DomainProvider;
    use crate::types::{QueryContext, RoutingMethod, TaskKind};
    use std::sync::Arc;

    struct StubProvider(serde_json::Value);

    #[async_trait]
    impl DomainProvider for StubProvider {
        async fn fetch(&self, _entity: &str, _timeout_ms: u64) -> Result<serde_json::Value> {
            Ok(self.0.clone())
        }
        fn name(&self) -> &str {
            "stub"
        }
    }

    fn decision(kind: TaskKind) -> RoutingDecision {
        RoutingDecision {
            query: "q".into(),
            primary_task: kind,
            confidence: 0.9,
            reasoning: "test".into(),
            method: RoutingMethod::Keyword,
            tools_needed: vec![],
            multi_intent: false,
            follow_up_questions: vec![],
            estimated_duration_ms: 100,
        }
    }

    fn request(text: &str) -> QueryRequest {
        QueryRequest {
            query_text: text.into(),
            context: QueryContext::default(),
            timeout_ms: None,
        }
    }

    #[tokio::test]
    async fn weather_strategy_yields_explanatory_result_when_no_location() {
        let providers = DomainProviderSet::new(Arc::new(StubProvider(serde_json::json!({}))));
        let strategy = WeatherStrategy::new(providers, 5000);
        let output = strategy
            .execute(&request("hello there"), &decision(TaskKind::DomainWeather))
            .await
            .unwrap();
        match output {
            StrategyOutput::Domain(result) => {
                assert!(result.entity.is_empty());
                assert!(result.formatted_summary.contains("location"));
            }
            _ => panic!("expected domain output"),
        }
    }

    #[tokio::test]
    async fn finance_strategy_extracts_and_formats() {
        let payload = serde_json::json!({"Global Quote": {"05. price": "1.00", "10. change percent": "0%"}});
        let providers = DomainProviderSet::new(Arc::new(StubProvider(payload)));
        let strategy = FinanceStrategy::new(providers, 5000);
        let output = strategy
            .execute(&request("quote AAPL today"), &decision(TaskKind::DomainFinance))
            .await
            .unwrap();
        match output {
            StrategyOutput::Domain(result) => assert_eq!(result.entity, "AAPL"),
            _ => panic!("expected domain output"),
        }
    }
}
