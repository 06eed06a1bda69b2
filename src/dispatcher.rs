//! Engine facade (§2, §4): the single `Query(request) → Response` entry
//! point. Routes, then hands the decision either to a single strategy or,
//! when the router flagged `multi_intent`, to the Workflow Engine — racing
//! the whole dispatch against the request's deadline (P8).

use std::sync::Arc;

use crate::error::{Error, Result};
use crate::router::HybridRouter;
use crate::types::{ChatResult, QueryRequest, QueryResponse, RoutingDecision, StrategyOutput, TaskKind};
use crate::workflow::WorkflowEngine;
use crate::strategies::StrategyRegistry;

const DEFAULT_DEADLINE_MS: u64 = 60_000;

/// Top-level engine: owns the router, the strategy registry, and the
/// workflow engine, and is the only type most callers need (§2 "System
/// Overview").
pub struct Dispatcher {
    router: Arc<HybridRouter>,
    registry: Arc<StrategyRegistry>,
    workflow: Arc<WorkflowEngine>,
}

impl Dispatcher {
    pub fn new(router: Arc<HybridRouter>, registry: Arc<StrategyRegistry>, workflow: Arc<WorkflowEngine>) -> Self {
        Self {
            router,
            registry,
            workflow,
        }
    }

    /// `Query(request) → Response` (§2). An empty or whitespace-only query
    /// short-circuits straight to a chat clarification rather than routing
    /// at all — there is nothing to classify.
    pub async fn query(&self, request: QueryRequest) -> Result<QueryResponse> {
        let deadline = std::time::Duration::from_millis(request.timeout_ms.unwrap_or(DEFAULT_DEADLINE_MS));
        match tokio::time::timeout(deadline, self.query_inner(&request)).await {
            Ok(result) => result,
            Err(_) => Err(Error::Cancelled),
        }
    }

    async fn query_inner(&self, request: &QueryRequest) -> Result<QueryResponse> {
        if request.query_text.trim().is_empty() {
            let routing = clarification_routing_decision();
            return Ok(QueryResponse {
                routing,
                output: StrategyOutput::Chat(ChatResult {
                    message: "Could you say a bit more about what you'd like help with?".to_string(),
                }),
            });
        }

        let routing = self
            .router
            .route(&request.query_text, request.context.language_hint.as_deref())
            .await;

        let output = if routing.multi_intent {
            let run_result = self.workflow.run(request, None).await?;
            StrategyOutput::Workflow(run_result)
        } else {
            let strategy = self.registry.get(routing.primary_task).ok_or_else(|| {
                Error::Internal(format!("no strategy registered for {}", routing.primary_task))
            })?;
            strategy.execute(request, &routing).await?
        };

        Ok(QueryResponse { routing, output })
    }
}

fn clarification_routing_decision() -> RoutingDecision {
    RoutingDecision {
        query: String::new(),
        primary_task: TaskKind::Chat,
        confidence: 1.0,
        reasoning: "empty query short-circuited to a clarification prompt".to_string(),
        method: crate::types::RoutingMethod::Keyword,
        tools_needed: Vec::new(),
        multi_intent: false,
        follow_up_questions: vec!["What would you like help with?".to_string()],
        estimated_duration_ms: 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{RouterConfig, WorkflowConfig};
    use crate::llm::LlmProviderManager;
    use crate::strategies::Strategy;
    use crate::types::QueryContext;
    use async_trait::async_trait;

    struct EchoStrategy;

    #[async_trait]
    impl Strategy for EchoStrategy {
        async fn execute(
            &self,
            request: &QueryRequest,
            _routing: &RoutingDecision,
        ) -> Result<StrategyOutput> {
            Ok(StrategyOutput::Chat(ChatResult {
                message: request.query_text.clone(),
            }))
        }
    }

    fn dispatcher() -> Dispatcher {
        let manager = Arc::new(LlmProviderManager::builder().build());
        let router = Arc::new(HybridRouter::new(&RouterConfig::default(), manager.clone()));
        let registry = Arc::new(StrategyRegistry::new().register(TaskKind::Chat, Arc::new(EchoStrategy)));
        let workflow = Arc::new(WorkflowEngine::new(registry.clone(), manager, WorkflowConfig::default()));
        Dispatcher::new(router, registry, workflow)
    }

    #[tokio::test]
    async fn empty_query_short_circuits_to_clarification() {
        let dispatcher = dispatcher();
        let request = QueryRequest {
            query_text: "   ".to_string(),
            context: QueryContext::default(),
            timeout_ms: None,
        };
        let response = dispatcher.query(request).await.unwrap();
        match response.output {
            StrategyOutput::Chat(result) => assert!(result.message.contains("help")),
            _ => panic!("expected chat clarification"),
        }
    }

    #[tokio::test]
    async fn greeting_routes_to_chat_strategy() {
        let dispatcher = dispatcher();
        let request = QueryRequest {
            query_text: "hello there".to_string(),
            context: QueryContext::default(),
            timeout_ms: None,
        };
        let response = dispatcher.query(request).await.unwrap();
        assert_eq!(response.routing.primary_task, TaskKind::Chat);
        match response.output {
            StrategyOutput::Chat(result) => assert_eq!(result.message, "hello there"),
            _ => panic!("expected chat output"),
        }
    }

    #[tokio::test]
    async fn overall_deadline_cancels_a_hanging_strategy_p8() {
        struct HangingStrategy;
        #[async_trait]
        impl Strategy for HangingStrategy {
            async fn execute(
                &self,
                _request: &QueryRequest,
                _routing: &RoutingDecision,
            ) -> Result<StrategyOutput> {
                tokio::time::sleep(std::time::Duration::from_secs(60)).await;
                unreachable!()
            }
        }
        let manager = Arc::new(LlmProviderManager::builder().build());
        let router = Arc::new(HybridRouter::new(&RouterConfig::default(), manager.clone()));
        let registry = Arc::new(StrategyRegistry::new().register(TaskKind::Chat, Arc::new(HangingStrategy)));
        let workflow = Arc::new(WorkflowEngine::new(registry.clone(), manager, WorkflowConfig::default()));
        let dispatcher = Dispatcher::new(router, registry, workflow);

        let request = QueryRequest {
            query_text: "hello there".to_string(),
            context: QueryContext::default(),
            timeout_ms: Some(50),
        };
        let outcome = dispatcher.query(request).await;
        assert!(matches!(outcome, Err(Error::Cancelled)));
    }
}
