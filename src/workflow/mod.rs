//! Workflow Engine (§4.10): executes a [`WorkflowPlan`] DAG in
//! topological waves with bounded concurrency, per-node retry budgets and
//! timeouts, transitive skip-on-failure, and named-output input
//! substitution — then asks the LLM to decompose a multi-intent query into
//! a plan and to aggregate the finished records into one answer.
//!
//! The wave-scheduling and lifecycle-event shape is grounded conceptually
//! on the teacher's former staged orchestration loop and its event-stream
//! module, reworked here around an explicit dependency DAG instead of a
//! single linear sequence of phases.

pub mod decomposer;

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{mpsc, Semaphore};

use crate::config::WorkflowConfig;
use crate::error::{Error, Result};
use crate::llm::LlmProviderManager;
use crate::strategies::StrategyRegistry;
use crate::types::{
    ExecutionRecord, ExecutionStatus, QueryContext, QueryRequest, StrategyOutput, TaskNode,
    WorkflowPlan, WorkflowRunResult,
};

/// Per-node lifecycle events emitted as the engine runs a plan (§4.10,
/// §10.2). Observability only — nothing in the engine blocks on a receiver
/// existing; `emit` is a no-op if the channel has no listener or is absent.
#[derive(Debug, Clone)]
pub enum WorkflowEvent {
    NodeStarted { id: String },
    NodeAttemptFailed { id: String, attempt: u32, error: String },
    NodeSucceeded { id: String },
    NodeFailed { id: String, error: String },
    NodeSkipped { id: String, reason: String },
}

fn emit(sender: Option<&mpsc::UnboundedSender<WorkflowEvent>>, event: WorkflowEvent) {
    if let Some(sender) = sender {
        let _ = sender.send(event);
    }
}

/// Group nodes into topological waves: wave 0 has no dependencies, wave N
/// depends only on nodes in waves < N. Assumes `plan` already validated
/// acyclic (§4.10 "topological-wave scheduling").
fn compute_waves(plan: &WorkflowPlan) -> Vec<Vec<TaskNode>> {
    let mut wave_of: HashMap<String, usize> = HashMap::new();
    let order = plan.topological_order().expect("plan must be validated acyclic before scheduling");
    let by_id: HashMap<&str, &TaskNode> =
        plan.nodes.iter().map(|n| (n.id.as_str(), n)).collect();

    for id in &order {
        let node = by_id[id.as_str()];
        let wave = node
            .depends_on
            .iter()
            .map(|dep| wave_of.get(dep).copied().unwrap_or(0) + 1)
            .max()
            .unwrap_or(0);
        wave_of.insert(id.clone(), wave);
    }

    let max_wave = wave_of.values().copied().max().unwrap_or(0);
    let mut waves: Vec<Vec<TaskNode>> = (0..=max_wave).map(|_| Vec::new()).collect();
    for node in &plan.nodes {
        let wave = wave_of[&node.id];
        waves[wave].push(node.clone());
    }
    waves
}

/// Substitute `{{node_id}}` placeholders in `template` with the referenced
/// node's stringified result (§4.10 "named-output templating").
fn substitute_inputs(template: &str, records: &HashMap<String, ExecutionRecord>) -> String {
    let mut out = template.to_string();
    for (id, record) in records {
        let placeholder = format!("{{{{{id}}}}}");
        if out.contains(&placeholder) {
            out = out.replace(&placeholder, record.result.as_deref().unwrap_or(""));
        }
    }
    out
}

/// Reduce a strategy's typed output to the single string later nodes can
/// substitute and the aggregator can read.
fn stringify_output(output: &StrategyOutput) -> String {
    match output {
        StrategyOutput::Research(r) => r.summary.clone(),
        StrategyOutput::Code(r) => r.stdout.clone(),
        StrategyOutput::Rag(r) => r.answer.clone(),
        StrategyOutput::Chat(r) => r.message.clone(),
        StrategyOutput::Domain(r) => r.formatted_summary.clone(),
        StrategyOutput::Workflow(r) => r.answer.clone(),
    }
}

const AGGREGATE_SYSTEM_PROMPT: &str = "Combine the following sub-task results into a single, \
    coherent answer to the user's original query. If any sub-task failed or was skipped, \
    briefly acknowledge the gap rather than inventing an answer for it.";

pub struct WorkflowEngine {
    registry: Arc<StrategyRegistry>,
    manager: Arc<LlmProviderManager>,
    config: WorkflowConfig,
}

impl WorkflowEngine {
    pub fn new(
        registry: Arc<StrategyRegistry>,
        manager: Arc<LlmProviderManager>,
        config: WorkflowConfig,
    ) -> Self {
        Self {
            registry,
            manager,
            config,
        }
    }

    /// Run one node to terminal status, retrying up to its own
    /// `retry_budget` under its own `timeout_ms` (§4.10, S7).
    async fn run_node(
        &self,
        node: &TaskNode,
        base_context: &QueryContext,
        records: &HashMap<String, ExecutionRecord>,
        events: Option<&mpsc::UnboundedSender<WorkflowEvent>>,
    ) -> ExecutionRecord {
        emit(events, WorkflowEvent::NodeStarted { id: node.id.clone() });

        let Some(strategy) = self.registry.get(node.kind) else {
            let error = format!("no strategy registered for task kind {}", node.kind);
            emit(
                events,
                WorkflowEvent::NodeFailed { id: node.id.clone(), error: error.clone() },
            );
            return ExecutionRecord {
                status: ExecutionStatus::Failed,
                attempts: 0,
                result: None,
                error: Some(error),
            };
        };

        let query_text = substitute_inputs(&node.input_template, records);
        let request = QueryRequest {
            query_text,
            context: base_context.clone(),
            timeout_ms: Some(node.timeout_ms),
        };
        let routing = crate::types::RoutingDecision {
            query: request.query_text.clone(),
            primary_task: node.kind,
            confidence: 1.0,
            reasoning: "dispatched by workflow node".to_string(),
            method: crate::types::RoutingMethod::Keyword,
            tools_needed: Vec::new(),
            multi_intent: false,
            follow_up_questions: Vec::new(),
            estimated_duration_ms: node.timeout_ms,
        };

        let max_attempts = node.retry_budget.max(1);
        let mut last_error = String::new();
        for attempt in 0..max_attempts {
            let timeout = std::time::Duration::from_millis(node.timeout_ms);
            let outcome = tokio::time::timeout(timeout, strategy.execute(&request, &routing)).await;
            match outcome {
                Ok(Ok(output)) => {
                    emit(events, WorkflowEvent::NodeSucceeded { id: node.id.clone() });
                    return ExecutionRecord {
                        status: ExecutionStatus::Succeeded,
                        attempts: attempt + 1,
                        result: Some(stringify_output(&output)),
                        error: None,
                    };
                }
                Ok(Err(e)) => last_error = e.to_string(),
                Err(_) => {
                    last_error = Error::SandboxTimeout { duration_ms: node.timeout_ms }.to_string()
                }
            }
            emit(
                events,
                WorkflowEvent::NodeAttemptFailed {
                    id: node.id.clone(),
                    attempt: attempt + 1,
                    error: last_error.clone(),
                },
            );
        }

        emit(
            events,
            WorkflowEvent::NodeFailed { id: node.id.clone(), error: last_error.clone() },
        );
        ExecutionRecord {
            status: ExecutionStatus::Failed,
            attempts: max_attempts,
            result: None,
            error: Some(last_error),
        }
    }

    /// Execute every node of an already-validated plan, wave by wave
    /// (property P7). A node whose dependencies did not all succeed is
    /// marked `Skipped` without being invoked (transitive skip).
    pub async fn execute_plan(
        &self,
        plan: &WorkflowPlan,
        context: &QueryContext,
        events: Option<mpsc::UnboundedSender<WorkflowEvent>>,
    ) -> Result<HashMap<String, ExecutionRecord>> {
        plan.validate()?;
        let waves = compute_waves(plan);
        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrent_nodes.max(1)));
        let mut records: HashMap<String, ExecutionRecord> = HashMap::new();

        for wave in waves {
            let mut handles = Vec::with_capacity(wave.len());
            for node in wave {
                let deps_ok = node
                    .depends_on
                    .iter()
                    .all(|dep| matches!(records.get(dep).map(|r| r.status), Some(ExecutionStatus::Succeeded)));

                if !deps_ok {
                    let reason = "a dependency did not succeed".to_string();
                    emit(
                        events.as_ref(),
                        WorkflowEvent::NodeSkipped { id: node.id.clone(), reason: reason.clone() },
                    );
                    records.insert(
                        node.id.clone(),
                        ExecutionRecord {
                            status: ExecutionStatus::Skipped,
                            attempts: 0,
                            result: None,
                            error: Some(reason),
                        },
                    );
                    continue;
                }

                let semaphore = semaphore.clone();
                let engine_records = records.clone();
                let context = context.clone();
                let events = events.clone();
                let node = node.clone();
                let this = WorkflowEngineRef {
                    registry: self.registry.clone(),
                    manager: self.manager.clone(),
                    config: self.config.clone(),
                };
                handles.push(tokio::spawn(async move {
                    let _permit = semaphore.acquire_owned().await.ok();
                    let engine = WorkflowEngine {
                        registry: this.registry,
                        manager: this.manager,
                        config: this.config,
                    };
                    let record = engine.run_node(&node, &context, &engine_records, events.as_ref()).await;
                    (node.id, record)
                }));
            }

            for handle in handles {
                if let Ok((id, record)) = handle.await {
                    records.insert(id, record);
                }
            }
        }

        Ok(records)
    }

    /// Combine every terminal record into one unified answer (§4.10).
    pub async fn aggregate(&self, query: &str, records: &HashMap<String, ExecutionRecord>) -> Result<String> {
        let mut ordered: Vec<(&String, &ExecutionRecord)> = records.iter().collect();
        ordered.sort_by(|a, b| a.0.cmp(b.0));

        let mut context = String::new();
        for (id, record) in &ordered {
            match record.status {
                ExecutionStatus::Succeeded => {
                    context.push_str(&format!(
                        "[{id}] succeeded: {}\n",
                        record.result.as_deref().unwrap_or("")
                    ));
                }
                ExecutionStatus::Failed => {
                    context.push_str(&format!(
                        "[{id}] failed: {}\n",
                        record.error.as_deref().unwrap_or("unknown error")
                    ));
                }
                ExecutionStatus::Skipped => {
                    context.push_str(&format!("[{id}] skipped\n"));
                }
                _ => {}
            }
        }

        let request = crate::llm::CompletionRequest::new()
            .with_system(AGGREGATE_SYSTEM_PROMPT)
            .with_message(crate::llm::ChatMessage::user(format!(
                "Original query: {query}\n\nSub-task results:\n{context}"
            )));
        let response = self
            .manager
            .complete(request, &crate::llm::CompletionOptions::default())
            .await?;
        Ok(response.content)
    }

    /// Decompose, execute, and aggregate in one call (§4.10).
    pub async fn run(
        &self,
        request: &QueryRequest,
        events: Option<mpsc::UnboundedSender<WorkflowEvent>>,
    ) -> Result<WorkflowRunResult> {
        let plan = decomposer::decompose(&self.manager, &request.query_text).await?;
        let records = self.execute_plan(&plan, &request.context, events).await?;
        let answer = self.aggregate(&request.query_text, &records).await?;
        Ok(WorkflowRunResult {
            query: request.query_text.clone(),
            answer,
            records,
        })
    }
}

/// A plain data carrier used to move an engine's parts into a spawned task
/// without requiring `WorkflowEngine` itself to be `Clone`.
struct WorkflowEngineRef {
    registry: Arc<StrategyRegistry>,
    manager: Arc<LlmProviderManager>,
    config: WorkflowConfig,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategies::Strategy;
    use crate::types::{ChatResult, TaskKind};
    use async_trait::async_trait;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingEchoStrategy(Arc<AtomicUsize>);

    #[async_trait]
    impl Strategy for CountingEchoStrategy {
        async fn execute(
            &self,
            request: &QueryRequest,
            _routing: &crate::types::RoutingDecision,
        ) -> Result<StrategyOutput> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(StrategyOutput::Chat(ChatResult {
                message: format!("ran: {}", request.query_text),
            }))
        }
    }

    struct AlwaysFailStrategy;

    #[async_trait]
    impl Strategy for AlwaysFailStrategy {
        async fn execute(
            &self,
            _request: &QueryRequest,
            _routing: &crate::types::RoutingDecision,
        ) -> Result<StrategyOutput> {
            Err(Error::Internal("boom".to_string()))
        }
    }

    fn node(id: &str, kind: TaskKind, deps: &[&str]) -> TaskNode {
        TaskNode {
            id: id.to_string(),
            kind,
            input_template: format!("do {id}"),
            depends_on: deps.iter().map(|d| d.to_string()).collect(),
            retry_budget: 1,
            timeout_ms: 5000,
        }
    }

    #[tokio::test]
    async fn independent_nodes_run_in_the_same_wave() {
        let counter = Arc::new(AtomicUsize::new(0));
        let registry = Arc::new(
            StrategyRegistry::new().register(TaskKind::Chat, Arc::new(CountingEchoStrategy(counter.clone()))),
        );
        let manager = Arc::new(LlmProviderManager::builder().build());
        let engine = WorkflowEngine::new(registry, manager, WorkflowConfig::default());

        let plan = WorkflowPlan {
            nodes: vec![node("a", TaskKind::Chat, &[]), node("b", TaskKind::Chat, &[])],
        };
        let records = engine.execute_plan(&plan, &QueryContext::default(), None).await.unwrap();
        assert_eq!(counter.load(Ordering::SeqCst), 2);
        assert_eq!(records["a"].status, ExecutionStatus::Succeeded);
        assert_eq!(records["b"].status, ExecutionStatus::Succeeded);
    }

    #[tokio::test]
    async fn downstream_node_is_skipped_when_dependency_fails_p7() {
        let registry = Arc::new(
            StrategyRegistry::new()
                .register(TaskKind::Code, Arc::new(AlwaysFailStrategy))
                .register(TaskKind::Chat, Arc::new(CountingEchoStrategy(Arc::new(AtomicUsize::new(0))))),
        );
        let manager = Arc::new(LlmProviderManager::builder().build());
        let engine = WorkflowEngine::new(registry, manager, WorkflowConfig::default());

        let plan = WorkflowPlan {
            nodes: vec![
                node("gen", TaskKind::Code, &[]),
                node("explain", TaskKind::Chat, &["gen"]),
            ],
        };
        let records = engine.execute_plan(&plan, &QueryContext::default(), None).await.unwrap();
        assert_eq!(records["gen"].status, ExecutionStatus::Failed);
        assert_eq!(records["explain"].status, ExecutionStatus::Skipped);
    }

    #[tokio::test]
    async fn named_output_is_substituted_into_downstream_input() {
        struct CapturingStrategy(Arc<std::sync::Mutex<Vec<String>>>);

        #[async_trait]
        impl Strategy for CapturingStrategy {
            async fn execute(
                &self,
                request: &QueryRequest,
                _routing: &crate::types::RoutingDecision,
            ) -> Result<StrategyOutput> {
                self.0.lock().unwrap().push(request.query_text.clone());
                Ok(StrategyOutput::Chat(ChatResult { message: "42".to_string() }))
            }
        }

        let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
        let registry = Arc::new(
            StrategyRegistry::new().register(TaskKind::Chat, Arc::new(CapturingStrategy(seen.clone()))),
        );
        let manager = Arc::new(LlmProviderManager::builder().build());
        let engine = WorkflowEngine::new(registry, manager, WorkflowConfig::default());

        let mut second = node("second", TaskKind::Chat, &["first"]);
        second.input_template = "use {{first}} as input".to_string();
        let plan = WorkflowPlan {
            nodes: vec![node("first", TaskKind::Chat, &[]), second],
        };
        engine.execute_plan(&plan, &QueryContext::default(), None).await.unwrap();

        let calls = seen.lock().unwrap();
        assert!(calls.iter().any(|c| c == "use 42 as input"));
    }

    #[test]
    fn compute_waves_groups_independent_nodes_together() {
        let plan = WorkflowPlan {
            nodes: vec![
                node("a", TaskKind::Chat, &[]),
                node("b", TaskKind::Chat, &[]),
                node("c", TaskKind::Chat, &["a", "b"]),
            ],
        };
        let waves = compute_waves(&plan);
        assert_eq!(waves.len(), 2);
        let wave0_ids: HashSet<&str> = waves[0].iter().map(|n| n.id.as_str()).collect();
        assert_eq!(wave0_ids, HashSet::from(["a", "b"]));
        assert_eq!(waves[1][0].id, "c");
    }
}
