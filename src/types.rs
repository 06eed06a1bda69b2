//! Core data model: the types every router, strategy, and the workflow
//! engine produce or consume.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Closed (but additive) enumeration of dispatch categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    Research,
    Code,
    Chat,
    Rag,
    DomainWeather,
    DomainFinance,
    DomainRouting,
    Workflow,
}

impl std::fmt::Display for TaskKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Research => "research",
            Self::Code => "code",
            Self::Chat => "chat",
            Self::Rag => "rag",
            Self::DomainWeather => "domain_weather",
            Self::DomainFinance => "domain_finance",
            Self::DomainRouting => "domain_routing",
            Self::Workflow => "workflow",
        };
        write!(f, "{s}")
    }
}

/// Which router path produced a [`RoutingDecision`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoutingMethod {
    Keyword,
    Llm,
    KeywordFallback,
}

/// A tool the dispatcher or a downstream strategy may want to invoke.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolRecommendation {
    pub name: String,
    pub confidence: f64,
    pub params: HashMap<String, String>,
}

impl ToolRecommendation {
    pub fn new(name: impl Into<String>, confidence: f64) -> Self {
        Self {
            name: name.into(),
            confidence: confidence.clamp(0.0, 1.0),
            params: HashMap::new(),
        }
    }
}

/// Immutable value produced by the router for one incoming query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutingDecision {
    pub query: String,
    pub primary_task: TaskKind,
    pub confidence: f64,
    pub reasoning: String,
    pub method: RoutingMethod,
    pub tools_needed: Vec<ToolRecommendation>,
    pub multi_intent: bool,
    pub follow_up_questions: Vec<String>,
    pub estimated_duration_ms: u64,
}

impl RoutingDecision {
    /// True if the decision satisfies the router's totality invariant (P1).
    pub fn is_valid(&self) -> bool {
        (0.0..=1.0).contains(&self.confidence)
    }
}

/// `{role, content}` — the unit of LLM input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// One scraped document with metadata and a credibility score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Source {
    pub url: String,
    pub title: String,
    pub snippet: String,
    pub credibility_score: f64,
    pub credibility_details: String,
}

/// Result of the Research strategy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResearchResult {
    pub query: String,
    pub plan: Vec<String>,
    pub sources: Vec<Source>,
    pub summary: String,
}

/// Result of the Code strategy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CodeResult {
    pub problem: String,
    pub code: String,
    pub stdout: String,
    pub stderr: String,
    pub success: bool,
    pub explanation: String,
    pub truncated: bool,
}

/// One embedded text fragment stored in a vector collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub doc_id: String,
    pub chunk_ix: u32,
    pub text: String,
    pub score: f64,
    pub metadata: HashMap<String, String>,
}

/// Result of the RAG strategy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RagResult {
    pub question: String,
    pub answer: String,
    pub sources: Vec<Chunk>,
}

/// Result of the Chat strategy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatResult {
    pub message: String,
}

/// Which domain a [`DomainResult`] came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DomainKind {
    Weather,
    Finance,
    Routing,
}

/// Result of a Domain (Weather/Finance/Routing) strategy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomainResult {
    pub kind: DomainKind,
    pub entity: String,
    pub provider_payload: serde_json::Value,
    pub formatted_summary: String,
}

/// One node in a [`WorkflowPlan`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskNode {
    pub id: String,
    pub kind: TaskKind,
    pub input_template: String,
    pub depends_on: HashSet<String>,
    pub retry_budget: u32,
    pub timeout_ms: u64,
}

/// A DAG of [`TaskNode`]s derived from (or supplied for) a multi-intent query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowPlan {
    pub nodes: Vec<TaskNode>,
}

impl WorkflowPlan {
    /// Validate structural invariants: every `depends_on` id exists, and the
    /// dependency relation is acyclic (property P7).
    pub fn validate(&self) -> crate::error::Result<()> {
        let ids: HashSet<&str> = self.nodes.iter().map(|n| n.id.as_str()).collect();
        for node in &self.nodes {
            for dep in &node.depends_on {
                if !ids.contains(dep.as_str()) {
                    return Err(crate::error::Error::UnknownNode(dep.clone()));
                }
            }
        }
        if self.topological_order().is_none() {
            return Err(crate::error::Error::NotAcyclic(format!(
                "{} node plan has a cycle",
                self.nodes.len()
            )));
        }
        Ok(())
    }

    /// Kahn's algorithm; returns `None` if the graph has a cycle.
    pub fn topological_order(&self) -> Option<Vec<String>> {
        let mut in_degree: HashMap<&str, usize> = HashMap::new();
        let mut dependents: HashMap<&str, Vec<&str>> = HashMap::new();

        for node in &self.nodes {
            in_degree.entry(node.id.as_str()).or_insert(0);
            for dep in &node.depends_on {
                *in_degree.entry(node.id.as_str()).or_insert(0) += 1;
                dependents.entry(dep.as_str()).or_default().push(&node.id);
            }
        }

        let mut ready: Vec<&str> = in_degree
            .iter()
            .filter(|(_, &d)| d == 0)
            .map(|(id, _)| *id)
            .collect();
        ready.sort();

        let mut order = Vec::with_capacity(self.nodes.len());
        let mut queue = ready;
        while let Some(id) = queue.pop() {
            order.push(id.to_string());
            if let Some(deps) = dependents.get(id) {
                for &dep_id in deps {
                    let entry = in_degree.get_mut(dep_id).unwrap();
                    *entry -= 1;
                    if *entry == 0 {
                        queue.push(dep_id);
                    }
                }
            }
        }

        if order.len() == self.nodes.len() {
            Some(order)
        } else {
            None
        }
    }
}

/// Status of one node during a workflow run. Monotonic with respect to
/// terminality: once `succeeded`/`failed`/`skipped`, never regresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
    Skipped,
}

impl ExecutionStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Skipped)
    }
}

/// Per-node bookkeeping during a workflow run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionRecord {
    pub status: ExecutionStatus,
    pub attempts: u32,
    pub result: Option<String>,
    pub error: Option<String>,
}

impl ExecutionRecord {
    pub fn pending() -> Self {
        Self {
            status: ExecutionStatus::Pending,
            attempts: 0,
            result: None,
            error: None,
        }
    }
}

/// Any of the typed results a [`TaskKind`] strategy can produce.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StrategyOutput {
    Research(ResearchResult),
    Code(CodeResult),
    Rag(RagResult),
    Chat(ChatResult),
    Domain(DomainResult),
    Workflow(WorkflowRunResult),
}

/// Final outcome of a workflow run: the unified answer plus every node's
/// terminal [`ExecutionRecord`], keyed by node id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowRunResult {
    pub query: String,
    pub answer: String,
    pub records: HashMap<String, ExecutionRecord>,
}

/// The single inbound request shape (§6).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueryContext {
    pub language_hint: Option<String>,
    pub conversation_id: Option<String>,
    pub preferred_provider: Option<String>,
    pub uploaded_file_ids: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct QueryRequest {
    pub query_text: String,
    pub context: QueryContext,
    pub timeout_ms: Option<u64>,
}

/// The engine's single response shape: one typed result plus the
/// [`RoutingDecision`] copy for observability.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryResponse {
    pub routing: RoutingDecision,
    pub output: StrategyOutput,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(id: &str, deps: &[&str]) -> TaskNode {
        TaskNode {
            id: id.to_string(),
            kind: TaskKind::Chat,
            input_template: String::new(),
            depends_on: deps.iter().map(|s| s.to_string()).collect(),
            retry_budget: 3,
            timeout_ms: 30_000,
        }
    }

    #[test]
    fn acyclic_plan_validates() {
        let plan = WorkflowPlan {
            nodes: vec![
                node("a", &[]),
                node("b", &["a"]),
                node("c", &["a"]),
                node("d", &["b", "c"]),
            ],
        };
        assert!(plan.validate().is_ok());
        let order = plan.topological_order().unwrap();
        assert_eq!(order.first().unwrap(), "a");
        assert_eq!(order.last().unwrap(), "d");
    }

    #[test]
    fn cyclic_plan_is_rejected() {
        let plan = WorkflowPlan {
            nodes: vec![node("a", &["b"]), node("b", &["a"])],
        };
        assert!(plan.validate().is_err());
    }

    #[test]
    fn unknown_dependency_is_rejected() {
        let plan = WorkflowPlan {
            nodes: vec![node("a", &["missing"])],
        };
        assert!(plan.validate().is_err());
    }

    #[test]
    fn execution_status_terminality() {
        assert!(!ExecutionStatus::Pending.is_terminal());
        assert!(!ExecutionStatus::Running.is_terminal());
        assert!(ExecutionStatus::Succeeded.is_terminal());
        assert!(ExecutionStatus::Failed.is_terminal());
        assert!(ExecutionStatus::Skipped.is_terminal());
    }

    #[test]
    fn routing_decision_round_trips() {
        let decision = RoutingDecision {
            query: "2^10".to_string(),
            primary_task: TaskKind::Code,
            confidence: 0.9,
            reasoning: "math pattern matched".to_string(),
            method: RoutingMethod::Keyword,
            tools_needed: vec![ToolRecommendation::new("sandbox", 0.9)],
            multi_intent: false,
            follow_up_questions: vec![],
            estimated_duration_ms: 2000,
        };
        let json = serde_json::to_string(&decision).unwrap();
        let back: RoutingDecision = serde_json::from_str(&json).unwrap();
        assert_eq!(decision, back);
        assert!(back.is_valid());
    }
}
