//! LLM-backed query decomposition into a [`WorkflowPlan`] (§4.10), parsed
//! strict-then-lenient like the LLM router's classification parse (§9).

use std::collections::HashSet;

use serde::Deserialize;

use crate::error::{Error, Result};
use crate::llm::{ChatMessage, CompletionOptions, CompletionRequest, LlmProviderManager};
use crate::types::{TaskKind, TaskNode, WorkflowPlan};

const SYSTEM_PROMPT: &str = r#"Decompose the user's request into a DAG of sub-tasks. Respond
with ONLY a JSON object of the shape:
{"nodes": [{"id": "string", "kind": "research|code|chat|rag|domain_weather|domain_finance|domain_routing",
"input_template": "string, may reference {{other_node_id}}", "depends_on": ["node_id", ...],
"retry_budget": 1, "timeout_ms": 30000}]}
Use short, unique ids. Keep the plan as small as the request genuinely requires."#;

#[derive(Debug, Deserialize)]
struct RawPlan {
    nodes: Vec<RawNode>,
}

#[derive(Debug, Deserialize)]
struct RawNode {
    id: String,
    kind: TaskKind,
    input_template: String,
    #[serde(default)]
    depends_on: Vec<String>,
    #[serde(default = "default_retry_budget")]
    retry_budget: u32,
    #[serde(default = "default_timeout_ms")]
    timeout_ms: u64,
}

fn default_retry_budget() -> u32 {
    2
}
fn default_timeout_ms() -> u64 {
    30_000
}

/// Extract the first balanced `{...}` span honoring quoted strings, mirroring
/// the router's lenient JSON extraction (duplicated rather than shared
/// because the router's helper is private to that module).
fn extract_json_object(text: &str) -> Option<&str> {
    let bytes = text.as_bytes();
    let start = text.find('{')?;
    let mut depth = 0i32;
    let mut in_string = false;
    let mut escaped = false;

    for (i, &b) in bytes.iter().enumerate().skip(start) {
        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..=i]);
                }
            }
            _ => {}
        }
    }
    None
}

fn parse_plan(raw: &str) -> Option<RawPlan> {
    if let Ok(plan) = serde_json::from_str::<RawPlan>(raw) {
        return Some(plan);
    }
    let object = extract_json_object(raw)?;
    serde_json::from_str(object).ok()
}

/// Ask the LLM to decompose `query` into a [`WorkflowPlan`], then validate
/// it as a DAG before returning (property P7: no cyclic/unknown-dependency
/// plan escapes this function).
pub async fn decompose(manager: &LlmProviderManager, query: &str) -> Result<WorkflowPlan> {
    let request = CompletionRequest::new()
        .with_system(SYSTEM_PROMPT)
        .with_message(ChatMessage::user(query.to_string()));
    let response = manager.complete(request, &CompletionOptions::default()).await?;

    let raw = parse_plan(&response.content).ok_or_else(|| {
        Error::Internal(format!("workflow decomposer returned unparseable plan: {}", response.content))
    })?;

    let mut seen_ids = HashSet::new();
    let nodes: Vec<TaskNode> = raw
        .nodes
        .into_iter()
        .filter(|n| seen_ids.insert(n.id.clone()))
        .map(|n| TaskNode {
            id: n.id,
            kind: n.kind,
            input_template: n.input_template,
            depends_on: n.depends_on.into_iter().collect(),
            retry_budget: n.retry_budget,
            timeout_ms: n.timeout_ms,
        })
        .collect();

    let plan = WorkflowPlan { nodes };
    plan.validate()?;
    Ok(plan)
}
