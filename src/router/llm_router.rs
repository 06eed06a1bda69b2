//! LLM-backed classification, consulted when the keyword router is not
//! confident enough (§4.1, algorithm 2).
//!
//! Asks the configured LLM for a single JSON object describing the task
//! classification. Parsing follows the strict-then-lenient extractor
//! pattern used throughout the strategies (§9 re-architecture guidance):
//! try `serde_json::from_str` on the raw completion first, and only if that
//! fails, scan for the first balanced `{...}` span and retry. Any failure
//! of the LLM call itself, or of both parse attempts, falls back to the
//! keyword router rather than propagating an error — the router must never
//! fail a query outright (property P1).

use std::sync::Arc;

use serde::Deserialize;

use crate::llm::{ChatMessage, CompletionOptions, CompletionRequest, LlmProviderManager};
use crate::types::{RoutingDecision, RoutingMethod, TaskKind, ToolRecommendation};

use super::keyword::KeywordRouter;
use super::language::{detect, Language};

#[derive(Debug, Deserialize)]
struct RawClassification {
    primary_task: String,
    confidence: f64,
    reasoning: String,
    #[serde(default)]
    tools_needed: Vec<RawTool>,
    #[serde(default)]
    multi_intent: bool,
    #[serde(default)]
    follow_up_questions: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct RawTool {
    name: String,
    confidence: f64,
}

fn parse_task_kind(s: &str) -> Option<TaskKind> {
    match s.trim().to_ascii_lowercase().as_str() {
        "research" => Some(TaskKind::Research),
        "code" => Some(TaskKind::Code),
        "chat" => Some(TaskKind::Chat),
        "rag" => Some(TaskKind::Rag),
        "domain_weather" | "weather" => Some(TaskKind::DomainWeather),
        "domain_finance" | "finance" => Some(TaskKind::DomainFinance),
        "domain_routing" | "routing" => Some(TaskKind::DomainRouting),
        "workflow" => Some(TaskKind::Workflow),
        _ => None,
    }
}

/// Extract the first balanced `{...}` span, honoring quoted strings and
/// backslash escapes so braces inside string literals don't unbalance the
/// scan.
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

fn parse_classification(raw: &str) -> Option<RawClassification> {
    if let Ok(parsed) = serde_json::from_str::<RawClassification>(raw) {
        return Some(parsed);
    }
    let object = extract_json_object(raw)?;
    serde_json::from_str(object).ok()
}

const SYSTEM_PROMPT_EN: &str = r#"You classify a user's query into exactly one task category.
Respond with a single JSON object and nothing else:
{"primary_task": "research|code|chat|rag|domain_weather|domain_finance|domain_routing|workflow", "confidence": 0.0-1.0, "reasoning": "...", "tools_needed": [{"name": "...", "confidence": 0.0-1.0}], "multi_intent": false, "follow_up_questions": []}"#;

const SYSTEM_PROMPT_ZH: &str = r#"你負責把使用者的查詢歸類到唯一一種任務類別。
只回覆一個 JSON 物件，不要有其他文字：
{"primary_task": "research|code|chat|rag|domain_weather|domain_finance|domain_routing|workflow", "confidence": 0.0-1.0, "reasoning": "...", "tools_needed": [{"name": "...", "confidence": 0.0-1.0}], "multi_intent": false, "follow_up_questions": []}"#;

pub struct LlmRouter {
    manager: Arc<LlmProviderManager>,
    keyword: KeywordRouter,
}

impl LlmRouter {
    pub fn new(manager: Arc<LlmProviderManager>) -> Self {
        Self {
            manager,
            keyword: KeywordRouter::new(),
        }
    }

    /// Classify `query` via the configured LLM, using the keyword router's
    /// output as a deterministic fallback on any LLM or parse failure.
    pub async fn route(&self, query: &str) -> RoutingDecision {
        let system_prompt = match detect(query) {
            Language::Zh => SYSTEM_PROMPT_ZH,
            Language::En | Language::Other => SYSTEM_PROMPT_EN,
        };

        let request = CompletionRequest::new()
            .with_message(ChatMessage::system(system_prompt))
            .with_message(ChatMessage::user(query));

        let completion = match self
            .manager
            .complete(request, &CompletionOptions::default())
            .await
        {
            Ok(resp) => resp,
            Err(_) => return self.fallback(query),
        };

        let Some(raw) = parse_classification(&completion.content) else {
            return self.fallback(query);
        };

        let Some(primary_task) = parse_task_kind(&raw.primary_task) else {
            return self.fallback(query);
        };

        RoutingDecision {
            query: query.to_string(),
            primary_task,
            confidence: raw.confidence.clamp(0.0, 1.0),
            reasoning: raw.reasoning,
            method: RoutingMethod::Llm,
            tools_needed: raw
                .tools_needed
                .into_iter()
                .map(|t| ToolRecommendation::new(t.name, t.confidence))
                .collect(),
            multi_intent: raw.multi_intent,
            follow_up_questions: raw.follow_up_questions,
            estimated_duration_ms: 8_000,
        }
    }

    fn fallback(&self, query: &str) -> RoutingDecision {
        let mut decision = self.keyword.route(query);
        decision.method = RoutingMethod::KeywordFallback;
        decision
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_balanced_object_with_nested_braces() {
        let text = r#"Sure, here you go: {"primary_task": "code", "confidence": 0.9, "reasoning": "has {braces} inside a string"} Thanks!"#;
        let object = extract_json_object(text).unwrap();
        let parsed: RawClassification = serde_json::from_str(object).unwrap();
        assert_eq!(parsed.primary_task, "code");
    }

    #[test]
    fn strict_parse_succeeds_on_clean_json() {
        let raw = r#"{"primary_task": "chat", "confidence": 0.6, "reasoning": "greeting"}"#;
        let parsed = parse_classification(raw).unwrap();
        assert_eq!(parsed.primary_task, "chat");
        assert_eq!(parsed.confidence, 0.6);
    }

    #[test]
    fn unparsable_garbage_yields_none() {
        assert!(parse_classification("not json at all").is_none());
    }

    #[test]
    fn unknown_task_kind_string_is_rejected() {
        assert!(parse_task_kind("not_a_real_kind").is_none());
        assert_eq!(parse_task_kind("Code"), Some(TaskKind::Code));
    }
}
