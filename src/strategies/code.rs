//! Code strategy (§4.4): generate a program via the LLM, run it through the
//! sandbox, and explain the result. A validation rejection (layer 1) feeds
//! straight back into generation up to `max_validation_retries` times before
//! giving up and surfacing the last rejection (S1, S5).

use std::sync::Arc;

use async_trait::async_trait;

use crate::config::CodeConfig;
use crate::error::Result;
use crate::llm::{ChatMessage, CompletionOptions, CompletionRequest, LlmProviderManager};
use crate::sandbox::{self, ContainerRuntime};
use crate::types::{CodeResult, QueryRequest, RoutingDecision, StrategyOutput};

use super::Strategy;

const GENERATE_SYSTEM_PROMPT: &str = "Write a short Rhai script that solves the user's \
    problem and prints the answer with `print(...)`. Respond with ONLY the code, no \
    markdown fences, no explanation.";

const EXPLAIN_SYSTEM_PROMPT: &str =
    "Explain, in two or three sentences, what the following program computed and why its \
    output answers the user's problem.";

pub struct CodeStrategy {
    manager: Arc<LlmProviderManager>,
    config: CodeConfig,
    container: Option<Arc<dyn ContainerRuntime>>,
}

impl CodeStrategy {
    pub fn new(manager: Arc<LlmProviderManager>, config: CodeConfig) -> Self {
        Self {
            manager,
            config,
            container: None,
        }
    }

    pub fn with_container_runtime(mut self, runtime: Arc<dyn ContainerRuntime>) -> Self {
        self.container = Some(runtime);
        self
    }

    async fn generate(&self, problem: &str, prior_rejection: Option<&str>) -> Result<String> {
        let mut user_turn = format!("Problem: {problem}");
        if let Some(reason) = prior_rejection {
            user_turn.push_str(&format!(
                "\n\nThe previous attempt was rejected by the sandbox: {reason}\n\
                 Write a new program that avoids this and uses only safe, pure computation."
            ));
        }
        let request = CompletionRequest::new()
            .with_system(GENERATE_SYSTEM_PROMPT)
            .with_message(ChatMessage::user(user_turn));
        let response = self
            .manager
            .complete(request, &CompletionOptions::default())
            .await?;
        Ok(strip_code_fences(&response.content))
    }

    async fn explain(&self, problem: &str, code: &str, result: &CodeResult) -> String {
        let request = CompletionRequest::new().with_system(EXPLAIN_SYSTEM_PROMPT).with_message(
            ChatMessage::user(format!(
                "Problem: {problem}\n\nCode:\n{code}\n\nStdout:\n{}\n\nSucceeded: {}",
                result.stdout, result.success
            )),
        );
        match self.manager.complete(request, &CompletionOptions::default()).await {
            Ok(response) => response.content,
            Err(_) => {
                // The explanation is a nicety, not the result itself; fall
                // back to a templated explanation rather than failing the
                // whole strategy over it.
                if result.success {
                    format!("The program ran successfully and printed: {}", result.stdout.trim())
                } else {
                    format!("The program did not complete successfully: {}", result.stderr.trim())
                }
            }
        }
    }
}

fn strip_code_fences(text: &str) -> String {
    let trimmed = text.trim();
    if let Some(rest) = trimmed.strip_prefix("```") {
        let without_lang = rest.trim_start_matches(|c: char| c.is_alphanumeric());
        let body = without_lang.strip_suffix("```").unwrap_or(without_lang);
        body.trim().to_string()
    } else {
        trimmed.to_string()
    }
}

#[async_trait]
impl Strategy for CodeStrategy {
    async fn execute(
        &self,
        request: &QueryRequest,
        _routing: &RoutingDecision,
    ) -> Result<StrategyOutput> {
        let problem = &request.query_text;
        let mut last_rejection: Option<String> = None;
        let mut result = CodeResult {
            problem: problem.clone(),
            code: String::new(),
            stdout: String::new(),
            stderr: String::new(),
            success: false,
            explanation: String::new(),
            truncated: false,
        };

        for _attempt in 0..=self.config.max_validation_retries {
            let code = self.generate(problem, last_rejection.as_deref()).await?;
            result = sandbox::run(problem, &code, &self.config, self.container.as_ref()).await;

            let was_rejected = result.explanation.starts_with("rejected before execution");
            if !was_rejected {
                break;
            }
            last_rejection = Some(result.explanation.clone());
        }

        result.explanation = self.explain(problem, &result.code, &result).await;
        Ok(StrategyOutput::Code(result))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{FakeLlmClient, Provider};
    use crate::types::{QueryContext, RoutingMethod, TaskKind};

    fn decision() -> RoutingDecision {
        RoutingDecision {
            query: "compute".into(),
            primary_task: TaskKind::Code,
            confidence: 0.9,
            reasoning: "test".into(),
            method: RoutingMethod::Keyword,
            tools_needed: vec![],
            multi_intent: false,
            follow_up_questions: vec![],
            estimated_duration_ms: 100,
        }
    }

    #[tokio::test]
    async fn valid_generated_program_succeeds_s1() {
        let client = FakeLlmClient::new(
            Provider::Anthropic,
            vec![
                Ok("```rhai\nprint(2**10);\n```".into()),
                Ok("This computes 2 to the power of 10.".into()),
            ],
        );
        let manager = Arc::new(
            LlmProviderManager::builder()
                .with_provider("anthropic", Arc::new(client))
                .with_primary("anthropic")
                .build(),
        );
        let strategy = CodeStrategy::new(manager, CodeConfig::default());
        let request = QueryRequest {
            query_text: "Calculate 2^10".into(),
            context: QueryContext::default(),
            timeout_ms: None,
        };
        let output = strategy.execute(&request, &decision()).await.unwrap();
        match output {
            StrategyOutput::Code(result) => {
                assert!(result.success);
                assert_eq!(result.stdout.trim(), "1024");
            }
            _ => panic!("expected code output"),
        }
    }

    #[tokio::test]
    async fn rejected_program_retries_then_surfaces_failure_s5() {
        let client = FakeLlmClient::new(
            Provider::Anthropic,
            vec![
                Ok("exec(\"rm -rf /\");".into()),
                Ok("exec(\"rm -rf /\");".into()),
                Ok("exec(\"rm -rf /\");".into()),
                Ok("The attempted program was unsafe and could not run.".into()),
            ],
        );
        let manager = Arc::new(
            LlmProviderManager::builder()
                .with_provider("anthropic", Arc::new(client))
                .with_primary("anthropic")
                .build(),
        );
        let mut config = CodeConfig::default();
        config.max_validation_retries = 2;
        let strategy = CodeStrategy::new(manager, config);
        let request = QueryRequest {
            query_text: "delete everything".into(),
            context: QueryContext::default(),
            timeout_ms: None,
        };
        let output = strategy.execute(&request, &decision()).await.unwrap();
        match output {
            StrategyOutput::Code(result) => {
                assert!(!result.success);
                assert!(result.stdout.is_empty());
            }
            _ => panic!("expected code output"),
        }
    }

    #[test]
    fn strip_code_fences_removes_markdown_wrapper() {
        assert_eq!(strip_code_fences("```rhai\nprint(1);\n```"), "print(1);");
        assert_eq!(strip_code_fences("print(1);"), "print(1);");
    }
}
