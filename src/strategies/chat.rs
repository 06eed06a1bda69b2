//! Chat strategy (§4.5): a single completion call plus per-conversation
//! history, truncated to a token budget rather than a message count so a
//! handful of long turns cannot silently blow past the provider's context
//! window (S4).

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::Strategy;
use crate::error::Result;
use crate::llm::{ChatMessage, CompletionOptions, CompletionRequest, LlmProviderManager};
use crate::types::{ChatResult, Message, QueryRequest, Role, RoutingDecision, StrategyOutput};

const SYSTEM_PROMPT: &str = "You are a helpful, concise assistant.";

/// Rough token estimate used only for history truncation, not billing: one
/// token per four characters of content, which is close enough for a
/// budget to matter without needing the request's actual tokenizer.
fn estimate_tokens(messages: &[Message]) -> usize {
    messages.iter().map(|m| m.content.len() / 4 + 1).sum()
}

/// Drop the oldest turns (but never the newest user message) until the
/// remaining history fits under `budget_tokens`.
fn truncate_to_budget(mut history: Vec<Message>, budget_tokens: usize) -> Vec<Message> {
    while history.len() > 1 && estimate_tokens(&history) > budget_tokens {
        history.remove(0);
    }
    history
}

pub struct ChatStrategy {
    manager: Arc<LlmProviderManager>,
    histories: RwLock<HashMap<String, Vec<Message>>>,
    history_token_budget: usize,
}

impl ChatStrategy {
    pub fn new(manager: Arc<LlmProviderManager>) -> Self {
        Self {
            manager,
            histories: RwLock::new(HashMap::new()),
            history_token_budget: 4000,
        }
    }

    async fn history_for(&self, conversation_id: Option<&str>) -> Vec<Message> {
        match conversation_id {
            Some(id) => self.histories.read().await.get(id).cloned().unwrap_or_default(),
            None => Vec::new(),
        }
    }

    async fn append_turn(&self, conversation_id: Option<&str>, user: Message, assistant: Message) {
        let Some(id) = conversation_id else { return };
        let mut histories = self.histories.write().await;
        let entry = histories.entry(id.to_string()).or_default();
        entry.push(user);
        entry.push(assistant);
        let budget = self.history_token_budget;
        let truncated = truncate_to_budget(std::mem::take(entry), budget);
        *entry = truncated;
    }
}

fn to_chat_message(message: &Message) -> ChatMessage {
    match message.role {
        Role::System => ChatMessage::system(message.content.clone()),
        Role::User => ChatMessage::user(message.content.clone()),
        Role::Assistant => ChatMessage::assistant(message.content.clone()),
    }
}

#[async_trait]
impl Strategy for ChatStrategy {
    async fn execute(
        &self,
        request: &QueryRequest,
        _routing: &RoutingDecision,
    ) -> Result<StrategyOutput> {
        let conversation_id = request.context.conversation_id.as_deref();
        let history = self.history_for(conversation_id).await;

        let mut completion_request = CompletionRequest::new().with_system(SYSTEM_PROMPT);
        for turn in &history {
            completion_request = completion_request.with_message(to_chat_message(turn));
        }
        completion_request =
            completion_request.with_message(ChatMessage::user(request.query_text.clone()));

        let options = CompletionOptions {
            preferred_provider: request.context.preferred_provider.clone(),
            ..Default::default()
        };

        let response = self.manager.complete(completion_request, &options).await?;

        self.append_turn(
            conversation_id,
            Message::user(request.query_text.clone()),
            Message::assistant(response.content.clone()),
        )
        .await;

        Ok(StrategyOutput::Chat(ChatResult {
            message: response.content,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{FakeLlmClient, Provider};
    use crate::types::{QueryContext, RoutingMethod, TaskKind};

    fn decision() -> RoutingDecision {
        RoutingDecision {
            query: "hi".into(),
            primary_task: TaskKind::Chat,
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
    async fn chat_completes_and_tracks_history_per_conversation() {
        let client = FakeLlmClient::new(
            Provider::Anthropic,
            vec![Ok("hello there".into()), Ok("yes indeed".into())],
        );
        let manager = Arc::new(
            LlmProviderManager::builder()
                .with_provider("anthropic", Arc::new(client))
                .with_primary("anthropic")
                .build(),
        );
        let strategy = ChatStrategy::new(manager);

        let request = QueryRequest {
            query_text: "hi".into(),
            context: QueryContext {
                conversation_id: Some("conv-1".into()),
                ..Default::default()
            },
            timeout_ms: None,
        };

        let output = strategy.execute(&request, &decision()).await.unwrap();
        match output {
            StrategyOutput::Chat(result) => assert_eq!(result.message, "hello there"),
            _ => panic!("expected chat output"),
        }

        let history = strategy.history_for(Some("conv-1")).await;
        assert_eq!(history.len(), 2);
    }

    #[test]
    fn truncation_keeps_newest_turn_even_under_tight_budget() {
        let history = vec![
            Message::user("a".repeat(1000)),
            Message::assistant("b".repeat(1000)),
            Message::user("recent".to_string()),
        ];
        let truncated = truncate_to_budget(history, 1);
        assert_eq!(truncated.last().unwrap().content, "recent");
    }
}
