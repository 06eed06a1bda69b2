//! RAG strategy (§4.6): embed the question, query the cached vector store,
//! optionally rerank by a weighted blend of the two configured signals, then
//! synthesize a cited answer.

use std::sync::Arc;

use async_trait::async_trait;

use crate::config::RagConfig;
use crate::error::Result;
use crate::llm::{ChatMessage, CompletionOptions, CompletionRequest, EmbeddingRequest, LlmProviderManager};
use crate::types::{Chunk, QueryRequest, RagResult, RoutingDecision, StrategyOutput};
use crate::vectorstore::CachedVectorStore;

use super::Strategy;

const SYNTHESIZE_SYSTEM_PROMPT: &str = "Answer the user's question using only the provided \
    context chunks. Cite chunks by their number in brackets, e.g. [1]. If the context does \
    not contain the answer, say so plainly.";

pub struct RagStrategy {
    manager: Arc<LlmProviderManager>,
    store: Arc<CachedVectorStore>,
    collection: String,
    config: RagConfig,
}

impl RagStrategy {
    pub fn new(
        manager: Arc<LlmProviderManager>,
        store: Arc<CachedVectorStore>,
        collection: impl Into<String>,
        config: RagConfig,
    ) -> Self {
        Self {
            manager,
            store,
            collection: collection.into(),
            config,
        }
    }

    /// Rerank by a weighted blend of the store's cosine score (the "bge"
    /// signal, standing in for a bi-encoder retriever) and a lightweight
    /// lexical-overlap score (the "cross_encoder" signal, standing in for a
    /// real cross-encoder — an excluded collaborator, §1). Disabled by
    /// config, the store's own ranking is used unchanged.
    fn rerank(&self, question: &str, mut chunks: Vec<Chunk>) -> Vec<Chunk> {
        if !self.config.reranker_enabled {
            return chunks;
        }
        let query_words: std::collections::HashSet<&str> = question.split_whitespace().collect();
        let weights = &self.config.rerank_weights;
        let lexical = |text: &str| -> f64 {
            let words: std::collections::HashSet<&str> = text.split_whitespace().collect();
            let overlap = words.intersection(&query_words).count();
            overlap as f64 / (query_words.len().max(1) as f64)
        };
        let mut scored: Vec<(f64, Chunk)> = chunks
            .drain(..)
            .map(|c| {
                let blended = weights.bge * c.score + weights.cross_encoder * lexical(&c.text);
                (blended, c)
            })
            .collect();
        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(self.config.rerank_top_k);
        scored.into_iter().map(|(score, mut c)| {
            c.score = score;
            c
        }).collect()
    }

    async fn synthesize(&self, question: &str, chunks: &[Chunk]) -> Result<String> {
        if chunks.is_empty() {
            return Ok("No relevant context was found in the knowledge base for this question.".to_string());
        }
        let mut context = String::new();
        for (ix, chunk) in chunks.iter().enumerate() {
            context.push_str(&format!("[{}] {}\n\n", ix + 1, chunk.text));
        }
        let request = CompletionRequest::new()
            .with_system(SYNTHESIZE_SYSTEM_PROMPT)
            .with_message(ChatMessage::user(format!(
                "Question: {question}\n\nContext:\n{context}"
            )));
        let response = self
            .manager
            .complete(request, &CompletionOptions::default())
            .await?;
        Ok(response.content)
    }
}

#[async_trait]
impl Strategy for RagStrategy {
    async fn execute(
        &self,
        request: &QueryRequest,
        _routing: &RoutingDecision,
    ) -> Result<StrategyOutput> {
        let question = &request.query_text;

        let embed_response = self
            .manager
            .embed(
                EmbeddingRequest {
                    model: Some(self.config.embedding_model_id.clone()),
                    texts: vec![question.clone()],
                },
                request.context.preferred_provider.as_deref(),
            )
            .await?;
        let vector = embed_response.embeddings.into_iter().next().unwrap_or_default();

        let chunks = self
            .store
            .query_cached(&self.collection, question, &vector, self.config.default_k, None)
            .await?;

        let ranked = self.rerank(question, chunks);
        let answer = self.synthesize(question, &ranked).await?;

        Ok(StrategyOutput::Rag(RagResult {
            question: question.clone(),
            answer,
            sources: ranked,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{FakeLlmClient, Provider};
    use crate::types::QueryContext;
    use crate::vectorstore::{ChunkInsert, SqliteVectorStore, VectorStore};
    use std::collections::HashMap;

    fn decision() -> RoutingDecision {
        RoutingDecision {
            query: "q".into(),
            primary_task: crate::types::TaskKind::Rag,
            confidence: 0.9,
            reasoning: "test".into(),
            method: crate::types::RoutingMethod::Keyword,
            tools_needed: vec![],
            multi_intent: false,
            follow_up_questions: vec![],
            estimated_duration_ms: 100,
        }
    }

    #[tokio::test]
    async fn rag_retrieves_and_cites_sources() {
        let client = FakeLlmClient::new(
            Provider::Anthropic,
            vec![Ok("Cited answer [1].".into())],
        );
        let manager = Arc::new(
            LlmProviderManager::builder()
                .with_provider("anthropic", Arc::new(client))
                .with_primary("anthropic")
                .build(),
        );

        let inner: Arc<dyn VectorStore> = Arc::new(SqliteVectorStore::in_memory().unwrap());
        inner
            .add_chunks(
                "docs",
                vec![ChunkInsert {
                    id: "a".into(),
                    vector: vec![0.0; 8],
                    text: "the relevant fact".into(),
                    metadata: HashMap::new(),
                }],
            )
            .await
            .unwrap();
        let store = Arc::new(CachedVectorStore::new(inner, 3600, 100));

        let strategy = RagStrategy::new(manager, store, "docs", RagConfig::default());
        let request = QueryRequest {
            query_text: "what is the fact".into(),
            context: QueryContext::default(),
            timeout_ms: None,
        };
        let output = strategy.execute(&request, &decision()).await.unwrap();
        match output {
            StrategyOutput::Rag(result) => {
                assert_eq!(result.sources.len(), 1);
                assert!(result.answer.contains("Cited"));
            }
            _ => panic!("expected rag output"),
        }
    }

    #[test]
    fn rerank_disabled_leaves_store_order_unchanged() {
        let manager = Arc::new(LlmProviderManager::builder().build());
        let store = Arc::new(CachedVectorStore::new(
            Arc::new(SqliteVectorStore::in_memory().unwrap()),
            3600,
            100,
        ));
        let config = RagConfig {
            reranker_enabled: false,
            ..RagConfig::default()
        };
        let strategy = RagStrategy::new(manager, store, "docs", config);
        let chunks = vec![Chunk {
            doc_id: "a".into(),
            chunk_ix: 0,
            text: "x".into(),
            score: 0.5,
            metadata: HashMap::new(),
        }];
        let ranked = strategy.rerank("q", chunks.clone());
        assert_eq!(ranked, chunks);
    }

    #[test]
    fn rerank_enabled_truncates_to_top_m() {
        let manager = Arc::new(LlmProviderManager::builder().build());
        let store = Arc::new(CachedVectorStore::new(
            Arc::new(SqliteVectorStore::in_memory().unwrap()),
            3600,
            100,
        ));
        let config = RagConfig {
            reranker_enabled: true,
            rerank_top_k: 2,
            ..RagConfig::default()
        };
        let strategy = RagStrategy::new(manager, store, "docs", config);
        let chunks: Vec<Chunk> = (0..5)
            .map(|ix| Chunk {
                doc_id: "a".into(),
                chunk_ix: ix,
                text: format!("chunk {ix}"),
                score: ix as f64 / 10.0,
                metadata: HashMap::new(),
            })
            .collect();
        let ranked = strategy.rerank("q", chunks);
        assert_eq!(ranked.len(), 2);
        // Highest blended score (from the highest raw score, chunk 4) survives first.
        assert_eq!(ranked[0].text, "chunk 4");
    }
}
