//! Research strategy (§4.3): plan → parallel search → parallel scrape →
//! credibility score → rerank → synthesize.
//!
//! A scrape failure for any one URL does not fail the whole request (P4,
//! S3): the pipeline carries on with whatever sources it could fetch, and
//! only fails outright if the plan or every single source is unreachable.

use std::collections::HashSet;
use std::sync::Arc;

use tokio::sync::Semaphore;

use crate::config::ResearchConfig;
use crate::error::{Error, Result};
use crate::llm::{ChatMessage, CompletionOptions, CompletionRequest, LlmProviderManager};
use crate::scrape::{ContentExtractor, ScrapeClient};
use crate::search::SearchClient;
use crate::types::{QueryRequest, ResearchResult, RoutingDecision, Source, StrategyOutput};

use super::Strategy;

const PLAN_SYSTEM_PROMPT: &str = "Decompose the user's research question into at most \
    5 focused search subqueries. Respond with ONLY a JSON array of strings, nothing else.";

const SYNTHESIZE_SYSTEM_PROMPT: &str = "You are a research assistant. Using only the \
    provided sources, write a concise, well-cited answer to the user's question. \
    Reference sources by their number in brackets, e.g. [1].";

pub struct ResearchStrategy {
    manager: Arc<LlmProviderManager>,
    search: Arc<dyn SearchClient>,
    scrape: Arc<dyn ScrapeClient>,
    extractor: Arc<dyn ContentExtractor>,
    config: ResearchConfig,
}

impl ResearchStrategy {
    pub fn new(
        manager: Arc<LlmProviderManager>,
        search: Arc<dyn SearchClient>,
        scrape: Arc<dyn ScrapeClient>,
        extractor: Arc<dyn ContentExtractor>,
        config: ResearchConfig,
    ) -> Self {
        Self {
            manager,
            search,
            scrape,
            extractor,
            config,
        }
    }

    async fn plan(&self, query: &str) -> Vec<String> {
        let request = CompletionRequest::new()
            .with_system(PLAN_SYSTEM_PROMPT)
            .with_message(ChatMessage::user(query.to_string()));

        let parsed = self
            .manager
            .complete(request, &CompletionOptions::default())
            .await
            .ok()
            .and_then(|resp| parse_subqueries(&resp.content));

        match parsed {
            Some(subqueries) if !subqueries.is_empty() => {
                subqueries.into_iter().take(self.config.max_plan_subqueries).collect()
            }
            // A plan the LLM couldn't produce degrades to a single-subquery
            // plan (the original question) rather than failing the request.
            _ => vec![query.to_string()],
        }
    }

    async fn gather_sources(&self, plan: &[String]) -> Vec<Source> {
        // Parallel search (§4.3 step 2): one search call per subquery,
        // concurrently — never serially (§5). Each subquery's hits are
        // merged and deduped by URL only after every task has returned.
        let search_tasks: Vec<_> = plan
            .iter()
            .map(|subquery| {
                let search = self.search.clone();
                let subquery = subquery.clone();
                let timeout_ms = self.config.scrape_timeout_ms;
                tokio::spawn(async move { search.search(&subquery, timeout_ms).await })
            })
            .collect();

        let mut seen_urls = HashSet::new();
        let mut hits = Vec::new();
        for task in search_tasks {
            if let Ok(Ok(results)) = task.await {
                for hit in results {
                    if seen_urls.insert(hit.url.clone()) {
                        hits.push(hit);
                    }
                }
            }
        }
        hits.truncate(self.config.top_urls);

        let semaphore = Arc::new(Semaphore::new(self.config.scrape_workers.max(1)));
        let tasks: Vec<_> = hits
            .into_iter()
            .map(|hit| {
                let semaphore = semaphore.clone();
                let scrape = self.scrape.clone();
                let extractor = self.extractor.clone();
                let timeout_ms = self.config.scrape_timeout_ms;
                tokio::spawn(async move {
                    let _permit = semaphore.acquire_owned().await.ok()?;
                    let body = scrape.fetch(&hit.url, timeout_ms).await.ok()?;
                    let text = extractor.extract(&body);
                    let (score, details) = score_credibility(&hit.url, &text);
                    Some(Source {
                        url: hit.url,
                        title: hit.title,
                        snippet: if text.len() > 400 { text[..400].to_string() } else { text },
                        credibility_score: score,
                        credibility_details: details,
                    })
                })
            })
            .collect();

        let mut sources = Vec::new();
        for task in tasks {
            if let Ok(Some(source)) = task.await {
                sources.push(source);
            }
        }
        sources
    }

    async fn synthesize(&self, query: &str, sources: &[Source]) -> Result<String> {
        if sources.is_empty() {
            return Ok(
                "No sources could be retrieved for this question; unable to produce a grounded answer."
                    .to_string(),
            );
        }
        let mut context = String::new();
        for (ix, source) in sources.iter().enumerate() {
            context.push_str(&format!(
                "[{}] {} ({})\n{}\n\n",
                ix + 1,
                source.title,
                source.url,
                source.snippet
            ));
        }
        let request = CompletionRequest::new()
            .with_system(SYNTHESIZE_SYSTEM_PROMPT)
            .with_message(ChatMessage::user(format!(
                "Question: {query}\n\nSources:\n{context}"
            )));
        let response = self
            .manager
            .complete(request, &CompletionOptions::default())
            .await?;
        Ok(response.content)
    }
}

/// A coarse, deterministic credibility heuristic: HTTPS, a non-trivial body
/// length, and an absence of obvious placeholder/error-page markers. Real
/// credibility scoring (domain reputation, author signals) is an excluded
/// collaborator concern (§1); this is enough to rank and to demonstrate P4's
/// partial-source tolerance.
fn score_credibility(url: &str, text: &str) -> (f64, String) {
    let mut score = 0.4;
    let mut reasons = Vec::new();
    if url.starts_with("https://") {
        score += 0.2;
        reasons.push("https");
    }
    if text.len() > 500 {
        score += 0.3;
        reasons.push("substantial content");
    } else if text.len() > 100 {
        score += 0.15;
        reasons.push("some content");
    }
    if text.to_ascii_lowercase().contains("page not found") {
        score -= 0.4;
        reasons.push("looks like an error page");
    }
    (score.clamp(0.0, 1.0), reasons.join(", "))
}

/// Balanced-bracket scan for a `[...]` JSON array embedded in otherwise
/// free-form LLM prose, mirroring the router's strict-then-lenient JSON
/// extraction posture (§9) but over `[]` instead of `{}`.
fn extract_json_array(text: &str) -> Option<&str> {
    let bytes = text.as_bytes();
    let start = text.find('[')?;
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
            b'[' => depth += 1,
            b']' => {
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

fn parse_subqueries(text: &str) -> Option<Vec<String>> {
    if let Ok(list) = serde_json::from_str::<Vec<String>>(text.trim()) {
        return Some(list);
    }
    let candidate = extract_json_array(text)?;
    serde_json::from_str::<Vec<String>>(candidate).ok()
}

#[async_trait::async_trait]
impl Strategy for ResearchStrategy {
    async fn execute(
        &self,
        request: &QueryRequest,
        _routing: &RoutingDecision,
    ) -> Result<StrategyOutput> {
        let plan = self.plan(&request.query_text).await;
        let sources = self.gather_sources(&plan).await;

        let mut ranked = sources;
        ranked.sort_by(|a, b| {
            b.credibility_score
                .partial_cmp(&a.credibility_score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        ranked.truncate(self.config.rerank_top_k.max(1));

        if ranked.is_empty() && !plan.is_empty() {
            // Every source failed: still not an error per P4's "partial
            // results" framing, but we make the degradation explicit rather
            // than pretending the request is incomplete-but-fine.
            tracing::warn!(query = %request.query_text, "research strategy found no usable sources");
        }

        let summary = self.synthesize(&request.query_text, &ranked).await.map_err(|e| {
            if ranked.is_empty() {
                Error::ProviderUnavailable(format!("research synthesis unavailable: {e}"))
            } else {
                e
            }
        })?;

        Ok(StrategyOutput::Research(ResearchResult {
            query: request.query_text.clone(),
            plan,
            sources: ranked,
            summary,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{FakeLlmClient, Provider};
    use crate::scrape::{FakeScrapeClient, PlainTextExtractor};
    use crate::search::FakeSearchClient;
    use crate::search::SearchHit;
    use crate::types::QueryContext;
    use std::collections::HashMap;

    fn decision() -> RoutingDecision {
        RoutingDecision {
            query: "q".into(),
            primary_task: crate::types::TaskKind::Research,
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
    async fn partial_scrape_failure_still_produces_a_summary_p4() {
        let client = FakeLlmClient::new(
            Provider::Anthropic,
            vec![
                Ok(r#"["rust async runtimes"]"#.into()),
                Ok("Tokio is a widely used async runtime [1].".into()),
            ],
        );
        let manager = Arc::new(
            LlmProviderManager::builder()
                .with_provider("anthropic", Arc::new(client))
                .with_primary("anthropic")
                .build(),
        );
        let search = Arc::new(FakeSearchClient::with_hits(vec![
            SearchHit { title: "Tokio".into(), url: "https://ok.example/tokio".into(), snippet: "".into() },
            SearchHit { title: "Dead link".into(), url: "https://dead.example/gone".into(), snippet: "".into() },
        ]));
        let mut pages = HashMap::new();
        pages.insert("https://ok.example/tokio".to_string(), "<p>Tokio is a runtime.</p>".to_string());
        let scrape = Arc::new(FakeScrapeClient::new(pages));

        let strategy = ResearchStrategy::new(
            manager,
            search,
            scrape,
            Arc::new(PlainTextExtractor),
            ResearchConfig::default(),
        );

        let request = QueryRequest {
            query_text: "what is tokio".into(),
            context: QueryContext::default(),
            timeout_ms: None,
        };
        let output = strategy.execute(&request, &decision()).await.unwrap();
        match output {
            StrategyOutput::Research(result) => {
                assert_eq!(result.sources.len(), 1);
                assert!(result.summary.contains("Tokio"));
            }
            _ => panic!("expected research output"),
        }
    }

    #[tokio::test]
    async fn concurrent_search_across_subqueries_is_deduped_by_url() {
        let client = FakeLlmClient::new(
            Provider::Anthropic,
            vec![Ok("A summary citing both sources [1][2].".into())],
        );
        let manager = Arc::new(
            LlmProviderManager::builder()
                .with_provider("anthropic", Arc::new(client))
                .with_primary("anthropic")
                .build(),
        );
        // The fake search client ignores its query argument, so every
        // subquery in the plan returns the same two hits; gather_sources
        // must fan the plan's three subqueries out concurrently and still
        // collapse the result to the two distinct URLs.
        let search = Arc::new(FakeSearchClient::with_hits(vec![
            SearchHit { title: "One".into(), url: "https://ok.example/one".into(), snippet: "".into() },
            SearchHit { title: "Two".into(), url: "https://ok.example/two".into(), snippet: "".into() },
        ]));
        let mut pages = HashMap::new();
        pages.insert("https://ok.example/one".to_string(), "<p>first page</p>".to_string());
        pages.insert("https://ok.example/two".to_string(), "<p>second page</p>".to_string());
        let scrape = Arc::new(FakeScrapeClient::new(pages));

        let strategy = ResearchStrategy::new(
            manager,
            search,
            scrape,
            Arc::new(PlainTextExtractor),
            ResearchConfig::default(),
        );

        let plan = vec![
            "rust async one".to_string(),
            "rust async two".to_string(),
            "rust async three".to_string(),
        ];
        let sources = strategy.gather_sources(&plan).await;
        assert_eq!(sources.len(), 2);
        let mut urls: Vec<&str> = sources.iter().map(|s| s.url.as_str()).collect();
        urls.sort();
        assert_eq!(urls, vec!["https://ok.example/one", "https://ok.example/two"]);
    }

    #[test]
    fn parse_subqueries_handles_strict_and_lenient_json() {
        assert_eq!(
            parse_subqueries(r#"["a", "b"]"#),
            Some(vec!["a".to_string(), "b".to_string()])
        );
        assert_eq!(
            parse_subqueries("here you go: [\"a\", \"b\"] thanks"),
            Some(vec!["a".to_string(), "b".to_string()])
        );
    }
}
