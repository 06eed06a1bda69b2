//! Strategy Dispatcher (§4.2-§4.7): one [`Strategy`] implementation per
//! [`TaskKind`], selected by table lookup rather than a branching `match` so
//! adding a strategy never touches the dispatch call site.
//!
//! Grounded on the teacher's `orchestrator.rs` phase-handler shape
//! (EXTERNALIZE/ANALYZE/DECOMPOSE/EXECUTE/SYNTHESIZE as named stages of one
//! loop), generalized here into independent, separately testable pipelines
//! behind a single trait instead of one monolithic loop.

pub mod chat;
pub mod code;
pub mod domain;
pub mod rag;
pub mod research;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{QueryRequest, RoutingDecision, StrategyOutput, TaskKind};

/// One task-kind pipeline: given the original request and the routing
/// decision that selected it, produce a [`StrategyOutput`].
#[async_trait]
pub trait Strategy: Send + Sync {
    async fn execute(
        &self,
        request: &QueryRequest,
        routing: &RoutingDecision,
    ) -> Result<StrategyOutput>;
}

/// Table-lookup dispatch registry (§9: "a `HashMap<TaskKind, Box<dyn
/// Strategy>>` replaces the long `if/elif` chain").
#[derive(Default)]
pub struct StrategyRegistry {
    strategies: HashMap<TaskKind, Arc<dyn Strategy>>,
}

impl StrategyRegistry {
    pub fn new() -> Self {
        Self {
            strategies: HashMap::new(),
        }
    }

    pub fn register(mut self, kind: TaskKind, strategy: Arc<dyn Strategy>) -> Self {
        self.strategies.insert(kind, strategy);
        self
    }

    pub fn get(&self, kind: TaskKind) -> Option<Arc<dyn Strategy>> {
        self.strategies.get(&kind).cloned()
    }
}
