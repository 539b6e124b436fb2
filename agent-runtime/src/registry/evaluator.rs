//! `Evaluator` capability type (§3, §4.7).

use async_trait::async_trait;

use crate::memory::Memory;
use crate::runtime::Runtime;
use crate::state::State;

#[async_trait]
pub trait Evaluator: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str {
        ""
    }
    fn similes(&self) -> &[String] {
        &[]
    }
    fn examples(&self) -> &[String] {
        &[]
    }
    /// When true, the evaluator runs regardless of `validate`'s result (§4.7).
    fn always_run(&self) -> bool {
        false
    }

    async fn validate(&self, rt: &Runtime, msg: &Memory, state: &State) -> bool;

    /// Runs fire-and-forget after the response is written; may persist its own memories
    /// (reflections, facts) but must never mutate the response (§4.7).
    async fn handle(&self, rt: &Runtime, msg: &Memory, state: &State);
}

pub struct RegisteredEvaluator {
    pub evaluator: std::sync::Arc<dyn Evaluator>,
    pub description: String,
    pub similes: Vec<String>,
    pub examples: Vec<String>,
}

impl RegisteredEvaluator {
    pub fn new(evaluator: std::sync::Arc<dyn Evaluator>) -> Self {
        let description = evaluator.description().to_string();
        let similes = evaluator.similes().to_vec();
        let examples = evaluator.examples().to_vec();
        Self {
            evaluator,
            description,
            similes,
            examples,
        }
    }

    pub fn name(&self) -> &str {
        self.evaluator.name()
    }
}
