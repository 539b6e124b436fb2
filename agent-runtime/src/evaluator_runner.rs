//! Evaluator runner (C9, §4.7): post-response fan-out. Runs fire-and-forget after the
//! response memory is written; evaluators may persist their own memories but must never
//! mutate the response itself, and their failures are logged, never surfaced to the caller.

use crate::memory::Memory;
use crate::runtime::Runtime;
use crate::state::State;

/// Runs every registered evaluator whose `validate()` returns true (or that declares
/// `always_run()`), returning the names of those that actually ran (§4.7, §6
/// `EVALUATORS_COMPLETED` payload).
pub async fn run_evaluators(rt: &Runtime, msg: &Memory, state: &State) -> Vec<String> {
    let evaluators: Vec<_> = rt
        .registries
        .evaluators
        .iter()
        .map(|e| e.value().evaluator.clone())
        .collect();

    let mut ran = Vec::new();
    for evaluator in evaluators {
        let name = evaluator.name().to_string();
        let should_run = evaluator.always_run() || evaluator.validate(rt, msg, state).await;
        if !should_run {
            continue;
        }
        evaluator.handle(rt, msg, state).await;
        ran.push(name);
    }
    ran
}
