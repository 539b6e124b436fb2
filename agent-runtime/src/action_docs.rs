//! Action-doc merger (C12, §4.10): fills missing canonical fields (`description`,
//! `similes`, `parameters`, and evaluator `examples`) onto registered actions/evaluators
//! from embedded doc blobs, without ever overwriting an author-supplied field.
//!
//! Mirrors `with_canonical_action_docs` / `with_canonical_evaluator_docs` in the source:
//! two JSON blobs ("core" — the built-in bootstrap actions — and "all" — every known
//! community action) are compiled in via `include_str!`, parsed once, and consulted in
//! that order (core first, since it is the more authoritative set) whenever a registered
//! capability is missing a field.

use std::collections::HashMap;

use once_cell::sync::Lazy;
use serde::Deserialize;

use crate::registry::{ActionParameter, Registries};

const ACTION_DOCS_JSON: &str = include_str!("../assets/action_docs.json");

#[derive(Debug, Deserialize, Default, Clone)]
struct ActionDoc {
    #[serde(default)]
    description: String,
    #[serde(default)]
    similes: Vec<String>,
    #[serde(default)]
    parameters: Vec<ActionParameter>,
}

#[derive(Debug, Deserialize, Default, Clone)]
struct EvaluatorDoc {
    #[serde(default)]
    description: String,
    #[serde(default)]
    similes: Vec<String>,
    #[serde(default)]
    examples: Vec<String>,
}

#[derive(Debug, Deserialize, Default)]
struct DocBundle {
    #[serde(default)]
    actions: HashMap<String, ActionDoc>,
    #[serde(default)]
    evaluators: HashMap<String, EvaluatorDoc>,
}

#[derive(Debug, Deserialize, Default)]
struct DocFile {
    #[serde(default)]
    core: DocBundle,
    #[serde(default)]
    all: DocBundle,
}

static DOCS: Lazy<DocFile> = Lazy::new(|| {
    serde_json::from_str(ACTION_DOCS_JSON).unwrap_or_else(|e| {
        tracing::error!(error = %e, "failed to parse embedded action_docs.json; doc merge will be a no-op");
        DocFile::default()
    })
});

fn find_action_doc(name: &str) -> Option<&'static ActionDoc> {
    DOCS.core.actions.get(name).or_else(|| DOCS.all.actions.get(name))
}

fn find_evaluator_doc(name: &str) -> Option<&'static EvaluatorDoc> {
    DOCS.core.evaluators.get(name).or_else(|| DOCS.all.evaluators.get(name))
}

/// Fills missing fields on every registered action/evaluator from the embedded doc blobs
/// (§4.10). Called once during plugin init, after all plugins in dependency order have
/// registered their capabilities. Never overwrites a field the plugin already set
/// (§8 property 8).
pub fn merge_canonical_docs(registries: &Registries) {
    for mut entry in registries.actions.iter_mut() {
        let name = entry.key().clone();
        let Some(doc) = find_action_doc(&name) else {
            continue;
        };
        let reg = entry.value_mut();
        if reg.description.is_empty() {
            reg.description = doc.description.clone();
        }
        if reg.similes.is_empty() {
            reg.similes = doc.similes.clone();
        }
        if reg.parameters.is_empty() {
            reg.parameters = doc.parameters.clone();
        }
    }
    for mut entry in registries.evaluators.iter_mut() {
        let name = entry.key().clone();
        let Some(doc) = find_evaluator_doc(&name) else {
            continue;
        };
        let reg = entry.value_mut();
        if reg.description.is_empty() {
            reg.description = doc.description.clone();
        }
        if reg.similes.is_empty() {
            reg.similes = doc.similes.clone();
        }
        if reg.examples.is_empty() {
            reg.examples = doc.examples.clone();
        }
    }
}
