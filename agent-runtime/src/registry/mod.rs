//! Capability registries (C3, §4.2): in-process tables of actions, providers, evaluators,
//! services, and model handlers, keyed by name / `service_type` / `ModelType`.
//!
//! Registries are read-mostly after `initialize()` (§5 shared-resource policy); the tables
//! themselves use `dashmap` so concurrent reads during a turn need no external locking.

pub mod action;
pub mod evaluator;
pub mod model;
pub mod provider;
pub mod service;

pub use action::{Action, ActionOptions, ActionParameter, ActionResult, ParamSchema, RegisteredAction, ResponseCallback};
pub use evaluator::{Evaluator, RegisteredEvaluator};
pub use model::{ModelDispatcher, ModelError, ModelHandler, ModelType};
pub use provider::{Provider, ProviderResult, RegisteredProvider};
pub use service::{create_service_error, Service, ServiceError, ServiceFactory};

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use dashmap::DashMap;

/// In-process tables for one runtime instance (§4.2).
///
/// Invariant 1 (§3): re-registering an action/provider name replaces the prior entry and
/// logs a warning (the reference behavior §9 chooses over a hard `DuplicateName` error).
pub struct Registries {
    pub(crate) actions: DashMap<String, RegisteredAction>,
    pub(crate) providers: DashMap<String, RegisteredProvider>,
    pub(crate) evaluators: DashMap<String, RegisteredEvaluator>,
    pub(crate) service_factories: DashMap<String, ServiceFactory>,
    pub(crate) service_instances: DashMap<String, Arc<dyn Service>>,
    pub models: ModelDispatcher,
    provider_seq: AtomicUsize,
}

impl Default for Registries {
    fn default() -> Self {
        Self {
            actions: DashMap::new(),
            providers: DashMap::new(),
            evaluators: DashMap::new(),
            service_factories: DashMap::new(),
            service_instances: DashMap::new(),
            models: ModelDispatcher::new(),
            provider_seq: AtomicUsize::new(0),
        }
    }
}

impl Registries {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_action(&self, action: Arc<dyn Action>) {
        let name = action.name().to_string();
        if self.actions.contains_key(&name) {
            tracing::warn!(action = %name, "replacing previously registered action with the same name");
        }
        self.actions.insert(name, RegisteredAction::new(action));
    }

    pub fn register_provider(&self, provider: Arc<dyn Provider>) {
        let name = provider.name().to_string();
        if self.providers.contains_key(&name) {
            tracing::warn!(provider = %name, "replacing previously registered provider with the same name");
        }
        let seq = self.provider_seq.fetch_add(1, Ordering::SeqCst);
        self.providers.insert(name, RegisteredProvider { provider, seq });
    }

    pub fn register_evaluator(&self, evaluator: Arc<dyn Evaluator>) {
        let name = evaluator.name().to_string();
        if self.evaluators.contains_key(&name) {
            tracing::warn!(evaluator = %name, "replacing previously registered evaluator with the same name");
        }
        self.evaluators.insert(name, RegisteredEvaluator::new(evaluator));
    }

    pub fn register_service_factory(&self, factory: ServiceFactory) {
        self.service_factories.insert(factory.service_type.clone(), factory);
    }

    /// Returns the singleton instance for `service_type`, or `None` if not started (§4.3).
    pub fn get_service(&self, service_type: &str) -> Option<Arc<dyn Service>> {
        self.service_instances.get(service_type).map(|e| e.clone())
    }

    pub fn action(&self, name: &str) -> Option<Arc<dyn Action>> {
        self.actions.get(name).map(|e| e.action.clone())
    }

    /// Returns the action's *merged* parameter schema — the author-declared parameters, or
    /// the canonical-doc ones filled in by C12 when the action declared none (§4.10).
    /// Validation (§4.6 step 3) must consult this rather than `Action::parameters()`
    /// directly, or a doc-filled schema would never be enforced.
    pub fn action_parameters(&self, name: &str) -> Vec<ActionParameter> {
        self.actions.get(name).map(|e| e.parameters.clone()).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use super::*;
    use crate::memory::Memory;
    use crate::runtime::Runtime;
    use crate::state::State;

    struct BareAction;

    #[async_trait]
    impl Action for BareAction {
        fn name(&self) -> &str {
            "BARE"
        }
        async fn handle(
            &self,
            _rt: &Runtime,
            _msg: &Memory,
            _state: &State,
            _options: &ActionOptions,
            _callback: Option<&ResponseCallback>,
        ) -> ActionResult {
            ActionResult::ok()
        }
    }

    #[test]
    fn action_parameters_falls_back_to_merged_doc_fields() {
        let registries = Registries::new();
        registries.register_action(Arc::new(BareAction));
        assert!(registries.action_parameters("BARE").is_empty());

        // Simulate what merge_canonical_docs (C12) does when a doc blob fills in a
        // parameter the author never declared.
        {
            let mut entry = registries.actions.get_mut("BARE").unwrap();
            entry.parameters = vec![ActionParameter {
                name: "target".to_string(),
                description: "doc-filled".to_string(),
                required: true,
                schema: ParamSchema::default(),
            }];
        }

        let merged = registries.action_parameters("BARE");
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].name, "target");
    }
}
