//! `Plugin` composition & dependency resolution (C4, §4.2). Ported from the topological
//! sort described in `elizaos` plugin loading and verified against
//! `packages/python/tests/test_plugin.py`'s dependency-resolution matrix.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use thiserror::Error;

use crate::registry::{Action, Evaluator, Provider, ServiceFactory};
use crate::runtime::Runtime;

type InitFuture<'a> = Pin<Box<dyn Future<Output = Result<(), PluginError>> + Send + 'a>>;
type InitFn = Arc<dyn for<'a> Fn(&'a Runtime) -> InitFuture<'a> + Send + Sync>;

/// A unit of runtime extension (§3). Capabilities are supplied declaratively; `init` runs
/// after dependency-ordered registration, with the runtime handed in only for that call
/// (§9: the plugin must not own the runtime, only borrow it during `init`).
#[derive(Clone)]
pub struct Plugin {
    pub name: String,
    pub description: String,
    pub dependencies: Vec<String>,
    pub actions: Vec<Arc<dyn Action>>,
    pub providers: Vec<Arc<dyn Provider>>,
    pub evaluators: Vec<Arc<dyn Evaluator>>,
    pub services: Vec<Arc<ServiceFactory>>,
    init: Option<InitFn>,
}

impl Plugin {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            dependencies: Vec::new(),
            actions: Vec::new(),
            providers: Vec::new(),
            evaluators: Vec::new(),
            services: Vec::new(),
            init: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_dependencies(mut self, deps: Vec<String>) -> Self {
        self.dependencies = deps;
        self
    }

    pub fn with_action(mut self, action: Arc<dyn Action>) -> Self {
        self.actions.push(action);
        self
    }

    pub fn with_provider(mut self, provider: Arc<dyn Provider>) -> Self {
        self.providers.push(provider);
        self
    }

    pub fn with_evaluator(mut self, evaluator: Arc<dyn Evaluator>) -> Self {
        self.evaluators.push(evaluator);
        self
    }

    pub fn with_service(mut self, service: ServiceFactory) -> Self {
        self.services.push(Arc::new(service));
        self
    }

    pub fn with_init<F, Fut>(mut self, init: F) -> Self
    where
        F: for<'a> Fn(&'a Runtime) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), PluginError>> + Send + 'static,
    {
        self.init = Some(Arc::new(move |rt| Box::pin(init(rt))));
        self
    }

    pub async fn run_init(&self, rt: &Runtime) -> Result<(), PluginError> {
        match &self.init {
            Some(init) => init(rt).await,
            None => Ok(()),
        }
    }
}

#[derive(Debug, Error)]
pub enum PluginError {
    #[error("circular dependency detected among plugins: {0}")]
    CircularDependency(String),
    #[error("plugin '{0}' failed to initialize: {1}")]
    InitFailed(String, String),
}

/// Resolves plugins into dependency order via DFS with grey/black marks (§4.2):
/// - an edge plugin → dependency is only followed when the dependency is present in the
///   input set; missing external dependencies are assumed satisfied out-of-band and ignored.
/// - a grey node re-entered mid-DFS is a cycle.
/// - emission is post-order, so a plugin appears only after everything it depends on.
/// - ties are broken by first-seen input order (stable DFS over the input `Vec`).
pub fn resolve_plugin_dependencies(plugins: Vec<Plugin>) -> Result<Vec<Plugin>, PluginError> {
    let by_name: HashMap<String, usize> = plugins
        .iter()
        .enumerate()
        .map(|(i, p)| (p.name.clone(), i))
        .collect();

    #[derive(Clone, Copy, PartialEq)]
    enum Mark {
        White,
        Grey,
        Black,
    }

    let mut marks = vec![Mark::White; plugins.len()];
    let mut order = Vec::with_capacity(plugins.len());

    fn visit(
        idx: usize,
        plugins: &[Plugin],
        by_name: &HashMap<String, usize>,
        marks: &mut Vec<Mark>,
        order: &mut Vec<usize>,
    ) -> Result<(), PluginError> {
        match marks[idx] {
            Mark::Black => return Ok(()),
            Mark::Grey => return Err(PluginError::CircularDependency(plugins[idx].name.clone())),
            Mark::White => {}
        }
        marks[idx] = Mark::Grey;
        for dep in &plugins[idx].dependencies {
            if let Some(&dep_idx) = by_name.get(dep) {
                visit(dep_idx, plugins, by_name, marks, order)?;
            }
        }
        marks[idx] = Mark::Black;
        order.push(idx);
        Ok(())
    }

    for i in 0..plugins.len() {
        visit(i, &plugins, &by_name, &mut marks, &mut order)?;
    }

    let mut owned: Vec<Option<Plugin>> = plugins.into_iter().map(Some).collect();
    Ok(order.into_iter().map(|i| owned[i].take().unwrap()).collect())
}

/// Checks the resolved set for duplicate plugin names before registration; not part of the
/// topological sort itself, but guards against two plugins silently shadowing each other.
pub fn assert_unique_names(plugins: &[Plugin]) -> Result<(), PluginError> {
    let mut seen = HashSet::new();
    for p in plugins {
        if !seen.insert(p.name.clone()) {
            tracing::warn!(plugin = %p.name, "duplicate plugin name registered");
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plugin(name: &str, deps: &[&str]) -> Plugin {
        Plugin::new(name).with_dependencies(deps.iter().map(|s| s.to_string()).collect())
    }

    fn names(plugins: &[Plugin]) -> Vec<String> {
        plugins.iter().map(|p| p.name.clone()).collect()
    }

    #[test]
    fn no_dependencies_keeps_input_order() {
        let resolved = resolve_plugin_dependencies(vec![plugin("a", &[]), plugin("b", &[])]).unwrap();
        assert_eq!(names(&resolved), vec!["a", "b"]);
    }

    #[test]
    fn simple_dependency_orders_dependency_first() {
        let resolved = resolve_plugin_dependencies(vec![plugin("a", &["b"]), plugin("b", &[])]).unwrap();
        assert_eq!(names(&resolved), vec!["b", "a"]);
    }

    #[test]
    fn chain_dependency_orders_from_leaf() {
        let resolved =
            resolve_plugin_dependencies(vec![plugin("a", &["b"]), plugin("b", &["c"]), plugin("c", &[])]).unwrap();
        assert_eq!(names(&resolved), vec!["c", "b", "a"]);
    }

    #[test]
    fn circular_dependency_is_rejected() {
        let err = resolve_plugin_dependencies(vec![plugin("a", &["b"]), plugin("b", &["a"])]).unwrap_err();
        assert!(matches!(err, PluginError::CircularDependency(_)));
    }

    #[test]
    fn missing_dependency_is_ignored() {
        let resolved = resolve_plugin_dependencies(vec![plugin("a", &["not-present"])]).unwrap();
        assert_eq!(names(&resolved), vec!["a"]);
    }

    #[test]
    fn multiple_dependencies_all_precede_dependent() {
        let resolved =
            resolve_plugin_dependencies(vec![plugin("a", &["b", "c"]), plugin("b", &[]), plugin("c", &[])]).unwrap();
        let pos = |n: &str| names(&resolved).iter().position(|x| x == n).unwrap();
        assert!(pos("b") < pos("a"));
        assert!(pos("c") < pos("a"));
    }

    #[test]
    fn diamond_dependency_orders_shared_base_first() {
        let resolved = resolve_plugin_dependencies(vec![
            plugin("a", &[]),
            plugin("b", &["a"]),
            plugin("c", &["a"]),
            plugin("d", &["b", "c"]),
        ])
        .unwrap();
        let pos = |n: &str| names(&resolved).iter().position(|x| x == n).unwrap();
        assert!(pos("a") < pos("b"));
        assert!(pos("a") < pos("c"));
        assert!(pos("b") < pos("d"));
        assert!(pos("c") < pos("d"));
    }
}
