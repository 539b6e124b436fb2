//! `State` composer (C7, §4.5): gathers selected providers concurrently for one turn and
//! merges their results deterministically.
//!
//! The merge order is always ascending `position` regardless of which provider's `get()`
//! future resolves first — providers are dispatched concurrently via `futures::join_all`
//! but folded back together in the sorted order (§5 "gathered concurrently, merged in
//! position-sorted order").

use std::collections::HashMap;

use serde_json::Value;

use crate::memory::Memory;
use crate::registry::{ProviderResult, Registries};
use crate::runtime::Runtime;

/// Read-mostly per-turn bundle produced by the composer (§3). Actions may append to a
/// working copy via their returned `values`/`data`; later providers in the same turn never
/// re-run, so `State` is effectively a snapshot once [`compose_state`] returns.
#[derive(Clone, Debug, Default)]
pub struct State {
    pub values: HashMap<String, Value>,
    pub data: HashMap<String, Value>,
    pub text: String,
}

impl State {
    pub fn new() -> Self {
        Self::default()
    }

    /// Shallow-merges `other` into `self`; `other`'s keys win on conflict, matching the
    /// composer's "later writer wins" rule (§4.5 step 4, §8 property 6's precedence note).
    pub fn merge_from(&mut self, other: &State) {
        for (k, v) in &other.values {
            self.values.insert(k.clone(), v.clone());
        }
        for (k, v) in &other.data {
            self.data.insert(k.clone(), v.clone());
        }
        if !other.text.is_empty() {
            if self.text.is_empty() {
                self.text = other.text.clone();
            } else {
                self.text = format!("{}\n\n{}", self.text, other.text);
            }
        }
    }
}

/// Selects which registered providers participate in this turn's composition (§4.5 step 1).
///
/// Defaults to every non-private provider. `include` adds providers by name (the only way
/// to pull in a `private` provider); `exclude` removes providers by name. A provider with
/// `dynamic = true` is always included unless explicitly excluded.
fn select_providers(
    registries: &Registries,
    include: Option<&[String]>,
    exclude: Option<&[String]>,
) -> Vec<(String, std::sync::Arc<dyn crate::registry::Provider>, usize)> {
    let excluded: std::collections::HashSet<&str> =
        exclude.map(|e| e.iter().map(String::as_str).collect()).unwrap_or_default();
    let included: std::collections::HashSet<&str> =
        include.map(|i| i.iter().map(String::as_str).collect()).unwrap_or_default();

    let mut selected = Vec::new();
    for entry in registries.providers.iter() {
        let name = entry.key().clone();
        let reg = entry.value();
        if excluded.contains(name.as_str()) {
            continue;
        }
        let wants = !reg.provider.private() || included.contains(name.as_str());
        let forced_dynamic = reg.provider.dynamic();
        if wants || forced_dynamic {
            selected.push((name, reg.provider.clone(), reg.seq));
        }
    }
    selected
}

/// Computes the context for one turn (C7, §4.5).
///
/// 1. Select providers (defaults + `include`/`exclude`).
/// 2. Sort ascending by `position`, ties broken by registration order.
/// 3. Dispatch every `get()` concurrently.
/// 4. Merge deterministically in the sorted order: `text` joined with `"\n\n"`, `values`/
///    `data` shallow-merged with later (higher-position) providers winning.
///
/// Providers that error are logged and elided from the composed state; the turn continues
/// (§7 `ProviderFailure`).
pub async fn compose_state(
    rt: &Runtime,
    msg: &Memory,
    include: Option<&[String]>,
    exclude: Option<&[String]>,
) -> State {
    let mut selected = select_providers(&rt.registries, include, exclude);
    selected.sort_by_key(|(_, p, seq)| (p.position(), *seq));

    let placeholder = State::new();
    let futures_iter = selected.iter().map(|(name, provider, _)| {
        let provider = provider.clone();
        let name = name.clone();
        async move {
            match provider.get(rt, msg, &placeholder).await {
                Ok(result) => Some((name, result)),
                Err(err) => {
                    tracing::warn!(provider = %name, error = %err, "provider failed; eliding from composed state");
                    None
                }
            }
        }
    });
    let results: Vec<Option<(String, ProviderResult)>> = futures::future::join_all(futures_iter).await;

    let mut state = State::new();
    for (name, provider, _) in &selected {
        let Some(result) = results.iter().find_map(|r| {
            r.as_ref().and_then(|(n, res)| if n == name { Some(res) } else { None })
        }) else {
            continue;
        };
        let _ = provider;
        for (k, v) in &result.values {
            state.values.insert(k.clone(), v.clone());
        }
        for (k, v) in &result.data {
            state.data.insert(k.clone(), v.clone());
        }
        if let Some(text) = &result.text {
            if !text.is_empty() {
                if state.text.is_empty() {
                    state.text = text.clone();
                } else {
                    state.text = format!("{}\n\n{}", state.text, text);
                }
            }
        }
    }
    state
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use super::*;
    use crate::registry::Provider;
    use crate::runtime::Runtime;

    struct FixedProvider {
        name: &'static str,
        position: i32,
        private: bool,
        text: &'static str,
        key: &'static str,
        value: Value,
    }

    #[async_trait]
    impl Provider for FixedProvider {
        fn name(&self) -> &str {
            self.name
        }
        fn position(&self) -> i32 {
            self.position
        }
        fn private(&self) -> bool {
            self.private
        }
        async fn get(&self, _rt: &Runtime, _msg: &Memory, _state: &State) -> Result<ProviderResult, String> {
            let mut values = HashMap::new();
            values.insert(self.key.to_string(), self.value.clone());
            Ok(ProviderResult {
                text: Some(self.text.to_string()),
                values,
                data: HashMap::new(),
            })
        }
    }

    fn msg() -> Memory {
        Memory::new(uuid::Uuid::new_v4(), uuid::Uuid::new_v4(), crate::primitives::Content::text("hi"))
    }

    #[tokio::test]
    async fn merges_text_in_position_order_regardless_of_completion_order() {
        let rt = Runtime::new_for_test();
        rt.registries.register_provider(std::sync::Arc::new(FixedProvider {
            name: "late",
            position: 10,
            private: false,
            text: "LATE",
            key: "k",
            value: Value::from(1),
        }));
        rt.registries.register_provider(std::sync::Arc::new(FixedProvider {
            name: "early",
            position: 0,
            private: false,
            text: "EARLY",
            key: "k",
            value: Value::from(2),
        }));
        let state = compose_state(&rt, &msg(), None, None).await;
        assert_eq!(state.text, "EARLY\n\nLATE");
        // later (higher-position) provider wins on shared key
        assert_eq!(state.values["k"], Value::from(1));
    }

    #[tokio::test]
    async fn private_provider_excluded_by_default_included_explicitly() {
        let rt = Runtime::new_for_test();
        rt.registries.register_provider(std::sync::Arc::new(FixedProvider {
            name: "secret",
            position: 0,
            private: true,
            text: "SECRET",
            key: "s",
            value: Value::from(true),
        }));
        let state = compose_state(&rt, &msg(), None, None).await;
        assert!(state.text.is_empty());
        let include = vec!["secret".to_string()];
        let state = compose_state(&rt, &msg(), Some(&include), None).await;
        assert_eq!(state.text, "SECRET");
    }

    #[tokio::test]
    async fn exclude_removes_a_default_provider() {
        let rt = Runtime::new_for_test();
        rt.registries.register_provider(std::sync::Arc::new(FixedProvider {
            name: "p",
            position: 0,
            private: false,
            text: "P",
            key: "k",
            value: Value::from(1),
        }));
        let exclude = vec!["p".to_string()];
        let state = compose_state(&rt, &msg(), None, Some(&exclude)).await;
        assert!(state.text.is_empty());
    }
}
