//! `Provider` capability type (§3, §4.5).

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::Value;

use crate::memory::Memory;
use crate::runtime::Runtime;
use crate::state::State;

#[derive(Clone, Debug, Default)]
pub struct ProviderResult {
    pub text: Option<String>,
    pub values: HashMap<String, Value>,
    pub data: HashMap<String, Value>,
}

#[async_trait]
pub trait Provider: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str {
        ""
    }
    /// Sort key for the composer's deterministic merge (§4.5 step 2); ties keep
    /// registration order.
    fn position(&self) -> i32 {
        0
    }
    /// Excluded from the default provider set; only included via explicit `include` (§4.5).
    fn private(&self) -> bool {
        false
    }
    /// Always recomputed, even when not explicitly included (§4.5).
    fn dynamic(&self) -> bool {
        false
    }

    async fn get(&self, rt: &Runtime, msg: &Memory, state: &State) -> Result<ProviderResult, String>;
}

pub struct RegisteredProvider {
    pub provider: std::sync::Arc<dyn Provider>,
    /// Registration order, used to break position ties (§4.5).
    pub seq: usize,
}
