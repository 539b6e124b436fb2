//! `Action` capability type (§3, §4.6).

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::runtime::Runtime;
use crate::state::State;

/// A JSON-Schema subset: `type, enum, default, minimum, maximum, minLength, maxLength,
/// pattern`, with `properties`/`items`/`required` for nested object/array shapes (§3).
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ParamSchema {
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub schema_type: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub r#enum: Vec<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minimum: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maximum: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_length: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_length: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub properties: HashMap<String, ParamSchema>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub items: Option<Box<ParamSchema>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub required: Vec<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ActionParameter {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub schema: ParamSchema,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ActionResult {
    pub success: bool,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub values: HashMap<String, Value>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub data: HashMap<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reward: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ActionResult {
    pub fn ok() -> Self {
        Self {
            success: true,
            ..Default::default()
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            ..Default::default()
        }
    }
}

/// Options threaded into an action handler: validated parameters and any parameter
/// errors collected during validation (§4.6; invariant 5 — the handler still runs when a
/// required parameter is missing, with `parameter_errors` populated, per
/// `test_action_parameters.py::test_process_actions_skips_action_when_required_param_missing`).
#[derive(Clone, Debug, Default)]
pub struct ActionOptions {
    pub parameters: HashMap<String, Value>,
    pub parameter_errors: Vec<String>,
}

/// A single emitted response `Content`, passed to an action handler as `responses` context
/// and produced by [`crate::executor`] as the callback payload.
pub type ResponseCallback = Arc<dyn Fn(crate::primitives::Content) + Send + Sync>;

#[async_trait]
pub trait Action: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str {
        ""
    }
    fn similes(&self) -> &[String] {
        &[]
    }
    fn parameters(&self) -> &[ActionParameter] {
        &[]
    }

    async fn validate(&self, _rt: &Runtime, _msg: &crate::memory::Memory, _state: &State) -> bool {
        true
    }

    async fn handle(
        &self,
        rt: &Runtime,
        msg: &crate::memory::Memory,
        state: &State,
        options: &ActionOptions,
        callback: Option<&ResponseCallback>,
    ) -> ActionResult;
}

/// A registered action together with the canonical-doc overrides merged in by C12. We keep
/// the user-authored action object separate from the doc-filled fields so merging never
/// clobbers author-supplied values (§4.10, §8 property 8).
pub struct RegisteredAction {
    pub action: Arc<dyn Action>,
    pub description: String,
    pub similes: Vec<String>,
    pub parameters: Vec<ActionParameter>,
}

impl RegisteredAction {
    pub fn new(action: Arc<dyn Action>) -> Self {
        let description = action.description().to_string();
        let similes = action.similes().to_vec();
        let parameters = action.parameters().to_vec();
        Self {
            action,
            description,
            similes,
            parameters,
        }
    }

    pub fn name(&self) -> &str {
        self.action.name()
    }
}
