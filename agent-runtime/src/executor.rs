//! Action planner & executor (C8, §4.6).
//!
//! Planning turns either an LLM's structured response or a bypassed one-step plan (when
//! `action_planning` is disabled) into an ordered [`Plan`]. Execution runs each step
//! strictly in plan order, honoring declared dependencies, validating parameters against
//! the action's schema, and threading accumulated `values`/`data` into the working [`State`]
//! seen by later steps.

use std::collections::HashMap;

use serde_json::Value;

use crate::memory::Memory;
use crate::primitives::Content;
use crate::registry::{ActionOptions, ActionParameter, ActionResult, ParamSchema};
use crate::runtime::Runtime;
use crate::state::State;

/// Per-step retry policy (§4.6). Defaults to `abort` on handler failure with no retries.
#[derive(Clone, Debug)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub backoff_ms: u64,
    pub backoff_multiplier: f64,
    pub on_error: OnError,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 0,
            backoff_ms: 0,
            backoff_multiplier: 1.0,
            on_error: OnError::Abort,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OnError {
    Abort,
    Continue,
    Skip,
}

/// One call in an action plan: the action name, its raw parameters, and the indices (into
/// the plan) of steps it depends on (§3 `Plan`).
#[derive(Clone, Debug, Default)]
pub struct PlanStep {
    pub action: String,
    pub params: HashMap<String, Value>,
    pub dependencies: Vec<usize>,
    pub retry: Option<RetryPolicy>,
}

#[derive(Clone, Debug, Default)]
pub struct Plan {
    pub steps: Vec<PlanStep>,
}

/// Why a step didn't run (or ran with a warning) (§4.6, §7).
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SkipReason {
    UnknownAction,
    NotValid,
    DependencySkipped,
}

#[derive(Clone, Debug)]
pub struct StepOutcome {
    pub action: String,
    pub step_index: usize,
    pub result: Option<ActionResult>,
    pub skipped: Option<SkipReason>,
    pub parameter_errors: Vec<String>,
}

impl StepOutcome {
    pub fn succeeded(&self) -> bool {
        self.skipped.is_none() && self.result.as_ref().is_some_and(|r| r.success)
    }
}

/// Parses the planner's structured response: `<actions>["A", "B"]</actions>` with an
/// optional `<params>{"A": {...}}</params>` block (§4.6). Actions not found as a JSON array
/// (malformed or absent) yield an empty plan rather than erroring — an empty plan simply
/// executes nothing, which is the conservative failure mode for a planning parse error.
pub fn parse_plan_response(response: &str) -> Plan {
    let actions = extract_tag(response, "actions")
        .and_then(|raw| serde_json::from_str::<Vec<String>>(&raw).ok())
        .unwrap_or_default();
    let params: HashMap<String, HashMap<String, Value>> = extract_tag(response, "params")
        .and_then(|raw| serde_json::from_str(&raw).ok())
        .unwrap_or_default();

    let steps = actions
        .into_iter()
        .map(|action| {
            let params = params.get(&action).cloned().unwrap_or_default();
            PlanStep {
                action,
                params,
                dependencies: Vec::new(),
                retry: None,
            }
        })
        .collect();
    Plan { steps }
}

fn extract_tag<'a>(response: &'a str, tag: &str) -> Option<String> {
    let open = format!("<{tag}>");
    let close = format!("</{tag}>");
    let start = response.find(&open)? + open.len();
    let end = response[start..].find(&close)? + start;
    Some(response[start..end].trim().to_string())
}

/// Builds a one-step-per-action plan directly from `Memory.content` when planning is
/// disabled (§4.6): one step per `content.actions` entry, params looked up by action name
/// from `content.params`.
pub fn bypass_plan(content: &Content) -> Plan {
    let steps = content
        .actions
        .iter()
        .map(|action| PlanStep {
            action: action.clone(),
            params: content.params_for(action).cloned().unwrap_or_default(),
            dependencies: Vec::new(),
            retry: None,
        })
        .collect();
    Plan { steps }
}

/// Validates `raw` against `schema`, returning `(coerced_value, errors)`. Defaults from the
/// schema are applied when `raw` is `None`. This is a JSON-Schema *subset* validator (§3):
/// `type`, `enum`, `minimum`/`maximum`, `minLength`/`maxLength`, `pattern` are checked;
/// nested `properties`/`items` are not recursively validated (the action's own handler is
/// expected to do deeper validation where it matters).
fn validate_value(raw: Option<&Value>, schema: &ParamSchema) -> (Option<Value>, Vec<String>) {
    let mut errors = Vec::new();
    let value = match raw {
        Some(v) => v.clone(),
        None => match &schema.default {
            Some(d) => d.clone(),
            None => return (None, errors),
        },
    };

    if !schema.r#enum.is_empty() && !schema.r#enum.contains(&value) {
        errors.push(format!("value {value} is not one of the allowed enum values"));
    }
    if let Some(ty) = &schema.schema_type {
        let matches = match ty.as_str() {
            "string" => value.is_string(),
            "number" => value.is_number(),
            "integer" => value.is_i64() || value.is_u64(),
            "boolean" => value.is_boolean(),
            "array" => value.is_array(),
            "object" => value.is_object(),
            _ => true,
        };
        if !matches {
            errors.push(format!("expected type {ty}, got {value}"));
        }
    }
    if let Some(s) = value.as_str() {
        if let Some(min) = schema.min_length {
            if s.len() < min {
                errors.push(format!("string shorter than minLength {min}"));
            }
        }
        if let Some(max) = schema.max_length {
            if s.len() > max {
                errors.push(format!("string longer than maxLength {max}"));
            }
        }
    }
    if let Some(n) = value.as_f64() {
        if let Some(min) = schema.minimum {
            if n < min {
                errors.push(format!("value {n} below minimum {min}"));
            }
        }
        if let Some(max) = schema.maximum {
            if n > max {
                errors.push(format!("value {n} above maximum {max}"));
            }
        }
    }
    (Some(value), errors)
}

/// Validates a step's raw params against the action's declared schema (§4.6 step 3).
///
/// Per the resolved Open Question (see `DESIGN.md`): a missing *required* parameter does
/// NOT skip the step outright. It is recorded in `parameter_errors` and the handler still
/// runs, receiving whatever params did validate — the handler may itself choose to
/// short-circuit on seeing the error. Optional missing params get their schema default.
fn validate_params(
    raw: &HashMap<String, Value>,
    declared: &[ActionParameter],
) -> (HashMap<String, Value>, Vec<String>) {
    let mut parameters = HashMap::new();
    let mut errors = Vec::new();
    for param in declared {
        let found = raw.get(&param.name);
        if found.is_none() && param.required {
            errors.push(format!("missing required parameter: {}", param.name));
        }
        let (value, val_errors) = validate_value(found, &param.schema);
        for e in val_errors {
            errors.push(format!("{}: {e}", param.name));
        }
        if let Some(v) = value {
            parameters.insert(param.name.clone(), v);
        }
    }
    // Pass through any params not declared on the action (forward-compatible handlers).
    for (k, v) in raw {
        parameters.entry(k.clone()).or_insert_with(|| v.clone());
    }
    (parameters, errors)
}

/// Runs `plan` to completion against `rt`, threading `state` forward across steps (§4.6).
///
/// - Unknown action name -> skipped (`UnknownAction`).
/// - `action.validate()` returning false -> skipped (`NotValid`).
/// - A step whose declared dependency index was itself skipped or failed -> skipped
///   (`DependencySkipped`), cascading to its own dependents.
/// - A handler error (or a declared [`RetryPolicy::on_error`] of `Abort`) stops the plan;
///   `Continue` proceeds to the next step; `Skip` only drops this step's own outcome.
pub async fn execute_plan(
    rt: &Runtime,
    msg: &Memory,
    mut state: State,
    plan: &Plan,
    callback: Option<&crate::registry::ResponseCallback>,
) -> (Vec<StepOutcome>, State) {
    let mut outcomes: Vec<StepOutcome> = Vec::with_capacity(plan.steps.len());
    let mut skipped_indices: std::collections::HashSet<usize> = std::collections::HashSet::new();

    for (index, step) in plan.steps.iter().enumerate() {
        if step.dependencies.iter().any(|d| skipped_indices.contains(d)) {
            skipped_indices.insert(index);
            outcomes.push(StepOutcome {
                action: step.action.clone(),
                step_index: index,
                result: None,
                skipped: Some(SkipReason::DependencySkipped),
                parameter_errors: Vec::new(),
            });
            continue;
        }

        let Some(action) = rt.registries.action(&step.action) else {
            tracing::warn!(action = %step.action, "unknown action in plan; skipping");
            skipped_indices.insert(index);
            outcomes.push(StepOutcome {
                action: step.action.clone(),
                step_index: index,
                result: None,
                skipped: Some(SkipReason::UnknownAction),
                parameter_errors: Vec::new(),
            });
            continue;
        };

        if !action.validate(rt, msg, &state).await {
            skipped_indices.insert(index);
            outcomes.push(StepOutcome {
                action: step.action.clone(),
                step_index: index,
                result: None,
                skipped: Some(SkipReason::NotValid),
                parameter_errors: Vec::new(),
            });
            continue;
        }

        let declared_parameters = rt.registries.action_parameters(&step.action);
        let (parameters, parameter_errors) = validate_params(&step.params, &declared_parameters);
        let options = ActionOptions {
            parameters,
            parameter_errors: parameter_errors.clone(),
        };

        tracing::debug!(action = %step.action, step_index = index, "executing action step");
        let result = action.handle(rt, msg, &state, &options, callback).await;
        if !result.values.is_empty() || !result.data.is_empty() {
            state.values.extend(result.values.clone());
            state.data.extend(result.data.clone());
        }
        let failed = !result.success;
        outcomes.push(StepOutcome {
            action: step.action.clone(),
            step_index: index,
            result: Some(result),
            skipped: None,
            parameter_errors,
        });

        if failed {
            let policy = step.retry.clone().unwrap_or_default();
            match policy.on_error {
                OnError::Abort => break,
                OnError::Continue => {}
                OnError::Skip => {
                    skipped_indices.insert(index);
                }
            }
        }
    }

    (outcomes, state)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_plan_response_reads_actions_and_params() {
        let resp = r#"reasoning...
<actions>["MOVE", "WAIT"]</actions>
<params>{"MOVE": {"direction": "south"}}</params>
"#;
        let plan = parse_plan_response(resp);
        assert_eq!(plan.steps.len(), 2);
        assert_eq!(plan.steps[0].action, "MOVE");
        assert_eq!(plan.steps[0].params["direction"], Value::String("south".into()));
        assert!(plan.steps[1].params.is_empty());
    }

    #[test]
    fn parse_plan_response_empty_on_malformed_input() {
        let plan = parse_plan_response("no tags here");
        assert!(plan.steps.is_empty());
    }

    #[test]
    fn bypass_plan_builds_one_step_per_content_action() {
        let mut content = Content::text("go");
        content.actions = vec!["MOVE".to_string()];
        content
            .params
            .insert("MOVE".to_string(), HashMap::from([("direction".to_string(), Value::String("south".into()))]));
        let plan = bypass_plan(&content);
        assert_eq!(plan.steps.len(), 1);
        assert_eq!(plan.steps[0].params["direction"], Value::String("south".into()));
    }

    #[test]
    fn validate_params_reports_missing_required_but_keeps_optional_defaults() {
        let declared = vec![
            ActionParameter {
                name: "direction".to_string(),
                description: String::new(),
                required: true,
                schema: ParamSchema {
                    schema_type: Some("string".to_string()),
                    r#enum: vec![Value::String("north".into()), Value::String("south".into())],
                    ..Default::default()
                },
            },
            ActionParameter {
                name: "speed".to_string(),
                description: String::new(),
                required: false,
                schema: ParamSchema {
                    default: Some(Value::from(1)),
                    ..Default::default()
                },
            },
        ];
        let (params, errors) = validate_params(&HashMap::new(), &declared);
        assert!(errors.iter().any(|e| e.contains("direction")));
        assert_eq!(params["speed"], Value::from(1));
    }

    #[test]
    fn validate_params_flags_enum_violation() {
        let declared = vec![ActionParameter {
            name: "direction".to_string(),
            description: String::new(),
            required: true,
            schema: ParamSchema {
                r#enum: vec![Value::String("north".into()), Value::String("south".into())],
                ..Default::default()
            },
        }];
        let mut raw = HashMap::new();
        raw.insert("direction".to_string(), Value::String("sideways".into()));
        let (_, errors) = validate_params(&raw, &declared);
        assert!(!errors.is_empty());
    }
}
