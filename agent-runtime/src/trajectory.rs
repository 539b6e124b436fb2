//! Trajectory logger (C11, §4.9): captures step-by-step traces for off-process training
//! and evaluation. One trajectory per logical episode; trajectories contain ordered steps.
//!
//! `start_trajectory`/`start_step`/`complete_step` are synchronous bookkeeping against an
//! in-process table; `end_trajectory` is `async` to leave room for a persistence flush
//! (§4.9), even though this core ships no concrete sink (§1 storage backends are
//! out of scope).

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::primitives::Uuid;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallPurpose {
    Action,
    Reasoning,
    Evaluation,
    Response,
    Other,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LlmCall {
    pub call_id: String,
    pub timestamp: DateTime<Utc>,
    pub model: String,
    pub system_prompt: Option<String>,
    pub user_prompt: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub messages: Vec<ChatMessage>,
    pub response: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt_tokens: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completion_tokens: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
    pub purpose: CallPurpose,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action_type: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProviderAccess {
    pub provider_id: String,
    pub provider_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
    pub data: Value,
    pub purpose: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ActionAttempt {
    pub action_type: String,
    pub action_name: String,
    pub parameters: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub llm_call_id: Option<String>,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub immediate_reward: Option<f64>,
}

/// Free-form environment snapshot (§4.9): the named fields the source system tracks for
/// trading-style episodes, plus an open `custom` bag for domain-specific KV.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct EnvironmentState {
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub balances: HashMap<String, f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub points: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pnl: Option<f64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub open_positions: Vec<Value>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub custom: HashMap<String, Value>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TrajectoryStep {
    pub step_id: String,
    pub step_number: u32,
    pub timestamp: DateTime<Utc>,
    pub environment_state: EnvironmentState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observation: Option<Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub llm_calls: Vec<LlmCall>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub provider_accesses: Vec<ProviderAccess>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<ActionAttempt>,
    pub reward: f64,
    pub done: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct RewardComponents {
    pub environment_reward: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ai_judge_reward: Option<f64>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub components: HashMap<String, f64>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub judge_extras: HashMap<String, Value>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct TrajectoryMetrics {
    pub episode_length: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_status: Option<String>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub extras: HashMap<String, Value>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Trajectory {
    pub trajectory_id: String,
    pub agent_id: Uuid,
    pub start_time: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub episode_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scenario_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batch_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_index: Option<u32>,
    pub steps: Vec<TrajectoryStep>,
    pub total_reward: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reward_components: Option<RewardComponents>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metrics: Option<TrajectoryMetrics>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

/// Status passed to `end_trajectory` (§4.9).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrajectoryStatus {
    Completed,
    Failed,
    Truncated,
}

struct InProgress {
    trajectory: Trajectory,
    next_step_number: u32,
}

/// Per-runtime trajectory table (§4.9). `start_trajectory`/`start_step`/`complete_step`
/// mutate in place synchronously; `end_trajectory` finalizes and returns the closed record
/// (the async boundary exists so a real sink could flush before returning).
#[derive(Default)]
pub struct TrajectoryLogger {
    in_progress: DashMap<String, Mutex<InProgress>>,
    closed: DashMap<String, Trajectory>,
}

impl TrajectoryLogger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start_trajectory(
        &self,
        agent_id: Uuid,
        episode_id: Option<String>,
        scenario_id: Option<String>,
        batch_id: Option<String>,
    ) -> String {
        let trajectory_id = Uuid::new_v4().to_string();
        let trajectory = Trajectory {
            trajectory_id: trajectory_id.clone(),
            agent_id,
            start_time: Utc::now(),
            end_time: None,
            duration_ms: None,
            episode_id,
            scenario_id,
            batch_id,
            group_index: None,
            steps: Vec::new(),
            total_reward: 0.0,
            reward_components: None,
            metrics: None,
            metadata: None,
        };
        self.in_progress.insert(
            trajectory_id.clone(),
            Mutex::new(InProgress {
                trajectory,
                next_step_number: 0,
            }),
        );
        trajectory_id
    }

    /// Opens a new step in `trajectory_id`, returning its `step_id`. Returns `None` if the
    /// trajectory is unknown or already closed.
    pub fn start_step(&self, trajectory_id: &str, environment_state: EnvironmentState) -> Option<String> {
        let entry = self.in_progress.get(trajectory_id)?;
        let mut guard = entry.lock().expect("trajectory lock poisoned");
        let step_id = format!("{trajectory_id}-step-{}", guard.next_step_number);
        let step_number = guard.next_step_number;
        guard.next_step_number += 1;
        guard.trajectory.steps.push(TrajectoryStep {
            step_id: step_id.clone(),
            step_number,
            timestamp: Utc::now(),
            environment_state,
            observation: None,
            llm_calls: Vec::new(),
            provider_accesses: Vec::new(),
            reasoning: None,
            action: None,
            reward: 0.0,
            done: false,
            metadata: None,
        });
        Some(step_id)
    }

    /// Fills in the remaining fields of a started step and accumulates its reward into the
    /// trajectory total.
    pub fn complete_step(
        &self,
        trajectory_id: &str,
        step_id: &str,
        llm_calls: Vec<LlmCall>,
        provider_accesses: Vec<ProviderAccess>,
        action: Option<ActionAttempt>,
        reward: f64,
        done: bool,
    ) -> bool {
        let Some(entry) = self.in_progress.get(trajectory_id) else {
            return false;
        };
        let mut guard = entry.lock().expect("trajectory lock poisoned");
        let Some(step) = guard.trajectory.steps.iter_mut().find(|s| s.step_id == step_id) else {
            return false;
        };
        step.llm_calls = llm_calls;
        step.provider_accesses = provider_accesses;
        step.action = action;
        step.reward = reward;
        step.done = done;
        guard.trajectory.total_reward += reward;
        true
    }

    /// Closes the trajectory, stamping `end_time`/`duration_ms` and the given status and
    /// metrics, and moves it into the closed table (§4.9). `async` to leave room for a
    /// persistence flush in a concrete deployment.
    pub async fn end_trajectory(
        &self,
        trajectory_id: &str,
        status: TrajectoryStatus,
        final_metrics: Option<TrajectoryMetrics>,
    ) -> Option<Trajectory> {
        let (_, entry) = self.in_progress.remove(trajectory_id)?;
        let mut trajectory = entry.into_inner().expect("trajectory lock poisoned").trajectory;
        let end_time = Utc::now();
        trajectory.end_time = Some(end_time);
        trajectory.duration_ms = Some((end_time - trajectory.start_time).num_milliseconds());
        let mut metrics = final_metrics.unwrap_or_default();
        metrics.episode_length = trajectory.steps.len() as u32;
        if metrics.final_status.is_none() {
            metrics.final_status = Some(format!("{status:?}").to_lowercase());
        }
        trajectory.metrics = Some(metrics);
        self.closed.insert(trajectory_id.to_string(), trajectory.clone());
        Some(trajectory)
    }

    pub fn get_closed(&self, trajectory_id: &str) -> Option<Trajectory> {
        self.closed.get(trajectory_id).map(|e| e.clone())
    }
}

/// One message-list + reward shape for downstream trainers (§4.9 ART record).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ArtRecord {
    pub messages: Vec<ChatMessage>,
    pub reward: f64,
    pub metadata: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metrics: Option<Value>,
}

/// Derives the system/user/assistant message sequence for one trajectory: each step's
/// `llm_calls` contribute their system/user prompt and response, and the step's action (if
/// any) contributes a trailing assistant message describing what was taken.
pub fn to_art_messages(trajectory: &Trajectory) -> Vec<ChatMessage> {
    let mut messages = Vec::new();
    for step in &trajectory.steps {
        for call in &step.llm_calls {
            if !call.messages.is_empty() {
                messages.extend(call.messages.iter().cloned());
                continue;
            }
            if let Some(system) = &call.system_prompt {
                messages.push(ChatMessage {
                    role: "system".to_string(),
                    content: system.clone(),
                });
            }
            if let Some(user) = &call.user_prompt {
                messages.push(ChatMessage {
                    role: "user".to_string(),
                    content: user.clone(),
                });
            }
            messages.push(ChatMessage {
                role: "assistant".to_string(),
                content: call.response.clone(),
            });
        }
        if let Some(action) = &step.action {
            messages.push(ChatMessage {
                role: "assistant".to_string(),
                content: format!("action: {}({})", action.action_name, action.parameters),
            });
        }
    }
    messages
}

pub fn to_art_record(trajectory: &Trajectory) -> ArtRecord {
    ArtRecord {
        messages: to_art_messages(trajectory),
        reward: trajectory.total_reward,
        metadata: trajectory.metadata.clone().unwrap_or(Value::Object(Default::default())),
        metrics: trajectory.metrics.as_ref().map(|m| serde_json::to_value(m).unwrap_or(Value::Null)),
    }
}

/// Longest common prefix of the messages lists, compared message-by-message (role + content
/// must match) (§4.9, §8 round-trip property).
pub fn extract_shared_prefix(lists: &[Vec<ChatMessage>]) -> Vec<ChatMessage> {
    let Some(first) = lists.first() else {
        return Vec::new();
    };
    let mut prefix_len = first.len();
    for list in &lists[1..] {
        let mut i = 0;
        while i < prefix_len && i < list.len() && list[i].role == first[i].role && list[i].content == first[i].content
        {
            i += 1;
        }
        prefix_len = i;
    }
    first[..prefix_len].to_vec()
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TrajectoryGroup {
    pub scenario_id: String,
    pub shared_prefix: Vec<ChatMessage>,
    pub trajectories: Vec<ArtRecord>,
}

/// Groups trajectories sharing a `scenario_id` and computes each group's `shared_prefix`
/// (§4.9). Trajectories with no `scenario_id` form their own singleton group keyed by
/// `trajectory_id`.
pub fn group_trajectories(trajectories: &[Trajectory]) -> Vec<TrajectoryGroup> {
    let mut by_scenario: HashMap<String, Vec<&Trajectory>> = HashMap::new();
    for t in trajectories {
        let key = t.scenario_id.clone().unwrap_or_else(|| t.trajectory_id.clone());
        by_scenario.entry(key).or_default().push(t);
    }
    by_scenario
        .into_iter()
        .map(|(scenario_id, group)| {
            let message_lists: Vec<Vec<ChatMessage>> = group.iter().map(|t| to_art_messages(t)).collect();
            let shared_prefix = extract_shared_prefix(&message_lists);
            let trajectories = group.iter().map(|t| to_art_record(t)).collect();
            TrajectoryGroup {
                scenario_id,
                shared_prefix,
                trajectories,
            }
        })
        .collect()
}

/// `shared_prefix` plus per-trajectory suffixes, ready to hand to a RULER-style relative
/// ranker (§4.9): each suffix is one trajectory's messages with the group's `shared_prefix`
/// stripped off the front, so the ranker only sees where trajectories actually diverge.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RulerPreparation {
    pub scenario_id: String,
    pub shared_prefix: Vec<ChatMessage>,
    pub suffixes: Vec<Vec<ChatMessage>>,
}

/// Strips `group.shared_prefix` from each trajectory's messages (§4.9).
pub fn prepare_for_ruler(group: &TrajectoryGroup) -> RulerPreparation {
    let prefix_len = group.shared_prefix.len();
    let suffixes = group
        .trajectories
        .iter()
        .map(|record| record.messages.iter().skip(prefix_len).cloned().collect())
        .collect();
    RulerPreparation {
        scenario_id: group.scenario_id.clone(),
        shared_prefix: group.shared_prefix.clone(),
        suffixes,
    }
}

/// Checks whether a trajectory can be turned into a usable ART record (§4.9): errors are
/// hard failures (the trajectory cannot be exported), warnings flag a record that will
/// export but may train poorly.
pub fn validate_art_compatibility(trajectory: &Trajectory) -> (bool, Vec<String>, Vec<String>) {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    if trajectory.steps.is_empty() {
        errors.push("trajectory has no steps".to_string());
    }
    if to_art_messages(trajectory).is_empty() {
        errors.push("trajectory produces no ART messages".to_string());
    }

    if trajectory.total_reward == 0.0 {
        warnings.push("trajectory has zero total reward".to_string());
    }
    if trajectory.steps.iter().any(|s| s.llm_calls.is_empty() && s.action.is_none()) {
        warnings.push("trajectory has a step with no llm calls and no action".to_string());
    }
    if trajectory.end_time.is_none() {
        warnings.push("trajectory was never closed with end_trajectory".to_string());
    }

    (errors.is_empty(), errors, warnings)
}
