//! The `Runtime`: the crate's equivalent of `AgentRuntime` (§6) — the object every other
//! component is reached through. Owns the capability registries, settings store, memory
//! store, trajectory logger, and the per-room serialization queue, and exposes the public
//! surface listed in §6.

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};

use serde_json::Value;
use tokio::sync::{Mutex as AsyncMutex, RwLock};

use crate::action_docs::merge_canonical_docs;
use crate::error::RuntimeError;
use crate::executor::{self, Plan};
use crate::memory::Memory;
use crate::plugin::{resolve_plugin_dependencies, Plugin};
use crate::primitives::{Content, Media, Uuid};
use crate::registry::{ModelError, ModelType, Registries, ResponseCallback};
use crate::settings::SettingsStore;
use crate::state::{compose_state, State};
use crate::store::MemoryStore;
use crate::trajectory::TrajectoryLogger;
use runtime_events::{EnvelopeState, RuntimeEvent};

pub const MESSAGES_TABLE: &str = "messages";

/// The payload handed to the caller's callback / returned by `handle_message` (§6).
#[derive(Clone, Debug, Default)]
pub struct MessageResult {
    pub text: Option<String>,
    pub thought: Option<String>,
    pub actions: Vec<String>,
    pub attachments: Vec<Media>,
    pub error: Option<String>,
}

/// Receives the enveloped wire JSON for each lifecycle event (type + payload + session_id/
/// node_id/event_id, §4.8/§4.9) — see [`runtime_events::to_json`].
type EventSink = Arc<dyn Fn(Value) + Send + Sync>;

pub struct Runtime {
    pub registries: Registries,
    pub agent_id: Uuid,
    settings: RwLock<SettingsStore>,
    store: MemoryStore,
    pub trajectory: TrajectoryLogger,
    room_locks: dashmap::DashMap<Uuid, Arc<AsyncMutex<()>>>,
    pending_plugins: StdMutex<Vec<Plugin>>,
    started_service_types: StdMutex<Vec<String>>,
    event_sink: StdMutex<Option<EventSink>>,
    env: HashMap<String, String>,
    envelope: StdMutex<EnvelopeState>,
}

impl Runtime {
    pub fn new(env: HashMap<String, String>) -> Result<Self, RuntimeError> {
        let settings = SettingsStore::from_env(&env)?;
        let agent_id = Uuid::new_v4();
        Ok(Self {
            registries: Registries::new(),
            agent_id,
            settings: RwLock::new(settings),
            store: MemoryStore::new(),
            trajectory: TrajectoryLogger::new(),
            room_locks: dashmap::DashMap::new(),
            pending_plugins: StdMutex::new(Vec::new()),
            started_service_types: StdMutex::new(Vec::new()),
            event_sink: StdMutex::new(None),
            env,
            envelope: StdMutex::new(EnvelopeState::new(agent_id.to_string())),
        })
    }

    /// Convenience constructor for tests and simple embeddings: no environment, random
    /// agent id, no event sink. Infallible because an empty environment never trips the
    /// production-sentinel-salt check in [`crate::settings::get_salt`].
    pub fn new_for_test() -> Self {
        Self::new(HashMap::new()).expect("empty environment never fails settings init")
    }

    pub fn with_event_sink(mut self, sink: EventSink) -> Self {
        self.event_sink = StdMutex::new(Some(sink));
        self
    }

    /// Serializes `event`, stamps the session/node/event-id envelope (§4.8, §4.9), and hands
    /// the resulting wire JSON to the event sink, if one is registered.
    fn emit(&self, event: RuntimeEvent) {
        let mut envelope = self.envelope.lock().expect("envelope lock poisoned");
        let value = match runtime_events::to_json(&event, &mut envelope) {
            Ok(value) => value,
            Err(e) => {
                tracing::error!(error = %e, "failed to serialize runtime event");
                return;
            }
        };
        drop(envelope);
        if let Some(sink) = self.event_sink.lock().expect("event sink lock poisoned").as_ref() {
            sink(value);
        }
    }

    /// Marks the start of a new turn (one `handle_message` call) so its events share one
    /// `node_id` (§4.8).
    fn begin_turn(&self, room_id: &str) {
        self.envelope.lock().expect("envelope lock poisoned").begin_turn(room_id);
    }

    /// Queues a plugin for registration; capabilities take effect once `initialize()` runs
    /// dependency resolution over every queued plugin (§4.2, §6 `register_plugin`).
    pub fn register_plugin(&self, plugin: Plugin) {
        self.pending_plugins
            .lock()
            .expect("pending plugin queue lock poisoned")
            .push(plugin);
    }

    pub fn register_model<F, Fut>(&self, model_type: ModelType, provider: impl Into<String>, priority: i32, handler: F)
    where
        F: for<'a> Fn(&'a Runtime, Value) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<Value, String>> + Send + 'static,
    {
        self.registries.models.register(model_type, provider, priority, handler);
    }

    /// Resolves queued plugins into dependency order, registers their capabilities, runs
    /// each plugin's `init(rt)`, starts every registered service, and merges canonical docs
    /// (§4.2, §4.3, §4.10). Idempotent re-calls only act on plugins queued since the last
    /// call (the queue is drained each time).
    pub async fn initialize(&self) -> Result<(), RuntimeError> {
        let plugins = std::mem::take(&mut *self.pending_plugins.lock().expect("pending plugin queue lock poisoned"));
        let resolved = resolve_plugin_dependencies(plugins)?;

        for plugin in &resolved {
            for action in &plugin.actions {
                self.registries.register_action(action.clone());
            }
            for provider in &plugin.providers {
                self.registries.register_provider(provider.clone());
            }
            for evaluator in &plugin.evaluators {
                self.registries.register_evaluator(evaluator.clone());
            }
            for factory in &plugin.services {
                self.registries.register_service_factory((**factory).clone());
            }
        }

        for plugin in &resolved {
            plugin.run_init(self).await?;
        }

        let factories: Vec<_> = self
            .registries
            .service_factories
            .iter()
            .map(|e| e.value().clone())
            .collect();
        for factory in factories {
            match (factory.start)(self).await {
                Ok(instance) => {
                    self.registries.service_instances.insert(factory.service_type.clone(), instance);
                    self.started_service_types
                        .lock()
                        .expect("started service list lock poisoned")
                        .push(factory.service_type.clone());
                }
                Err(e) => {
                    tracing::error!(service_type = %factory.service_type, error = %e, "service failed to start");
                }
            }
        }

        merge_canonical_docs(&self.registries);
        Ok(())
    }

    /// Stops every started service in reverse start order, best-effort (§4.3): a failing
    /// `stop()` is logged and does not block the rest of teardown.
    pub async fn shutdown(&self) {
        let order: Vec<String> = self
            .started_service_types
            .lock()
            .expect("started service list lock poisoned")
            .drain(..)
            .collect();
        for service_type in order.into_iter().rev() {
            if let Some(service) = self.registries.get_service(&service_type) {
                if let Err(e) = service.stop().await {
                    tracing::error!(service_type = %service_type, error = %e, "service failed to stop cleanly");
                }
            }
        }
    }

    pub async fn use_model(&self, model_type: ModelType, params: Value) -> Result<Value, ModelError> {
        self.registries.models.use_model(self, model_type, params).await
    }

    pub fn get_service(&self, service_type: &str) -> Option<Arc<dyn crate::registry::Service>> {
        self.registries.get_service(service_type)
    }

    pub async fn get_setting(&self, key: &str) -> Option<Value> {
        self.settings.read().await.get(key)
    }

    pub async fn set_setting(&self, key: impl Into<String>, value: Value) {
        self.settings.write().await.set(key, value);
    }

    pub async fn set_secret(&self, key: impl Into<String>, plaintext: &str) {
        self.settings.write().await.set_secret(key, plaintext);
    }

    pub async fn load_character_secrets(&self, secrets: &HashMap<String, Value>) {
        self.settings.write().await.load_secrets(secrets);
    }

    pub fn env(&self) -> &HashMap<String, String> {
        &self.env
    }

    pub async fn compose_state(&self, msg: &Memory, include: Option<&[String]>, exclude: Option<&[String]>) -> State {
        compose_state(self, msg, include, exclude).await
    }

    /// Runs `plan` against `msg`/`state` (§4.6, §6 `process_actions`); does not itself write
    /// any memory — callers (typically [`Runtime::handle_message`]) decide what to persist.
    pub async fn process_actions(
        &self,
        msg: &Memory,
        state: State,
        plan: &Plan,
        callback: Option<&ResponseCallback>,
    ) -> (Vec<executor::StepOutcome>, State) {
        executor::execute_plan(self, msg, state, plan, callback).await
    }

    /// Appends `memory` to `table` (§6 `create_memory`). The in-process reference store is
    /// the only backend this core ships; concrete storage backends are out of scope (§1).
    pub fn create_memory(&self, memory: Memory, table: &str) -> Uuid {
        self.store.create(memory, table)
    }

    pub fn memories_by_room(&self, table: &str, room_id: Uuid) -> Vec<Memory> {
        self.store.by_room(table, room_id)
    }

    async fn room_lock(&self, room_id: Uuid) -> Arc<AsyncMutex<()>> {
        self.room_locks.entry(room_id).or_insert_with(|| Arc::new(AsyncMutex::new(()))).clone()
    }

    /// Orchestrates one inbound message end to end (C10, §4.8):
    ///
    /// 1. Persist the inbound memory (serialized per `room_id`, §5).
    /// 2. `compose_state`.
    /// 3. Plan actions — a bypass one-step plan from `content.actions`/`params` when
    ///    `action_planning` is set to `false`, otherwise `TEXT_LARGE` via `use_model` (with
    ///    a bypass fallback when no model handler is registered — see `DESIGN.md`).
    /// 4. Execute the plan.
    /// 5. Write the response memory and invoke `callback`.
    /// 6. Fire evaluators in the background (does not block the return).
    ///
    /// Trajectory logging (C11) is deliberately not auto-wired here: the core `Memory` type
    /// carries no trajectory/step identifiers (§3), so association is left to callers that
    /// run training/eval harnesses — they call `rt.trajectory.start_step`/`complete_step`
    /// around their own `handle_message` invocation (see `DESIGN.md`).
    ///
    /// Requires `self: &Arc<Self>` because step 6 spawns a background task holding a
    /// cloned runtime handle.
    pub async fn handle_message(self: &Arc<Self>, msg: Memory, callback: Option<ResponseCallback>) -> MessageResult {
        let room_id = msg.room_id;
        let lock = self.room_lock(room_id).await;
        let _room_guard = lock.lock().await;

        self.begin_turn(&room_id.to_string());

        let inbound_id = self.create_memory(msg.clone(), MESSAGES_TABLE);
        self.emit(RuntimeEvent::MessageReceived {
            memory_id: inbound_id.to_string(),
            room_id: room_id.to_string(),
        });

        let state = self.compose_state(&msg, None, None).await;

        let planning_enabled = !matches!(
            self.get_setting("action_planning").await,
            Some(Value::Bool(false))
        );
        let plan = if planning_enabled {
            match self.plan_with_model(&msg, &state).await {
                Some(plan) => plan,
                None => executor::bypass_plan(&msg.content),
            }
        } else {
            executor::bypass_plan(&msg.content)
        };

        for (index, step) in plan.steps.iter().enumerate() {
            self.emit(RuntimeEvent::ActionStarted {
                action: step.action.clone(),
                step_index: index,
            });
        }
        let (outcomes, _final_state) = self.process_actions(&msg, state, &plan, callback.as_ref()).await;
        for outcome in &outcomes {
            self.emit(RuntimeEvent::ActionCompleted {
                action: outcome.action.clone(),
                step_index: outcome.step_index,
                success: outcome.succeeded(),
                error: outcome
                    .result
                    .as_ref()
                    .and_then(|r| r.error.clone())
                    .or_else(|| outcome.skipped.as_ref().map(|s| format!("{s:?}"))),
            });
        }

        let executed: Vec<String> = outcomes.iter().filter(|o| o.succeeded()).map(|o| o.action.clone()).collect();
        let text = outcomes
            .iter()
            .rev()
            .find_map(|o| o.result.as_ref().and_then(|r| r.values.get("text")))
            .and_then(|v| v.as_str())
            .map(str::to_string);
        let error = outcomes.iter().find_map(|o| o.result.as_ref().and_then(|r| r.error.clone()));

        let mut response_content = Content::default();
        response_content.actions = executed.clone();
        response_content.text = text.clone();
        response_content.in_reply_to = msg.id;

        let response_memory = Memory::new(self.agent_id, room_id, response_content);
        let response_id = self.create_memory(response_memory, MESSAGES_TABLE);
        self.emit(RuntimeEvent::ResponseEmitted {
            memory_id: response_id.to_string(),
            text: text.clone(),
        });

        drop(_room_guard);

        let evaluator_rt = self.clone();
        let evaluator_msg = msg.clone();
        let evaluator_state = self.compose_state(&msg, None, None).await;
        tokio::spawn(async move {
            let ran = crate::evaluator_runner::run_evaluators(&evaluator_rt, &evaluator_msg, &evaluator_state).await;
            evaluator_rt.emit(RuntimeEvent::EvaluatorsCompleted {
                room_id: room_id.to_string(),
                ran,
            });
        });

        MessageResult {
            text,
            thought: msg.content.thought.clone(),
            actions: executed,
            attachments: Vec::new(),
            error,
        }
    }

    /// Asks `TEXT_LARGE` for a plan; returns `None` on any dispatcher error (no handler
    /// registered, or every handler failed) so the caller can fall back to a bypass plan.
    async fn plan_with_model(&self, msg: &Memory, state: &State) -> Option<Plan> {
        let params = serde_json::json!({
            "prompt": build_planning_prompt(&self.registries, msg, state),
        });
        match self.use_model(ModelType::TextLarge, params).await {
            Ok(Value::String(response)) => Some(executor::parse_plan_response(&response)),
            Ok(other) => Some(executor::parse_plan_response(&other.to_string())),
            Err(e) => {
                tracing::debug!(error = %e, "planning model unavailable; falling back to bypass plan");
                None
            }
        }
    }
}

/// Builds the planning prompt body (§4.6): registered action names, descriptions, and
/// parameter schemas, plus the inbound message text.
fn build_planning_prompt(registries: &Registries, msg: &Memory, state: &State) -> String {
    let mut actions_desc = String::new();
    for entry in registries.actions.iter() {
        let reg = entry.value();
        actions_desc.push_str(&format!("- {}: {}\n", reg.name(), reg.description));
    }
    format!(
        "Available actions:\n{actions_desc}\nContext:\n{}\n\nMessage: {}\n",
        state.text,
        msg.content.text.as_deref().unwrap_or("")
    )
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::primitives::Content;
    use crate::registry::{Action, ActionOptions, ActionResult};

    struct Move {
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Action for Move {
        fn name(&self) -> &str {
            "MOVE"
        }
        async fn handle(
            &self,
            _rt: &Runtime,
            _msg: &Memory,
            _state: &State,
            options: &ActionOptions,
            _callback: Option<&ResponseCallback>,
        ) -> ActionResult {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let direction = options.parameters.get("direction").and_then(|v| v.as_str()).unwrap_or("unknown");
            let mut result = ActionResult::ok();
            result.values.insert("text".to_string(), Value::String(format!("moved {direction}")));
            result
        }
    }

    #[tokio::test]
    async fn single_action_plan_bypasses_planner_and_threads_params() {
        let rt = Arc::new(Runtime::new_for_test());
        let calls = Arc::new(AtomicUsize::new(0));
        rt.registries.register_action(Arc::new(Move { calls: calls.clone() }));
        rt.set_setting("action_planning", Value::Bool(false)).await;

        let mut content = Content::text("go south");
        content.actions = vec!["MOVE".to_string()];
        content.params.insert(
            "MOVE".to_string(),
            HashMap::from([("direction".to_string(), Value::String("south".into()))]),
        );
        let msg = Memory::new(Uuid::new_v4(), Uuid::new_v4(), content);

        let result = rt.handle_message(msg, None).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(result.actions, vec!["MOVE".to_string()]);
        assert_eq!(result.text.as_deref(), Some("moved south"));
    }

    #[tokio::test]
    async fn missing_required_param_still_invokes_handler_with_parameter_errors() {
        use crate::registry::{ActionParameter, ParamSchema};

        struct RequiresDirection {
            seen_errors: Arc<StdMutex<Vec<String>>>,
            parameters: Vec<ActionParameter>,
        }

        #[async_trait]
        impl Action for RequiresDirection {
            fn name(&self) -> &str {
                "MOVE"
            }
            fn parameters(&self) -> &[ActionParameter] {
                &self.parameters
            }
            async fn handle(
                &self,
                _rt: &Runtime,
                _msg: &Memory,
                _state: &State,
                options: &ActionOptions,
                _callback: Option<&ResponseCallback>,
            ) -> ActionResult {
                *self.seen_errors.lock().unwrap() = options.parameter_errors.clone();
                ActionResult::ok()
            }
        }

        let rt = Arc::new(Runtime::new_for_test());
        let seen_errors = Arc::new(StdMutex::new(Vec::new()));
        rt.registries.register_action(Arc::new(RequiresDirection {
            seen_errors: seen_errors.clone(),
            parameters: vec![ActionParameter {
                name: "direction".to_string(),
                description: String::new(),
                required: true,
                schema: ParamSchema::default(),
            }],
        }));
        rt.set_setting("action_planning", Value::Bool(false)).await;

        let mut content = Content::text("go");
        content.actions = vec!["MOVE".to_string()];
        let msg = Memory::new(Uuid::new_v4(), Uuid::new_v4(), content);
        rt.handle_message(msg, None).await;

        let errors = seen_errors.lock().unwrap();
        assert!(errors.iter().any(|e| e.contains("direction")));
    }
}
