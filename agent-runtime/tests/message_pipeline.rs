//! End-to-end coverage of one full turn through `Runtime`: plugin registration,
//! `initialize()`, `handle_message()`, lifecycle events, and background evaluator
//! completion.

mod init_logging;

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use agent_runtime::primitives::Content;
use agent_runtime::registry::{Action, ActionOptions, ActionResult, ResponseCallback};
use agent_runtime::{Evaluator, Memory, Plugin, Runtime, State};

struct Reply;

#[async_trait]
impl Action for Reply {
    fn name(&self) -> &str {
        "REPLY"
    }
    async fn handle(
        &self,
        _rt: &Runtime,
        msg: &Memory,
        _state: &State,
        _options: &ActionOptions,
        _callback: Option<&ResponseCallback>,
    ) -> ActionResult {
        let mut result = ActionResult::ok();
        let text = msg.content.text.clone().unwrap_or_default();
        result.values.insert("text".to_string(), Value::String(format!("echo: {text}")));
        result
    }
}

struct Reflection {
    ran: Arc<AtomicBool>,
}

#[async_trait]
impl Evaluator for Reflection {
    fn name(&self) -> &str {
        "REFLECTION"
    }
    fn always_run(&self) -> bool {
        true
    }
    async fn validate(&self, _rt: &Runtime, _msg: &Memory, _state: &State) -> bool {
        false
    }
    async fn handle(&self, _rt: &Runtime, _msg: &Memory, _state: &State) {
        self.ran.store(true, Ordering::SeqCst);
    }
}

/// **Scenario**: a plugin registering a `REPLY` action and an always-run `REFLECTION`
/// evaluator is enough to carry one message through the whole pipeline: the response text
/// comes back from the action, the full lifecycle event sequence fires in order, and the
/// evaluator (which runs in the background, after `handle_message` already returned) shows
/// up once the background task has had a chance to run.
#[tokio::test]
async fn full_turn_produces_response_and_runs_background_evaluators() {
    let events = Arc::new(Mutex::new(Vec::<Value>::new()));
    let events_for_sink = events.clone();
    let rt = Arc::new(
        Runtime::new(HashMap::new())
            .unwrap()
            .with_event_sink(Arc::new(move |value: Value| {
                events_for_sink.lock().unwrap().push(value);
            })),
    );

    let evaluator_ran = Arc::new(AtomicBool::new(false));
    let plugin = Plugin::new("bootstrap")
        .with_action(Arc::new(Reply))
        .with_evaluator(Arc::new(Reflection { ran: evaluator_ran.clone() }));
    rt.register_plugin(plugin);
    rt.initialize().await.expect("initialize should succeed with no dependencies");

    let mut content = Content::text("hello there");
    content.actions = vec!["REPLY".to_string()];
    let msg = Memory::new(uuid::Uuid::new_v4(), uuid::Uuid::new_v4(), content);

    let result = rt.handle_message(msg, None).await;
    assert_eq!(result.text.as_deref(), Some("echo: hello there"));
    assert_eq!(result.actions, vec!["REPLY".to_string()]);

    // evaluators run in a spawned background task; give it a chance to complete and emit
    // its lifecycle event.
    for _ in 0..50 {
        if events.lock().unwrap().len() >= 5 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(evaluator_ran.load(Ordering::SeqCst), "always_run evaluator should have executed");

    let seen = events.lock().unwrap().clone();
    let tags: Vec<&str> = seen.iter().map(|v| v["type"].as_str().unwrap()).collect();
    assert_eq!(
        tags,
        vec![
            "message_received",
            "action_started",
            "action_completed",
            "response_emitted",
            "evaluators_completed",
        ]
    );

    // Every event carries the envelope (§4.8/§4.9): same session_id and node_id across the
    // turn, strictly increasing event_id.
    let session_id = seen[0]["session_id"].as_str().unwrap().to_string();
    let node_id = seen[0]["node_id"].as_str().unwrap().to_string();
    let mut last_event_id = 0u64;
    for event in &seen {
        assert_eq!(event["session_id"].as_str().unwrap(), session_id);
        assert_eq!(event["node_id"].as_str().unwrap(), node_id);
        let event_id = event["event_id"].as_u64().unwrap();
        assert!(event_id > last_event_id);
        last_event_id = event_id;
    }
}

/// **Scenario**: two messages in the same room, handled concurrently, must still produce
/// response memories in submission order — the per-room lock serializes `handle_message`
/// end-to-end even though the second message's action finishes faster than the first's.
#[tokio::test]
async fn same_room_messages_are_handled_in_submission_order() {
    struct SlowFirst;

    #[async_trait]
    impl Action for SlowFirst {
        fn name(&self) -> &str {
            "SLOW_ECHO"
        }
        async fn handle(
            &self,
            _rt: &Runtime,
            msg: &Memory,
            _state: &State,
            _options: &ActionOptions,
            _callback: Option<&ResponseCallback>,
        ) -> ActionResult {
            let text = msg.content.text.clone().unwrap_or_default();
            if text == "first" {
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
            let mut result = ActionResult::ok();
            result.values.insert("text".to_string(), Value::String(text));
            result
        }
    }

    let rt = Arc::new(Runtime::new_for_test());
    rt.register_plugin(Plugin::new("bootstrap").with_action(Arc::new(SlowFirst)));
    rt.initialize().await.unwrap();

    let room_id = uuid::Uuid::new_v4();
    let mut first = Content::text("first");
    first.actions = vec!["SLOW_ECHO".to_string()];
    let mut second = Content::text("second");
    second.actions = vec!["SLOW_ECHO".to_string()];

    let rt_a = rt.clone();
    let rt_b = rt.clone();
    let msg_a = Memory::new(uuid::Uuid::new_v4(), room_id, first);
    let msg_b = Memory::new(uuid::Uuid::new_v4(), room_id, second);

    let (result_a, result_b) =
        tokio::join!(rt_a.handle_message(msg_a, None), rt_b.handle_message(msg_b, None));
    assert_eq!(result_a.text.as_deref(), Some("first"));
    assert_eq!(result_b.text.as_deref(), Some("second"));

    let responses: Vec<String> = rt
        .memories_by_room(agent_runtime::MESSAGES_TABLE, room_id)
        .into_iter()
        .filter(|m| m.content.in_reply_to.is_some())
        .filter_map(|m| m.content.text)
        .collect();
    assert_eq!(responses, vec!["first".to_string(), "second".to_string()]);
}

/// **Scenario**: `action_planning = false` bypasses the planner entirely, building a plan
/// directly from `content.actions`/`content.params` — no `TEXT_LARGE` handler is registered
/// at all, so this also proves the bypass path doesn't need one.
#[tokio::test]
async fn bypass_plan_runs_without_a_registered_planning_model() {
    let rt = Arc::new(Runtime::new_for_test());
    rt.register_plugin(Plugin::new("bootstrap").with_action(Arc::new(Reply)));
    rt.initialize().await.unwrap();
    rt.set_setting("action_planning", Value::Bool(false)).await;

    let mut content = Content::text("ping");
    content.actions = vec!["REPLY".to_string()];
    let msg = Memory::new(uuid::Uuid::new_v4(), uuid::Uuid::new_v4(), content);

    let result = rt.handle_message(msg, None).await;
    assert_eq!(result.text.as_deref(), Some("echo: ping"));
}
