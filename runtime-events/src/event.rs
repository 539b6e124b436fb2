//! Runtime-level event types: wire shape for one lifecycle event (type + payload).
//! Envelope (session_id, node_id, event_id) is applied separately by [`crate::envelope`].

use serde::Serialize;
use serde_json::Value;

/// One lifecycle notification emitted by the message handler (§4.8) or the action
/// executor (§4.6), serialized for a connector-facing event bus.
#[derive(Clone, Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RuntimeEvent {
    /// An inbound `Memory` was accepted and persisted.
    MessageReceived { memory_id: String, room_id: String },
    /// The executor is about to run a named action step.
    ActionStarted { action: String, step_index: usize },
    /// A named action step finished (successfully or not).
    ActionCompleted {
        action: String,
        step_index: usize,
        success: bool,
        error: Option<String>,
    },
    /// The final response `Memory` for this turn was written and handed to the
    /// caller-provided callback.
    ResponseEmitted { memory_id: String, text: Option<String> },
    /// All evaluators for this turn finished running (or were skipped).
    EvaluatorsCompleted { room_id: String, ran: Vec<String> },
    /// Free-form payload for extensions that don't map to a named variant.
    Custom { value: Value },
}

impl RuntimeEvent {
    /// Serializes this event to a JSON object (type + payload only; no envelope).
    pub fn to_value(&self) -> Result<Value, serde_json::Error> {
        serde_json::to_value(self)
    }
}
