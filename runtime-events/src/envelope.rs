//! Envelope (session_id, node_id, event_id) wrapped around every runtime event.
//! EnvelopeState tracks the active room/turn and injects the envelope into each event.

use crate::event::RuntimeEvent;
use serde_json::Value;

/// Envelope fields stamped onto each event line.
#[derive(Clone, Debug, Default)]
pub struct Envelope {
    /// Session ID; constant within a session.
    pub session_id: Option<String>,
    /// Identifier for the current turn (one message-handler invocation).
    pub node_id: Option<String>,
    /// Per-message sequence number; monotonically increasing within a stream.
    pub event_id: Option<u64>,
}

impl Envelope {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_session_id(mut self, id: impl Into<String>) -> Self {
        self.session_id = Some(id.into());
        self
    }

    pub fn with_node_id(mut self, id: impl Into<String>) -> Self {
        self.node_id = Some(id.into());
        self
    }

    pub fn with_event_id(mut self, id: u64) -> Self {
        self.event_id = Some(id);
        self
    }

    /// Merges envelope fields into the given JSON object (top-level only).
    /// Does not overwrite existing keys.
    pub fn inject_into(&self, obj: &mut Value) {
        let Some(obj) = obj.as_object_mut() else {
            return;
        };
        if let Some(ref id) = self.session_id {
            obj.entry("session_id")
                .or_insert_with(|| Value::String(id.clone()));
        }
        if let Some(ref id) = self.node_id {
            obj.entry("node_id")
                .or_insert_with(|| Value::String(id.clone()));
        }
        if let Some(id) = self.event_id {
            obj.entry("event_id")
                .or_insert_with(|| Value::Number(serde_json::Number::from(id)));
        }
    }
}

/// Envelope state for one run: session_id, the turn currently being handled, next event_id.
///
/// A "turn" spans one call to the message handler (§4.8), from `MessageReceived` through
/// `ResponseEmitted` and `EvaluatorsCompleted`. Callers mark turn boundaries explicitly with
/// [`EnvelopeState::begin_turn`] rather than having them inferred from event contents.
pub struct EnvelopeState {
    pub session_id: String,
    pub current_turn_id: String,
    turn_seq: u64,
    pub next_event_id: u64,
}

impl EnvelopeState {
    pub fn new(session_id: String) -> Self {
        Self {
            session_id,
            current_turn_id: String::new(),
            turn_seq: 0,
            next_event_id: 1,
        }
    }

    /// Starts a new turn, scoping subsequent `node_id`s to `room_id` until the next call.
    pub fn begin_turn(&mut self, room_id: &str) {
        self.current_turn_id = format!("turn-{}-{}", room_id, self.turn_seq);
        self.turn_seq += 1;
    }

    fn turn_id(&self) -> &str {
        if self.current_turn_id.is_empty() {
            "turn-0"
        } else {
            self.current_turn_id.as_str()
        }
    }

    /// Injects envelope into the event value and advances the event counter.
    pub fn inject_into(&mut self, value: &mut Value) {
        let env = Envelope::new()
            .with_session_id(&self.session_id)
            .with_node_id(self.turn_id())
            .with_event_id(self.next_event_id);
        self.next_event_id += 1;
        env.inject_into(value);
    }

    /// Builds the envelope for the reply line.
    pub fn reply_envelope(&self) -> Envelope {
        Envelope::new()
            .with_session_id(&self.session_id)
            .with_node_id(self.turn_id())
            .with_event_id(self.next_event_id)
    }
}

/// Converts a runtime event to JSON and injects envelope using the given state.
/// Returns the final value (type + payload + session_id, node_id, event_id).
pub fn to_json(
    event: &RuntimeEvent,
    state: &mut EnvelopeState,
) -> Result<Value, serde_json::Error> {
    let mut value = event.to_value()?;
    state.inject_into(&mut value);
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::RuntimeEvent;

    #[test]
    fn envelope_inject() {
        let mut obj = serde_json::json!({"type":"message_received","memory_id":"m1","room_id":"r1"});
        let env = Envelope::new()
            .with_session_id("sess-1")
            .with_node_id("run-handler-1")
            .with_event_id(1);
        env.inject_into(&mut obj);
        assert_eq!(obj["session_id"], "sess-1");
        assert_eq!(obj["node_id"], "run-handler-1");
        assert_eq!(obj["event_id"], 1);
        assert_eq!(obj["type"], "message_received");
    }

    #[test]
    fn to_json_injects_envelope() {
        let ev = RuntimeEvent::MessageReceived {
            memory_id: "m1".to_string(),
            room_id: "r1".to_string(),
        };
        let mut state = EnvelopeState::new("run-123".to_string());
        let value = to_json(&ev, &mut state).unwrap();
        assert_eq!(value["type"], "message_received");
        assert_eq!(value["memory_id"], "m1");
        assert_eq!(value["session_id"], "run-123");
        assert_eq!(value["event_id"], 1);
    }
}
