//! Lifecycle event wire protocol: type + payload + envelope.
//!
//! This crate defines the wire shape of a single runtime lifecycle event and the
//! envelope (session/node/event id) injected around it. It does not depend on
//! `agent-runtime`; `agent-runtime` bridges its internal lifecycle notifications into
//! [`RuntimeEvent`] and calls [`to_json`] to hand connectors a serializable line.

pub mod envelope;
pub mod event;

pub use envelope::{to_json, Envelope, EnvelopeState};
pub use event::RuntimeEvent;
