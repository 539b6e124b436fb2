//! `Memory` rows: the append-only unit of persisted conversation state (§3).
//!
//! Mirrors the shape of `elizaos.types.memory` (Memory / MessageMemory / MemoryMetadata),
//! re-expressed as a closed metadata enum instead of a family of loosely related dict
//! shapes (§9).

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::primitives::{Content, Uuid};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryType {
    Document,
    Fragment,
    Message,
    Description,
    Custom,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryScope {
    Shared,
    Private,
    Room,
}

/// Fields common to every metadata variant, plus an open `extras` bag for
/// plugin-specific keys that don't warrant their own variant (§9).
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct BaseMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<MemoryScope>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub extras: HashMap<String, Value>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MemoryMetadata {
    Document {
        #[serde(flatten)]
        base: BaseMetadata,
    },
    Fragment {
        #[serde(flatten)]
        base: BaseMetadata,
        document_id: Uuid,
        position: usize,
    },
    Message {
        #[serde(flatten)]
        base: BaseMetadata,
    },
    Description {
        #[serde(flatten)]
        base: BaseMetadata,
    },
    Custom {
        #[serde(flatten)]
        base: BaseMetadata,
    },
}

impl MemoryMetadata {
    pub fn base(&self) -> &BaseMetadata {
        match self {
            MemoryMetadata::Document { base }
            | MemoryMetadata::Fragment { base, .. }
            | MemoryMetadata::Message { base }
            | MemoryMetadata::Description { base }
            | MemoryMetadata::Custom { base } => base,
        }
    }

    pub fn memory_type(&self) -> MemoryType {
        match self {
            MemoryMetadata::Document { .. } => MemoryType::Document,
            MemoryMetadata::Fragment { .. } => MemoryType::Fragment,
            MemoryMetadata::Message { .. } => MemoryType::Message,
            MemoryMetadata::Description { .. } => MemoryType::Description,
            MemoryMetadata::Custom { .. } => MemoryType::Custom,
        }
    }
}

#[derive(Debug, Error)]
pub enum MemoryError {
    #[error("message memory requires non-empty content.text")]
    EmptyMessageText,
}

/// An immutable row of conversation state (§3, invariant 7: append-only; `in_reply_to`
/// on the content forms the reply DAG).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Memory {
    #[serde(default)]
    pub id: Option<Uuid>,
    pub entity_id: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<Uuid>,
    pub room_id: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub world_id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    pub content: Content,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<MemoryMetadata>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unique: Option<bool>,
    /// Populated only on search retrieval (§3); never set on a freshly created memory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub similarity: Option<f32>,
}

impl Memory {
    pub fn new(entity_id: Uuid, room_id: Uuid, content: Content) -> Self {
        Self {
            id: None,
            entity_id,
            agent_id: None,
            room_id,
            world_id: None,
            created_at: Some(Utc::now()),
            content,
            embedding: None,
            metadata: None,
            unique: None,
            similarity: None,
        }
    }

    /// Constructs a message memory, enforcing non-empty `content.text` (§3, mirrors
    /// `MessageMemory.__init__` in the source, which raises on empty text).
    pub fn message(entity_id: Uuid, room_id: Uuid, content: Content) -> Result<Self, MemoryError> {
        let has_text = content.text.as_deref().is_some_and(|t| !t.trim().is_empty());
        if !has_text {
            return Err(MemoryError::EmptyMessageText);
        }
        let mut mem = Self::new(entity_id, room_id, content);
        mem.metadata = Some(MemoryMetadata::Message {
            base: BaseMetadata::default(),
        });
        Ok(mem)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn uuid() -> Uuid {
        Uuid::new_v4()
    }

    #[test]
    fn message_memory_rejects_empty_text() {
        let err = Memory::message(uuid(), uuid(), Content::default()).unwrap_err();
        assert!(matches!(err, MemoryError::EmptyMessageText));
    }

    #[test]
    fn message_memory_accepts_text() {
        let mem = Memory::message(uuid(), uuid(), Content::text("hello")).unwrap();
        assert_eq!(mem.content.text.as_deref(), Some("hello"));
        assert_eq!(mem.metadata.unwrap().memory_type(), MemoryType::Message);
    }

    #[test]
    fn fragment_metadata_round_trips_through_json() {
        let meta = MemoryMetadata::Fragment {
            base: BaseMetadata::default(),
            document_id: uuid(),
            position: 3,
        };
        let json = serde_json::to_value(&meta).unwrap();
        assert_eq!(json["type"], "fragment");
        assert_eq!(json["position"], 3);
        let back: MemoryMetadata = serde_json::from_value(json).unwrap();
        assert_eq!(back.memory_type(), MemoryType::Fragment);
    }
}
