//! Core scalar and content primitives shared across the runtime (§3).
//!
//! All identifiers are 128-bit UUIDs rendered as lowercase hyphenated strings. This module
//! keeps `Uuid` as a thin alias over `uuid::Uuid` rather than a newtype, matching the
//! "string-shaped identifier" flavor of the source system without losing the type.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub type Uuid = uuid::Uuid;

/// Open bag of extension fields carried alongside typed structs (§9: closed sum types with
/// an `extras` bag instead of dynamic attribute attachment).
pub type Extras = HashMap<String, Value>;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentType {
    Image,
    Video,
    Audio,
    Document,
    Link,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Media {
    pub id: Uuid,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    pub content_type: ContentType,
}

/// Platform-reported mention flags (§3); the runtime never infers these itself.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct MentionContext {
    #[serde(default)]
    pub is_mention: bool,
    #[serde(default)]
    pub is_reply: bool,
    #[serde(default)]
    pub is_thread: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mention_type: Option<String>,
}

/// The body of a `Memory` (§3). Every field is optional; `text` is the user-visible
/// surface, `thought` is internal reasoning that connectors must not echo back.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Content {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thought: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub actions: Vec<String>,
    /// Parameters keyed by action name, one map of named arguments per action.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub params: HashMap<String, HashMap<String, Value>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub providers: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub in_reply_to: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<Media>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mention_context: Option<MentionContext>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_message_id: Option<Uuid>,
}

impl Content {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Default::default()
        }
    }

    pub fn params_for<'a>(&'a self, action: &str) -> Option<&'a HashMap<String, Value>> {
        self.params.get(action)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_defaults_are_empty() {
        let c = Content::default();
        assert!(c.text.is_none());
        assert!(c.actions.is_empty());
        assert!(c.params.is_empty());
    }

    #[test]
    fn params_for_looks_up_by_action_name() {
        let mut c = Content::text("hi");
        c.params
            .insert("MOVE".to_string(), HashMap::from([("direction".to_string(), Value::String("south".into()))]));
        let p = c.params_for("MOVE").unwrap();
        assert_eq!(p["direction"], Value::String("south".into()));
        assert!(c.params_for("OTHER").is_none());
    }
}
