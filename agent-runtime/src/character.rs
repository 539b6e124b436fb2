//! `Character` / `Agent` identity (§3), ported from `elizaos.character`.
//!
//! A `Character` is validated at load time (unknown top-level keys rejected) and defaulted
//! the way `merge_character_defaults` does in the source: empty `settings`/`plugins`/`bio`,
//! and name falling back to `"Unnamed Character"`.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::primitives::Uuid;

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Bio {
    Single(String),
    Many(Vec<String>),
}

impl Default for Bio {
    fn default() -> Self {
        Bio::Many(Vec::new())
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(untagged)]
pub enum KnowledgeEntry {
    Path(String),
    File { path: String, #[serde(default)] shared: bool },
    Directory { directory: String, #[serde(default)] shared: bool },
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Style {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub all: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub chat: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub post: Vec<String>,
}

/// A raw settings/secret scalar: string, number, bool, or nested map (§3 `scalar|map`).
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SettingValue {
    Scalar(Value),
    Map(HashMap<String, Value>),
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Character {
    #[serde(default)]
    pub id: Option<Uuid>,
    pub name: String,
    #[serde(default)]
    pub bio: Bio,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub templates: HashMap<String, String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub message_examples: Vec<Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub post_examples: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub topics: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub adjectives: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub knowledge: Vec<KnowledgeEntry>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub plugins: Vec<String>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub settings: HashMap<String, SettingValue>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub secrets: HashMap<String, Value>,
    #[serde(default)]
    pub style: Style,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub advanced_planning: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub advanced_memory: Option<bool>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    Active,
    Inactive,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Agent {
    #[serde(flatten)]
    pub character: Character,
    #[serde(default)]
    pub enabled: bool,
    pub status: AgentStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Error)]
pub enum CharacterError {
    #[error("unknown top-level character field: {0}")]
    UnknownField(String),
    #[error("invalid character json: {0}")]
    Invalid(#[from] serde_json::Error),
}

/// Top-level keys accepted by `Character` (mirrors the pydantic model's field set).
const KNOWN_FIELDS: &[&str] = &[
    "id", "name", "bio", "system", "templates", "message_examples", "post_examples", "topics",
    "adjectives", "knowledge", "plugins", "settings", "secrets", "style", "advanced_planning",
    "advanced_memory",
];

/// Parses and validates a character definition, rejecting unknown top-level keys.
pub fn parse_character(raw: &Value) -> Result<Character, CharacterError> {
    validate_character_config(raw)?;
    let character: Character = serde_json::from_value(raw.clone())?;
    Ok(merge_character_defaults(character))
}

pub fn validate_character_config(raw: &Value) -> Result<(), CharacterError> {
    if let Some(obj) = raw.as_object() {
        for key in obj.keys() {
            if !KNOWN_FIELDS.contains(&key.as_str()) {
                return Err(CharacterError::UnknownField(key.clone()));
            }
        }
    }
    Ok(())
}

/// Fills in the defaults `merge_character_defaults` applies in the source: empty
/// `settings`/`plugins`/`bio`, and a fallback name when blank.
pub fn merge_character_defaults(mut character: Character) -> Character {
    if character.name.trim().is_empty() {
        character.name = "Unnamed Character".to_string();
    }
    character
}

/// Builds the plugin list implied by which provider API keys are present in `env`,
/// mirroring `build_character_plugins` in the source.
pub fn build_character_plugins(env: &HashMap<String, String>) -> Vec<String> {
    let mut plugins = vec!["@elizaos/plugin-sql".to_string()];
    let has = |k: &str| env.get(k).is_some_and(|v| !v.is_empty());

    let mut has_llm_provider = false;
    if has("ANTHROPIC_API_KEY") {
        plugins.push("@elizaos/plugin-anthropic".to_string());
        has_llm_provider = true;
    }
    if has("OPENROUTER_API_KEY") {
        plugins.push("@elizaos/plugin-openrouter".to_string());
        has_llm_provider = true;
    }
    if has("OPENAI_API_KEY") {
        plugins.push("@elizaos/plugin-openai".to_string());
        has_llm_provider = true;
    }
    if has("GOOGLE_GENERATIVE_AI_API_KEY") {
        plugins.push("@elizaos/plugin-google-genai".to_string());
        has_llm_provider = true;
    }
    if has("DISCORD_API_TOKEN") {
        plugins.push("@elizaos/plugin-discord".to_string());
    }
    let x_keys = ["X_API_KEY", "X_API_SECRET", "X_ACCESS_TOKEN", "X_ACCESS_TOKEN_SECRET"];
    if x_keys.iter().all(|k| has(k)) {
        plugins.push("@elizaos/plugin-x".to_string());
    }
    if has("TELEGRAM_BOT_TOKEN") {
        plugins.push("@elizaos/plugin-telegram".to_string());
    }
    if !has_llm_provider {
        plugins.push("@elizaos/plugin-ollama".to_string());
    }
    plugins
}
