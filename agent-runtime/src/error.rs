//! Top-level error type composing the per-component error enums (§7).
//!
//! Each component gets its own small `thiserror` enum at its point of use; this type exists
//! only at the `Runtime`'s public surface, where callers need one error type to match on.

use thiserror::Error;

use crate::plugin::PluginError;
use crate::registry::ModelError;

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error(transparent)]
    Plugin(#[from] PluginError),
    #[error(transparent)]
    Model(#[from] ModelError),
    #[error("missing required setting: {0}")]
    ConfigError(String),
    #[error("invalid uuid: {0}")]
    InvalidUuid(String),
    #[error("invalid character: {0}")]
    InvalidCharacter(String),
}
