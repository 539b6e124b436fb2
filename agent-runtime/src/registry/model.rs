//! Model dispatcher (C6, §4.4): priority-ordered, provider-tagged handler registry per
//! `ModelType`, with fallback on handler error.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use dashmap::DashMap;
use serde_json::Value;
use thiserror::Error;

use crate::runtime::Runtime;

/// Standard model types the core recognizes but does not implement (§4.4).
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum ModelType {
    TextSmall,
    TextLarge,
    TextEmbedding,
    TextReasoningSmall,
    TextReasoningLarge,
    ObjectSmall,
    ObjectLarge,
    Image,
    ImageDescription,
    Transcription,
    TextToSpeech,
    TokenizeText,
    DetokenizeText,
    /// Any model type not in the standard set; plugins may register their own.
    Custom(String),
}

impl fmt::Display for ModelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ModelType::TextSmall => "TEXT_SMALL",
            ModelType::TextLarge => "TEXT_LARGE",
            ModelType::TextEmbedding => "TEXT_EMBEDDING",
            ModelType::TextReasoningSmall => "TEXT_REASONING_SMALL",
            ModelType::TextReasoningLarge => "TEXT_REASONING_LARGE",
            ModelType::ObjectSmall => "OBJECT_SMALL",
            ModelType::ObjectLarge => "OBJECT_LARGE",
            ModelType::Image => "IMAGE",
            ModelType::ImageDescription => "IMAGE_DESCRIPTION",
            ModelType::Transcription => "TRANSCRIPTION",
            ModelType::TextToSpeech => "TEXT_TO_SPEECH",
            ModelType::TokenizeText => "TOKENIZE_TEXT",
            ModelType::DetokenizeText => "DETOKENIZE_TEXT",
            ModelType::Custom(s) => s.as_str(),
        };
        f.write_str(s)
    }
}

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("no model handler registered for {0}")]
    NoModelHandler(String),
    #[error("all model handlers for {model_type} failed; last error: {last_error}")]
    ModelHandlerFailure {
        model_type: String,
        last_error: String,
    },
}

type HandlerFuture<'a> = Pin<Box<dyn Future<Output = Result<Value, String>> + Send + 'a>>;
type HandlerFn = Arc<dyn for<'a> Fn(&'a Runtime, Value) -> HandlerFuture<'a> + Send + Sync>;

#[derive(Clone)]
pub struct ModelHandler {
    pub provider: String,
    pub priority: i32,
    /// Registration order; breaks priority ties (§4.4 mirrors §4.5's stable-sort rule).
    seq: usize,
    handler: HandlerFn,
}

/// Registry of model handlers keyed by `ModelType`, tried in descending `(priority, -seq)`
/// order. The dispatcher never retries a handler that already failed for this call.
#[derive(Default)]
pub struct ModelDispatcher {
    handlers: DashMap<ModelType, Vec<ModelHandler>>,
    next_seq: std::sync::atomic::AtomicUsize,
}

impl ModelDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F, Fut>(&self, model_type: ModelType, provider: impl Into<String>, priority: i32, handler: F)
    where
        F: for<'a> Fn(&'a Runtime, Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, String>> + Send + 'static,
    {
        let seq = self.next_seq.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        let entry = ModelHandler {
            provider: provider.into(),
            priority,
            seq,
            handler: Arc::new(move |rt, params| Box::pin(handler(rt, params))),
        };
        let mut handlers = self.handlers.entry(model_type).or_default();
        handlers.push(entry);
        handlers.sort_by(|a, b| b.priority.cmp(&a.priority).then(a.seq.cmp(&b.seq)));
    }

    pub async fn use_model(&self, rt: &Runtime, model_type: ModelType, params: Value) -> Result<Value, ModelError> {
        let handlers = self
            .handlers
            .get(&model_type)
            .map(|h| h.clone())
            .ok_or_else(|| ModelError::NoModelHandler(model_type.to_string()))?;
        if handlers.is_empty() {
            return Err(ModelError::NoModelHandler(model_type.to_string()));
        }
        let mut last_error = String::new();
        for handler in &handlers {
            match (handler.handler)(rt, params.clone()).await {
                Ok(value) => return Ok(value),
                Err(e) => {
                    tracing::warn!(provider = %handler.provider, model_type = %model_type, error = %e, "model handler failed, falling back");
                    last_error = e;
                }
            }
        }
        Err(ModelError::ModelHandlerFailure {
            model_type: model_type.to_string(),
            last_error,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn model_type_display_matches_standard_names() {
        assert_eq!(ModelType::TextLarge.to_string(), "TEXT_LARGE");
        assert_eq!(ModelType::Custom("FOO".into()).to_string(), "FOO");
    }
}
