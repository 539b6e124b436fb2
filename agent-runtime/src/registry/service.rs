//! `Service` capability type (§3, §4.3). Services are long-lived singletons keyed by
//! `service_type`, started once during `initialize()` and stopped (in reverse order) at
//! teardown. Ported from `elizaos.types.service.Service` / `ServiceTypeRegistry`.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::runtime::Runtime;

/// Well-known service type strings the core recognizes (it implements none of them).
pub mod service_type {
    pub const TRANSCRIPTION: &str = "transcription";
    pub const VIDEO: &str = "video";
    pub const BROWSER: &str = "browser";
    pub const PDF: &str = "pdf";
    pub const REMOTE_FILES: &str = "aws_s3";
    pub const WEB_SEARCH: &str = "web_search";
    pub const EMAIL: &str = "email";
    pub const TEE: &str = "tee";
    pub const TASK: &str = "task";
    pub const WALLET: &str = "wallet";
    pub const LP_POOL: &str = "lp_pool";
    pub const TOKEN_DATA: &str = "token_data";
    pub const MESSAGE_SERVICE: &str = "message_service";
    pub const MESSAGE: &str = "message";
    pub const POST: &str = "post";
    pub const UNKNOWN: &str = "unknown";
}

#[derive(Debug, Error)]
#[error("service '{service_type}' error: {message}")]
pub struct ServiceError {
    pub service_type: String,
    pub message: String,
}

pub fn create_service_error(service_type: impl Into<String>, message: impl Into<String>) -> ServiceError {
    ServiceError {
        service_type: service_type.into(),
        message: message.into(),
    }
}

#[async_trait]
pub trait Service: Send + Sync {
    fn service_type(&self) -> &str;
    fn capability_description(&self) -> &str;
    async fn stop(&self) -> Result<(), ServiceError>;
}

type StartFuture<'a> = Pin<Box<dyn Future<Output = Result<Arc<dyn Service>, ServiceError>> + Send + 'a>>;

/// A registered service class: `service_type` plus the `start(rt)` classmethod, represented
/// as a boxed async factory since Rust trait objects can't carry `Self`-returning statics.
#[derive(Clone)]
pub struct ServiceFactory {
    pub service_type: String,
    pub start: Arc<dyn for<'a> Fn(&'a Runtime) -> StartFuture<'a> + Send + Sync>,
}

impl ServiceFactory {
    pub fn new<F, Fut>(service_type: impl Into<String>, start: F) -> Self
    where
        F: for<'a> Fn(&'a Runtime) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Arc<dyn Service>, ServiceError>> + Send + 'static,
    {
        Self {
            service_type: service_type.into(),
            start: Arc::new(move |rt| Box::pin(start(rt))),
        }
    }
}
