//! # agent-runtime
//!
//! An in-process agent runtime core: plugin-composed capability registries, a per-turn
//! state composer, an LLM-driven action planner and executor, post-response evaluators,
//! an encrypted settings store, and a trajectory logger for offline training/eval.
//!
//! ## Design principles
//!
//! - **One runtime per agent**: [`Runtime`] owns every registry, the settings store, the
//!   in-memory message log, and the trajectory logger; plugins extend it declaratively,
//!   they never hold their own copy of it.
//! - **Plugins compose, they don't override**: [`Plugin`] bundles actions/providers/
//!   evaluators/services; [`resolve_plugin_dependencies`] orders them so a dependency's
//!   capabilities are always registered before its dependents run `init`.
//! - **One message in, one response out**: [`Runtime::handle_message`] is the single entry
//!   point — compose state, plan, execute, respond, evaluate — matching the "state-in,
//!   state-out" shape of one turn.
//! - **Fail open, log loud**: a provider or model handler failing doesn't abort the turn;
//!   it's logged via `tracing` and elided/falls back (§7 of the originating spec).
//!
//! ## Main modules
//!
//! - [`runtime`]: [`Runtime`], [`MessageResult`] — the orchestrator and its `handle_message`
//!   pipeline.
//! - [`plugin`]: [`Plugin`], [`resolve_plugin_dependencies`], [`PluginError`] — capability
//!   bundling and dependency-ordered registration.
//! - [`registry`]: the capability traits and their registries — [`Action`], [`Provider`],
//!   [`Evaluator`], [`Service`], [`ModelDispatcher`].
//! - [`state`]: [`State`], [`compose_state`] — the per-turn context composer.
//! - [`executor`]: [`Plan`], [`PlanStep`], [`execute_plan`], [`parse_plan_response`],
//!   [`bypass_plan`] — planning and sequential action execution.
//! - [`evaluator_runner`]: [`run_evaluators`] — fire-and-forget post-response fan-out.
//! - [`action_docs`]: [`merge_canonical_docs`] — fills missing action/evaluator metadata
//!   from embedded canonical doc blobs.
//! - [`trajectory`]: [`TrajectoryLogger`], [`Trajectory`], [`to_art_record`],
//!   [`group_trajectories`] — step-by-step trace capture and ART-record derivation.
//! - [`settings`]: [`SettingsStore`] — encrypted-at-rest settings/secrets.
//! - [`memory`]: [`Memory`], [`MemoryMetadata`] — the append-only conversation log's row type.
//! - [`store`]: [`MemoryStore`] — the in-process reference persistence backend.
//! - [`character`]: [`Character`], [`Agent`], [`parse_character`] — agent identity/config.
//! - [`primitives`]: [`Content`], [`Media`], [`Uuid`] — shared scalar and content types.
//! - [`error`]: [`RuntimeError`] — the runtime's top-level error type.
//!
//! Key types are re-exported at crate root: `use agent_runtime::{Runtime, Plugin, Memory};`.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use std::collections::HashMap;
//! use std::sync::Arc;
//!
//! use agent_runtime::{Memory, Runtime};
//! use agent_runtime::primitives::Content;
//!
//! # #[tokio::main]
//! # async fn main() {
//! let rt = Arc::new(Runtime::new(HashMap::new()).expect("settings init failed"));
//! rt.initialize().await.expect("plugin dependency resolution failed");
//!
//! let msg = Memory::new(uuid::Uuid::new_v4(), uuid::Uuid::new_v4(), Content::text("hello"));
//! let result = rt.handle_message(msg, None).await;
//! println!("{:?}", result.text);
//! # }
//! ```

pub mod action_docs;
pub mod character;
pub mod error;
pub mod evaluator_runner;
pub mod executor;
pub mod memory;
pub mod plugin;
pub mod primitives;
pub mod registry;
pub mod runtime;
pub mod settings;
pub mod state;
pub mod store;
pub mod trajectory;

pub use character::{
    build_character_plugins, merge_character_defaults, parse_character, validate_character_config,
    Agent, AgentStatus, Bio, Character, CharacterError, KnowledgeEntry, SettingValue, Style,
};
pub use error::RuntimeError;
pub use evaluator_runner::run_evaluators;
pub use executor::{
    bypass_plan, execute_plan, parse_plan_response, OnError, Plan, PlanStep, RetryPolicy,
    SkipReason, StepOutcome,
};
pub use memory::{BaseMetadata, Memory, MemoryError, MemoryMetadata, MemoryScope, MemoryType};
pub use plugin::{assert_unique_names, resolve_plugin_dependencies, Plugin, PluginError};
pub use primitives::{Content, ContentType, Extras, Media, MentionContext, Uuid};
pub use registry::{
    create_service_error, Action, ActionOptions, ActionParameter, ActionResult, Evaluator,
    ModelDispatcher, ModelError, ModelHandler, ModelType, ParamSchema, Provider, ProviderResult,
    Registries, ResponseCallback, Service, ServiceError, ServiceFactory,
};
pub use runtime::{MessageResult, Runtime, MESSAGES_TABLE};
pub use settings::SettingsStore;
pub use state::{compose_state, State};
pub use store::MemoryStore;
pub use trajectory::{
    extract_shared_prefix, group_trajectories, to_art_messages, to_art_record, ActionAttempt,
    ArtRecord, CallPurpose, ChatMessage, EnvironmentState, LlmCall, ProviderAccess,
    RewardComponents, Trajectory, TrajectoryGroup, TrajectoryLogger, TrajectoryMetrics,
    TrajectoryStatus, TrajectoryStep,
};

/// When running `cargo test -p agent-runtime`, initializes tracing from `RUST_LOG` so that
/// unit tests across `src/**` can print logs with `--nocapture`.
#[cfg(test)]
mod test_logging {
    use ctor::ctor;
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;
    use tracing_subscriber::EnvFilter;
    use tracing_subscriber::Layer;

    #[ctor]
    fn init() {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
        let _ = tracing_subscriber::registry()
            .with(
                tracing_subscriber::fmt::layer()
                    .with_test_writer()
                    .with_filter(filter),
            )
            .try_init();
    }
}
