//! boardgen agent library
//!
//! The async half of the design agent: collaborator contracts, the
//! cancellation token, the event emitter, session store, run registry,
//! attempt runner, and the run orchestrator.

pub mod anthropic;
pub mod cancel;
pub mod collaborators;
pub mod emitter;
pub mod error;
pub mod http_validate;
pub mod orchestrator;
pub mod prompts;
pub mod registry;
pub mod runner;
pub mod store;

pub use anthropic::{AnthropicModel, API_KEY_VAR};
pub use cancel::CancelToken;
pub use collaborators::{
    AdaptiveGuardrails, ArchitectureModel, CompileValidate, EditEngine, EditOutcome,
    GenerationModel, ModelEvent, ModelStream, NoAdaptiveGuardrails, UnavailableEditEngine,
    ValidationOutcome,
};
pub use emitter::{EventEmitter, HEARTBEAT_INTERVAL};
pub use error::{AgentError, Result};
pub use http_validate::{
    HttpAdaptiveGuardrails, HttpCompileValidate, OfflineCompileValidate, GUARDRAILS_URL_VAR,
    VALIDATOR_URL_VAR,
};
pub use orchestrator::{
    DesignRequest, Orchestrator, ReviewDecisionInput, CLIENT_DISCONNECTED, VALIDATION_GATE,
};
pub use registry::{RunRegistry, SUPERSEDED};
pub use runner::{
    run_attempt, AttemptOutcome, ATTEMPT_TIMEOUT, COMPILE_VALIDATE_TIMEOUT, MISSING_CODE_BLOCK,
};
pub use store::{MemorySessionStore, SessionStore};
