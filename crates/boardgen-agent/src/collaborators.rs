//! Typed contracts for the external collaborators.
//!
//! The generation model, the compile+validate pipeline, the schematic
//! edit engine, the architecture model, and the adaptive guardrails
//! store are all opaque to the orchestrator; these traits are the whole
//! surface it sees. In-memory fakes implementing them live in the
//! integration tests.

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;

use boardgen_core::edit::EditOp;
use boardgen_core::session::ArchitectureBlock;
use boardgen_core::RawFinding;

use crate::cancel::CancelToken;
use crate::error::Result;

/// One event from the streaming generation model.
#[derive(Debug, Clone, PartialEq)]
pub enum ModelEvent {
    TextDelta(String),
    ThinkingDelta(String),
    ToolStart {
        call_id: Option<String>,
        tool: String,
        input: serde_json::Value,
    },
    ToolResult {
        call_id: Option<String>,
        tool: String,
        output: serde_json::Value,
    },
    SubagentStart {
        agent: String,
    },
    SubagentStop {
        agent: String,
    },
    /// Final stream marker carrying the attempt's cost.
    Completed {
        cost_usd: Option<f64>,
    },
}

/// Boxed model event stream.
pub type ModelStream = Pin<Box<dyn Stream<Item = Result<ModelEvent>> + Send>>;

/// Streaming text producer.
#[async_trait]
pub trait GenerationModel: Send + Sync {
    /// Open a stream for one prompt. Cancellation must abort the stream.
    async fn stream(&self, prompt: &str, cancel: &CancelToken) -> Result<ModelStream>;
}

/// What the compile+validate pipeline returns for one artifact.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationOutcome {
    pub compile_ok: bool,
    pub findings: Vec<RawFinding>,
    pub schematic: Option<String>,
}

/// The two-checker compile+validate pipeline.
#[async_trait]
pub trait CompileValidate: Send + Sync {
    /// Compile and validate; must honor cancellation promptly.
    async fn compile_validate(&self, code: &str, cancel: &CancelToken) -> Result<ValidationOutcome>;
}

/// Result of applying surgical edits to a schematic.
#[derive(Debug, Clone, PartialEq)]
pub struct EditOutcome {
    pub ok: bool,
    pub schematic: Option<String>,
    pub error: Option<String>,
}

/// Pure schematic edit engine.
pub trait EditEngine: Send + Sync {
    fn apply(&self, schematic: &str, edits: &[EditOp]) -> EditOutcome;
}

/// Placeholder wired in when no edit engine is deployed. Every edit
/// reports blocked, which sends the request down the normal path.
#[derive(Debug, Default)]
pub struct UnavailableEditEngine;

impl EditEngine for UnavailableEditEngine {
    fn apply(&self, _schematic: &str, _edits: &[EditOp]) -> EditOutcome {
        EditOutcome {
            ok: false,
            schematic: None,
            error: Some("edit engine unavailable".to_string()),
        }
    }
}

/// Small model that proposes an architecture block list.
#[async_trait]
pub trait ArchitectureModel: Send + Sync {
    async fn propose(&self, prompt: &str, cancel: &CancelToken) -> Result<Vec<ArchitectureBlock>>;
}

/// Persistent guardrails store; advisory text, empty on failure.
#[async_trait]
pub trait AdaptiveGuardrails: Send + Sync {
    async fn fetch(&self) -> String;
}

/// In-memory fallback used when no guardrails store is wired up.
#[derive(Debug, Default)]
pub struct NoAdaptiveGuardrails;

#[async_trait]
impl AdaptiveGuardrails for NoAdaptiveGuardrails {
    async fn fetch(&self) -> String {
        String::new()
    }
}
