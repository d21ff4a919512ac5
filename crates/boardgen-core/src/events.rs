//! Typed progress/telemetry/evidence events for the SSE stream.
//!
//! Events are the ground truth a client sees for a run. The union is
//! tagged with `type`; payload fields use the wire's camelCase names.
//! Exactly one terminal event closes every stream: `done` or `error`.

use serde::{Deserialize, Serialize};

use crate::diagnostics::{Diagnostic, Family, Handling};
use crate::diff::IterationDiff;
use crate::phase::Phase;
use crate::planner::{RepairPlan, RepairResult};
use crate::session::ReviewFinding;
use crate::stop::StopReason;
use crate::summary::FinalSummary;

/// Status carried by `retry_result`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetryStatus {
    Clean,
    Retrying,
    Failed,
}

/// Wire form of a diagnostic inside `validation_errors`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiagnosticPayload {
    pub category: String,
    pub message: String,
    pub severity: u8,
    pub family: Family,
    pub handling: Handling,
    pub signature: String,
}

impl From<&Diagnostic> for DiagnosticPayload {
    fn from(diag: &Diagnostic) -> Self {
        Self {
            category: diag.category.clone(),
            message: diag.message.clone(),
            severity: diag.severity,
            family: diag.family.clone(),
            handling: diag.handling,
            signature: diag.signature.clone(),
        }
    }
}

/// A client decision about a review finding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewDecision {
    pub finding_id: String,
    pub decision: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Cost accounting attached to `done`.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Usage {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_cost_usd: Option<f64>,
}

/// The full event union streamed to the client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentEvent {
    #[serde(rename_all = "camelCase")]
    SessionStarted {
        session_id: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        project_id: Option<String>,
    },
    PhaseEntered {
        phase: Phase,
        #[serde(skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
    PhaseProgress {
        phase: Phase,
        #[serde(skip_serializing_if = "Option::is_none")]
        progress: Option<u8>,
        #[serde(skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    PhaseBlockDone {
        phase: Phase,
        #[serde(skip_serializing_if = "Option::is_none")]
        block_id: Option<String>,
        status: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    ToolStart {
        #[serde(skip_serializing_if = "Option::is_none")]
        call_id: Option<String>,
        tool: String,
        input: serde_json::Value,
    },
    #[serde(rename_all = "camelCase")]
    ToolResult {
        #[serde(skip_serializing_if = "Option::is_none")]
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
    Thinking {
        content: String,
    },
    Text {
        content: String,
    },
    Code {
        file: String,
        content: String,
    },
    IterationDiff {
        attempt: u32,
        diff: IterationDiff,
    },
    #[serde(rename_all = "camelCase")]
    RetryStart {
        attempt: u32,
        max_attempts: u32,
    },
    #[serde(rename_all = "camelCase")]
    RetryResult {
        attempt: u32,
        status: RetryStatus,
        diagnostics_count: usize,
        score: i64,
        #[serde(skip_serializing_if = "Option::is_none")]
        reason: Option<StopReason>,
    },
    ValidationErrors {
        attempt: u32,
        diagnostics: Vec<DiagnosticPayload>,
    },
    RepairPlan {
        plan: RepairPlan,
    },
    RepairResult {
        result: RepairResult,
    },
    ReviewFinding {
        finding: ReviewFinding,
    },
    ReviewDecision {
        decision: ReviewDecision,
    },
    GatePassed {
        phase: Phase,
        gate: String,
        message: String,
    },
    GateBlocked {
        phase: Phase,
        gate: String,
        reason: String,
    },
    #[serde(rename_all = "camelCase")]
    TimingMetric {
        stage: String,
        duration_ms: u64,
        #[serde(skip_serializing_if = "Option::is_none")]
        attempt: Option<u32>,
    },
    FinalSummary {
        summary: FinalSummary,
    },
    Ping,
    Done {
        usage: Usage,
    },
    Error {
        message: String,
    },
}

impl AgentEvent {
    /// Wire tag for this event.
    pub fn kind(&self) -> &'static str {
        match self {
            AgentEvent::SessionStarted { .. } => "session_started",
            AgentEvent::PhaseEntered { .. } => "phase_entered",
            AgentEvent::PhaseProgress { .. } => "phase_progress",
            AgentEvent::PhaseBlockDone { .. } => "phase_block_done",
            AgentEvent::ToolStart { .. } => "tool_start",
            AgentEvent::ToolResult { .. } => "tool_result",
            AgentEvent::SubagentStart { .. } => "subagent_start",
            AgentEvent::SubagentStop { .. } => "subagent_stop",
            AgentEvent::Thinking { .. } => "thinking",
            AgentEvent::Text { .. } => "text",
            AgentEvent::Code { .. } => "code",
            AgentEvent::IterationDiff { .. } => "iteration_diff",
            AgentEvent::RetryStart { .. } => "retry_start",
            AgentEvent::RetryResult { .. } => "retry_result",
            AgentEvent::ValidationErrors { .. } => "validation_errors",
            AgentEvent::RepairPlan { .. } => "repair_plan",
            AgentEvent::RepairResult { .. } => "repair_result",
            AgentEvent::ReviewFinding { .. } => "review_finding",
            AgentEvent::ReviewDecision { .. } => "review_decision",
            AgentEvent::GatePassed { .. } => "gate_passed",
            AgentEvent::GateBlocked { .. } => "gate_blocked",
            AgentEvent::TimingMetric { .. } => "timing_metric",
            AgentEvent::FinalSummary { .. } => "final_summary",
            AgentEvent::Ping => "ping",
            AgentEvent::Done { .. } => "done",
            AgentEvent::Error { .. } => "error",
        }
    }

    /// Whether this event terminates the stream.
    pub fn is_terminal(&self) -> bool {
        matches!(self, AgentEvent::Done { .. } | AgentEvent::Error { .. })
    }
}
