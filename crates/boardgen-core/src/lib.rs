//! boardgen core library
//!
//! The deterministic half of the design agent: diagnostic taxonomy,
//! source guardrails, strategy transforms, the repair planner, and the
//! stop evaluator. Everything here is pure and synchronous; the async
//! orchestration lives in `boardgen-agent`.

pub mod attempt;
pub mod config;
pub mod diagnostics;
pub mod diff;
pub mod edit;
pub mod events;
pub mod extract;
pub mod guardrails;
pub mod phase;
pub mod planner;
pub mod session;
pub mod source_model;
pub mod stop;
pub mod summary;
pub mod transforms;

pub use attempt::{AttemptRecord, Strategy};
pub use config::{Profile, RuntimeConfig};
pub use diagnostics::{
    annotate, annotate_all, attempt_score, dedup, set_signature, Diagnostic, DiagnosticSource,
    Family, Handling, Prioritized, RawFinding,
};
pub use diff::{diff_iterations, IterationDiff};
pub use edit::{parse_edit, ComponentKind, EditOp};
pub use events::{AgentEvent, DiagnosticPayload, RetryStatus, ReviewDecision, Usage};
pub use extract::{extract_code, has_complete_tsx_fence};
pub use guardrails::GuardrailOutcome;
pub use phase::{infer_phase, Phase};
pub use planner::{plan_repair, PlannerOutcome, RepairPlan, RepairResult};
pub use session::{
    derive_requirements, heuristic_architecture, ArchitectureBlock, FindingStatus, RequirementItem,
    ReviewFinding, SessionContext,
};
pub use stop::{StopEvaluator, StopReason, Streaks, Verdict};
pub use summary::{
    blocked_run_text, compact_design_intent, grouped_diagnostic_lines, manufacturing_readiness,
    FinalSummary,
};
pub use transforms::{
    rebuild_traces, relieve_congestion, spread_layout, ReliefParams, TransformOutcome,
};

/// boardgen version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
