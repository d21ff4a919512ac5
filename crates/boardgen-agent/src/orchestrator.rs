//! Top-level run state machine.
//!
//! One request = one run: phase selection, surgical-edit short circuit,
//! the bounded repair loop, and finalization. All failures the client
//! should see become typed events; the terminal event is exactly one of
//! `done` or `error`, except for caller-initiated cancellation where the
//! stream simply ends.

use std::sync::Arc;

use serde::Deserialize;

use boardgen_core::{
    annotate_all, blocked_run_text, compact_design_intent, dedup, derive_requirements,
    diff_iterations, grouped_diagnostic_lines, guardrails, heuristic_architecture, infer_phase,
    manufacturing_readiness, parse_edit, plan_repair, rebuild_traces, relieve_congestion,
    spread_layout, AgentEvent, AttemptRecord, Diagnostic, FinalSummary, Phase, Prioritized,
    ReliefParams, RetryStatus, ReviewFinding, RuntimeConfig, SessionContext, StopEvaluator,
    StopReason, Strategy, Usage,
};

use crate::cancel::CancelToken;
use crate::collaborators::{
    AdaptiveGuardrails, ArchitectureModel, CompileValidate, EditEngine, GenerationModel,
};
use crate::emitter::{EventEmitter, HEARTBEAT_INTERVAL};
use crate::error::{AgentError, Result};
use crate::prompts::{initial_prompt, repair_prompt};
use crate::registry::{RunRegistry, SUPERSEDED};
use crate::runner::run_attempt;
use crate::store::SessionStore;

/// Gate name used in gate events for the validated phases.
pub const VALIDATION_GATE: &str = "compile_kicad_validation";

/// Instruction appended to the prompt after a successful surgical edit.
const EDIT_APPLIED_NOTE: &str =
    "A targeted edit was applied to the schematic; reflect it in the source with minimal changes.";

/// Reason recorded when the client goes away.
pub const CLIENT_DISCONNECTED: &str = "client disconnected";

/// One review decision in the request payload.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewDecisionInput {
    pub finding_id: String,
    pub decision: String,
    #[serde(default)]
    pub reason: Option<String>,
}

/// A design request, as posted by the client.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DesignRequest {
    pub prompt: String,
    #[serde(default)]
    pub phase: Option<Phase>,
    #[serde(default)]
    pub previous_code: Option<String>,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub project_id: Option<String>,
    #[serde(default)]
    pub review_decisions: Vec<ReviewDecisionInput>,
}

/// The run orchestrator and its collaborators.
pub struct Orchestrator {
    config: RuntimeConfig,
    store: Arc<dyn SessionStore>,
    registry: Arc<RunRegistry>,
    model: Arc<dyn GenerationModel>,
    validator: Arc<dyn CompileValidate>,
    edit_engine: Arc<dyn EditEngine>,
    architecture: Arc<dyn ArchitectureModel>,
    guardrails_store: Arc<dyn AdaptiveGuardrails>,
}

fn generate_session_id() -> String {
    let token = uuid::Uuid::new_v4().simple().to_string();
    format!("sess_{}", &token[..12])
}

/// SHA-256 digest of an attempt's raw output, for the audit log.
fn content_digest(data: &str) -> String {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(data.as_bytes());
    hex::encode(hasher.finalize())
}

fn caller_initiated(cancel: &CancelToken) -> bool {
    matches!(
        cancel.reason().as_deref(),
        Some(SUPERSEDED) | Some(CLIENT_DISCONNECTED)
    )
}

/// Fold a dropped SSE connection into the run's cancellation scope.
fn spawn_disconnect_watch(
    emitter: EventEmitter,
    cancel: CancelToken,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(std::time::Duration::from_secs(1));
        loop {
            ticker.tick().await;
            if emitter.is_closed() {
                cancel.cancel(CLIENT_DISCONNECTED);
                return;
            }
            if cancel.is_cancelled() {
                return;
            }
        }
    })
}

impl Orchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: RuntimeConfig,
        store: Arc<dyn SessionStore>,
        registry: Arc<RunRegistry>,
        model: Arc<dyn GenerationModel>,
        validator: Arc<dyn CompileValidate>,
        edit_engine: Arc<dyn EditEngine>,
        architecture: Arc<dyn ArchitectureModel>,
        guardrails_store: Arc<dyn AdaptiveGuardrails>,
    ) -> Self {
        Self {
            config,
            store,
            registry,
            model,
            validator,
            edit_engine,
            architecture,
            guardrails_store,
        }
    }

    /// Serve one request to completion. Never panics the caller; every
    /// outcome lands in the event stream.
    pub async fn run(&self, request: DesignRequest, emitter: EventEmitter) {
        let session_id = request
            .session_id
            .clone()
            .filter(|id| !id.is_empty())
            .unwrap_or_else(generate_session_id);
        let run_id = uuid::Uuid::new_v4().to_string();
        let cancel = CancelToken::new();
        self.registry.register(&session_id, &run_id, cancel.clone());
        let heartbeat = emitter.spawn_heartbeat(HEARTBEAT_INTERVAL);
        let disconnect_watch = spawn_disconnect_watch(emitter.clone(), cancel.clone());

        emitter.emit(AgentEvent::SessionStarted {
            session_id: session_id.clone(),
            project_id: request.project_id.clone(),
        });

        let mut ctx = match self.store.get(&session_id).await {
            Ok(Some(ctx)) => ctx,
            Ok(None) => SessionContext::new(&session_id, request.project_id.clone()),
            Err(err) => {
                tracing::warn!(%err, %session_id, "session load failed, starting fresh");
                SessionContext::new(&session_id, request.project_id.clone())
            }
        };

        let phase = request
            .phase
            .unwrap_or_else(|| infer_phase(&request.prompt, ctx.has_history()));
        emitter.emit(AgentEvent::PhaseEntered {
            phase,
            message: None,
        });

        for input in &request.review_decisions {
            let accept = input.decision.eq_ignore_ascii_case("accept");
            if ctx.apply_review_decision(&input.finding_id, accept) {
                emitter.emit(AgentEvent::ReviewDecision {
                    decision: boardgen_core::ReviewDecision {
                        finding_id: input.finding_id.clone(),
                        decision: input.decision.clone(),
                        reason: input.reason.clone(),
                    },
                });
            }
        }

        let outcome = self
            .drive(&mut ctx, phase, &request, &emitter, &cancel)
            .await;

        // stop background emitters before the terminal event so nothing
        // trails it on the wire
        heartbeat.abort();
        disconnect_watch.abort();

        match outcome {
            Ok(usage) => emitter.emit(AgentEvent::Done { usage }),
            Err(_) if cancel.is_cancelled() && caller_initiated(&cancel) => {
                tracing::info!(%session_id, reason = ?cancel.reason(), "run cancelled by caller");
            }
            Err(err) if err.is_abort_like() => {
                emitter.emit(AgentEvent::Error {
                    message: "aborted or timed out".to_string(),
                });
            }
            Err(err) => {
                tracing::error!(%err, %session_id, "run failed");
                emitter.emit(AgentEvent::Error {
                    message: err.to_string(),
                });
            }
        }

        // terminal path: best-effort cleanup, errors swallowed
        ctx.last_phase = Some(phase);
        if let Err(err) = self.store.put(ctx).await {
            tracing::warn!(%err, %session_id, "session persist failed");
        }
        self.registry.unregister_if_current(&session_id, &run_id);
    }

    async fn drive(
        &self,
        ctx: &mut SessionContext,
        phase: Phase,
        request: &DesignRequest,
        emitter: &EventEmitter,
        cancel: &CancelToken,
    ) -> Result<Usage> {
        if phase == Phase::Requirements {
            ctx.merge_requirements(derive_requirements(&request.prompt));
        }
        if ctx.architecture.is_empty() {
            self.synthesize_architecture(ctx, request, emitter, cancel)
                .await?;
        }

        let edit_note = if phase.has_validation_gate() {
            self.try_surgical_edit(ctx, phase, request, emitter)
        } else {
            None
        };

        if !phase.has_validation_gate() {
            return self.run_ungated(ctx, phase, request, emitter, cancel).await;
        }

        self.run_gated(ctx, phase, request, edit_note, emitter, cancel)
            .await
    }

    async fn synthesize_architecture(
        &self,
        ctx: &mut SessionContext,
        request: &DesignRequest,
        emitter: &EventEmitter,
        cancel: &CancelToken,
    ) -> Result<()> {
        let blocks = match self.architecture.propose(&request.prompt, cancel).await {
            Ok(blocks) if !blocks.is_empty() => blocks,
            Ok(_) => heuristic_architecture(&request.prompt),
            Err(err) if err.is_abort_like() && cancel.is_cancelled() => return Err(err),
            Err(err) => {
                tracing::warn!(%err, "architecture model failed, using heuristic");
                emitter.emit(AgentEvent::PhaseProgress {
                    phase: Phase::Architecture,
                    progress: None,
                    message: Some("architecture model unavailable, derived blocks heuristically".into()),
                });
                heuristic_architecture(&request.prompt)
            }
        };
        ctx.merge_architecture(blocks);
        for block in &ctx.architecture {
            emitter.emit(AgentEvent::PhaseBlockDone {
                phase: Phase::Architecture,
                block_id: Some(block.id.clone()),
                status: block.status.clone(),
                message: Some(block.label.clone()),
            });
        }
        Ok(())
    }

    /// The surgical-edit short circuit. Returns the prompt note to append
    /// when an edit was applied.
    fn try_surgical_edit(
        &self,
        ctx: &mut SessionContext,
        phase: Phase,
        request: &DesignRequest,
        emitter: &EventEmitter,
    ) -> Option<&'static str> {
        let op = parse_edit(&request.prompt)?;

        let Some(baseline) = ctx.last_schematic.clone() else {
            emitter.emit(AgentEvent::PhaseBlockDone {
                phase,
                block_id: None,
                status: "blocked".to_string(),
                message: Some("no baseline schematic available for a targeted edit".into()),
            });
            return None;
        };

        let outcome = self.edit_engine.apply(&baseline, &[op]);
        if outcome.ok && outcome.schematic.is_some() {
            ctx.last_schematic = outcome.schematic;
            emitter.emit(AgentEvent::PhaseProgress {
                phase,
                progress: None,
                message: Some("applied targeted schematic edit".into()),
            });
            Some(EDIT_APPLIED_NOTE)
        } else {
            emitter.emit(AgentEvent::PhaseBlockDone {
                phase,
                block_id: None,
                status: "blocked".to_string(),
                message: outcome.error,
            });
            None
        }
    }

    /// Requirements/architecture: one attempt, no repair loop.
    async fn run_ungated(
        &self,
        ctx: &mut SessionContext,
        phase: Phase,
        request: &DesignRequest,
        emitter: &EventEmitter,
        cancel: &CancelToken,
    ) -> Result<Usage> {
        let prompt = initial_prompt(ctx, phase, &request.prompt, None, None);
        let outcome = run_attempt(
            Arc::clone(&self.model),
            Arc::clone(&self.validator),
            emitter,
            phase,
            &prompt,
            1,
            &self.config,
            cancel,
        )
        .await?;

        emitter.emit(AgentEvent::Text {
            content: outcome.raw_text.clone(),
        });
        emitter.emit(AgentEvent::PhaseProgress {
            phase,
            progress: Some(100),
            message: None,
        });
        emitter.emit(AgentEvent::FinalSummary {
            summary: FinalSummary {
                design_intent: compact_design_intent(&request.prompt),
                confirmed_requirements: ctx.requirements.iter().map(|r| r.title.clone()).collect(),
                unresolved_blockers: Vec::new(),
                manufacturing_readiness: manufacturing_readiness(0, 0, 0, ctx.open_critical_count()),
                diagnostics_count: 0,
                blocking_count: 0,
                attempts_used: 1,
            },
        });
        Ok(Usage {
            total_cost_usd: outcome.cost_usd,
        })
    }

    /// Implementation/review/export: the bounded repair loop.
    #[allow(clippy::too_many_arguments)]
    async fn run_gated(
        &self,
        ctx: &mut SessionContext,
        phase: Phase,
        request: &DesignRequest,
        edit_note: Option<&'static str>,
        emitter: &EventEmitter,
        cancel: &CancelToken,
    ) -> Result<Usage> {
        let mut evaluator = StopEvaluator::new(self.config.clone());
        let mut working_code = request
            .previous_code
            .clone()
            .or_else(|| ctx.last_generated_code.clone());
        let mut last_code: Option<String> = None;
        let mut last_focused: Vec<Diagnostic> = Vec::new();
        let mut adaptive: Option<String> = None;
        let mut total_cost = 0.0_f64;
        let mut saw_cost = false;
        let mut stop_reason: Option<StopReason> = None;
        let mut passed = false;
        let mut attempts_used = 0;

        for attempt in 1..=self.config.max_repair_attempts {
            if cancel.is_cancelled() {
                return Err(AgentError::Aborted(
                    cancel.reason().unwrap_or_else(|| "cancelled".into()),
                ));
            }
            attempts_used = attempt;
            emitter.emit(AgentEvent::RetryStart {
                attempt,
                max_attempts: self.config.max_repair_attempts,
            });

            let strategy = if attempt == 1 {
                Strategy::Normal
            } else {
                evaluator.arm_next()
            };

            let mut transform_actions = Vec::new();
            let mut transform_findings = Vec::new();
            if strategy != Strategy::Normal {
                if let Some(code) = &working_code {
                    let outcome = match strategy {
                        Strategy::StructuralTraceRebuild => rebuild_traces(code),
                        Strategy::StructuralLayoutSpread => spread_layout(code),
                        Strategy::TargetedCongestionRelief => relieve_congestion(
                            code,
                            &ReliefParams::ramped(
                                self.config.minor_board_growth_cap_pct,
                                self.config.minor_component_shift_mm,
                                evaluator.relief_passes_run(),
                                self.config.minor_relief_passes,
                            ),
                        ),
                        Strategy::Normal => unreachable!(),
                    };
                    working_code = Some(outcome.code);
                    transform_actions = outcome.actions;
                    transform_findings = outcome.diagnostics;
                }
            }

            let prompt = if attempt == 1 {
                initial_prompt(
                    ctx,
                    phase,
                    &request.prompt,
                    working_code.as_deref(),
                    edit_note,
                )
            } else {
                repair_prompt(
                    &request.prompt,
                    working_code.as_deref().unwrap_or(""),
                    &last_focused,
                    adaptive.as_deref().unwrap_or(""),
                    strategy,
                    attempt,
                )
            };

            let outcome = run_attempt(
                Arc::clone(&self.model),
                Arc::clone(&self.validator),
                emitter,
                phase,
                &prompt,
                attempt,
                &self.config,
                cancel,
            )
            .await?;
            if let Some(cost) = outcome.cost_usd {
                total_cost += cost;
                saw_cost = true;
            }

            let mut guardrail_actions = Vec::new();
            let code = outcome.extracted_code.as_deref().map(|raw| {
                let applied = guardrails::apply(raw);
                guardrail_actions = applied.actions;
                applied.code
            });
            if let Some(code) = &code {
                emitter.emit(AgentEvent::Code {
                    file: "circuit.tsx".to_string(),
                    content: code.clone(),
                });
            }
            if let (Some(previous), Some(current)) = (&last_code, &code) {
                emitter.emit(AgentEvent::IterationDiff {
                    attempt,
                    diff: diff_iterations(previous, current),
                });
            }

            let mut raw_findings = outcome.findings.clone();
            raw_findings.extend(transform_findings);
            let deduped = dedup(annotate_all(raw_findings));

            let mut actions = transform_actions;
            actions.extend(guardrail_actions);
            let planner_outcome = plan_repair(attempt, deduped, strategy, actions);

            let record = AttemptRecord::freeze(
                attempt,
                strategy,
                outcome.raw_text.clone(),
                code.clone(),
                planner_outcome.retained.clone(),
                outcome.compile_ok,
            );
            let verdict = evaluator.observe(&record);
            tracing::debug!(
                attempt,
                raw_digest = %&content_digest(&record.raw_text)[..12],
                streaks = ?verdict.streaks,
                next_strategy = %verdict.next_strategy,
                "attempt observed"
            );

            let mut plan = planner_outcome.plan.clone();
            plan.strategy = verdict.next_strategy;
            emitter.emit(AgentEvent::RepairPlan { plan });
            emitter.emit(AgentEvent::RepairResult {
                result: planner_outcome.result.clone(),
            });

            let produced: Vec<ReviewFinding> = planner_outcome
                .retained
                .iter()
                .map(|diag| ReviewFinding::from_diagnostic(diag, phase))
                .collect();
            let dismissed = ctx.merge_review_findings(phase, produced.clone());
            for finding in produced {
                emitter.emit(AgentEvent::ReviewFinding { finding });
            }
            for finding_id in dismissed {
                emitter.emit(AgentEvent::ReviewDecision {
                    decision: boardgen_core::ReviewDecision {
                        finding_id,
                        decision: "dismiss".to_string(),
                        reason: Some("no longer reported by validation".to_string()),
                    },
                });
            }

            let prioritized = Prioritized::from_diagnostics(&planner_outcome.retained);
            let focused = prioritized.focused();
            emitter.emit(AgentEvent::ValidationErrors {
                attempt,
                diagnostics: focused.iter().map(Into::into).collect(),
            });
            last_focused = focused;

            if let Some(schematic) = outcome.schematic {
                ctx.last_schematic = Some(schematic);
            }

            if planner_outcome.result.blocking_after == 0 && code.is_some() {
                emitter.emit(AgentEvent::GatePassed {
                    phase,
                    gate: VALIDATION_GATE.to_string(),
                    message: "no blocking diagnostics remain".to_string(),
                });
                emitter.emit(AgentEvent::RetryResult {
                    attempt,
                    status: RetryStatus::Clean,
                    diagnostics_count: record.diagnostics.len(),
                    score: record.score,
                    reason: None,
                });
                ctx.last_generated_code = code.clone();
                passed = true;
                break;
            }

            emitter.emit(AgentEvent::GateBlocked {
                phase,
                gate: VALIDATION_GATE.to_string(),
                reason: format!(
                    "{} blocking diagnostic(s) remain",
                    planner_outcome.result.blocking_after
                ),
            });

            if let Some(reason) = verdict.stop {
                emitter.emit(AgentEvent::RetryResult {
                    attempt,
                    status: RetryStatus::Failed,
                    diagnostics_count: record.diagnostics.len(),
                    score: record.score,
                    reason: Some(reason),
                });
                stop_reason = Some(reason);
                break;
            }

            emitter.emit(AgentEvent::RetryResult {
                attempt,
                status: RetryStatus::Retrying,
                diagnostics_count: record.diagnostics.len(),
                score: record.score,
                reason: None,
            });

            if adaptive.is_none() {
                adaptive = Some(self.guardrails_store.fetch().await);
            }
            if code.is_some() {
                working_code = code.clone();
                last_code = code;
            }
        }

        for finding_id in ctx.auto_dismiss_low_signal() {
            emitter.emit(AgentEvent::ReviewDecision {
                decision: boardgen_core::ReviewDecision {
                    finding_id,
                    decision: "dismiss".to_string(),
                    reason: Some("low-signal family".to_string()),
                },
            });
        }

        let best = evaluator
            .best_attempt()
            .cloned()
            .unwrap_or_else(|| AttemptRecord::freeze(0, Strategy::Normal, String::new(), None, Vec::new(), false));

        let text = if passed {
            best.raw_text.clone()
        } else {
            blocked_run_text(&best, stop_reason.unwrap_or(StopReason::MaxAttempts))
        };
        emitter.emit(AgentEvent::Text { content: text });

        if best.extracted_code.is_some() {
            ctx.last_generated_code = best.extracted_code.clone();
        }

        let blocking: Vec<Diagnostic> = best
            .diagnostics
            .iter()
            .filter(|d| d.is_blocking())
            .cloned()
            .collect();
        let low_signal_advisory = best
            .diagnostics
            .iter()
            .filter(|d| !d.is_blocking() && d.family.is_low_signal())
            .count();
        let actionable_advisory = best
            .diagnostics
            .iter()
            .filter(|d| !d.is_blocking() && !d.family.is_low_signal())
            .count();

        emitter.emit(AgentEvent::FinalSummary {
            summary: FinalSummary {
                design_intent: compact_design_intent(&request.prompt),
                confirmed_requirements: ctx.requirements.iter().map(|r| r.title.clone()).collect(),
                unresolved_blockers: grouped_diagnostic_lines(&blocking),
                manufacturing_readiness: manufacturing_readiness(
                    blocking.len(),
                    actionable_advisory,
                    low_signal_advisory,
                    ctx.open_critical_count(),
                ),
                diagnostics_count: best.diagnostics.len(),
                blocking_count: blocking.len(),
                attempts_used,
            },
        });

        Ok(Usage {
            total_cost_usd: saw_cost.then_some(total_cost),
        })
    }
}
