//! One attempt: drive the model stream, extract code, compile+validate.
//!
//! The runner never decides retries or strategies. Timeouts at either
//! stage become ordinary blocking findings so the loop above can treat
//! them like any other diagnostic.

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::StreamExt;
use tokio::task::JoinHandle;

use boardgen_core::{extract_code, has_complete_tsx_fence, AgentEvent, Phase, RawFinding, RuntimeConfig};
use boardgen_core::DiagnosticSource;

use crate::cancel::CancelToken;
use crate::collaborators::{CompileValidate, GenerationModel, ModelEvent, ValidationOutcome};
use crate::emitter::EventEmitter;
use crate::error::{AgentError, Result};

/// Category for a model-side timeout with no emitted code block.
pub const ATTEMPT_TIMEOUT: &str = "attempt_timeout";
/// Category for a compile+validate deadline miss.
pub const COMPILE_VALIDATE_TIMEOUT: &str = "compile_validate_timeout";
/// Category synthesized when the output has no fenced code block.
pub const MISSING_CODE_BLOCK: &str = "missing_code_block";

const SYNTHETIC_SEVERITY: u8 = 9;

/// Everything one attempt produced.
#[derive(Debug, Clone)]
pub struct AttemptOutcome {
    pub raw_text: String,
    pub extracted_code: Option<String>,
    pub cost_usd: Option<f64>,
    pub compile_ok: bool,
    pub findings: Vec<RawFinding>,
    pub schematic: Option<String>,
}

fn synthetic_finding(category: &str, message: impl Into<String>) -> RawFinding {
    RawFinding::new(
        category,
        message,
        SYNTHETIC_SEVERITY,
        DiagnosticSource::Tscircuit,
    )
}

type Speculation = (String, JoinHandle<Result<ValidationOutcome>>);

/// Run one attempt end to end.
#[allow(clippy::too_many_arguments)]
pub async fn run_attempt(
    model: Arc<dyn GenerationModel>,
    validator: Arc<dyn CompileValidate>,
    emitter: &EventEmitter,
    phase: Phase,
    prompt: &str,
    attempt: u32,
    config: &RuntimeConfig,
    cancel: &CancelToken,
) -> Result<AttemptOutcome> {
    let stream_start = Instant::now();
    let mut stream = match model.stream(prompt, cancel).await {
        Ok(stream) => stream,
        Err(err) if err.is_abort_like() && !cancel.is_cancelled() => {
            return Ok(attempt_timeout_outcome(String::new()));
        }
        Err(err) => return Err(err),
    };

    let mut text = String::new();
    let mut cost_usd = None;
    let mut speculation: Option<Speculation> = None;
    let mut stream_error: Option<AgentError> = None;

    let mut pulse = tokio::time::interval(Duration::from_millis(config.status_pulse_ms));
    pulse.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    pulse.tick().await;

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                abort_speculation(&mut speculation);
                return Err(AgentError::Aborted(cancel_reason(cancel)));
            }
            _ = pulse.tick() => {
                emitter.emit(AgentEvent::PhaseProgress {
                    phase,
                    progress: None,
                    message: Some("generating candidate circuit".to_string()),
                });
            }
            next = stream.next() => match next {
                Some(Ok(event)) => {
                    handle_model_event(
                        event,
                        &mut text,
                        &mut cost_usd,
                        emitter,
                    );
                    maybe_speculate(
                        &text,
                        config,
                        &validator,
                        cancel,
                        &mut speculation,
                    );
                }
                Some(Err(err)) => {
                    stream_error = Some(err);
                    break;
                }
                None => break,
            }
        }
    }

    emitter.emit(AgentEvent::TimingMetric {
        stage: "model_stream".to_string(),
        duration_ms: stream_start.elapsed().as_millis() as u64,
        attempt: Some(attempt),
    });

    let extracted = extract_code(&text);
    if let Some(err) = stream_error {
        if !err.is_abort_like() {
            abort_speculation(&mut speculation);
            return Err(err);
        }
        if cancel.is_cancelled() {
            abort_speculation(&mut speculation);
            return Err(AgentError::Aborted(cancel_reason(cancel)));
        }
        if extracted.is_none() {
            abort_speculation(&mut speculation);
            return Ok(attempt_timeout_outcome(text));
        }
        // an abort-like tail after a complete fence: the artifact is usable
    }

    let Some(code) = extracted else {
        abort_speculation(&mut speculation);
        return Ok(AttemptOutcome {
            raw_text: text,
            extracted_code: None,
            cost_usd,
            compile_ok: false,
            findings: vec![synthetic_finding(
                MISSING_CODE_BLOCK,
                "assistant output contained no fenced code block",
            )],
            schematic: None,
        });
    };

    let deadline = Duration::from_millis(config.compile_validate_timeout_ms);
    let compile_start = Instant::now();
    let validation = match speculation.take() {
        Some((speculated_code, handle)) if speculated_code == code => {
            tokio::time::timeout(deadline, async {
                match handle.await {
                    Ok(result) => result,
                    Err(err) => Err(AgentError::Validation(err.to_string())),
                }
            })
            .await
        }
        other => {
            if let Some((_, handle)) = other {
                handle.abort();
            }
            tokio::time::timeout(deadline, validator.compile_validate(&code, cancel)).await
        }
    };
    emitter.emit(AgentEvent::TimingMetric {
        stage: "compile_validate".to_string(),
        duration_ms: compile_start.elapsed().as_millis() as u64,
        attempt: Some(attempt),
    });

    match validation {
        Err(_elapsed) => Ok(AttemptOutcome {
            raw_text: text,
            extracted_code: Some(code),
            cost_usd,
            compile_ok: false,
            findings: vec![synthetic_finding(
                COMPILE_VALIDATE_TIMEOUT,
                format!(
                    "compile+validate did not finish within {}ms",
                    config.compile_validate_timeout_ms
                ),
            )],
            schematic: None,
        }),
        Ok(Err(err)) if err.is_abort_like() => {
            if cancel.is_cancelled() {
                return Err(AgentError::Aborted(cancel_reason(cancel)));
            }
            Ok(AttemptOutcome {
                raw_text: text,
                extracted_code: Some(code),
                cost_usd,
                compile_ok: false,
                findings: vec![synthetic_finding(
                    COMPILE_VALIDATE_TIMEOUT,
                    "compile+validate aborted before completion",
                )],
                schematic: None,
            })
        }
        Ok(Err(err)) => Err(err),
        Ok(Ok(outcome)) => Ok(AttemptOutcome {
            raw_text: text,
            extracted_code: Some(code),
            cost_usd,
            compile_ok: outcome.compile_ok,
            findings: outcome.findings,
            schematic: outcome.schematic,
        }),
    }
}

fn cancel_reason(cancel: &CancelToken) -> String {
    cancel.reason().unwrap_or_else(|| "cancelled".to_string())
}

fn attempt_timeout_outcome(raw_text: String) -> AttemptOutcome {
    AttemptOutcome {
        raw_text,
        extracted_code: None,
        cost_usd: None,
        compile_ok: false,
        findings: vec![synthetic_finding(
            ATTEMPT_TIMEOUT,
            "model stream aborted before emitting a code block",
        )],
        schematic: None,
    }
}

fn handle_model_event(
    event: ModelEvent,
    text: &mut String,
    cost_usd: &mut Option<f64>,
    emitter: &EventEmitter,
) {
    match event {
        ModelEvent::TextDelta(delta) => text.push_str(&delta),
        ModelEvent::ThinkingDelta(content) => emitter.emit(AgentEvent::Thinking { content }),
        ModelEvent::ToolStart {
            call_id,
            tool,
            input,
        } => emitter.emit(AgentEvent::ToolStart {
            call_id,
            tool,
            input,
        }),
        ModelEvent::ToolResult {
            call_id,
            tool,
            output,
        } => emitter.emit(AgentEvent::ToolResult {
            call_id,
            tool,
            output,
        }),
        ModelEvent::SubagentStart { agent } => {
            emitter.emit(AgentEvent::SubagentStart { agent })
        }
        ModelEvent::SubagentStop { agent } => emitter.emit(AgentEvent::SubagentStop { agent }),
        ModelEvent::Completed { cost_usd: cost } => *cost_usd = cost,
    }
}

/// Start the speculative compile once a complete fence shows up
/// mid-stream. At most one speculation per attempt.
fn maybe_speculate(
    text: &str,
    config: &RuntimeConfig,
    validator: &Arc<dyn CompileValidate>,
    cancel: &CancelToken,
    speculation: &mut Option<Speculation>,
) {
    if !config.enable_connectivity_preflight
        || speculation.is_some()
        || !has_complete_tsx_fence(text)
    {
        return;
    }
    let Some(code) = extract_code(text) else {
        return;
    };
    let validator = Arc::clone(validator);
    let cancel = cancel.clone();
    let speculated = code.clone();
    let handle =
        tokio::spawn(async move { validator.compile_validate(&speculated, &cancel).await });
    *speculation = Some((code, handle));
}

fn abort_speculation(speculation: &mut Option<Speculation>) {
    if let Some((_, handle)) = speculation.take() {
        handle.abort();
    }
}
