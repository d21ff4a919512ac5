//! Deterministic prompt composition for the generation model.

use boardgen_core::{Diagnostic, Phase, SessionContext, Strategy};

/// System prompt shared by every generation call.
pub const SYSTEM_PROMPT: &str = "\
You are a circuit design agent. You produce complete tscircuit boards as \
TSX. Always answer with a short explanation followed by exactly one fenced \
`tsx` code block containing the full board source. Use explicit `name` \
attributes, `pcbX`/`pcbY` placement, `<net>` declarations, and `<trace>` \
elements with `.REF > .pin` or `net.NAME` selectors.";

/// Compose the first prompt of a run.
pub fn initial_prompt(
    ctx: &SessionContext,
    phase: Phase,
    user_prompt: &str,
    previous_code: Option<&str>,
    edit_note: Option<&str>,
) -> String {
    let mut prompt = String::new();
    prompt.push_str(&format!("## Request ({} phase)\n{}\n", phase, user_prompt));

    if !ctx.requirements.is_empty() {
        prompt.push_str("\n## Confirmed requirements\n");
        for item in &ctx.requirements {
            prompt.push_str(&format!("- {}\n", item.title));
        }
    }
    if !ctx.architecture.is_empty() {
        prompt.push_str("\n## Architecture\n");
        for block in &ctx.architecture {
            prompt.push_str(&format!("- {} ({})\n", block.label, block.status));
        }
    }
    if let Some(code) = previous_code {
        prompt.push_str("\n## Current circuit source\n```tsx\n");
        prompt.push_str(code);
        if !code.ends_with('\n') {
            prompt.push('\n');
        }
        prompt.push_str("```\n");
    }
    if let Some(note) = edit_note {
        prompt.push('\n');
        prompt.push_str(note);
        prompt.push('\n');
    }
    prompt
}

/// Compose the repair prompt for a retry attempt.
pub fn repair_prompt(
    user_prompt: &str,
    code: &str,
    focused: &[Diagnostic],
    adaptive_guardrails: &str,
    strategy: Strategy,
    attempt: u32,
) -> String {
    let mut prompt = String::new();
    prompt.push_str(&format!(
        "The previous circuit (attempt {}) failed validation. Fix the findings \
         below and return the corrected full source as one fenced tsx block.\n",
        attempt,
    ));

    prompt.push_str("\n## Findings\n");
    for diag in focused {
        prompt.push_str(&format!(
            "- [{}] (severity {}) {}\n",
            diag.family, diag.severity, diag.message
        ));
    }

    if strategy != Strategy::Normal {
        prompt.push_str(&format!(
            "\nA deterministic `{}` transform was already applied to the source \
             below; keep its board dimensions and placement changes.\n",
            strategy,
        ));
    }

    if !adaptive_guardrails.is_empty() {
        prompt.push_str("\n## Guardrails\n");
        prompt.push_str(adaptive_guardrails);
        prompt.push('\n');
    }

    prompt.push_str("\n## Current circuit source\n```tsx\n");
    prompt.push_str(code);
    if !code.ends_with('\n') {
        prompt.push('\n');
    }
    prompt.push_str("```\n");

    prompt.push_str(&format!("\n## Original request\n{}\n", user_prompt));
    prompt
}
