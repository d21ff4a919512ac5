//! Run finalization: readiness scoring and concluding text.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::attempt::AttemptRecord;
use crate::diagnostics::Diagnostic;
use crate::stop::StopReason;

/// The run's closing summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FinalSummary {
    pub design_intent: String,
    pub confirmed_requirements: Vec<String>,
    pub unresolved_blockers: Vec<String>,
    pub manufacturing_readiness: u8,
    pub diagnostics_count: usize,
    pub blocking_count: usize,
    pub attempts_used: u32,
}

/// Manufacturing readiness heuristic: start at 100 and subtract capped
/// penalties per diagnostic class, clamped to 0..=100.
pub fn manufacturing_readiness(
    blocking_count: usize,
    actionable_advisory_count: usize,
    low_signal_advisory_count: usize,
    open_critical_findings: usize,
) -> u8 {
    let mut score = 100.0_f64;
    score -= (12.0 * blocking_count as f64).min(70.0);
    score -= (2.0 * actionable_advisory_count as f64).min(22.0);
    score -= (0.5 * low_signal_advisory_count as f64).min(8.0);
    score -= (10.0 * open_critical_findings as f64).min(20.0);
    score.round().clamp(0.0, 100.0) as u8
}

/// Compact the user's prompt into a one-line design intent.
pub fn compact_design_intent(prompt: &str) -> String {
    let first = prompt
        .split(['.', '\n'])
        .map(str::trim)
        .find(|s| !s.is_empty())
        .unwrap_or("");
    let mut intent: String = first.chars().take(140).collect();
    if first.chars().count() > 140 {
        intent.push('…');
    }
    intent
}

/// Group retained diagnostics into `[family] xN` lines, most frequent first.
pub fn grouped_diagnostic_lines(diagnostics: &[Diagnostic]) -> Vec<String> {
    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for diag in diagnostics {
        *counts.entry(diag.family.as_str()).or_default() += 1;
    }
    let mut entries: Vec<(&str, usize)> = counts.into_iter().collect();
    entries.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(b.0)));
    entries
        .into_iter()
        .map(|(family, count)| format!("[{}] x{}", family, count))
        .collect()
}

/// The concluding `text` payload for a run that did not pass the gate:
/// the best candidate plus a grouped diagnostics digest and the stop
/// reason.
pub fn blocked_run_text(best: &AttemptRecord, reason: StopReason) -> String {
    let mut text = String::from("Generated a candidate circuit, but validation is still blocked.\n");
    if let Some(code) = &best.extracted_code {
        text.push_str("\n```tsx\n");
        text.push_str(code);
        if !code.ends_with('\n') {
            text.push('\n');
        }
        text.push_str("```\n");
    }
    let lines = grouped_diagnostic_lines(&best.diagnostics);
    if !lines.is_empty() {
        text.push_str("\nRemaining findings:\n");
        for line in &lines {
            text.push_str(line);
            text.push('\n');
        }
    }
    text.push_str(&format!("\nStop reason: {}.", reason));
    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attempt::Strategy;
    use crate::diagnostics::{annotate, DiagnosticSource, RawFinding};

    #[test]
    fn test_readiness_bounds_and_caps() {
        assert_eq!(manufacturing_readiness(0, 0, 0, 0), 100);
        // 12 per blocker, capped at 70
        assert_eq!(manufacturing_readiness(2, 0, 0, 0), 76);
        assert_eq!(manufacturing_readiness(10, 0, 0, 0), 30);
        // all caps together still clamp at zero
        assert_eq!(manufacturing_readiness(10, 20, 40, 5), 0);
        // fractional low-signal penalty rounds
        assert_eq!(manufacturing_readiness(0, 0, 1, 0), 100);
        assert_eq!(manufacturing_readiness(0, 0, 3, 0), 99);
    }

    #[test]
    fn test_compact_design_intent() {
        assert_eq!(
            compact_design_intent("Design a 5V regulator. Keep it small."),
            "Design a 5V regulator"
        );
        let long = "x".repeat(200);
        assert_eq!(compact_design_intent(&long).chars().count(), 141);
    }

    #[test]
    fn test_grouped_lines_sorted_by_count() {
        let diags = vec![
            annotate(RawFinding::new("pcb_trace_error", "a", 9, DiagnosticSource::Tscircuit)),
            annotate(RawFinding::new("pcb_trace_error", "b", 9, DiagnosticSource::Tscircuit)),
            annotate(RawFinding::new("pcb_short", "c", 9, DiagnosticSource::Tscircuit)),
        ];
        let lines = grouped_diagnostic_lines(&diags);
        assert_eq!(lines[0], "[pcb_trace_error] x2");
        assert_eq!(lines[1], "[pcb_short] x1");
    }

    #[test]
    fn test_blocked_run_text_shape() {
        let diag = annotate(RawFinding::new(
            "source_trace_missing_endpoint",
            "trace endpoint is missing",
            9,
            DiagnosticSource::Tscircuit,
        ));
        let best = AttemptRecord::freeze(
            2,
            Strategy::Normal,
            "raw".into(),
            Some("<board width=\"10mm\" height=\"10mm\" />".into()),
            vec![diag],
            true,
        );
        let text = blocked_run_text(&best, StopReason::StructuralRepairExhausted);
        assert!(text.starts_with("Generated a candidate circuit, but validation is still blocked."));
        assert!(text.contains("```tsx\n"));
        assert!(text.contains("[source_trace_missing_endpoint] x"));
        assert!(text.contains("Stop reason: structural_repair_exhausted."));
    }
}
