//! Deterministic repair planner.
//!
//! Given an annotated, deduplicated diagnostic set, partitions it by
//! handling, drops what can be auto-resolved, counts demotions, and
//! reports the result. The planner never re-runs external validation:
//! `revalidated` is false by contract so clients do not treat the
//! deterministic fix as authoritative.

use serde::{Deserialize, Serialize};

use crate::attempt::Strategy;
use crate::diagnostics::{Diagnostic, Family, Handling};

/// Severity below which a should-demote diagnostic counts as demoted.
const DEMOTED_SEVERITY_CEILING: u8 = 6;

/// The plan derived from one attempt's diagnostics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepairPlan {
    pub attempt: u32,
    pub auto_fixable_families: Vec<String>,
    pub should_demote_families: Vec<String>,
    pub must_repair_families: Vec<String>,
    /// Strategy chosen for the next attempt.
    pub strategy: Strategy,
}

/// What the deterministic step actually did.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepairResult {
    pub attempt: u32,
    pub blocking_before: usize,
    pub blocking_after: usize,
    pub demoted_count: usize,
    pub auto_fixed_count: usize,
    /// Always false: the deterministic fix does not re-run validation.
    pub revalidated: bool,
    pub applied_actions: Vec<String>,
}

/// Plan plus the diagnostics retained for the gate and the next prompt.
#[derive(Debug, Clone)]
pub struct PlannerOutcome {
    pub plan: RepairPlan,
    pub result: RepairResult,
    pub retained: Vec<Diagnostic>,
}

/// The stricter auto-resolve predicate: only these shapes are dropped
/// outright rather than merely marked fixable.
fn auto_resolvable(diag: &Diagnostic) -> bool {
    if diag.handling != Handling::AutoFixable {
        return false;
    }
    let msg = diag.message.to_ascii_lowercase();
    match diag.family {
        Family::OffGrid => true,
        Family::FloatingLabel => !msg.contains("ambiguous") && !msg.contains("missing net"),
        // auto-fixable handling already means the pin is not functional
        Family::KicadUnconnectedPin => true,
        _ => false,
    }
}

/// Partition, apply, and report the deterministic repair step.
///
/// `strategy` is the next-attempt strategy already planned by the stop
/// evaluator; `extra_actions` carries guardrail and transform action tags
/// applied to this attempt's code.
pub fn plan_repair(
    attempt: u32,
    diagnostics: Vec<Diagnostic>,
    strategy: Strategy,
    extra_actions: Vec<String>,
) -> PlannerOutcome {
    let blocking_before = diagnostics.iter().filter(|d| d.is_blocking()).count();

    let mut auto_fixable_families = Vec::new();
    let mut should_demote_families = Vec::new();
    let mut must_repair_families = Vec::new();
    for diag in &diagnostics {
        let bucket = match diag.handling {
            Handling::AutoFixable => &mut auto_fixable_families,
            Handling::ShouldDemote => &mut should_demote_families,
            Handling::MustRepair => &mut must_repair_families,
        };
        let family = diag.family.as_str().to_string();
        if !bucket.contains(&family) {
            bucket.push(family);
        }
    }
    auto_fixable_families.sort();
    should_demote_families.sort();
    must_repair_families.sort();

    let mut actions = extra_actions;
    let mut auto_fixed_count = 0usize;
    let mut demoted_count = 0usize;
    let mut retained = Vec::with_capacity(diagnostics.len());

    for diag in diagnostics {
        if auto_resolvable(&diag) {
            auto_fixed_count += 1;
            actions.push(format!("auto_fix:{}", diag.family));
            continue;
        }
        if diag.handling == Handling::ShouldDemote && diag.severity < DEMOTED_SEVERITY_CEILING {
            demoted_count += 1;
            actions.push(format!("demote:{}", diag.family));
        }
        retained.push(diag);
    }

    let blocking_after = retained.iter().filter(|d| d.is_blocking()).count();
    actions.sort();
    actions.dedup();

    PlannerOutcome {
        plan: RepairPlan {
            attempt,
            auto_fixable_families,
            should_demote_families,
            must_repair_families,
            strategy,
        },
        result: RepairResult {
            attempt,
            blocking_before,
            blocking_after,
            demoted_count,
            auto_fixed_count,
            revalidated: false,
            applied_actions: actions,
        },
        retained,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::{annotate, DiagnosticSource, RawFinding};

    fn diag(category: &str, message: &str, severity: u8) -> Diagnostic {
        annotate(RawFinding::new(
            category,
            message,
            severity,
            DiagnosticSource::Kicad,
        ))
    }

    #[test]
    fn test_partition_and_counts() {
        let outcome = plan_repair(
            1,
            vec![
                diag("ERC", "symbol off grid", 7),
                diag("kicad_bom_property", "R2 missing bom field", 6),
                diag("ERC", "pin conflict: output connected to output", 9),
            ],
            Strategy::Normal,
            Vec::new(),
        );

        assert_eq!(
            outcome.plan.auto_fixable_families,
            vec!["off_grid".to_string()]
        );
        assert_eq!(
            outcome.plan.should_demote_families,
            vec!["kicad_bom_property".to_string()]
        );
        assert_eq!(
            outcome.plan.must_repair_families,
            vec!["pin_conflict_warning".to_string()]
        );

        // off_grid auto-resolves; the bom property (clamped to 5) demotes
        assert_eq!(outcome.result.auto_fixed_count, 1);
        assert_eq!(outcome.result.demoted_count, 1);
        assert_eq!(outcome.retained.len(), 2);
        assert!(outcome.result.applied_actions.contains(&"auto_fix:off_grid".to_string()));
        assert!(outcome
            .result
            .applied_actions
            .contains(&"demote:kicad_bom_property".to_string()));
    }

    #[test]
    fn test_blocking_never_increases() {
        let outcome = plan_repair(
            2,
            vec![
                diag("pcb_trace_error", "trace overlap", 9),
                diag("ERC", "unconnected pin 2 of R1", 6),
            ],
            Strategy::Normal,
            Vec::new(),
        );
        assert!(outcome.result.blocking_after <= outcome.result.blocking_before);
        assert!(!outcome.result.revalidated);
    }

    #[test]
    fn test_must_repair_floating_label_is_not_dropped() {
        let outcome = plan_repair(
            1,
            vec![diag("ERC", "floating label with missing net", 5)],
            Strategy::Normal,
            Vec::new(),
        );
        assert_eq!(outcome.result.auto_fixed_count, 0);
        assert_eq!(outcome.retained.len(), 1);
    }

    #[test]
    fn test_extra_actions_merge_sorted_deduped() {
        let outcome = plan_repair(
            1,
            vec![diag("ERC", "symbol off grid", 4)],
            Strategy::Normal,
            vec![
                "rebuild_traces:3".to_string(),
                "auto_fix:off_grid".to_string(),
            ],
        );
        let actions = &outcome.result.applied_actions;
        assert_eq!(
            actions,
            &vec![
                "auto_fix:off_grid".to_string(),
                "rebuild_traces:3".to_string()
            ]
        );
    }

    #[test]
    fn test_high_severity_demote_not_counted() {
        // should-demote but severity still >= 6: left in place, not counted
        let outcome = plan_repair(
            1,
            vec![diag("ERC", "duplicate reference GND", 7)],
            Strategy::Normal,
            Vec::new(),
        );
        assert_eq!(outcome.result.demoted_count, 0);
        assert_eq!(outcome.retained.len(), 1);
    }
}
