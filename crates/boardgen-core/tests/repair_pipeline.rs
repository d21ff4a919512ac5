//! The deterministic pipeline end to end: raw findings through
//! classification, dedup, planning, and stop evaluation.

use boardgen_core::{
    annotate_all, dedup, plan_repair, AttemptRecord, DiagnosticSource, Prioritized, Profile,
    RawFinding, RuntimeConfig, StopEvaluator, StopReason, Strategy,
};

fn raw(category: &str, message: &str, severity: u8) -> RawFinding {
    RawFinding::new(category, message, severity, DiagnosticSource::Kicad)
}

fn freeze(index: u32, diagnostics: Vec<boardgen_core::Diagnostic>) -> AttemptRecord {
    AttemptRecord::freeze(
        index,
        Strategy::Normal,
        "raw text".to_string(),
        Some("<board width=\"10mm\" height=\"10mm\" />".to_string()),
        diagnostics,
        true,
    )
}

#[test]
fn classification_dedup_and_planning_compose() {
    let findings = vec![
        raw(
            "DRC",
            "pad 550e8400-e29b-41d4-a716-446655440000 short between VCC and GND",
            9,
        ),
        raw(
            "DRC",
            "pad 123e4567-e89b-42d3-a456-426614174000 short between   VCC and GND",
            7,
        ),
        raw("ERC", "symbol C3 is off grid", 6),
        raw("ERC", "pin conflict: unspecified connected to unspecified", 8),
    ];

    let deduped = dedup(annotate_all(findings));
    // the two shorts differ only in UUID and whitespace; they collapse
    // to the higher severity member
    assert_eq!(deduped.len(), 3);
    let short = deduped
        .iter()
        .find(|d| d.message.contains("short"))
        .expect("short retained");
    assert_eq!(short.severity, 9);

    let outcome = plan_repair(1, deduped, Strategy::Normal, Vec::new());
    assert_eq!(outcome.result.auto_fixed_count, 1);
    assert_eq!(outcome.result.demoted_count, 1);
    assert!(outcome.result.blocking_after <= outcome.result.blocking_before);
    assert!(!outcome.result.revalidated);

    let prioritized = Prioritized::from_diagnostics(&outcome.retained);
    assert_eq!(prioritized.blocking.len(), 1);
    assert_eq!(prioritized.advisory.len(), 1);
}

#[test]
fn evaluator_converges_on_identical_sets() {
    let mut config = RuntimeConfig::defaults(Profile::Test);
    config.max_repair_attempts = 6;
    config.signature_repeat_limit = 2;
    let mut evaluator = StopEvaluator::new(config);

    let make_attempt = |index: u32| {
        let diagnostics = dedup(annotate_all(vec![raw(
            "pcb_short",
            "short between VCC and GND",
            9,
        )]));
        freeze(index, diagnostics)
    };

    assert!(evaluator.observe(&make_attempt(1)).stop.is_none());
    assert!(evaluator.observe(&make_attempt(2)).stop.is_none());
    let verdict = evaluator.observe(&make_attempt(3));
    assert_eq!(verdict.stop, Some(StopReason::StagnantSignature));
}

#[test]
fn improving_runs_do_not_stop_early() {
    let mut config = RuntimeConfig::defaults(Profile::Test);
    config.max_repair_attempts = 6;
    let mut evaluator = StopEvaluator::new(config);

    let attempt1 = freeze(
        1,
        dedup(annotate_all(vec![
            raw("pcb_short", "short near U1", 9),
            raw("pcb_short", "short near U2", 9),
            raw("pcb_short", "short near U3", 9),
        ])),
    );
    let attempt2 = freeze(
        2,
        dedup(annotate_all(vec![
            raw("pcb_short", "short near U1", 9),
            raw("pcb_short", "short near U2", 9),
        ])),
    );
    let attempt3 = freeze(
        3,
        dedup(annotate_all(vec![raw("pcb_short", "short near U1", 9)])),
    );

    assert!(evaluator.observe(&attempt1).stop.is_none());
    assert!(evaluator.observe(&attempt2).stop.is_none());
    let verdict = evaluator.observe(&attempt3);
    assert!(verdict.stop.is_none());
    assert_eq!(verdict.streaks.stagnant, 0);

    let best = evaluator.best_attempt().expect("best tracked");
    assert_eq!(best.index, 3);
}
