//! Per-attempt records frozen at attempt end.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::diagnostics::{attempt_score, set_signature, Diagnostic};

/// Source-code mutation selected for an attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    Normal,
    TargetedCongestionRelief,
    StructuralTraceRebuild,
    StructuralLayoutSpread,
}

impl Strategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::Normal => "normal",
            Strategy::TargetedCongestionRelief => "targeted_congestion_relief",
            Strategy::StructuralTraceRebuild => "structural_trace_rebuild",
            Strategy::StructuralLayoutSpread => "structural_layout_spread",
        }
    }

    /// Whether applying this strategy consumes structural budget.
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            Strategy::StructuralTraceRebuild | Strategy::StructuralLayoutSpread
        )
    }
}

impl std::fmt::Display for Strategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One full generation + validation + deterministic-repair cycle, frozen
/// at attempt end.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttemptRecord {
    pub index: u32,
    pub strategy: Strategy,
    pub raw_text: String,
    pub extracted_code: Option<String>,
    /// Post-dedup diagnostics retained after the deterministic plan.
    pub diagnostics: Vec<Diagnostic>,
    pub score: i64,
    pub set_signature: String,
    pub blocking_count: usize,
    pub compile_ok: bool,
    pub frozen_at: DateTime<Utc>,
}

impl AttemptRecord {
    pub fn freeze(
        index: u32,
        strategy: Strategy,
        raw_text: String,
        extracted_code: Option<String>,
        diagnostics: Vec<Diagnostic>,
        compile_ok: bool,
    ) -> Self {
        let score = attempt_score(&diagnostics, !compile_ok);
        let signature = set_signature(&diagnostics);
        let blocking_count = diagnostics.iter().filter(|d| d.is_blocking()).count();
        Self {
            index,
            strategy,
            raw_text,
            extracted_code,
            diagnostics,
            score,
            set_signature: signature,
            blocking_count,
            compile_ok,
            frozen_at: Utc::now(),
        }
    }

    /// Whether this attempt dominates `other` for best-attempt tracking:
    /// fewer blocking diagnostics, ties broken by lower score.
    pub fn dominates(&self, other: &AttemptRecord) -> bool {
        self.blocking_count < other.blocking_count
            || (self.blocking_count == other.blocking_count && self.score < other.score)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::{annotate, DiagnosticSource, RawFinding};

    fn frozen(index: u32, severities: &[u8], compile_ok: bool) -> AttemptRecord {
        let diagnostics = severities
            .iter()
            .enumerate()
            .map(|(i, &severity)| {
                annotate(RawFinding::new(
                    "pcb_trace_error",
                    format!("trace {} overlaps", i),
                    severity,
                    DiagnosticSource::Tscircuit,
                ))
            })
            .collect();
        AttemptRecord::freeze(
            index,
            Strategy::Normal,
            "text".into(),
            Some("code".into()),
            diagnostics,
            compile_ok,
        )
    }

    #[test]
    fn test_freeze_computes_derived_fields() {
        let record = frozen(1, &[9, 5], true);
        assert_eq!(record.score, 1400);
        assert_eq!(record.blocking_count, 2);
        assert!(record.set_signature.contains("pcb_trace_error"));

        let failed = frozen(1, &[9, 5], false);
        assert_eq!(failed.score, 6400);
    }

    #[test]
    fn test_dominates_ordering() {
        let fewer_blocking = frozen(2, &[9], true);
        let more_blocking = frozen(1, &[9, 9], true);
        assert!(fewer_blocking.dominates(&more_blocking));
        assert!(!more_blocking.dominates(&fewer_blocking));

        let cheap = frozen(2, &[8], true);
        let costly = frozen(1, &[9], true);
        assert!(cheap.dominates(&costly));
    }

    #[test]
    fn test_strategy_wire_names() {
        assert_eq!(Strategy::Normal.as_str(), "normal");
        assert_eq!(
            Strategy::TargetedCongestionRelief.as_str(),
            "targeted_congestion_relief"
        );
        assert!(Strategy::StructuralTraceRebuild.is_structural());
        assert!(Strategy::StructuralLayoutSpread.is_structural());
        assert!(!Strategy::TargetedCongestionRelief.is_structural());
    }
}
