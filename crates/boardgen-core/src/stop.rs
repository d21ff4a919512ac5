//! Stop-condition arithmetic and strategy escalation.
//!
//! The evaluator observes each frozen attempt, maintains the improvement
//! streaks, decides whether the loop stops (and why), and plans the
//! strategy for the next attempt. Structural strategies draw from a
//! bounded budget; minor congestion relief runs as a staged ramp before
//! the structural spread is allowed.

use serde::{Deserialize, Serialize};

use crate::attempt::{AttemptRecord, Strategy};
use crate::config::RuntimeConfig;
use crate::diagnostics::Family;

/// Score drop below which an attempt does not count as improved.
const IMPROVEMENT_SCORE_DROP: i64 = 120;

/// Why the repair loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    MaxAttempts,
    AutorouterExhaustion,
    StructuralRepairExhausted,
    StagnantSignature,
    NoImprovement,
}

impl StopReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            StopReason::MaxAttempts => "max_attempts",
            StopReason::AutorouterExhaustion => "autorouter_exhaustion",
            StopReason::StructuralRepairExhausted => "structural_repair_exhausted",
            StopReason::StagnantSignature => "stagnant_signature",
            StopReason::NoImprovement => "no_improvement",
        }
    }
}

impl std::fmt::Display for StopReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Streak counters after an observation, surfaced for tracing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Streaks {
    pub repeated_signature: u32,
    pub stagnant: u32,
    pub same_top_family: u32,
    pub no_blocking_reduction: u32,
    pub autorouter_exhaustion: u32,
}

/// The evaluator's decision after one attempt.
#[derive(Debug, Clone)]
pub struct Verdict {
    pub stop: Option<StopReason>,
    /// Strategy planned for the next attempt (reported in the repair plan
    /// even when the loop stops here).
    pub next_strategy: Strategy,
    pub streaks: Streaks,
}

/// Stateful stop evaluator for one run.
#[derive(Debug)]
pub struct StopEvaluator {
    config: RuntimeConfig,
    streaks: Streaks,
    last_signature: Option<String>,
    last_score: Option<i64>,
    last_count: Option<usize>,
    last_blocking: Option<usize>,
    last_top_family: Option<Family>,
    structural_budget: u32,
    relief_passes_run: u32,
    planned: Strategy,
    best: Option<AttemptRecord>,
}

impl StopEvaluator {
    pub fn new(config: RuntimeConfig) -> Self {
        let structural_budget = config.max_structural_repair_attempts;
        Self {
            config,
            streaks: Streaks::default(),
            last_signature: None,
            last_score: None,
            last_count: None,
            last_blocking: None,
            last_top_family: None,
            structural_budget,
            relief_passes_run: 0,
            planned: Strategy::Normal,
            best: None,
        }
    }

    /// Remaining structural transform budget.
    pub fn structural_budget(&self) -> u32 {
        self.structural_budget
    }

    /// Minor relief passes applied so far (for the staged ramp).
    pub fn relief_passes_run(&self) -> u32 {
        self.relief_passes_run
    }

    /// The best attempt observed so far.
    pub fn best_attempt(&self) -> Option<&AttemptRecord> {
        self.best.as_ref()
    }

    /// Observe a frozen attempt: update streaks and best-attempt, plan the
    /// next strategy, and decide whether to stop.
    pub fn observe(&mut self, attempt: &AttemptRecord) -> Verdict {
        self.update_streaks(attempt);
        self.update_best(attempt);

        let top_family = dominant_blocking_family(attempt);
        self.streaks.same_top_family = match (&self.last_top_family, &top_family) {
            (Some(previous), Some(current)) if previous == current => {
                self.streaks.same_top_family + 1
            }
            (_, Some(_)) => 1,
            _ => 0,
        };
        self.last_top_family = top_family.clone();

        self.planned = self.plan_strategy(top_family.as_ref());
        let stop = self.decide_stop(attempt);

        Verdict {
            stop,
            next_strategy: self.planned,
            streaks: self.streaks,
        }
    }

    /// Commit to the planned strategy at the start of the next attempt.
    /// Structural strategies are refused once the budget is exhausted;
    /// relief passes count toward the ramp.
    pub fn arm_next(&mut self) -> Strategy {
        match self.planned {
            Strategy::Normal => Strategy::Normal,
            Strategy::TargetedCongestionRelief => {
                self.relief_passes_run += 1;
                Strategy::TargetedCongestionRelief
            }
            structural => {
                if self.structural_budget == 0 {
                    Strategy::Normal
                } else {
                    self.structural_budget -= 1;
                    structural
                }
            }
        }
    }

    fn update_streaks(&mut self, attempt: &AttemptRecord) {
        self.streaks.repeated_signature = match &self.last_signature {
            Some(previous) if *previous == attempt.set_signature => {
                self.streaks.repeated_signature + 1
            }
            _ => 0,
        };
        self.last_signature = Some(attempt.set_signature.clone());

        let improved = match (self.last_score, self.last_count) {
            (Some(score), Some(count)) => {
                score - attempt.score >= IMPROVEMENT_SCORE_DROP
                    || attempt.diagnostics.len() < count
            }
            _ => true,
        };
        self.streaks.stagnant = if improved { 0 } else { self.streaks.stagnant + 1 };
        self.last_score = Some(attempt.score);
        self.last_count = Some(attempt.diagnostics.len());

        let reduced = self
            .last_blocking
            .is_some_and(|previous| attempt.blocking_count < previous);
        self.streaks.no_blocking_reduction = if attempt.blocking_count > 0 && !reduced {
            self.streaks.no_blocking_reduction + 1
        } else {
            0
        };
        self.last_blocking = Some(attempt.blocking_count);

        self.streaks.autorouter_exhaustion = if attempt
            .diagnostics
            .iter()
            .any(|d| d.family == Family::PcbAutorouterExhaustion)
        {
            self.streaks.autorouter_exhaustion + 1
        } else {
            0
        };
    }

    fn update_best(&mut self, attempt: &AttemptRecord) {
        let dominated = self
            .best
            .as_ref()
            .is_none_or(|best| attempt.dominates(best));
        if dominated {
            self.best = Some(attempt.clone());
        }
    }

    fn plan_strategy(&self, top_family: Option<&Family>) -> Strategy {
        if !self.config.enable_structural_repair_mode {
            return Strategy::Normal;
        }
        let Some(family) = top_family else {
            return Strategy::Normal;
        };
        if family.wants_trace_rebuild() {
            return Strategy::StructuralTraceRebuild;
        }
        if family.wants_congestion_relief()
            && self.streaks.no_blocking_reduction >= self.config.structural_repair_trigger
        {
            if self.relief_passes_run < self.config.minor_relief_passes {
                return Strategy::TargetedCongestionRelief;
            }
            return Strategy::StructuralLayoutSpread;
        }
        Strategy::Normal
    }

    /// Stop conditions, most specific first. The scenario contract pins
    /// this order: a terminal attempt that also exhausted the autorouter
    /// or the structural budget reports that cause, not max_attempts, and
    /// max_attempts wins over plain stagnation.
    fn decide_stop(&self, attempt: &AttemptRecord) -> Option<StopReason> {
        let reached_max = attempt.index >= self.config.max_repair_attempts;

        if self.streaks.autorouter_exhaustion >= self.config.autorouter_stall_limit
            && self.streaks.no_blocking_reduction >= self.config.structural_repair_trigger
            && self.relief_passes_run >= 1
        {
            return Some(StopReason::AutorouterExhaustion);
        }
        if self.planned.is_structural()
            && self.structural_budget == 0
            && attempt.blocking_count > 0
            && reached_max
        {
            return Some(StopReason::StructuralRepairExhausted);
        }
        if reached_max {
            return Some(StopReason::MaxAttempts);
        }
        if self.streaks.repeated_signature >= self.config.signature_repeat_limit {
            return Some(StopReason::StagnantSignature);
        }
        if self.streaks.stagnant >= self.config.retry_stagnation_limit {
            return Some(StopReason::NoImprovement);
        }
        None
    }
}

fn dominant_blocking_family(attempt: &AttemptRecord) -> Option<Family> {
    let mut counts: Vec<(Family, usize, u8)> = Vec::new();
    for diag in attempt.diagnostics.iter().filter(|d| d.is_blocking()) {
        match counts.iter_mut().find(|(family, _, _)| *family == diag.family) {
            Some((_, count, severity)) => {
                *count += 1;
                *severity = (*severity).max(diag.severity);
            }
            None => counts.push((diag.family.clone(), 1, diag.severity)),
        }
    }
    counts
        .into_iter()
        .max_by(|a, b| {
            (a.1, a.2, std::cmp::Reverse(a.0.as_str().to_string()))
                .cmp(&(b.1, b.2, std::cmp::Reverse(b.0.as_str().to_string())))
        })
        .map(|(family, _, _)| family)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attempt::AttemptRecord;
    use crate::config::{Profile, RuntimeConfig};
    use crate::diagnostics::{annotate, DiagnosticSource, RawFinding};

    fn attempt_with(index: u32, category: &str, severity: u8) -> AttemptRecord {
        let diag = annotate(RawFinding::new(
            category,
            format!("{} detected", category),
            severity,
            DiagnosticSource::Tscircuit,
        ));
        AttemptRecord::freeze(
            index,
            Strategy::Normal,
            "raw".into(),
            Some("code".into()),
            vec![diag],
            true,
        )
    }

    fn test_config() -> RuntimeConfig {
        RuntimeConfig::defaults(Profile::Test)
    }

    #[test]
    fn test_max_attempts_wins_over_stagnant_signature() {
        // identical blocking sets through the ceiling: the terminal attempt
        // reports max_attempts even though the signature also repeated
        let mut evaluator = StopEvaluator::new(test_config());
        let verdict = evaluator.observe(&attempt_with(1, "attempt_timeout", 9));
        assert!(verdict.stop.is_none());
        let verdict = evaluator.observe(&attempt_with(2, "attempt_timeout", 9));
        assert!(verdict.stop.is_none());
        let verdict = evaluator.observe(&attempt_with(3, "attempt_timeout", 9));
        assert_eq!(verdict.stop, Some(StopReason::MaxAttempts));
        assert_eq!(verdict.streaks.repeated_signature, 2);
    }

    #[test]
    fn test_stagnant_signature_before_ceiling() {
        let mut config = test_config();
        config.max_repair_attempts = 6;
        let mut evaluator = StopEvaluator::new(config);
        evaluator.observe(&attempt_with(1, "attempt_timeout", 9));
        evaluator.observe(&attempt_with(2, "attempt_timeout", 9));
        let verdict = evaluator.observe(&attempt_with(3, "attempt_timeout", 9));
        assert_eq!(verdict.stop, Some(StopReason::StagnantSignature));
    }

    #[test]
    fn test_no_improvement_stop() {
        let mut config = test_config();
        config.max_repair_attempts = 8;
        config.signature_repeat_limit = 10;
        config.retry_stagnation_limit = 2;
        let mut evaluator = StopEvaluator::new(config);

        // different signatures each time, but never improving
        evaluator.observe(&attempt_with(1, "alpha_issue", 9));
        evaluator.observe(&attempt_with(2, "beta_issue", 9));
        let verdict = evaluator.observe(&attempt_with(3, "gamma_issue", 9));
        assert_eq!(verdict.stop, Some(StopReason::NoImprovement));
    }

    #[test]
    fn test_autorouter_exhaustion_beats_max_attempts() {
        let mut evaluator = StopEvaluator::new(test_config());

        let verdict = evaluator.observe(&attempt_with(1, "pcb_autorouter_exhaustion", 9));
        assert_eq!(verdict.next_strategy, Strategy::Normal);
        assert!(verdict.stop.is_none());

        let verdict = evaluator.observe(&attempt_with(2, "pcb_autorouter_exhaustion", 9));
        // trigger met -> relief planned; exhaustion stop still needs a pass to run
        assert_eq!(verdict.next_strategy, Strategy::TargetedCongestionRelief);
        assert!(verdict.stop.is_none());

        assert_eq!(evaluator.arm_next(), Strategy::TargetedCongestionRelief);
        let verdict = evaluator.observe(&attempt_with(3, "pcb_autorouter_exhaustion", 9));
        assert_eq!(verdict.stop, Some(StopReason::AutorouterExhaustion));
    }

    #[test]
    fn test_structural_exhaustion_on_terminal_attempt() {
        let mut evaluator = StopEvaluator::new(test_config());

        let verdict = evaluator.observe(&attempt_with(1, "source_trace_missing_endpoint", 9));
        assert_eq!(verdict.next_strategy, Strategy::StructuralTraceRebuild);
        assert!(verdict.stop.is_none());

        // budget of one is consumed here
        assert_eq!(evaluator.arm_next(), Strategy::StructuralTraceRebuild);
        assert_eq!(evaluator.structural_budget(), 0);

        let verdict = evaluator.observe(&attempt_with(2, "source_trace_missing_endpoint", 9));
        assert!(verdict.stop.is_none());
        // refused once the budget is gone
        assert_eq!(evaluator.arm_next(), Strategy::Normal);

        let verdict = evaluator.observe(&attempt_with(3, "source_trace_missing_endpoint", 9));
        assert_eq!(verdict.stop, Some(StopReason::StructuralRepairExhausted));
    }

    #[test]
    fn test_relief_ramp_escalates_to_spread() {
        let mut config = test_config();
        config.max_repair_attempts = 12;
        config.signature_repeat_limit = 10;
        config.retry_stagnation_limit = 10;
        config.autorouter_stall_limit = 12;
        config.minor_relief_passes = 2;
        let mut evaluator = StopEvaluator::new(config);

        evaluator.observe(&attempt_with(1, "pcb_trace_error", 9));
        let verdict = evaluator.observe(&attempt_with(2, "pcb_trace_error", 9));
        assert_eq!(verdict.next_strategy, Strategy::TargetedCongestionRelief);
        evaluator.arm_next();

        let verdict = evaluator.observe(&attempt_with(3, "pcb_trace_error", 9));
        assert_eq!(verdict.next_strategy, Strategy::TargetedCongestionRelief);
        evaluator.arm_next();

        // minor passes exhausted -> structural spread
        let verdict = evaluator.observe(&attempt_with(4, "pcb_trace_error", 9));
        assert_eq!(verdict.next_strategy, Strategy::StructuralLayoutSpread);
    }

    #[test]
    fn test_structural_mode_disabled_plans_normal() {
        let mut config = test_config();
        config.enable_structural_repair_mode = false;
        let mut evaluator = StopEvaluator::new(config);
        let verdict = evaluator.observe(&attempt_with(1, "source_trace_missing_endpoint", 9));
        assert_eq!(verdict.next_strategy, Strategy::Normal);
    }

    #[test]
    fn test_best_attempt_tracking() {
        let mut evaluator = StopEvaluator::new(test_config());
        evaluator.observe(&attempt_with(1, "pcb_trace_error", 9));
        let two = AttemptRecord::freeze(
            2,
            Strategy::Normal,
            "raw".into(),
            Some("better".into()),
            Vec::new(),
            true,
        );
        evaluator.observe(&two);
        evaluator.observe(&attempt_with(3, "pcb_trace_error", 9));

        let best = evaluator.best_attempt().expect("best attempt");
        assert_eq!(best.index, 2);
        assert_eq!(best.blocking_count, 0);
    }
}
