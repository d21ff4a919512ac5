//! Deterministic source mutations used by the repair strategy ladder.
//!
//! All transforms are pure text-to-text functions. They touch no external
//! state and report what they did through action tags; when a transform
//! cannot find enough structure to act on it returns the input unchanged.

mod congestion;
mod trace_rebuild;

pub use congestion::{relieve_congestion, spread_layout, ReliefParams};
pub use trace_rebuild::rebuild_traces;

use crate::diagnostics::RawFinding;

/// Outcome of a strategy transform.
#[derive(Debug, Clone, PartialEq)]
pub struct TransformOutcome {
    pub code: String,
    pub actions: Vec<String>,
    /// Synthetic findings surfaced when the transform could not apply.
    pub diagnostics: Vec<RawFinding>,
}

impl TransformOutcome {
    pub fn unchanged(code: &str) -> Self {
        Self {
            code: code.to_string(),
            actions: Vec::new(),
            diagnostics: Vec::new(),
        }
    }
}

/// Format a millimetre value: integral values print bare, others keep
/// two decimals.
pub(crate) fn fmt_mm(value: f64) -> String {
    let rounded = (value * 100.0).round() / 100.0;
    if (rounded - rounded.round()).abs() < 1e-9 {
        format!("{}", rounded.round() as i64)
    } else {
        format!("{:.2}", rounded)
    }
}
